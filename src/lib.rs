#![doc(html_root_url = "https://docs.rs/phloem/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! A reactive binding engine: keeps interpolated values, deferred values and event streams
//! synchronized with elements of a live document tree.
//!
//! See [`Engine`] for the entry point and [`HostTree`] for what the tree has to provide.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod adapt;
pub mod classify;
mod engine;
mod error;
mod event;
mod host;
pub mod memory;
mod merge;
mod rc_hash_map;
pub mod sink;
pub mod source;
mod subscription;
pub mod value;
pub mod web;

pub use classify::{classify, Tag};
pub use engine::{BindingId, BindingState, Engine, EngineBuilder, DEFAULT_DEPTH_LIMIT};
pub use error::{BindError, RuntimeError};
pub use host::{HostTree, Listener};
pub use sink::{Position, PositionCategory};
pub use value::{Event, ExplicitSink, Failure, Handler, Object, Value};
