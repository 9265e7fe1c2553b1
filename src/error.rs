//! Bind-time errors are returned to the caller. Run-time errors only ever go to the error channel.

use crate::{
	classify::Tag,
	engine::BindingId,
	sink::PositionCategory,
	value::Failure,
};
use std::rc::Rc;
use thiserror::Error;

/// A structural problem detected while binding. No binding is created (or changed, for rebinds).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
	#[error("Unknown sink kind {kind:?}.")]
	UnknownSink { kind: Rc<str> },

	#[error("The {sink} sink can't be used at {position} positions.")]
	SinkPositionMismatch { sink: &'static str, position: PositionCategory },

	#[error("A {tag:?} value can't be bound at {position} positions.")]
	UnsupportedValue { tag: Tag, position: PositionCategory },

	#[error("{name:?} is in the reserved namespace but doesn't name an engine position.")]
	UnknownReservedName { name: Rc<str> },

	#[error("{id:?} is not a live binding.")]
	UnknownBinding { id: BindingId },
}

/// An asynchronous failure. The last successfully applied value stays in place.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
	#[error("The deferred value of {binding:?} was rejected: {reason}")]
	DeferredRejection { binding: BindingId, reason: Failure },

	#[error("The stream of {binding:?} failed: {reason}")]
	StreamEmission { binding: BindingId, reason: Failure },

	#[error("{binding:?} received a {shape} value that its {sink} sink can't apply.")]
	UnsupportedEmission {
		binding: BindingId,
		sink: &'static str,
		shape: &'static str,
	},

	#[error("Depth limit reached while delivering a value to {binding:?}.")]
	DepthLimit { binding: BindingId },
}

impl RuntimeError {
	#[must_use]
	pub fn binding(&self) -> BindingId {
		match *self {
			RuntimeError::DeferredRejection { binding, .. }
			| RuntimeError::StreamEmission { binding, .. }
			| RuntimeError::UnsupportedEmission { binding, .. }
			| RuntimeError::DepthLimit { binding } => binding,
		}
	}
}
