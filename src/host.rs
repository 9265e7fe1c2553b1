//! The host tree collaborator interface.
//!
//! The engine doesn't create, insert or remove nodes itself. It only needs these primitives on elements that calling code already owns.

use crate::value::Event;
use core::{fmt::Debug, hash::Hash};
use std::rc::Rc;

/// A native event listener.
pub type Listener = Rc<dyn Fn(&Event)>;

/// A live document tree.
///
/// # Re-entrancy
///
/// The mutation primitives must not synchronously call back into the [`Engine`](`crate::Engine`).
/// Native events should be dispatched to [`Listener`]s only after the registering primitive has returned.
pub trait HostTree: 'static {
	/// A cheap, comparable handle to an element.
	type Node: Clone + Eq + Hash + Debug + 'static;
	type ListenerId: Debug + 'static;

	fn set_attribute(&self, node: &Self::Node, name: &str, value: &str);
	fn remove_attribute(&self, node: &Self::Node, name: &str);

	fn set_text_content(&self, node: &Self::Node, text: &str);
	fn set_inner_markup(&self, node: &Self::Node, markup: &str);
	fn append_markup(&self, node: &Self::Node, markup: &str);

	fn set_style_property(&self, node: &Self::Node, property: &str, value: &str);
	fn remove_style_property(&self, node: &Self::Node, property: &str);

	/// Assigns the live `value` property of an input-like element.
	fn set_value(&self, node: &Self::Node, value: &str);
	fn is_input_like(&self, node: &Self::Node) -> bool;

	fn add_event_listener(&self, node: &Self::Node, event: &str, listener: Listener) -> Self::ListenerId;
	fn remove_event_listener(&self, node: &Self::Node, event: &str, id: Self::ListenerId);

	/// Whether `node` is currently part of the live document.
	fn is_attached(&self, node: &Self::Node) -> bool;

	/// Whether `node` is `ancestor` or one of its descendants, attached or not.
	fn contains(&self, ancestor: &Self::Node, node: &Self::Node) -> bool;
}
