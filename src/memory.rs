//! A headless [`HostTree`], for server-side rendering and tests.

use crate::{
	host::{HostTree, Listener},
	value::Event,
};
use core::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{trace, warn};

/// An element handle of a [`MemoryTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

/// What an element contains, as last set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
	Text(String),
	Markup(String),
}

struct Element {
	name: Rc<str>,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
	attributes: Vec<(Rc<str>, String)>,
	styles: Vec<(Rc<str>, String)>,
	content: Content,
	value: String,
	listeners: Vec<(Rc<str>, ListenerId, Listener)>,
}

impl Element {
	fn new(name: Rc<str>) -> Self {
		Self {
			name,
			parent: None,
			children: Vec::new(),
			attributes: Vec::new(),
			styles: Vec::new(),
			content: Content::Text(String::new()),
			value: String::new(),
			listeners: Vec::new(),
		}
	}
}

#[derive(Default)]
struct Arena {
	elements: Vec<Element>,
	next_listener: u64,
}

/// An in-memory element tree. Cloning yields a handle to the same tree.
///
/// The [root](`MemoryTree::root`) is always attached. Other elements are attached iff they are its descendants.
#[derive(Clone)]
pub struct MemoryTree {
	arena: Rc<RefCell<Arena>>,
	mutations: Rc<Cell<usize>>,
}

impl core::fmt::Debug for MemoryTree {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		f.debug_struct("MemoryTree")
			.field("elements", &self.arena.borrow().elements.len())
			.field("mutations", &self.mutations.get())
			.finish()
	}
}

impl Default for MemoryTree {
	fn default() -> Self {
		Self::new()
	}
}

fn upsert(entries: &mut Vec<(Rc<str>, String)>, key: &str, value: &str) {
	match entries.iter_mut().find(|(k, _)| &**k == key) {
		Some((_, slot)) => value.clone_into(slot),
		None => entries.push((key.into(), value.to_owned())),
	}
}

impl MemoryTree {
	/// Creates a tree with an attached `body` root.
	#[must_use]
	pub fn new() -> Self {
		Self {
			arena: Rc::new(RefCell::new(Arena {
				elements: vec![Element::new("body".into())],
				next_listener: 0,
			})),
			mutations: Rc::default(),
		}
	}

	#[must_use]
	pub fn root(&self) -> NodeId {
		NodeId(0)
	}

	/// Creates a detached element.
	pub fn create_element(&self, name: &str) -> NodeId {
		let mut arena = self.arena.borrow_mut();
		arena.elements.push(Element::new(name.into()));
		NodeId(arena.elements.len() - 1)
	}

	/// Moves `child` to the end of `parent`'s children.
	pub fn append_child(&self, parent: NodeId, child: NodeId) {
		if self.contains(&child, &parent) {
			return warn!(?parent, ?child, "Refusing to create a cycle.");
		}
		self.remove(child);
		let mut arena = self.arena.borrow_mut();
		arena.elements[parent.0].children.push(child);
		arena.elements[child.0].parent = Some(parent);
	}

	/// Detaches `node` from its parent. Its own subtree stays intact.
	pub fn remove(&self, node: NodeId) {
		let mut arena = self.arena.borrow_mut();
		if let Some(parent) = arena.elements[node.0].parent.take() {
			arena.elements[parent.0].children.retain(|child| *child != node);
		}
	}

	#[must_use]
	pub fn name(&self, node: NodeId) -> Rc<str> {
		self.arena.borrow().elements[node.0].name.clone()
	}

	#[must_use]
	pub fn children(&self, node: NodeId) -> Vec<NodeId> {
		self.arena.borrow().elements[node.0].children.clone()
	}

	#[must_use]
	pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
		self.arena.borrow().elements[node.0].attributes.iter().find(|(k, _)| &**k == name).map(|(_, v)| v.clone())
	}

	/// All attributes, in the order they were first set.
	#[must_use]
	pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
		self.arena.borrow().elements[node.0].attributes.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
	}

	/// `name="value"` pairs joined by spaces, as they would appear in markup.
	#[must_use]
	pub fn render_attributes(&self, node: NodeId) -> String {
		self.attributes(node)
			.into_iter()
			.map(|(name, value)| format!("{}=\"{}\"", name, value.replace('"', "&quot;")))
			.collect::<Vec<_>>()
			.join(" ")
	}

	#[must_use]
	pub fn content(&self, node: NodeId) -> Content {
		self.arena.borrow().elements[node.0].content.clone()
	}

	/// The content as a string, regardless of whether it was set as text or markup.
	#[must_use]
	pub fn text(&self, node: NodeId) -> String {
		match self.content(node) {
			Content::Text(text) | Content::Markup(text) => text,
		}
	}

	#[must_use]
	pub fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
		self.arena.borrow().elements[node.0].styles.iter().find(|(k, _)| &**k == property).map(|(_, v)| v.clone())
	}

	#[must_use]
	pub fn value(&self, node: NodeId) -> String {
		self.arena.borrow().elements[node.0].value.clone()
	}

	#[must_use]
	pub fn listener_count(&self, node: NodeId) -> usize {
		self.arena.borrow().elements[node.0].listeners.len()
	}

	/// Delivers `event` to `node`'s listeners for its name, in registration order.
	///
	/// Returns how many listeners were called.
	pub fn dispatch(&self, node: NodeId, event: &Event) -> usize {
		let listeners: Vec<Listener> = self.arena.borrow().elements[node.0]
			.listeners
			.iter()
			.filter(|(name, _, _)| &**name == event.name())
			.map(|(_, _, listener)| listener.clone())
			.collect();
		trace!(?node, event = event.name(), listeners = listeners.len(), "Dispatching.");
		for listener in &listeners {
			listener(event);
		}
		listeners.len()
	}

	/// How many mutation primitives were called so far.
	#[must_use]
	pub fn mutation_count(&self) -> usize {
		self.mutations.get()
	}

	fn mutate<T>(&self, node: NodeId, mutate: impl FnOnce(&mut Element) -> T) -> T {
		self.mutations.set(self.mutations.get() + 1);
		mutate(&mut self.arena.borrow_mut().elements[node.0])
	}
}

impl HostTree for MemoryTree {
	type Node = NodeId;
	type ListenerId = ListenerId;

	fn set_attribute(&self, node: &NodeId, name: &str, value: &str) {
		self.mutate(*node, |element| upsert(&mut element.attributes, name, value));
	}

	fn remove_attribute(&self, node: &NodeId, name: &str) {
		self.mutate(*node, |element| element.attributes.retain(|(k, _)| &**k != name));
	}

	fn set_text_content(&self, node: &NodeId, text: &str) {
		self.mutate(*node, |element| element.content = Content::Text(text.to_owned()));
	}

	fn set_inner_markup(&self, node: &NodeId, markup: &str) {
		self.mutate(*node, |element| element.content = Content::Markup(markup.to_owned()));
	}

	fn append_markup(&self, node: &NodeId, markup: &str) {
		self.mutate(*node, |element| {
			let mut content = match &element.content {
				Content::Text(text) | Content::Markup(text) => text.clone(),
			};
			content.push_str(markup);
			element.content = Content::Markup(content);
		});
	}

	fn set_style_property(&self, node: &NodeId, property: &str, value: &str) {
		self.mutate(*node, |element| upsert(&mut element.styles, property, value));
	}

	fn remove_style_property(&self, node: &NodeId, property: &str) {
		self.mutate(*node, |element| element.styles.retain(|(k, _)| &**k != property));
	}

	fn set_value(&self, node: &NodeId, value: &str) {
		self.mutate(*node, |element| value.clone_into(&mut element.value));
	}

	fn is_input_like(&self, node: &NodeId) -> bool {
		matches!(&*self.name(*node), "input" | "textarea" | "select")
	}

	fn add_event_listener(&self, node: &NodeId, event: &str, listener: Listener) -> ListenerId {
		let mut arena = self.arena.borrow_mut();
		let id = ListenerId(arena.next_listener);
		arena.next_listener += 1;
		arena.elements[node.0].listeners.push((event.into(), id, listener));
		self.mutations.set(self.mutations.get() + 1);
		id
	}

	fn remove_event_listener(&self, node: &NodeId, event: &str, id: ListenerId) {
		self.mutate(*node, |element| element.listeners.retain(|(name, other, _)| !(&**name == event && *other == id)));
	}

	fn is_attached(&self, node: &NodeId) -> bool {
		self.contains(&self.root(), node)
	}

	fn contains(&self, ancestor: &NodeId, node: &NodeId) -> bool {
		let arena = self.arena.borrow();
		let mut current = Some(*node);
		while let Some(node) = current {
			if node == *ancestor {
				return true;
			}
			current = arena.elements[node.0].parent;
		}
		false
	}
}
