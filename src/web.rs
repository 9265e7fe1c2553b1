//! The browser [`HostTree`], over [`web_sys`].

use crate::{
	host::{HostTree, Listener},
	rc_hash_map::RcHashMap,
	value::Event,
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
};
use js_sys::WeakMap;
use std::rc::Rc;
use tracing::{error, info, instrument, trace, trace_span, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue, UnwrapThrowExt};
use web_sys::{HtmlElement, HtmlInputElement, HtmlSelectElement, HtmlTextAreaElement};

/// An element handle of a [`DomTree`].
///
/// Handles of the same element compare equal, since they share a key assigned by the tree.
#[derive(Clone)]
pub struct DomNode {
	key: u32,
	element: web_sys::Element,
}

impl DomNode {
	#[must_use]
	pub fn element(&self) -> &web_sys::Element {
		&self.element
	}
}

impl PartialEq for DomNode {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}
impl Eq for DomNode {}

impl Hash for DomNode {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.key.hash(state);
	}
}

impl Debug for DomNode {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "DomNode({}, {})", self.key, self.element.tag_name())
	}
}

/// Element key, event name and [`Listener`] address.
///
/// The DOM registers a callback at most once per element and event, so that's what is counted.
type ListenerKey = (u32, Rc<str>, *const ());

/// Identifies one registration of a native listener.
#[derive(Debug)]
pub struct ListenerId(ListenerKey);

struct Inner {
	keys: WeakMap,
	next_key: Cell<u32>,
	handler_handles: RefCell<RcHashMap<ListenerKey, u16, Closure<dyn Fn(web_sys::Event)>>>,
}

/// A [`HostTree`] over the live browser DOM. Cloning yields a handle to the same tree.
///
/// # Listener lifetime
///
/// Native listeners are reference-counted per element, event and [`Listener`].
/// Registering the same listener twice for one event on one element adds it to the DOM once,
/// and it stays there until both registrations are removed.
/// Closures whose last registration was removed are released on the next registration
/// or by [`free_listeners`](`DomTree::free_listeners`), never while they may still be running.
///
/// Listeners that are still registered start throwing errors into JavaScript once the last handle is dropped.
#[derive(Clone)]
pub struct DomTree(Rc<Inner>);

impl Debug for DomTree {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("DomTree")
			.field("next_key", &self.0.next_key.get())
			.field("handler_handles", &self.0.handler_handles.try_borrow().map(|handles| handles.len()).ok())
			.finish()
	}
}

impl Default for DomTree {
	fn default() -> Self {
		Self::new()
	}
}

impl DomTree {
	#[must_use]
	#[instrument]
	pub fn new() -> Self {
		Self(Rc::new(Inner {
			keys: WeakMap::new(),
			next_key: Cell::new(0),
			handler_handles: RefCell::default(),
		}))
	}

	/// Returns the handle of `element`, assigning it a key on first use.
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	pub fn node(&self, element: web_sys::Element) -> DomNode {
		let key = match self.0.keys.get(&element).as_f64() {
			Some(key) => key as u32,
			None => {
				let key = self.0.next_key.get();
				self.0.next_key.set(key.checked_add(1).expect_throw("phloem: Ran out of element keys."));
				self.0.keys.set(&element, &JsValue::from(key));
				key
			}
		};
		DomNode { key, element }
	}

	/// Releases closures of listeners that aren't registered anymore.
	///
	/// Returns how many were released.
	pub fn free_listeners(&self) -> usize {
		let freed = self.0.handler_handles.borrow_mut().drain_weak().count();
		trace!("Freed {} event listener(s).", freed);
		freed
	}

	fn html(node: &DomNode) -> Option<&HtmlElement> {
		let html = node.element.dyn_ref::<HtmlElement>();
		if html.is_none() {
			warn!(?node, "Not an HTML element. Can't set inline styles.");
		}
		html
	}
}

impl HostTree for DomTree {
	type Node = DomNode;
	type ListenerId = ListenerId;

	fn set_attribute(&self, node: &DomNode, name: &str, value: &str) {
		if let Err(error) = node.element.set_attribute(name, value) {
			error!(?node, name, ?error, "Failed to set attribute.");
		}
	}

	fn remove_attribute(&self, node: &DomNode, name: &str) {
		if let Err(error) = node.element.remove_attribute(name) {
			error!(?node, name, ?error, "Failed to remove attribute.");
		}
	}

	fn set_text_content(&self, node: &DomNode, text: &str) {
		node.element.set_text_content(Some(text));
	}

	fn set_inner_markup(&self, node: &DomNode, markup: &str) {
		node.element.set_inner_html(markup);
	}

	fn append_markup(&self, node: &DomNode, markup: &str) {
		if let Err(error) = node.element.insert_adjacent_html("beforeend", markup) {
			error!(?node, ?error, "Failed to append markup.");
		}
	}

	fn set_style_property(&self, node: &DomNode, property: &str, value: &str) {
		if let Some(html) = Self::html(node) {
			if let Err(error) = html.style().set_property(property, value) {
				error!(?node, property, ?error, "Failed to set style property.");
			}
		}
	}

	fn remove_style_property(&self, node: &DomNode, property: &str) {
		if let Some(html) = Self::html(node) {
			if let Err(error) = html.style().remove_property(property) {
				error!(?node, property, ?error, "Failed to remove style property.");
			}
		}
	}

	fn set_value(&self, node: &DomNode, value: &str) {
		let element = &node.element;
		if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
			input.set_value(value);
		} else if let Some(text_area) = element.dyn_ref::<HtmlTextAreaElement>() {
			text_area.set_value(value);
		} else if let Some(select) = element.dyn_ref::<HtmlSelectElement>() {
			select.set_value(value);
		} else {
			warn!(?node, "Not an input-like element. Setting `value` attribute instead.");
			self.set_attribute(node, "value", value);
		}
	}

	fn is_input_like(&self, node: &DomNode) -> bool {
		let element = &node.element;
		element.is_instance_of::<HtmlInputElement>() || element.is_instance_of::<HtmlTextAreaElement>() || element.is_instance_of::<HtmlSelectElement>()
	}

	#[instrument(skip(listener))]
	fn add_event_listener(&self, node: &DomNode, event: &str, listener: Listener) -> ListenerId {
		let mut handler_handles = self.0.handler_handles.borrow_mut();
		{
			let drain = handler_handles.drain_weak();
			trace!("Freed {} event listener(s).", drain.count());
		}

		let key: ListenerKey = (node.key, event.into(), Rc::as_ptr(&listener).cast::<()>());
		// Anything still in the map after draining is registered with the DOM.
		let listening = handler_handles.get(&key).is_some();
		let closure = handler_handles
			.increment_or_insert_with(key.clone(), move || {
				Closure::wrap(Box::new(move |event: web_sys::Event| {
					let span = trace_span!("Native event", event = %event.type_());
					let _enter = span.enter();
					listener(&Event::with_native(event.type_(), event));
				}) as Box<dyn Fn(web_sys::Event)>)
			})
			.expect_throw("Too many (more than 65k) active registrations of the same listener");

		if listening {
			trace!("Already listening. Counted another registration.");
		} else if let Err(error) = node.element.add_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
			error!(?node, event, ?error, "Failed to add event listener.");
		}
		info!("Event listener count: {}", handler_handles.len());
		ListenerId(key)
	}

	#[instrument]
	fn remove_event_listener(&self, node: &DomNode, event: &str, id: ListenerId) {
		let mut handler_handles = self.0.handler_handles.borrow_mut();
		match handler_handles.weak_decrement(&id.0) {
			Ok(Some(_)) => (),
			Ok(None) => return error!(?id, "Unknown listener."),
			Err(error) => return error!(?id, %error, "Listener was removed more often than added."),
		}
		match handler_handles.get(&id.0) {
			Some((&0, closure)) => {
				if let Err(error) = node.element.remove_event_listener_with_callback(event, closure.as_ref().unchecked_ref()) {
					error!(?node, event, ?error, "Failed to remove event listener.");
				}
			}
			Some((count, _)) => trace!("Still registered {} more time(s).", count),
			None => (),
		}
	}

	fn is_attached(&self, node: &DomNode) -> bool {
		node.element.is_connected()
	}

	fn contains(&self, ancestor: &DomNode, node: &DomNode) -> bool {
		let node: &web_sys::Node = &node.element;
		ancestor.element.contains(Some(node))
	}
}
