//! Event wiring: plain handlers, writable streams as event sinks, and the mount signal.

use crate::{
	engine::BindingId,
	host::{HostTree, Listener},
	sink::{ListenerSlot, Op},
	value::{same, Event, Handler, Observable, Value},
};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Name of the synthetic event passed to mount handlers.
pub(crate) const MOUNT: &str = "mount";

/// Something that can receive native event occurrences. Compares by identity.
#[derive(Clone)]
pub(crate) enum ListenerRef {
	Function(Handler),
	/// Only ever pushed to, never called.
	Writable(Rc<dyn Observable>),
}

impl ListenerRef {
	/// [`None`] iff `value` is neither a function nor a stream with push capability.
	pub(crate) fn from_value(value: &Value) -> Option<Self> {
		match value {
			Value::Function(handler) => Some(ListenerRef::Function(handler.clone())),
			Value::Stream(stream) if stream.writable().is_some() => Some(ListenerRef::Writable(stream.clone())),
			_ => None,
		}
	}

	/// The native listener. Plain handlers are registered as themselves.
	pub(crate) fn listener(&self) -> Listener {
		match self {
			ListenerRef::Function(handler) => handler.listener(),
			ListenerRef::Writable(stream) => {
				let stream = stream.clone();
				Rc::new(move |event: &Event| {
					if let Some(writable) = stream.writable() {
						writable.push(Value::Event(event.clone()));
					}
				})
			}
		}
	}

	pub(crate) fn invoke(&self, event: &Event) {
		(self.listener())(event);
	}
}

impl PartialEq for ListenerRef {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(ListenerRef::Function(a), ListenerRef::Function(b)) => a == b,
			(ListenerRef::Writable(a), ListenerRef::Writable(b)) => same(a, b),
			_ => false,
		}
	}
}

impl Debug for ListenerRef {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			ListenerRef::Function(handler) => handler.fmt(f),
			ListenerRef::Writable(stream) => write!(f, "Writable({:p})", Rc::as_ptr(stream).cast::<()>()),
		}
	}
}

/// The wired listener of an event binding, with its native id once registered.
pub(crate) type Wired<H> = Option<(ListenerRef, Option<<H as HostTree>::ListenerId>)>;

/// Plans replacing the listener in `wired` with the one `value` describes. [`Value::Null`] unwires.
///
/// Returns [`None`] iff `value` can't be used as a listener.
pub(crate) fn plan_wire<H: HostTree>(binding: BindingId, event: &Rc<str>, wired: &mut Wired<H>, value: &Value) -> Option<Vec<Op<H>>> {
	let next = match value {
		Value::Null => None,
		value => Some(ListenerRef::from_value(value)?),
	};
	if let (Some((current, _)), Some(next)) = (&*wired, &next) {
		if current == next {
			return Some(vec![]);
		}
	}

	let mut ops = vec![];
	if let Some((_, Some(id))) = wired.take() {
		ops.push(Op::Unlisten { event: event.clone(), id });
	}
	if let Some(next) = next {
		ops.push(Op::Listen {
			event: event.clone(),
			listener: next.listener(),
			slot: ListenerSlot::Binding(binding, next.clone()),
		});
		*wired = Some((next, None));
	}
	Some(ops)
}

/// Mount signal state of a `bind:mount` binding.
#[derive(Debug, Default)]
pub(crate) struct Mount {
	pub(crate) handler: Option<ListenerRef>,
	pub(crate) fired: bool,
}

impl Mount {
	/// Takes the handler to fire if the element is attached and this hasn't fired yet.
	pub(crate) fn due(&mut self, attached: bool) -> Option<ListenerRef> {
		if self.fired || !attached {
			return None;
		}
		let handler = self.handler.clone()?;
		self.fired = true;
		Some(handler)
	}
}
