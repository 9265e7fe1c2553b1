//! Registrations with deferred values and streams, torn down exactly once.

use crate::value::{Deferred, Observable, Teardown};
use core::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::trace;

#[derive(Clone)]
pub(crate) enum Source {
	Deferred(Rc<dyn Deferred>),
	Stream(Rc<dyn Observable>),
}

impl core::fmt::Debug for Source {
	fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
		match self {
			Source::Deferred(deferred) => write!(f, "Deferred({:p})", Rc::as_ptr(deferred).cast::<()>()),
			Source::Stream(stream) => write!(f, "Stream({:p})", Rc::as_ptr(stream).cast::<()>()),
		}
	}
}

#[derive(Debug)]
struct Shared {
	source: Source,
	active: Cell<bool>,
	teardown: RefCell<Option<Teardown>>,
	emissions: Cell<u64>,
}

/// One registration with a deferred value or stream.
///
/// Cancelling is idempotent, and the source's teardown runs exactly once,
/// even if cancellation happens before the source has handed it over.
#[derive(Debug, Clone)]
pub(crate) struct Subscription(Rc<Shared>);

/// Held by the registered callback, so that an abandoned subscription doesn't keep itself alive.
#[derive(Debug, Clone)]
pub(crate) struct WeakSubscription(Weak<Shared>);

impl Subscription {
	pub(crate) fn new(source: Source) -> Self {
		Self(Rc::new(Shared {
			source,
			active: Cell::new(true),
			teardown: RefCell::new(None),
			emissions: Cell::new(0),
		}))
	}

	pub(crate) fn downgrade(&self) -> WeakSubscription {
		WeakSubscription(Rc::downgrade(&self.0))
	}

	pub(crate) fn is_active(&self) -> bool {
		self.0.active.get()
	}

	pub(crate) fn emissions(&self) -> u64 {
		self.0.emissions.get()
	}

	pub(crate) fn record_emission(&self) {
		self.0.emissions.set(self.0.emissions.get() + 1);
	}

	/// Hands over the source's teardown. If already cancelled, it runs right away.
	pub(crate) fn install(&self, teardown: Teardown) {
		if self.is_active() {
			*self.0.teardown.borrow_mut() = Some(teardown);
		} else {
			trace!(source = ?self.0.source, "Cancelled before registration returned. Tearing down immediately.");
			teardown.run();
		}
	}

	/// Returns whether this call did the cancelling.
	pub(crate) fn cancel(&self) -> bool {
		if !self.0.active.replace(false) {
			return false;
		}
		let teardown = self.0.teardown.borrow_mut().take();
		trace!(source = ?self.0.source, emissions = self.emissions(), "Tearing down subscription.");
		if let Some(teardown) = teardown {
			teardown.run();
		}
		true
	}
}

impl WeakSubscription {
	pub(crate) fn upgrade(&self) -> Option<Subscription> {
		self.0.upgrade().map(Subscription)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::source::Relay;

	fn counted(count: &Rc<Cell<usize>>) -> Teardown {
		let count = count.clone();
		Teardown::new(move || count.set(count.get() + 1))
	}

	#[test]
	fn teardown_runs_once() {
		let count = Rc::new(Cell::new(0));
		let subscription = Subscription::new(Source::Stream(Rc::new(Relay::new())));
		subscription.install(counted(&count));
		assert!(subscription.cancel());
		assert!(!subscription.cancel());
		assert_eq!(count.get(), 1);
	}

	#[test]
	fn cancel_before_install() {
		let count = Rc::new(Cell::new(0));
		let subscription = Subscription::new(Source::Stream(Rc::new(Relay::new())));
		assert!(subscription.cancel());
		assert_eq!(count.get(), 0);
		subscription.install(counted(&count));
		assert_eq!(count.get(), 1);
		assert!(!subscription.cancel());
		assert_eq!(count.get(), 1);
	}
}
