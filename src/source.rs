//! Minimal producers of deferred values and streams.
//!
//! These implement just the contracts in [`value`](`crate::value`) and nothing of a reactive algebra.
//! Anything else implementing [`Deferred`] or [`Observable`] works the same way.

use crate::value::{Deferred, Failure, Notification, Observable, Observer, Settle, Teardown, Value, Writable};
use core::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{trace, warn};

enum Settlement {
	Pending(Vec<Settle>),
	Settled(Result<Value, Failure>),
}

/// A deferred value that is settled by hand. Cloning yields a handle to the same value.
#[derive(Clone)]
pub struct Deferral(Rc<RefCell<Settlement>>);

impl Default for Deferral {
	fn default() -> Self {
		Self::new()
	}
}

impl Deferral {
	#[must_use]
	pub fn new() -> Self {
		Self(Rc::new(RefCell::new(Settlement::Pending(Vec::new()))))
	}

	pub fn resolve(&self, value: impl Into<Value>) {
		self.settle(Ok(value.into()));
	}

	pub fn reject(&self, reason: impl Into<Failure>) {
		self.settle(Err(reason.into()));
	}

	#[must_use]
	pub fn is_settled(&self) -> bool {
		matches!(*self.0.borrow(), Settlement::Settled(_))
	}

	/// Only the first settlement counts.
	fn settle(&self, outcome: Result<Value, Failure>) {
		let continuations = {
			let mut settlement = self.0.borrow_mut();
			match &mut *settlement {
				Settlement::Settled(_) => return warn!("Ignoring repeated settlement of a deferred value."),
				Settlement::Pending(continuations) => {
					let continuations = core::mem::take(continuations);
					*settlement = Settlement::Settled(outcome.clone());
					continuations
				}
			}
		};
		trace!(continuations = continuations.len(), "Settling deferred value.");
		for settle in continuations {
			settle(outcome.clone());
		}
	}
}

impl Deferred for Deferral {
	fn on_settled(&self, settle: Settle) {
		let outcome = match &mut *self.0.borrow_mut() {
			Settlement::Pending(continuations) => return continuations.push(settle),
			Settlement::Settled(outcome) => outcome.clone(),
		};
		settle(outcome);
	}
}

impl From<Deferral> for Value {
	fn from(deferral: Deferral) -> Self {
		Value::Deferred(Rc::new(deferral))
	}
}

/// The observer list shared by the stream types below.
#[derive(Default)]
struct Observers {
	next_key: Cell<u64>,
	observers: RefCell<Vec<(u64, Observer)>>,
	finished: Cell<bool>,
}

impl Observers {
	fn subscribe(self: &Rc<Self>, observer: Observer) -> Teardown {
		if self.finished.get() {
			trace!("Subscribing to a finished stream.");
			return Teardown::noop();
		}
		let key = self.next_key.get();
		self.next_key.set(key + 1);
		self.observers.borrow_mut().push((key, observer));

		let weak: Weak<Self> = Rc::downgrade(self);
		Teardown::new(move || {
			if let Some(observers) = weak.upgrade() {
				observers.observers.borrow_mut().retain(|(k, _)| *k != key);
			}
		})
	}

	/// Observers are snapshotted first, so they may (un)subscribe while being notified.
	fn notify(&self, notification: &Notification) {
		if self.finished.get() {
			return warn!("Ignoring notification after the stream finished.");
		}
		if matches!(notification, Notification::Error(_) | Notification::Complete) {
			self.finished.set(true);
		}
		let observers: Vec<Observer> = self.observers.borrow().iter().map(|(_, observer)| observer.clone()).collect();
		for observer in observers {
			observer.notify(notification.clone());
		}
		if self.finished.get() {
			self.observers.borrow_mut().clear();
		}
	}

	fn len(&self) -> usize {
		self.observers.borrow().len()
	}
}

/// A read-only stream that is fed by hand. Cloning yields a handle to the same stream.
#[derive(Clone, Default)]
pub struct Relay(Rc<Observers>);

impl Relay {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn emit(&self, value: impl Into<Value>) {
		self.0.notify(&Notification::Next(value.into()));
	}

	pub fn fail(&self, reason: impl Into<Failure>) {
		self.0.notify(&Notification::Error(reason.into()));
	}

	pub fn complete(&self) {
		self.0.notify(&Notification::Complete);
	}

	/// How many observers are currently subscribed.
	#[must_use]
	pub fn observer_count(&self) -> usize {
		self.0.len()
	}
}

impl Observable for Relay {
	fn subscribe(&self, observer: Observer) -> Teardown {
		self.0.subscribe(observer)
	}
}

impl From<Relay> for Value {
	fn from(relay: Relay) -> Self {
		Value::Stream(Rc::new(relay))
	}
}

/// A stream that also accepts pushed values, which it re-emits.
#[derive(Clone, Default)]
pub struct Subject(Relay);

impl Subject {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn observer_count(&self) -> usize {
		self.0.observer_count()
	}

	pub fn complete(&self) {
		self.0.complete();
	}
}

impl Writable for Subject {
	fn push(&self, value: Value) {
		self.0.emit(value);
	}
}

impl Observable for Subject {
	fn subscribe(&self, observer: Observer) -> Teardown {
		self.0.subscribe(observer)
	}

	fn writable(&self) -> Option<&dyn Writable> {
		Some(self)
	}
}

impl From<Subject> for Value {
	fn from(subject: Subject) -> Self {
		Value::Stream(Rc::new(subject))
	}
}

/// A writable stream with a current value.
///
/// Subscribing doesn't replay the current value, since it can be read synchronously.
#[derive(Clone)]
pub struct State {
	current: Rc<RefCell<Value>>,
	relay: Relay,
}

impl State {
	pub fn new(initial: impl Into<Value>) -> Self {
		Self {
			current: Rc::new(RefCell::new(initial.into())),
			relay: Relay::new(),
		}
	}

	#[must_use]
	pub fn get(&self) -> Value {
		self.current.borrow().clone()
	}

	/// Stores and emits `value`.
	pub fn set(&self, value: impl Into<Value>) {
		let value = value.into();
		*self.current.borrow_mut() = value.clone();
		self.relay.emit(value);
	}

	#[must_use]
	pub fn observer_count(&self) -> usize {
		self.relay.observer_count()
	}
}

impl Writable for State {
	fn push(&self, value: Value) {
		self.set(value);
	}
}

impl Observable for State {
	fn subscribe(&self, observer: Observer) -> Teardown {
		self.relay.subscribe(observer)
	}

	fn current(&self) -> Option<Value> {
		Some(self.get())
	}

	fn writable(&self) -> Option<&dyn Writable> {
		Some(self)
	}
}

impl From<State> for Value {
	fn from(state: State) -> Self {
		Value::Stream(Rc::new(state))
	}
}
