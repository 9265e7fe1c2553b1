//! The interpolated value model, and the capability contracts that reactive values implement.
//!
//! The engine never defines how deferred values or streams *work*.
//! It only consumes the registration points described by [`Deferred`], [`Observable`] and [`Writable`].

use crate::host::Listener;
use core::{
	any::Any,
	cell::RefCell,
	fmt::{self, Debug, Display, Formatter},
};
use std::rc::Rc;
use thiserror::Error;

/// A raw value interpolated into a template position.
///
/// Cloning is cheap: all heap data is reference-counted.
#[derive(Clone)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	Text(Rc<str>),
	Function(Handler),
	Event(Event),
	Array(Rc<[Value]>),
	Object(Object),
	Deferred(Rc<dyn Deferred>),
	Stream(Rc<dyn Observable>),
	/// An [`ExplicitSink`] wrapper overriding implicit sink selection.
	Sink(Rc<ExplicitSink>),
	/// Anything else that can at least be displayed.
	///
	/// These values match no known shape and are coerced to text.
	Other(Rc<dyn Display>),
}

impl Value {
	#[must_use]
	pub fn text(text: impl Into<Rc<str>>) -> Self {
		Self::Text(text.into())
	}

	#[must_use]
	pub fn function(handler: impl Fn(&Event) + 'static) -> Self {
		Self::Function(Handler::new(handler))
	}

	#[must_use]
	pub fn deferred(deferred: impl Deferred + 'static) -> Self {
		Self::Deferred(Rc::new(deferred))
	}

	#[must_use]
	pub fn stream(stream: impl Observable + 'static) -> Self {
		Self::Stream(Rc::new(stream))
	}

	pub fn array<I>(items: I) -> Self
	where
		I: IntoIterator,
		I::Item: Into<Value>,
	{
		Self::Array(items.into_iter().map(Into::into).collect())
	}

	#[must_use]
	pub fn other(value: impl Display + 'static) -> Self {
		Self::Other(Rc::new(value))
	}

	/// Whether this value counts as "set" for boolean attributes.
	#[must_use]
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::Null => false,
			Value::Bool(bool) => *bool,
			Value::Number(number) => *number != 0.0 && !number.is_nan(),
			Value::Text(text) => !text.is_empty(),
			_ => true,
		}
	}

	/// A short, content-free name for this value's shape, for diagnostics.
	#[must_use]
	pub fn shape_name(&self) -> &'static str {
		match self {
			Value::Null => "null",
			Value::Bool(_) => "boolean",
			Value::Number(_) => "number",
			Value::Text(_) => "text",
			Value::Function(_) => "function",
			Value::Event(_) => "event",
			Value::Array(_) => "array",
			Value::Object(_) => "object",
			Value::Deferred(_) => "deferred",
			Value::Stream(_) => "stream",
			Value::Sink(_) => "explicit sink",
			Value::Other(_) => "other",
		}
	}
}

/// Scalars compare by value, everything reactive or callable by identity.
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			#[allow(clippy::float_cmp)]
			(Value::Number(a), Value::Number(b)) => a == b,
			(Value::Text(a), Value::Text(b)) => a == b,
			(Value::Function(a), Value::Function(b)) => a == b,
			(Value::Event(a), Value::Event(b)) => a.name == b.name,
			(Value::Array(a), Value::Array(b)) => a == b,
			(Value::Object(a), Value::Object(b)) => a == b,
			(Value::Deferred(a), Value::Deferred(b)) => same(a, b),
			(Value::Stream(a), Value::Stream(b)) => same(a, b),
			(Value::Sink(a), Value::Sink(b)) => a.kind == b.kind && a.payload == b.payload,
			(Value::Other(a), Value::Other(b)) => same(a, b),
			_ => false,
		}
	}
}

pub(crate) fn same<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
	Rc::as_ptr(a).cast::<()>() == Rc::as_ptr(b).cast::<()>()
}

impl Debug for Value {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("Null"),
			Value::Bool(bool) => f.debug_tuple("Bool").field(bool).finish(),
			Value::Number(number) => f.debug_tuple("Number").field(number).finish(),
			Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
			Value::Function(handler) => handler.fmt(f),
			Value::Event(event) => event.fmt(f),
			Value::Array(items) => f.debug_tuple("Array").field(items).finish(),
			Value::Object(object) => object.fmt(f),
			Value::Deferred(deferred) => write!(f, "Deferred({:p})", Rc::as_ptr(deferred).cast::<()>()),
			Value::Stream(stream) => write!(f, "Stream({:p})", Rc::as_ptr(stream).cast::<()>()),
			Value::Sink(sink) => sink.fmt(f),
			Value::Other(other) => write!(f, "Other({})", other),
		}
	}
}

impl From<&str> for Value {
	fn from(text: &str) -> Self {
		Self::Text(text.into())
	}
}

impl From<String> for Value {
	fn from(text: String) -> Self {
		Self::Text(text.into())
	}
}

impl From<Rc<str>> for Value {
	fn from(text: Rc<str>) -> Self {
		Self::Text(text)
	}
}

impl From<bool> for Value {
	fn from(bool: bool) -> Self {
		Self::Bool(bool)
	}
}

impl From<f64> for Value {
	fn from(number: f64) -> Self {
		Self::Number(number)
	}
}

macro_rules! number_from {
	($($ty:ty),*) => {$(
		impl From<$ty> for Value {
			fn from(number: $ty) -> Self {
				Self::Number(f64::from(number))
			}
		}
	)*};
}
number_from!(f32, i8, i16, i32, u8, u16, u32);

impl From<Object> for Value {
	fn from(object: Object) -> Self {
		Self::Object(object)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Self::Array(items.into())
	}
}

impl From<Handler> for Value {
	fn from(handler: Handler) -> Self {
		Self::Function(handler)
	}
}

impl From<Event> for Value {
	fn from(event: Event) -> Self {
		Self::Event(event)
	}
}

impl From<ExplicitSink> for Value {
	fn from(sink: ExplicitSink) -> Self {
		Self::Sink(Rc::new(sink))
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

/// An ordered keyed mapping without reactive capabilities of its own.
///
/// Insertion order is preserved, and re-inserting a key keeps its original position.
#[derive(Clone, Default, PartialEq)]
pub struct Object(Vec<(Rc<str>, Value)>);

impl Object {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns the replaced value, if any.
	pub fn insert(&mut self, key: impl Into<Rc<str>>, value: impl Into<Value>) -> Option<Value> {
		let key = key.into();
		let value = value.into();
		match self.0.iter_mut().find(|(k, _)| *k == key) {
			Some((_, slot)) => Some(core::mem::replace(slot, value)),
			None => {
				self.0.push((key, value));
				None
			}
		}
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<&Value> {
		self.0.iter().find(|(k, _)| &**k == key).map(|(_, v)| v)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.0.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&Rc<str>, &Value)> {
		self.0.iter().map(|(k, v)| (k, v))
	}
}

impl Debug for Object {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_map().entries(self.iter()).finish()
	}
}

impl<K: Into<Rc<str>>, V: Into<Value>> FromIterator<(K, V)> for Object {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut object = Object::new();
		for (key, value) in iter {
			object.insert(key, value);
		}
		object
	}
}

/// Builds an [`Object`] from `key => value` pairs.
///
/// ```
/// let book = phloem::object! { "author" => "Stephen King", "year" => 1987 };
/// assert_eq!(book.len(), 2);
/// ```
#[macro_export]
macro_rules! object {
	($($key:expr => $value:expr),* $(,)?) => {{
		#[allow(unused_mut)]
		let mut object = $crate::value::Object::new();
		$(object.insert($key, $value);)*
		object
	}};
}

/// A plain event handler.
///
/// Handlers compare by identity.
#[derive(Clone)]
pub struct Handler(Listener);

impl Handler {
	pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
		Self(Rc::new(handler))
	}

	pub fn call(&self, event: &Event) {
		(self.0)(event);
	}

	pub(crate) fn listener(&self) -> Listener {
		self.0.clone()
	}
}

impl PartialEq for Handler {
	fn eq(&self, other: &Self) -> bool {
		same(&self.0, &other.0)
	}
}

impl Debug for Handler {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Handler({:p})", Rc::as_ptr(&self.0).cast::<()>())
	}
}

/// An event occurrence, as passed to handlers and pushed into writable streams.
#[derive(Clone)]
pub struct Event {
	name: Rc<str>,
	native: Option<Rc<dyn Any>>,
}

impl Event {
	pub fn new(name: impl Into<Rc<str>>) -> Self {
		Self { name: name.into(), native: None }
	}

	/// Wraps a host-specific event (or target) object.
	pub fn with_native(name: impl Into<Rc<str>>, native: impl Any) -> Self {
		Self {
			name: name.into(),
			native: Some(Rc::new(native)),
		}
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn native<T: Any>(&self) -> Option<&T> {
		self.native.as_deref().and_then(|native| native.downcast_ref::<T>())
	}
}

impl Debug for Event {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Event").field("name", &self.name).field("native", &self.native.is_some()).finish()
	}
}

/// The failure reason of a rejected deferred value or a failed stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Failure(Rc<str>);

impl Failure {
	pub fn new(message: impl Into<Rc<str>>) -> Self {
		Self(message.into())
	}

	#[must_use]
	pub fn message(&self) -> &str {
		&self.0
	}
}

impl From<&str> for Failure {
	fn from(message: &str) -> Self {
		Self::new(message)
	}
}

impl From<String> for Failure {
	fn from(message: String) -> Self {
		Self::new(message)
	}
}

/// The continuation registered with a [`Deferred`].
pub type Settle = Box<dyn FnOnce(Result<Value, Failure>)>;

/// A value that is resolved at most once, to either a value or a [`Failure`].
pub trait Deferred {
	/// Registers `settle`, which must be called at most once.
	///
	/// It may be called synchronously if the value is already settled.
	fn on_settled(&self, settle: Settle);
}

/// A single notification from an [`Observable`].
///
/// `Error` and `Complete` are terminal.
#[derive(Debug, Clone)]
pub enum Notification {
	Next(Value),
	Error(Failure),
	Complete,
}

/// The receiving end handed to [`Observable::subscribe`].
#[derive(Clone)]
pub struct Observer(Rc<dyn Fn(Notification)>);

impl Observer {
	pub fn new(observer: impl Fn(Notification) + 'static) -> Self {
		Self(Rc::new(observer))
	}

	pub fn notify(&self, notification: Notification) {
		(self.0)(notification);
	}

	pub fn next(&self, value: Value) {
		self.notify(Notification::Next(value));
	}

	pub fn error(&self, reason: Failure) {
		self.notify(Notification::Error(reason));
	}

	pub fn complete(&self) {
		self.notify(Notification::Complete);
	}
}

impl Debug for Observer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		write!(f, "Observer({:p})", Rc::as_ptr(&self.0).cast::<()>())
	}
}

/// The teardown procedure returned from a subscription.
///
/// Running it more than once is a no-op.
#[must_use]
pub struct Teardown(RefCell<Option<Box<dyn FnOnce()>>>);

impl Teardown {
	pub fn new(teardown: impl FnOnce() + 'static) -> Self {
		Self(RefCell::new(Some(Box::new(teardown))))
	}

	pub fn noop() -> Self {
		Self(RefCell::new(None))
	}

	pub fn run(&self) {
		let teardown = self.0.borrow_mut().take();
		if let Some(teardown) = teardown {
			teardown();
		}
	}
}

impl Debug for Teardown {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Teardown").field(&self.0.borrow().is_some()).finish()
	}
}

/// A source that emits zero or more values to registered observers.
///
/// The two optional capabilities are what distinguishes stateful and writable streams.
pub trait Observable {
	fn subscribe(&self, observer: Observer) -> Teardown;

	/// The synchronously readable current value, for stateful streams.
	fn current(&self) -> Option<Value> {
		None
	}

	/// The push-acceptance capability, for writable streams.
	fn writable(&self) -> Option<&dyn Writable> {
		None
	}
}

pub trait Writable {
	fn push(&self, value: Value);
}

/// A marker wrapper that selects a registered explicit sink by name for one binding.
///
/// See [`sink`](`crate::sink`) for constructors of the known kinds.
#[derive(Debug, Clone)]
pub struct ExplicitSink {
	kind: Rc<str>,
	payload: Value,
}

impl ExplicitSink {
	pub fn new(kind: impl Into<Rc<str>>, payload: impl Into<Value>) -> Self {
		Self {
			kind: kind.into(),
			payload: payload.into(),
		}
	}

	#[must_use]
	pub fn kind(&self) -> &Rc<str> {
		&self.kind
	}

	#[must_use]
	pub fn payload(&self) -> &Value {
		&self.payload
	}
}

/// Formats page content only with the `dangerous-logging` feature.
pub(crate) struct Redacted<'a, T: ?Sized>(pub(crate) &'a T);

impl<T: ?Sized + Debug> Debug for Redacted<'_, T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		if cfg!(feature = "dangerous-logging") {
			self.0.fmt(f)
		} else {
			f.write_str("<redacted>")
		}
	}
}
