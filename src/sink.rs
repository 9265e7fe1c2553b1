//! Binding positions and the sink registry.
//!
//! A sink turns a resolved value into tree mutations at one position.
//! The registry is a fixed table: implicit sinks are selected by position category,
//! explicit ones by name through an [`ExplicitSink`] wrapper.

use crate::{
	classify::{render_attribute, render_content, Tag},
	engine::BindingId,
	error::BindError,
	event::ListenerRef,
	host::{HostTree, Listener},
	merge::{AppliedKey, Partial},
	value::{ExplicitSink, Redacted, Value},
};
use core::fmt::{self, Display, Formatter};
use std::rc::Rc;
use tracing::trace;

/// Attribute names with this prefix are engine-private and never reach the host tree.
pub const RESERVED_PREFIX: &str = "bind:";

/// Where in the markup an interpolated value lands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Position {
	/// The content of the element.
	Child,
	/// A named attribute. Names are routed further by convention, see [`PositionCategory`].
	Attribute(Rc<str>),
	Style,
	StyleProperty(Rc<str>),
	Class,
	/// The live `value` of an input-like element.
	Value,
	/// A native event, by bare name (`"click"`).
	Event(Rc<str>),
	/// `...value`: a whole object's worth of attributes, classes, styles and listeners.
	Spread,
}

impl Position {
	pub fn attribute(name: impl Into<Rc<str>>) -> Self {
		Self::Attribute(name.into())
	}

	pub fn style_property(property: impl Into<Rc<str>>) -> Self {
		Self::StyleProperty(property.into())
	}

	pub fn event(name: impl Into<Rc<str>>) -> Self {
		Self::Event(name.into())
	}
}

/// The routing category of a position, after naming conventions have been applied.
///
/// `on*` attributes are [`Event`](`PositionCategory::Event`)s,
/// `style`, `class` and (on input-like elements) `value` attributes have their own categories,
/// and [`RESERVED_PREFIX`]ed names are [`Reserved`](`PositionCategory::Reserved`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionCategory {
	Child,
	Attribute,
	Style,
	StyleProperty,
	Class,
	Value,
	Event,
	Spread,
	Reserved,
}

impl Display for PositionCategory {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			PositionCategory::Child => "child",
			PositionCategory::Attribute => "attribute",
			PositionCategory::Style => "style",
			PositionCategory::StyleProperty => "style property",
			PositionCategory::Class => "class",
			PositionCategory::Value => "value",
			PositionCategory::Event => "event",
			PositionCategory::Spread => "spread",
			PositionCategory::Reserved => "reserved",
		})
	}
}

/// The engine-private positions. This set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reserved {
	/// `bind:mount`: fires once after the element is attached to the live tree.
	Mount,
}

impl Reserved {
	/// # Errors
	///
	/// Iff `name` is in the reserved namespace but isn't one of the known names.
	pub fn parse(name: &str) -> Result<Option<Self>, BindError> {
		match name.strip_prefix(RESERVED_PREFIX) {
			None => Ok(None),
			Some("mount") => Ok(Some(Reserved::Mount)),
			Some(_) => Err(BindError::UnknownReservedName { name: name.into() }),
		}
	}
}

/// A fully routed position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
	Content,
	Attribute(Rc<str>),
	Style,
	StyleProperty(Rc<str>),
	Class,
	Value,
	Event(Rc<str>),
	Spread,
	Mount,
}

impl Target {
	/// Applies the boundary naming conventions. Reserved names are checked first.
	pub(crate) fn resolve<H: HostTree>(host: &H, node: &H::Node, position: &Position) -> Result<Self, BindError> {
		Ok(match position {
			Position::Child => Target::Content,
			Position::Attribute(name) => {
				if let Some(reserved) = Reserved::parse(name)? {
					return Ok(match reserved {
						Reserved::Mount => Target::Mount,
					});
				}
				if let Some(event) = name.strip_prefix("on") {
					Target::Event(event.into())
				} else {
					match &**name {
						"style" => Target::Style,
						"class" => Target::Class,
						"value" if host.is_input_like(node) => Target::Value,
						_ => Target::Attribute(name.clone()),
					}
				}
			}
			Position::Style => Target::Style,
			Position::StyleProperty(property) => Target::StyleProperty(property.clone()),
			Position::Class => Target::Class,
			Position::Value => Target::Value,
			Position::Event(event) => Target::Event(event.clone()),
			Position::Spread => Target::Spread,
		})
	}

	pub(crate) fn category(&self) -> PositionCategory {
		match self {
			Target::Content => PositionCategory::Child,
			Target::Attribute(_) => PositionCategory::Attribute,
			Target::Style => PositionCategory::Style,
			Target::StyleProperty(_) => PositionCategory::StyleProperty,
			Target::Class => PositionCategory::Class,
			Target::Value => PositionCategory::Value,
			Target::Event(_) => PositionCategory::Event,
			Target::Spread => PositionCategory::Spread,
			Target::Mount => PositionCategory::Reserved,
		}
	}
}

/// How many values a sink takes per application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
	/// One scalar. Arrays are concatenated into one.
	Single,
	/// A structured value (object or name list) that is applied as a set.
	Multi,
	/// Decided per value.
	Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkKind {
	Content,
	Text,
	InnerHtml,
	AppendHtml,
	StyleScalar,
	StyleObject,
	StyleProperty,
	Value,
	Attribute,
	Toggle,
	Spread,
	Dataset,
	Class,
	Event,
	Mount,
}

impl SinkKind {
	/// Whether this sink contributes to the element's merged attribute state.
	pub(crate) fn merges(self) -> bool {
		matches!(self, SinkKind::StyleObject | SinkKind::Spread | SinkKind::Dataset | SinkKind::Class)
	}

	pub(crate) fn wires_listeners(self) -> bool {
		matches!(self, SinkKind::Event | SinkKind::Mount)
	}
}

/// An immutable registry entry.
#[derive(Debug)]
pub struct SinkDescriptor {
	name: &'static str,
	explicit: bool,
	arity: Arity,
	positions: &'static [PositionCategory],
	idempotent: bool,
	pub(crate) kind: SinkKind,
}

impl SinkDescriptor {
	const fn implicit(name: &'static str, kind: SinkKind, arity: Arity, positions: &'static [PositionCategory]) -> Self {
		Self {
			name,
			explicit: false,
			arity,
			positions,
			idempotent: true,
			kind,
		}
	}

	const fn explicit(name: &'static str, kind: SinkKind, arity: Arity, positions: &'static [PositionCategory]) -> Self {
		Self {
			name,
			explicit: true,
			arity,
			positions,
			idempotent: true,
			kind,
		}
	}

	const fn accumulating(mut self) -> Self {
		self.idempotent = false;
		self
	}

	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	#[must_use]
	pub fn is_explicit(&self) -> bool {
		self.explicit
	}

	#[must_use]
	pub fn arity(&self) -> Arity {
		self.arity
	}

	#[must_use]
	pub fn positions(&self) -> &'static [PositionCategory] {
		self.positions
	}

	/// Whether applying the same rendering twice is the same as applying it once.
	#[must_use]
	pub fn is_idempotent(&self) -> bool {
		self.idempotent
	}

	/// The kind that actually applies `value`: style positions take both strings and objects.
	pub(crate) fn kind_for(&self, value: &Value) -> SinkKind {
		match (self.kind, value) {
			(SinkKind::StyleScalar, Value::Object(_)) => SinkKind::StyleObject,
			(kind, _) => kind,
		}
	}

	/// Bind-time shape check. Values that arrive later are checked on arrival instead.
	///
	/// Merging sinks check values the same way they will merge them, array elements included.
	pub(crate) fn accepts(&self, tag: &Tag, value: &Value) -> bool {
		use SinkKind as K;
		let kind = self.kind_for(value);
		match tag {
			Tag::Deferred | Tag::Stream | Tag::StatefulStream | Tag::WritableStream => true,
			Tag::ExplicitSink(_) => false,
			_ if kind.merges() => Partial::for_sink(kind, value).is_some(),
			Tag::Array => !matches!(self.kind, K::Event | K::Mount | K::Toggle),
			Tag::PlainObject => false,
			Tag::Static => match value {
				Value::Null => true,
				Value::Function(_) => self.kind.wires_listeners(),
				Value::Event(_) => false,
				_ => !matches!(self.kind, K::Event | K::Mount | K::Spread | K::Dataset | K::StyleObject),
			},
		}
	}
}

use PositionCategory as P;

static REGISTRY: [SinkDescriptor; 16] = [
	SinkDescriptor::implicit("content", SinkKind::Content, Arity::Runtime, &[P::Child]),
	SinkDescriptor::implicit("style", SinkKind::StyleScalar, Arity::Single, &[P::Style]),
	SinkDescriptor::implicit("style-object", SinkKind::StyleObject, Arity::Multi, &[P::Style]),
	SinkDescriptor::implicit("style-property", SinkKind::StyleProperty, Arity::Single, &[P::StyleProperty]),
	SinkDescriptor::implicit("value", SinkKind::Value, Arity::Single, &[P::Value]),
	SinkDescriptor::implicit("attribute", SinkKind::Attribute, Arity::Single, &[P::Attribute]),
	SinkDescriptor::implicit("attribute-object", SinkKind::Spread, Arity::Multi, &[P::Spread]),
	SinkDescriptor::implicit("class", SinkKind::Class, Arity::Multi, &[P::Class]),
	SinkDescriptor::implicit("event", SinkKind::Event, Arity::Runtime, &[P::Event]),
	SinkDescriptor::implicit("mount", SinkKind::Mount, Arity::Runtime, &[P::Reserved]),
	SinkDescriptor::explicit("Text", SinkKind::Text, Arity::Single, &[P::Child]),
	SinkDescriptor::explicit("InnerHTML", SinkKind::InnerHtml, Arity::Single, &[P::Child]),
	SinkDescriptor::explicit("AppendHTML", SinkKind::AppendHtml, Arity::Single, &[P::Child]).accumulating(),
	SinkDescriptor::explicit("Dataset", SinkKind::Dataset, Arity::Multi, &[P::Spread]),
	SinkDescriptor::explicit("Style", SinkKind::StyleObject, Arity::Multi, &[P::Spread, P::Style]),
	SinkDescriptor::explicit("Toggle", SinkKind::Toggle, Arity::Single, &[P::Attribute]),
];

/// All registered sinks, implicit defaults first.
#[must_use]
pub fn registry() -> &'static [SinkDescriptor] {
	&REGISTRY
}

/// Selects the sink for a position category, optionally overridden by an explicit kind name.
///
/// # Errors
///
/// - [`BindError::UnknownSink`] iff `explicit` names no registered explicit sink
///   (or, with no `explicit`, if the category had no implicit default).
/// - [`BindError::SinkPositionMismatch`] iff the explicit sink isn't valid for `category`.
pub fn lookup(category: PositionCategory, explicit: Option<&str>) -> Result<&'static SinkDescriptor, BindError> {
	match explicit {
		Some(kind) => {
			let descriptor = REGISTRY
				.iter()
				.find(|descriptor| descriptor.explicit && descriptor.name == kind)
				.ok_or_else(|| BindError::UnknownSink { kind: kind.into() })?;
			if descriptor.positions.contains(&category) {
				Ok(descriptor)
			} else {
				Err(BindError::SinkPositionMismatch {
					sink: descriptor.name,
					position: category,
				})
			}
		}
		None => REGISTRY
			.iter()
			.find(|descriptor| !descriptor.explicit && descriptor.positions.contains(&category))
			.ok_or_else(|| BindError::UnknownSink {
				kind: category.to_string().into(),
			}),
	}
}

fn explicit(kind: &'static str, payload: impl Into<Value>) -> Value {
	ExplicitSink::new(kind, payload).into()
}

/// Renders child content as text rather than markup.
pub fn text(payload: impl Into<Value>) -> Value {
	explicit("Text", payload)
}

/// Renders child content as markup, replacing what was there.
pub fn inner_html(payload: impl Into<Value>) -> Value {
	explicit("InnerHTML", payload)
}

/// Appends each value to the child content as markup.
pub fn append_html(payload: impl Into<Value>) -> Value {
	explicit("AppendHTML", payload)
}

/// Spreads an object's keys as `data-*` attributes.
pub fn dataset(payload: impl Into<Value>) -> Value {
	explicit("Dataset", payload)
}

/// Applies an object's keys as inline style properties.
pub fn style(payload: impl Into<Value>) -> Value {
	explicit("Style", payload)
}

/// Sets an empty boolean attribute while the value is truthy and removes it otherwise.
pub fn toggle(payload: impl Into<Value>) -> Value {
	explicit("Toggle", payload)
}

/// Where a newly added native listener's id needs to be recorded.
#[derive(Debug, Clone)]
pub(crate) enum ListenerSlot {
	Binding(BindingId, ListenerRef),
	Merged(AppliedKey, ListenerRef),
}

/// A single planned tree mutation.
pub(crate) enum Op<H: HostTree> {
	SetAttribute(Rc<str>, Rc<str>),
	RemoveAttribute(Rc<str>),
	SetText(Rc<str>),
	SetMarkup(Rc<str>),
	AppendMarkup(Rc<str>),
	SetStyle(Rc<str>, Rc<str>),
	RemoveStyle(Rc<str>),
	SetValue(Rc<str>),
	Listen { event: Rc<str>, listener: Listener, slot: ListenerSlot },
	Unlisten { event: Rc<str>, id: H::ListenerId },
}

/// A newly registered listener that still needs to be recorded.
pub(crate) struct Registered<H: HostTree> {
	pub(crate) slot: ListenerSlot,
	pub(crate) event: Rc<str>,
	pub(crate) id: H::ListenerId,
}

impl<H: HostTree> Op<H> {
	pub(crate) fn perform(self, host: &H, node: &H::Node) -> Option<Registered<H>> {
		match self {
			Op::SetAttribute(name, value) => {
				trace!(?node, %name, value = ?Redacted(&value), "Setting attribute.");
				host.set_attribute(node, &name, &value);
			}
			Op::RemoveAttribute(name) => {
				trace!(?node, %name, "Removing attribute.");
				host.remove_attribute(node, &name);
			}
			Op::SetText(text) => {
				trace!(?node, text = ?Redacted(&text), "Setting text content.");
				host.set_text_content(node, &text);
			}
			Op::SetMarkup(markup) => {
				trace!(?node, markup = ?Redacted(&markup), "Setting markup.");
				host.set_inner_markup(node, &markup);
			}
			Op::AppendMarkup(markup) => {
				trace!(?node, markup = ?Redacted(&markup), "Appending markup.");
				host.append_markup(node, &markup);
			}
			Op::SetStyle(property, value) => {
				trace!(?node, %property, value = ?Redacted(&value), "Setting style property.");
				host.set_style_property(node, &property, &value);
			}
			Op::RemoveStyle(property) => {
				trace!(?node, %property, "Removing style property.");
				host.remove_style_property(node, &property);
			}
			Op::SetValue(value) => {
				trace!(?node, value = ?Redacted(&value), "Setting value.");
				host.set_value(node, &value);
			}
			Op::Listen { event, listener, slot } => {
				trace!(?node, %event, "Adding event listener.");
				let id = host.add_event_listener(node, &event, listener);
				return Some(Registered { slot, event, id });
			}
			Op::Unlisten { event, id } => {
				trace!(?node, %event, ?id, "Removing event listener.");
				host.remove_event_listener(node, &event, id);
			}
		}
		None
	}
}

/// What an idempotent sink last rendered. [`None`] means "absent".
pub(crate) type Snapshot = Option<Rc<str>>;

/// Plans the mutation of a sink that writes exactly one thing.
///
/// Returns [`None`] iff the value has no rendering for this sink.
pub(crate) fn plan_direct<H: HostTree>(kind: SinkKind, target: &Target, value: &Value) -> Option<(Snapshot, Op<H>)> {
	fn attribute<H: HostTree>(name: &Rc<str>, rendered: Option<Rc<str>>) -> (Snapshot, Op<H>) {
		match rendered {
			Some(text) => (Some(text.clone()), Op::SetAttribute(name.clone(), text)),
			None => (None, Op::RemoveAttribute(name.clone())),
		}
	}

	Some(match (kind, target) {
		(SinkKind::Content | SinkKind::InnerHtml, _) => {
			let markup = render_content(value)?;
			(Some(markup.clone()), Op::SetMarkup(markup))
		}
		(SinkKind::Text, _) => {
			let text = render_content(value)?;
			(Some(text.clone()), Op::SetText(text))
		}
		(SinkKind::AppendHtml, _) => {
			let markup = render_content(value)?;
			(Some(markup.clone()), Op::AppendMarkup(markup))
		}
		(SinkKind::Attribute, Target::Attribute(name)) => attribute(name, render_attribute(value)?),
		(SinkKind::Toggle, Target::Attribute(name)) => {
			render_attribute(value)?;
			attribute(name, value.is_truthy().then(|| "".into()))
		}
		(SinkKind::StyleScalar, _) => attribute(&"style".into(), render_attribute(value)?),
		(SinkKind::StyleProperty, Target::StyleProperty(property)) => match render_attribute(value)? {
			Some(text) => (Some(text.clone()), Op::SetStyle(property.clone(), text)),
			None => (None, Op::RemoveStyle(property.clone())),
		},
		(SinkKind::Value, _) => {
			let text = render_attribute(value)?.unwrap_or_else(|| "".into());
			(Some(text.clone()), Op::SetValue(text))
		}
		_ => return None,
	})
}
