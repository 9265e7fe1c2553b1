//! Run-time shape classification of interpolated values, and string coercion of static ones.

use crate::value::{Value, Redacted};
use std::rc::Rc;
use tracing::{debug, warn};

/// The shape of an interpolated value, as far as binding is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
	Static,
	Deferred,
	Stream,
	StatefulStream,
	WritableStream,
	/// Carries the requested sink kind's name, which is only checked at bind time.
	ExplicitSink(Rc<str>),
	Array,
	PlainObject,
}

impl Tag {
	/// Whether values of this shape arrive later rather than being applied right away.
	#[must_use]
	pub fn is_async(&self) -> bool {
		matches!(self, Tag::Deferred | Tag::Stream | Tag::StatefulStream | Tag::WritableStream)
	}
}

/// Classifies `value` by checking its capabilities in fixed priority order.
///
/// A stream that is both stateful and writable classifies as [`Tag::StatefulStream`].
/// Event positions still use its push capability.
#[must_use]
pub fn classify(value: &Value) -> Tag {
	match value {
		Value::Sink(sink) => Tag::ExplicitSink(sink.kind().clone()),
		Value::Stream(stream) if stream.current().is_some() => Tag::StatefulStream,
		Value::Stream(stream) if stream.writable().is_some() => Tag::WritableStream,
		Value::Stream(_) => Tag::Stream,
		Value::Deferred(_) => Tag::Deferred,
		Value::Array(_) => Tag::Array,
		Value::Object(_) => Tag::PlainObject,
		Value::Other(other) => {
			debug!("Ambiguous value {:?} classified as static; it will be coerced to text.", Redacted(&other.to_string()));
			Tag::Static
		}
		Value::Null | Value::Bool(_) | Value::Number(_) | Value::Text(_) | Value::Function(_) | Value::Event(_) => Tag::Static,
	}
}

/// A two-element array whose first element is available right away and whose second arrives later
/// is a placeholder/replacement pair. Anything else is concatenated.
#[must_use]
pub fn is_composite(items: &[Value]) -> bool {
	matches!(items, [first, second] if !classify(first).is_async() && classify(second).is_async())
}

fn number(number: f64) -> Rc<str> {
	number.to_string().into()
}

/// Renders a static value as child content.
///
/// Returns [`None`] for shapes that have no textual form.
pub(crate) fn render_content(value: &Value) -> Option<Rc<str>> {
	Some(match value {
		Value::Null => "".into(),
		Value::Bool(true) => "true".into(),
		Value::Bool(false) => "false".into(),
		Value::Number(n) => number(*n),
		Value::Text(text) => text.clone(),
		Value::Other(other) => other.to_string().into(),
		Value::Array(items) => {
			let mut rendered = String::new();
			for item in items.iter() {
				rendered.push_str(&render_content(item)?);
			}
			rendered.into()
		}
		Value::Function(_) | Value::Event(_) | Value::Object(_) | Value::Deferred(_) | Value::Stream(_) | Value::Sink(_) => return None,
	})
}

/// Renders a static value as an attribute (or style property) value.
///
/// `Some(None)` means the attribute should be absent.
#[allow(clippy::option_option)]
pub(crate) fn render_attribute(value: &Value) -> Option<Option<Rc<str>>> {
	match value {
		Value::Null | Value::Bool(false) => Some(None),
		Value::Bool(true) => Some(Some("".into())),
		value => render_content(value).map(Some),
	}
}

/// Renders one element of a concatenated array. Unrenderable elements become empty.
pub(crate) fn render_part(value: &Value) -> Rc<str> {
	render_content(value).unwrap_or_else(|| {
		warn!("Can't render a {} value as part of a concatenation; rendering it as empty.", value.shape_name());
		"".into()
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		object,
		source::{Deferral, Relay, State, Subject},
		sink,
	};

	#[test]
	fn scalars_are_static() {
		for value in [Value::Null, true.into(), 5.into(), "text".into(), Value::function(|_| ()), Value::other(7u64)] {
			assert_eq!(classify(&value), Tag::Static);
		}
	}

	#[test]
	fn capabilities_in_priority_order() {
		assert_eq!(classify(&sink::inner_html(State::new("x"))), Tag::ExplicitSink("InnerHTML".into()));
		// Stateful outranks writable.
		assert_eq!(classify(&State::new(1).into()), Tag::StatefulStream);
		assert_eq!(classify(&Subject::new().into()), Tag::WritableStream);
		assert_eq!(classify(&Relay::new().into()), Tag::Stream);
		assert_eq!(classify(&Deferral::new().into()), Tag::Deferred);
		assert_eq!(classify(&Value::array(["a", "b"])), Tag::Array);
		assert_eq!(classify(&object! { "a" => 1 }.into()), Tag::PlainObject);
	}

	#[test]
	fn composite_pairs() {
		assert!(is_composite(&[Value::from("loading"), Relay::new().into()]));
		assert!(is_composite(&[Value::from("loading"), Deferral::new().into()]));
		assert!(!is_composite(&[Value::from("a"), Value::from("b")]));
		assert!(!is_composite(&[Value::from("a"), Relay::new().into(), Value::from("c")]));
		assert!(!is_composite(&[Deferral::new().into(), Relay::new().into()]));
	}

	#[test]
	fn coercion() {
		assert_eq!(render_content(&1987.into()).as_deref(), Some("1987"));
		assert_eq!(render_content(&0.5.into()).as_deref(), Some("0.5"));
		assert_eq!(render_content(&Value::array(["a", "b"])).as_deref(), Some("ab"));
		assert_eq!(render_content(&Value::other(42u64)).as_deref(), Some("42"));
		assert_eq!(render_content(&object! {}.into()), None);
		assert_eq!(render_attribute(&false.into()), Some(None));
		assert_eq!(render_attribute(&true.into()), Some(Some("".into())));
	}
}
