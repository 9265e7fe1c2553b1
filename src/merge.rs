//! Per-element merging of attribute-like objects from several independent sources.
//!
//! Sources are kept in declaration order. The merged map is their right-biased key union,
//! and only its difference to what was applied last is written to the tree.

use crate::{
	classify::render_attribute,
	engine::BindingId,
	event::ListenerRef,
	host::HostTree,
	sink::{ListenerSlot, Op, SinkKind, RESERVED_PREFIX},
	value::{Object, Value},
};
use core::mem;
use hashbrown::{hash_map::Entry, HashMap, HashSet};
use std::rc::Rc;
use tracing::{trace, trace_span, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum MergeKey {
	Attribute(Rc<str>),
	/// Class names merge individually.
	Class(Rc<str>),
	Style(Rc<str>),
	Listener(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MergeValue {
	/// [`None`] is an explicit "absent", which overrides earlier sources.
	Text(Option<Rc<str>>),
	Flag(bool),
	Listener(Option<ListenerRef>),
}

/// The last-resolved contribution of one source.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Partial(Vec<(MergeKey, MergeValue)>);

impl Partial {
	fn set(&mut self, key: MergeKey, value: MergeValue) {
		match self.0.iter_mut().find(|(k, _)| *k == key) {
			Some((_, slot)) => *slot = value,
			None => self.0.push((key, value)),
		}
	}

	/// [`None`] iff `value` doesn't have a shape `kind` can merge.
	pub(crate) fn for_sink(kind: SinkKind, value: &Value) -> Option<Self> {
		let mut partial = Partial::default();
		match (kind, value) {
			(_, Value::Null) => (),
			(SinkKind::Spread, value) => partial.spread(value)?,
			(SinkKind::Dataset, Value::Object(object)) => partial.dataset(object),
			(SinkKind::StyleObject, Value::Object(object)) => partial.styles(object),
			(SinkKind::Class, value) => partial.classes(value)?,
			_ => return None,
		}
		Some(partial)
	}

	fn spread(&mut self, value: &Value) -> Option<()> {
		match value {
			Value::Null => (),
			Value::Object(object) => {
				for (key, value) in object.iter() {
					self.spread_entry(key, value);
				}
			}
			// Mixins, folded left to right.
			Value::Array(items) => {
				for item in items.iter() {
					self.spread(item)?;
				}
			}
			_ => return None,
		}
		Some(())
	}

	fn spread_entry(&mut self, key: &Rc<str>, value: &Value) {
		if key.starts_with(RESERVED_PREFIX) {
			return warn!("Ignoring engine-private key {:?} in spread object.", key);
		}
		if is_reactive(value) {
			return warn!("Ignoring {} value of key {:?} in spread object: Only whole objects can arrive later.", value.shape_name(), key);
		}
		match (&**key, value) {
			("class", value) => {
				if self.classes(value).is_none() {
					warn!("Ignoring {} value of `class` in spread object.", value.shape_name());
				}
			}
			("style", Value::Object(object)) => self.styles(object),
			("dataset", Value::Object(object)) => self.dataset(object),
			(key, value) if key.starts_with("on") => {
				let listener = match value {
					Value::Null => None,
					value => match ListenerRef::from_value(value) {
						Some(listener) => Some(listener),
						None => return warn!("Ignoring non-handler {} value of listener key {:?} in spread object.", value.shape_name(), key),
					},
				};
				self.set(MergeKey::Listener(key[2..].into()), MergeValue::Listener(listener));
			}
			(_, value) => match render_attribute(value) {
				Some(rendered) => self.set(MergeKey::Attribute(key.clone()), MergeValue::Text(rendered)),
				None => warn!("Ignoring {} value of key {:?} in spread object.", value.shape_name(), key),
			},
		}
	}

	fn dataset(&mut self, object: &Object) {
		for (key, value) in object.iter() {
			match render_attribute(value) {
				Some(rendered) if !is_reactive(value) => self.set(MergeKey::Attribute(format!("data-{}", kebab(key)).into()), MergeValue::Text(rendered)),
				_ => warn!("Ignoring {} value of dataset key {:?}.", value.shape_name(), key),
			}
		}
	}

	fn styles(&mut self, object: &Object) {
		for (key, value) in object.iter() {
			match render_attribute(value) {
				Some(rendered) if !is_reactive(value) => self.set(MergeKey::Style(kebab(key).into()), MergeValue::Text(rendered)),
				_ => warn!("Ignoring {} value of style property {:?}.", value.shape_name(), key),
			}
		}
	}

	/// Name lists, whitespace-separated groupings and name → boolean objects all end up as flags.
	fn classes(&mut self, value: &Value) -> Option<()> {
		match value {
			Value::Null => (),
			Value::Text(names) => self.class_names(names, true),
			Value::Number(_) | Value::Other(_) => self.class_names(&crate::classify::render_part(value), true),
			Value::Array(items) => {
				for item in items.iter() {
					self.classes(item)?;
				}
			}
			Value::Object(object) => {
				for (names, present) in object.iter() {
					if is_reactive(present) {
						warn!("Ignoring {} value of class {:?}.", present.shape_name(), names);
						continue;
					}
					self.class_names(names, present.is_truthy());
				}
			}
			_ => return None,
		}
		Some(())
	}

	fn class_names(&mut self, names: &str, present: bool) {
		for name in names.split_whitespace() {
			self.set(MergeKey::Class(name.into()), MergeValue::Flag(present));
		}
	}
}

fn is_reactive(value: &Value) -> bool {
	matches!(value, Value::Deferred(_) | Value::Stream(_) | Value::Sink(_))
}

/// `"fooBar"` → `"foo-bar"`. Custom properties (`--*`) are kept as they are.
pub(crate) fn kebab(key: &str) -> String {
	if key.starts_with("--") {
		return key.to_owned();
	}
	let mut kebab = String::with_capacity(key.len() + 2);
	for c in key.chars() {
		if c.is_ascii_uppercase() {
			if !kebab.is_empty() {
				kebab.push('-');
			}
			kebab.push(c.to_ascii_lowercase());
		} else {
			kebab.push(c);
		}
	}
	kebab
}

/// What is written to the tree for one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum AppliedKey {
	Attribute(Rc<str>),
	Style(Rc<str>),
	Listener(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
enum Effective {
	Text(Rc<str>),
	Listener(ListenerRef),
}

enum AppliedValue<H: HostTree> {
	Text(Rc<str>),
	Listener(ListenerRef, Option<H::ListenerId>),
}

/// The Attribute Object State of one element.
pub(crate) struct ElementMerge<H: HostTree> {
	sources: Vec<(BindingId, Option<Partial>)>,
	applied: Vec<(AppliedKey, AppliedValue<H>)>,
}

impl<H: HostTree> Default for ElementMerge<H> {
	fn default() -> Self {
		Self {
			sources: Vec::new(),
			applied: Vec::new(),
		}
	}
}

impl<H: HostTree> ElementMerge<H> {
	/// Reserves `binding`'s slot in declaration order. Idempotent.
	pub(crate) fn register(&mut self, binding: BindingId) {
		if let Err(index) = self.sources.binary_search_by_key(&binding, |(id, _)| *id) {
			self.sources.insert(index, (binding, None));
		}
	}

	pub(crate) fn is_registered(&self, binding: BindingId) -> bool {
		self.sources.binary_search_by_key(&binding, |(id, _)| *id).is_ok()
	}

	/// Replaces `binding`'s contribution and plans the resulting tree mutations.
	pub(crate) fn update(&mut self, binding: BindingId, partial: Partial) -> Vec<Op<H>> {
		self.register(binding);
		if let Ok(index) = self.sources.binary_search_by_key(&binding, |(id, _)| *id) {
			self.sources[index].1 = Some(partial);
		}
		self.reconcile()
	}

	/// Drops `binding`'s slot, removing whatever only it contributed.
	pub(crate) fn remove(&mut self, binding: BindingId) -> Vec<Op<H>> {
		self.sources.retain(|(id, _)| *id != binding);
		self.reconcile()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.sources.is_empty()
	}

	/// Right-biased union in declaration order. Keys keep the position of their first appearance.
	pub(crate) fn merged(&self) -> Vec<(MergeKey, MergeValue)> {
		let mut merged: Vec<(MergeKey, MergeValue)> = Vec::new();
		let mut index: HashMap<MergeKey, usize> = HashMap::new();
		for partial in self.sources.iter().filter_map(|(_, partial)| partial.as_ref()) {
			for (key, value) in &partial.0 {
				match index.entry(key.clone()) {
					Entry::Occupied(occupied) => merged[*occupied.get()].1 = value.clone(),
					Entry::Vacant(vacant) => {
						vacant.insert(merged.len());
						merged.push((key.clone(), value.clone()));
					}
				}
			}
		}
		merged
	}

	/// Flattens the merged map into what the tree should show. Present class names become one `class` attribute.
	fn effective(&self) -> Vec<(AppliedKey, Effective)> {
		let mut effective = Vec::new();
		let mut classes: Vec<Rc<str>> = Vec::new();
		let mut class_at = None;
		for (key, value) in self.merged() {
			match (key, value) {
				(MergeKey::Attribute(name), MergeValue::Text(Some(text))) => effective.push((AppliedKey::Attribute(name), Effective::Text(text))),
				(MergeKey::Class(name), MergeValue::Flag(present)) => {
					class_at.get_or_insert(effective.len());
					if present {
						classes.push(name);
					}
				}
				(MergeKey::Style(property), MergeValue::Text(Some(text))) => effective.push((AppliedKey::Style(property), Effective::Text(text))),
				(MergeKey::Listener(event), MergeValue::Listener(Some(listener))) => effective.push((AppliedKey::Listener(event), Effective::Listener(listener))),
				_ => (),
			}
		}
		if let Some(class_at) = class_at {
			if !classes.is_empty() {
				effective.insert(class_at, (AppliedKey::Attribute("class".into()), Effective::Text(classes.join(" ").into())));
			}
		}
		effective
	}

	/// Diffs key by key against what was applied last. Unchanged keys are left alone.
	fn reconcile(&mut self) -> Vec<Op<H>> {
		let span = trace_span!("Reconciling merged attributes", sources = self.sources.len());
		let _enter = span.enter();

		let next = self.effective();
		let next_keys: HashSet<AppliedKey> = next.iter().map(|(key, _)| key.clone()).collect();

		let mut ops = Vec::new();
		let mut previous = HashMap::new();
		for (key, value) in mem::take(&mut self.applied) {
			if next_keys.contains(&key) {
				previous.insert(key, value);
			} else {
				match (key, value) {
					(AppliedKey::Attribute(name), _) => ops.push(Op::RemoveAttribute(name)),
					(AppliedKey::Style(property), _) => ops.push(Op::RemoveStyle(property)),
					(AppliedKey::Listener(event), AppliedValue::Listener(_, Some(id))) => ops.push(Op::Unlisten { event, id }),
					// Not registered yet. The id will be turned away when it arrives.
					(AppliedKey::Listener(_), _) => (),
				}
			}
		}

		let mut applied = Vec::with_capacity(next.len());
		for (key, next) in next {
			match (previous.remove(&key), next) {
				(Some(AppliedValue::Text(current)), Effective::Text(next)) if current == next => applied.push((key, AppliedValue::Text(current))),
				(Some(AppliedValue::Listener(current, id)), Effective::Listener(next)) if current == next => applied.push((key, AppliedValue::Listener(current, id))),
				(current, next) => {
					if let (AppliedKey::Listener(event), Some(AppliedValue::Listener(_, Some(id)))) = (&key, current) {
						ops.push(Op::Unlisten { event: event.clone(), id });
					}
					match (&key, next) {
						(AppliedKey::Attribute(name), Effective::Text(text)) => {
							ops.push(Op::SetAttribute(name.clone(), text.clone()));
							applied.push((key, AppliedValue::Text(text)));
						}
						(AppliedKey::Style(property), Effective::Text(text)) => {
							ops.push(Op::SetStyle(property.clone(), text.clone()));
							applied.push((key, AppliedValue::Text(text)));
						}
						(AppliedKey::Listener(event), Effective::Listener(listener)) => {
							ops.push(Op::Listen {
								event: event.clone(),
								listener: listener.listener(),
								slot: ListenerSlot::Merged(key.clone(), listener.clone()),
							});
							applied.push((key, AppliedValue::Listener(listener, None)));
						}
						(key, next) => warn!("Mismatched merge entry {:?} = {:?}; skipping.", key, next),
					}
				}
			}
		}
		self.applied = applied;

		trace!("Planned {} mutation(s).", ops.len());
		ops
	}

	/// Records a registered listener's id. Returns it back if it's no longer wanted.
	pub(crate) fn store_listener(&mut self, key: &AppliedKey, listener: &ListenerRef, id: H::ListenerId) -> Option<H::ListenerId> {
		for (applied_key, value) in &mut self.applied {
			if let AppliedValue::Listener(applied, slot @ None) = value {
				if applied_key == key && applied == listener {
					*slot = Some(id);
					return None;
				}
			}
		}
		Some(id)
	}

	/// The registered listeners, for removal on teardown.
	pub(crate) fn into_listeners(self) -> Vec<(Rc<str>, H::ListenerId)> {
		self.applied
			.into_iter()
			.filter_map(|(key, value)| match (key, value) {
				(AppliedKey::Listener(event), AppliedValue::Listener(_, Some(id))) => Some((event, id)),
				_ => None,
			})
			.collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{memory::MemoryTree, object};

	fn partial(kind: SinkKind, value: impl Into<Value>) -> Partial {
		Partial::for_sink(kind, &value.into()).unwrap()
	}

	fn attributes(ops: &[Op<MemoryTree>]) -> Vec<(String, Option<String>)> {
		ops.iter()
			.filter_map(|op| match op {
				Op::SetAttribute(name, value) => Some((name.to_string(), Some(value.to_string()))),
				Op::RemoveAttribute(name) => Some((name.to_string(), None)),
				_ => None,
			})
			.collect()
	}

	#[test]
	fn kebab_case() {
		assert_eq!(kebab("author"), "author");
		assert_eq!(kebab("publishedYear"), "published-year");
		assert_eq!(kebab("backgroundColor"), "background-color");
		assert_eq!(kebab("--accent"), "--accent");
	}

	#[test]
	fn class_groupings() {
		let from_string = partial(SinkKind::Class, "a  b");
		let from_array = partial(SinkKind::Class, Value::array(["a", "b"]));
		let from_object = partial(SinkKind::Class, object! { "a b" => true });
		assert_eq!(from_string, from_array);
		assert_eq!(from_string, from_object);
	}

	#[test]
	fn later_sources_win() {
		let mut merge = ElementMerge::<MemoryTree>::default();
		merge.register(BindingId(1));
		merge.register(BindingId(2));
		merge.update(BindingId(2), partial(SinkKind::Spread, object! { "title" => "second" }));
		let ops = merge.update(BindingId(1), partial(SinkKind::Spread, object! { "title" => "first", "lang" => "en" }));
		assert_eq!(attributes(&ops), vec![("lang".to_owned(), Some("en".to_owned()))]);
		assert_eq!(
			merge.merged(),
			vec![
				(MergeKey::Attribute("title".into()), MergeValue::Text(Some("second".into()))),
				(MergeKey::Attribute("lang".into()), MergeValue::Text(Some("en".into()))),
			]
		);
	}

	#[test]
	fn false_removes() {
		let mut merge = ElementMerge::<MemoryTree>::default();
		merge.update(BindingId(1), partial(SinkKind::Spread, object! { "disabled" => true }));
		let ops = merge.update(BindingId(2), partial(SinkKind::Spread, object! { "disabled" => false }));
		assert_eq!(attributes(&ops), vec![("disabled".to_owned(), None)]);
	}

	#[test]
	fn identical_update_is_silent() {
		let mut merge = ElementMerge::<MemoryTree>::default();
		let value = object! { "title" => "x", "class" => "a b", "style" => object! { "color" => "red" } };
		assert_eq!(merge.update(BindingId(1), partial(SinkKind::Spread, value.clone())).len(), 3);
		assert!(merge.update(BindingId(1), partial(SinkKind::Spread, value)).is_empty());
	}
}
