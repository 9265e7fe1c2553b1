//! The binding orchestrator.
//!
//! All binding state lives behind one [`RefCell`]. Tree mutations are *planned* while it is borrowed
//! and *performed* after the borrow is released, and user code (handlers, teardowns, the error channel)
//! is likewise only ever called without the borrow held. This makes nested emissions safe:
//! A handler may synchronously bind, rebind or detach while another delivery is in progress.

use crate::{
	classify::{classify, is_composite, render_part, Tag},
	error::{BindError, RuntimeError},
	event::{plan_wire, ListenerRef, Mount, Wired, MOUNT},
	host::HostTree,
	merge::{ElementMerge, Partial},
	sink::{lookup, plan_direct, Arity, ListenerSlot, Op, Position, Registered, SinkDescriptor, SinkKind, Snapshot, Target},
	subscription::{Source, Subscription},
	value::{Deferred, Event, Failure, Notification, Observable, Observer, Value},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
};
use hashbrown::HashMap;
use std::rc::{Rc, Weak};
use tracing::{debug, error, instrument, level_filters::STATIC_MAX_LEVEL, trace, trace_span, Level};

/// Maximum nesting of synchronous deliveries unless configured otherwise.
pub const DEFAULT_DEPTH_LIMIT: usize = 64;

/// Identifies one binding for the lifetime of its [`Engine`].
///
/// Ids are handed out in increasing order, so they also encode declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingId(pub(crate) u64);

/// Where a binding is in its lifecycle.
///
/// `Idle` and `AwaitingEmission` may alternate for stream bindings.
/// `TornDown` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingState {
	Unbound,
	Classified,
	InitiallyApplied,
	Idle,
	AwaitingEmission,
	TornDown,
}

/// Which part of a binding a value is delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
	Whole,
	/// One element of a concatenated array.
	Part(usize),
	/// Re-renders the concatenation as it is.
	Joined,
}

struct Record<H: HostTree> {
	node: H::Node,
	target: Target,
	sink: &'static SinkDescriptor,
	tag: Tag,
	state: BindingState,
	/// What an idempotent sink last wrote, [`None`] if nothing was written yet.
	snapshot: Option<Snapshot>,
	/// Cancelled subscriptions are kept around for their emission counts until the next rebind.
	subscriptions: Vec<Subscription>,
	parts: Option<Vec<Option<Rc<str>>>>,
	listener: Wired<H>,
	mount: Option<Mount>,
}

impl<H: HostTree> Record<H> {
	fn resting_state(&self) -> BindingState {
		if self.subscriptions.iter().any(Subscription::is_active) {
			BindingState::AwaitingEmission
		} else if self.tag == Tag::Deferred && !self.subscriptions.is_empty() {
			BindingState::TornDown
		} else {
			BindingState::Idle
		}
	}

	fn joined(&self) -> Value {
		self.parts.as_ref().map_or(Value::Null, |parts| {
			Value::Text(parts.iter().flatten().map(|part| &**part).collect::<String>().into())
		})
	}
}

struct Planned<H: HostTree> {
	node: H::Node,
	ops: Vec<Op<H>>,
	mount: Option<ListenerRef>,
}

struct State<H: HostTree> {
	next_id: u64,
	bindings: HashMap<BindingId, Record<H>>,
	nodes: HashMap<H::Node, Vec<BindingId>>,
	merges: HashMap<H::Node, ElementMerge<H>>,
}

impl<H: HostTree> State<H> {
	/// `Ok(None)` iff the binding is gone, in which case the value is silently discarded.
	fn plan(&mut self, host: &H, binding: BindingId, slot: Slot, value: Value) -> Result<Option<Planned<H>>, RuntimeError> {
		let State { bindings, merges, .. } = self;
		let record = match bindings.get_mut(&binding) {
			Some(record) => record,
			None => {
				trace!("Binding is gone. Discarding value.");
				return Ok(None);
			}
		};

		let value = match slot {
			Slot::Whole => value,
			Slot::Part(index) => {
				match record.parts.as_mut().and_then(|parts| parts.get_mut(index)) {
					Some(part) => *part = Some(render_part(&value)),
					None => {
						trace!("Binding no longer concatenates. Discarding value.");
						return Ok(None);
					}
				}
				record.joined()
			}
			Slot::Joined => record.joined(),
		};

		let kind = record.sink.kind_for(&value);
		let (sink, shape) = (record.sink.name(), value.shape_name());
		let unsupported = move || RuntimeError::UnsupportedEmission { binding, sink, shape };

		let mut ops = Vec::new();
		let mut mount = None;
		if kind.merges() {
			let partial = Partial::for_sink(kind, &value).ok_or_else(unsupported)?;
			ops = merges.entry(record.node.clone()).or_default().update(binding, partial);
			record.snapshot = None;
		} else {
			// A style binding may switch from objects to plain strings.
			if let Some(merge) = merges.get_mut(&record.node) {
				if merge.is_registered(binding) {
					ops = merge.remove(binding);
				}
			}
			match (kind, &record.target) {
				(SinkKind::Event, Target::Event(event)) => ops.extend(plan_wire(binding, event, &mut record.listener, &value).ok_or_else(unsupported)?),
				(SinkKind::Mount, _) => {
					let handler = match &value {
						Value::Null => None,
						value => Some(ListenerRef::from_value(value).ok_or_else(unsupported)?),
					};
					let state = record.mount.get_or_insert_with(Mount::default);
					state.handler = handler;
					mount = state.due(host.is_attached(&record.node));
				}
				(kind, target) => {
					let (snapshot, op) = plan_direct(kind, target, &value).ok_or_else(unsupported)?;
					if record.sink.is_idempotent() && record.snapshot.as_ref() == Some(&snapshot) {
						trace!("Rendering unchanged. Skipping.");
					} else {
						record.snapshot = Some(snapshot);
						ops.push(op);
					}
				}
			}
		}

		if record.state == BindingState::Classified {
			record.state = BindingState::InitiallyApplied;
		}
		Ok(Some(Planned {
			node: record.node.clone(),
			ops,
			mount,
		}))
	}

	/// Returns `listener_id` back iff nothing wants it anymore.
	fn store_listener(&mut self, node: &H::Node, slot: ListenerSlot, listener_id: H::ListenerId) -> Option<H::ListenerId> {
		match slot {
			ListenerSlot::Binding(binding, listener) => match self.bindings.get_mut(&binding).map(|record| &mut record.listener) {
				Some(Some((wired, id @ None))) if *wired == listener => {
					*id = Some(listener_id);
					None
				}
				_ => Some(listener_id),
			},
			ListenerSlot::Merged(key, listener) => match self.merges.get_mut(node) {
				Some(merge) => merge.store_listener(&key, &listener, listener_id),
				None => Some(listener_id),
			},
		}
	}
}

/// Decrements the delivery depth when dropped.
struct Depth<'a>(&'a Cell<usize>);

impl<'a> Depth<'a> {
	fn enter(depth: &'a Cell<usize>) -> Self {
		depth.set(depth.get() + 1);
		Self(depth)
	}
}

impl Drop for Depth<'_> {
	fn drop(&mut self) {
		self.0.set(self.0.get() - 1);
	}
}

type ErrorChannel = Box<dyn Fn(&RuntimeError)>;

struct Inner<H: HostTree> {
	host: H,
	depth_limit: usize,
	depth: Cell<usize>,
	on_error: Option<ErrorChannel>,
	state: RefCell<State<H>>,
}

/// Keeps interpolated values synchronized with elements of a [`HostTree`].
///
/// Cloning is cheap and yields a handle to the same engine.
///
/// Subscriptions only hold weak references to the engine.
/// Once the last handle is dropped, further emissions are discarded.
pub struct Engine<H: HostTree>(Rc<Inner<H>>);

impl<H: HostTree> Clone for Engine<H> {
	fn clone(&self) -> Self {
		Self(self.0.clone())
	}
}

impl<H: HostTree + Debug> Debug for Engine<H> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Engine");
		debug.field("host", &self.0.host).field("depth_limit", &self.0.depth_limit);
		match self.0.state.try_borrow() {
			Ok(state) => debug.field("bindings", &state.bindings.len()).field("elements", &state.nodes.len()),
			Err(_) => debug.field("bindings", &"<borrowed>"),
		};
		debug.finish()
	}
}

/// Configures an [`Engine`].
#[must_use]
pub struct EngineBuilder<H: HostTree> {
	host: H,
	depth_limit: usize,
	on_error: Option<ErrorChannel>,
}

impl<H: HostTree> EngineBuilder<H> {
	/// Sets the maximum nesting of synchronous deliveries. Deeper ones are dropped and reported.
	pub fn depth_limit(mut self, depth_limit: usize) -> Self {
		self.depth_limit = depth_limit;
		self
	}

	/// Sets the error channel for asynchronous failures.
	///
	/// Errors are logged through [`tracing`] regardless.
	pub fn on_error(mut self, on_error: impl Fn(&RuntimeError) + 'static) -> Self {
		self.on_error = Some(Box::new(on_error));
		self
	}

	pub fn build(self) -> Engine<H> {
		Engine(Rc::new(Inner {
			host: self.host,
			depth_limit: self.depth_limit,
			depth: Cell::new(0),
			on_error: self.on_error,
			state: RefCell::new(State {
				next_id: 0,
				bindings: HashMap::new(),
				nodes: HashMap::new(),
				merges: HashMap::new(),
			}),
		}))
	}
}

impl<H: HostTree> Engine<H> {
	#[must_use]
	pub fn new(host: H) -> Self {
		Self::builder(host).build()
	}

	pub fn builder(host: H) -> EngineBuilder<H> {
		EngineBuilder {
			host,
			depth_limit: DEFAULT_DEPTH_LIMIT,
			on_error: None,
		}
	}

	#[must_use]
	pub fn host(&self) -> &H {
		&self.0.host
	}

	/// Binds `value` at `position` of `node`.
	///
	/// Static values and the current value of stateful streams are applied before this returns.
	///
	/// # Errors
	///
	/// Iff the position or the value's shape can't be bound. Nothing is applied in that case.
	#[instrument(skip(self, value))]
	pub fn bind(&self, node: &H::Node, position: Position, value: impl Into<Value>) -> Result<BindingId, BindError> {
		let target = Target::resolve(&self.0.host, node, &position)?;
		let (sink, tag, value) = select(&target, value.into())?;

		let id = {
			let mut state = self.0.state.borrow_mut();
			let id = BindingId(state.next_id);
			state.next_id += 1;
			debug!(?id, sink = sink.name(), ?tag, "Binding.");
			state.bindings.insert(
				id,
				Record {
					node: node.clone(),
					target,
					sink,
					tag,
					state: BindingState::Classified,
					snapshot: None,
					subscriptions: Vec::new(),
					parts: None,
					listener: None,
					mount: None,
				},
			);
			state.nodes.entry(node.clone()).or_default().push(id);
			id
		};

		self.drive(id, sink, value);
		self.settle(id);
		Ok(id)
	}

	/// Replaces the value of a live binding.
	///
	/// The previous subscriptions are torn down first. A merged contribution keeps its declaration position
	/// and stays applied until the new value produces one.
	///
	/// # Errors
	///
	/// Iff `id` isn't live or the new value can't be bound there. The binding is unchanged in that case.
	#[instrument(skip(self, value))]
	pub fn rebind(&self, id: BindingId, value: impl Into<Value>) -> Result<(), BindError> {
		let (sink, value, previous) = {
			let mut state = self.0.state.borrow_mut();
			let record = state.bindings.get_mut(&id).ok_or(BindError::UnknownBinding { id })?;
			let (sink, tag, value) = select(&record.target, value.into())?;
			debug!(sink = sink.name(), ?tag, "Rebinding.");
			record.sink = sink;
			record.tag = tag;
			record.parts = None;
			// The next rendering is compared against what this sink wrote, not the previous one.
			record.snapshot = None;
			record.state = BindingState::Classified;
			(sink, value, mem::take(&mut record.subscriptions))
		};

		for subscription in previous {
			subscription.cancel();
		}
		self.drive(id, sink, value);
		self.settle(id);
		Ok(())
	}

	/// Tears down a single binding, removing its listeners and merged contribution.
	///
	/// # Errors
	///
	/// Iff `id` isn't live.
	#[instrument(skip(self))]
	pub fn unbind(&self, id: BindingId) -> Result<(), BindError> {
		let (record, ops) = {
			let mut state = self.0.state.borrow_mut();
			let record = state.bindings.remove(&id).ok_or(BindError::UnknownBinding { id })?;
			if let Some(ids) = state.nodes.get_mut(&record.node) {
				ids.retain(|other| *other != id);
				if ids.is_empty() {
					state.nodes.remove(&record.node);
				}
			}
			let mut ops = Vec::new();
			if let Some(merge) = state.merges.get_mut(&record.node) {
				ops = merge.remove(id);
				if merge.is_empty() {
					state.merges.remove(&record.node);
				}
			}
			(record, ops)
		};

		// Listeners that were overridden by this binding come back.
		self.perform(&record.node, ops);
		self.tear_down(record);
		Ok(())
	}

	/// Tears down every binding on `root` and its descendants.
	///
	/// Returns how many bindings were torn down. Detaching again is a no-op.
	#[instrument(skip(self))]
	pub fn detach(&self, root: &H::Node) -> usize {
		let (records, merges) = {
			let mut state = self.0.state.borrow_mut();
			let nodes: Vec<H::Node> = state.nodes.keys().filter(|node| self.0.host.contains(root, node)).cloned().collect();
			let mut records = Vec::new();
			let mut merges = Vec::new();
			for node in nodes {
				for id in state.nodes.remove(&node).unwrap_or_default() {
					records.extend(state.bindings.remove(&id));
				}
				if let Some(merge) = state.merges.remove(&node) {
					merges.push((node, merge));
				}
			}
			(records, merges)
		};

		let span = trace_span!("Tearing down subtree", bindings = records.len(), merged_elements = merges.len());
		let _enter = span.enter();

		let count = records.len();
		for record in records {
			self.tear_down(record);
		}
		for (node, merge) in merges {
			for (event, id) in merge.into_listeners() {
				Op::<H>::Unlisten { event, id }.perform(&self.0.host, &node);
			}
		}
		count
	}

	/// Fires pending mount signals on `root` and its descendants, in declaration order.
	///
	/// Call this once a subtree has been inserted into the live document.
	/// Returns how many signals fired.
	#[instrument(skip(self))]
	pub fn attached(&self, root: &H::Node) -> usize {
		let mut due = {
			let mut state = self.0.state.borrow_mut();
			let host = &self.0.host;
			state
				.bindings
				.iter_mut()
				.filter_map(|(id, record)| {
					let mount = record.mount.as_mut()?;
					if !host.contains(root, &record.node) {
						return None;
					}
					let handler = mount.due(host.is_attached(&record.node))?;
					Some((*id, record.node.clone(), handler))
				})
				.collect::<Vec<_>>()
		};
		due.sort_by_key(|(id, _, _)| *id);

		let count = due.len();
		for (id, node, handler) in due {
			fire_mount(id, node, &handler);
		}
		count
	}

	/// [`BindingState::TornDown`] for ids that were handed out by this engine but aren't live anymore.
	#[must_use]
	pub fn state(&self, id: BindingId) -> BindingState {
		let state = self.0.state.borrow();
		match state.bindings.get(&id) {
			Some(record) => record.state,
			None if id.0 < state.next_id => BindingState::TornDown,
			None => BindingState::Unbound,
		}
	}

	/// How many of the binding's subscriptions are still active.
	#[must_use]
	pub fn active_subscriptions(&self, id: BindingId) -> usize {
		self.0
			.state
			.borrow()
			.bindings
			.get(&id)
			.map_or(0, |record| record.subscriptions.iter().filter(|subscription| subscription.is_active()).count())
	}

	/// How many values the binding's current subscriptions have received.
	#[must_use]
	pub fn emission_count(&self, id: BindingId) -> u64 {
		self.0
			.state
			.borrow()
			.bindings
			.get(&id)
			.map_or(0, |record| record.subscriptions.iter().map(Subscription::emissions).sum())
	}

	fn drive(&self, id: BindingId, sink: &'static SinkDescriptor, value: Value) {
		if sink.kind.wires_listeners() && ListenerRef::from_value(&value).is_some() {
			return self.deliver(id, Slot::Whole, value);
		}
		match value {
			Value::Array(items) if sink.arity() != Arity::Multi => match &*items {
				[placeholder, replacement] if is_composite(&items) => {
					self.deliver(id, Slot::Whole, placeholder.clone());
					self.drive_value(id, Slot::Whole, replacement.clone());
				}
				items => self.drive_parts(id, items),
			},
			value => self.drive_value(id, Slot::Whole, value),
		}
	}

	fn drive_value(&self, id: BindingId, slot: Slot, value: Value) {
		match value {
			Value::Stream(stream) => {
				if let Some(current) = stream.current() {
					self.deliver(id, slot, current);
				}
				self.subscribe(id, slot, stream);
			}
			Value::Deferred(deferred) => self.await_settled(id, slot, deferred),
			value => self.deliver(id, slot, value),
		}
	}

	/// Renders everything that's available right away in one go, then subscribes to the rest.
	fn drive_parts(&self, id: BindingId, items: &[Value]) {
		let mut pending = Vec::new();
		let parts = items
			.iter()
			.enumerate()
			.map(|(index, item)| match item {
				Value::Stream(stream) => {
					pending.push((index, item.clone()));
					stream.current().map(|current| render_part(&current))
				}
				Value::Deferred(_) => {
					pending.push((index, item.clone()));
					None
				}
				item => Some(render_part(item)),
			})
			.collect();

		match self.0.state.borrow_mut().bindings.get_mut(&id) {
			Some(record) => record.parts = Some(parts),
			None => return,
		}
		self.deliver(id, Slot::Joined, Value::Null);

		for (index, item) in pending {
			match item {
				Value::Stream(stream) => self.subscribe(id, Slot::Part(index), stream),
				Value::Deferred(deferred) => self.await_settled(id, Slot::Part(index), deferred),
				_ => (),
			}
		}
	}

	/// Returns [`None`] iff the binding is gone.
	fn track(&self, id: BindingId, source: Source) -> Option<Subscription> {
		let subscription = Subscription::new(source);
		self.0.state.borrow_mut().bindings.get_mut(&id)?.subscriptions.push(subscription.clone());
		Some(subscription)
	}

	fn subscribe(&self, id: BindingId, slot: Slot, stream: Rc<dyn Observable>) {
		let subscription = match self.track(id, Source::Stream(stream.clone())) {
			Some(subscription) => subscription,
			None => return,
		};

		let engine = Rc::downgrade(&self.0);
		let weak = subscription.downgrade();
		let observer = Observer::new(move |notification| {
			let (engine, subscription) = match (Weak::upgrade(&engine), weak.upgrade()) {
				(Some(engine), Some(subscription)) if subscription.is_active() => (Engine(engine), subscription),
				_ => return trace!("Discarding notification of a finished subscription."),
			};
			match notification {
				Notification::Next(value) => {
					subscription.record_emission();
					engine.deliver(id, slot, value);
				}
				Notification::Error(reason) => {
					subscription.cancel();
					engine.report(RuntimeError::StreamEmission { binding: id, reason });
				}
				Notification::Complete => {
					trace!(binding = ?id, "Stream completed.");
					subscription.cancel();
				}
			}
			engine.settle(id);
		});

		let teardown = stream.subscribe(observer);
		subscription.install(teardown);
	}

	fn await_settled(&self, id: BindingId, slot: Slot, deferred: Rc<dyn Deferred>) {
		let subscription = match self.track(id, Source::Deferred(deferred.clone())) {
			Some(subscription) => subscription,
			None => return,
		};

		let engine = Rc::downgrade(&self.0);
		let weak = subscription.downgrade();
		deferred.on_settled(Box::new(move |outcome: Result<Value, Failure>| {
			let (engine, subscription) = match (Weak::upgrade(&engine), weak.upgrade()) {
				(Some(engine), Some(subscription)) if subscription.is_active() => (Engine(engine), subscription),
				_ => return trace!("Discarding settlement of a finished subscription."),
			};
			subscription.record_emission();
			subscription.cancel();
			match outcome {
				Ok(value) => engine.deliver(id, slot, value),
				Err(reason) => engine.report(RuntimeError::DeferredRejection { binding: id, reason }),
			}
			engine.settle(id);
		}));
	}

	fn settle(&self, id: BindingId) {
		if let Some(record) = self.0.state.borrow_mut().bindings.get_mut(&id) {
			record.state = record.resting_state();
		}
	}

	fn deliver(&self, id: BindingId, slot: Slot, value: Value) {
		let inner = &*self.0;
		if inner.depth.get() >= inner.depth_limit {
			return self.report(RuntimeError::DepthLimit { binding: id });
		}
		let _depth = Depth::enter(&inner.depth);

		let span = trace_span!("Delivering", binding = ?id, ?slot, shape = value.shape_name());
		let _enter = span.enter();

		let planned = inner.state.borrow_mut().plan(&inner.host, id, slot, value);
		let Planned { node, ops, mount } = match planned {
			Ok(Some(planned)) => planned,
			Ok(None) => return,
			Err(error) => return self.report(error),
		};

		self.perform(&node, ops);
		if let Some(handler) = mount {
			fire_mount(id, node, &handler);
		}
	}

	/// Performs planned mutations and records the ids of newly added listeners.
	fn perform(&self, node: &H::Node, ops: Vec<Op<H>>) {
		let host = &self.0.host;
		let registered: Vec<Registered<H>> = ops.into_iter().filter_map(|op| op.perform(host, node)).collect();
		if registered.is_empty() {
			return;
		}

		let unwanted: Vec<_> = {
			let mut state = self.0.state.borrow_mut();
			registered
				.into_iter()
				.filter_map(|Registered { slot, event, id }| state.store_listener(node, slot, id).map(|id| (event, id)))
				.collect()
		};
		for (event, id) in unwanted {
			trace!(%event, ?id, "Listener was replaced while registering.");
			Op::<H>::Unlisten { event, id }.perform(host, node);
		}
	}

	fn tear_down(&self, record: Record<H>) {
		let span = trace_span!("Tearing down binding", node = ?record.node, subscriptions = record.subscriptions.len());
		let _enter = span.enter();

		let torn_down = record.subscriptions.iter().filter(|subscription| subscription.cancel()).count();
		trace!("Cancelled {} subscription(s).", torn_down);
		if let Some((_, Some(id))) = record.listener {
			if let Target::Event(event) = record.target {
				Op::<H>::Unlisten { event, id }.perform(&self.0.host, &record.node);
			}
		}
	}

	fn report(&self, error: RuntimeError) {
		error!(binding = ?error.binding(), "{}", error);
		if let Some(on_error) = &self.0.on_error {
			on_error(&error);
		}
	}
}

fn fire_mount<N: Debug + 'static>(id: BindingId, node: N, handler: &ListenerRef) {
	let span = trace_span!("Firing mount signal", binding = ?id, ?node);
	let _enter = span.enter();
	handler.invoke(&Event::with_native(MOUNT, node));
}

/// Picks the sink for `value` at `target`, unwrapping explicit sink markers.
fn select(target: &Target, value: Value) -> Result<(&'static SinkDescriptor, Tag, Value), BindError> {
	let category = target.category();
	let (sink, value) = match value {
		Value::Sink(explicit) => (lookup(category, Some(explicit.kind()))?, explicit.payload().clone()),
		value => (lookup(category, None)?, value),
	};
	let tag = classify(&value);
	if !sink.accepts(&tag, &value) {
		if STATIC_MAX_LEVEL >= Level::DEBUG {
			debug!(sink = sink.name(), ?tag, shape = value.shape_name(), "Rejecting value.");
		}
		return Err(BindError::UnsupportedValue { tag, position: category });
	}
	Ok((sink, tag, value))
}
