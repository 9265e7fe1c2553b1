use phloem::{
	memory::{MemoryTree, NodeId},
	object,
	source::{Relay, State, Subject},
	value::{Notification, Observable, Observer},
	Engine, Event, Position, Value,
};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

fn setup() -> (Engine<MemoryTree>, MemoryTree, NodeId) {
	let tree = MemoryTree::new();
	let node = tree.create_element("button");
	tree.append_child(tree.root(), node);
	(Engine::new(tree.clone()), tree, node)
}

fn counter() -> (Rc<Cell<usize>>, Value) {
	let count = Rc::new(Cell::new(0));
	let handler = {
		let count = count.clone();
		Value::function(move |event| {
			assert_eq!(event.name(), "click");
			count.set(count.get() + 1);
		})
	};
	(count, handler)
}

fn click(tree: &MemoryTree, node: NodeId) -> usize {
	tree.dispatch(node, &Event::with_native("click", "native click"))
}

#[test]
fn function_handler_per_click() {
	let (engine, tree, node) = setup();
	let seen = Rc::new(RefCell::new(Vec::new()));
	{
		let seen = seen.clone();
		engine
			.bind(
				&node,
				Position::attribute("onclick"),
				Value::function(move |event| seen.borrow_mut().push(event.native::<&str>().copied())),
			)
			.unwrap();
	}
	assert!(seen.borrow().is_empty());

	click(&tree, node);
	click(&tree, node);
	assert_eq!(*seen.borrow(), vec![Some("native click"), Some("native click")]);
}

#[test]
fn writable_stream_receives_pushes() {
	let (engine, tree, node) = setup();
	let subject = Subject::new();
	let pushed = Rc::new(RefCell::new(Vec::new()));
	let _teardown = {
		let pushed = pushed.clone();
		subject.subscribe(Observer::new(move |notification| {
			if let Notification::Next(Value::Event(event)) = notification {
				pushed.borrow_mut().push(event.name().to_owned());
			}
		}))
	};

	engine.bind(&node, Position::event("click"), subject.clone()).unwrap();
	// Used as a sink only. The engine doesn't subscribe.
	assert_eq!(subject.observer_count(), 1);

	click(&tree, node);
	assert_eq!(*pushed.borrow(), vec!["click".to_owned()]);
}

#[test]
fn stateful_writable_stream_is_a_sink_at_events() {
	let (engine, tree, node) = setup();
	let state = State::new(Value::Null);
	engine.bind(&node, Position::event("click"), state.clone()).unwrap();
	assert_eq!(state.observer_count(), 0);

	click(&tree, node);
	assert!(matches!(state.get(), Value::Event(event) if event.name() == "click"));
}

#[test]
fn rebinding_replaces_the_listener() {
	let (engine, tree, node) = setup();
	let (first, first_handler) = counter();
	let (second, second_handler) = counter();
	let id = engine.bind(&node, Position::event("click"), first_handler).unwrap();

	engine.rebind(id, second_handler.clone()).unwrap();
	assert_eq!(tree.listener_count(node), 1);
	click(&tree, node);
	assert_eq!((first.get(), second.get()), (0, 1));

	let mutations = tree.mutation_count();
	engine.rebind(id, second_handler).unwrap();
	assert_eq!(tree.mutation_count(), mutations);

	engine.rebind(id, Value::Null).unwrap();
	assert_eq!(tree.listener_count(node), 0);
}

#[test]
fn stream_of_handlers_rewires() {
	let (engine, tree, node) = setup();
	let relay = Relay::new();
	engine.bind(&node, Position::event("click"), relay.clone()).unwrap();
	assert_eq!(tree.listener_count(node), 0);

	let (first, first_handler) = counter();
	let (second, second_handler) = counter();
	relay.emit(first_handler);
	click(&tree, node);
	relay.emit(second_handler);
	click(&tree, node);
	assert_eq!(tree.listener_count(node), 1);
	assert_eq!((first.get(), second.get()), (1, 1));
}

#[test]
fn spread_listeners_merge() {
	let (engine, tree, node) = setup();
	let (first, first_handler) = counter();
	let (second, second_handler) = counter();
	engine.bind(&node, Position::Spread, object! { "onclick" => first_handler, "title" => "button" }).unwrap();
	let overriding = engine.bind(&node, Position::Spread, object! { "onclick" => second_handler }).unwrap();
	assert_eq!(tree.listener_count(node), 1);
	assert_eq!(tree.attribute(node, "onclick"), None);

	click(&tree, node);
	assert_eq!((first.get(), second.get()), (0, 1));

	engine.unbind(overriding).unwrap();
	assert_eq!(tree.listener_count(node), 1);
	click(&tree, node);
	assert_eq!((first.get(), second.get()), (1, 1));

	assert_eq!(engine.detach(&node), 1);
	assert_eq!(tree.listener_count(node), 0);
}

#[test]
fn detach_removes_listeners() {
	let (engine, tree, node) = setup();
	let (count, handler) = counter();
	engine.bind(&node, Position::event("click"), handler).unwrap();
	engine.detach(&node);
	assert_eq!(click(&tree, node), 0);
	assert_eq!(count.get(), 0);
}

#[test]
fn mount_fires_once_after_attachment() {
	let tree = MemoryTree::new();
	let engine = Engine::new(tree.clone());
	let list = tree.create_element("ul");
	let first = tree.create_element("li");
	let second = tree.create_element("li");
	tree.append_child(list, first);
	tree.append_child(list, second);

	let mounted = Rc::new(RefCell::new(Vec::new()));
	for node in [first, second] {
		let mounted = mounted.clone();
		engine
			.bind(
				&node,
				Position::attribute("bind:mount"),
				Value::function(move |event| {
					assert_eq!(event.name(), "mount");
					mounted.borrow_mut().push(*event.native::<NodeId>().unwrap());
				}),
			)
			.unwrap();
	}
	assert!(mounted.borrow().is_empty());
	assert_eq!(engine.attached(&list), 0);

	tree.append_child(tree.root(), list);
	assert_eq!(engine.attached(&list), 2);
	assert_eq!(engine.attached(&list), 0);
	assert_eq!(*mounted.borrow(), vec![first, second]);
}

#[test]
fn mount_on_attached_element_fires_during_bind() {
	let (engine, _tree, node) = setup();
	let (count, _) = counter();
	{
		let count = count.clone();
		engine
			.bind(&node, Position::attribute("bind:mount"), Value::function(move |_| count.set(count.get() + 1)))
			.unwrap();
	}
	assert_eq!(count.get(), 1);
	assert_eq!(engine.attached(&node), 0);
}

#[test]
fn handlers_may_bind_during_dispatch() {
	let (engine, tree, node) = setup();
	let label = tree.create_element("span");
	let handler = {
		let engine = engine.clone();
		Value::function(move |_| {
			engine.bind(&label, Position::Child, "clicked").unwrap();
		})
	};
	engine.bind(&node, Position::event("click"), handler).unwrap();
	click(&tree, node);
	assert_eq!(tree.text(label), "clicked");
}
