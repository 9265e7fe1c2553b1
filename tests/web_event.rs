#![cfg(target_arch = "wasm32")]

use phloem::{
	object,
	source::Subject,
	value::{Notification, Observable, Observer},
	web::DomTree,
	Engine, Position, Value,
};
use std::{cell::RefCell, rc::Rc, sync::Once};
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlButtonElement, HtmlElement};

wasm_bindgen_test_configure!(run_in_browser);

static LOG: Once = Once::new();

fn button(id: &str) -> HtmlButtonElement {
	LOG.call_once(tracing_wasm::set_as_global_default);

	let document = window().unwrap().document().unwrap();
	let button: HtmlButtonElement = document.create_element("button").unwrap().dyn_into().unwrap();
	button.set_id(id);
	document.body().unwrap().append_child(&button).unwrap();
	button
}

#[wasm_bindgen_test]
fn click() {
	let button = button("click");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(button.clone().into());

	let click_count = Rc::new(RefCell::new(0));
	let handler = {
		let click_count = click_count.clone();
		Value::function(move |event| {
			event.native::<web_sys::Event>().expect("Expected Event but received something else.");
			*click_count.borrow_mut() += 1;
		})
	};
	engine.bind(&node, Position::attribute("onclick"), handler).unwrap();
	assert_eq!(*click_count.borrow(), 0);

	button.click();
	assert_eq!(*click_count.borrow(), 1);

	engine.detach(&node);
	button.click();
	assert_eq!(*click_count.borrow(), 1);
	assert_eq!(tree.free_listeners(), 1);
	button.remove();
}

#[wasm_bindgen_test]
fn shared_handler() {
	let first = button("shared-1");
	let second = button("shared-2");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());

	let click_count = Rc::new(RefCell::new(0));
	let handler = {
		let click_count = click_count.clone();
		Value::function(move |_| *click_count.borrow_mut() += 1)
	};
	for element in [&first, &second] {
		let node = tree.node(element.clone().into());
		engine.bind(&node, Position::event("click"), handler.clone()).unwrap();
	}

	first.click();
	second.click();
	assert_eq!(*click_count.borrow(), 2);

	engine.detach(&tree.node(first.clone().into()));
	assert_eq!(tree.free_listeners(), 1);
	second.click();
	assert_eq!(*click_count.borrow(), 3);

	first.remove();
	second.remove();
}

#[wasm_bindgen_test]
fn handler_twice_on_one_element() {
	let button = button("twice");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(button.clone().into());

	let click_count = Rc::new(RefCell::new(0));
	let handler = {
		let click_count = click_count.clone();
		Value::function(move |_| *click_count.borrow_mut() += 1)
	};
	let direct = engine.bind(&node, Position::event("click"), handler.clone()).unwrap();
	engine.bind(&node, Position::Spread, object! { "onclick" => handler }).unwrap();

	// The DOM dispatches a callback once per element and event, however often it was added.
	button.click();
	assert_eq!(*click_count.borrow(), 1);

	engine.unbind(direct).unwrap();
	assert_eq!(tree.free_listeners(), 0);
	button.click();
	assert_eq!(*click_count.borrow(), 2);

	engine.detach(&node);
	button.click();
	assert_eq!(*click_count.borrow(), 2);
	assert_eq!(tree.free_listeners(), 1);
	button.remove();
}

#[wasm_bindgen_test]
fn writable_stream() {
	let button = button("writable");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(button.clone().into());

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
	engine.bind(&node, Position::event("click"), subject).unwrap();

	let element: &HtmlElement = &button;
	element.click();
	assert_eq!(*pushed.borrow(), vec!["click".to_owned()]);
	button.remove();
}
