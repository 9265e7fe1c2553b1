#![cfg(target_arch = "wasm32")]

use phloem::{
	object, sink,
	source::{Relay, State},
	web::DomTree,
	Engine, HostTree, Position, Value,
};
use std::sync::Once;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::{wasm_bindgen_test, wasm_bindgen_test_configure};
use web_sys::{window, HtmlElement, HtmlInputElement};

wasm_bindgen_test_configure!(run_in_browser);

static LOG: Once = Once::new();

fn element(name: &str) -> web_sys::Element {
	LOG.call_once(tracing_wasm::set_as_global_default);

	let document = window().unwrap().document().unwrap();
	let element = document.create_element(name).unwrap();
	document.body().unwrap().append_child(&element).unwrap();
	element
}

#[wasm_bindgen_test]
fn content() {
	let element = element("p");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(element.clone());

	let relay = Relay::new();
	engine.bind(&node, Position::Child, Value::array([Value::from("<i>loading</i>"), relay.clone().into()])).unwrap();
	assert_eq!(element.inner_html(), "<i>loading</i>");

	relay.emit("done");
	assert_eq!(element.inner_html(), "done");

	let other = tree.node(element.clone());
	assert_eq!(other, node);
	assert!(tree.is_attached(&node));

	engine.detach(&node);
	relay.emit("ignored");
	assert_eq!(element.inner_html(), "done");
	element.remove();
	assert!(!tree.is_attached(&node));
}

#[wasm_bindgen_test]
fn text_and_append() {
	let element = element("ul");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(element.clone());

	let relay = Relay::new();
	engine.bind(&node, Position::Child, sink::append_html(relay.clone())).unwrap();
	relay.emit("<li>1</li>");
	relay.emit("<li>2</li>");
	assert_eq!(element.children().length(), 2);

	let id = engine.bind(&node, Position::Child, sink::text("<li>3</li>")).unwrap();
	assert_eq!(element.children().length(), 0);
	assert_eq!(element.text_content().as_deref(), Some("<li>3</li>"));
	engine.unbind(id).unwrap();
	element.remove();
}

#[wasm_bindgen_test]
fn merged_attributes() {
	let element = element("div");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(element.clone());

	engine.bind(&node, Position::Spread, sink::dataset(object! { "author" => "Stephen King", "title" => "Misery" })).unwrap();
	engine.bind(&node, Position::Class, object! { "class1" => true, "class2" => false }).unwrap();
	engine
		.bind(&node, Position::Spread, object! { "class" => object! { "class3" => true, "class4" => false }, "data-year" => 1987 })
		.unwrap();

	assert_eq!(element.get_attribute("data-author").as_deref(), Some("Stephen King"));
	assert_eq!(element.get_attribute("data-title").as_deref(), Some("Misery"));
	assert_eq!(element.class_name(), "class1 class3");
	assert_eq!(element.get_attribute("data-year").as_deref(), Some("1987"));
	element.remove();
}

#[wasm_bindgen_test]
fn style_and_value() {
	let element = element("input");
	let tree = DomTree::new();
	let engine = Engine::new(tree.clone());
	let node = tree.node(element.clone());

	let color = State::new("red");
	engine.bind(&node, Position::style_property("color"), color.clone()).unwrap();
	engine.bind(&node, Position::attribute("value"), "typed").unwrap();

	let html: &HtmlElement = element.dyn_ref().unwrap();
	assert_eq!(html.style().get_property_value("color").unwrap(), "red");
	color.set(Value::Null);
	assert_eq!(html.style().get_property_value("color").unwrap(), "");

	let input: &HtmlInputElement = element.dyn_ref().unwrap();
	assert_eq!(input.value(), "typed");
	element.remove();
}
