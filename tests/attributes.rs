use phloem::{
	memory::{MemoryTree, NodeId},
	object, sink,
	source::{Deferral, Relay, State},
	BindError, Engine, Position, PositionCategory, Tag, Value,
};

fn setup(name: &str) -> (Engine<MemoryTree>, MemoryTree, NodeId) {
	let tree = MemoryTree::new();
	let node = tree.create_element(name);
	tree.append_child(tree.root(), node);
	(Engine::new(tree.clone()), tree, node)
}

#[test]
fn named_attribute() {
	let (engine, tree, node) = setup("div");
	let state = State::new("Misery");
	engine.bind(&node, Position::attribute("title"), state.clone()).unwrap();
	assert_eq!(tree.attribute(node, "title").as_deref(), Some("Misery"));

	state.set(1987);
	assert_eq!(tree.attribute(node, "title").as_deref(), Some("1987"));
	state.set(true);
	assert_eq!(tree.attribute(node, "title").as_deref(), Some(""));
	state.set(false);
	assert_eq!(tree.attribute(node, "title"), None);
	state.set(Value::Null);
	assert_eq!(tree.attribute(node, "title"), None);
}

#[test]
fn toggle() {
	let (engine, tree, node) = setup("button");
	let state = State::new(true);
	engine.bind(&node, Position::attribute("disabled"), sink::toggle(state.clone())).unwrap();
	assert_eq!(tree.attribute(node, "disabled").as_deref(), Some(""));
	state.set(0);
	assert_eq!(tree.attribute(node, "disabled"), None);
	state.set("yes");
	assert_eq!(tree.attribute(node, "disabled").as_deref(), Some(""));
}

#[test]
fn style_forms() {
	let (engine, tree, node) = setup("div");
	let state = State::new("color: red");
	engine.bind(&node, Position::attribute("style"), state.clone()).unwrap();
	assert_eq!(tree.attribute(node, "style").as_deref(), Some("color: red"));

	state.set(object! { "backgroundColor" => "blue", "--accent" => "green" });
	assert_eq!(tree.style_property(node, "background-color").as_deref(), Some("blue"));
	assert_eq!(tree.style_property(node, "--accent").as_deref(), Some("green"));

	state.set(object! { "backgroundColor" => "blue" });
	assert_eq!(tree.style_property(node, "--accent"), None);

	state.set("margin: 0");
	assert_eq!(tree.style_property(node, "background-color"), None);
	assert_eq!(tree.attribute(node, "style").as_deref(), Some("margin: 0"));
}

#[test]
fn style_property() {
	let (engine, tree, node) = setup("div");
	let state = State::new("red");
	engine.bind(&node, Position::style_property("color"), state.clone()).unwrap();
	assert_eq!(tree.style_property(node, "color").as_deref(), Some("red"));
	state.set(Value::Null);
	assert_eq!(tree.style_property(node, "color"), None);
}

#[test]
fn explicit_style_object() {
	let (engine, tree, node) = setup("div");
	engine.bind(&node, Position::Style, sink::style(object! { "fontSize" => "2em" })).unwrap();
	assert_eq!(tree.style_property(node, "font-size").as_deref(), Some("2em"));
	assert_eq!(
		engine.bind(&node, Position::Style, sink::style("font-size: 2em")),
		Err(BindError::UnsupportedValue {
			tag: Tag::Static,
			position: PositionCategory::Style,
		})
	);
}

#[test]
fn value_of_inputs() {
	let (engine, tree, input) = setup("input");
	let state = State::new("typed");
	engine.bind(&input, Position::attribute("value"), state.clone()).unwrap();
	assert_eq!(tree.value(input), "typed");
	assert_eq!(tree.attribute(input, "value"), None);
	state.set(Value::Null);
	assert_eq!(tree.value(input), "");

	let div = tree.create_element("div");
	engine.bind(&div, Position::attribute("value"), "plain").unwrap();
	assert_eq!(tree.attribute(div, "value").as_deref(), Some("plain"));
}

#[test]
fn class_forms() {
	let (engine, tree, node) = setup("div");
	let relay = Relay::new();
	engine.bind(&node, Position::Class, relay.clone()).unwrap();

	relay.emit(Value::array(["a", "b"]));
	assert_eq!(tree.attribute(node, "class").as_deref(), Some("a b"));
	relay.emit("b  c");
	assert_eq!(tree.attribute(node, "class").as_deref(), Some("b c"));
	relay.emit(object! { "c" => true, "d" => false });
	assert_eq!(tree.attribute(node, "class").as_deref(), Some("c"));
	relay.emit(object! { "c" => false });
	assert_eq!(tree.attribute(node, "class"), None);
}

#[test]
fn dataset() {
	let (engine, tree, node) = setup("div");
	engine.bind(&node, Position::Spread, sink::dataset(object! { "publishedYear" => 1987, "draft" => false })).unwrap();
	assert_eq!(tree.render_attributes(node), r#"data-published-year="1987""#);
}

#[test]
fn merge_scenario() {
	let (engine, tree, node) = setup("div");
	engine.bind(&node, Position::Spread, sink::dataset(object! { "author" => "Stephen King", "title" => "Misery" })).unwrap();
	engine.bind(&node, Position::Class, object! { "class1" => true, "class2" => false }).unwrap();
	engine
		.bind(&node, Position::Spread, object! { "class" => object! { "class3" => true, "class4" => false }, "data-year" => 1987 })
		.unwrap();
	assert_eq!(
		tree.render_attributes(node),
		r#"data-author="Stephen King" data-title="Misery" class="class1 class3" data-year="1987""#
	);
}

#[test]
fn merge_is_independent_of_emission_order() {
	let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
	for order in orders {
		let (engine, tree, node) = setup("div");
		let deferrals = [Deferral::new(), Deferral::new(), Deferral::new()];
		engine.bind(&node, Position::Spread, sink::dataset(deferrals[0].clone())).unwrap();
		engine.bind(&node, Position::Class, deferrals[1].clone()).unwrap();
		engine.bind(&node, Position::Spread, deferrals[2].clone()).unwrap();

		let values: [Value; 3] = [
			object! { "author" => "Stephen King", "title" => "Misery" }.into(),
			object! { "class1" => true, "class2" => false, "shared" => true }.into(),
			object! { "class" => object! { "class3" => true, "class4" => false, "shared" => false }, "data-year" => 1987, "data-title" => "It" }.into(),
		];
		for index in order {
			deferrals[index].resolve(values[index].clone());
		}

		let mut attributes = tree.attributes(node);
		attributes.sort();
		assert_eq!(
			attributes,
			vec![
				("class".to_owned(), "class1 class3".to_owned()),
				("data-author".to_owned(), "Stephen King".to_owned()),
				("data-title".to_owned(), "It".to_owned()),
				("data-year".to_owned(), "1987".to_owned()),
			],
			"resolution order {:?}",
			order
		);
	}
}

#[test]
fn later_declaration_wins_even_when_it_emits_first() {
	let (engine, tree, node) = setup("div");
	let first = Relay::new();
	let second = Relay::new();
	engine.bind(&node, Position::Spread, first.clone()).unwrap();
	engine.bind(&node, Position::Spread, second.clone()).unwrap();

	second.emit(object! { "title" => "second" });
	first.emit(object! { "title" => "first" });
	assert_eq!(tree.attribute(node, "title").as_deref(), Some("second"));

	second.emit(object! {});
	assert_eq!(tree.attribute(node, "title").as_deref(), Some("first"));
}

#[test]
fn identical_merge_is_silent() {
	let (engine, tree, node) = setup("div");
	let relay = Relay::new();
	engine.bind(&node, Position::Spread, relay.clone()).unwrap();

	relay.emit(object! { "title" => "x", "class" => "a b", "style" => object! { "color" => "red" } });
	let count = tree.mutation_count();
	relay.emit(object! { "title" => "x", "class" => "a b", "style" => object! { "color" => "red" } });
	assert_eq!(tree.mutation_count(), count);

	relay.emit(object! { "title" => "x" });
	assert_eq!(tree.mutation_count(), count + 2);
	assert_eq!(tree.render_attributes(node), r#"title="x""#);
	assert_eq!(tree.style_property(node, "color"), None);
}

#[test]
fn spread_mixins_fold_left_to_right() {
	let (engine, tree, node) = setup("div");
	engine
		.bind(&node, Position::Spread, Value::array([object! { "title" => "base", "lang" => "en" }, object! { "title" => "mixin" }]))
		.unwrap();
	assert_eq!(tree.render_attributes(node), r#"title="mixin" lang="en""#);
}

#[test]
fn reserved_names_never_reach_the_tree() {
	let (engine, tree, node) = setup("div");
	assert_eq!(
		engine.bind(&node, Position::attribute("bind:unknown"), "x"),
		Err(BindError::UnknownReservedName { name: "bind:unknown".into() })
	);
	engine.bind(&node, Position::attribute("bind:mount"), Value::function(|_| ())).unwrap();
	engine.bind(&node, Position::Spread, object! { "bind:mount" => "x", "title" => "kept" }).unwrap();
	assert_eq!(tree.render_attributes(node), r#"title="kept""#);
}

#[test]
fn on_names_are_events() {
	let (engine, tree, node) = setup("button");
	engine.bind(&node, Position::attribute("onclick"), Value::function(|_| ())).unwrap();
	assert_eq!(tree.attribute(node, "onclick"), None);
	assert_eq!(tree.listener_count(node), 1);
	assert_eq!(
		engine.bind(&node, Position::attribute("onclick"), "alert(1)"),
		Err(BindError::UnsupportedValue {
			tag: Tag::Static,
			position: PositionCategory::Event,
		})
	);
}
