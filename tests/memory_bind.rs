mod common;

use common::{element, harness, nodes, strings, text, RecordingUpstream};
use state_dom::{feature, memory::MemoryDom, BindingStrategy, Config, Dom, Engine, Error, StateNodeId, Value};

#[test]
fn initial_state_is_mirrored() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	let label = text(&mut h.engine, 2, "Hello");
	let input = element(&mut h.engine, 3, "input");
	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "id", "greeting").unwrap();
	h.engine.set_property(div, feature::ELEMENT_STYLE_PROPERTIES, "color", "red").unwrap();
	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "typed").unwrap();
	h.engine.splice(div, feature::CLASS_LIST, 0, 0, strings(&["a", "b"])).unwrap();
	h.engine.splice(div, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[label, input])).unwrap();

	let dom_div = h.engine.create_and_bind(div).unwrap();

	assert_eq!(h.dom.tag_name(dom_div).as_deref(), Some("DIV"));
	assert_eq!(h.dom.attributes(dom_div)["id"], "greeting");
	assert_eq!(h.dom.style(dom_div, "color").as_deref(), Some("red"));
	assert_eq!(h.dom.classes(dom_div), ["a", "b"]);
	assert_eq!(h.dom.child_tags(dom_div), ["#text", "INPUT"]);

	let dom_label = h.engine.dom_node_of(label).unwrap();
	let dom_input = h.engine.dom_node_of(input).unwrap();
	assert_eq!(h.dom.text(dom_label).as_deref(), Some("Hello"));
	assert_eq!(h.dom.property(dom_input, "value"), Some(Value::from("typed")));
	assert_eq!(h.engine.state_node_of(dom_input), Some(input));
	assert!(h.engine.is_bound(label));
}

#[test]
fn later_changes_are_applied() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	let dom_div = h.engine.create_and_bind(div).unwrap();

	// New properties are bound as they appear.
	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "title", "first").unwrap();
	h.engine.set_property(div, feature::ELEMENT_STYLE_PROPERTIES, "width", "10px").unwrap();
	h.engine.set_property(div, feature::ELEMENT_PROPERTIES, "hidden", true).unwrap();
	assert_eq!(h.dom.attribute(dom_div, "title").as_deref(), Some("first"));
	assert_eq!(h.dom.style(dom_div, "width").as_deref(), Some("10px"));
	assert_eq!(h.dom.property(dom_div, "hidden"), Some(Value::Bool(true)));

	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "title", "second").unwrap();
	assert_eq!(h.dom.attribute(dom_div, "title").as_deref(), Some("first"), "not before the flush");
	h.engine.flush().unwrap();
	assert_eq!(h.dom.attribute(dom_div, "title").as_deref(), Some("second"));

	// Non-string values are stringified for attributes.
	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "tabindex", 3).unwrap();
	assert_eq!(h.dom.attribute(dom_div, "tabindex").as_deref(), Some("3"));
}

#[test]
fn absent_or_null_removes() {
	let mut h = harness();
	let input = element(&mut h.engine, 1, "input");
	h.engine.set_property(input, feature::ELEMENT_ATTRIBUTES, "title", "t").unwrap();
	h.engine.set_property(input, feature::ELEMENT_STYLE_PROPERTIES, "color", "red").unwrap();
	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "v").unwrap();
	let dom_input = h.engine.create_and_bind(input).unwrap();

	h.engine.set_property(input, feature::ELEMENT_ATTRIBUTES, "title", Value::Null).unwrap();
	h.engine.remove_property(input, feature::ELEMENT_STYLE_PROPERTIES, "color").unwrap();
	h.engine.remove_property(input, feature::ELEMENT_PROPERTIES, "value").unwrap();
	h.engine.flush().unwrap();

	assert_eq!(h.dom.attribute(dom_input, "title"), None);
	assert_eq!(h.dom.style(dom_input, "color"), None);
	// The own property is deleted, which uncovers the inherited default.
	assert!(!h.dom.has_own_property(dom_input, "value"));
	assert_eq!(h.dom.property(dom_input, "value"), Some(Value::from("")));
}

#[test]
fn absent_inherited_property_is_reset() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	h.engine.property(div, feature::ELEMENT_PROPERTIES, "title").unwrap();
	let dom_div = h.engine.create_and_bind(div).unwrap();
	assert_eq!(h.dom.property(dom_div, "title"), Some(Value::Null));

	// Both changes land in a single run, which finds the reset value as an own property and deletes it.
	let writes = h.dom.property_writes();
	h.engine.set_property(div, feature::ELEMENT_PROPERTIES, "title", "x").unwrap();
	h.engine.remove_property(div, feature::ELEMENT_PROPERTIES, "title").unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.property_writes(), writes + 1);
	assert!(!h.dom.has_own_property(dom_div, "title"));
}

#[test]
fn equal_values_are_not_written_again() {
	let mut h = harness();
	let input = element(&mut h.engine, 1, "input");
	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "a").unwrap();
	let dom_input = h.engine.create_and_bind(input).unwrap();
	assert_eq!(h.dom.property_writes(), 1);

	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "a").unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.property_writes(), 1);

	// The DOM already agrees with the new tree value.
	h.dom.user_input(dom_input, "value", "b").unwrap();
	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "b").unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.property_writes(), 1);

	h.engine.set_property(input, feature::ELEMENT_PROPERTIES, "value", "c").unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.property_writes(), 2);
	assert_eq!(h.dom.property(dom_input, "value"), Some(Value::from("c")));
}

#[test]
fn text_nodes() {
	let mut h = harness();
	let label = text(&mut h.engine, 1, "one");
	assert_eq!(BindingStrategy::for_node(h.engine.tree(), label), Some(BindingStrategy::Text));
	let dom_label = h.engine.create_and_bind(label).unwrap();
	assert_eq!(h.dom.tag_name(dom_label), None);
	assert_eq!(h.dom.text(dom_label).as_deref(), Some("one"));

	h.engine.set_property(label, feature::TEXT_NODE, feature::TEXT, "two").unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.text(dom_label).as_deref(), Some("two"));

	h.engine.remove_property(label, feature::TEXT_NODE, feature::TEXT).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.text(dom_label).as_deref(), Some(""));
}

#[test]
fn text_takes_priority() {
	let mut h = harness();
	let node = text(&mut h.engine, 1, "text");
	h.engine.set_property(node, feature::ELEMENT_DATA, feature::TAG, "span").unwrap();
	assert!(BindingStrategy::Element.is_applicable(h.engine.tree(), node));
	assert_eq!(BindingStrategy::for_node(h.engine.tree(), node), Some(BindingStrategy::Text));
}

#[test]
fn binding_an_existing_element() {
	let mut h = harness();
	let root = element(&mut h.engine, 1, "body");
	h.engine.set_property(root, feature::ELEMENT_ATTRIBUTES, "lang", "en").unwrap();
	let body = h.dom.clone().create_element("body").unwrap();

	h.engine.bind(root, body).unwrap();
	assert_eq!(h.dom.attribute(body, "lang").as_deref(), Some("en"));
	assert_eq!(h.engine.dom_node_of(root), Some(body));
}

#[test]
fn binding_preconditions() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	let span = h.dom.clone().create_element("span").unwrap();
	assert_eq!(
		h.engine.bind(div, span),
		Err(Error::TagMismatch {
			expected: "div".to_owned(),
			actual: "SPAN".to_owned()
		})
	);
	assert!(!h.engine.is_bound(div));
	assert_eq!(h.engine.dom_node_of(div), None);

	h.engine.create_and_bind(div).unwrap();
	assert_eq!(h.engine.create_and_bind(div), Err(Error::AlreadyBound(div)));

	let bare = StateNodeId(2);
	h.engine.register_node(bare);
	assert_eq!(h.engine.create_and_bind(bare), Err(Error::NoStrategy(bare)));

	h.engine.property(bare, feature::ELEMENT_DATA, "is").unwrap();
	assert_eq!(h.engine.create_and_bind(bare), Err(Error::MissingTag(bare)));

	assert_eq!(h.engine.create_and_bind(StateNodeId(3)), Err(Error::UnknownNode(StateNodeId(3))));
}

#[test]
fn failed_bind_is_undone() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "ok", "1").unwrap();
	h.engine.set_property(div, feature::ELEMENT_ATTRIBUTES, "not ok", "2").unwrap();

	let error = h.engine.create_and_bind(div).unwrap_err();
	assert!(matches!(error, Error::Dom(_)));
	assert!(!error.is_protocol_violation());
	assert!(!h.engine.is_bound(div));
	assert_eq!(h.engine.dom_node_of(div), None);
	assert_eq!(h.engine.reactive().computation_count(), 0);
	assert_eq!(h.engine.tree().listener_count(), 0);
}

#[test]
fn failed_child_unbinds_its_bound_siblings() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	let span = element(&mut h.engine, 2, "span");
	let bold = element(&mut h.engine, 3, "b");
	let broken = StateNodeId(4);
	h.engine.register_node(broken);
	h.engine.property(broken, feature::ELEMENT_DATA, "is").unwrap();
	h.engine.set_property(span, feature::ELEMENT_LISTENERS, "click", Value::Null).unwrap();
	h.engine.set_property(bold, feature::ELEMENT_ATTRIBUTES, "title", "b").unwrap();
	h.engine.splice(span, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[bold])).unwrap();
	h.engine.splice(div, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[span, broken])).unwrap();

	assert_eq!(h.engine.create_and_bind(div), Err(Error::MissingTag(broken)));
	for node in [div, span, bold, broken] {
		assert!(!h.engine.is_bound(node), "{} is still bound", node);
		assert_eq!(h.engine.dom_node_of(node), None);
	}
	assert_eq!(h.engine.reactive().computation_count(), 0);
	assert_eq!(h.engine.dom_listener_count(), 0);
	assert_eq!(h.dom.listener_count(), 0);
	assert_eq!(h.engine.tree().listener_count(), 0);
	assert_eq!(h.dom.node_count(), 0);
}

#[test]
fn failed_bind_into_an_existing_element_empties_it() {
	let mut h = harness();
	let root = element(&mut h.engine, 1, "body");
	let item = element(&mut h.engine, 2, "p");
	let broken = StateNodeId(3);
	h.engine.register_node(broken);
	h.engine.property(broken, feature::ELEMENT_DATA, "is").unwrap();
	h.engine.splice(root, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[item, broken])).unwrap();
	let body = h.dom.clone().create_element("body").unwrap();

	assert_eq!(h.engine.bind(root, body), Err(Error::MissingTag(broken)));
	assert!(h.dom.children(body).is_empty());
	assert!(!h.engine.is_bound(item));
	// The host's element stays usable.
	assert_eq!(h.dom.node_count(), 1);
	assert_eq!(h.dom.tag_name(body).as_deref(), Some("BODY"));
}

#[test]
fn deep_trees_hit_the_depth_limit() {
	common::init_logging();
	let dom = MemoryDom::new();
	let mut engine = Engine::with_config(
		dom.clone(),
		RecordingUpstream::default(),
		Config {
			bind_depth_limit: 2,
			..Config::default()
		},
	);
	let chain: Vec<StateNodeId> = (1..=4).map(|i| element(&mut engine, i, "div")).collect();
	for pair in chain.windows(2) {
		engine.splice(pair[0], feature::ELEMENT_CHILDREN, 0, 0, nodes(&[pair[1]])).unwrap();
	}

	assert_eq!(engine.create_and_bind(chain[0]), Err(Error::DepthLimit(2)));
	assert!(chain.iter().all(|node| !engine.is_bound(*node)));
	assert_eq!(dom.node_count(), 0);

	// Three levels are fine.
	engine.splice(chain[2], feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	engine.create_and_bind(chain[0]).unwrap();
}

#[test]
fn class_list_mirror() {
	let mut h = harness();
	let div = element(&mut h.engine, 1, "div");
	h.engine.splice(div, feature::CLASS_LIST, 0, 0, strings(&["a", "b"])).unwrap();
	let dom_div = h.engine.create_and_bind(div).unwrap();

	let operations: &[(usize, usize, &[&str])] = &[(2, 0, &["c", "a"]), (0, 1, &[]), (1, 1, &["d"]), (0, 2, &["e"]), (0, 1, &[])];
	for &(index, remove_count, added) in operations {
		h.engine.splice(div, feature::CLASS_LIST, index, remove_count, strings(added)).unwrap();

		let mut expected: Vec<String> = h.engine.tree().list(div, feature::CLASS_LIST).unwrap().iter().filter_map(Value::as_str).map(str::to_owned).collect();
		expected.sort();
		expected.dedup();
		let mut actual = h.dom.classes(dom_div);
		actual.sort();
		assert_eq!(actual, expected);
	}
}
