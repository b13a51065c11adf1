mod common;

use common::{element, harness, nodes, Harness};
use state_dom::{feature, Dom, Error, StateNodeId, Value};

/// Checks that the DOM children are exactly the DOM nodes of the child list, in order.
fn assert_mirrors(h: &Harness, parent: StateNodeId) {
	let expected: Vec<_> = h
		.engine
		.tree()
		.list(parent, feature::ELEMENT_CHILDREN)
		.unwrap()
		.iter()
		.map(|child| h.engine.dom_node_of(child.as_node().unwrap()).unwrap())
		.collect();
	let actual = h.dom.children(h.engine.dom_node_of(parent).unwrap());
	assert_eq!(actual, expected);
}

fn list(h: &mut Harness, children: &[(u32, &str)]) -> (StateNodeId, Vec<StateNodeId>) {
	let parent = element(&mut h.engine, 1, "ul");
	let children: Vec<_> = children.iter().map(|&(id, tag)| element(&mut h.engine, id, tag)).collect();
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, nodes(&children)).unwrap();
	h.engine.create_and_bind(parent).unwrap();
	(parent, children)
}

#[test]
fn splices_wait_for_the_flush() {
	let mut h = harness();
	let (parent, _) = list(&mut h, &[(2, "li")]);
	let added = element(&mut h.engine, 3, "li");
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 1, 0, nodes(&[added])).unwrap();
	assert!(!h.engine.is_bound(added));
	assert_eq!(h.dom.child_tags(h.engine.dom_node_of(parent).unwrap()).len(), 1);

	h.engine.flush().unwrap();
	assert!(h.engine.is_bound(added));
	assert_mirrors(&h, parent);
}

#[test]
fn child_tag_set_in_the_same_batch() {
	let mut h = harness();
	let (parent, _) = list(&mut h, &[]);
	let trigger = h.engine.property(parent, feature::ELEMENT_PROPERTIES, "trigger").unwrap();

	let child = StateNodeId(2);
	h.engine.register_node(child);
	// Stands in for remote state that is resolved by another computation of the same batch.
	h.engine
		.run_tracked(move |engine, tracker| {
			if engine.get(tracker, trigger).is_some() {
				engine.set_property(child, feature::ELEMENT_DATA, feature::TAG, "span")?;
			}
			Ok(())
		})
		.unwrap();

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[child])).unwrap();
	h.engine.set_value(trigger, Some(true.into())).unwrap();
	h.engine.flush().unwrap();

	assert_eq!(h.dom.child_tags(h.engine.dom_node_of(parent).unwrap()), ["SPAN"]);
}

#[test]
fn inserts_and_removes_in_order() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li"), (3, "li")]);
	let (a, b) = (children[0], children[1]);
	let x = element(&mut h.engine, 4, "li");
	let y = element(&mut h.engine, 5, "li");
	let z = element(&mut h.engine, 6, "li");

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 1, 0, nodes(&[x, y])).unwrap();
	h.engine.flush().unwrap();
	assert_mirrors(&h, parent);

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 4, 0, nodes(&[z])).unwrap();
	h.engine.flush().unwrap();
	assert_mirrors(&h, parent);

	// Several splices in one batch.
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 2, Vec::new()).unwrap();
	h.engine.unregister_node(a).unwrap();
	h.engine.unregister_node(x).unwrap();
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 1, 1, Vec::new()).unwrap();
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 1, 0, nodes(&[b])).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.engine.tree().list(parent, feature::ELEMENT_CHILDREN).unwrap(), nodes(&[y, b, z]).as_slice());
	assert_mirrors(&h, parent);
}

#[test]
fn moved_children_keep_their_dom_node() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li"), (3, "li"), (4, "li")]);
	let first = children[0];
	let first_dom = h.engine.dom_node_of(first).unwrap();
	h.dom.user_input(first_dom, "scrollTop", 10).unwrap();

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 2, 0, nodes(&[first])).unwrap();
	h.engine.flush().unwrap();

	assert_mirrors(&h, parent);
	assert_eq!(h.engine.dom_node_of(first), Some(first_dom));
	assert_eq!(h.dom.property(first_dom, "scrollTop"), Some(Value::from(10)));
}

#[test]
fn removal_of_a_foreign_child_is_a_protocol_violation() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li")]);
	let parent_dom = h.engine.dom_node_of(parent).unwrap();
	let child_dom = h.engine.dom_node_of(children[0]).unwrap();
	// Layout code moved it away.
	h.dom.clone().remove_child(parent_dom, child_dom).unwrap();

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	let error = h.engine.flush().unwrap_err();
	assert_eq!(error, Error::NotAChild { parent });
	assert!(error.is_protocol_violation());
}

#[test]
fn unknown_children_are_skipped_but_cant_be_removed() {
	let mut h = harness();
	let (parent, _) = list(&mut h, &[]);
	let ghost = StateNodeId(99);
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[ghost])).unwrap();
	h.engine.flush().unwrap();
	assert!(h.dom.children(h.engine.dom_node_of(parent).unwrap()).is_empty());

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	assert_eq!(h.engine.flush(), Err(Error::UnboundChild(ghost)));
}

#[test]
fn child_unregistered_before_the_flush_is_still_removed() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li"), (3, "li")]);
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	h.engine.unregister_node(children[0]).unwrap();
	assert!(!h.engine.is_bound(children[0]));

	h.engine.flush().unwrap();
	assert_mirrors(&h, parent);
}

#[test]
fn unregistered_children_release_their_dom_nodes() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li"), (3, "li")]);
	let grandchild = element(&mut h.engine, 4, "b");
	h.engine.splice(children[0], feature::ELEMENT_CHILDREN, 0, 0, nodes(&[grandchild])).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.node_count(), 4);

	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	h.engine.unregister_node(children[0]).unwrap();
	h.engine.unregister_node(grandchild).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.node_count(), 2);
	assert_mirrors(&h, parent);

	// Still attached when forgotten, so dropped along with the parent.
	h.engine.unregister_node(children[1]).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.node_count(), 2);
	h.engine.unregister_node(parent).unwrap();
	h.engine.flush().unwrap();
	assert_eq!(h.dom.node_count(), 0);
}

#[test]
fn added_then_removed_in_one_batch() {
	let mut h = harness();
	let (parent, _) = list(&mut h, &[(2, "li")]);
	let transient = element(&mut h.engine, 3, "li");
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[transient])).unwrap();
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 1, Vec::new()).unwrap();
	h.engine.flush().unwrap();
	assert_mirrors(&h, parent);
}

#[test]
fn parent_torn_down_before_the_flush() {
	let mut h = harness();
	let (parent, _) = list(&mut h, &[]);
	let child = element(&mut h.engine, 2, "li");
	h.engine.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[child])).unwrap();
	h.engine.unregister_node(parent).unwrap();

	h.engine.flush().unwrap();
	assert!(!h.engine.is_bound(child));
}

#[test]
fn non_node_items_are_ignored() {
	let mut h = harness();
	let parent = element(&mut h.engine, 1, "ul");
	let child = element(&mut h.engine, 2, "li");
	h.engine
		.splice(parent, feature::ELEMENT_CHILDREN, 0, 0, vec![Value::from("junk"), Value::from(child)])
		.unwrap();
	let parent_dom = h.engine.create_and_bind(parent).unwrap();
	assert_eq!(h.dom.child_tags(parent_dom), ["LI"]);
}

#[test]
fn nested_children_are_bound_recursively() {
	let mut h = harness();
	let (parent, children) = list(&mut h, &[(2, "li")]);
	let item = children[0];
	let grandchild = element(&mut h.engine, 3, "b");
	h.engine.splice(item, feature::ELEMENT_CHILDREN, 0, 0, nodes(&[grandchild])).unwrap();
	h.engine.flush().unwrap();

	let item_dom = h.engine.dom_node_of(item).unwrap();
	assert_eq!(h.dom.child_tags(item_dom), ["B"]);
	assert_eq!(h.dom.parent(item_dom), h.engine.dom_node_of(parent));
}
