//! Binds an element state node to a DOM element.
//!
//! Each aspect of the element gets its own reactive wiring:
//!
//! - [`feature::ELEMENT_PROPERTIES`], [`feature::ELEMENT_STYLE_PROPERTIES`] and [`feature::ELEMENT_ATTRIBUTES`]
//!   get one computation per property, including properties added later.
//! - [`feature::SYNCHRONIZED_PROPERTY_EVENTS`] decides which native events compare
//!   the DOM against [`feature::SYNCHRONIZED_PROPERTIES`] and report differences upstream.
//! - [`feature::ELEMENT_CHILDREN`] is bound recursively. Later splices are applied in a flush listener,
//!   once newly added children have settled.
//! - [`feature::ELEMENT_LISTENERS`] arms one native listener per event type that has a remote handler.
//! - [`feature::CLASS_LIST`] is mirrored onto the class list directly.
//!
//! Everything created here is recorded in the node's binding context and released on unregistration.

use crate::{
	dom::{DomNodeId, EventData},
	error::{Error, Result},
	expression::{Expression, Scope},
	tree::{feature, FeatureId, ListenerTarget, PropertyId, TreeEvent},
	Engine, StateNodeId, Value,
};
use std::{collections::BTreeMap, rc::Rc};
use tracing::{instrument, trace, trace_span, warn};

/// Where a map feature's values end up on the element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
	Property,
	Style,
	Attribute,
}

impl Target {
	fn feature(self) -> FeatureId {
		match self {
			Self::Property => feature::ELEMENT_PROPERTIES,
			Self::Style => feature::ELEMENT_STYLE_PROPERTIES,
			Self::Attribute => feature::ELEMENT_ATTRIBUTES,
		}
	}
}

/// The declared tag of `node`, read without tracking.
pub(crate) fn tag(engine: &Engine, node: StateNodeId) -> Result<Option<String>> {
	Ok(engine
		.tree
		.find_property(node, feature::ELEMENT_DATA, feature::TAG)?
		.and_then(|property| engine.tree.value(property))
		.and_then(Value::as_str)
		.map(str::to_owned))
}

#[instrument(skip(engine))]
pub(crate) fn bind(engine: &mut Engine, node: StateNodeId, element: DomNodeId, depth: usize) -> Result<()> {
	if let Some(expected) = tag(engine, node)? {
		let actual = engine.dom.tag_name(element).unwrap_or_else(|| "#text".to_owned());
		if !actual.eq_ignore_ascii_case(&expected) {
			return Err(Error::TagMismatch { expected, actual });
		}
	}

	for target in [Target::Property, Target::Style, Target::Attribute] {
		bind_map(engine, node, element, target)?;
	}
	bind_synchronized_properties(engine, node, element)?;
	bind_children(engine, node, element, depth)?;
	bind_listeners(engine, node, element)?;
	bind_class_list(engine, node, element)
}

fn bind_map(engine: &mut Engine, node: StateNodeId, element: DomNodeId, target: Target) -> Result<()> {
	let span = trace_span!("Binding map", ?target);
	let _enter = span.enter();

	for property in engine.tree.properties(node, target.feature())? {
		bind_property(engine, node, element, target, property)?;
	}
	let listener = engine.add_tree_listener(ListenerTarget::PropertyAdded { node, feature: target.feature() }, move |engine, event| match event {
		TreeEvent::PropertyAdded { property, .. } => bind_property(engine, node, element, target, *property),
		_ => Ok(()),
	})?;
	engine.binding_mut(node)?.tree_listeners.push(listener);
	Ok(())
}

fn bind_property(engine: &mut Engine, node: StateNodeId, element: DomNodeId, target: Target, property: PropertyId) -> Result<()> {
	let name = match engine.tree.property(property) {
		Some(property) => property.name().to_owned(),
		None => return Err(Error::DroppedProperty),
	};
	trace!("Binding {:?} {:?}.", target, name);

	let computation = {
		let name = name.clone();
		engine.run_tracked(move |engine, tracker| {
			let value = engine.get(tracker, property);
			match target {
				Target::Property => update_property(engine, element, &name, value),
				Target::Style => update_style(engine, element, &name, value),
				Target::Attribute => update_attribute(engine, element, &name, value),
			}
		})?
	};
	let previous = engine.binding_mut(node)?.computations.insert((target.feature(), name), computation);
	if let Some(previous) = previous {
		engine.stop(previous);
	}
	Ok(())
}

/// Writes only when the DOM disagrees, so that a synchronized property doesn't bounce back.
fn update_property(engine: &mut Engine, element: DomNodeId, name: &str, value: Option<Value>) -> Result<()> {
	let current = engine.dom.property(element, name);
	match value {
		Some(value) => {
			if current.as_ref() != Some(&value) {
				log_write(name, &value);
				engine.dom.set_property(element, name, &value)?;
			}
		}
		None if engine.dom.has_own_property(element, name) => {
			trace!("Deleting property {:?}.", name);
			engine.dom.delete_property(element, name)?;
		}
		// Inherited properties can't be deleted, so they are reset instead.
		None => {
			if current.map_or(false, |current| !current.is_null()) {
				trace!("Resetting inherited property {:?}.", name);
				engine.dom.set_property(element, name, &Value::Null)?;
			}
		}
	}
	Ok(())
}

fn update_style(engine: &mut Engine, element: DomNodeId, name: &str, value: Option<Value>) -> Result<()> {
	match value.filter(|value| !value.is_null()) {
		Some(value) => {
			let value = value.to_attribute_string();
			if engine.dom.style(element, name).as_deref() != Some(value.as_str()) {
				engine.dom.set_style(element, name, &value)?;
			}
		}
		None => {
			if engine.dom.style(element, name).is_some() {
				engine.dom.remove_style(element, name)?;
			}
		}
	}
	Ok(())
}

fn update_attribute(engine: &mut Engine, element: DomNodeId, name: &str, value: Option<Value>) -> Result<()> {
	match value.filter(|value| !value.is_null()) {
		Some(value) => {
			let value = value.to_attribute_string();
			if engine.dom.attribute(element, name).as_deref() != Some(value.as_str()) {
				engine.dom.set_attribute(element, name, &value)?;
			}
		}
		None => {
			if engine.dom.attribute(element, name).is_some() {
				engine.dom.remove_attribute(element, name)?;
			}
		}
	}
	Ok(())
}

fn log_write(name: &str, value: &Value) {
	if cfg!(feature = "dangerous-logging") {
		trace!("Setting property {:?} to {:?}.", name, value);
	} else {
		trace!("Setting property {:?}.", name);
	}
}

fn strings(items: &[Value]) -> impl Iterator<Item = String> + '_ {
	items.iter().filter_map(|item| match item {
		Value::String(string) => Some(string.clone()),
		Value::Null => None,
		other => Some(other.to_attribute_string()),
	})
}

fn bind_synchronized_properties(engine: &mut Engine, node: StateNodeId, element: DomNodeId) -> Result<()> {
	let event_types: Vec<String> = strings(engine.tree.list(node, feature::SYNCHRONIZED_PROPERTY_EVENTS)?).collect();
	for event_type in event_types {
		add_synchronization_listener(engine, node, element, event_type)?;
	}

	let listener = engine.add_tree_listener(
		ListenerTarget::Splice {
			node,
			feature: feature::SYNCHRONIZED_PROPERTY_EVENTS,
		},
		move |engine, event| {
			let (removed, added) = match event {
				TreeEvent::Splice { removed, added, .. } => (removed, added),
				_ => return Ok(()),
			};
			let current: Vec<String> = strings(engine.tree.list(node, feature::SYNCHRONIZED_PROPERTY_EVENTS)?).collect();
			for event_type in strings(removed) {
				if current.contains(&event_type) {
					continue;
				}
				let listener = engine.binding_mut(node)?.synchronization_listeners.remove(&event_type);
				if let Some(listener) = listener {
					trace!("No longer synchronizing on {:?}.", event_type);
					engine.remove_dom_listener(listener)?;
				}
			}
			for event_type in strings(added) {
				add_synchronization_listener(engine, node, element, event_type)?;
			}
			Ok(())
		},
	)?;
	engine.binding_mut(node)?.tree_listeners.push(listener);
	Ok(())
}

fn add_synchronization_listener(engine: &mut Engine, node: StateNodeId, element: DomNodeId, event_type: String) -> Result<()> {
	if engine.binding_mut(node)?.synchronization_listeners.contains_key(&event_type) {
		return Ok(());
	}
	trace!("Synchronizing on {:?}.", event_type);
	let listener = engine.add_dom_listener(element, &event_type, move |engine, _| synchronize(engine, node, element))?;
	engine.binding_mut(node)?.synchronization_listeners.insert(event_type, listener);
	Ok(())
}

/// Sends every synchronized property whose DOM value differs from the tree's upstream.
fn synchronize(engine: &mut Engine, node: StateNodeId, element: DomNodeId) -> Result<()> {
	let names: Vec<String> = strings(engine.tree.list(node, feature::SYNCHRONIZED_PROPERTIES)?).collect();
	for name in names {
		let dom_value = match engine.dom.property(element, &name) {
			Some(value) => value,
			None => continue,
		};
		let tree_value = engine
			.tree
			.find_property(node, feature::ELEMENT_PROPERTIES, &name)?
			.and_then(|property| engine.tree.value(property));
		if tree_value == Some(&dom_value) {
			continue;
		}
		engine.sync_property(node, &name, dom_value)?;
	}
	Ok(())
}

fn child_node(item: &Value) -> Option<StateNodeId> {
	let child = item.as_node();
	if child.is_none() {
		warn!("Ignoring child list item that is not a state node: {:?}. Later DOM child positions are off by one.", item);
	}
	child
}

/// The DOM node for `child`. Children that are already bound (moved ones) keep theirs.
fn child_dom_node(engine: &mut Engine, child: StateNodeId, depth: usize) -> Result<DomNodeId> {
	match engine.dom_node_of(child) {
		Some(dom_node) if engine.is_bound(child) => Ok(dom_node),
		_ => engine.create_and_bind_at(child, depth + 1),
	}
}

fn bind_children(engine: &mut Engine, node: StateNodeId, element: DomNodeId, depth: usize) -> Result<()> {
	let span = trace_span!("Binding children");
	let _enter = span.enter();

	let children: Vec<StateNodeId> = engine.tree.list(node, feature::ELEMENT_CHILDREN)?.iter().filter_map(child_node).collect();
	for child in children {
		let child_dom = child_dom_node(engine, child, depth)?;
		engine.dom.insert_before(element, child_dom, None)?;
	}

	let listener = engine.add_tree_listener(
		ListenerTarget::Splice {
			node,
			feature: feature::ELEMENT_CHILDREN,
		},
		move |engine, event| {
			let (index, removed, added) = match event {
				TreeEvent::Splice { index, removed, added, .. } => (*index, removed, added),
				_ => return Ok(()),
			};
			// A removed child may be unregistered before the flush, so its DOM node is looked up now.
			let removed: Vec<(StateNodeId, Option<DomNodeId>)> = removed.iter().filter_map(child_node).map(|child| (child, engine.dom_node_of(child))).collect();
			let added: Vec<StateNodeId> = added.iter().filter_map(child_node).collect();
			trace!("Deferring child splice at {}: -{} +{}.", index, removed.len(), added.len());
			engine.add_flush_listener(move |engine| apply_child_splice(engine, node, element, depth, index, &removed, &added));
			Ok(())
		},
	)?;
	engine.binding_mut(node)?.tree_listeners.push(listener);
	Ok(())
}

#[instrument(skip(engine, removed, added))]
fn apply_child_splice(engine: &mut Engine, node: StateNodeId, element: DomNodeId, depth: usize, index: usize, removed: &[(StateNodeId, Option<DomNodeId>)], added: &[StateNodeId]) -> Result<()> {
	if !engine.is_bound(node) {
		trace!("State node {} was torn down before its child splice was applied.", node);
		return Ok(());
	}

	for (child, dom_node) in removed {
		let child_dom = dom_node.or_else(|| engine.dom_node_of(*child)).ok_or(Error::UnboundChild(*child))?;
		if engine.dom.parent(child_dom) != Some(element) {
			return Err(Error::NotAChild { parent: node });
		}
		engine.dom.remove_child(element, child_dom)?;
	}

	let reference = engine.dom.child_at(element, index);
	for child in added {
		if !engine.tree.contains(*child) {
			warn!(
				"Skipping child {}, which was unregistered before it could be inserted. Later DOM child positions of {} are off by one.",
				child, node
			);
			continue;
		}
		let child_dom = child_dom_node(engine, *child, depth)?;
		engine.dom.insert_before(element, child_dom, reference)?;
	}
	Ok(())
}

fn bind_listeners(engine: &mut Engine, node: StateNodeId, element: DomNodeId) -> Result<()> {
	let span = trace_span!("Binding event listeners");
	let _enter = span.enter();

	for property in engine.tree.properties(node, feature::ELEMENT_LISTENERS)? {
		bind_listener(engine, node, element, property)?;
	}
	let listener = engine.add_tree_listener(
		ListenerTarget::PropertyAdded {
			node,
			feature: feature::ELEMENT_LISTENERS,
		},
		move |engine, event| match event {
			TreeEvent::PropertyAdded { property, .. } => bind_listener(engine, node, element, *property),
			_ => Ok(()),
		},
	)?;
	engine.binding_mut(node)?.tree_listeners.push(listener);
	Ok(())
}

/// Keeps a native listener for the property's event type armed exactly while the property has a value.
fn bind_listener(engine: &mut Engine, node: StateNodeId, element: DomNodeId, property: PropertyId) -> Result<()> {
	let event_type = match engine.tree.property(property) {
		Some(property) => property.name().to_owned(),
		None => return Err(Error::DroppedProperty),
	};

	let computation = {
		let event_type = event_type.clone();
		engine.run_tracked(move |engine, tracker| {
			let present = engine.has_value(tracker, property);
			let attached = engine.binding_mut(node)?.listeners.contains_key(&event_type);
			if present && !attached {
				trace!("Attaching {:?} listener.", event_type);
				let handled_type = event_type.clone();
				let listener = engine.add_dom_listener(element, &event_type, move |engine, event| handle_event(engine, node, element, property, &handled_type, event))?;
				engine.binding_mut(node)?.listeners.insert(event_type.clone(), listener);
			} else if !present && attached {
				trace!("Detaching {:?} listener.", event_type);
				let listener = engine.binding_mut(node)?.listeners.remove(&event_type);
				if let Some(listener) = listener {
					engine.remove_dom_listener(listener)?;
				}
			}
			Ok(())
		})?
	};
	let previous = engine.binding_mut(node)?.computations.insert((feature::ELEMENT_LISTENERS, event_type), computation);
	if let Some(previous) = previous {
		engine.stop(previous);
	}
	Ok(())
}

fn handle_event(engine: &mut Engine, node: StateNodeId, element: DomNodeId, property: PropertyId, event_type: &str, event: &dyn EventData) -> Result<()> {
	let payload = event_payload(engine, node, element, property, event)?;
	engine.send_event(node, event_type, payload);
	Ok(())
}

/// Evaluates the event data expressions stored under the handler's constant pool key, keyed by their source.
fn event_payload(engine: &mut Engine, node: StateNodeId, element: DomNodeId, property: PropertyId, event: &dyn EventData) -> Result<Option<Value>> {
	let key = match engine.tree.value(property) {
		Some(Value::String(key)) => key.clone(),
		_ => return Ok(None),
	};
	let sources: Vec<String> = match engine.constants.get(&key)? {
		Value::Array(items) => strings(items).collect(),
		other => {
			return Err(Error::Expression {
				expression: other.to_string(),
				reason: format!("constant {:?} is not a list of expressions", key),
			})
		}
	};

	let mut compiled: Vec<(String, Rc<Expression>)> = Vec::with_capacity(sources.len());
	for source in sources {
		let expression = engine.expressions.get_or_compile(&source)?;
		compiled.push((source, expression));
	}

	let scope = Scope {
		event,
		element,
		node,
		dom: &*engine.dom,
	};
	let payload: BTreeMap<String, Value> = compiled
		.into_iter()
		.map(|(source, expression)| {
			let value = expression.evaluate(&scope);
			(source, value)
		})
		.collect();
	Ok(Some(Value::Object(payload)))
}

fn bind_class_list(engine: &mut Engine, node: StateNodeId, element: DomNodeId) -> Result<()> {
	let tokens: Vec<String> = strings(engine.tree.list(node, feature::CLASS_LIST)?).collect();
	for token in tokens {
		engine.dom.add_class(element, &token)?;
	}

	let listener = engine.add_tree_listener(ListenerTarget::Splice { node, feature: feature::CLASS_LIST }, move |engine, event| {
		let (removed, added) = match event {
			TreeEvent::Splice { removed, added, .. } => (removed, added),
			_ => return Ok(()),
		};
		let current: Vec<String> = strings(engine.tree.list(node, feature::CLASS_LIST)?).collect();
		for token in strings(removed) {
			// Duplicates in the list keep the class alive.
			if !current.contains(&token) {
				engine.dom.remove_class(element, &token)?;
			}
		}
		for token in strings(added) {
			engine.dom.add_class(element, &token)?;
		}
		Ok(())
	})?;
	engine.binding_mut(node)?.tree_listeners.push(listener);
	Ok(())
}
