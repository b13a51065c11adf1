//! The replicated state tree: nodes, their map and list features, and the listeners observing them.
//!
//! [`StateTree`] only stores data. Mutations that have to notify listeners or invalidate computations
//! go through [`Engine`](crate::Engine), which owns the tree.

use crate::{
	error::{Error, Result},
	Engine, Value,
};
use core::fmt;
use hashbrown::HashMap;
use indexmap::IndexMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::trace;

/// Remote-assigned identity of a [state node](StateTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateNodeId(pub u32);

impl fmt::Display for StateNodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}

pub type FeatureId = u8;

/// Feature identifiers understood by the binders.
pub mod feature {
	use super::FeatureId;

	/// Map. `tag` holds the element's tag name.
	pub const ELEMENT_DATA: FeatureId = 0;
	/// Map of DOM properties.
	pub const ELEMENT_PROPERTIES: FeatureId = 1;
	/// List of [`Value::Node`](crate::Value::Node) children.
	pub const ELEMENT_CHILDREN: FeatureId = 2;
	/// Map of attributes.
	pub const ELEMENT_ATTRIBUTES: FeatureId = 3;
	/// Map keyed by DOM event type. Presence means the remote peer handles the event,
	/// the value is either [`Value::Null`](crate::Value::Null) or the constant pool key of the event data expressions.
	pub const ELEMENT_LISTENERS: FeatureId = 4;
	/// Map. `text` holds the data of a text node.
	pub const TEXT_NODE: FeatureId = 7;
	/// List of class name tokens.
	pub const CLASS_LIST: FeatureId = 11;
	/// Map of inline style properties.
	pub const ELEMENT_STYLE_PROPERTIES: FeatureId = 12;
	/// List of DOM property names that are sent upstream when they diverge.
	pub const SYNCHRONIZED_PROPERTIES: FeatureId = 13;
	/// List of DOM event types after which synchronized properties are compared.
	pub const SYNCHRONIZED_PROPERTY_EVENTS: FeatureId = 14;

	pub const TAG: &str = "tag";
	pub const TEXT: &str = "text";
}

new_key_type! {
	pub struct PropertyId;
	pub struct TreeListenerId;
}

pub type TreeListener = Box<dyn FnMut(&mut Engine, &TreeEvent) -> Result<()>>;

/// What a tree listener is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerTarget {
	/// A property was created in a map feature.
	PropertyAdded { node: StateNodeId, feature: FeatureId },
	/// A property's value changed, including to and from "no value".
	ValueChanged(PropertyId),
	/// A list feature was spliced.
	Splice { node: StateNodeId, feature: FeatureId },
	/// The node is being removed from the tree.
	Unregister(StateNodeId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
	PropertyAdded { node: StateNodeId, feature: FeatureId, property: PropertyId },
	ValueChanged { property: PropertyId, old: Option<Value>, new: Option<Value> },
	/// `removed` was replaced by `added` starting at `index`.
	Splice { node: StateNodeId, feature: FeatureId, index: usize, removed: Vec<Value>, added: Vec<Value> },
	Unregister { node: StateNodeId },
}

#[derive(Debug)]
pub(crate) enum Feature {
	Map(MapFeature),
	List(ListFeature),
}

impl Feature {
	fn shape(&self) -> &'static str {
		match self {
			Self::Map(_) => "map",
			Self::List(_) => "list",
		}
	}
}

#[derive(Debug, Default)]
pub(crate) struct MapFeature {
	properties: IndexMap<String, PropertyId>,
	add_listeners: Vec<TreeListenerId>,
}

#[derive(Debug, Default)]
pub(crate) struct ListFeature {
	items: Vec<Value>,
	splice_listeners: Vec<TreeListenerId>,
}

#[derive(Debug, Default)]
pub(crate) struct StateNode {
	features: HashMap<FeatureId, Feature>,
	unregister_listeners: Vec<TreeListenerId>,
}

#[derive(Debug)]
pub struct Property {
	node: StateNodeId,
	feature: FeatureId,
	name: String,
	value: Option<Value>,
	change_listeners: Vec<TreeListenerId>,
}

impl Property {
	#[must_use]
	pub fn node(&self) -> StateNodeId {
		self.node
	}

	#[must_use]
	pub fn feature(&self) -> FeatureId {
		self.feature
	}

	#[must_use]
	pub fn name(&self) -> &str {
		&self.name
	}

	#[must_use]
	pub fn has_value(&self) -> bool {
		self.value.is_some()
	}

	#[must_use]
	pub fn value(&self) -> Option<&Value> {
		self.value.as_ref()
	}
}

#[derive(Default)]
pub struct StateTree {
	nodes: HashMap<StateNodeId, StateNode>,
	properties: SlotMap<PropertyId, Property>,
	listeners: SlotMap<TreeListenerId, Option<TreeListener>>,
}

impl fmt::Debug for StateTree {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StateTree")
			.field("nodes", &self.nodes.len())
			.field("properties", &self.properties.len())
			.field("listeners", &self.listeners.len())
			.finish()
	}
}

impl StateTree {
	#[must_use]
	pub fn contains(&self, node: StateNodeId) -> bool {
		self.nodes.contains_key(&node)
	}

	/// Returns `false` if the node already existed.
	pub(crate) fn register(&mut self, node: StateNodeId) -> bool {
		match self.nodes.entry(node) {
			hashbrown::hash_map::Entry::Occupied(_) => false,
			hashbrown::hash_map::Entry::Vacant(vacant) => {
				vacant.insert(StateNode::default());
				true
			}
		}
	}

	/// Drops the node with all its properties and listeners. Returns the ids of the dropped properties.
	pub(crate) fn remove(&mut self, node: StateNodeId) -> Vec<PropertyId> {
		let state_node = match self.nodes.remove(&node) {
			Some(state_node) => state_node,
			None => return Vec::new(),
		};
		let mut properties = Vec::new();
		for listener in state_node.unregister_listeners {
			self.listeners.remove(listener);
		}
		for (_, feature) in state_node.features {
			match feature {
				Feature::Map(map) => {
					for listener in map.add_listeners {
						self.listeners.remove(listener);
					}
					for (_, property) in map.properties {
						if let Some(property_data) = self.properties.remove(property) {
							for listener in property_data.change_listeners {
								self.listeners.remove(listener);
							}
						}
						properties.push(property);
					}
				}
				Feature::List(list) => {
					for listener in list.splice_listeners {
						self.listeners.remove(listener);
					}
				}
			}
		}
		trace!("Dropped state node {} with {} property(ies).", node, properties.len());
		properties
	}

	fn node_mut(&mut self, node: StateNodeId) -> Result<&mut StateNode> {
		self.nodes.get_mut(&node).ok_or(Error::UnknownNode(node))
	}

	fn feature(&self, node: StateNodeId, feature: FeatureId) -> Result<Option<&Feature>> {
		Ok(self.nodes.get(&node).ok_or(Error::UnknownNode(node))?.features.get(&feature))
	}

	pub(crate) fn map_mut(&mut self, node: StateNodeId, feature: FeatureId) -> Result<&mut MapFeature> {
		match self.node_mut(node)?.features.entry(feature).or_insert_with(|| Feature::Map(MapFeature::default())) {
			Feature::Map(map) => Ok(map),
			other => Err(Error::FeatureShape {
				node,
				feature,
				expected: "map",
				actual: other.shape(),
			}),
		}
	}

	pub(crate) fn list_mut(&mut self, node: StateNodeId, feature: FeatureId) -> Result<&mut ListFeature> {
		match self.node_mut(node)?.features.entry(feature).or_insert_with(|| Feature::List(ListFeature::default())) {
			Feature::List(list) => Ok(list),
			other => Err(Error::FeatureShape {
				node,
				feature,
				expected: "list",
				actual: other.shape(),
			}),
		}
	}

	#[must_use]
	pub fn has_feature(&self, node: StateNodeId, feature: FeatureId) -> bool {
		matches!(self.feature(node, feature), Ok(Some(_)))
	}

	/// Looks up a property without creating it.
	pub fn find_property(&self, node: StateNodeId, feature: FeatureId, name: &str) -> Result<Option<PropertyId>> {
		match self.feature(node, feature)? {
			None => Ok(None),
			Some(Feature::Map(map)) => Ok(map.properties.get(name).copied()),
			Some(other) => Err(Error::FeatureShape {
				node,
				feature,
				expected: "map",
				actual: other.shape(),
			}),
		}
	}

	/// Returns the property and whether it was newly created.
	pub(crate) fn get_or_create_property(&mut self, node: StateNodeId, feature: FeatureId, name: &str) -> Result<(PropertyId, bool)> {
		if let Some(existing) = self.map_mut(node, feature)?.properties.get(name) {
			return Ok((*existing, false));
		}
		let property = self.properties.insert(Property {
			node,
			feature,
			name: name.to_owned(),
			value: None,
			change_listeners: Vec::new(),
		});
		self.map_mut(node, feature)?.properties.insert(name.to_owned(), property);
		Ok((property, true))
	}

	/// All properties of a map feature, in creation order.
	pub fn properties(&self, node: StateNodeId, feature: FeatureId) -> Result<Vec<PropertyId>> {
		match self.feature(node, feature)? {
			None => Ok(Vec::new()),
			Some(Feature::Map(map)) => Ok(map.properties.values().copied().collect()),
			Some(other) => Err(Error::FeatureShape {
				node,
				feature,
				expected: "map",
				actual: other.shape(),
			}),
		}
	}

	#[must_use]
	pub fn property(&self, property: PropertyId) -> Option<&Property> {
		self.properties.get(property)
	}

	/// Untracked read.
	#[must_use]
	pub fn value(&self, property: PropertyId) -> Option<&Value> {
		self.properties.get(property).and_then(Property::value)
	}

	/// Replaces the value, returning the previous one, or `None` if the property is unknown or the value is unchanged.
	pub(crate) fn replace_value(&mut self, property: PropertyId, value: Option<Value>) -> Option<Option<Value>> {
		let property = self.properties.get_mut(property)?;
		if property.value == value {
			return None;
		}
		Some(core::mem::replace(&mut property.value, value))
	}

	/// The items of a list feature. A feature that was never created reads as empty.
	pub fn list(&self, node: StateNodeId, feature: FeatureId) -> Result<&[Value]> {
		match self.feature(node, feature)? {
			None => Ok(&[]),
			Some(Feature::List(list)) => Ok(&list.items),
			Some(other) => Err(Error::FeatureShape {
				node,
				feature,
				expected: "list",
				actual: other.shape(),
			}),
		}
	}

	/// Array-splice semantics. Returns the removed items.
	pub(crate) fn splice(&mut self, node: StateNodeId, feature: FeatureId, index: usize, remove_count: usize, added: &[Value]) -> Result<Vec<Value>> {
		let list = self.list_mut(node, feature)?;
		let len = list.items.len();
		match index.checked_add(remove_count) {
			Some(end) if end <= len => Ok(list.items.splice(index..end, added.iter().cloned()).collect()),
			_ => Err(Error::SpliceRange { index, remove_count, len }),
		}
	}

	pub(crate) fn add_listener(&mut self, target: ListenerTarget, listener: TreeListener) -> Result<TreeListenerId> {
		// Validates the target before allocating.
		self.listener_list_mut(target)?;
		let id = self.listeners.insert(Some(listener));
		self.listener_list_mut(target)?.push(id);
		Ok(id)
	}

	/// Idempotent.
	pub(crate) fn remove_listener(&mut self, listener: TreeListenerId) -> bool {
		self.listeners.remove(listener).is_some()
	}

	fn listener_list_mut(&mut self, target: ListenerTarget) -> Result<&mut Vec<TreeListenerId>> {
		Ok(match target {
			ListenerTarget::PropertyAdded { node, feature } => &mut self.map_mut(node, feature)?.add_listeners,
			ListenerTarget::Splice { node, feature } => &mut self.list_mut(node, feature)?.splice_listeners,
			ListenerTarget::Unregister(node) => &mut self.node_mut(node)?.unregister_listeners,
			ListenerTarget::ValueChanged(property) => match self.properties.get_mut(property) {
				Some(property) => &mut property.change_listeners,
				None => return Err(Error::DroppedProperty),
			},
		})
	}

	/// Live listeners of `target` in registration order. Removed listeners are pruned on the way.
	pub(crate) fn listeners_of(&mut self, target: ListenerTarget) -> SmallVec<[TreeListenerId; 4]> {
		let listeners = &self.listeners;
		let list = match target {
			ListenerTarget::PropertyAdded { node, feature } | ListenerTarget::Splice { node, feature } => {
				match self.nodes.get_mut(&node).and_then(|node| node.features.get_mut(&feature)) {
					Some(Feature::Map(map)) if matches!(target, ListenerTarget::PropertyAdded { .. }) => &mut map.add_listeners,
					Some(Feature::List(list)) if matches!(target, ListenerTarget::Splice { .. }) => &mut list.splice_listeners,
					_ => return SmallVec::new(),
				}
			}
			ListenerTarget::Unregister(node) => match self.nodes.get_mut(&node) {
				Some(node) => &mut node.unregister_listeners,
				None => return SmallVec::new(),
			},
			ListenerTarget::ValueChanged(property) => match self.properties.get_mut(property) {
				Some(property) => &mut property.change_listeners,
				None => return SmallVec::new(),
			},
		};
		list.retain(|id| listeners.contains_key(*id));
		list.iter().copied().collect()
	}

	/// Takes the callback out for the duration of a call. `None` if removed or already running.
	pub(crate) fn take_listener(&mut self, listener: TreeListenerId) -> Option<TreeListener> {
		self.listeners.get_mut(listener).and_then(Option::take)
	}

	/// Puts a taken callback back, unless the listener was removed while it ran.
	pub(crate) fn restore_listener(&mut self, listener: TreeListenerId, callback: TreeListener) {
		if let Some(slot) = self.listeners.get_mut(listener) {
			*slot = Some(callback);
		}
	}

	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.len()
	}
}
