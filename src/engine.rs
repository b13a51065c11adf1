use crate::{
	binder::BindingContext,
	constant_pool::ConstantPool,
	dom::{Dom, DomNodeId, EventData},
	error::{Error, Result},
	expression::ExpressionCache,
	reactive::{Reactive, Tracker},
	tree::{feature, FeatureId, ListenerTarget, PropertyId, StateTree, TreeEvent, TreeListenerId},
	StateNodeId, Value,
};
use core::fmt;
use hashbrown::HashMap;
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use tracing::{error, instrument, trace, trace_span, warn};

/// Where locally originated changes go. Both calls are fire-and-forget.
pub trait Upstream {
	fn send_event(&mut self, node: StateNodeId, event_type: &str, payload: Option<Value>);
	fn send_property_sync(&mut self, node: StateNodeId, property: &str, value: &Value);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
	/// How deep child binding may recurse.
	pub bind_depth_limit: usize,
	/// How many computation runs and flush listeners a single [`Engine::flush`] may process.
	pub flush_step_limit: usize,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			bind_depth_limit: 256,
			flush_step_limit: 100_000,
		}
	}
}

new_key_type! {
	pub struct DomListenerId;
}

pub type DomListener = Box<dyn FnMut(&mut Engine, &dyn EventData) -> Result<()>>;

struct DomListenerEntry {
	node: DomNodeId,
	event_type: String,
	callback: Option<DomListener>,
}

/// Owns the state tree and everything bound to it.
///
/// All entry points are synchronous. Tree mutations notify listeners immediately,
/// but computations only re-run during [`Engine::flush`]. [`Engine::dispatch`] flushes on its own.
pub struct Engine {
	pub(crate) tree: StateTree,
	pub(crate) reactive: Reactive,
	pub(crate) constants: ConstantPool,
	pub(crate) expressions: ExpressionCache,
	pub(crate) dom: Box<dyn Dom>,
	upstream: Box<dyn Upstream>,
	pub(crate) config: Config,
	dom_listeners: SlotMap<DomListenerId, DomListenerEntry>,
	/// Per (DOM node, event type), in registration order. A key is present exactly while its native listener is armed.
	dom_listener_targets: HashMap<(DomNodeId, String), SmallVec<[DomListenerId; 2]>>,
	dom_nodes: HashMap<StateNodeId, DomNodeId>,
	state_nodes: HashMap<DomNodeId, StateNodeId>,
	pub(crate) bindings: HashMap<StateNodeId, BindingContext>,
}

impl fmt::Debug for Engine {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Engine")
			.field("tree", &self.tree)
			.field("reactive", &self.reactive)
			.field("constants", &self.constants.len())
			.field("expressions", &self.expressions.len())
			.field("config", &self.config)
			.field("dom_listeners", &self.dom_listeners.len())
			.field("bindings", &self.bindings.len())
			.finish()
	}
}

impl Engine {
	#[must_use]
	pub fn new(dom: impl Dom + 'static, upstream: impl Upstream + 'static) -> Self {
		Self::with_config(dom, upstream, Config::default())
	}

	#[must_use]
	pub fn with_config(dom: impl Dom + 'static, upstream: impl Upstream + 'static, config: Config) -> Self {
		Self {
			tree: StateTree::default(),
			reactive: Reactive::default(),
			constants: ConstantPool::new(),
			expressions: ExpressionCache::default(),
			dom: Box::new(dom),
			upstream: Box::new(upstream),
			config,
			dom_listeners: SlotMap::with_key(),
			dom_listener_targets: HashMap::new(),
			dom_nodes: HashMap::new(),
			state_nodes: HashMap::new(),
			bindings: HashMap::new(),
		}
	}

	#[must_use]
	pub fn tree(&self) -> &StateTree {
		&self.tree
	}

	#[must_use]
	pub fn reactive(&self) -> &Reactive {
		&self.reactive
	}

	#[must_use]
	pub fn constants(&self) -> &ConstantPool {
		&self.constants
	}

	#[must_use]
	pub fn dom(&self) -> &dyn Dom {
		&*self.dom
	}

	pub fn dom_mut(&mut self) -> &mut dyn Dom {
		&mut *self.dom
	}

	#[must_use]
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn import_constants(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
		self.constants.import(entries);
	}

	/// Returns `false` if the node was already registered.
	pub fn register_node(&mut self, node: StateNodeId) -> bool {
		let registered = self.tree.register(node);
		if registered {
			trace!("Registered state node {}.", node);
		} else {
			warn!("State node {} is already registered.", node);
		}
		registered
	}

	/// Notifies unregister listeners (which tear down the node's binding) and drops the node.
	///
	/// Unregistering an unknown or already unregistered node only logs a warning.
	/// Every listener runs even if an earlier one fails, and the node is dropped regardless. The first error is returned.
	#[instrument(skip(self))]
	pub fn unregister_node(&mut self, node: StateNodeId) -> Result<()> {
		if !self.tree.contains(node) {
			warn!("Ignoring unregistration of unknown state node {}.", node);
			return Ok(());
		}

		let event = TreeEvent::Unregister { node };
		let mut result = Ok(());
		for listener in self.tree.listeners_of(ListenerTarget::Unregister(node)) {
			if let Some(mut callback) = self.tree.take_listener(listener) {
				let outcome = callback(self, &event);
				self.tree.restore_listener(listener, callback);
				if let Err(error) = outcome {
					error!("Unregister listener of state node {} failed: {}", node, error);
					if result.is_ok() {
						result = Err(error);
					}
				}
			}
		}
		// Listeners may have torn the binding down already. This covers nodes bound without one.
		self.teardown(node);

		for property in self.tree.remove(node) {
			self.reactive.forget(property);
		}
		if let Some(dom_node) = self.dom_nodes.remove(&node) {
			self.state_nodes.remove(&dom_node);
			// Child splices queued earlier in this batch may still have to detach it.
			self.add_flush_listener(move |engine| {
				trace!("Releasing DOM node {:?} of unregistered state node {}.", dom_node, node);
				engine.dom.forget(dom_node);
				Ok(())
			});
		}
		result
	}

	/// Gets or creates a map property. Creation notifies [`ListenerTarget::PropertyAdded`] listeners.
	pub fn property(&mut self, node: StateNodeId, feature: FeatureId, name: &str) -> Result<PropertyId> {
		self.create_property(node, feature, name, None)
	}

	/// Like [`Engine::property`], but a newly created property starts out with `initial`
	/// before add listeners see it.
	fn create_property(&mut self, node: StateNodeId, feature: FeatureId, name: &str, initial: Option<Value>) -> Result<PropertyId> {
		let (property, created) = self.tree.get_or_create_property(node, feature, name)?;
		if created {
			trace!("Created property {:?} in feature {} of state node {}.", name, feature, node);
			self.tree.replace_value(property, initial);
			self.fire(ListenerTarget::PropertyAdded { node, feature }, &TreeEvent::PropertyAdded { node, feature, property })?;
		}
		Ok(property)
	}

	pub fn set_property(&mut self, node: StateNodeId, feature: FeatureId, name: &str, value: impl Into<Value>) -> Result<()> {
		let value = value.into();
		match self.tree.find_property(node, feature, name)? {
			Some(property) => self.set_value(property, Some(value)),
			None => self.create_property(node, feature, name, Some(value)).map(drop),
		}
	}

	/// Makes the property have no value. This is different from setting [`Value::Null`].
	pub fn remove_property(&mut self, node: StateNodeId, feature: FeatureId, name: &str) -> Result<()> {
		match self.tree.find_property(node, feature, name)? {
			Some(property) => self.set_value(property, None),
			None => Ok(()),
		}
	}

	/// Writing a value equal to the current one does nothing at all.
	pub fn set_value(&mut self, property: PropertyId, value: Option<Value>) -> Result<()> {
		if self.tree.property(property).is_none() {
			return Err(Error::DroppedProperty);
		}
		let new = value.clone();
		let old = match self.tree.replace_value(property, value) {
			Some(old) => old,
			None => return Ok(()),
		};
		if cfg!(feature = "dangerous-logging") {
			trace!("Property {:?} changed from {:?} to {:?}.", property, old, new);
		} else {
			trace!("Property {:?} changed.", property);
		}
		self.reactive.invalidate(property);
		self.fire(ListenerTarget::ValueChanged(property), &TreeEvent::ValueChanged { property, old, new })
	}

	/// Tracked read. The computation behind `tracker` re-runs when the value changes.
	pub fn get(&mut self, tracker: Tracker, property: PropertyId) -> Option<Value> {
		self.reactive.track(tracker, property);
		self.tree.value(property).cloned()
	}

	/// Tracked presence check. Only a change between "no value" and some value matters to the caller,
	/// but like every tracked read it re-runs on any change.
	pub fn has_value(&mut self, tracker: Tracker, property: PropertyId) -> bool {
		self.reactive.track(tracker, property);
		self.tree.property(property).map_or(false, |property| property.has_value())
	}

	/// Replaces `remove_count` items at `index` with `added`, then notifies splice listeners once.
	pub fn splice(&mut self, node: StateNodeId, feature: FeatureId, index: usize, remove_count: usize, added: Vec<Value>) -> Result<()> {
		let removed = self.tree.splice(node, feature, index, remove_count, &added)?;
		if removed.is_empty() && added.is_empty() {
			return Ok(());
		}
		trace!("Spliced feature {} of state node {} at {}: -{} +{}.", feature, node, index, removed.len(), added.len());
		self.fire(ListenerTarget::Splice { node, feature }, &TreeEvent::Splice { node, feature, index, removed, added })
	}

	pub fn add_tree_listener(&mut self, target: ListenerTarget, listener: impl FnMut(&mut Engine, &TreeEvent) -> Result<()> + 'static) -> Result<TreeListenerId> {
		self.tree.add_listener(target, Box::new(listener))
	}

	/// Idempotent.
	pub fn remove_tree_listener(&mut self, listener: TreeListenerId) {
		self.tree.remove_listener(listener);
	}

	fn fire(&mut self, target: ListenerTarget, event: &TreeEvent) -> Result<()> {
		for listener in self.tree.listeners_of(target) {
			let mut callback = match self.tree.take_listener(listener) {
				Some(callback) => callback,
				None => continue,
			};
			let result = callback(self, event);
			self.tree.restore_listener(listener, callback);
			result?;
		}
		Ok(())
	}

	/// Adds a listener for native events of `event_type` on `node`. The native listener is armed on first use.
	pub fn add_dom_listener(&mut self, node: DomNodeId, event_type: &str, listener: impl FnMut(&mut Engine, &dyn EventData) -> Result<()> + 'static) -> Result<DomListenerId> {
		let key = (node, event_type.to_owned());
		if !self.dom_listener_targets.contains_key(&key) {
			self.dom.listen(node, event_type)?;
			trace!("Armed native {:?} listener on {:?}.", event_type, node);
		}
		let id = self.dom_listeners.insert(DomListenerEntry {
			node,
			event_type: event_type.to_owned(),
			callback: Some(Box::new(listener)),
		});
		self.dom_listener_targets.entry(key).or_default().push(id);
		Ok(id)
	}

	/// Idempotent. Disarms the native listener once nothing listens anymore.
	pub fn remove_dom_listener(&mut self, listener: DomListenerId) -> Result<()> {
		let entry = match self.dom_listeners.remove(listener) {
			Some(entry) => entry,
			None => return Ok(()),
		};
		let key = (entry.node, entry.event_type);
		let now_unused = match self.dom_listener_targets.get_mut(&key) {
			Some(listeners) => {
				listeners.retain(|id| *id != listener);
				listeners.is_empty()
			}
			None => false,
		};
		if now_unused {
			self.dom_listener_targets.remove(&key);
			self.dom.unlisten(key.0, &key.1)?;
			trace!("Disarmed native {:?} listener on {:?}.", key.1, key.0);
		}
		Ok(())
	}

	#[must_use]
	pub fn dom_listener_count(&self) -> usize {
		self.dom_listeners.len()
	}

	/// Delivers a native event to the listeners of `node`, then flushes.
	#[instrument(skip(self, event), fields(event_type = event.event_type()))]
	pub fn dispatch(&mut self, node: DomNodeId, event: &dyn EventData) -> Result<()> {
		let key = (node, event.event_type().to_owned());
		let listeners = match self.dom_listener_targets.get(&key) {
			Some(listeners) => listeners.clone(),
			None => {
				warn!("No listener for {:?} on {:?}.", key.1, node);
				return Ok(());
			}
		};
		for listener in listeners {
			let mut callback = match self.dom_listeners.get_mut(listener).and_then(|entry| entry.callback.take()) {
				Some(callback) => callback,
				// Removed by an earlier listener.
				None => continue,
			};
			let span = trace_span!("DOM listener", ?listener);
			let _enter = span.enter();
			let result = callback(self, event);
			if let Some(entry) = self.dom_listeners.get_mut(listener) {
				entry.callback = Some(callback);
			}
			result?;
		}
		self.flush()
	}

	pub fn send_event(&mut self, node: StateNodeId, event_type: &str, payload: Option<Value>) {
		if cfg!(feature = "dangerous-logging") {
			trace!("Sending {:?} event of state node {} with {:?}.", event_type, node, payload);
		} else {
			trace!("Sending {:?} event of state node {}.", event_type, node);
		}
		self.upstream.send_event(node, event_type, payload);
	}

	/// Sends a locally changed DOM property upstream and stores it as the tree's value.
	///
	/// The tree write notifies local listeners only. It doesn't go upstream a second time.
	pub fn sync_property(&mut self, node: StateNodeId, name: &str, value: Value) -> Result<()> {
		trace!("Synchronizing property {:?} of state node {}.", name, node);
		self.upstream.send_property_sync(node, name, &value);
		match self.tree.find_property(node, feature::ELEMENT_PROPERTIES, name)? {
			Some(property) => self.set_value(property, Some(value)),
			// Created with its value in place, so a property binding added for it doesn't reset the DOM first.
			None => self.create_property(node, feature::ELEMENT_PROPERTIES, name, Some(value)).map(drop),
		}
	}

	#[must_use]
	pub fn dom_node_of(&self, node: StateNodeId) -> Option<DomNodeId> {
		self.dom_nodes.get(&node).copied()
	}

	#[must_use]
	pub fn state_node_of(&self, dom_node: DomNodeId) -> Option<StateNodeId> {
		self.state_nodes.get(&dom_node).copied()
	}

	pub(crate) fn associate(&mut self, node: StateNodeId, dom_node: DomNodeId) {
		self.dom_nodes.insert(node, dom_node);
		self.state_nodes.insert(dom_node, node);
	}

	pub(crate) fn dissociate(&mut self, node: StateNodeId) {
		if let Some(dom_node) = self.dom_nodes.remove(&node) {
			self.state_nodes.remove(&dom_node);
		}
	}

	#[must_use]
	pub fn is_bound(&self, node: StateNodeId) -> bool {
		self.bindings.contains_key(&node)
	}
}
