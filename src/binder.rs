//! Choosing how a state node becomes a DOM node, and the bookkeeping of one bind.

use crate::{
	dom::DomNodeId,
	element,
	engine::DomListenerId,
	error::{Error, Result},
	reactive::ComputationId,
	tree::{feature, FeatureId, ListenerTarget, StateTree, TreeEvent, TreeListenerId},
	Engine, StateNodeId, Value,
};
use hashbrown::HashMap;
use tracing::{error, instrument, trace, trace_span};

/// The closed set of ways to bind a state node, tried in [`BindingStrategy::PRIORITY`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingStrategy {
	/// A DOM text node mirroring [`feature::TEXT_NODE`].
	Text,
	/// An element as described by [`feature::ELEMENT_DATA`] and the other element features.
	Element,
}

impl BindingStrategy {
	pub const PRIORITY: [Self; 2] = [Self::Text, Self::Element];

	#[must_use]
	pub fn is_applicable(self, tree: &StateTree, node: StateNodeId) -> bool {
		match self {
			Self::Text => tree.has_feature(node, feature::TEXT_NODE),
			Self::Element => tree.has_feature(node, feature::ELEMENT_DATA),
		}
	}

	#[must_use]
	pub fn for_node(tree: &StateTree, node: StateNodeId) -> Option<Self> {
		Self::PRIORITY.into_iter().find(|strategy| strategy.is_applicable(tree, node))
	}

	/// Creates an unbound DOM node of the right kind.
	pub fn create(self, engine: &mut Engine, node: StateNodeId) -> Result<DomNodeId> {
		match self {
			Self::Text => engine.dom.create_text(""),
			Self::Element => {
				let tag = element::tag(engine, node)?.ok_or(Error::MissingTag(node))?;
				engine.dom.create_element(&tag)
			}
		}
	}

	fn bind(self, engine: &mut Engine, node: StateNodeId, dom_node: DomNodeId, depth: usize) -> Result<()> {
		match self {
			Self::Text => bind_text(engine, node, dom_node),
			Self::Element => element::bind(engine, node, dom_node, depth),
		}
	}
}

/// Everything one bind created. Dropped as a whole when the node is unregistered.
#[derive(Debug)]
pub(crate) struct BindingContext {
	pub(crate) dom_node: DomNodeId,
	/// Per (map feature, property name).
	pub(crate) computations: HashMap<(FeatureId, String), ComputationId>,
	/// Native event listeners per event type.
	pub(crate) listeners: HashMap<String, DomListenerId>,
	/// Synchronized property listeners per event type.
	pub(crate) synchronization_listeners: HashMap<String, DomListenerId>,
	/// Listeners waiting for new properties, splices and the unregistration itself.
	pub(crate) tree_listeners: Vec<TreeListenerId>,
}

impl BindingContext {
	fn new(dom_node: DomNodeId) -> Self {
		Self {
			dom_node,
			computations: HashMap::new(),
			listeners: HashMap::new(),
			synchronization_listeners: HashMap::new(),
			tree_listeners: Vec::new(),
		}
	}
}

impl Engine {
	/// Creates the DOM node for `node` and binds it, including all current children.
	#[instrument(skip(self))]
	pub fn create_and_bind(&mut self, node: StateNodeId) -> Result<DomNodeId> {
		self.create_and_bind_at(node, 0)
	}

	pub(crate) fn create_and_bind_at(&mut self, node: StateNodeId, depth: usize) -> Result<DomNodeId> {
		if !self.tree.contains(node) {
			return Err(Error::UnknownNode(node));
		}
		if self.is_bound(node) {
			return Err(Error::AlreadyBound(node));
		}
		let strategy = BindingStrategy::for_node(&self.tree, node).ok_or(Error::NoStrategy(node))?;
		let dom_node = strategy.create(self, node)?;
		if let Err(error) = self.bind_with(strategy, node, dom_node, depth) {
			self.dom.forget(dom_node);
			return Err(error);
		}
		Ok(dom_node)
	}

	/// Binds `node` to an existing DOM node, for example a page's container element.
	#[instrument(skip(self))]
	pub fn bind(&mut self, node: StateNodeId, dom_node: DomNodeId) -> Result<()> {
		if !self.tree.contains(node) {
			return Err(Error::UnknownNode(node));
		}
		if self.is_bound(node) {
			return Err(Error::AlreadyBound(node));
		}
		let strategy = BindingStrategy::for_node(&self.tree, node).ok_or(Error::NoStrategy(node))?;
		self.bind_with(strategy, node, dom_node, 0)
	}

	fn bind_with(&mut self, strategy: BindingStrategy, node: StateNodeId, dom_node: DomNodeId, depth: usize) -> Result<()> {
		if depth > self.config.bind_depth_limit {
			return Err(Error::DepthLimit(self.config.bind_depth_limit));
		}
		let span = trace_span!("Binding", %node, ?strategy, depth);
		let _enter = span.enter();

		self.associate(node, dom_node);
		self.bindings.insert(node, BindingContext::new(dom_node));
		let result = self
			.add_tree_listener(ListenerTarget::Unregister(node), move |engine, _| {
				engine.teardown(node);
				Ok(())
			})
			.and_then(|listener| {
				self.binding_mut(node)?.tree_listeners.push(listener);
				strategy.bind(self, node, dom_node, depth)
			});
		if let Err(error) = result {
			trace!("Binding state node {} failed, undoing: {}", node, error);
			self.release_children(node, dom_node);
			self.teardown(node);
			self.dissociate(node);
			return Err(error);
		}
		Ok(())
	}

	/// Unbinds the children already placed into `dom_node` by a failed bind of `node`, depth first,
	/// and detaches and forgets their DOM nodes.
	fn release_children(&mut self, node: StateNodeId, dom_node: DomNodeId) {
		let children: Vec<StateNodeId> = match self.tree.list(node, feature::ELEMENT_CHILDREN) {
			Ok(items) => items.iter().filter_map(Value::as_node).collect(),
			Err(_) => return,
		};
		for child in children {
			let child_dom = match self.dom_node_of(child) {
				Some(child_dom) if self.is_bound(child) && self.dom.parent(child_dom) == Some(dom_node) => child_dom,
				_ => continue,
			};
			trace!("Releasing child {} of the failed bind.", child);
			self.release_children(child, child_dom);
			self.teardown(child);
			self.dissociate(child);
			if let Err(error) = self.dom.remove_child(dom_node, child_dom) {
				error!("Failed to detach the DOM node of state node {}: {}", child, error);
			}
			self.dom.forget(child_dom);
		}
	}

	pub(crate) fn binding_mut(&mut self, node: StateNodeId) -> Result<&mut BindingContext> {
		self.bindings.get_mut(&node).ok_or(Error::UnknownNode(node))
	}

	/// Releases everything the bind of `node` created. Idempotent.
	pub(crate) fn teardown(&mut self, node: StateNodeId) {
		let context = match self.bindings.remove(&node) {
			Some(context) => context,
			None => return,
		};
		trace!(
			"Tearing down state node {}: {} computation(s), {} event listener(s), {} synchronization listener(s), {} tree listener(s).",
			node,
			context.computations.len(),
			context.listeners.len(),
			context.synchronization_listeners.len(),
			context.tree_listeners.len()
		);
		for computation in context.computations.into_values() {
			self.stop(computation);
		}
		for listener in context.listeners.into_values().chain(context.synchronization_listeners.into_values()) {
			if let Err(error) = self.remove_dom_listener(listener) {
				error!("Failed to remove a DOM listener of state node {}: {}", node, error);
			}
		}
		for listener in context.tree_listeners {
			self.remove_tree_listener(listener);
		}
		trace!("Released DOM node {:?}.", context.dom_node);
	}
}

fn bind_text(engine: &mut Engine, node: StateNodeId, text_node: DomNodeId) -> Result<()> {
	let property = engine.property(node, feature::TEXT_NODE, feature::TEXT)?;
	let computation = engine.run_tracked(move |engine, tracker| {
		let text = match engine.get(tracker, property) {
			Some(Value::String(text)) => text,
			None | Some(Value::Null) => String::new(),
			Some(other) => other.to_string(),
		};
		if engine.dom.property(text_node, "data").and_then(|data| data.as_str().map(|data| data == text)) != Some(true) {
			engine.dom.set_text(text_node, &text)?;
		}
		Ok(())
	})?;
	engine.binding_mut(node)?.computations.insert((feature::TEXT_NODE, feature::TEXT.to_owned()), computation);
	Ok(())
}

/// Applies a splice event to a mirror of the list, the same way the binders do.
///
/// Useful to hosts that keep their own copy of a list feature.
pub fn apply_splice(mirror: &mut Vec<Value>, event: &TreeEvent) {
	if let TreeEvent::Splice { index, removed, added, .. } = event {
		let end = (*index + removed.len()).min(mirror.len());
		let start = (*index).min(end);
		mirror.splice(start..end, added.iter().cloned());
	}
}
