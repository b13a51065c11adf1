//! A headless [`Dom`] for hosts without a browser, and for tests.
//!
//! [`MemoryDom`] is a cheap handle to shared state: keep a clone to inspect what the engine did,
//! or to play the user's part via [`MemoryDom::user_input`].

use crate::{
	dom::{Dom, DomNodeId, EventData},
	error::{Error, Result},
	Value,
};
use hashbrown::HashMap;
use indexmap::IndexMap;
use slotmap::SlotMap;
use std::{cell::RefCell, collections::BTreeMap, rc::Rc};
use tracing::trace;

#[derive(Debug)]
enum Kind {
	Element { tag: String },
	Text { data: String },
}

#[derive(Debug)]
struct MemoryNode {
	kind: Kind,
	parent: Option<DomNodeId>,
	children: Vec<DomNodeId>,
	properties: HashMap<String, Value>,
	attributes: IndexMap<String, String>,
	styles: IndexMap<String, String>,
	classes: IndexMap<String, ()>,
	listeners: IndexMap<String, ()>,
	/// Released by the engine. Dropped as soon as it is detached.
	forgotten: bool,
}

impl MemoryNode {
	fn new(kind: Kind) -> Self {
		Self {
			kind,
			parent: None,
			children: Vec::new(),
			properties: HashMap::new(),
			attributes: IndexMap::new(),
			styles: IndexMap::new(),
			classes: IndexMap::new(),
			listeners: IndexMap::new(),
			forgotten: false,
		}
	}

	/// What the element's prototype chain would provide for properties that were never set on it.
	fn inherited(&self, name: &str) -> Option<Value> {
		match (&self.kind, name) {
			(Kind::Element { tag }, "value") if matches!(tag.as_str(), "INPUT" | "TEXTAREA" | "SELECT") => Some(Value::String(String::new())),
			(Kind::Element { tag }, "checked") if tag == "INPUT" => Some(Value::Bool(false)),
			(Kind::Element { .. }, "hidden") => Some(Value::Bool(false)),
			(Kind::Element { .. }, "title") => Some(Value::String(String::new())),
			(Kind::Text { data }, "data" | "textContent") => Some(Value::String(data.clone())),
			_ => None,
		}
	}
}

#[derive(Debug, Default)]
struct Inner {
	nodes: SlotMap<DomNodeId, MemoryNode>,
	property_writes: usize,
}

impl Inner {
	fn node(&self, node: DomNodeId) -> Result<&MemoryNode> {
		self.nodes.get(node).ok_or_else(|| Error::Dom(format!("Unknown DOM node {:?}", node)))
	}

	fn node_mut(&mut self, node: DomNodeId) -> Result<&mut MemoryNode> {
		self.nodes.get_mut(node).ok_or_else(|| Error::Dom(format!("Unknown DOM node {:?}", node)))
	}

	fn element_mut(&mut self, node: DomNodeId) -> Result<&mut MemoryNode> {
		let memory_node = self.node_mut(node)?;
		match memory_node.kind {
			Kind::Element { .. } => Ok(memory_node),
			Kind::Text { .. } => Err(Error::Dom(format!("{:?} is not an element", node))),
		}
	}

	fn detach(&mut self, child: DomNodeId) -> Result<()> {
		if let Some(parent) = self.node_mut(child)?.parent.take() {
			self.node_mut(parent)?.children.retain(|c| *c != child);
		}
		Ok(())
	}
	/// Drops `node` if it is forgotten and detached, orphaning its children (which may be dropped in turn).
	fn collect(&mut self, node: DomNodeId) {
		match self.nodes.get(node) {
			Some(memory_node) if memory_node.forgotten && memory_node.parent.is_none() => (),
			_ => return,
		}
		let removed = match self.nodes.remove(node) {
			Some(removed) => removed,
			None => return,
		};
		trace!("Dropped {:?}.", node);
		for child in removed.children {
			if let Some(child_node) = self.nodes.get_mut(child) {
				child_node.parent = None;
			}
			self.collect(child);
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDom(Rc<RefCell<Inner>>);

impl MemoryDom {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Changes a property the way user interaction would, without counting as a binder write.
	pub fn user_input(&self, node: DomNodeId, name: &str, value: impl Into<Value>) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		inner.node_mut(node)?.properties.insert(name.to_owned(), value.into());
		Ok(())
	}

	#[must_use]
	pub fn children(&self, node: DomNodeId) -> Vec<DomNodeId> {
		self.0.borrow().nodes.get(node).map(|n| n.children.clone()).unwrap_or_default()
	}

	/// Tag names (or `#text`) of the children, for compact assertions.
	#[must_use]
	pub fn child_tags(&self, node: DomNodeId) -> Vec<String> {
		let inner = self.0.borrow();
		self.children(node)
			.into_iter()
			.filter_map(|child| inner.nodes.get(child))
			.map(|child| match &child.kind {
				Kind::Element { tag } => tag.clone(),
				Kind::Text { .. } => "#text".to_owned(),
			})
			.collect()
	}

	#[must_use]
	pub fn text(&self, node: DomNodeId) -> Option<String> {
		match &self.0.borrow().nodes.get(node)?.kind {
			Kind::Text { data } => Some(data.clone()),
			Kind::Element { .. } => None,
		}
	}

	#[must_use]
	pub fn classes(&self, node: DomNodeId) -> Vec<String> {
		self.0.borrow().nodes.get(node).map(|n| n.classes.keys().cloned().collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn attributes(&self, node: DomNodeId) -> BTreeMap<String, String> {
		self.0.borrow().nodes.get(node).map(|n| n.attributes.clone().into_iter().collect()).unwrap_or_default()
	}

	#[must_use]
	pub fn is_listening(&self, node: DomNodeId, event_type: &str) -> bool {
		self.0.borrow().nodes.get(node).map_or(false, |n| n.listeners.contains_key(event_type))
	}

	/// Armed native listeners over all nodes.
	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.0.borrow().nodes.values().map(|n| n.listeners.len()).sum()
	}

	/// How many nodes are still alive: not forgotten, or forgotten but still attached to a parent.
	#[must_use]
	pub fn node_count(&self) -> usize {
		self.0.borrow().nodes.len()
	}

	/// Property writes and deletions made through [`Dom`].
	#[must_use]
	pub fn property_writes(&self) -> usize {
		self.0.borrow().property_writes
	}
}

impl Dom for MemoryDom {
	fn create_element(&mut self, tag: &str) -> Result<DomNodeId> {
		if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
			return Err(Error::Dom(format!("InvalidCharacterError: {:?} is not a valid tag name", tag)));
		}
		let node = self.0.borrow_mut().nodes.insert(MemoryNode::new(Kind::Element { tag: tag.to_ascii_uppercase() }));
		trace!("Created <{}> as {:?}.", tag, node);
		Ok(node)
	}

	fn create_text(&mut self, data: &str) -> Result<DomNodeId> {
		Ok(self.0.borrow_mut().nodes.insert(MemoryNode::new(Kind::Text { data: data.to_owned() })))
	}

	fn tag_name(&self, node: DomNodeId) -> Option<String> {
		match &self.0.borrow().nodes.get(node)?.kind {
			Kind::Element { tag } => Some(tag.clone()),
			Kind::Text { .. } => None,
		}
	}

	fn set_text(&mut self, node: DomNodeId, data: &str) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		match &mut inner.node_mut(node)?.kind {
			Kind::Text { data: text } => {
				*text = data.to_owned();
				Ok(())
			}
			Kind::Element { .. } => Err(Error::Dom(format!("{:?} is not a text node", node))),
		}
	}

	fn property(&self, node: DomNodeId, name: &str) -> Option<Value> {
		let inner = self.0.borrow();
		let memory_node = inner.nodes.get(node)?;
		memory_node.properties.get(name).cloned().or_else(|| memory_node.inherited(name))
	}

	fn has_own_property(&self, node: DomNodeId, name: &str) -> bool {
		self.0.borrow().nodes.get(node).map_or(false, |n| n.properties.contains_key(name))
	}

	fn set_property(&mut self, node: DomNodeId, name: &str, value: &Value) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		inner.node_mut(node)?.properties.insert(name.to_owned(), value.clone());
		inner.property_writes += 1;
		Ok(())
	}

	fn delete_property(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		inner.node_mut(node)?.properties.remove(name);
		inner.property_writes += 1;
		Ok(())
	}

	fn attribute(&self, node: DomNodeId, name: &str) -> Option<String> {
		self.0.borrow().nodes.get(node)?.attributes.get(name).cloned()
	}

	fn set_attribute(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()> {
		if name.is_empty() || name.contains(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '=')) {
			return Err(Error::Dom(format!("InvalidCharacterError: {:?} is not a valid attribute name", name)));
		}
		self.0.borrow_mut().element_mut(node)?.attributes.insert(name.to_owned(), value.to_owned());
		Ok(())
	}

	fn remove_attribute(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		self.0.borrow_mut().element_mut(node)?.attributes.shift_remove(name);
		Ok(())
	}

	fn style(&self, node: DomNodeId, name: &str) -> Option<String> {
		self.0.borrow().nodes.get(node)?.styles.get(name).cloned()
	}

	fn set_style(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		let styles = &mut inner.element_mut(node)?.styles;
		// Setting an empty value clears the declaration.
		if value.is_empty() {
			styles.shift_remove(name);
		} else {
			styles.insert(name.to_owned(), value.to_owned());
		}
		Ok(())
	}

	fn remove_style(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		self.0.borrow_mut().element_mut(node)?.styles.shift_remove(name);
		Ok(())
	}

	fn has_class(&self, node: DomNodeId, token: &str) -> bool {
		self.0.borrow().nodes.get(node).map_or(false, |n| n.classes.contains_key(token))
	}

	fn add_class(&mut self, node: DomNodeId, token: &str) -> Result<()> {
		if token.is_empty() || token.contains(char::is_whitespace) {
			return Err(Error::Dom(format!("InvalidCharacterError: {:?} is not a valid class token", token)));
		}
		self.0.borrow_mut().element_mut(node)?.classes.insert(token.to_owned(), ());
		Ok(())
	}

	fn remove_class(&mut self, node: DomNodeId, token: &str) -> Result<()> {
		self.0.borrow_mut().element_mut(node)?.classes.shift_remove(token);
		Ok(())
	}

	fn parent(&self, node: DomNodeId) -> Option<DomNodeId> {
		self.0.borrow().nodes.get(node)?.parent
	}

	fn child_count(&self, node: DomNodeId) -> usize {
		self.0.borrow().nodes.get(node).map_or(0, |n| n.children.len())
	}

	fn child_at(&self, node: DomNodeId, index: usize) -> Option<DomNodeId> {
		self.0.borrow().nodes.get(node)?.children.get(index).copied()
	}

	fn insert_before(&mut self, parent: DomNodeId, child: DomNodeId, reference: Option<DomNodeId>) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		inner.element_mut(parent)?;
		inner.node(child)?;
		if reference == Some(child) {
			return Ok(());
		}
		inner.detach(child)?;
		let children = &mut inner.node_mut(parent)?.children;
		let index = match reference {
			None => children.len(),
			Some(reference) => children
				.iter()
				.position(|c| *c == reference)
				.ok_or_else(|| Error::Dom("NotFoundError: The reference node is not a child of this node".to_owned()))?,
		};
		children.insert(index, child);
		inner.node_mut(child)?.parent = Some(parent);
		Ok(())
	}

	fn remove_child(&mut self, parent: DomNodeId, child: DomNodeId) -> Result<()> {
		let mut inner = self.0.borrow_mut();
		if inner.node(child)?.parent != Some(parent) {
			return Err(Error::Dom("NotFoundError: The node to be removed is not a child of this node".to_owned()));
		}
		inner.detach(child)?;
		inner.collect(child);
		Ok(())
	}

	fn listen(&mut self, node: DomNodeId, event_type: &str) -> Result<()> {
		self.0.borrow_mut().node_mut(node)?.listeners.insert(event_type.to_owned(), ());
		Ok(())
	}

	fn unlisten(&mut self, node: DomNodeId, event_type: &str) -> Result<()> {
		self.0.borrow_mut().node_mut(node)?.listeners.shift_remove(event_type);
		Ok(())
	}

	fn forget(&mut self, node: DomNodeId) {
		let mut inner = self.0.borrow_mut();
		if let Some(memory_node) = inner.nodes.get_mut(node) {
			memory_node.forgotten = true;
			inner.collect(node);
		}
	}
}

/// An event for [`Engine::dispatch`](crate::Engine::dispatch) on a [`MemoryDom`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryEvent {
	event_type: String,
	members: BTreeMap<String, Value>,
}

impl MemoryEvent {
	#[must_use]
	pub fn new(event_type: &str) -> Self {
		let mut members = BTreeMap::new();
		members.insert("type".to_owned(), Value::String(event_type.to_owned()));
		Self {
			event_type: event_type.to_owned(),
			members,
		}
	}

	#[must_use]
	pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
		self.members.insert(name.to_owned(), value.into());
		self
	}
}

impl EventData for MemoryEvent {
	fn event_type(&self) -> &str {
		&self.event_type
	}

	fn get(&self, name: &str) -> Option<Value> {
		self.members.get(name).cloned()
	}
}
