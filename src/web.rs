//! The browser [`Dom`], built on `web-sys`.
//!
//! Native events can't call into the [`Engine`] directly, since the engine owns the [`WebDom`].
//! Instead, each armed listener hands its event to a [`Forwarder`] that was [connected](`Forwarder::connect`)
//! to the engine once it exists:
//!
//! ```no_run
//! use state_dom::{web::{Forwarder, WebDom}, Engine, StateNodeId, Upstream, Value};
//! use std::{cell::RefCell, rc::Rc};
//!
//! struct Log;
//! impl Upstream for Log {
//! 	fn send_event(&mut self, _: StateNodeId, _: &str, _: Option<Value>) {}
//! 	fn send_property_sync(&mut self, _: StateNodeId, _: &str, _: &Value) {}
//! }
//!
//! let document = web_sys::window().unwrap().document().unwrap();
//! let forwarder = Forwarder::new();
//! let engine = Rc::new(RefCell::new(Engine::new(WebDom::new(document, forwarder.clone()), Log)));
//! forwarder.connect(&engine);
//! ```

use crate::{
	dom::{Dom, DomNodeId, EventData},
	error::{Error, Result},
	Engine, Value,
};
use core::{cell::RefCell, fmt};
use hashbrown::HashMap;
use js_sys::{Array, Object, Reflect};
use slotmap::{Key, KeyData, SlotMap};
use std::{
	collections::{BTreeMap, VecDeque},
	rc::{Rc, Weak},
};
use tracing::{error, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, Node};

/// Expando property that remembers a DOM node's id on the node itself.
const ID_PROPERTY: &str = "__stateDomId";

/// How deep [`from_js`] descends into nested arrays and objects.
const CONVERSION_DEPTH_LIMIT: usize = 16;

/// A native event and its type.
#[derive(Debug, Clone)]
pub struct WebEvent {
	event: web_sys::Event,
	event_type: String,
}

impl WebEvent {
	#[must_use]
	pub fn new(event: web_sys::Event) -> Self {
		let event_type = event.type_();
		Self { event, event_type }
	}

	#[must_use]
	pub fn native(&self) -> &web_sys::Event {
		&self.event
	}
}

impl EventData for WebEvent {
	fn event_type(&self) -> &str {
		&self.event_type
	}

	fn get(&self, name: &str) -> Option<Value> {
		let value = Reflect::get(&self.event, &JsValue::from_str(name)).ok()?;
		if value.is_undefined() {
			None
		} else {
			Some(from_js(&value))
		}
	}
}

#[derive(Default)]
struct ForwarderInner {
	engine: Weak<RefCell<Engine>>,
	pending: VecDeque<(DomNodeId, WebEvent)>,
}

/// Delivers native events to an [`Engine`] shared as `Rc<RefCell<Engine>>`.
///
/// Events that arrive while the engine is busy (for example because a DOM write fired a synchronous event)
/// are queued and delivered by the next [`Forwarder::forward`] or [`Forwarder::drain`].
#[derive(Clone, Default)]
pub struct Forwarder(Rc<RefCell<ForwarderInner>>);

impl fmt::Debug for Forwarder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let inner = self.0.borrow();
		f.debug_struct("Forwarder")
			.field("connected", &(inner.engine.strong_count() > 0))
			.field("pending", &inner.pending.len())
			.finish()
	}
}

impl Forwarder {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn connect(&self, engine: &Rc<RefCell<Engine>>) {
		self.0.borrow_mut().engine = Rc::downgrade(engine);
	}

	pub fn forward(&self, node: DomNodeId, event: WebEvent) {
		self.0.borrow_mut().pending.push_back((node, event));
		self.drain();
	}

	/// Dispatches queued events, unless the engine is currently borrowed.
	pub fn drain(&self) {
		let shared = self.0.borrow().engine.upgrade();
		let shared = match shared {
			Some(shared) => shared,
			None => {
				warn!("Dropping {} native event(s): No engine connected.", self.0.borrow().pending.len());
				self.0.borrow_mut().pending.clear();
				return;
			}
		};
		let mut engine = match shared.try_borrow_mut() {
			Ok(engine) => engine,
			Err(_) => {
				trace!("Engine is busy. Deferring {} native event(s).", self.0.borrow().pending.len());
				return;
			}
		};
		loop {
			let next = self.0.borrow_mut().pending.pop_front();
			let (node, event) = match next {
				Some(next) => next,
				None => break,
			};
			if let Err(error) = engine.dispatch(node, &event) {
				error!("Dispatching native {:?} event failed: {}", event.event_type(), error);
			}
		}
	}
}

/// A [`Dom`] over a browser document.
pub struct WebDom {
	document: Document,
	nodes: RefCell<SlotMap<DomNodeId, Node>>,
	listeners: HashMap<(DomNodeId, String), Closure<dyn Fn(web_sys::Event)>>,
	forwarder: Forwarder,
}

impl fmt::Debug for WebDom {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WebDom")
			.field("nodes", &self.nodes.borrow().len())
			.field("listeners", &self.listeners.len())
			.field("forwarder", &self.forwarder)
			.finish()
	}
}

fn js_error(value: JsValue) -> Error {
	Error::Dom(value.as_string().unwrap_or_else(|| format!("{:?}", value)))
}

impl WebDom {
	#[must_use]
	pub fn new(document: Document, forwarder: Forwarder) -> Self {
		Self {
			document,
			nodes: RefCell::new(SlotMap::with_key()),
			listeners: HashMap::new(),
			forwarder,
		}
	}

	/// Gives an existing native node (like a page's container element) an id, so it can be bound.
	/// Adopting a node twice returns the same id.
	#[instrument(skip(self))]
	pub fn adopt(&self, node: &Node) -> DomNodeId {
		if let Some(id) = self.known_id(node) {
			return id;
		}
		let id = self.nodes.borrow_mut().insert(node.clone());
		let ffi = id.data().as_ffi().to_string();
		if Reflect::set(node, &JsValue::from_str(ID_PROPERTY), &JsValue::from_str(&ffi)).is_err() {
			warn!("Could not tag adopted node {:?} with its id.", id);
		}
		trace!("Adopted {:?}.", id);
		id
	}

	/// The native node behind `id`.
	#[must_use]
	pub fn node(&self, id: DomNodeId) -> Option<Node> {
		self.nodes.borrow().get(id).cloned()
	}

	/// How many native nodes currently have an id.
	#[must_use]
	pub fn node_count(&self) -> usize {
		self.nodes.borrow().len()
	}

	fn known_id(&self, node: &Node) -> Option<DomNodeId> {
		let ffi = Reflect::get(node, &JsValue::from_str(ID_PROPERTY)).ok()?.as_string()?.parse::<u64>().ok()?;
		let id = DomNodeId::from(KeyData::from_ffi(ffi));
		self.nodes.borrow().contains_key(id).then(|| id)
	}

	fn native(&self, id: DomNodeId) -> Result<Node> {
		self.node(id).ok_or_else(|| Error::Dom(format!("Unknown DOM node {:?}", id)))
	}

	fn element(&self, id: DomNodeId) -> Result<Element> {
		self.native(id)?.dyn_into::<Element>().map_err(|_| Error::Dom(format!("{:?} is not an element", id)))
	}

	fn html_element(&self, id: DomNodeId) -> Result<HtmlElement> {
		self.native(id)?.dyn_into::<HtmlElement>().map_err(|_| Error::Dom(format!("{:?} is not an HTML element", id)))
	}
}

impl Dom for WebDom {
	fn create_element(&mut self, tag: &str) -> Result<DomNodeId> {
		let element = self.document.create_element(tag).map_err(js_error)?;
		Ok(self.adopt(element.as_ref()))
	}

	fn create_text(&mut self, data: &str) -> Result<DomNodeId> {
		let text = self.document.create_text_node(data);
		Ok(self.adopt(text.as_ref()))
	}

	fn tag_name(&self, node: DomNodeId) -> Option<String> {
		self.node(node)?.dyn_ref::<Element>().map(Element::tag_name)
	}

	fn set_text(&mut self, node: DomNodeId, data: &str) -> Result<()> {
		self.native(node)?.set_text_content(Some(data));
		Ok(())
	}

	fn property(&self, node: DomNodeId, name: &str) -> Option<Value> {
		let value = Reflect::get(self.node(node)?.as_ref(), &JsValue::from_str(name)).ok()?;
		if value.is_undefined() {
			None
		} else {
			Some(from_js(&value))
		}
	}

	fn has_own_property(&self, node: DomNodeId, name: &str) -> bool {
		self.node(node).map_or(false, |node| node.unchecked_ref::<Object>().has_own_property(&JsValue::from_str(name)))
	}

	fn set_property(&mut self, node: DomNodeId, name: &str, value: &Value) -> Result<()> {
		Reflect::set(self.native(node)?.as_ref(), &JsValue::from_str(name), &to_js(value)).map_err(js_error).map(drop)
	}

	fn delete_property(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		let node = self.native(node)?;
		Reflect::delete_property(node.unchecked_ref::<Object>(), &JsValue::from_str(name)).map_err(js_error).map(drop)
	}

	fn attribute(&self, node: DomNodeId, name: &str) -> Option<String> {
		self.node(node)?.dyn_ref::<Element>()?.get_attribute(name)
	}

	fn set_attribute(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()> {
		self.element(node)?.set_attribute(name, value).map_err(js_error)
	}

	fn remove_attribute(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		self.element(node)?.remove_attribute(name).map_err(js_error)
	}

	fn style(&self, node: DomNodeId, name: &str) -> Option<String> {
		let value = self.node(node)?.dyn_ref::<HtmlElement>()?.style().get_property_value(name).ok()?;
		if value.is_empty() {
			None
		} else {
			Some(value)
		}
	}

	fn set_style(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()> {
		self.html_element(node)?.style().set_property(name, value).map_err(js_error)
	}

	fn remove_style(&mut self, node: DomNodeId, name: &str) -> Result<()> {
		self.html_element(node)?.style().remove_property(name).map_err(js_error).map(drop)
	}

	fn has_class(&self, node: DomNodeId, token: &str) -> bool {
		self.node(node).and_then(|node| node.dyn_ref::<Element>().map(|element| element.class_list().contains(token))) == Some(true)
	}

	fn add_class(&mut self, node: DomNodeId, token: &str) -> Result<()> {
		self.element(node)?.class_list().add_1(token).map_err(js_error)
	}

	fn remove_class(&mut self, node: DomNodeId, token: &str) -> Result<()> {
		self.element(node)?.class_list().remove_1(token).map_err(js_error)
	}

	/// Only nodes with an id are reported. A foreign parent reads as `None`.
	fn parent(&self, node: DomNodeId) -> Option<DomNodeId> {
		let parent = self.node(node)?.parent_node()?;
		self.known_id(&parent)
	}

	fn child_count(&self, node: DomNodeId) -> usize {
		self.node(node).map_or(0, |node| node.child_nodes().length() as usize)
	}

	fn child_at(&self, node: DomNodeId, index: usize) -> Option<DomNodeId> {
		let index = u32::try_from(index).ok()?;
		let child = self.node(node)?.child_nodes().item(index)?;
		let id = self.known_id(&child);
		if id.is_none() {
			warn!("Child {} of {:?} is a foreign node.", index, node);
		}
		id
	}

	fn insert_before(&mut self, parent: DomNodeId, child: DomNodeId, reference: Option<DomNodeId>) -> Result<()> {
		let reference = reference.map(|reference| self.native(reference)).transpose()?;
		self.native(parent)?.insert_before(&self.native(child)?, reference.as_ref()).map_err(js_error).map(drop)
	}

	fn remove_child(&mut self, parent: DomNodeId, child: DomNodeId) -> Result<()> {
		self.native(parent)?.remove_child(&self.native(child)?).map_err(js_error).map(drop)
	}

	fn listen(&mut self, node: DomNodeId, event_type: &str) -> Result<()> {
		let target = self.native(node)?;
		let forwarder = self.forwarder.clone();
		let closure = Closure::wrap(Box::new(move |event: web_sys::Event| forwarder.forward(node, WebEvent::new(event))) as Box<dyn Fn(web_sys::Event)>);
		target.add_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref()).map_err(js_error)?;
		if let Some(previous) = self.listeners.insert((node, event_type.to_owned()), closure) {
			warn!("Replaced an armed {:?} listener on {:?}.", event_type, node);
			target.remove_event_listener_with_callback(event_type, previous.as_ref().unchecked_ref()).map_err(js_error)?;
		}
		Ok(())
	}

	fn unlisten(&mut self, node: DomNodeId, event_type: &str) -> Result<()> {
		let closure = match self.listeners.remove(&(node, event_type.to_owned())) {
			Some(closure) => closure,
			None => return Ok(()),
		};
		self.native(node)?.remove_event_listener_with_callback(event_type, closure.as_ref().unchecked_ref()).map_err(js_error)
	}

	fn forget(&mut self, node: DomNodeId) {
		let native = match self.nodes.borrow_mut().remove(node) {
			Some(native) => native,
			None => return,
		};
		let armed: Vec<String> = self.listeners.keys().filter(|(id, _)| *id == node).map(|(_, event_type)| event_type.clone()).collect();
		for event_type in armed {
			if let Some(closure) = self.listeners.remove(&(node, event_type.clone())) {
				warn!("Forgetting {:?} with an armed {:?} listener.", node, event_type);
				drop(native.remove_event_listener_with_callback(&event_type, closure.as_ref().unchecked_ref()));
			}
		}
		drop(Reflect::delete_property(native.unchecked_ref::<Object>(), &JsValue::from_str(ID_PROPERTY)));
		trace!("Forgot {:?}.", node);
	}
}

/// Converts a [`Value`] for use as a DOM property. State nodes become their numeric id.
#[must_use]
pub fn to_js(value: &Value) -> JsValue {
	match value {
		Value::Null => JsValue::NULL,
		Value::Bool(flag) => JsValue::from_bool(*flag),
		Value::Number(number) => JsValue::from_f64(*number),
		Value::String(string) => JsValue::from_str(string),
		Value::Node(node) => JsValue::from_f64(f64::from(node.0)),
		Value::Array(items) => items.iter().map(to_js).collect::<Array>().into(),
		Value::Object(members) => {
			let object = Object::new();
			for (key, member) in members {
				// Setting a property on a plain object can't fail.
				let _ = Reflect::set(&object, &JsValue::from_str(key), &to_js(member));
			}
			object.into()
		}
	}
}

/// Converts a JavaScript value. Functions and other exotic values become [`Value::Null`].
#[must_use]
pub fn from_js(value: &JsValue) -> Value {
	from_js_at(value, 0)
}

fn from_js_at(value: &JsValue, depth: usize) -> Value {
	if value.is_null() || value.is_undefined() {
		return Value::Null;
	}
	if let Some(flag) = value.as_bool() {
		return Value::Bool(flag);
	}
	if let Some(number) = value.as_f64() {
		return Value::Number(number);
	}
	if let Some(string) = value.as_string() {
		return Value::String(string);
	}
	if depth >= CONVERSION_DEPTH_LIMIT {
		trace!("Not converting past depth {}.", depth);
		return Value::Null;
	}
	if Array::is_array(value) {
		return Value::Array(value.unchecked_ref::<Array>().iter().map(|item| from_js_at(&item, depth + 1)).collect());
	}
	if value.is_function() {
		return Value::Null;
	}
	if let Some(object) = value.dyn_ref::<Object>() {
		let members: BTreeMap<String, Value> = Object::keys(object)
			.iter()
			.filter_map(|key| {
				let member = Reflect::get(object, &key).ok()?;
				Some((key.as_string()?, from_js_at(&member, depth + 1)))
			})
			.collect();
		return Value::Object(members);
	}
	Value::Null
}
