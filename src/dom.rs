//! The DOM as seen by the binders.
//!
//! Backends hand out [`DomNodeId`]s instead of native handles, so the engine can keep its association tables
//! in plain maps. [`MemoryDom`](crate::memory::MemoryDom) is a headless implementation, [`WebDom`](crate::web::WebDom) drives a browser.

use crate::{error::Result, Value};
use slotmap::new_key_type;

new_key_type! {
	/// A DOM node known to a [`Dom`] backend.
	pub struct DomNodeId;
}

/// A native event as delivered to [`Engine::dispatch`](crate::Engine::dispatch).
pub trait EventData {
	fn event_type(&self) -> &str;

	/// Reads a member of the event object, like `detail` or `key`. `None` if undefined.
	fn get(&self, name: &str) -> Option<Value>;
}

/// Native DOM operations.
///
/// Reads return `None` where the DOM has nothing (an undefined property, a missing attribute).
/// Writes may fail with [`Error::Dom`](crate::Error::Dom), for example on an invalid attribute name.
pub trait Dom {
	fn create_element(&mut self, tag: &str) -> Result<DomNodeId>;
	fn create_text(&mut self, data: &str) -> Result<DomNodeId>;

	/// Upper case for HTML elements, `None` for other nodes.
	fn tag_name(&self, node: DomNodeId) -> Option<String>;
	fn set_text(&mut self, node: DomNodeId, data: &str) -> Result<()>;

	fn property(&self, node: DomNodeId, name: &str) -> Option<Value>;
	/// Whether `name` is set on the node itself rather than inherited.
	fn has_own_property(&self, node: DomNodeId, name: &str) -> bool;
	fn set_property(&mut self, node: DomNodeId, name: &str, value: &Value) -> Result<()>;
	fn delete_property(&mut self, node: DomNodeId, name: &str) -> Result<()>;

	fn attribute(&self, node: DomNodeId, name: &str) -> Option<String>;
	fn set_attribute(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()>;
	fn remove_attribute(&mut self, node: DomNodeId, name: &str) -> Result<()>;

	/// `None` if the declaration is empty.
	fn style(&self, node: DomNodeId, name: &str) -> Option<String>;
	fn set_style(&mut self, node: DomNodeId, name: &str, value: &str) -> Result<()>;
	fn remove_style(&mut self, node: DomNodeId, name: &str) -> Result<()>;

	fn has_class(&self, node: DomNodeId, token: &str) -> bool;
	fn add_class(&mut self, node: DomNodeId, token: &str) -> Result<()>;
	fn remove_class(&mut self, node: DomNodeId, token: &str) -> Result<()>;

	fn parent(&self, node: DomNodeId) -> Option<DomNodeId>;
	fn child_count(&self, node: DomNodeId) -> usize;
	fn child_at(&self, node: DomNodeId, index: usize) -> Option<DomNodeId>;
	/// Inserts (or moves) `child` before `reference`, or at the end if `reference` is `None`.
	fn insert_before(&mut self, parent: DomNodeId, child: DomNodeId, reference: Option<DomNodeId>) -> Result<()>;
	fn remove_child(&mut self, parent: DomNodeId, child: DomNodeId) -> Result<()>;

	/// Arms the native listener for `event_type`. Called once per (node, event type) pair until [`Dom::unlisten`].
	fn listen(&mut self, node: DomNodeId, event_type: &str) -> Result<()>;
	fn unlisten(&mut self, node: DomNodeId, event_type: &str) -> Result<()>;

	/// Releases the backend's handle on `node` once the engine no longer refers to it.
	/// The id is invalid afterwards. A native node still in the document stays there.
	fn forget(&mut self, node: DomNodeId);
}
