#![allow(dead_code)]

use state_dom::{feature, memory::MemoryDom, Engine, StateNodeId, Upstream, Value};
use std::{cell::RefCell, rc::Rc, sync::Once};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
	Event { node: StateNodeId, event_type: String, payload: Option<Value> },
	PropertySync { node: StateNodeId, property: String, value: Value },
}

/// Records everything sent upstream. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingUpstream(Rc<RefCell<Vec<Sent>>>);

impl RecordingUpstream {
	pub fn sent(&self) -> Vec<Sent> {
		self.0.borrow().clone()
	}

	pub fn take(&self) -> Vec<Sent> {
		self.0.borrow_mut().drain(..).collect()
	}
}

impl Upstream for RecordingUpstream {
	fn send_event(&mut self, node: StateNodeId, event_type: &str, payload: Option<Value>) {
		self.0.borrow_mut().push(Sent::Event {
			node,
			event_type: event_type.to_owned(),
			payload,
		});
	}

	fn send_property_sync(&mut self, node: StateNodeId, property: &str, value: &Value) {
		self.0.borrow_mut().push(Sent::PropertySync {
			node,
			property: property.to_owned(),
			value: value.clone(),
		});
	}
}

static LOG_INIT: Once = Once::new();

pub fn init_logging() {
	LOG_INIT.call_once(|| {
		tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).with_test_writer().init();
	});
}

pub struct Harness {
	pub engine: Engine,
	pub dom: MemoryDom,
	pub upstream: RecordingUpstream,
}

pub fn harness() -> Harness {
	init_logging();
	let dom = MemoryDom::new();
	let upstream = RecordingUpstream::default();
	Harness {
		engine: Engine::new(dom.clone(), upstream.clone()),
		dom,
		upstream,
	}
}

/// Registers `node` with a tag.
pub fn element(engine: &mut Engine, node: u32, tag: &str) -> StateNodeId {
	let node = StateNodeId(node);
	engine.register_node(node);
	engine.set_property(node, feature::ELEMENT_DATA, feature::TAG, tag).unwrap();
	node
}

pub fn text(engine: &mut Engine, node: u32, text: &str) -> StateNodeId {
	let node = StateNodeId(node);
	engine.register_node(node);
	engine.set_property(node, feature::TEXT_NODE, feature::TEXT, text).unwrap();
	node
}

pub fn nodes(nodes: &[StateNodeId]) -> Vec<Value> {
	nodes.iter().copied().map(Value::from).collect()
}

pub fn strings(strings: &[&str]) -> Vec<Value> {
	strings.iter().copied().map(Value::from).collect()
}
