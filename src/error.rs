use crate::{tree::FeatureId, StateNodeId};
use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
	#[error("No constant pool entry for key {0:?}")]
	MissingConstant(String),

	#[error("State node {0} is not registered")]
	UnknownNode(StateNodeId),

	#[error("Feature {feature} of state node {node} is a {actual}, not a {expected}")]
	FeatureShape {
		node: StateNodeId,
		feature: FeatureId,
		expected: &'static str,
		actual: &'static str,
	},

	#[error("The property belongs to a state node that was unregistered")]
	DroppedProperty,

	#[error("Splice at {index} removing {remove_count} item(s) is out of bounds for a list of length {len}")]
	SpliceRange { index: usize, remove_count: usize, len: usize },

	#[error("DOM node to remove is not a child of the element bound to state node {parent}")]
	NotAChild { parent: StateNodeId },

	#[error("Can't find the DOM node of removed child state node {0}")]
	UnboundChild(StateNodeId),

	#[error("State node {0} is already bound")]
	AlreadyBound(StateNodeId),

	#[error("State node {0} has no tag")]
	MissingTag(StateNodeId),

	#[error("Expected <{expected}> but the DOM element is <{actual}>")]
	TagMismatch { expected: String, actual: String },

	#[error("No binding strategy applies to state node {0}")]
	NoStrategy(StateNodeId),

	#[error("Bind depth limit ({0}) reached")]
	DepthLimit(usize),

	#[error("Reactive flush did not settle within {0} steps")]
	FlushLimit(usize),

	#[error("Invalid event data expression {expression:?}: {reason}")]
	Expression { expression: String, reason: String },

	#[error("DOM operation failed: {0}")]
	Dom(String),
}

impl Error {
	/// Whether this error means the remote peer (or the transport feeding it) sent data that contradicts the local state.
	#[must_use]
	pub fn is_protocol_violation(&self) -> bool {
		matches!(
			self,
			Self::MissingConstant(_) | Self::UnknownNode(_) | Self::FeatureShape { .. } | Self::SpliceRange { .. } | Self::NotAChild { .. } | Self::UnboundChild(_)
		)
	}
}
