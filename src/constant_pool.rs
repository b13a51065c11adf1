use crate::{
	error::{Error, Result},
	Value,
};
use hashbrown::{hash_map::Entry, HashMap};
use tracing::{trace, warn};

/// Immutable payloads the remote peer sent once and refers to by key afterwards.
#[derive(Debug, Default)]
pub struct ConstantPool {
	constants: HashMap<String, Value>,
}

impl ConstantPool {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn has(&self, key: &str) -> bool {
		self.constants.contains_key(key)
	}

	/// A missing key is a protocol violation: the peer only references keys it has already sent.
	pub fn get(&self, key: &str) -> Result<&Value> {
		self.constants.get(key).ok_or_else(|| Error::MissingConstant(key.to_owned()))
	}

	/// Adds new entries. Keys that are already known keep their first value.
	pub fn import(&mut self, entries: impl IntoIterator<Item = (String, Value)>) {
		for (key, value) in entries {
			match self.constants.entry(key) {
				Entry::Occupied(occupied) => {
					if *occupied.get() != value {
						warn!("Ignoring a different value for known constant {:?}.", occupied.key());
					}
				}
				Entry::Vacant(vacant) => {
					trace!("Imported constant {:?}.", vacant.key());
					vacant.insert(value);
				}
			}
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.constants.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.constants.is_empty()
	}
}
