use crate::StateNodeId;
use std::{collections::BTreeMap, fmt};

/// A value held by a state tree property or list, or read from the DOM.
///
/// Absence of a value is expressed as [`None`] by the APIs returning [`Option<Value>`],
/// which is distinct from [`Value::Null`].
///
/// Numbers compare by their bits, so `NaN` equals itself and `0.0` differs from `-0.0`.
#[derive(Debug, Clone)]
pub enum Value {
	Null,
	Bool(bool),
	Number(f64),
	String(String),
	Node(StateNodeId),
	Array(Vec<Value>),
	Object(BTreeMap<String, Value>),
}

impl Value {
	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(string) => Some(string),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_node(&self) -> Option<StateNodeId> {
		match *self {
			Self::Node(node) => Some(node),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Looks up a member of an object, or an element of an array by its decimal index.
	#[must_use]
	pub fn member(&self, key: &str) -> Option<&Value> {
		match self {
			Self::Object(members) => members.get(key),
			Self::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
			_ => None,
		}
	}

	/// The string an attribute or style declaration receives for this value.
	#[must_use]
	pub fn to_attribute_string(&self) -> String {
		match self {
			Self::String(string) => string.clone(),
			other => other.to_string(),
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			(Self::Number(a), Self::Number(b)) => a.to_bits() == b.to_bits(),
			(Self::String(a), Self::String(b)) => a == b,
			(Self::Node(a), Self::Node(b)) => a == b,
			(Self::Array(a), Self::Array(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => a == b,
			_ => false,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Null => f.write_str("null"),
			Self::Bool(flag) => write!(f, "{}", flag),
			Self::Number(number) if number.fract() == 0.0 && number.is_finite() && number.abs() < 1e15 => write!(f, "{}", *number as i64),
			Self::Number(number) => write!(f, "{}", number),
			Self::String(string) => write!(f, "{:?}", string),
			Self::Node(node) => write!(f, "#{}", node),
			Self::Array(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					write!(f, "{}", item)?;
				}
				f.write_str("]")
			}
			Self::Object(members) => {
				f.write_str("{")?;
				for (i, (key, value)) in members.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					write!(f, "{:?}:{}", key, value)?;
				}
				f.write_str("}")
			}
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Self::Number(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Self::Number(value.into())
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_owned())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<StateNodeId> for Value {
	fn from(value: StateNodeId) -> Self {
		Self::Node(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(value: Vec<T>) -> Self {
		Self::Array(value.into_iter().map(Into::into).collect())
	}
}
