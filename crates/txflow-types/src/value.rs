//! Typed values for contract call arguments and event payloads.
//!
//! Chain-specific encoding is left to the chain client; this type only
//! fixes the shape of the data so that both sides of the boundary agree
//! on what a value is.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value passed to or returned from a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainValue {
	/// Unsigned integer.
	UInt(u128),
	/// Signed integer.
	Int(i128),
	/// UTF-8 text.
	Text(String),
	/// Boolean flag.
	Bool(bool),
	/// Principal or account address.
	Address(String),
	/// Raw bytes.
	Buffer(Vec<u8>),
	/// Absent optional value.
	None,
	/// Ordered list of values.
	List(Vec<ChainValue>),
	/// Named fields, ordered by key.
	Tuple(BTreeMap<String, ChainValue>),
}

impl ChainValue {
	/// Returns the name of the variant, used in validation messages.
	pub fn kind(&self) -> &'static str {
		match self {
			ChainValue::UInt(_) => "uint",
			ChainValue::Int(_) => "int",
			ChainValue::Text(_) => "text",
			ChainValue::Bool(_) => "bool",
			ChainValue::Address(_) => "address",
			ChainValue::Buffer(_) => "buffer",
			ChainValue::None => "none",
			ChainValue::List(_) => "list",
			ChainValue::Tuple(_) => "tuple",
		}
	}

	pub fn as_uint(&self) -> Option<u128> {
		match self {
			ChainValue::UInt(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_text(&self) -> Option<&str> {
		match self {
			ChainValue::Text(v) | ChainValue::Address(v) => Some(v),
			_ => None,
		}
	}

	/// Looks up a field of a tuple value.
	pub fn field(&self, name: &str) -> Option<&ChainValue> {
		match self {
			ChainValue::Tuple(fields) => fields.get(name),
			_ => None,
		}
	}

	/// Builds a tuple from `(name, value)` pairs.
	pub fn tuple<I, K>(fields: I) -> Self
	where
		I: IntoIterator<Item = (K, ChainValue)>,
		K: Into<String>,
	{
		ChainValue::Tuple(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
	}
}

impl fmt::Display for ChainValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ChainValue::UInt(v) => write!(f, "u{}", v),
			ChainValue::Int(v) => write!(f, "{}", v),
			ChainValue::Text(v) => write!(f, "\"{}\"", v),
			ChainValue::Bool(v) => write!(f, "{}", v),
			ChainValue::Address(v) => write!(f, "'{}", v),
			ChainValue::Buffer(v) => write!(f, "0x{}", hex::encode(v)),
			ChainValue::None => write!(f, "none"),
			ChainValue::List(items) => {
				write!(f, "(list")?;
				for item in items {
					write!(f, " {}", item)?;
				}
				write!(f, ")")
			},
			ChainValue::Tuple(fields) => {
				write!(f, "{{")?;
				for (i, (k, v)) in fields.iter().enumerate() {
					if i > 0 {
						write!(f, ", ")?;
					}
					write!(f, "{}: {}", k, v)?;
				}
				write!(f, "}}")
			},
		}
	}
}

impl From<u128> for ChainValue {
	fn from(v: u128) -> Self {
		ChainValue::UInt(v)
	}
}

impl From<i128> for ChainValue {
	fn from(v: i128) -> Self {
		ChainValue::Int(v)
	}
}

impl From<bool> for ChainValue {
	fn from(v: bool) -> Self {
		ChainValue::Bool(v)
	}
}

impl From<&str> for ChainValue {
	fn from(v: &str) -> Self {
		ChainValue::Text(v.to_string())
	}
}

impl From<String> for ChainValue {
	fn from(v: String) -> Self {
		ChainValue::Text(v)
	}
}
