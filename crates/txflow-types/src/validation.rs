//! Input validation applied before anything reaches the network.
//!
//! Malformed addresses, contract names, transaction ids and call arguments
//! are rejected here so that the chain client never sees them and the retry
//! machinery never wastes attempts on inputs that cannot succeed.

use crate::{ChainValue, PendingCall};
use thiserror::Error;

/// Maximum length of a text argument.
pub const MAX_TEXT_ARG_LEN: usize = 256;
/// Maximum length of a contract or function name.
pub const MAX_NAME_LEN: usize = 128;
/// Maximum nesting of list/tuple arguments.
pub const MAX_ARG_DEPTH: usize = 16;

/// Errors produced when an input fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
	#[error("Invalid address '{0}'")]
	Address(String),
	#[error("Invalid contract name '{0}'")]
	ContractName(String),
	#[error("Invalid contract id '{0}': expected <address>.<name>")]
	ContractId(String),
	#[error("Invalid function name '{0}'")]
	FunctionName(String),
	#[error("Invalid transaction id '{0}'")]
	TransactionId(String),
	#[error("Invalid argument {index}: {message}")]
	Argument { index: usize, message: String },
}

/// Checks a standard principal address: `S` + network byte + 38..=40
/// uppercase alphanumerics.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
	let bytes = address.as_bytes();
	let valid = (40..=42).contains(&bytes.len())
		&& bytes[0] == b'S'
		&& matches!(bytes[1], b'T' | b'P' | b'M' | b'N')
		&& bytes[2..]
			.iter()
			.all(|b| b.is_ascii_digit() || b.is_ascii_uppercase());

	if valid {
		Ok(())
	} else {
		Err(ValidationError::Address(address.to_string()))
	}
}

/// Checks a contract name: lowercase, starts with a letter, may contain
/// digits and dashes, must not end with a dash.
pub fn validate_contract_name(name: &str) -> Result<(), ValidationError> {
	let bytes = name.as_bytes();
	let valid = bytes.len() >= 2
		&& bytes.len() <= MAX_NAME_LEN
		&& bytes[0].is_ascii_lowercase()
		&& bytes[bytes.len() - 1] != b'-'
		&& bytes
			.iter()
			.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-');

	if valid {
		Ok(())
	} else {
		Err(ValidationError::ContractName(name.to_string()))
	}
}

/// Checks a transaction id: `0x` followed by 64 lowercase hex digits.
pub fn validate_transaction_id(id: &str) -> Result<(), ValidationError> {
	let valid = id.len() == 66
		&& id.starts_with("0x")
		&& id[2..]
			.bytes()
			.all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

	if valid {
		Ok(())
	} else {
		Err(ValidationError::TransactionId(id.to_string()))
	}
}

fn validate_function_name(name: &str) -> Result<(), ValidationError> {
	let valid = !name.is_empty()
		&& name.len() <= MAX_NAME_LEN
		&& name
			.bytes()
			.all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b'?' || b == b'!');

	if valid {
		Ok(())
	} else {
		Err(ValidationError::FunctionName(name.to_string()))
	}
}

fn validate_value(index: usize, value: &ChainValue, depth: usize) -> Result<(), ValidationError> {
	if depth > MAX_ARG_DEPTH {
		return Err(ValidationError::Argument {
			index,
			message: format!("nesting deeper than {}", MAX_ARG_DEPTH),
		});
	}

	match value {
		ChainValue::Text(text) if text.chars().count() > MAX_TEXT_ARG_LEN => {
			Err(ValidationError::Argument {
				index,
				message: format!("text longer than {} characters", MAX_TEXT_ARG_LEN),
			})
		},
		ChainValue::Address(address) => {
			// Contract principals are accepted as well as standard ones.
			let standard = address.split('.').next().unwrap_or_default();
			validate_address(standard).map_err(|_| ValidationError::Argument {
				index,
				message: format!("malformed address '{}'", address),
			})
		},
		ChainValue::List(items) => items
			.iter()
			.try_for_each(|item| validate_value(index, item, depth + 1)),
		ChainValue::Tuple(fields) => fields
			.values()
			.try_for_each(|item| validate_value(index, item, depth + 1)),
		_ => Ok(()),
	}
}

/// Validates a call in full: target contract, function name, sender and
/// every argument.
pub fn validate_call(call: &PendingCall) -> Result<(), ValidationError> {
	validate_address(&call.contract.address)?;
	validate_contract_name(&call.contract.name)?;
	validate_function_name(&call.function_name)?;
	validate_address(&call.sender)?;

	for (index, arg) in call.args.iter().enumerate() {
		validate_value(index, arg, 0)?;
	}

	Ok(())
}
