//! Registry trait for self-registering implementations.
//!
//! Pluggable backends (storage, chain clients) declare the name they are
//! configured under and the factory that builds them.

/// Base trait for implementation registries.
///
/// Each implementation module provides a `Registry` struct implementing this
/// trait, so that every implementation declares its configuration name and a
/// factory function.
pub trait ImplementationRegistry {
	/// The name used in configuration files to reference this implementation,
	/// for example `"memory"` for `[chain.implementations.memory]`.
	const NAME: &'static str;

	/// The factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
