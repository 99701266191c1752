//! Adapters - Concrete implementations of ports.

pub mod external_tool;
pub mod local;

#[cfg(test)]
pub(crate) mod fake;
