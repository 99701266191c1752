//! Ports - capability traits the application layer depends on.

pub mod process;
