//! Local adapters - concrete implementations backed by the host machine.

pub mod process;

pub use process::TokioProcessRunner;
