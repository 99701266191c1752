//! Application layer - Services that drive jobs through the ports.

pub mod batch;
pub mod pipeline;
pub mod workspace;
