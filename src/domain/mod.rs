//! Domain layer - Pure pipeline logic.

pub mod av;
pub mod formats;
pub mod jobs;
