//! Stereopipe - Large-file audio processing around a license-gated processor
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, formats, av: probe/segments/concat/convert)
//! - ports/: Trait definitions
//! - adapters/: Concrete implementations (process runner, audio processor)
//! - application/: Job pipeline, batch runner, per-job workspaces
//! - config: Environment configuration
//!
//! Inputs longer than the configured threshold are split into fixed-length
//! segments, each segment is run through the processor, and the processed
//! segments are joined back into one file. Shorter inputs go through the
//! processor in a single run.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod ports;

// Re-exports for convenience
pub use adapters::local::TokioProcessRunner;
pub use application::batch::{run_batch, BatchItem};
pub use application::pipeline::Pipeline;
pub use config::PipelineConfig;
pub use domain::jobs::{JobOutcome, JobRequest};
pub use error::PipelineError;
