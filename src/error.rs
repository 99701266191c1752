//! Error taxonomy for the processing pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// A fatal job failure. Every variant ends the job in `Failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Splitting the input failed or produced no usable segments.
    #[error("segmentation failed for {}: {reason}", .input.display())]
    Segmentation { input: PathBuf, reason: String },

    /// The external tool exited non-zero (or claimed success without output).
    #[error("{} failed{}: {stderr}", .program.display(), exit_suffix(.exit_code))]
    ToolExecution {
        program: PathBuf,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    Concatenation(#[from] ConcatenationError),

    /// Normalizing a short-form input to the canonical format failed.
    #[error("conversion of {} to canonical format failed: {stderr}", .input.display())]
    Conversion { input: PathBuf, stderr: String },

    /// A binary could not be started at all.
    #[error("could not start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating, writing or publishing job files failed.
    #[error("workspace error: {context}: {source}")]
    Workspace {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported input {}: {reason}", .path.display())]
    UnsupportedInput { path: PathBuf, reason: String },

    /// The caller's wall-clock budget for the job ran out.
    #[error("job exceeded its time budget of {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl PipelineError {
    /// Stable machine-readable kind, for callers that map errors to responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Segmentation { .. } => "segmentation_error",
            PipelineError::ToolExecution { .. } => "tool_execution_error",
            PipelineError::Concatenation(_) => "concatenation_error",
            PipelineError::Conversion { .. } => "conversion_error",
            PipelineError::Spawn { .. } => "spawn_error",
            PipelineError::Workspace { .. } => "workspace_error",
            PipelineError::UnsupportedInput { .. } => "unsupported_input",
            PipelineError::TimedOut(_) => "timed_out",
        }
    }

    pub(crate) fn workspace(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Workspace {
            context: context.into(),
            source,
        }
    }
}

/// Reassembly failures. These point at an internal invariant violation
/// (segment bookkeeping out of sync) rather than bad user input.
#[derive(Debug, Error)]
pub enum ConcatenationError {
    #[error("no segments to concatenate")]
    NoSegments,

    #[error("processed segment {index} is missing at {}", .path.display())]
    MissingSegment { index: usize, path: PathBuf },

    #[error("could not write concat manifest {}: {source}", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("joining segments failed{}: {stderr}", exit_suffix(.exit_code))]
    Join {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Recoverable: the duration probe failed and the job falls back to the
/// short-form path. Logged, never returned as a job failure.
#[derive(Debug, Clone, Error)]
#[error("could not probe {}: {reason}", .path.display())]
pub struct ProbeAnomaly {
    pub path: PathBuf,
    pub reason: String,
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {}", code),
        None => String::from(" (terminated by signal)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_message_carries_code_and_stderr() {
        let err = PipelineError::ToolExecution {
            program: PathBuf::from("./stereo_tool"),
            exit_code: Some(3),
            stderr: String::from("invalid license"),
        };
        let message = err.to_string();
        assert!(message.contains("exit code 3"));
        assert!(message.contains("invalid license"));
        assert_eq!(err.kind(), "tool_execution_error");
    }

    #[test]
    fn signal_termination_is_reported() {
        let err = ConcatenationError::Join {
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn concatenation_error_converts_into_pipeline_error() {
        let err: PipelineError = ConcatenationError::NoSegments.into();
        assert_eq!(err.kind(), "concatenation_error");
        assert_eq!(err.to_string(), "no segments to concatenate");
    }
}
