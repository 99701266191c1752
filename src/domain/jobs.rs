use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a caller hands the pipeline: an already-validated input, an
/// optional preset, the license string and where the result should land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub input_path: PathBuf,
    pub preset_path: Option<PathBuf>,
    pub credential: String,
    pub output_path: PathBuf,
}

/// A job being driven through the pipeline.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub request: JobRequest,
    /// Filled in once by the duration probe.
    pub duration_seconds: Option<f64>,
    state: JobState,
    history: Vec<JobState>,
}

impl Job {
    pub fn new(id: impl Into<String>, request: JobRequest) -> Self {
        Self {
            id: id.into(),
            request,
            duration_seconds: None,
            state: JobState::Received,
            history: vec![JobState::Received],
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    /// `true` only when a probed duration is strictly above the threshold.
    /// An unprobed job is short-form.
    pub fn is_long_form(&self, threshold_seconds: f64) -> bool {
        matches!(self.duration_seconds, Some(duration) if duration > threshold_seconds)
    }

    /// Move to `next`. Invalid moves are refused and leave the job untouched.
    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(job_id = %self.id, from = %self.state, to = %next, "job state change");
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Received,
    Probing,
    ShortPath,
    LongPath,
    Executing,
    Succeeded,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Failed)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Succeeded | Failed, _) => false,
            (_, Failed) => true,
            (Received, Probing) => true,
            (Probing, ShortPath | LongPath) => true,
            (ShortPath | LongPath, Executing) => true,
            (Executing, Succeeded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobState::Received => "received",
            JobState::Probing => "probing",
            JobState::ShortPath => "short_path",
            JobState::LongPath => "long_path",
            JobState::Executing => "executing",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid job transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// Which branch of the state machine a job took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Single pass, after optional normalization.
    Short,
    /// Segment, process each, concatenate.
    Long,
}

/// One slice of a long-form job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Zero-based playback position.
    pub index: usize,
    pub raw_path: PathBuf,
    pub processed_path: Option<PathBuf>,
}

/// Successful terminal result of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub output_path: PathBuf,
    pub duration_seconds: Option<f64>,
    pub path: ExecutionPath,
    /// Number of segments processed; 0 on the short path.
    pub segment_count: usize,
    pub states: Vec<JobState>,
}
