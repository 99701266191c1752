//! Adapter for the license-gated audio processor binary.
//!
//! Contract: `<tool> <input> <output> [-s <preset>] -k <license>`. Exit code 0
//! means `output` was written; anything else is a failure carrying the exit
//! code and the complete stderr. Failures are never retried here.

use crate::error::{PipelineError, Result};
use crate::ports::process::ProcessRunner;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// One run of the processor against one file.
#[derive(Debug, Clone, Copy)]
pub struct ToolInvocation<'a> {
    pub input: &'a Path,
    pub output: &'a Path,
    pub preset: Option<&'a Path>,
    pub credential: &'a str,
}

impl ToolInvocation<'_> {
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![self.input.into(), self.output.into()];
        if let Some(preset) = self.preset {
            args.push("-s".into());
            args.push(preset.into());
        }
        args.push("-k".into());
        args.push(self.credential.into());
        args
    }

    /// Arguments with the license replaced, safe to log.
    fn redacted_args(&self) -> Vec<OsString> {
        let mut args = self.args();
        if let Some(last) = args.last_mut() {
            *last = OsString::from("<redacted>");
        }
        args
    }
}

pub struct ExternalTool<R: ProcessRunner + ?Sized> {
    program: PathBuf,
    runner: Arc<R>,
    permits: Arc<Semaphore>,
}

impl<R: ProcessRunner + ?Sized> ExternalTool<R> {
    /// `permits` bounds how many invocations run at once across every job
    /// sharing this adapter.
    pub fn new(program: impl Into<PathBuf>, runner: Arc<R>, permits: Arc<Semaphore>) -> Self {
        Self {
            program: program.into(),
            runner,
            permits,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub async fn run(&self, invocation: ToolInvocation<'_>) -> Result<()> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PipelineError::Spawn {
                program: self.program.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "tool invocation limiter was closed",
                ),
            })?;

        debug!(program = %self.program.display(), args = ?invocation.redacted_args(), "running external tool");

        let output = self
            .runner
            .run(&self.program, &invocation.args())
            .await
            .map_err(|source| PipelineError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PipelineError::ToolExecution {
                program: self.program.clone(),
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !tokio::fs::try_exists(invocation.output).await.unwrap_or(false) {
            return Err(PipelineError::ToolExecution {
                program: self.program.clone(),
                exit_code: Some(0),
                stderr: format!(
                    "reported success but wrote no output at {}",
                    invocation.output.display()
                ),
            });
        }

        info!(input = %invocation.input.display(), output = %invocation.output.display(), "external tool finished");
        Ok(())
    }
}
