//! Runs several independent jobs through one shared [`Pipeline`].

use crate::application::pipeline::Pipeline;
use crate::domain::jobs::{JobOutcome, JobRequest};
use crate::error::PipelineError;
use crate::ports::process::ProcessRunner;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Result of one job in a batch.
#[derive(Debug)]
pub struct BatchItem {
    pub input_path: PathBuf,
    pub result: Result<JobOutcome, PipelineError>,
}

/// Runs `jobs` with at most `max_concurrent_jobs` in flight and returns one
/// item per request, in request order. A failing or timed out job does not
/// affect the others. A request whose output path an earlier request already
/// uses is refused without running.
pub async fn run_batch<R>(pipeline: &Pipeline<R>, jobs: Vec<JobRequest>) -> Vec<BatchItem>
where
    R: ProcessRunner + ?Sized,
{
    let config = pipeline.config();
    let limit = config.max_concurrent_jobs.max(1);
    let timeout = config.job_timeout;
    info!(jobs = jobs.len(), limit, "starting batch");

    let mut claimed = HashSet::new();
    let jobs: Vec<(JobRequest, bool)> = jobs
        .into_iter()
        .map(|request| {
            let first_claim = claimed.insert(request.output_path.clone());
            (request, first_claim)
        })
        .collect();

    let items: Vec<BatchItem> = stream::iter(jobs)
        .map(|(request, first_claim)| async move {
            let input_path = request.input_path.clone();
            if !first_claim {
                warn!(output = %request.output_path.display(), "output path used twice in batch");
                let result = Err(PipelineError::UnsupportedInput {
                    path: input_path.clone(),
                    reason: format!(
                        "output {} is already used by another job in this batch",
                        request.output_path.display()
                    ),
                });
                return BatchItem { input_path, result };
            }
            let result = match timeout {
                Some(budget) => match tokio::time::timeout(budget, pipeline.run(request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(input = %input_path.display(), ?budget, "job timed out");
                        Err(PipelineError::TimedOut(budget))
                    }
                },
                None => pipeline.run(request).await,
            };
            BatchItem { input_path, result }
        })
        .buffered(limit)
        .collect()
        .await;

    let failed = items.iter().filter(|item| item.result.is_err()).count();
    info!(total = items.len(), failed, "batch finished");
    items
}
