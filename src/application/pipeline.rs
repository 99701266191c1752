use crate::adapters::external_tool::{ExternalTool, ToolInvocation};
use crate::application::workspace::{JobWorkspace, StagedOutput};
use crate::config::PipelineConfig;
use crate::domain::av::concat::Concatenator;
use crate::domain::av::convert::{normalize, NORMALIZED_NAME};
use crate::domain::av::probe::{DurationProber, MediaInfo};
use crate::domain::av::segments::{processed_segment_path, Segmenter};
use crate::domain::jobs::{ExecutionPath, Job, JobOutcome, JobRequest, JobState, Segment};
use crate::error::Result;
use crate::ports::process::ProcessRunner;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Drives one job at a time from input file to published output:
/// probe, pick the short or long path, execute, publish, clean up.
///
/// A `Pipeline` is shared between concurrently running jobs; each job gets
/// its own workspace and only the processor permits are shared.
pub struct Pipeline<R: ProcessRunner + ?Sized> {
    config: PipelineConfig,
    runner: Arc<R>,
    tool: ExternalTool<R>,
}

impl<R: ProcessRunner + ?Sized> Pipeline<R> {
    pub fn new(config: PipelineConfig, runner: Arc<R>) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_tool_runs.max(1)));
        let tool = ExternalTool::new(config.tool_path.clone(), runner.clone(), permits);
        Self {
            config,
            runner,
            tool,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs a job to a terminal state. On error nothing is left at
    /// `request.output_path` and the job workspace is gone.
    pub async fn run(&self, request: JobRequest) -> Result<JobOutcome> {
        let job = Job::new(Uuid::new_v4().to_string(), request);
        let span = info_span!("job", job_id = %job.id);
        self.run_job(job).instrument(span).await
    }

    async fn run_job(&self, mut job: Job) -> Result<JobOutcome> {
        info!(
            input = %job.request.input_path.display(),
            output = %job.request.output_path.display(),
            "job received"
        );

        match self.drive(&mut job).await {
            Ok((path, segment_count, output_path)) => {
                advance(&mut job, JobState::Succeeded);
                info!(output = %output_path.display(), ?path, segment_count, "job succeeded");
                Ok(JobOutcome {
                    job_id: job.id.clone(),
                    output_path,
                    duration_seconds: job.duration_seconds,
                    path,
                    segment_count,
                    states: job.history().to_vec(),
                })
            }
            Err(err) => {
                advance(&mut job, JobState::Failed);
                error!(kind = err.kind(), "job failed: {}", err);
                Err(err)
            }
        }
    }

    async fn drive(&self, job: &mut Job) -> Result<(ExecutionPath, usize, PathBuf)> {
        let workspace = JobWorkspace::create(&self.config.temp_dir, &job.id)?;
        let staged = StagedOutput::new(&job.request.output_path, &job.id)?;

        advance(job, JobState::Probing);
        let media = self.probe(job).await;

        let (path, segment_count) = if job.is_long_form(self.config.long_form_threshold_secs) {
            advance(job, JobState::LongPath);
            advance(job, JobState::Executing);
            let count = self
                .run_long_path(job, workspace.path(), staged.path())
                .await?;
            (ExecutionPath::Long, count)
        } else {
            advance(job, JobState::ShortPath);
            advance(job, JobState::Executing);
            self.run_short_path(job, media.as_ref(), workspace.path(), staged.path())
                .await?;
            (ExecutionPath::Short, 0)
        };

        let output_path = staged.publish().await?;
        if let Err(e) = workspace.close() {
            warn!("job workspace not fully removed: {}", e);
        }
        Ok((path, segment_count, output_path))
    }

    /// Probe failures are not fatal; the job continues as short-form.
    async fn probe(&self, job: &mut Job) -> Option<MediaInfo> {
        let prober = DurationProber::new(&self.config.ffprobe_path, self.runner.as_ref());
        match prober.probe(&job.request.input_path).await {
            Ok(info) => {
                info!(duration = info.duration_seconds, "input probed");
                job.duration_seconds = Some(info.duration_seconds);
                Some(info)
            }
            Err(anomaly) => {
                warn!(%anomaly, "duration probe failed, treating input as short-form");
                None
            }
        }
    }

    async fn run_short_path(
        &self,
        job: &Job,
        media: Option<&MediaInfo>,
        workspace: &Path,
        output: &Path,
    ) -> Result<()> {
        let format = self.config.canonical_format;
        let already_canonical = media.map_or(false, |info| info.is_canonical(&format));

        let tool_input = if already_canonical {
            job.request.input_path.clone()
        } else {
            let normalized = workspace.join(NORMALIZED_NAME);
            normalize(
                &self.config.ffmpeg_path,
                self.runner.as_ref(),
                &job.request.input_path,
                &normalized,
                &format,
            )
            .await?;
            normalized
        };

        self.tool
            .run(ToolInvocation {
                input: &tool_input,
                output,
                preset: job.request.preset_path.as_deref(),
                credential: &job.request.credential,
            })
            .await
    }

    async fn run_long_path(&self, job: &Job, workspace: &Path, output: &Path) -> Result<usize> {
        let format = self.config.canonical_format;
        let segmenter = Segmenter::new(&self.config.ffmpeg_path, self.runner.as_ref(), format);
        let mut segments = segmenter
            .split(
                &job.request.input_path,
                self.config.segment_duration_secs,
                workspace,
                job.duration_seconds,
            )
            .await?;

        self.process_segments(job, &mut segments, workspace).await?;

        // Expected paths, not just the ones recorded, so a lost segment is
        // caught by the concatenator instead of silently shortening output.
        let processed: Vec<PathBuf> = segments
            .iter()
            .map(|segment| {
                segment
                    .processed_path
                    .clone()
                    .unwrap_or_else(|| processed_segment_path(workspace, segment.index))
            })
            .collect();
        let raw: Vec<PathBuf> = segments.iter().map(|s| s.raw_path.clone()).collect();

        Concatenator::new(&self.config.ffmpeg_path, self.runner.as_ref(), format)
            .concatenate(&processed, &raw, workspace, output)
            .await?;
        Ok(segments.len())
    }

    /// Strictly sequential and fail-fast: segment N+1 starts only after
    /// segment N finished successfully.
    async fn process_segments(
        &self,
        job: &Job,
        segments: &mut [Segment],
        workspace: &Path,
    ) -> Result<()> {
        let total = segments.len();
        for segment in segments.iter_mut() {
            let processed = processed_segment_path(workspace, segment.index);
            info!(segment = segment.index, total, "processing segment");
            self.tool
                .run(ToolInvocation {
                    input: &segment.raw_path,
                    output: &processed,
                    preset: job.request.preset_path.as_deref(),
                    credential: &job.request.credential,
                })
                .await?;
            segment.processed_path = Some(processed);
        }
        Ok(())
    }
}

fn advance(job: &mut Job, next: JobState) {
    if let Err(e) = job.transition(next) {
        error!("{}", e);
    }
}
