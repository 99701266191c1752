//! Pipeline configuration, loaded from the environment.

use crate::domain::formats::CanonicalFormat;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Explicit replacement for fixed upload/output/temp directories: everything
/// the pipeline needs to know about its surroundings.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Audio processor binary
    pub tool_path: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Root under which per-job workspaces are created
    pub temp_dir: PathBuf,
    /// Default destination directory for processed files
    pub output_dir: PathBuf,
    /// Inputs strictly longer than this many seconds are segmented
    pub long_form_threshold_secs: f64,
    /// Target length of each segment in seconds
    pub segment_duration_secs: f64,
    /// Upper bound on simultaneous processor invocations across all jobs
    pub max_concurrent_tool_runs: usize,
    /// Upper bound on simultaneous jobs in a batch
    pub max_concurrent_jobs: usize,
    /// Optional wall-clock budget applied by the batch runner
    pub job_timeout: Option<Duration>,
    pub canonical_format: CanonicalFormat,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tool_path: PathBuf::from("./stereo_tool"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            temp_dir: PathBuf::from("./temp"),
            output_dir: PathBuf::from("./outputs"),
            long_form_threshold_secs: 1800.0,
            segment_duration_secs: 600.0,
            max_concurrent_tool_runs: 2,
            max_concurrent_jobs: 2,
            job_timeout: None,
            canonical_format: CanonicalFormat::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables (and `.env` if present).
    /// Anything unset or unparseable keeps its default.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let path = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        let long_form_threshold_secs = parse_or(
            &lookup,
            "LONG_FORM_THRESHOLD_SECS",
            defaults.long_form_threshold_secs,
        );
        let segment_duration_secs = positive_or(
            parse_or(&lookup, "SEGMENT_DURATION_SECS", defaults.segment_duration_secs),
            "SEGMENT_DURATION_SECS",
            defaults.segment_duration_secs,
        );
        let max_concurrent_tool_runs = parse_or(
            &lookup,
            "MAX_CONCURRENT_TOOL_RUNS",
            defaults.max_concurrent_tool_runs,
        )
        .max(1);
        let max_concurrent_jobs =
            parse_or(&lookup, "MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs).max(1);
        let job_timeout = parse_or::<u64>(&lookup, "JOB_TIMEOUT_SECS", 0);
        let sample_rate = parse_or(
            &lookup,
            "CANONICAL_SAMPLE_RATE",
            defaults.canonical_format.sample_rate,
        );
        let channels = parse_or::<u8>(&lookup, "CANONICAL_CHANNELS", 2);

        Self {
            tool_path: path("STEREO_TOOL_PATH", defaults.tool_path),
            ffmpeg_path: path("FFMPEG_PATH", defaults.ffmpeg_path),
            ffprobe_path: path("FFPROBE_PATH", defaults.ffprobe_path),
            temp_dir: path("TEMP_DIR", defaults.temp_dir),
            output_dir: path("OUTPUT_DIR", defaults.output_dir),
            long_form_threshold_secs,
            segment_duration_secs,
            max_concurrent_tool_runs,
            max_concurrent_jobs,
            job_timeout: (job_timeout > 0).then(|| Duration::from_secs(job_timeout)),
            canonical_format: CanonicalFormat {
                sample_rate,
                channels: (channels > 0).then_some(channels),
            },
        }
    }
}

fn parse_or<T: FromStr + Copy>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, "unparseable setting, using default");
                default
            }
        },
    }
}

fn positive_or(value: f64, key: &str, default: f64) -> f64 {
    if value > 0.0 {
        value
    } else {
        warn!(key, value, "setting must be positive, using default");
        default
    }
}
