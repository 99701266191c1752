use crate::domain::formats::CanonicalFormat;
use crate::error::{PipelineError, Result};
use crate::ports::process::ProcessRunner;
use std::ffi::OsString;
use std::path::Path;
use tracing::info;

pub const NORMALIZED_NAME: &str = "normalized.wav";

pub fn normalize_args(input: &Path, output: &Path, format: &CanonicalFormat) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-y".into(),
        "-i".into(),
        input.into(),
        "-vn".into(),
    ];
    args.extend(format.ffmpeg_args());
    args.push(output.into());
    args
}

/// Re-encodes `input` to canonical PCM at `output` in a single pass.
pub async fn normalize<R: ProcessRunner + ?Sized>(
    ffmpeg: &Path,
    runner: &R,
    input: &Path,
    output: &Path,
    format: &CanonicalFormat,
) -> Result<()> {
    let result = runner
        .run(ffmpeg, &normalize_args(input, output, format))
        .await
        .map_err(|source| PipelineError::Spawn {
            program: ffmpeg.to_path_buf(),
            source,
        })?;

    if !result.status.success() {
        return Err(PipelineError::Conversion {
            input: input.to_path_buf(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    info!(input = %input.display(), "input normalized to canonical PCM");
    Ok(())
}
