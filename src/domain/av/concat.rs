use crate::domain::formats::CanonicalFormat;
use crate::error::{ConcatenationError, PipelineError, Result};
use crate::ports::process::ProcessRunner;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const MANIFEST_NAME: &str = "manifest.txt";

/// Renders an ffmpeg concat-demuxer list, one `file '<path>'` per line.
pub fn render_manifest(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Joins processed segments into one continuous canonical PCM file.
pub struct Concatenator<'a, R: ProcessRunner + ?Sized> {
    ffmpeg: &'a Path,
    runner: &'a R,
    format: CanonicalFormat,
}

impl<'a, R: ProcessRunner + ?Sized> Concatenator<'a, R> {
    pub fn new(ffmpeg: &'a Path, runner: &'a R, format: CanonicalFormat) -> Self {
        Self {
            ffmpeg,
            runner,
            format,
        }
    }

    pub fn args(&self, manifest: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-f".into(),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            manifest.into(),
        ];
        args.extend(self.format.ffmpeg_args());
        args.push("-map_metadata".into());
        args.push("-1".into());
        args.push("-fflags".into());
        args.push("+bitexact".into());
        args.push(output.into());
        args
    }

    /// Writes `output` from `processed` (in index order), then deletes the
    /// manifest plus every path in `processed` and `raw`.
    pub async fn concatenate(
        &self,
        processed: &[PathBuf],
        raw: &[PathBuf],
        workspace: &Path,
        output: &Path,
    ) -> Result<()> {
        if processed.is_empty() {
            return Err(ConcatenationError::NoSegments.into());
        }
        for (index, path) in processed.iter().enumerate() {
            let exists = tokio::fs::try_exists(path).await.unwrap_or(false);
            if !exists {
                return Err(ConcatenationError::MissingSegment {
                    index,
                    path: path.clone(),
                }
                .into());
            }
        }

        let manifest = workspace.join(MANIFEST_NAME);
        tokio::fs::write(&manifest, render_manifest(processed))
            .await
            .map_err(|source| ConcatenationError::Manifest {
                path: manifest.clone(),
                source,
            })?;
        debug!(manifest = %manifest.display(), segments = processed.len(), "concat manifest written");

        let result = self
            .runner
            .run(self.ffmpeg, &self.args(&manifest, output))
            .await
            .map_err(|source| PipelineError::Spawn {
                program: self.ffmpeg.to_path_buf(),
                source,
            })?;

        if !result.status.success() {
            return Err(ConcatenationError::Join {
                exit_code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            }
            .into());
        }

        info!(segments = processed.len(), output = %output.display(), "segments joined");

        for path in raw.iter().chain(processed).chain(std::iter::once(&manifest)) {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), "could not remove intermediate file: {}", e);
            }
        }
        Ok(())
    }
}
