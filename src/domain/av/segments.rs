use crate::domain::formats::CanonicalFormat;
use crate::domain::jobs::Segment;
use crate::error::{PipelineError, Result};
use crate::ports::process::ProcessRunner;
use regex::Regex;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// Size of a minimal WAV header (RIFF, fmt and data chunk headers).
const WAV_HEADER_LEN: u64 = 44;

/// How much of a segment is read when looking for its `data` chunk.
const WAV_HEADER_SCAN_LEN: u64 = 4096;

const RAW_SEGMENT_PREFIX: &str = "raw_";

fn raw_segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(&format!(r"^{}(\d+)\.wav$", RAW_SEGMENT_PREFIX)).unwrap())
}

/// Planned position of one segment in the source timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSpan {
    pub index: usize,
    pub start: f64,
    pub duration: f64,
}

/// Cuts `[0, duration)` into `ceil(duration / segment_len)` spans. All spans
/// but the last are exactly `segment_len` long; the last holds the remainder.
/// A non-positive duration or segment length plans nothing.
pub fn plan_segments(duration: f64, segment_len: f64) -> Vec<SegmentSpan> {
    if !(duration > 0.0) || !(segment_len > 0.0) {
        return Vec::new();
    }

    let count = (duration / segment_len).ceil() as usize;
    (0..count)
        .map(|index| {
            let start = segment_len * index as f64;
            let duration = if index + 1 == count {
                duration - start
            } else {
                segment_len
            };
            SegmentSpan {
                index,
                start,
                duration,
            }
        })
        .collect()
}

pub fn raw_segment_pattern(workspace: &Path) -> PathBuf {
    workspace.join(format!("{}%03d.wav", RAW_SEGMENT_PREFIX))
}

pub fn processed_segment_path(workspace: &Path, index: usize) -> PathBuf {
    workspace.join(format!("processed_{:03}.wav", index))
}

/// Splits long inputs into independently decodable canonical PCM segments
/// inside a job workspace.
pub struct Segmenter<'a, R: ProcessRunner + ?Sized> {
    ffmpeg: &'a Path,
    runner: &'a R,
    format: CanonicalFormat,
}

impl<'a, R: ProcessRunner + ?Sized> Segmenter<'a, R> {
    pub fn new(ffmpeg: &'a Path, runner: &'a R, format: CanonicalFormat) -> Self {
        Self {
            ffmpeg,
            runner,
            format,
        }
    }

    pub fn args(&self, input: &Path, segment_len: f64, workspace: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-f".into(),
            "segment".into(),
            "-segment_time".into(),
            segment_len.to_string().into(),
            "-reset_timestamps".into(),
            "1".into(),
        ];
        args.extend(self.format.ffmpeg_args());
        args.push("-map_metadata".into());
        args.push("-1".into());
        args.push("-fflags".into());
        args.push("+bitexact".into());
        args.push(raw_segment_pattern(workspace).into());
        args
    }

    /// Runs the split and returns the segments in playback order.
    ///
    /// `expected_duration` is only used to sanity-check the segment count.
    pub async fn split(
        &self,
        input: &Path,
        segment_len: f64,
        workspace: &Path,
        expected_duration: Option<f64>,
    ) -> Result<Vec<Segment>> {
        let failure = |reason: String| PipelineError::Segmentation {
            input: input.to_path_buf(),
            reason,
        };
        if !(segment_len > 0.0) {
            return Err(failure(format!(
                "segment length must be positive, got {}",
                segment_len
            )));
        }

        let output = self
            .runner
            .run(self.ffmpeg, &self.args(input, segment_len, workspace))
            .await
            .map_err(|source| PipelineError::Spawn {
                program: self.ffmpeg.to_path_buf(),
                source,
            })?;

        if !output.status.success() {
            return Err(failure(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let segments = collect_segments(workspace).await.map_err(failure)?;
        if segments.is_empty() {
            return Err(failure(String::from("split produced no segments")));
        }

        if let Some(duration) = expected_duration {
            let planned = plan_segments(duration, segment_len).len();
            if planned != segments.len() {
                warn!(
                    planned,
                    produced = segments.len(),
                    "segment count differs from plan"
                );
            }
        }

        info!(count = segments.len(), input = %input.display(), "input split into segments");
        Ok(segments)
    }
}

/// Lists `raw_NNN.wav` files in the workspace, ordered by index, and checks
/// that indices run 0..n with no gaps and no empty segments.
async fn collect_segments(workspace: &Path) -> std::result::Result<Vec<Segment>, String> {
    let re = raw_segment_regex();

    let mut found: Vec<(usize, PathBuf, u64)> = Vec::new();
    let mut entries = tokio::fs::read_dir(workspace)
        .await
        .map_err(|e| format!("could not list workspace: {}", e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| format!("could not list workspace: {}", e))?
    {
        let name = entry.file_name();
        let Some(caps) = name.to_str().and_then(|name| re.captures(name)) else {
            continue;
        };
        let index: usize = caps[1]
            .parse()
            .map_err(|_| format!("bad segment index in {:?}", name))?;
        let path = entry.path();
        let payload = audio_payload_len(&path)
            .await
            .map_err(|e| format!("could not read {:?}: {}", name, e))?;
        found.push((index, path, payload));
    }
    found.sort_by_key(|(index, _, _)| *index);

    // The segment muxer can leave a header-only file when the duration is
    // an exact multiple of the segment length.
    let trailing_empty =
        found.len() > 1 && found.last().map_or(false, |(_, _, payload)| *payload == 0);
    if trailing_empty {
        if let Some((index, path, _)) = found.pop() {
            warn!(index, path = %path.display(), "trailing segment has no audio, discarding");
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| format!("could not remove empty segment: {}", e))?;
        }
    }

    let mut segments = Vec::with_capacity(found.len());
    for (position, (index, raw_path, payload)) in found.into_iter().enumerate() {
        if index != position {
            return Err(format!(
                "segment indices are not contiguous: expected {}, found {}",
                position, index
            ));
        }
        if payload == 0 {
            return Err(format!("segment {} is empty", index));
        }
        segments.push(Segment {
            index,
            raw_path,
            processed_path: None,
        });
    }
    Ok(segments)
}

/// Bytes of audio in a WAV file: the declared `data` chunk size, capped by
/// what is on disk. Without a readable RIFF header everything past a
/// minimal header counts as audio.
async fn audio_payload_len(path: &Path) -> io::Result<u64> {
    let file = tokio::fs::File::open(path).await?;
    let file_len = file.metadata().await?.len();
    let mut head = Vec::new();
    file.take(WAV_HEADER_SCAN_LEN).read_to_end(&mut head).await?;
    Ok(riff_data_len(&head, file_len).unwrap_or_else(|| file_len.saturating_sub(WAV_HEADER_LEN)))
}

/// Walks the RIFF chunk list in `head` up to the `data` chunk.
fn riff_data_len(head: &[u8], file_len: u64) -> Option<u64> {
    if head.len() < 12 || &head[0..4] != b"RIFF" || &head[8..12] != b"WAVE" {
        return None;
    }
    let mut offset = 12usize;
    while offset + 8 <= head.len() {
        let id = &head[offset..offset + 4];
        let size = u64::from(u32::from_le_bytes(head[offset + 4..offset + 8].try_into().ok()?));
        let body = offset as u64 + 8;
        if id == b"data" {
            return Some(size.min(file_len.saturating_sub(body)));
        }
        // Chunks are padded to an even length.
        offset = usize::try_from(body + size + (size & 1)).ok()?;
    }
    None
}
