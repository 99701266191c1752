use crate::error::{PipelineError, Result};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Audio containers accepted for processing.
pub const ACCEPTED_AUDIO_EXTENSIONS: [&str; 6] = ["wav", "mp3", "flac", "aiff", "ogg", "m4a"];

/// Extension of processor preset files.
pub const PRESET_EXTENSION: &str = "sts";

/// Every intermediate and final file the pipeline writes uses this format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalFormat {
    pub sample_rate: u32,
    /// `None` keeps the source channel layout.
    pub channels: Option<u8>,
}

impl CanonicalFormat {
    /// 16-bit little-endian linear PCM.
    pub const CODEC: &'static str = "pcm_s16le";

    /// ffmpeg output options selecting this format.
    pub fn ffmpeg_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-c:a".into(),
            Self::CODEC.into(),
            "-ar".into(),
            self.sample_rate.to_string().into(),
        ];
        if let Some(channels) = self.channels {
            args.push("-ac".into());
            args.push(channels.to_string().into());
        }
        args
    }
}

impl Default for CanonicalFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: Some(2),
        }
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn validate_input(path: &Path) -> Result<()> {
    match lowercase_extension(path) {
        Some(ext) if ACCEPTED_AUDIO_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(PipelineError::UnsupportedInput {
            path: path.to_path_buf(),
            reason: format!(
                "expected one of: {}",
                ACCEPTED_AUDIO_EXTENSIONS.join(", ")
            ),
        }),
    }
}

pub fn validate_preset(path: &Path) -> Result<()> {
    match lowercase_extension(path) {
        Some(ext) if ext == PRESET_EXTENSION => Ok(()),
        _ => Err(PipelineError::UnsupportedInput {
            path: path.to_path_buf(),
            reason: format!("preset must be a .{} file", PRESET_EXTENSION),
        }),
    }
}

/// Where the processed version of `input` lands: always WAV, prefixed
/// with `processed_`.
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("processed_{}.wav", stem_of(input)))
}

/// One output path per input, all distinct. Inputs whose names would
/// collide get `_2`, `_3`, ... appended in input order.
pub fn output_paths_for(inputs: &[PathBuf], output_dir: &Path) -> Vec<PathBuf> {
    let mut taken = HashSet::new();
    inputs
        .iter()
        .map(|input| {
            let stem = stem_of(input);
            let mut candidate = output_path_for(input, output_dir);
            let mut n = 2;
            while !taken.insert(candidate.clone()) {
                candidate = output_dir.join(format!("processed_{}_{}.wav", stem, n));
                n += 1;
            }
            candidate
        })
        .collect()
}

fn stem_of(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("output"))
}
