use crate::domain::formats::CanonicalFormat;
use crate::error::ProbeAnomaly;
use crate::ports::process::ProcessRunner;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Container-level facts about an input, read without decoding audio.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_seconds: f64,
    pub codec_name: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

impl MediaInfo {
    /// Whether the file can go to the processor as-is.
    pub fn is_canonical(&self, format: &CanonicalFormat) -> bool {
        let channels_match = match format.channels {
            Some(wanted) => self.channels == Some(wanted),
            None => true,
        };
        self.codec_name.as_deref() == Some(CanonicalFormat::CODEC)
            && self.sample_rate == Some(format.sample_rate)
            && channels_match
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeReport {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Reads duration and first audio stream parameters via ffprobe.
pub struct DurationProber<'a, R: ProcessRunner + ?Sized> {
    ffprobe: &'a Path,
    runner: &'a R,
}

impl<'a, R: ProcessRunner + ?Sized> DurationProber<'a, R> {
    pub fn new(ffprobe: &'a Path, runner: &'a R) -> Self {
        Self { ffprobe, runner }
    }

    pub fn args(input: &Path) -> Vec<OsString> {
        vec![
            "-v".into(),
            "error".into(),
            "-select_streams".into(),
            "a:0".into(),
            "-show_entries".into(),
            "format=duration:stream=codec_name,sample_rate,channels".into(),
            "-of".into(),
            "json".into(),
            input.into(),
        ]
    }

    pub async fn probe(&self, input: &Path) -> Result<MediaInfo, ProbeAnomaly> {
        let anomaly = |reason: String| ProbeAnomaly {
            path: PathBuf::from(input),
            reason,
        };

        let output = self
            .runner
            .run(self.ffprobe, &Self::args(input))
            .await
            .map_err(|e| anomaly(format!("ffprobe could not run: {}", e)))?;

        if !output.status.success() {
            return Err(anomaly(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_report(&output.stdout).map_err(anomaly)
    }
}

fn parse_report(stdout: &[u8]) -> Result<MediaInfo, String> {
    let report: FfprobeReport =
        serde_json::from_slice(stdout).map_err(|e| format!("unreadable ffprobe output: {}", e))?;

    let raw_duration = report
        .format
        .and_then(|format| format.duration)
        .ok_or_else(|| String::from("no container duration"))?;
    let duration_seconds = raw_duration
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("duration {:?} is not a number", raw_duration))?;
    if !duration_seconds.is_finite() || duration_seconds < 0.0 {
        return Err(format!("duration {} is out of range", duration_seconds));
    }

    let stream = report.streams.into_iter().next();
    let (codec_name, sample_rate, channels) = match stream {
        Some(stream) => (
            stream.codec_name,
            stream.sample_rate.and_then(|rate| rate.parse().ok()),
            stream.channels,
        ),
        None => (None, None, None),
    };

    Ok(MediaInfo {
        duration_seconds,
        codec_name,
        sample_rate,
        channels,
    })
}
