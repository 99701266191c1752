//! Scripted stand-in for ffprobe, ffmpeg and the audio processor.
//!
//! "Audio" files are a 44 byte WAV header followed by text lines; each line is
//! `<label>:<seconds>`. Splitting, processing and joining manipulate those
//! lines, so tests can check segment order and total duration of a result.

use crate::domain::av::segments::plan_segments;
use crate::ports::process::ProcessRunner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::ffi::OsString;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

const HEADER_LEN: usize = 44;

/// A 16-bit stereo 44.1 kHz WAV file. A non-empty `info` adds a LIST chunk
/// before `data`, the way ffmpeg's muxer does without `+bitexact`.
pub(crate) fn wav_bytes(info: &[u8], payload: &[u8]) -> Vec<u8> {
    let padded_info = if info.is_empty() {
        0
    } else {
        8 + info.len() + info.len() % 2
    };
    let riff_len = 4 + 24 + padded_info + 8 + payload.len();

    let mut bytes = Vec::with_capacity(8 + riff_len);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(riff_len as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&44_100u32.to_le_bytes());
    bytes.extend_from_slice(&(44_100u32 * 4).to_le_bytes());
    bytes.extend_from_slice(&4u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    if !info.is_empty() {
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&(info.len() as u32).to_le_bytes());
        bytes.extend_from_slice(info);
        if info.len() % 2 == 1 {
            bytes.push(0);
        }
    }
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub(crate) fn write_audio(path: &Path, body: &str) {
    std::fs::write(path, wav_bytes(&[], body.as_bytes())).unwrap();
}

pub(crate) fn read_body(path: &Path) -> String {
    let bytes = std::fs::read(path).unwrap();
    String::from_utf8(bytes[HEADER_LEN..].to_vec()).unwrap()
}

fn exit(code: i32, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[derive(Default)]
pub(crate) struct FakeMedia {
    durations: HashMap<String, f64>,
    codec: Option<String>,
    fail_tool_call: Option<usize>,
    fail_split: bool,
    fail_concat: bool,
    tool_delay: Option<Duration>,
    tool_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    log: Mutex<Vec<(String, Vec<String>)>>,
    modes: Mutex<Vec<&'static str>>,
}

impl FakeMedia {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inputs without a duration fail to probe.
    pub(crate) fn with_duration(mut self, input: &Path, seconds: f64) -> Self {
        self.durations
            .insert(input.to_string_lossy().into_owned(), seconds);
        self
    }

    /// Codec reported by ffprobe; defaults to canonical 16-bit PCM.
    pub(crate) fn with_codec(mut self, codec: &str) -> Self {
        self.codec = Some(codec.to_string());
        self
    }

    /// The processor fails on its `n`th call (0-based), after writing a
    /// partial output file.
    pub(crate) fn fail_tool_call(mut self, n: usize) -> Self {
        self.fail_tool_call = Some(n);
        self
    }

    pub(crate) fn fail_split(mut self) -> Self {
        self.fail_split = true;
        self
    }

    pub(crate) fn fail_concat(mut self) -> Self {
        self.fail_concat = true;
        self
    }

    pub(crate) fn with_tool_delay(mut self, delay: Duration) -> Self {
        self.tool_delay = Some(delay);
        self
    }

    /// Program names in call order.
    pub(crate) fn programs(&self) -> Vec<String> {
        self.log.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    pub(crate) fn tool_invocations(&self) -> Vec<Vec<String>> {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|(program, _)| program == "stereo_tool")
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub(crate) fn ffmpeg_modes(&self) -> Vec<&'static str> {
        self.modes.lock().unwrap().clone()
    }

    pub(crate) fn max_tool_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn ffprobe(&self, args: &[String]) -> Output {
        let input = args.last().cloned().unwrap_or_default();
        match self.durations.get(&input) {
            Some(duration) => {
                let codec = self.codec.as_deref().unwrap_or("pcm_s16le");
                let mut output = exit(0, "");
                output.stdout = format!(
                    r#"{{"streams":[{{"codec_name":"{}","sample_rate":"44100","channels":2}}],"format":{{"duration":"{:.6}"}}}}"#,
                    codec, duration
                )
                .into_bytes();
                output
            }
            None => exit(1, "Invalid data found when processing input"),
        }
    }

    fn ffmpeg(&self, args: &[String]) -> Output {
        match value_after(args, "-f") {
            Some("segment") => self.split(args),
            Some("concat") => self.concat(args),
            _ => self.normalize(args),
        }
    }

    fn split(&self, args: &[String]) -> Output {
        self.modes.lock().unwrap().push("split");
        if self.fail_split {
            return exit(1, "Invalid data found when processing input");
        }
        let input = value_after(args, "-i").unwrap_or_default();
        let segment_len: f64 = value_after(args, "-segment_time")
            .and_then(|v| v.parse().ok())
            .unwrap_or(600.0);
        let duration = self.durations.get(input).copied().unwrap_or(0.0);
        let pattern = args.last().cloned().unwrap_or_default();

        for span in plan_segments(duration, segment_len) {
            let path = pattern.replace("%03d", &format!("{:03}", span.index));
            write_audio(Path::new(&path), &format!("{}:{}\n", span.index, span.duration));
        }
        exit(0, "")
    }

    fn concat(&self, args: &[String]) -> Output {
        self.modes.lock().unwrap().push("concat");
        if self.fail_concat {
            return exit(1, "Non-monotonous DTS in output stream");
        }
        let manifest = value_after(args, "-i").unwrap_or_default();
        let listing = std::fs::read_to_string(manifest).unwrap();
        let mut body = String::new();
        for line in listing.lines() {
            let path = line
                .trim_start_matches("file '")
                .trim_end_matches('\'')
                .replace(r"'\''", "'");
            body.push_str(&read_body(Path::new(&path)));
        }
        let output = args.last().cloned().unwrap_or_default();
        write_audio(Path::new(&output), &body);
        exit(0, "")
    }

    fn normalize(&self, args: &[String]) -> Output {
        self.modes.lock().unwrap().push("normalize");
        let input = value_after(args, "-i").unwrap_or_default();
        let duration = self.durations.get(input).copied().unwrap_or(0.0);
        let output = args.last().cloned().unwrap_or_default();
        write_audio(Path::new(&output), &format!("norm:{}\n", duration));
        exit(0, "")
    }

    async fn tool(&self, args: &[String]) -> Output {
        let call = self.tool_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.tool_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let (input, output) = (Path::new(&args[0]), Path::new(&args[1]));
        if self.fail_tool_call == Some(call) {
            std::fs::write(output, b"partial").unwrap();
            return exit(3, "license rejected\n");
        }

        let body: String = read_body(input)
            .lines()
            .map(|line| format!("st:{}\n", line))
            .collect();
        write_audio(output, &body);
        exit(0, "")
    }
}

#[async_trait]
impl ProcessRunner for FakeMedia {
    async fn run(&self, program: &Path, args: &[OsString]) -> io::Result<Output> {
        let name = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args: Vec<String> = args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();
        self.log.lock().unwrap().push((name.clone(), args.clone()));

        Ok(match name.as_str() {
            "ffprobe" => self.ffprobe(&args),
            "ffmpeg" => self.ffmpeg(&args),
            "stereo_tool" => self.tool(&args).await,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("{} not found", other),
                ))
            }
        })
    }
}

