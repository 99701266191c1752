use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::process::Output;

/// Runs an external binary to completion and hands back its exit status and
/// captured output. ffprobe, ffmpeg and the audio processor all go through
/// this, so the pipeline can be driven by a fake in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[OsString]) -> io::Result<Output>;
}
