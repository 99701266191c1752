use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use stereopipe::domain::formats::{output_paths_for, validate_input, validate_preset};
use stereopipe::{
    logging, run_batch, JobRequest, Pipeline, PipelineConfig, PipelineError, TokioProcessRunner,
};

#[derive(Parser, Debug)]
#[command(name = "stereopipe")]
#[command(about = "Run audio files of any length through the stereo processor")]
struct Params {
    /// Processor preset (`.sts`).
    #[arg(short = 's', long = "preset")]
    preset: Option<PathBuf>,

    /// Processor license key.
    #[arg(short = 'k', long = "license", env = "STEREO_TOOL_LICENSE", hide_env_values = true)]
    license: String,

    /// Destination directory; overrides `OUTPUT_DIR`.
    #[arg(short = 'o', long = "output-dir")]
    output_dir: Option<PathBuf>,

    /// Jobs run at once; overrides `MAX_CONCURRENT_JOBS`.
    #[arg(short = 'j', long = "jobs")]
    jobs: Option<usize>,

    /// Audio files to process.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let params = Params::parse();
    logging::init();

    let mut config = PipelineConfig::from_env();
    if let Some(dir) = params.output_dir {
        config.output_dir = dir;
    }
    if let Some(jobs) = params.jobs {
        config.max_concurrent_jobs = jobs.max(1);
    }

    if let Some(preset) = &params.preset {
        validate_preset(preset).context("invalid preset")?;
    }

    // Rejected inputs are reported in place, the rest go to the batch.
    let mut lines: Vec<Option<String>> = vec![None; params.inputs.len()];
    let mut slots = Vec::new();
    let mut accepted = Vec::new();
    for (slot, input) in params.inputs.iter().enumerate() {
        match validate_input(input) {
            Ok(()) => {
                slots.push(slot);
                accepted.push(input.clone());
            }
            Err(err) => lines[slot] = Some(failure_line(&err)),
        }
    }

    let outputs = output_paths_for(&accepted, &config.output_dir);
    let requests: Vec<JobRequest> = accepted
        .into_iter()
        .zip(outputs)
        .map(|(input_path, output_path)| JobRequest {
            input_path,
            preset_path: params.preset.clone(),
            credential: params.license.clone(),
            output_path,
        })
        .collect();

    info!(
        accepted = requests.len(),
        rejected = params.inputs.len() - requests.len(),
        output_dir = %config.output_dir.display(),
        "processing inputs"
    );

    let pipeline = Pipeline::new(config, Arc::new(TokioProcessRunner::new()));
    let items = run_batch(&pipeline, requests).await;
    for (slot, item) in slots.into_iter().zip(items) {
        lines[slot] = Some(match item.result {
            Ok(outcome) => format!("ok {}", outcome.output_path.display()),
            Err(err) => failure_line(&err),
        });
    }

    let mut failed = false;
    for line in lines.into_iter().flatten() {
        failed |= line.starts_with("failed");
        println!("{}", line);
    }

    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn failure_line(err: &PipelineError) -> String {
    format!("failed {}: {}", err.kind(), err)
}
