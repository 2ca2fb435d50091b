use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use kifu::config::{self, InitMode};
use kifu::{run_pipeline, PipelineOptions};
use log::info;

#[derive(Parser)]
#[command(name = "kifu")]
#[command(version, about = "Reconstructs an SGF move record from a video of a Go game")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Strict,
    Transparent,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline on a recorded video
    Run {
        /// Path to the recorded video
        video: PathBuf,
        /// Path to the 7-class board detector ONNX model
        #[arg(long)]
        detector_model: PathBuf,
        /// Path to the per-cell classifier ONNX model
        #[arg(long)]
        classifier_model: PathBuf,
        /// Where to write the resulting SGF
        #[arg(long)]
        out: PathBuf,
        /// Seconds between sampled frames
        #[arg(long)]
        interval: Option<f64>,
        /// Frame budget for establishing the initial position
        #[arg(long)]
        max_init_frames: Option<u32>,
        /// Initial-position reconstruction strategy
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
        /// Re-detect on a padded, warped canvas for sharper corners
        #[arg(long)]
        double_transform: bool,
    },
    /// Open the config file in $EDITOR
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            video,
            detector_model,
            classifier_model,
            out,
            interval,
            max_init_frames,
            mode,
            double_transform,
        } => run(
            &video,
            &detector_model,
            &classifier_model,
            &out,
            interval,
            max_init_frames,
            mode,
            double_transform,
        ),
        Commands::Config => open_config(),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    video: &std::path::Path,
    detector_model: &std::path::Path,
    classifier_model: &std::path::Path,
    out: &std::path::Path,
    interval: Option<f64>,
    max_init_frames: Option<u32>,
    mode: Option<ModeArg>,
    double_transform: bool,
) -> Result<()> {
    let cfg = config::load_config(None)?;

    let options = PipelineOptions {
        analysis_interval_seconds: interval.unwrap_or(cfg.analysis_interval_seconds),
        max_init_frames: max_init_frames.unwrap_or(cfg.max_init_frames),
        mode: mode
            .map(|m| match m {
                ModeArg::Strict => InitMode::Strict,
                ModeArg::Transparent => InitMode::Transparent,
            })
            .unwrap_or(cfg.mode),
        double_transform: double_transform || cfg.double_transform,
        score_threshold: cfg.score_threshold,
    };

    info!("processing {}", video.display());

    let sgf_text = run_pipeline(video, detector_model, classifier_model, out, options)
        .context("running reconstruction pipeline")?;

    info!("wrote {} bytes to {}", sgf_text.len(), out.display());
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
