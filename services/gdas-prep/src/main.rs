//! GDAS analysis preparation tool.
//!
//! Fetches one GDAS analysis (or takes a local file), writes
//! `input_surface.npy` and `input_upper.npy`, then removes the download
//! unless asked to keep it.

mod cleanup;
mod download;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tensor_prep::{parse_analysis_time, BackendKind, Pipeline, PrepConfig, PressureLevels};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use download::{DownloadConfig, DownloadManager, DownloadRequest, DownloadSource};

#[derive(Parser, Debug)]
#[command(name = "gdas-prep")]
#[command(about = "Prepare surface and upper-air input tensors from a GDAS analysis")]
struct Args {
    /// Analysis time as YYYYMMDDHH (00, 06, 12 or 18 UTC)
    analysis_time: String,

    /// Number of pressure levels, 13 or 37 [default: 13]
    #[arg(short, long)]
    levels: Option<PressureLevels>,

    /// Decoding method: wgrib2 or pygrib [default: wgrib2]
    #[arg(short, long)]
    method: Option<BackendKind>,

    /// Download source: s3 or nomads
    #[arg(short, long, default_value = "s3")]
    source: DownloadSource,

    /// Directory receiving the .npy tensors [default: .]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for downloaded GRIB2 data
    #[arg(short, long, env = "GDAS_PREP_DOWNLOAD_DIR", default_value = ".")]
    download: PathBuf,

    /// Keep the downloaded data (yes/no)
    #[arg(short, long, default_value = "no", value_parser = parse_yes_no, action = clap::ArgAction::Set)]
    keep: bool,

    /// Use a local GRIB2 file instead of downloading
    #[arg(long)]
    input: Option<PathBuf>,

    /// wgrib2 executable
    #[arg(long)]
    wgrib2: Option<PathBuf>,

    /// Parent directory for scratch files
    #[arg(long)]
    scratch_dir: Option<PathBuf>,

    /// Maximum download retry attempts
    #[arg(long, default_value = "5")]
    max_retries: u32,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn parse_yes_no(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "yes" | "y" | "true" => Ok(true),
        "no" | "n" | "false" => Ok(false),
        other => Err(format!("expected yes or no, got '{}'", other)),
    }
}

/// Defaults, then `GDAS_PREP_*` environment variables, then flags.
fn build_config(args: &Args) -> Result<PrepConfig> {
    let mut config = PrepConfig::from_env();
    config.analysis_time = Some(parse_analysis_time(&args.analysis_time)?);

    if let Some(levels) = args.levels {
        config.pressure_levels = levels;
    }
    if let Some(method) = args.method {
        config.backend = method;
    }
    if let Some(output) = &args.output {
        config.output_dir = output.clone();
    }
    if let Some(wgrib2) = &args.wgrib2 {
        config.wgrib2_path = wgrib2.clone();
    }
    if let Some(scratch) = &args.scratch_dir {
        config.scratch_dir = Some(scratch.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Download `request`, removing partial data on failure unless `keep` is set.
async fn acquire(
    manager: &DownloadManager,
    request: &DownloadRequest,
    download_dir: &Path,
    keep: bool,
) -> Result<PathBuf> {
    match manager.download(request, download_dir).await {
        Ok(path) => Ok(path),
        Err(e) => {
            cleanup::cleanup(download_dir, keep).await;
            Err(e.context("Failed to download GDAS analysis"))
        }
    }
}

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = fmt().with_env_filter(filter).with_target(true);
    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args);

    let config = build_config(&args)?;
    let Some(analysis_time) = config.analysis_time else {
        anyhow::bail!("analysis time is required");
    };

    info!(
        time = %analysis_time.format("%Y%m%d%H"),
        levels = config.pressure_levels.count(),
        backend = %config.backend,
        output_dir = %config.output_dir.display(),
        "Starting GDAS preparation"
    );

    let (input, downloaded) = match &args.input {
        Some(path) => (path.clone(), false),
        None => {
            let manager = DownloadManager::new(DownloadConfig {
                max_retries: args.max_retries,
                ..DownloadConfig::default()
            })?;
            let request = DownloadRequest {
                analysis_time,
                source: args.source,
                levels: config.pressure_levels,
            };
            (acquire(&manager, &request, &args.download, args.keep).await?, true)
        }
    };

    let result = tokio::task::spawn_blocking(move || {
        let pipeline = Pipeline::new(config)?;
        pipeline.run(&input)
    })
    .await
    .context("Preparation task panicked")?;

    // Local --input files are never removed.
    if downloaded {
        cleanup::cleanup(&args.download, args.keep).await;
    }

    match result {
        Ok(summary) => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Err(e) => {
            warn!(component = %e.component(), error = %e, "Preparation failed");
            Err(e.into())
        }
    }
}
