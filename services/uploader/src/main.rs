//! `gallery-upload`: compress photos and upload them into an album.
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. `config/uploader.{toml,yaml,json}` if present
//! 2. The file passed with `--config`
//! 3. Environment variables (prefixed with UPLOADER_, e.g. UPLOADER__SERVER__PASSWORD)
//! 4. Command-line flags

use anyhow::Context;
use clap::Parser;
use gallery_uploader::config::LoggingConfig;
use gallery_uploader::{Compressor, GalleryClient, UploadCoordinator, UploadSummary, UploaderConfig};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "gallery-upload", version, about = "Compress photos and upload them into a gallery album")]
struct Cli {
    /// Destination album id
    #[arg(short, long)]
    album: i32,

    /// JPEG quality (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Uploads in flight at once (1-4)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=4))]
    concurrency: Option<u8>,

    /// Gallery base URL, e.g. http://localhost:3000
    #[arg(short, long)]
    server: Option<String>,

    /// Extra config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Photos to upload, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

impl Cli {
    /// Flags win over file and environment values
    fn apply(&self, config: &mut UploaderConfig) {
        if let Some(quality) = self.quality {
            config.compression.quality = quality;
        }
        if let Some(concurrency) = self.concurrency {
            config.compression.concurrency = usize::from(concurrency);
        }
        if let Some(server) = &self.server {
            config.server.base_url = server.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every file was uploaded
async fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();

    let mut config =
        UploaderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);

    init_logging(&config.logging)?;

    config.validate().context("Invalid configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.base_url,
        album_id = cli.album,
        files = cli.files.len(),
        "Starting upload"
    );

    let client = GalleryClient::new(&config.server).context("Failed to create HTTP client")?;
    client
        .login(&config.server.username, &config.server.password)
        .await
        .context("Failed to open admin session")?;

    let coordinator = UploadCoordinator::new(
        Compressor::new(config.compression.quality),
        Arc::new(client),
        config.compression.concurrency,
    );

    let bar = progress_bar()?;
    let summary = coordinator
        .run(&cli.files, cli.album, |percent| bar.set_position(u64::from(percent)))
        .await?;
    bar.finish_and_clear();

    print_summary(&summary);

    Ok(summary.all_succeeded())
}

/// Initialize logging to stderr so it does not fight the progress bar
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("gallery_uploader={}", level).parse()?)
        .add_directive(format!("gallery_upload={}", level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn progress_bar() -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}")?
            .progress_chars("#>-"),
    );
    bar.set_message("Uploading");
    Ok(bar)
}

fn print_summary(summary: &UploadSummary) {
    if summary.all_succeeded() {
        println!("All {} photos uploaded", summary.total);
        return;
    }

    println!("Uploaded {}/{} photos", summary.succeeded, summary.total);
    for failure in &summary.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
}
