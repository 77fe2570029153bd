//! `vpub`: turn each CSV row into a slideshow video and upload it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vpub_media::SlideshowAssembler;
use vpub_models::BatchReport;
use vpub_upload::{build_http_client, establish_credentials, TokioSleeper, YouTubeTransport};
use vpub_worker::{BatchConfig, BatchDispatcher, CsvJobSource, JobDefaults, JobSource};

#[derive(Parser, Debug)]
#[command(
    name = "vpub",
    version,
    about = "Parse csv to create videos from images and upload to YouTube"
)]
struct Cli {
    /// CSV file with one video per row
    #[arg(short = 'f', long)]
    filename: PathBuf,

    /// Maximum videos per hour (1-30)
    #[arg(
        short = 't',
        long,
        default_value_t = 30,
        value_parser = clap::value_parser!(u32).range(1..=30)
    )]
    throttle: u32,

    /// Write the batch report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,

    /// Parent directory for per-job scratch space
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vpub=info,vpub_worker=info,vpub_upload=info,vpub_media=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<BatchReport> {
    let mut config = BatchConfig::from_env()
        .context("invalid configuration")?
        .with_throttle(cli.throttle)
        .context("invalid throttle")?;
    if let Some(work_dir) = cli.work_dir {
        config = config.with_work_dir(work_dir);
    }

    let jobs = CsvJobSource::from_path(&cli.filename, JobDefaults::from(&config))
        .load_jobs()
        .with_context(|| format!("failed to read jobs from {}", cli.filename.display()))?;

    let http = build_http_client(&config.upload).context("failed to build HTTP client")?;
    let credentials = establish_credentials(http.clone(), &config.credentials)
        .await
        .context("failed to obtain credentials")?;
    let transport = YouTubeTransport::with_client(http, config.upload.base_url.clone(), credentials);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, finishing current job");
            let _ = cancel_tx.send(true);
        }
    });

    let assembler = SlideshowAssembler::new(config.assembler.clone())
        .context("failed to create media assembler")?
        .with_cancel(cancel_rx.clone());

    let dispatcher = BatchDispatcher::new(
        config,
        Arc::new(assembler),
        Arc::new(transport),
        Arc::new(TokioSleeper),
    )?
    .with_cancel(cancel_rx);

    let report = dispatcher.run(jobs).await?;

    if let Some(path) = cli.report {
        let json = serde_json::to_vec_pretty(&report)?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Wrote batch report");
    }

    Ok(report)
}

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS/HTTPS)
    let _ = rustls::crypto::ring::default_provider().install_default();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing();

    info!("Starting vpub");

    match run(cli).await {
        Ok(report) => {
            info!(
                uploaded = report.uploaded(),
                failed = report.failed(),
                "Done"
            );
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_throttle_defaults_to_30() {
        let cli = Cli::try_parse_from(["vpub", "-f", "videos.csv"]).unwrap();
        assert_eq!(cli.throttle, 30);
        assert_eq!(cli.filename, PathBuf::from("videos.csv"));
    }

    #[test]
    fn test_throttle_out_of_range_is_usage_error() {
        for value in ["0", "31", "ten"] {
            let err = Cli::try_parse_from(["vpub", "--filename", "v.csv", "--throttle", value])
                .unwrap_err();
            assert_eq!(err.exit_code(), 2);
        }
    }

    #[test]
    fn test_filename_required() {
        assert!(Cli::try_parse_from(["vpub"]).is_err());
    }
}
