use anyhow::{Context, Result, bail};
use clap::Parser;
use peertube_api::{Client, ClientConfig, CredentialStore, LoginCredentials};
use peertube_uploader::config::{self, AppConfig, ConfigLoad, SourceKind};
use peertube_uploader::logging::{self, LogConfig};
use peertube_uploader::media::{FfmpegTranscoder, FfprobeProber, MediaProber, Transcoder};
use peertube_uploader::sink;
use peertube_uploader::source::{DatabaseSource, ExtensionFilter, FolderSource, MediaSource};
use peertube_uploader::tasks::{MediaOptions, UploadProcessor, WorkerPool};
use peertube_uploader::uploader::{Uploader, UploaderConfig, VideoDefaults};
use std::path::PathBuf;
use std::sync::Arc;

/// Upload a folder or database of media files to a PeerTube instance
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file; a sample is written when it does not exist
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match config::load_or_init(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?
    {
        ConfigLoad::Loaded(config) => config,
        ConfigLoad::SampleWritten(path) => {
            println!(
                "Wrote a sample configuration to {}; edit it and run again",
                path.display()
            );
            return Ok(());
        }
    };

    // Keep the guard alive for the entire run so file logs are flushed
    let _log_guard = logging::init_logging(LogConfig::from(&config.logging))
        .context("Failed to initialize logging system")?;

    tracing::info!(
        target: "main",
        config = %cli.config.display(),
        base_url = %config.api.base_url(),
        threads = config.process.threads,
        "Starting upload run"
    );

    run(config).await
}

async fn run(config: AppConfig) -> Result<()> {
    let client = Arc::new(
        Client::new(
            ClientConfig::new(config.api.base_url()).with_timeout(config.api.timeout_seconds),
        )
        .context("Failed to create API client")?,
    );
    let credentials = Arc::new(CredentialStore::new(
        client.clone(),
        LoginCredentials {
            username: config.api.username.clone(),
            password: config.api.password.clone(),
        },
    ));

    // Items retry on their own, so a failure here is not fatal
    if let Err(e) = credentials.ensure_valid(chrono::Utc::now()).await {
        tracing::warn!(target: "main", error = %e, "Initial login failed");
    }

    let uploader = Uploader::new(
        client,
        credentials.clone(),
        VideoDefaults::from(&config.api),
        UploaderConfig::from(&config.process),
    );
    let sink = sink::build(&config).await?;
    let processor = Arc::new(UploadProcessor::new(
        credentials,
        uploader,
        sink,
        media_options(&config),
    ));

    let source = build_source(&config)?;
    let summary = WorkerPool::new(config.process.threads)
        .run(source, processor)
        .await;

    match summary {
        Ok(summary) => {
            tracing::info!(
                target: "main",
                processed = summary.processed,
                uploaded = summary.uploaded,
                failed = summary.failed,
                sink_failures = summary.sink_failures,
                "Upload run finished"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(target: "main", error = %e, "Upload run aborted");
            bail!("upload run aborted: {}", e)
        }
    }
}

fn media_options(config: &AppConfig) -> MediaOptions {
    let probe = config.load.probe_media || config.load.convert_audio_to_mp3;
    MediaOptions {
        prober: probe.then(|| Arc::new(FfprobeProber::default()) as Arc<dyn MediaProber>),
        transcoder: config
            .load
            .convert_audio_to_mp3
            .then(|| Arc::new(FfmpegTranscoder::default()) as Arc<dyn Transcoder>),
        temp_folder: config.load.temp_folder(),
    }
}

fn build_source(config: &AppConfig) -> Result<Box<dyn MediaSource>> {
    let filter = ExtensionFilter::new(config.load.specific_extensions, &config.load.extensions);
    match config.load.source {
        SourceKind::Folder => Ok(Box::new(FolderSource::new(
            config.folder.path.clone(),
            filter,
        ))),
        SourceKind::Database => {
            let db = config
                .database
                .clone()
                .context("database section is required for the database source")?;
            Ok(Box::new(DatabaseSource::new(db, filter)))
        }
    }
}
