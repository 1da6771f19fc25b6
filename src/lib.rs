mod commands;
pub mod config;
pub mod downloader;
pub mod error;
pub mod events;
pub mod executor;
pub mod extractor;
pub mod invoker;
pub mod progress;
pub mod queue;
pub mod system;
pub mod types;

#[cfg(all(test, unix))]
mod testing;

use clap::{Parser, Subcommand};
use config::EngineConfig;
use downloader::DownloadManager;
use events::{AcceptAll, DownloadEvent};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use types::{DownloadMode, DownloadRequest, QualitySettings, TaskStatus, VideoQuality};

#[derive(Debug, Parser)]
#[command(name = "streamgrab", version, about = "Queue video and MP3 downloads from single videos, playlists and channels")]
pub struct Cli {
    /// JSON file with engine settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs to a daily-rotated file in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download a video, or every entry of a playlist or channel
    Download {
        url: String,

        #[arg(short = 'o', long)]
        save_path: PathBuf,

        /// e.g. single-video, mp3-only, playlist-video, channel-shorts-mp3
        #[arg(short, long, default_value = "single-video")]
        mode: DownloadMode,

        /// "Best Available" or a height label such as "1080p"
        #[arg(short, long, default_value = "Best Available")]
        quality: VideoQuality,

        /// MP3 bitrate; defaults to the configured value
        #[arg(long)]
        audio_quality: Option<String>,
    },
    /// Report whether yt-dlp and ffmpeg can be found
    Check,
}

/// Initialize structured logging with tracing
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = if cfg!(debug_assertions) {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("streamgrab=debug,info"))?
    } else {
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("streamgrab=info,warn"))?
    };

    let mut guard = None;
    let file_layer = log_dir.map(|dir| {
        let appender = tracing_appender::rolling::daily(dir, "streamgrab.log");
        let (writer, worker_guard) = tracing_appender::non_blocking(appender);
        guard = Some(worker_guard);
        fmt::layer().with_writer(writer).with_ansi(false).json()
    });

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if cfg!(debug_assertions) {
        // Development: Human-readable format with colors
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .pretty(),
            )
            .try_init()?;
    } else {
        // Production: JSON format for log aggregation
        registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .json(),
            )
            .try_init()?;
    }

    info!("Tracing initialized successfully");
    Ok(guard)
}

pub fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let _log_guard = init_tracing(cli.log_dir.as_deref())?;

    info!(
        app_name = "StreamGrab",
        version = env!("CARGO_PKG_VERSION"),
        debug_mode = cfg!(debug_assertions),
        "Starting StreamGrab"
    );

    let config = EngineConfig::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(execute(cli.command, config))
}

async fn execute(command: Command, config: EngineConfig) -> anyhow::Result<ExitCode> {
    match command {
        Command::Check => {
            let info = commands::check_dependencies(&config);
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(if info.has_ytdlp && info.has_ffmpeg {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Download {
            url,
            save_path,
            mode,
            quality,
            audio_quality,
        } => {
            let request = DownloadRequest {
                url,
                save_path,
                mode,
                quality: QualitySettings {
                    video: quality,
                    audio: audio_quality.unwrap_or_else(|| config.default_audio_quality.clone()),
                },
            };
            let (manager, events) = DownloadManager::new(config, Arc::new(AcceptAll));

            if let Err(e) = commands::start_download(&manager, request).await {
                eprintln!("Error: {}", e);
                return Ok(ExitCode::FAILURE);
            }
            drive(&manager, events).await
        }
    }
}

/// Prints events until the queue drains; Ctrl-C cancels outstanding work.
async fn drive(
    manager: &DownloadManager,
    mut events: tokio::sync::mpsc::UnboundedReceiver<DownloadEvent>,
) -> anyhow::Result<ExitCode> {
    let mut failures = 0usize;
    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                if print_event(&event) {
                    failures += 1;
                }
            }
            _ = manager.wait_until_idle() => break,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                let summary = commands::cancel_download(manager);
                eprintln!(
                    "Cancelling: {} running, {} queued download(s) dropped, {} extraction(s) stopped",
                    usize::from(summary.active.is_some()),
                    summary.dropped,
                    summary.extractions
                );
            }
        }
    }
    while let Ok(event) = events.try_recv() {
        if print_event(&event) {
            failures += 1;
        }
    }

    let tasks = commands::get_download_tasks(manager);
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    println!("{} of {} download(s) completed", completed, tasks.len());

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Returns true for failure events.
fn print_event(event: &DownloadEvent) -> bool {
    match event {
        DownloadEvent::Log { line, .. } => println!("{}", line),
        DownloadEvent::Progress { task_id, percent } => debug!(%task_id, percent, "Progress"),
        DownloadEvent::QueueDepthChanged { pending } => debug!(pending, "Queue depth changed"),
        DownloadEvent::TaskStarted { task } => println!("==> Starting download: {}", task.url()),
        DownloadEvent::TaskSucceeded { task } => println!("==> Finished: {}", task.url()),
        DownloadEvent::EntriesFound { url, count } => println!("Found {} entries at {}", count, url),
        DownloadEvent::TaskFailed { task, error } => {
            eprintln!("Download failed for {}: {}", task.url(), error);
            return true;
        }
        DownloadEvent::SubmissionFailed { url, error } => {
            eprintln!("Could not process {}: {}", url, error);
            return true;
        }
    }
    false
}
