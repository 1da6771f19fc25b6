use crate::config::EngineConfig;
use crate::downloader::{DownloadManager, SubmissionOutcome};
use crate::system::check_system_dependencies;
use crate::types::*;
use tracing::{error, info, instrument};
use uuid::Uuid;

#[instrument(skip(config))]
pub fn check_dependencies(config: &EngineConfig) -> SystemInfo {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        correlation_id = correlation_id,
        command = "check_dependencies",
        "Checking system dependencies"
    );

    let result = check_system_dependencies(config);
    info!(
        correlation_id = correlation_id,
        has_ytdlp = result.has_ytdlp,
        has_ffmpeg = result.has_ffmpeg,
        ytdlp_path = ?result.ytdlp_path,
        ffmpeg_path = ?result.ffmpeg_path,
        "System dependency check completed"
    );

    result
}

#[instrument(skip(manager))]
pub async fn start_download(
    manager: &DownloadManager,
    request: DownloadRequest,
) -> Result<SubmissionOutcome, String> {
    let correlation_id = Uuid::new_v4().to_string();
    info!(
        correlation_id = correlation_id,
        command = "start_download",
        url = %request.url,
        mode = %request.mode,
        quality = %request.quality.video,
        audio_quality = %request.quality.audio,
        "Starting download request"
    );

    match manager.submit(request).await {
        Ok(outcome) => {
            info!(
                correlation_id = correlation_id,
                outcome = ?outcome,
                "Download request accepted"
            );
            Ok(outcome)
        }
        Err(e) => {
            error!(
                correlation_id = correlation_id,
                error = %e,
                "Failed to start download"
            );
            Err(e.to_string())
        }
    }
}

pub fn get_download_tasks(manager: &DownloadManager) -> Vec<TaskProgress> {
    manager.get_all_tasks()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelSummary {
    pub active: Option<Uuid>,
    pub dropped: usize,
    pub extractions: usize,
}

/// Stops the running download, any extraction still listing entries, and
/// empties the queue behind them.
pub fn cancel_download(manager: &DownloadManager) -> CancelSummary {
    let correlation_id = Uuid::new_v4().to_string();
    let extractions = manager.cancel_extractions();
    let dropped = manager.clear_pending();
    let active = manager.cancel_active();
    info!(
        correlation_id = correlation_id,
        command = "cancel_download",
        active = ?active,
        dropped,
        extractions,
        "Cancellation requested"
    );
    CancelSummary {
        active,
        dropped,
        extractions,
    }
}
