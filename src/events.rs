use crate::error::StreamGrabError;
use crate::types::{DownloadRequest, Entry, Task};
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Everything the engine reports back to its front-end.
///
/// Events for one task arrive in output order, and its `TaskSucceeded` or
/// `TaskFailed` comes after all of its `Log`/`Progress` events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Log { task_id: Uuid, line: String },
    Progress { task_id: Uuid, percent: u8 },
    QueueDepthChanged { pending: usize },
    TaskStarted { task: Task },
    TaskSucceeded { task: Task },
    TaskFailed { task: Task, error: StreamGrabError },
    EntriesFound { url: String, count: usize },
    SubmissionFailed { url: String, error: StreamGrabError },
}

/// Chooses which extracted entries become tasks. The returned order is the
/// download order.
#[async_trait]
pub trait EntrySelector: Send + Sync {
    async fn select(&self, request: &DownloadRequest, entries: Vec<Entry>) -> Vec<Entry>;
}

/// Keeps every entry, like a checklist left fully ticked.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

#[async_trait]
impl EntrySelector for AcceptAll {
    async fn select(&self, _request: &DownloadRequest, entries: Vec<Entry>) -> Vec<Entry> {
        entries
    }
}
