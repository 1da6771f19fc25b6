use crate::config::EngineConfig;
use crate::error::{validation, StreamGrabError};
use crate::events::{DownloadEvent, EntrySelector};
use crate::executor::DownloadExecutor;
use crate::extractor::{validate_channel_url, validate_playlist_url, MetadataExtractor};
use crate::invoker::ToolInvoker;
use crate::progress;
use crate::queue::TaskQueue;
use crate::types::*;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// A single video went straight into the queue.
    Queued { task_ids: Vec<Uuid> },
    /// Extraction runs in the background; results arrive as events.
    Extracting,
}

#[derive(Default)]
struct QueueState {
    queue: TaskQueue,
    running: Option<(Uuid, CancellationToken)>,
}

struct Inner {
    extractor: MetadataExtractor,
    executor: DownloadExecutor,
    selector: Arc<dyn EntrySelector>,
    state: Mutex<QueueState>,
    tasks: DashMap<Uuid, TaskProgress>,
    events: mpsc::UnboundedSender<DownloadEvent>,
    extractions: DashMap<Uuid, CancellationToken>,
    idle: Notify,
}

/// Routes submissions, owns the queue and drives it one task at a time.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<Inner>,
}

/// Frees the single-flight slot and re-pumps exactly once. A worker that
/// unwinds before reporting leaves its task marked `Failed`.
struct ActiveSlot {
    manager: DownloadManager,
    task: Task,
}

impl Drop for ActiveSlot {
    fn drop(&mut self) {
        let task_id = self.task.id();
        let unfinished = self
            .manager
            .get_task(&task_id)
            .is_some_and(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::Downloading));
        if unfinished {
            let error = StreamGrabError::Interrupted {
                url: self.task.url().to_string(),
            };
            error!(task_id = %task_id, url = self.task.url(), "Download worker stopped without reporting");
            self.manager.update_task(&task_id, |p| {
                p.status = TaskStatus::Failed;
                p.error = Some(error.to_string());
                p.finished_at = Some(Utc::now());
            });
            self.manager.emit(DownloadEvent::TaskFailed {
                task: self.task.clone(),
                error,
            });
        }
        self.manager.finish_active();
    }
}

struct ExtractionGuard {
    manager: DownloadManager,
    id: Uuid,
}

impl Drop for ExtractionGuard {
    fn drop(&mut self) {
        self.manager.inner.extractions.remove(&self.id);
        self.manager.notify_if_idle();
    }
}

impl DownloadManager {
    pub fn new(
        config: EngineConfig,
        selector: Arc<dyn EntrySelector>,
    ) -> (Self, mpsc::UnboundedReceiver<DownloadEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let invoker = Arc::new(ToolInvoker::new(&config));
        let manager = Self {
            inner: Arc::new(Inner {
                extractor: MetadataExtractor::new(Arc::clone(&invoker), config.site_root.clone()),
                executor: DownloadExecutor::new(invoker),
                selector,
                state: Mutex::new(QueueState::default()),
                tasks: DashMap::new(),
                events,
                extractions: DashMap::new(),
                idle: Notify::new(),
            }),
        };
        (manager, receiver)
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: DownloadEvent) {
        if self.inner.events.send(event).is_err() {
            tracing::debug!("Event receiver dropped");
        }
    }

    pub fn get_task(&self, task_id: &Uuid) -> Option<TaskProgress> {
        self.inner.tasks.get(task_id).map(|t| t.clone())
    }

    pub fn get_all_tasks(&self) -> Vec<TaskProgress> {
        let mut tasks: Vec<_> = self.inner.tasks.iter().map(|entry| entry.value().clone()).collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    pub fn update_task(&self, task_id: &Uuid, update: impl FnOnce(&mut TaskProgress)) {
        if let Some(mut task) = self.inner.tasks.get_mut(task_id) {
            update(&mut task);
        }
    }

    /// Forgets a finished task's status record. Queued or running tasks are kept.
    pub fn remove_task(&self, task_id: &Uuid) -> bool {
        self.inner
            .tasks
            .remove_if(task_id, |_, task| {
                !matches!(task.status, TaskStatus::Queued | TaskStatus::Downloading)
            })
            .is_some()
    }

    pub fn queue_depth(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_busy(&self) -> bool {
        self.state().queue.is_active()
    }

    pub fn pending_tasks(&self) -> Vec<Task> {
        self.state().queue.pending().cloned().collect()
    }

    fn is_idle(&self) -> bool {
        let state = self.state();
        self.inner.extractions.is_empty()
            && state.queue.is_empty()
            && !state.queue.is_active()
    }

    fn notify_if_idle(&self) {
        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
    }

    /// Resolves once no extraction is outstanding and the queue has drained.
    pub async fn wait_until_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Validates and routes one request. Shape and settings problems are
    /// returned here and leave no trace; extraction failures arrive later as
    /// [`DownloadEvent::SubmissionFailed`].
    pub async fn submit(&self, mut request: DownloadRequest) -> Result<SubmissionOutcome, StreamGrabError> {
        request.url = request.url.trim().to_string();
        if request.url.is_empty() {
            return Err(StreamGrabError::invalid_url("", "please enter a URL"));
        }

        let kind = request.mode.submission_kind();
        match kind {
            SubmissionKind::Playlist => validate_playlist_url(&request.url)?,
            SubmissionKind::Channel => validate_channel_url(&request.url)?,
            SubmissionKind::Single => {}
        }
        if request.mode.is_audio_only() && request.quality.audio.trim().is_empty() {
            return Err(StreamGrabError::InvalidSettings(
                "Audio quality is required for MP3 modes".into(),
            ));
        }
        validation::validate_write_permissions(&request.save_path).await?;

        info!(url = %request.url, mode = %request.mode, kind = ?kind, "Submission accepted");

        if kind == SubmissionKind::Single {
            let task = Task::new(
                request.url.as_str(),
                request.save_path.as_path(),
                request.mode,
                &request.quality,
            )?;
            let task_ids = self.enqueue_all(vec![task]);
            return Ok(SubmissionOutcome::Queued { task_ids });
        }

        let cancel = CancellationToken::new();
        let guard = ExtractionGuard {
            manager: self.clone(),
            id: Uuid::new_v4(),
        };
        self.inner.extractions.insert(guard.id, cancel.clone());
        tokio::spawn(async move {
            guard.manager.run_extraction(request, cancel).await;
            drop(guard);
        });
        Ok(SubmissionOutcome::Extracting)
    }

    async fn run_extraction(&self, request: DownloadRequest, cancel: CancellationToken) {
        let extraction = async {
            match request.mode.content_kind() {
                Some(kind) => self.inner.extractor.extract_channel(&request.url, kind).await,
                None => self.inner.extractor.extract_playlist(&request.url).await,
            }
        };
        // Dropping the extraction future kills the metadata child.
        let result = tokio::select! {
            result = extraction => result,
            _ = cancel.cancelled() => Err(StreamGrabError::Cancelled { url: request.url.clone() }),
        };

        let entries = match result {
            Ok(entries) => entries,
            Err(e) => {
                if matches!(e, StreamGrabError::Cancelled { .. }) {
                    info!(url = %request.url, "Extraction cancelled");
                } else {
                    error!(url = %request.url, error = %e, "Extraction failed");
                }
                self.emit(DownloadEvent::SubmissionFailed {
                    url: request.url.clone(),
                    error: e,
                });
                return;
            }
        };

        self.emit(DownloadEvent::EntriesFound {
            url: request.url.clone(),
            count: entries.len(),
        });

        let selected = self.inner.selector.select(&request, entries).await;
        if cancel.is_cancelled() {
            info!(url = %request.url, "Extraction cancelled before queueing");
            self.emit(DownloadEvent::SubmissionFailed {
                url: request.url.clone(),
                error: StreamGrabError::Cancelled { url: request.url },
            });
            return;
        }
        if selected.is_empty() {
            info!(url = %request.url, "No entries selected for download");
            return;
        }

        let mut tasks = Vec::with_capacity(selected.len());
        for entry in selected {
            match Task::new(entry.url.as_str(), request.save_path.as_path(), request.mode, &request.quality) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    warn!(url = %entry.url, title = %entry.display_title, error = %e, "Skipping entry");
                    self.emit(DownloadEvent::SubmissionFailed { url: entry.url, error: e });
                }
            }
        }

        let added = self.enqueue_all(tasks);
        info!(url = %request.url, task_count = added.len(), "Added entries to download queue");
    }

    /// Queues every task before pumping, so a selection starts in order.
    fn enqueue_all(&self, tasks: Vec<Task>) -> Vec<Uuid> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let mut task_ids = Vec::with_capacity(tasks.len());
        let pending = {
            let mut state = self.state();
            for task in tasks {
                task_ids.push(task.id());
                self.inner.tasks.insert(task.id(), TaskProgress::queued(&task));
                state.queue.enqueue(task);
            }
            state.queue.len()
        };
        self.emit(DownloadEvent::QueueDepthChanged { pending });

        self.pump();
        task_ids
    }

    /// Starts the head task if the slot is free. Returns the started task's id.
    pub fn pump(&self) -> Option<Uuid> {
        let cancel = CancellationToken::new();
        let (task, pending) = {
            let mut state = self.state();
            let task = state.queue.pump()?;
            state.running = Some((task.id(), cancel.clone()));
            (task, state.queue.len())
        };
        self.emit(DownloadEvent::QueueDepthChanged { pending });

        let task_id = task.id();
        let slot = ActiveSlot {
            manager: self.clone(),
            task: task.clone(),
        };
        tokio::spawn(async move {
            slot.manager.run_task(task, cancel).await;
            drop(slot);
        });
        Some(task_id)
    }

    fn finish_active(&self) {
        {
            let mut state = self.state();
            state.queue.on_task_finished();
            state.running = None;
        }
        self.pump();
        self.notify_if_idle();
    }

    async fn run_task(&self, task: Task, cancel: CancellationToken) {
        let task_id = task.id();
        self.update_task(&task_id, |p| p.status = TaskStatus::Downloading);
        self.emit(DownloadEvent::TaskStarted { task: task.clone() });

        let result = self
            .inner
            .executor
            .run(
                &task,
                |percent| {
                    self.update_task(&task_id, |p| p.progress = percent);
                    self.emit(DownloadEvent::Progress { task_id, percent });
                },
                |line: &str| {
                    if let Some(info) = progress::parse_details(line) {
                        self.update_task(&task_id, |p| {
                            p.speed = info.speed;
                            p.eta = info.eta;
                        });
                    }
                    if let Some(path) = progress::parse_destination(line) {
                        self.update_task(&task_id, |p| {
                            p.name = path.clone();
                            p.file_path = Some(path);
                        });
                    }
                    self.emit(DownloadEvent::Log {
                        task_id,
                        line: line.to_string(),
                    });
                },
                &cancel,
            )
            .await;

        match result {
            Ok(()) => {
                self.update_task(&task_id, |p| {
                    p.status = TaskStatus::Completed;
                    p.progress = 100;
                    p.eta = None;
                    p.finished_at = Some(Utc::now());
                });
                self.emit(DownloadEvent::TaskSucceeded { task });
            }
            Err(e) => {
                error!(task_id = %task_id, url = task.url(), error = %e, "Download failed");
                let status = match e {
                    StreamGrabError::Cancelled { .. } => TaskStatus::Cancelled,
                    _ => TaskStatus::Failed,
                };
                self.update_task(&task_id, |p| {
                    p.status = status;
                    p.error = Some(e.to_string());
                    p.finished_at = Some(Utc::now());
                });
                self.emit(DownloadEvent::TaskFailed { task, error: e });
            }
        }
    }

    /// Asks the running download to stop. The child is killed and reaped
    /// before the slot frees, so this is not instantaneous.
    pub fn cancel_active(&self) -> Option<Uuid> {
        let state = self.state();
        let (task_id, token) = state.running.as_ref()?;
        info!(task_id = %task_id, "Cancelling active download");
        token.cancel();
        Some(*task_id)
    }

    /// Stops every playlist or channel extraction still in flight. Their
    /// entries are never queued; each reports a `Cancelled` submission failure.
    pub fn cancel_extractions(&self) -> usize {
        let mut cancelled = 0;
        for extraction in self.inner.extractions.iter() {
            if !extraction.value().is_cancelled() {
                extraction.value().cancel();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            info!(count = cancelled, "Cancelling metadata extractions");
        }
        cancelled
    }

    /// Drops every queued task; the running one is unaffected.
    pub fn clear_pending(&self) -> usize {
        let dropped = self.state().queue.drain_pending();
        for task in &dropped {
            self.update_task(&task.id(), |p| {
                p.status = TaskStatus::Cancelled;
                p.error = Some("Removed from queue".to_string());
                p.finished_at = Some(Utc::now());
            });
        }
        if !dropped.is_empty() {
            info!(count = dropped.len(), "Cleared pending downloads");
            self.emit(DownloadEvent::QueueDepthChanged { pending: 0 });
        }
        self.notify_if_idle();
        dropped.len()
    }
}
