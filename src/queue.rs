use crate::types::Task;
use std::collections::VecDeque;

/// FIFO of pending tasks plus the single-flight `active` flag.
///
/// The queue does no locking of its own; the owner serializes access.
#[derive(Debug, Default)]
pub struct TaskQueue {
    pending: VecDeque<Task>,
    active: bool,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, task: Task) {
        self.pending.push_back(task);
    }

    /// Hands out the head task and marks the slot busy, or does nothing if a
    /// task is already active or nothing is pending.
    pub fn pump(&mut self) -> Option<Task> {
        if self.active {
            return None;
        }
        let task = self.pending.pop_front()?;
        self.active = true;
        Some(task)
    }

    /// Frees the slot regardless of how the task ended.
    pub fn on_task_finished(&mut self) {
        self.active = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn pending(&self) -> impl Iterator<Item = &Task> {
        self.pending.iter()
    }

    /// Removes every pending task; the active one is unaffected.
    pub fn drain_pending(&mut self) -> Vec<Task> {
        self.pending.drain(..).collect()
    }
}
