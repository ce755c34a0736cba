//! Cancellable completion timers keyed by worker id.
//!
//! Deadlines live on the dispatcher's virtual clock (time since the dispatcher
//! was created). Timers sharing a deadline fire in the order they were scheduled.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::model::WorkerId;

/// Opaque handle to a scheduled completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    due: Duration,
    seq: u64,
}

impl TimerHandle {
    pub fn due(&self) -> Duration {
        self.due
    }
}

#[derive(Debug, Default)]
pub struct CompletionTimers {
    queue: BTreeMap<TimerHandle, WorkerId>,
    by_worker: HashMap<WorkerId, TimerHandle>,
    next_seq: u64,
}

impl CompletionTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a completion for `worker` at `due`.
    /// A worker has at most one pending completion; an older one is replaced.
    pub fn schedule(&mut self, worker: WorkerId, due: Duration) -> TimerHandle {
        let handle = TimerHandle {
            due,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        if let Some(previous) = self.by_worker.insert(worker, handle) {
            self.queue.remove(&previous);
        }
        self.queue.insert(handle, worker);
        handle
    }

    /// Cancel the pending completion of `worker`, if it has one.
    pub fn cancel(&mut self, worker: WorkerId) -> Option<TimerHandle> {
        let handle = self.by_worker.remove(&worker)?;
        self.queue.remove(&handle);
        Some(handle)
    }

    /// Earliest pending deadline.
    pub fn next_due(&self) -> Option<Duration> {
        self.queue.keys().next().map(TimerHandle::due)
    }

    /// Remove and return the earliest timer whose deadline is at or before `until`.
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, WorkerId)> {
        let (&handle, _) = self
            .queue
            .first_key_value()
            .filter(|(h, _)| h.due <= until)?;
        let worker = self.queue.remove(&handle)?;
        self.by_worker.remove(&worker);
        Some((handle.due, worker))
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
