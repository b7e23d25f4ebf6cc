//! Background task bookkeeping and automatic pause scheduling.
//!
//! Every pending scheduled start, automatic pause and automatic resume is a
//! sleeping tokio task recorded in a [`TaskRegistry`] under
//! `(session id, kind)`. Installing a task aborts whatever was pending for
//! the same slot. A task that wakes up must [`claim`](TaskRegistry::claim)
//! its slot before acting; if the claim fails it was superseded and exits.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::protocol_constants::{MIN_REMAINING_AFTER_PAUSE_MS, PAUSE_INTERVAL_MS};

/// Kind of background work attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Start,
    Pause,
    Resume,
}

struct ScheduledTask {
    generation: u64,
    handle: AbortHandle,
}

/// Pending background tasks keyed by `(session id, kind)`.
///
/// Not synchronized itself; lives inside the orchestrator's session lock.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<(String, TaskKind), ScheduledTask>,
    generation: u64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a generation number for a task about to be installed.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Records a task, aborting any task pending in the same slot.
    pub fn install(&mut self, session_id: &str, kind: TaskKind, generation: u64, handle: AbortHandle) {
        let previous = self.tasks.insert(
            (session_id.to_string(), kind),
            ScheduledTask { generation, handle },
        );
        if let Some(previous) = previous {
            log::debug!(
                "[Orchestrator] Superseding pending {:?} task for session {}",
                kind,
                session_id
            );
            previous.handle.abort();
        }
    }

    /// Removes the slot if it still holds `generation`.
    ///
    /// Returns false when the task was superseded or cancelled.
    pub fn claim(&mut self, session_id: &str, kind: TaskKind, generation: u64) -> bool {
        let key = (session_id.to_string(), kind);
        match self.tasks.get(&key) {
            Some(task) if task.generation == generation => {
                self.tasks.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Aborts the pending task in a slot. Returns whether one existed.
    pub fn cancel(&mut self, session_id: &str, kind: TaskKind) -> bool {
        match self.tasks.remove(&(session_id.to_string(), kind)) {
            Some(task) => {
                task.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, session_id: &str, kind: TaskKind) -> bool {
        self.tasks.contains_key(&(session_id.to_string(), kind))
    }

    /// Aborts every pending task. Returns how many were aborted.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, task) in self.tasks.drain() {
            task.handle.abort();
        }
        count
    }
}

/// Delay until the next automatic pause, or `None` if none should be armed.
///
/// The next pause lands on the next whole hour of unpaused playback. It is
/// armed only if more than the minimum remaining playback follows it, except
/// for the first hour, which always gets one.
pub fn next_pause_delay(duration_ms: u64, elapsed_ms: u64) -> Option<Duration> {
    let k = elapsed_ms / PAUSE_INTERVAL_MS + 1;
    let target = k * PAUSE_INTERVAL_MS;

    let has_room = duration_ms
        .checked_sub(target)
        .is_some_and(|remaining| remaining > MIN_REMAINING_AFTER_PAUSE_MS);
    if k != 1 && !has_room {
        return None;
    }

    Some(Duration::from_millis(target.saturating_sub(elapsed_ms)))
}
