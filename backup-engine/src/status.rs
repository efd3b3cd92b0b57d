//! Live progress record for a backup run.
//!
//! A [`StatusTracker`] is owned by the engine and shared by reference with
//! copy workers and any number of observers. Readers always get an owned
//! [`Status`] snapshot; observers that want pushes can [`subscribe`].
//!
//! [`subscribe`]: StatusTracker::subscribe

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Stage of the run state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    #[default]
    Idle,
    Scanning,
    Copying,
    Archiving,
    Done,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Scanning => "scanning",
            RunPhase::Copying => "copying",
            RunPhase::Archiving => "archiving",
            RunPhase::Done => "done",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of a run's progress
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub total_files: usize,
    pub files_copied: usize,
    pub errors: Vec<String>,
    pub in_progress: bool,
    pub last_error: Option<String>,
    pub phase: RunPhase,
    /// Incremented each time a run begins
    pub generation: u64,
}

/// Concurrency-safe progress record.
///
/// Every mutation goes through the watch channel's `send_modify`, which
/// holds the value's write lock for the duration of the closure, so a
/// snapshot can never observe half an update.
#[derive(Debug)]
pub struct StatusTracker {
    tx: watch::Sender<Status>,
}

impl StatusTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Status::default());
        Self { tx }
    }

    /// Start a new generation: counters and errors are cleared and the
    /// phase moves to `Scanning`.
    pub fn begin(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|status| {
            *status = Status {
                in_progress: true,
                phase: RunPhase::Scanning,
                generation: status.generation + 1,
                ..Status::default()
            };
            generation = status.generation;
        });
        debug!("Status generation {} started", generation);
        generation
    }

    /// Establish the baseline for the copy stage.
    pub fn reset(&self, total: usize) {
        self.tx.send_modify(|status| {
            status.total_files = total;
            status.files_copied = 0;
            status.errors.clear();
            status.last_error = None;
            status.in_progress = true;
        });
    }

    pub fn set_phase(&self, phase: RunPhase) {
        self.tx.send_modify(|status| status.phase = phase);
        debug!("Run phase: {:?}", phase);
    }

    pub fn increment_files_copied(&self) {
        self.tx.send_modify(|status| status.files_copied += 1);
    }

    /// Append a non-terminal error (a single failed file).
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| status.errors.push(message));
    }

    /// Terminate the run as failed.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.tx.send_modify(|status| {
            status.errors.push(message.clone());
            status.last_error = Some(message);
            status.in_progress = false;
            status.phase = RunPhase::Failed;
        });
    }

    /// Terminate the run as successful.
    pub fn set_done(&self) {
        self.tx.send_modify(|status| {
            status.in_progress = false;
            status.phase = RunPhase::Done;
        });
    }

    /// Owned snapshot of the current status.
    pub fn get(&self) -> Status {
        self.tx.borrow().clone()
    }

    /// Receive a notification on every change.
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.tx.subscribe()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
