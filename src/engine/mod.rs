// src/engine/mod.rs

//! Orchestration engine for assetpipe.
//!
//! This module ties together:
//! - the DAG scheduler
//! - named sequences, executed step by step
//! - the trigger queue (what happens when file changes arrive while a run is
//!   active)
//! - the main runtime event loop that reacts to:
//!   - sequence requests (initial build)
//!   - file-watch triggers
//!   - task completion events
//!   - shutdown signals
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::dag::Sequence;

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

/// Outcome of a stage invocation, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    /// The stage finished but logged recoverable diagnostics.
    Recovered { diagnostics: usize },
    Failed(String),
}

/// Why a sequence (or task batch) was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    /// Requested from the command line (initial or one-shot run).
    Manual,
    /// Triggered due to a filesystem event.
    FileWatch,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeOptions {
    /// If true, exit the runtime once every requested sequence finished and
    /// no triggers are queued (one-shot `build` / `default`).
    pub exit_when_idle: bool,
}

/// Lifecycle of the watch controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatchPhase {
    #[default]
    Idle,
    RunningInitial,
    Watching,
    RunningIncremental,
}

/// Events flowing into the runtime from the CLI, watcher and executor.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Run a named sequence from start to end.
    SequenceRequested {
        sequence: Sequence,
        reason: TriggerReason,
    },
    /// A file change mapped to this ordered set of tasks.
    TasksTriggered {
        tasks: Vec<TaskName>,
        reason: TriggerReason,
    },
    /// A stage invocation finished with a concrete outcome.
    TaskCompleted {
        task: TaskName,
        outcome: TaskOutcome,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}

/// Sent to connected browsers after an incremental run completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSignal {
    pub generation: u64,
}

/// What happened during one sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub name: String,
    pub reason: TriggerReason,
    /// Tasks in completion order, including failed ones.
    pub executed: Vec<TaskName>,
    /// Best-effort tasks that failed without aborting the sequence.
    pub tolerated_failures: Vec<TaskName>,
    /// The fatal failure that aborted the sequence, if any.
    pub failed_task: Option<TaskName>,
}

impl SequenceReport {
    pub fn is_success(&self) -> bool {
        self.failed_task.is_none()
    }

    pub fn ran(&self, task: &str) -> bool {
        self.executed.iter().any(|t| t == task)
    }
}

/// Everything a runtime produced before it stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<SequenceReport>,
    pub reloads: u64,
}

impl RunSummary {
    /// First sequence aborted by a fatal failure.
    pub fn first_failure(&self) -> Option<&SequenceReport> {
        self.reports.iter().find(|r| !r.is_success())
    }

    pub fn is_success(&self) -> bool {
        self.first_failure().is_none()
    }
}

pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use queue::TriggerQueue;
pub use crate::types::TriggerWhileRunningBehaviour;
pub use runtime::Runtime;
