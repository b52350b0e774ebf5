// src/dag/task_info.rs

//! Task metadata and per-run state.

use std::fmt;
use std::sync::Arc;

use crate::dag::graph::{FailurePolicy, TaskGraph};
use crate::engine::TaskName;
use crate::stages::Stage;

/// Per-run state of a task (internal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Task was requested for this run but is waiting on prerequisites.
    Pending,
    /// Task has been dispatched to the executor and is currently running.
    Running,
    /// Task completed successfully (possibly with recoverable diagnostics).
    DoneSuccess,
    /// Task failed in this run (or was blocked by a failed prerequisite).
    DoneFailed,
}

/// Public, read-only view of a task's per-run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunState {
    /// The task is not participating in the current run.
    NotInRun,
    Pending,
    Running,
    DoneSuccess,
    DoneFailed,
}

impl From<Option<RunState>> for TaskRunState {
    fn from(state: Option<RunState>) -> Self {
        match state {
            None => TaskRunState::NotInRun,
            Some(RunState::Pending) => TaskRunState::Pending,
            Some(RunState::Running) => TaskRunState::Running,
            Some(RunState::DoneSuccess) => TaskRunState::DoneSuccess,
            Some(RunState::DoneFailed) => TaskRunState::DoneFailed,
        }
    }
}

/// Static task information from the graph, plus per-run state.
#[derive(Clone)]
pub struct TaskInfo {
    pub name: TaskName,
    pub action: Arc<dyn Stage>,
    pub policy: FailurePolicy,
    /// Direct prerequisites for this task.
    pub deps: Vec<TaskName>,

    /// Per-run state (None if not participating in the current run).
    pub run_state: Option<RunState>,

    /// Last run ID in which this task succeeded.
    pub last_successful_run: Option<u64>,

    /// Last run ID in which this task failed.
    pub last_failed_run: Option<u64>,
}

impl fmt::Debug for TaskInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskInfo")
            .field("name", &self.name)
            .field("policy", &self.policy)
            .field("run_state", &self.run_state)
            .finish_non_exhaustive()
    }
}

impl TaskInfo {
    pub fn from_graph(graph: &TaskGraph, name: &str) -> Option<Self> {
        Some(Self {
            name: name.to_string(),
            action: graph.action_of(name)?,
            policy: graph.policy_of(name)?,
            deps: graph.dependencies_of(name).to_vec(),
            run_state: None,
            last_successful_run: None,
            last_failed_run: None,
        })
    }

    pub fn is_best_effort(&self) -> bool {
        self.policy == FailurePolicy::BestEffort
    }

    /// Whether this task, as a prerequisite, lets dependents proceed based
    /// on earlier runs alone.
    pub fn satisfied_by_history(&self) -> bool {
        self.last_successful_run.is_some()
            || (self.is_best_effort() && self.last_failed_run.is_some())
    }
}

/// Description of a task that the scheduler wants the executor to run now.
#[derive(Clone)]
pub struct ScheduledTask {
    pub name: TaskName,
    pub action: Arc<dyn Stage>,
    pub policy: FailurePolicy,
    /// Monotonically increasing run identifier.
    ///
    /// All tasks that belong to the same run share the same `run_id`.
    pub run_id: u64,
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl ScheduledTask {
    pub fn from_task_info(info: &TaskInfo, run_id: u64) -> Self {
        Self {
            name: info.name.clone(),
            action: Arc::clone(&info.action),
            policy: info.policy,
            run_id,
        }
    }
}
