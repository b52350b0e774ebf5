// src/dag/state_manager.rs

//! Per-run state management for tasks in the scheduler.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo};
use crate::dag::TaskGraph;
use crate::engine::TaskName;

/// Manages per-run state transitions for tasks.
pub struct StateManager<'a> {
    graph: &'a TaskGraph,
    tasks: &'a mut HashMap<TaskName, TaskInfo>,
    current_run_id: Option<u64>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        tasks: &'a mut HashMap<TaskName, TaskInfo>,
        current_run_id: Option<u64>,
    ) -> Self {
        Self {
            graph,
            tasks,
            current_run_id,
        }
    }

    /// Include a requested task, plus every prerequisite that is not already
    /// satisfied, in this run.
    ///
    /// - The requested task is always marked `Pending` (unless it already
    ///   participates in this run, in which case it keeps its state).
    /// - A prerequisite outside this run is pulled in only if it has never
    ///   succeeded; otherwise its earlier result satisfies the dependency.
    pub fn mark_task_and_prerequisites_pending(&mut self, root: &str) {
        let mut stack: Vec<TaskName> = vec![root.to_string()];
        let mut visited: HashSet<TaskName> = HashSet::new();

        while let Some(name) = stack.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }

            let Some(info) = self.tasks.get_mut(&name) else {
                warn!(task = %name, "node in graph not present in tasks map");
                continue;
            };

            if info.run_state.is_none() {
                info.run_state = Some(RunState::Pending);
                debug!(task = %info.name, "marked Pending for this run");
            }

            for dep_name in self.graph.dependencies_of(&name).iter() {
                let Some(dep) = self.tasks.get(dep_name) else {
                    continue;
                };
                if dep.run_state.is_none() && !dep.satisfied_by_history() {
                    debug!(
                        task = %name,
                        prerequisite = %dep_name,
                        "pulling unsatisfied prerequisite into this run"
                    );
                    stack.push(dep_name.clone());
                }
            }
        }
    }

    /// Determine whether all prerequisites of the given task are satisfied for
    /// the *current run*.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        let ro = ReadOnlyStateManager::new(self.tasks);
        ro.deps_satisfied_for_info(info)
    }

    /// Mark all participating dependents (transitively) of a failed task as
    /// `DoneFailed` for this run.
    ///
    /// Returns the list of tasks that were newly marked as failed (excluding
    /// the root task; the caller should add that separately if desired).
    pub fn mark_dependents_failed(&mut self, failed_task: &str) -> Vec<TaskName> {
        let mut stack: Vec<TaskName> = self.graph.dependents_of(failed_task).to_vec();

        let mut newly_failed = Vec::new();

        while let Some(name) = stack.pop() {
            if let Some(info) = self.tasks.get_mut(&name) {
                match info.run_state {
                    Some(RunState::Pending) => {
                        info.run_state = Some(RunState::DoneFailed);
                        debug!(
                            task = %info.name,
                            "marking dependent as DoneFailed due to upstream failure"
                        );
                        newly_failed.push(info.name.clone());
                        stack.extend(self.graph.dependents_of(&name).iter().cloned());
                    }
                    Some(RunState::Running)
                    | Some(RunState::DoneSuccess)
                    | Some(RunState::DoneFailed)
                    | None => {
                        // Either already past the point of blocking, or not
                        // participating in this run.
                    }
                }
            }
        }

        newly_failed
    }

    /// Fail every `Pending` task that is blocked by a prerequisite which
    /// already failed fatally in this run.
    ///
    /// This covers tasks requested *after* their prerequisite failed, which
    /// `mark_dependents_failed` cannot see.
    pub fn fail_blocked_tasks(&mut self) -> Vec<TaskName> {
        let blocked: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| matches!(info.run_state, Some(RunState::Pending)))
            .filter(|info| {
                info.deps.iter().any(|dep| {
                    self.tasks.get(dep).is_some_and(|d| {
                        d.run_state == Some(RunState::DoneFailed) && !d.is_best_effort()
                    })
                })
            })
            .map(|info| info.name.clone())
            .collect();

        let mut newly_failed = Vec::new();
        for name in blocked {
            if let Some(info) = self.tasks.get_mut(&name) {
                if info.run_state == Some(RunState::Pending) {
                    info.run_state = Some(RunState::DoneFailed);
                    newly_failed.push(name.clone());
                }
            }
            newly_failed.extend(self.mark_dependents_failed(&name));
        }
        newly_failed
    }

    /// Collect tasks that are `Pending` and whose prerequisites are
    /// satisfied, mark them as `Running`, and return them as `ScheduledTask`s.
    ///
    /// Candidates are returned in name order so dispatch is reproducible.
    pub fn collect_new_ready_tasks(&mut self) -> Vec<ScheduledTask> {
        let mut ready = Vec::new();

        // Decide first, then mutate to avoid borrowing issues.
        let mut candidates: Vec<TaskName> = self
            .tasks
            .values()
            .filter_map(|info| {
                if matches!(info.run_state, Some(RunState::Pending))
                    && self.deps_satisfied_for_info(info)
                {
                    Some(info.name.clone())
                } else {
                    None
                }
            })
            .collect();
        candidates.sort();

        for name in candidates {
            if let Some(info) = self.tasks.get_mut(&name) {
                let is_rerun = info.last_successful_run.is_some() || info.last_failed_run.is_some();

                if is_rerun {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for re-run"
                    );
                } else {
                    info!(
                        task = %info.name,
                        run_id = self.current_run_id,
                        "scheduling task for first run"
                    );
                }

                info.run_state = Some(RunState::Running);
                ready.push(ScheduledTask::from_task_info(
                    info,
                    self.current_run_id.unwrap_or(0),
                ));
            }
        }

        ready
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        !self.tasks.values().any(|info| {
            matches!(
                info.run_state,
                Some(RunState::Pending) | Some(RunState::Running)
            )
        })
    }
}

/// A read-only view of the state manager for checking dependency satisfaction.
pub struct ReadOnlyStateManager<'a> {
    tasks: &'a HashMap<TaskName, TaskInfo>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(tasks: &'a HashMap<TaskName, TaskInfo>) -> Self {
        Self { tasks }
    }

    /// Determine whether all prerequisites of the given task are satisfied
    /// for the *current run*.
    pub fn deps_satisfied_for_info(&self, info: &TaskInfo) -> bool {
        for dep_name in &info.deps {
            let dep = match self.tasks.get(dep_name) {
                Some(d) => d,
                None => {
                    warn!(
                        task = %info.name,
                        dep = %dep_name,
                        "prerequisite missing from tasks map"
                    );
                    return false;
                }
            };

            match dep.run_state {
                Some(RunState::DoneSuccess) => {}
                Some(RunState::DoneFailed) => {
                    if !dep.is_best_effort() {
                        return false;
                    }
                }
                Some(RunState::Pending) | Some(RunState::Running) => {
                    return false;
                }
                None => {
                    // Not part of this run; rely on history.
                    if !dep.satisfied_by_history() {
                        return false;
                    }
                }
            }
        }

        true
    }
}
