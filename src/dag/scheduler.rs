// src/dag/scheduler.rs

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::state_manager::{ReadOnlyStateManager, StateManager};
use crate::dag::task_info::{RunState, ScheduledTask, TaskInfo, TaskRunState};
use crate::engine::{TaskName, TaskOutcome};

/// Scheduler holds the immutable task graph plus mutable per-run state.
///
/// It is responsible for:
/// - remembering which tasks are part of the current run
/// - pulling unsatisfied prerequisites into a run
/// - deciding when a requested task is "ready" to run (prerequisites done)
/// - marking tasks as succeeded/failed
/// - failing dependents when a task fails fatally
///
/// A "run" here is one step of a sequence: a set of requested tasks that
/// fan out concurrently, subject to prerequisite edges.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<TaskGraph>,
    tasks: HashMap<TaskName, TaskInfo>,
    /// Monotonically increasing run ID.
    run_counter: u64,
    /// Currently active run ID, or `None` if there is no active run.
    current_run_id: Option<u64>,
}

impl Scheduler {
    /// Construct a scheduler from a validated [`TaskGraph`].
    pub fn new(graph: Arc<TaskGraph>) -> Self {
        let tasks = graph
            .tasks()
            .filter_map(|name| TaskInfo::from_graph(&graph, name))
            .map(|info| (info.name.clone(), info))
            .collect();

        Self {
            graph,
            tasks,
            run_counter: 0,
            current_run_id: None,
        }
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    /// Returns `true` if there is currently no active run.
    pub fn is_idle(&self) -> bool {
        self.current_run_id.is_none()
    }

    /// Current run ID, if any.
    pub fn current_run_id(&self) -> Option<u64> {
        self.current_run_id
    }

    /// Read-only view of the given task's run state.
    pub fn run_state_of(&self, task: &str) -> Option<TaskRunState> {
        let info = self.tasks.get(task)?;
        Some(info.run_state.into())
    }

    /// Whether `task` is declared best-effort. `None` if the task is unknown.
    pub fn is_best_effort(&self, task: &str) -> Option<bool> {
        self.tasks.get(task).map(TaskInfo::is_best_effort)
    }

    /// Names of tasks participating in the *active* run, sorted.
    pub fn tasks_in_current_run(&self) -> Vec<TaskName> {
        if self.current_run_id.is_none() {
            return Vec::new();
        }

        let mut names: Vec<TaskName> = self
            .tasks
            .values()
            .filter(|info| info.run_state.is_some())
            .map(|info| info.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Whether the prerequisites of `task` are satisfied for the current run.
    ///
    /// Returns `None` if the task is unknown.
    pub fn deps_satisfied(&self, task: &str) -> Option<bool> {
        let info = self.tasks.get(task)?;
        let mgr = ReadOnlyStateManager::new(&self.tasks);
        Some(mgr.deps_satisfied_for_info(info))
    }

    /// Start a new run, resetting per-run state but keeping historical success
    /// information (for prerequisite satisfaction on later runs).
    pub fn start_new_run(&mut self) {
        self.run_counter += 1;
        self.current_run_id = Some(self.run_counter);

        for info in self.tasks.values_mut() {
            info.run_state = None;
        }

        debug!(run_id = self.run_counter, "scheduler: starting new run");
    }

    /// Request a task in the current run (production API).
    pub fn handle_request(&mut self, task: &str) -> Vec<ScheduledTask> {
        self.request_step_internal(task).newly_scheduled
    }

    /// Handle completion of a task with a concrete outcome (production API).
    pub fn handle_completion(&mut self, task: &str, outcome: TaskOutcome) -> Vec<ScheduledTask> {
        self.completion_step_internal(task, outcome).newly_scheduled
    }

    /// Manual-step variant of `handle_request` that returns a rich [`SchedulerStep`].
    pub fn step_request(&mut self, task: &str) -> SchedulerStep {
        self.request_step_internal(task)
    }

    /// Manual-step variant of `handle_completion` that returns a rich [`SchedulerStep`].
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        self.completion_step_internal(task, outcome)
    }

    /// Task names in definition order.
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.graph.tasks()
    }

    /// Determine whether all tasks are in a terminal state and clear
    /// `current_run_id` if so.
    ///
    /// Returns `true` if this call transitioned the scheduler from running
    /// to idle.
    fn maybe_finish_run(&mut self) -> bool {
        if self.current_run_id.is_none() {
            return false;
        }

        let manager = StateManager::new(&self.graph, &mut self.tasks, self.current_run_id);

        if manager.all_tasks_terminal() {
            info!(
                run_id = self.current_run_id,
                "scheduler: all tasks terminal; marking run as finished"
            );
            self.current_run_id = None;
            true
        } else {
            false
        }
    }

    fn request_step_internal(&mut self, task: &str) -> SchedulerStep {
        if self.current_run_id.is_none() {
            warn!(
                task = %task,
                "request with no active run; implicitly starting a new run"
            );
            self.start_new_run();
        }

        let mut newly_failed = Vec::new();
        let graph = Arc::clone(&self.graph);
        let mut manager = StateManager::new(&graph, &mut self.tasks, self.current_run_id);

        if graph.contains(task) {
            manager.mark_task_and_prerequisites_pending(task);
            newly_failed.extend(manager.fail_blocked_tasks());
        } else {
            warn!(task = %task, "request for unknown task; ignoring");
        }

        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_failed,
            run_just_finished,
        }
    }

    fn completion_step_internal(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        let run_id = match self.current_run_id {
            Some(id) => id,
            None => {
                warn!(
                    task = %task,
                    "completion with no active run; ignoring"
                );
                return SchedulerStep::default();
            }
        };

        let graph = Arc::clone(&self.graph);
        let mut newly_failed = Vec::new();

        match self.tasks.get_mut(task) {
            Some(info) if info.run_state != Some(RunState::Running) => {
                warn!(
                    task = %info.name,
                    run_id,
                    state = ?info.run_state,
                    "completion for task that is not running; ignoring"
                );
            }
            Some(info) => match &outcome {
                TaskOutcome::Success | TaskOutcome::Recovered { .. } => {
                    info.run_state = Some(RunState::DoneSuccess);
                    info.last_successful_run = Some(run_id);
                    debug!(task = %info.name, run_id, ?outcome, "task completed");
                }
                TaskOutcome::Failed(reason) => {
                    info.run_state = Some(RunState::DoneFailed);
                    info.last_failed_run = Some(run_id);

                    if info.is_best_effort() {
                        warn!(
                            task = %info.name,
                            run_id,
                            %reason,
                            "best-effort task failed; continuing"
                        );
                    } else {
                        warn!(
                            task = %info.name,
                            run_id,
                            %reason,
                            "task failed; failing dependents in this run"
                        );
                        newly_failed.push(info.name.clone());
                        let mut manager =
                            StateManager::new(&graph, &mut self.tasks, self.current_run_id);
                        newly_failed.append(&mut manager.mark_dependents_failed(task));
                    }
                }
            },
            None => {
                warn!(task = %task, "completion for unknown task; ignoring");
            }
        }

        let mut manager = StateManager::new(&graph, &mut self.tasks, self.current_run_id);
        let newly_scheduled = manager.collect_new_ready_tasks();
        let run_just_finished = self.maybe_finish_run();

        SchedulerStep {
            newly_scheduled,
            newly_failed,
            run_just_finished,
        }
    }
}
