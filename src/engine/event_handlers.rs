// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::{debug, info, warn};

use crate::dag::{ScheduledTask, Scheduler, Sequence};
use crate::engine::core::{ActiveSequence, SequenceTracker};
use crate::engine::queue::TriggerQueue;
use crate::engine::{
    RuntimeOptions, SequenceReport, TaskName, TaskOutcome, TriggerReason, WatchPhase,
};

/// Name given to sequences assembled from file-change triggers.
pub const WATCH_SEQUENCE: &str = "watch";

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<ScheduledTask>),
    /// Tell connected browsers to reload.
    EmitReload,
    /// A sequence ran to completion or was aborted.
    SequenceFinished(SequenceReport),
    /// Request that the process exits (one-shot runs, once idle).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

/// Handle a request to run a whole sequence.
///
/// Starts immediately when nothing is active; otherwise it runs after the
/// active sequence (and before any queued file-change batches).
pub fn handle_sequence_request(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    tracker: &mut SequenceTracker,
    options: &RuntimeOptions,
    sequence: Sequence,
    reason: TriggerReason,
) -> CoreStep {
    let mut commands = Vec::new();

    if tracker.is_idle() {
        begin_sequence(tracker, sequence, reason);
        commands.extend(advance(scheduler, queue, tracker, options));
    } else {
        debug!(sequence = %sequence.name(), "sequence requested while busy; deferring");
        tracker.pending.push_back((sequence, reason));
    }

    finish_step(queue, tracker, options, commands)
}

/// Handle the tasks mapped from one file change.
///
/// Runs never overlap: while any sequence is active, the batch is handed to
/// the trigger queue and replayed once the active run finished.
pub fn handle_tasks_triggered(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    tracker: &mut SequenceTracker,
    options: &RuntimeOptions,
    tasks: Vec<TaskName>,
    reason: TriggerReason,
) -> CoreStep {
    let mut commands = Vec::new();

    if tasks.is_empty() {
        return finish_step(queue, tracker, options, commands);
    }

    if tracker.is_idle() {
        info!(tasks = ?tasks, ?reason, "starting incremental run");
        begin_sequence(tracker, Sequence::single_step(WATCH_SEQUENCE, tasks), reason);
        commands.extend(advance(scheduler, queue, tracker, options));
    } else {
        queue.record_batch(&tasks);
    }

    finish_step(queue, tracker, options, commands)
}

/// Handle completion of a stage.
pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    tracker: &mut SequenceTracker,
    options: &RuntimeOptions,
    task: TaskName,
    outcome: TaskOutcome,
) -> CoreStep {
    let mut commands = Vec::new();

    let step = scheduler.step_completion(&task, outcome.clone());

    if let Some(active) = tracker.active.as_mut() {
        active.executed.push(task.clone());

        if let TaskOutcome::Failed(_) = &outcome {
            if scheduler.is_best_effort(&task) == Some(true) {
                active.tolerated_failures.push(task.clone());
            }
        }

        if active.failed_task.is_none() {
            if let Some(first) = step.newly_failed.first() {
                active.failed_task = Some(first.clone());
            }
        }
    } else {
        warn!(task = %task, "task completed with no active sequence");
    }

    if !step.newly_scheduled.is_empty() {
        commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
    }

    if step.run_just_finished {
        commands.extend(advance(scheduler, queue, tracker, options));
    }

    finish_step(queue, tracker, options, commands)
}

fn begin_sequence(tracker: &mut SequenceTracker, sequence: Sequence, reason: TriggerReason) {
    info!(sequence = %sequence.name(), steps = %sequence, ?reason, "starting sequence");

    tracker.phase = match (tracker.phase, reason) {
        (WatchPhase::Idle, TriggerReason::Manual) => WatchPhase::RunningInitial,
        (_, TriggerReason::FileWatch) => WatchPhase::RunningIncremental,
        (phase, TriggerReason::Manual) => phase,
    };
    tracker.active = Some(ActiveSequence::new(sequence, reason));
}

/// Move the active sequence forward until it waits on running tasks.
///
/// Starts the next step when the scheduler went idle, finishes the sequence
/// when no steps are left (or a fatal failure happened), then picks up the
/// next pending sequence or queued trigger batch.
fn advance(
    scheduler: &mut Scheduler,
    queue: &mut TriggerQueue,
    tracker: &mut SequenceTracker,
    options: &RuntimeOptions,
) -> Vec<CoreCommand> {
    let mut commands = Vec::new();

    loop {
        if !scheduler.is_idle() {
            return commands;
        }

        let Some(active) = tracker.active.as_mut() else {
            return commands;
        };

        let next_step = if active.failed_task.is_none() {
            active.remaining.pop_front()
        } else {
            None
        };

        if let Some(step) = next_step {
            debug!(sequence = %active.name, tasks = ?step, "starting sequence step");
            scheduler.start_new_run();

            let mut ready = Vec::new();
            for task in &step {
                let result = scheduler.step_request(task);
                ready.extend(result.newly_scheduled);
                if active.failed_task.is_none() {
                    if let Some(first) = result.newly_failed.first() {
                        active.failed_task = Some(first.clone());
                    }
                }
            }

            if !ready.is_empty() {
                commands.push(CoreCommand::DispatchTasks(ready));
            }
            continue;
        }

        if let Some(active) = tracker.active.take() {
            commands.extend(finish_sequence(tracker, options, active));
        }

        if let Some((sequence, reason)) = tracker.pending.pop_front() {
            begin_sequence(tracker, sequence, reason);
        } else if let Some(batch) = queue.next_batch() {
            info!(tasks = ?batch, "starting queued incremental run");
            begin_sequence(
                tracker,
                Sequence::single_step(WATCH_SEQUENCE, batch),
                TriggerReason::FileWatch,
            );
        } else {
            return commands;
        }
    }
}

fn finish_sequence(
    tracker: &mut SequenceTracker,
    options: &RuntimeOptions,
    active: ActiveSequence,
) -> Vec<CoreCommand> {
    let report = SequenceReport {
        name: active.name,
        reason: active.reason,
        executed: active.executed,
        tolerated_failures: active.tolerated_failures,
        failed_task: active.failed_task,
    };

    match &report.failed_task {
        Some(task) => warn!(
            sequence = %report.name,
            task = %task,
            "sequence aborted by failed task"
        ),
        None => info!(
            sequence = %report.name,
            executed = report.executed.len(),
            "sequence finished"
        ),
    }

    let mut commands = Vec::new();
    let incremental = report.reason == TriggerReason::FileWatch;

    tracker.phase = if options.exit_when_idle {
        WatchPhase::Idle
    } else {
        WatchPhase::Watching
    };

    commands.push(CoreCommand::SequenceFinished(report));
    if incremental {
        commands.push(CoreCommand::EmitReload);
    }
    commands
}

/// Append the exit decision for one-shot runs.
fn finish_step(
    queue: &TriggerQueue,
    tracker: &SequenceTracker,
    options: &RuntimeOptions,
    mut commands: Vec<CoreCommand>,
) -> CoreStep {
    let mut keep_running = true;

    if options.exit_when_idle
        && tracker.is_idle()
        && tracker.pending.is_empty()
        && queue.is_empty()
    {
        keep_running = false;
        commands.push(CoreCommand::RequestExit);
    }

    CoreStep {
        commands,
        keep_running,
    }
}
