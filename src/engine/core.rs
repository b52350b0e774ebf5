// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for reading
//! events from channels, handing `ScheduledTask`s to the executor and
//! broadcasting reload signals.

use std::collections::VecDeque;

use crate::dag::{Scheduler, Sequence};
use crate::engine::event_handlers::{
    handle_sequence_request, handle_task_completion, handle_tasks_triggered, CoreStep,
};
use crate::engine::queue::TriggerQueue;
use crate::engine::{RuntimeEvent, RuntimeOptions, TaskName, TriggerReason, WatchPhase};
use crate::types::TriggerWhileRunningBehaviour;

/// The sequence currently being executed, step by step.
#[derive(Debug)]
pub(crate) struct ActiveSequence {
    pub name: String,
    pub reason: TriggerReason,
    pub remaining: VecDeque<Vec<TaskName>>,
    pub executed: Vec<TaskName>,
    pub tolerated_failures: Vec<TaskName>,
    pub failed_task: Option<TaskName>,
}

impl ActiveSequence {
    pub fn new(sequence: Sequence, reason: TriggerReason) -> Self {
        let name = sequence.name().to_string();
        Self {
            name,
            reason,
            remaining: sequence.into_steps().into(),
            executed: Vec::new(),
            tolerated_failures: Vec::new(),
            failed_task: None,
        }
    }
}

/// Sequence bookkeeping shared by the event handlers.
#[derive(Debug, Default)]
pub(crate) struct SequenceTracker {
    pub active: Option<ActiveSequence>,
    /// Manual sequence requests that arrived while another was active.
    pub pending: VecDeque<(Sequence, TriggerReason)>,
    pub phase: WatchPhase,
}

impl SequenceTracker {
    pub fn is_idle(&self) -> bool {
        self.active.is_none()
    }
}

/// Pure core runtime state.
///
/// This owns:
/// - the DAG scheduler
/// - the trigger queue
/// - sequence progress and the watch phase
/// - runtime options (e.g. `exit_when_idle`)
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
    queue: TriggerQueue,
    tracker: SequenceTracker,
    options: RuntimeOptions,
}

impl CoreRuntime {
    pub fn new(
        scheduler: Scheduler,
        behaviour: TriggerWhileRunningBehaviour,
        queue_length: usize,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            scheduler,
            queue: TriggerQueue::new(behaviour, queue_length),
            tracker: SequenceTracker::default(),
            options,
        }
    }

    /// True when no sequence is active.
    pub fn is_idle(&self) -> bool {
        self.tracker.is_idle() && self.scheduler.is_idle()
    }

    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn phase(&self) -> WatchPhase {
        self.tracker.phase
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        match event {
            RuntimeEvent::SequenceRequested { sequence, reason } => handle_sequence_request(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.tracker,
                &self.options,
                sequence,
                reason,
            ),
            RuntimeEvent::TasksTriggered { tasks, reason } => handle_tasks_triggered(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.tracker,
                &self.options,
                tasks,
                reason,
            ),
            RuntimeEvent::TaskCompleted { task, outcome } => handle_task_completion(
                &mut self.scheduler,
                &mut self.queue,
                &mut self.tracker,
                &self.options,
                task,
                outcome,
            ),
            RuntimeEvent::ShutdownRequested => CoreStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}
