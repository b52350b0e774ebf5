// src/engine/queue.rs

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::engine::TaskName;
use crate::types::TriggerWhileRunningBehaviour;

/// Queue of trigger batches that arrive while a run is already executing.
///
/// Semantics:
/// - Each queued entry represents a *batch* of task names that will become
///   one future incremental run.
/// - `queue_length` (max_runs) defines how many such batches to keep. With
///   the default of 1, every trigger that arrives during a run is coalesced
///   into a single follow-up run.
/// - Once the queue is full, new triggers are merged into the last batch.
/// - Task order inside a batch is the order of first arrival.
#[derive(Debug)]
pub struct TriggerQueue {
    behaviour: TriggerWhileRunningBehaviour,
    max_runs: usize,
    runs: VecDeque<Vec<TaskName>>,
}

impl TriggerQueue {
    /// `max_runs` is clamped to at least 1.
    pub fn new(behaviour: TriggerWhileRunningBehaviour, max_runs: usize) -> Self {
        Self {
            behaviour,
            max_runs: max_runs.max(1),
            runs: VecDeque::new(),
        }
    }

    /// Returns true if there are no queued triggers.
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Number of queued batches.
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn behaviour(&self) -> TriggerWhileRunningBehaviour {
        self.behaviour
    }

    /// Record a batch of tasks triggered by one file change while a run is
    /// in progress.
    ///
    /// - `Queue`: append as a new batch while fewer than `max_runs` are
    ///   queued; otherwise merge into the last batch.
    /// - `Cancel`: drop every queued batch and keep only this one. The
    ///   active run is never interrupted; only what runs *afterwards*
    ///   changes.
    pub fn record_batch(&mut self, tasks: &[TaskName]) {
        if tasks.is_empty() {
            return;
        }

        match self.behaviour {
            TriggerWhileRunningBehaviour::Queue => {
                if self.runs.len() < self.max_runs {
                    self.runs.push_back(dedup(tasks.iter()));
                    debug!(
                        tasks = ?tasks,
                        queued = self.runs.len(),
                        "queued trigger batch (queue mode)"
                    );
                } else if let Some(last) = self.runs.back_mut() {
                    for task in tasks {
                        if !last.contains(task) {
                            last.push(task.clone());
                        }
                    }
                    warn!(
                        tasks = ?tasks,
                        max_runs = self.max_runs,
                        "queue full; merged trigger into last queued batch"
                    );
                }
            }
            TriggerWhileRunningBehaviour::Cancel => {
                debug!(
                    tasks = ?tasks,
                    dropped = self.runs.len(),
                    "replacing queued batches with this trigger (cancel mode)"
                );
                self.runs.clear();
                self.runs.push_back(dedup(tasks.iter()));
            }
        }
    }

    /// Take the oldest queued batch.
    pub fn next_batch(&mut self) -> Option<Vec<TaskName>> {
        let batch = self.runs.pop_front()?;
        debug!(tasks = ?batch, remaining = self.runs.len(), "dequeued trigger batch");
        Some(batch)
    }

    /// Merge every queued batch into one, preserving first-arrival order.
    pub fn drain_pending(&mut self) -> Vec<TaskName> {
        let merged = dedup(self.runs.iter().flatten());
        self.runs.clear();
        merged
    }
}

fn dedup<'a>(tasks: impl Iterator<Item = &'a TaskName>) -> Vec<TaskName> {
    let mut out: Vec<TaskName> = Vec::new();
    for task in tasks {
        if !out.contains(task) {
            out.push(task.clone());
        }
    }
    out
}
