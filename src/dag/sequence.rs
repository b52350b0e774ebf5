// src/dag/sequence.rs

//! Ordered task sequences.
//!
//! A sequence is a list of steps executed strictly left to right. Each step
//! is a set of tasks that fan out concurrently; ordering *within* a step is
//! governed only by prerequisite edges in the task graph.

use std::fmt;

use crate::dag::TaskGraph;
use crate::engine::TaskName;
use crate::errors::{AssetpipeError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    name: String,
    steps: Vec<Vec<TaskName>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step. Empty steps are skipped.
    pub fn then(mut self, tasks: &[&str]) -> Self {
        if !tasks.is_empty() {
            self.steps
                .push(tasks.iter().map(|t| t.to_string()).collect());
        }
        self
    }

    /// A single-step sequence, as produced by a file-change trigger.
    pub fn single_step(name: impl Into<String>, tasks: Vec<TaskName>) -> Self {
        let mut seq = Self::new(name);
        if !tasks.is_empty() {
            seq.steps.push(tasks);
        }
        seq
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Vec<TaskName>] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<Vec<TaskName>> {
        self.steps
    }

    /// All task names across steps, in order of first appearance.
    pub fn task_names(&self) -> Vec<TaskName> {
        let mut names: Vec<TaskName> = Vec::new();
        for task in self.steps.iter().flatten() {
            if !names.contains(task) {
                names.push(task.clone());
            }
        }
        names
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Check every step references a task declared in `graph`.
    pub fn validate(&self, graph: &TaskGraph) -> Result<()> {
        for task in self.steps.iter().flatten() {
            if !graph.contains(task) {
                return Err(AssetpipeError::TaskNotFound(format!(
                    "'{task}' (referenced by sequence '{}')",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Sequence {
    /// Renders as `clean -> [images, scripts] -> html`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .steps
            .iter()
            .map(|step| match step.as_slice() {
                [single] => single.clone(),
                many => format!("[{}]", many.join(", ")),
            })
            .collect();
        write!(f, "{}", rendered.join(" -> "))
    }
}
