// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning stages
//! itself. Tests swap in a fake executor that records which tasks were
//! scheduled and emits `TaskCompleted` events directly.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::dag::ScheduledTask;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::stages::StageContext;

use super::stage_runner::run_stage;

/// Trait abstracting how scheduled tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    ///
    /// Implementations must eventually emit exactly one
    /// `RuntimeEvent::TaskCompleted` per dispatched task.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Production executor: every ready task runs its stage in its own Tokio
/// task, sharing one [`StageContext`].
#[derive(Debug, Clone)]
pub struct StageExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    ctx: Arc<StageContext>,
}

impl StageExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, ctx: Arc<StageContext>) -> Self {
        Self { runtime_tx, ctx }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }
}

impl ExecutorBackend for StageExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let ctx = Arc::clone(&self.ctx);

        Box::pin(async move {
            for task in tasks {
                debug!(task = %task.name, run_id = task.run_id, "spawning stage");
                tokio::spawn(run_stage(task, Arc::clone(&ctx), tx.clone()));
            }
            Ok(())
        })
    }
}
