// src/engine/runtime.rs

use std::fmt;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, ReloadSignal, RunSummary, RuntimeEvent};

/// Drives the core runtime in response to `RuntimeEvent`s and delegates
/// stage execution to an `ExecutorBackend`.
///
/// All runtime semantics live in `CoreRuntime`; this struct only reads
/// events, dispatches tasks and broadcasts reload signals.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    reload_tx: Option<broadcast::Sender<ReloadSignal>>,
    summary: RunSummary,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, executor: E) -> Self {
        Self {
            core,
            event_rx,
            executor,
            reload_tx: None,
            summary: RunSummary::default(),
        }
    }

    /// Broadcast a [`ReloadSignal`] on `tx` after every incremental run.
    pub fn with_reload(mut self, tx: broadcast::Sender<ReloadSignal>) -> Self {
        self.reload_tx = Some(tx);
        self
    }

    /// Main event loop.
    ///
    /// - Consumes `RuntimeEvent`s from `event_rx`.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core.
    ///
    /// Returns every sequence report collected before the loop stopped.
    pub async fn run(mut self) -> Result<RunSummary> {
        info!("assetpipe runtime started");

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!(
            sequences = self.summary.reports.len(),
            reloads = self.summary.reloads,
            "runtime exiting"
        );
        Ok(self.summary)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::EmitReload => {
                self.summary.reloads += 1;
                let signal = ReloadSignal {
                    generation: self.summary.reloads,
                };
                if let Some(tx) = &self.reload_tx {
                    // No receivers just means no browser is connected.
                    let receivers = tx.send(signal).unwrap_or(0);
                    debug!(generation = signal.generation, receivers, "reload signal sent");
                }
            }
            CoreCommand::SequenceFinished(report) => {
                self.summary.reports.push(report);
            }
            CoreCommand::RequestExit => {
                // keep_running=false accompanies this command; just log it.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<ScheduledTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        let run_ids: Vec<_> = tasks.iter().map(|t| t.run_id).collect();
        debug!(?names, ?run_ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
