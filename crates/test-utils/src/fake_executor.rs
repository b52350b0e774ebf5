use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assetpipe::dag::ScheduledTask;
use assetpipe::engine::{RuntimeEvent, TaskOutcome};
use assetpipe::errors::Result;
use assetpipe::exec::ExecutorBackend;

/// One entry of the execution trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Started(String),
    Finished(String),
}

/// A fake executor that:
/// - records dispatch order and a start/finish trace
/// - reports `TaskCompleted` for each scheduled task, after an optional
///   per-task delay, with `Success` unless an outcome was injected.
pub struct FakeExecutor {
    runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    trace: Arc<Mutex<Vec<TraceEvent>>>,
    outcomes: HashMap<String, TaskOutcome>,
    delays: HashMap<String, Duration>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: tokio::sync::mpsc::Sender<RuntimeEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            trace: Arc::new(Mutex::new(Vec::new())),
            outcomes: HashMap::new(),
            delays: HashMap::new(),
        }
    }

    /// Report `outcome` instead of `Success` whenever `task` runs.
    pub fn with_outcome(mut self, task: &str, outcome: TaskOutcome) -> Self {
        self.outcomes.insert(task.to_string(), outcome);
        self
    }

    pub fn failing(self, task: &str) -> Self {
        self.with_outcome(task, TaskOutcome::Failed(format!("{task} failed")))
    }

    /// Hold `task` "running" for `delay` before completing it.
    pub fn with_delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    /// Shared handle to the start/finish trace.
    pub fn trace(&self) -> Arc<Mutex<Vec<TraceEvent>>> {
        Arc::clone(&self.trace)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<ScheduledTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            for t in tasks {
                self.executed.lock().unwrap().push(t.name.clone());
                self.trace
                    .lock()
                    .unwrap()
                    .push(TraceEvent::Started(t.name.clone()));

                let tx = self.runtime_tx.clone();
                let trace = Arc::clone(&self.trace);
                let outcome = self
                    .outcomes
                    .get(&t.name)
                    .cloned()
                    .unwrap_or(TaskOutcome::Success);
                let delay = self.delays.get(&t.name).copied();

                tokio::spawn(async move {
                    if let Some(delay) = delay {
                        tokio::time::sleep(delay).await;
                    }
                    trace
                        .lock()
                        .unwrap()
                        .push(TraceEvent::Finished(t.name.clone()));
                    let _ = tx
                        .send(RuntimeEvent::TaskCompleted {
                            task: t.name,
                            outcome,
                        })
                        .await;
                });
            }
            Ok(())
        })
    }
}
