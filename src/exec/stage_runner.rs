// src/exec/stage_runner.rs

//! Individual stage runner.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::dag::ScheduledTask;
use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::stages::{StageContext, StageReport};

/// Run the stage behind one scheduled task and emit its `TaskCompleted`
/// event.
///
/// A panicking stage is reported as a failure instead of leaving the
/// scheduler waiting forever.
pub async fn run_stage(
    task: ScheduledTask,
    ctx: Arc<StageContext>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) {
    let task_name = task.name.clone();
    let run_id = task.run_id;

    let outcome = execute(&task, ctx).await;

    if let Err(err) = report(&task_name, outcome, &runtime_tx).await {
        error!(task = %task_name, run_id, error = %err, "could not report stage result");
    }
}

async fn execute(task: &ScheduledTask, ctx: Arc<StageContext>) -> TaskOutcome {
    info!(
        task = %task.name,
        run_id = task.run_id,
        mode = %ctx.mode,
        "starting stage"
    );
    let started = Instant::now();

    let action = Arc::clone(&task.action);
    let handle = tokio::spawn(async move { action.run(&ctx).await });

    let outcome = match handle.await {
        Ok(Ok(stage_report)) => outcome_for(task, &stage_report),
        Ok(Err(err)) => {
            error!(task = %task.name, run_id = task.run_id, error = %err, "stage failed");
            TaskOutcome::Failed(err.to_string())
        }
        Err(join_err) => {
            error!(task = %task.name, run_id = task.run_id, error = %join_err, "stage panicked");
            TaskOutcome::Failed(format!("stage '{}' panicked", task.name))
        }
    };

    info!(
        task = %task.name,
        run_id = task.run_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        ?outcome,
        "stage finished"
    );
    outcome
}

fn outcome_for(task: &ScheduledTask, stage_report: &StageReport) -> TaskOutcome {
    for diagnostic in &stage_report.diagnostics {
        warn!(task = %task.name, run_id = task.run_id, "{diagnostic}");
    }

    if stage_report.is_clean() {
        TaskOutcome::Success
    } else {
        TaskOutcome::Recovered {
            diagnostics: stage_report.diagnostics.len(),
        }
    }
}

async fn report(
    task: &str,
    outcome: TaskOutcome,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> Result<()> {
    runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: task.to_string(),
            outcome,
        })
        .await
        .with_context(|| format!("sending TaskCompleted event for task '{task}' to runtime"))
}
