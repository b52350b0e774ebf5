// src/watch/event_handler.rs

//! Turns filesystem events into task triggers.

use notify::{Event, EventKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::engine::{RuntimeEvent, TriggerReason};
use crate::watch::patterns::SubscriptionSet;

/// Whether an event kind can change file contents.
pub fn is_relevant(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

/// Match one notify event against the subscriptions and, when anything
/// matches, send a single `TasksTriggered` carrying the ordered union.
///
/// Returns `false` once the runtime has gone away.
pub async fn process_file_change(
    subscriptions: &SubscriptionSet,
    event: &Event,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) -> bool {
    if !is_relevant(&event.kind) {
        return true;
    }

    let tasks = subscriptions.tasks_for_paths(&event.paths);
    if tasks.is_empty() {
        debug!(paths = ?event.paths, "change matched no subscription");
        return true;
    }

    debug!(paths = ?event.paths, ?tasks, "watch match -> triggering tasks");

    if let Err(err) = runtime_tx
        .send(RuntimeEvent::TasksTriggered {
            tasks,
            reason: TriggerReason::FileWatch,
        })
        .await
    {
        warn!(error = %err, "failed to send watch trigger to runtime");
        return false;
    }
    true
}
