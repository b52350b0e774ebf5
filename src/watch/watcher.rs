// src/watch/watcher.rs

use std::sync::Arc;

use anyhow::Result;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::watch::event_handler::process_file_change;
use crate::watch::patterns::SubscriptionSet;

/// Keeps the underlying `RecommendedWatcher` alive. Dropping this handle
/// stops file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Watch every subscription root recursively and forward matching changes
/// to the runtime as `RuntimeEvent::TasksTriggered`.
pub fn spawn_watcher(
    subscriptions: SubscriptionSet,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    let subscriptions = Arc::new(subscriptions);

    // Bridge from notify's blocking callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("assetpipe: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("assetpipe: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    for root in subscriptions.roots() {
        if !root.is_dir() {
            warn!(root = %root.display(), "watch root does not exist; skipping");
            continue;
        }
        watcher.watch(&root, RecursiveMode::Recursive)?;
        info!("file watcher started on {:?}", root);
    }

    let async_subscriptions = Arc::clone(&subscriptions);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            if !process_file_change(&async_subscriptions, &event, &runtime_tx).await {
                break;
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
