// src/watch/mod.rs

//! File watching: maps changed paths onto the tasks that must re-run.

pub mod event_handler;
pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::{SubscriptionSet, SubscriptionSpec, WatchBase, WatchSubscription};
pub use watcher::{spawn_watcher, WatcherHandle};
