// src/stages/handoff.rs

//! Typed artifacts passed between stage invocations.
//!
//! Producers replace their slot on every run; consumers read the latest
//! value. The store lives for the whole process, so an incremental run of a
//! consumer (e.g. `styles` alone) still sees what the producer wrote during
//! an earlier run.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::stages::version::Version;

/// A component's `<style>` block written to the temp directory by the
/// scripts stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedStyle {
    /// Component file stem as written in the source (`"NavBar"`).
    pub component: String,
    /// Location in the temp directory (`.tmp/_navbar.scss`).
    pub path: PathBuf,
}

#[derive(Debug, Default)]
struct HandoffState {
    extracted_styles: Vec<ExtractedStyle>,
    core_stylesheet: Option<PathBuf>,
    sprite: Option<PathBuf>,
    version: Option<Version>,
}

/// Shared, cheaply clonable handle to the handoff store.
#[derive(Debug, Clone, Default)]
pub struct Handoffs {
    inner: Arc<Mutex<HandoffState>>,
}

impl Handoffs {
    fn lock(&self) -> MutexGuard<'_, HandoffState> {
        // A panicking stage cannot leave the plain-data state half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Replace the extracted component styles. Sorted by path so consumers
    /// see a stable order.
    pub fn set_extracted_styles(&self, mut styles: Vec<ExtractedStyle>) {
        styles.sort_by(|a, b| a.path.cmp(&b.path));
        styles.dedup_by(|a, b| a.path == b.path);
        self.lock().extracted_styles = styles;
    }

    pub fn extracted_styles(&self) -> Vec<ExtractedStyle> {
        self.lock().extracted_styles.clone()
    }

    pub fn set_core_stylesheet(&self, path: Option<PathBuf>) {
        self.lock().core_stylesheet = path;
    }

    pub fn core_stylesheet(&self) -> Option<PathBuf> {
        self.lock().core_stylesheet.clone()
    }

    pub fn set_sprite(&self, path: Option<PathBuf>) {
        self.lock().sprite = path;
    }

    pub fn sprite(&self) -> Option<PathBuf> {
        self.lock().sprite.clone()
    }

    pub fn set_version(&self, version: Version) {
        self.lock().version = Some(version);
    }

    pub fn version(&self) -> Option<Version> {
        self.lock().version
    }
}
