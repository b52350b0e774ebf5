// src/stages/mod.rs

//! Pipeline stages.
//!
//! Every stage implements [`Stage`]: an async function of
//! (source files, [`StageContext`]) that writes artifacts and reports them
//! in a [`StageReport`]. Stages never read the mode or version from ambient
//! state; everything flows through the context.
//!
//! - [`clean`] removes the output entries the pipeline owns.
//! - [`scripts`] bundles entry modules and extracts component styles.
//! - [`styles`] compiles stylesheets (see [`css`] for the compiler).
//! - [`images`] optimizes rasters/vectors and builds the sprite sheet.
//! - [`html`] assembles templates with inlined CSS and sprite.
//! - [`static_files`] copies static files verbatim.
//! - [`version`] bumps and reads the persisted project version.
//! - [`manifest`] writes the service-worker precache manifest.
//! - [`handoff`] holds the typed artifacts passed between stages.

pub mod clean;
pub mod css;
pub mod handoff;
pub mod html;
pub mod images;
pub mod manifest;
pub mod minify;
pub mod scripts;
pub mod sourcemap;
pub mod static_files;
pub mod styles;
pub mod version;

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use thiserror::Error;

use crate::config::ProjectPaths;
use crate::types::{BumpLevel, Mode};

pub use handoff::{ExtractedStyle, Handoffs};

/// Everything a stage invocation may read besides its own configuration.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub mode: Mode,
    pub bump_level: BumpLevel,
    pub paths: ProjectPaths,
    pub handoffs: Handoffs,
}

impl StageContext {
    pub fn new(mode: Mode, bump_level: BumpLevel, paths: ProjectPaths) -> Self {
        Self {
            mode,
            bump_level,
            paths,
            handoffs: Handoffs::default(),
        }
    }
}

/// Boxed future returned by [`Stage::run`].
pub type StageFuture<'a> = Pin<Box<dyn Future<Output = StageResult> + Send + 'a>>;

pub type StageResult = std::result::Result<StageReport, StageError>;

/// A pipeline unit transforming one class of source assets into artifacts.
pub trait Stage: Send + Sync + fmt::Debug {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a>;
}

/// Whether an artifact is part of the deliverable output tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Output,
    Intermediate,
}

/// A file written by a stage. Artifacts carry no identity beyond their path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn output(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Output,
        }
    }

    pub fn intermediate(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ArtifactKind::Intermediate,
        }
    }
}

/// Recoverable problem reported by a stage (compile error, bad image).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub path: Option<PathBuf>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(path: Option<&Path>, message: impl Into<String>) -> Self {
        Self {
            path: path.map(Path::to_path_buf),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}", path.display(), self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Successful (possibly degraded) result of one stage invocation.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub artifacts: Vec<Artifact>,
    pub diagnostics: Vec<Diagnostic>,
}

impl StageReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(Artifact::output(path));
    }

    pub fn push_intermediate(&mut self, path: impl Into<PathBuf>) {
        self.artifacts.push(Artifact::intermediate(path));
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: StageReport) {
        self.artifacts.extend(other.artifacts);
        self.diagnostics.extend(other.diagnostics);
    }

    /// No recoverable failures were reported.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Fatal stage failure; aborts the current sequence unless the task is
/// declared best-effort.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),
}

impl StageError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Write `contents` to `path`, creating parent directories first.
pub(crate) async fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), StageError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StageError::io("creating dir", parent, e))?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| StageError::io("writing", path, e))
}

pub(crate) async fn read_to_string(path: &Path) -> Result<String, StageError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| StageError::io("reading", path, e))
}

/// Sorted list of regular files directly inside `dir` with one of the given
/// extensions. A missing directory yields an empty list.
pub(crate) async fn list_files(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, StageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StageError::io("reading dir", dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StageError::io("reading dir", dir, e))?
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if has_extension(&path, extensions) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub(crate) fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// File stem as an owned string (`"core"` for `styles/core.scss`).
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
