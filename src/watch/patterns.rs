// src/watch/patterns.rs

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::ProjectPaths;
use crate::engine::TaskName;
use crate::watch::path_utils::relative_str;

/// Directory a subscription's globs are relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchBase {
    /// Root holding `styles/`, `scripts/` and `images/`.
    Assets,
    /// Root holding HTML templates and static files.
    Source,
}

/// Uncompiled subscription: globs plus the tasks a match triggers.
#[derive(Debug, Clone)]
pub struct SubscriptionSpec {
    pub base: WatchBase,
    pub watch: Vec<String>,
    pub exclude: Vec<String>,
    pub tasks: Vec<TaskName>,
}

impl SubscriptionSpec {
    pub fn new(base: WatchBase, watch: &[&str], tasks: &[&str]) -> Self {
        Self {
            base,
            watch: watch.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            tasks: tasks.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn excluding(mut self, patterns: &[&str]) -> Self {
        self.exclude.extend(patterns.iter().map(|s| s.to_string()));
        self
    }
}

/// Compiled globs for one subscription.
#[derive(Clone)]
pub struct WatchSubscription {
    base: WatchBase,
    tasks: Vec<TaskName>,
    watch_set: GlobSet,
    exclude_set: Option<GlobSet>,
    patterns: Vec<String>,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("base", &self.base)
            .field("patterns", &self.patterns)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}

impl WatchSubscription {
    pub fn tasks(&self) -> &[TaskName] {
        &self.tasks
    }

    pub fn base(&self) -> WatchBase {
        self.base
    }

    /// Whether `rel_path` (relative to this subscription's base) matches.
    pub fn matches(&self, rel_path: &str) -> bool {
        if !self.watch_set.is_match(rel_path) {
            return false;
        }
        match &self.exclude_set {
            Some(exclude) => !exclude.is_match(rel_path),
            None => true,
        }
    }
}

/// Every subscription of the watch controller, bound to concrete roots.
#[derive(Debug, Clone)]
pub struct SubscriptionSet {
    assets_root: PathBuf,
    source_root: PathBuf,
    /// Pipeline-owned directories; changes there never trigger tasks.
    ignored: Vec<PathBuf>,
    subscriptions: Vec<WatchSubscription>,
}

impl SubscriptionSet {
    pub fn build(specs: &[SubscriptionSpec], paths: &ProjectPaths) -> Result<Self> {
        let mut subscriptions = Vec::with_capacity(specs.len());

        for spec in specs {
            let watch_set = build_globset(&spec.watch)
                .with_context(|| format!("building watch globset for {:?}", spec.tasks))?;
            let exclude_set = if spec.exclude.is_empty() {
                None
            } else {
                Some(
                    build_globset(&spec.exclude)
                        .with_context(|| format!("building exclude globset for {:?}", spec.tasks))?,
                )
            };

            subscriptions.push(WatchSubscription {
                base: spec.base,
                tasks: spec.tasks.clone(),
                watch_set,
                exclude_set,
                patterns: spec.watch.clone(),
            });
        }

        Ok(Self {
            assets_root: paths.assets.clone(),
            source_root: paths.source.clone(),
            ignored: vec![paths.output.clone(), paths.tmp.clone()],
            subscriptions,
        })
    }

    pub fn subscriptions(&self) -> &[WatchSubscription] {
        &self.subscriptions
    }

    pub fn base_dir(&self, base: WatchBase) -> &Path {
        match base {
            WatchBase::Assets => &self.assets_root,
            WatchBase::Source => &self.source_root,
        }
    }

    /// Directories to watch recursively; a root nested inside another is
    /// covered by its parent.
    pub fn roots(&self) -> Vec<PathBuf> {
        let mut roots = vec![self.source_root.clone()];
        if !self.assets_root.starts_with(&self.source_root) {
            roots.push(self.assets_root.clone());
        }
        roots
    }

    /// Tasks triggered by a change to `path`: the ordered union over every
    /// matching subscription.
    pub fn tasks_for(&self, path: &Path) -> Vec<TaskName> {
        if self.ignored.iter().any(|dir| path.starts_with(dir)) {
            return Vec::new();
        }

        let assets_rel = relative_str(&self.assets_root, path);
        let source_rel = relative_str(&self.source_root, path);

        let mut tasks: Vec<TaskName> = Vec::new();
        for sub in &self.subscriptions {
            let rel = match sub.base {
                WatchBase::Assets => assets_rel.as_deref(),
                WatchBase::Source => source_rel.as_deref(),
            };
            let Some(rel) = rel else {
                continue;
            };
            if !sub.matches(rel) {
                continue;
            }
            for task in &sub.tasks {
                if !tasks.contains(task) {
                    tasks.push(task.clone());
                }
            }
        }
        tasks
    }

    /// Ordered union of [`tasks_for`](Self::tasks_for) over several paths.
    pub fn tasks_for_paths<'a>(&self, paths: impl IntoIterator<Item = &'a PathBuf>) -> Vec<TaskName> {
        let mut tasks: Vec<TaskName> = Vec::new();
        for path in paths {
            for task in self.tasks_for(path) {
                if !tasks.contains(&task) {
                    tasks.push(task);
                }
            }
        }
        tasks
    }
}

/// `*` never crosses a `/`, so `*.html` only matches top-level files.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
