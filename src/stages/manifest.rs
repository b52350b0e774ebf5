// src/stages/manifest.rs

//! Service-worker precache manifest.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::stages::{write_file, Stage, StageContext, StageError, StageFuture, StageReport};

pub const SERVICE_WORKER: &str = "sw.js";

/// Output files worth caching, relative to the output root.
const PRECACHE_GLOB: &str = "**/*.{js,html,css,png,jpg,gif}";

/// One precached file and its content revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecacheEntry {
    pub url: String,
    pub revision: String,
}

#[derive(Debug, Default)]
pub struct ServiceWorkerStage;

impl Stage for ServiceWorkerStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let root = ctx.paths.output.clone();
            let entries = tokio::task::spawn_blocking(move || collect_entries(&root))
                .await
                .map_err(|e| StageError::Failed(format!("precache scan panicked: {e}")))??;

            let dest = ctx.paths.output.join(SERVICE_WORKER);
            write_file(&dest, render_service_worker(&entries)).await?;

            let mut report = StageReport::new();
            report.push_output(dest);
            Ok(report)
        })
    }
}

fn precache_globset() -> Result<GlobSet, StageError> {
    let glob = Glob::new(PRECACHE_GLOB)
        .map_err(|e| StageError::Failed(format!("invalid precache glob: {e}")))?;
    GlobSetBuilder::new()
        .add(glob)
        .build()
        .map_err(|e| StageError::Failed(format!("building precache globset: {e}")))
}

/// Walk `root` and hash every cacheable file, sorted by URL.
pub fn collect_entries(root: &Path) -> Result<Vec<PrecacheEntry>, StageError> {
    let globs = precache_globset()?;
    let mut entries = Vec::new();

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| StageError::Failed(format!("walking {}: {e}", root.display())))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let url = rel.to_string_lossy().replace('\\', "/");
        if url == SERVICE_WORKER || !globs.is_match(&url) {
            continue;
        }

        let bytes = std::fs::read(entry.path())
            .map_err(|e| StageError::io("reading", PathBuf::from(entry.path()), e))?;
        entries.push(PrecacheEntry {
            url,
            revision: blake3::hash(&bytes).to_hex().to_string(),
        });
    }

    entries.sort_by(|a, b| a.url.cmp(&b.url));
    Ok(entries)
}

/// Render `sw.js`: a versioned precache list plus a cache-first fetch handler.
pub fn render_service_worker(entries: &[PrecacheEntry]) -> String {
    let mut hasher = blake3::Hasher::new();
    for entry in entries {
        hasher.update(entry.url.as_bytes());
        hasher.update(entry.revision.as_bytes());
    }
    let cache_hex = hasher.finalize().to_hex();
    let cache_name = format!("assetpipe-{}", &cache_hex.as_str()[..16]);

    let list = entries
        .iter()
        .map(|e| format!("  [\"{}\", \"{}\"]", e.url, e.revision))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        r#"'use strict';

var CACHE_NAME = '{cache_name}';
var PRECACHE = [
{list}
];

self.addEventListener('install', function (event) {{
  event.waitUntil(
    caches.open(CACHE_NAME).then(function (cache) {{
      return cache.addAll(PRECACHE.map(function (entry) {{
        return entry[0] + '?_rev=' + entry[1];
      }}));
    }}).then(function () {{
      return self.skipWaiting();
    }})
  );
}});

self.addEventListener('activate', function (event) {{
  event.waitUntil(
    caches.keys().then(function (names) {{
      return Promise.all(names.filter(function (name) {{
        return name !== CACHE_NAME;
      }}).map(function (name) {{
        return caches.delete(name);
      }}));
    }})
  );
}});

self.addEventListener('fetch', function (event) {{
  if (event.request.method !== 'GET') {{
    return;
  }}
  event.respondWith(
    caches.match(event.request, {{ ignoreSearch: true }}).then(function (cached) {{
      return cached || fetch(event.request);
    }})
  );
}});
"#
    )
}
