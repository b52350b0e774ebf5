#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use assetpipe::config::{ConfigFile, ProjectPaths, RawConfigFile, load_and_validate};
use assetpipe::dag::{TaskGraph, TaskGraphBuilder};
use assetpipe::stages::{Stage, StageContext, StageFuture, StageReport};
use assetpipe::types::{BumpLevel, Mode};

/// Stage that does nothing and always succeeds. Used to build synthetic
/// graphs whose execution is driven by a fake executor.
#[derive(Debug, Default)]
pub struct NoopStage;

impl Stage for NoopStage {
    fn run<'a>(&'a self, _ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async { Ok(StageReport::new()) })
    }
}

/// Builder for synthetic `TaskGraph`s backed by [`NoopStage`].
pub struct GraphBuilder {
    inner: TaskGraphBuilder,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            inner: TaskGraph::builder(),
        }
    }

    pub fn task(mut self, name: &str, after: &[&str]) -> Self {
        self.inner.define(name, after, Arc::new(NoopStage));
        self
    }

    pub fn best_effort(mut self, name: &str, after: &[&str]) -> Self {
        self.inner.define_best_effort(name, after, Arc::new(NoopStage));
        self
    }

    pub fn try_build(self) -> assetpipe::errors::Result<TaskGraph> {
        self.inner.build()
    }

    pub fn build(self) -> TaskGraph {
        self.try_build().expect("Failed to build valid task graph from builder")
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for an on-disk project in a temporary directory.
pub struct ProjectBuilder {
    files: Vec<(PathBuf, Vec<u8>)>,
    config_toml: Option<String>,
}

impl ProjectBuilder {
    /// An empty project using the default layout.
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            config_toml: None,
        }
    }

    /// A small but complete site: templates, styles with an import and an
    /// injection region, scripts with a component, a sprite directory of
    /// three icons and a standalone vector image.
    pub fn site() -> Self {
        Self::new()
            .file("package.json", SITE_PACKAGE_JSON)
            .file("src/index.html", SITE_INDEX_HTML)
            .file("src/manifest.json", "{\"name\": \"Site\"}\n")
            .file("src/assets/styles/core.scss", SITE_CORE_SCSS)
            .file("src/assets/styles/app.scss", SITE_APP_SCSS)
            .file("src/assets/styles/_vars.scss", "$gap: 8px;\n")
            .file("src/assets/scripts/app.js", SITE_APP_JS)
            .file("src/assets/scripts/util.js", SITE_UTIL_JS)
            .file("src/assets/scripts/components/Button.vue", SITE_BUTTON_VUE)
            .file("src/assets/images/sprite/home.svg", icon("M1 1h8v8H1z"))
            .file("src/assets/images/sprite/search.svg", icon("M2 2h6v6H2z"))
            .file("src/assets/images/sprite/user.svg", icon("M3 3h4v4H3z"))
            .file("src/assets/images/logo.svg", SITE_LOGO_SVG)
    }

    /// Add or replace a file, relative to the project root.
    pub fn file(mut self, rel: &str, contents: impl AsRef<[u8]>) -> Self {
        let rel = PathBuf::from(rel);
        self.files.retain(|(p, _)| p != &rel);
        self.files.push((rel, contents.as_ref().to_vec()));
        self
    }

    pub fn without(mut self, rel: &str) -> Self {
        let rel = PathBuf::from(rel);
        self.files.retain(|(p, _)| p != &rel);
        self
    }

    /// Write `Assetpipe.toml` with these contents and load it.
    pub fn config(mut self, toml: &str) -> Self {
        self.config_toml = Some(toml.to_string());
        self
    }

    pub fn build(self) -> Project {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");

        for (rel, contents) in &self.files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("create fixture dir");
            }
            std::fs::write(&path, contents).expect("write fixture file");
        }

        let config = match &self.config_toml {
            Some(toml) => {
                let path = root.join("Assetpipe.toml");
                std::fs::write(&path, toml).expect("write config");
                load_and_validate(&path).expect("fixture config is valid")
            }
            None => ConfigFile::try_from(RawConfigFile::default()).expect("default config is valid"),
        };
        let paths = config.resolve_paths(&root);

        Project {
            _dir: dir,
            root,
            config,
            paths,
        }
    }
}

impl Default for ProjectBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixture project; the directory is removed on drop.
pub struct Project {
    _dir: TempDir,
    pub root: PathBuf,
    pub config: ConfigFile,
    pub paths: ProjectPaths,
}

impl Project {
    pub fn context(&self, mode: Mode) -> Arc<StageContext> {
        self.context_with_bump(mode, BumpLevel::Patch)
    }

    pub fn context_with_bump(&self, mode: Mode, level: BumpLevel) -> Arc<StageContext> {
        Arc::new(StageContext::new(mode, level, self.paths.clone()))
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn output(&self, rel: &str) -> PathBuf {
        self.paths.output.join(rel)
    }

    pub fn read_output(&self, rel: &str) -> String {
        let path = self.output(rel);
        std::fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    pub fn write(&self, rel: &str, contents: impl AsRef<[u8]>) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create dir");
        }
        std::fs::write(path, contents).expect("write file");
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }

    /// Every file under the output root, relative and sorted, with contents.
    pub fn output_snapshot(&self) -> Vec<(String, Vec<u8>)> {
        let mut files = Vec::new();
        collect(&self.paths.output, &self.paths.output, &mut files);
        files.sort();
        files
    }
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else {
            let rel = path
                .strip_prefix(root)
                .expect("path under root")
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, std::fs::read(&path).expect("read output file")));
        }
    }
}

fn icon(path: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 10 10\">\n  <path d=\"{path}\"/>\n</svg>\n"
    )
}

const SITE_PACKAGE_JSON: &str = r#"{
  "name": "site",
  "version": "1.2.3",
  "private": true
}
"#;

const SITE_INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
  <title>Site {version}</title>
  <link rel="stylesheet" href="styles/core.min.css">
  <link rel="stylesheet" href="styles/app.min.css">
</head>
<body>
  <!-- svg-sprite -->
  <div id="app"></div>
  <script src="scripts/app.min.js"></script>
</body>
</html>
"#;

const SITE_CORE_SCSS: &str = r#"$text: #333;

body {
  color: $text;
  margin: 0;
}
"#;

const SITE_APP_SCSS: &str = r#"@import "vars";

/* inject:imports */
/* endinject */

.app {
  padding: $gap;

  .title {
    font-weight: bold;
  }

  &:hover {
    transform: scale(1.1);
  }
}
"#;

const SITE_APP_JS: &str = r#"import { greet } from './util';
import Button from './components/Button.vue';

const message = greet('world');
if (process.env.NODE_ENV !== 'production') {
  console.log(message);
}

export default { message: message, Button: Button };
"#;

const SITE_UTIL_JS: &str = r#"// Greeting helper.
export function greet(name) {
  return 'Hello, ' + name + '!';
}
"#;

const SITE_BUTTON_VUE: &str = r#"<template>
  <button class="button">{{ label }}</button>
</template>

<script>
export default {
  props: ['label']
};
</script>

<style>
.button {
  border: none;
}
</style>
"#;

const SITE_LOGO_SVG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- Generator: hand -->
<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 20 20">
  <metadata>logo</metadata>
  <circle cx="10" cy="10" r="8"/>
</svg>
"#;
