// src/config/model.rs

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::types::TriggerWhileRunningBehaviour;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [paths]
/// source = "src"
/// assets = "src/assets"
/// output = "public"
///
/// [scripts]
/// entries = ["scripts/app.js"]
///
/// [server]
/// port = 2525
///
/// [watch]
/// triggered_while_running_behaviour = "queue"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub scripts: ScriptsSection,
    #[serde(default)]
    pub styles: StylesSection,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub html: HtmlSection,
    #[serde(default, rename = "static")]
    pub static_files: StaticSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub watch: WatchSection,
}

/// Validated configuration.
///
/// Can only be constructed through `TryFrom<RawConfigFile>` (see
/// `config::validate`), so holding one means the invariants were checked.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub paths: PathsSection,
    pub scripts: ScriptsSection,
    pub styles: StylesSection,
    pub images: ImagesSection,
    pub html: HtmlSection,
    pub static_files: StaticSection,
    pub server: ServerSection,
    pub watch: WatchSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            paths: raw.paths,
            scripts: raw.scripts,
            styles: raw.styles,
            images: raw.images,
            html: raw.html,
            static_files: raw.static_files,
            server: raw.server,
            watch: raw.watch,
        }
    }

    /// Resolve all configured roots against the project directory.
    pub fn resolve_paths(&self, project_root: &Path) -> ProjectPaths {
        self.paths.resolve(project_root)
    }
}

/// `[paths]` section: directory roots, relative to the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    /// HTML templates and static files.
    #[serde(default = "default_source")]
    pub source: String,
    /// Root containing `styles/`, `scripts/` and `images/`.
    #[serde(default = "default_assets")]
    pub assets: String,
    #[serde(default = "default_output")]
    pub output: String,
    /// Scratch directory for intermediate artifacts (extracted styles).
    #[serde(default = "default_tmp")]
    pub tmp: String,
    /// Project metadata file holding the `version` field.
    #[serde(default = "default_metadata")]
    pub metadata: String,
}

impl PathsSection {
    /// Join each root onto `project_root` and normalize it lexically, so
    /// `./src` and `src/.` resolve to the same directory as `src`.
    pub fn resolve(&self, project_root: &Path) -> ProjectPaths {
        let root = normalize(project_root);
        let join = |p: &str| normalize(&root.join(p));

        ProjectPaths {
            source: join(&self.source),
            assets: join(&self.assets),
            output: join(&self.output),
            tmp: join(&self.tmp),
            metadata: join(&self.metadata),
            root,
        }
    }
}

/// Drop `.` components and resolve `..` against the preceding component,
/// without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

fn default_source() -> String {
    "src".to_string()
}

fn default_assets() -> String {
    "src/assets".to_string()
}

fn default_output() -> String {
    "public".to_string()
}

fn default_tmp() -> String {
    ".tmp".to_string()
}

fn default_metadata() -> String {
    "package.json".to_string()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            source: default_source(),
            assets: default_assets(),
            output: default_output(),
            tmp: default_tmp(),
            metadata: default_metadata(),
        }
    }
}

/// `[scripts]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptsSection {
    /// Entry modules, relative to the assets root. One bundle per entry.
    #[serde(default = "default_entries")]
    pub entries: Vec<String>,
    /// Global name the bundle IIFE is assigned to.
    #[serde(default = "default_bundle_name")]
    pub bundle_name: String,
}

fn default_entries() -> Vec<String> {
    vec!["scripts/app.js".to_string()]
}

fn default_bundle_name() -> String {
    "AppBundle".to_string()
}

impl Default for ScriptsSection {
    fn default() -> Self {
        Self {
            entries: default_entries(),
            bundle_name: default_bundle_name(),
        }
    }
}

/// `[styles]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StylesSection {
    /// Critical stylesheet, inlined into HTML.
    #[serde(default = "default_core_style")]
    pub core: String,
    /// Application stylesheet that receives extracted component styles.
    #[serde(default = "default_main_style")]
    pub main: String,
}

fn default_core_style() -> String {
    "styles/core.scss".to_string()
}

fn default_main_style() -> String {
    "styles/app.scss".to_string()
}

impl Default for StylesSection {
    fn default() -> Self {
        Self {
            core: default_core_style(),
            main: default_main_style(),
        }
    }
}

/// `[images]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagesSection {
    /// Vector inputs in this directory become one symbol sprite sheet.
    #[serde(default = "default_sprite_dir")]
    pub sprite_dir: String,
}

fn default_sprite_dir() -> String {
    "images/sprite".to_string()
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            sprite_dir: default_sprite_dir(),
        }
    }
}

/// `[html]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HtmlSection {
    /// `href` of the `<link>` tag replaced by an inline `<style>` block.
    #[serde(default = "default_inline_stylesheet")]
    pub inline_stylesheet: String,
}

fn default_inline_stylesheet() -> String {
    "styles/core.min.css".to_string()
}

impl Default for HtmlSection {
    fn default() -> Self {
        Self {
            inline_stylesheet: default_inline_stylesheet(),
        }
    }
}

/// `[static]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticSection {
    /// Files copied verbatim from the source root to the output root.
    #[serde(default = "default_static_files")]
    pub files: Vec<String>,
}

fn default_static_files() -> Vec<String> {
    vec!["manifest.json".to_string()]
}

impl Default for StaticSection {
    fn default() -> Self {
        Self {
            files: default_static_files(),
        }
    }
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Browser command launched with the server URL; empty disables it.
    #[serde(default)]
    pub browser: String,
}

fn default_port() -> u16 {
    2525
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            browser: String::new(),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// `"queue"` (default) or `"cancel"`.
    #[serde(default)]
    pub triggered_while_running_behaviour: TriggerWhileRunningBehaviour,

    /// Maximum number of queued batches to remember.
    #[serde(default = "default_queue_length")]
    pub queue_length: usize,
}

fn default_queue_length() -> usize {
    1
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            triggered_while_running_behaviour: TriggerWhileRunningBehaviour::default(),
            queue_length: default_queue_length(),
        }
    }
}

/// Absolute directory layout of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub source: PathBuf,
    pub assets: PathBuf,
    pub output: PathBuf,
    pub tmp: PathBuf,
    pub metadata: PathBuf,
}
