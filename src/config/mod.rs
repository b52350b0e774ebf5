// src/config/mod.rs

//! Configuration loading and validation for assetpipe.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate invariants `serde` cannot express (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{config_root_dir, load_and_validate, load_from_path, load_or_default};
pub use model::{
    ConfigFile, HtmlSection, ImagesSection, PathsSection, ProjectPaths, RawConfigFile,
    ScriptsSection, ServerSection, StaticSection, StylesSection, WatchSection,
};
pub use validate::{validate_config, validate_paths};
