// src/config/validate.rs

use std::path::Path;

use crate::config::model::{ConfigFile, ProjectPaths, RawConfigFile};
use crate::errors::{AssetpipeError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AssetpipeError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Check the semantic invariants that `serde` cannot express.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watch(cfg)?;
    validate_server(cfg)?;
    validate_scripts(cfg)?;
    validate_roots(cfg)?;
    Ok(())
}

fn validate_watch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.watch.queue_length == 0 {
        return Err(AssetpipeError::ConfigError(
            "[watch].queue_length must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(cfg: &RawConfigFile) -> Result<()> {
    if cfg.server.port == 0 {
        return Err(AssetpipeError::ConfigError(
            "[server].port must be a fixed port (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_scripts(cfg: &RawConfigFile) -> Result<()> {
    if cfg.scripts.entries.is_empty() {
        return Err(AssetpipeError::ConfigError(
            "[scripts].entries must name at least one entry module".to_string(),
        ));
    }
    if cfg.scripts.bundle_name.trim().is_empty() {
        return Err(AssetpipeError::ConfigError(
            "[scripts].bundle_name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Roots are checked against a stand-in project directory here; relative
/// roots keep their relationships wherever the project ends up. Absolute
/// roots are checked again by [`validate_paths`] once the real project
/// directory is known.
fn validate_roots(cfg: &RawConfigFile) -> Result<()> {
    validate_paths(&cfg.paths.resolve(Path::new(std::path::MAIN_SEPARATOR_STR)))
}

/// Clean removes output directories and the whole temp directory, so
/// neither may overlap the inputs or the project itself.
pub fn validate_paths(paths: &ProjectPaths) -> Result<()> {
    for (label, input) in [("source", &paths.source), ("assets", &paths.assets)] {
        if input.starts_with(&paths.output) {
            return Err(AssetpipeError::ConfigError(format!(
                "[paths].output ({}) must not equal or contain [paths].{label} ({})",
                paths.output.display(),
                input.display()
            )));
        }
    }

    for (label, owned) in [
        ("project root", &paths.root),
        ("[paths].source", &paths.source),
        ("[paths].assets", &paths.assets),
        ("[paths].output", &paths.output),
    ] {
        if owned.starts_with(&paths.tmp) {
            return Err(AssetpipeError::ConfigError(format!(
                "[paths].tmp ({}) must not equal or contain the {label} ({})",
                paths.tmp.display(),
                owned.display()
            )));
        }
    }
    Ok(())
}
