// src/stages/version.rs

//! Project version: parsing, bumping and persistence in the metadata file.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tracing::info;

use crate::errors::AssetpipeError;
use crate::stages::{read_to_string, write_file, Stage, StageContext, StageError, StageFuture, StageReport};
use crate::types::BumpLevel;

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Next version at `level`; lower components reset to zero.
    pub fn bump(self, level: BumpLevel) -> Result<Self, AssetpipeError> {
        let overflow = || AssetpipeError::InvalidVersion(format!("{self} cannot be bumped ({level})"));
        match level {
            BumpLevel::Patch => {
                let patch = self.patch.checked_add(1).ok_or_else(overflow)?;
                Ok(Self::new(self.major, self.minor, patch))
            }
            BumpLevel::Minor => {
                let minor = self.minor.checked_add(1).ok_or_else(overflow)?;
                Ok(Self::new(self.major, minor, 0))
            }
            BumpLevel::Major => {
                let major = self.major.checked_add(1).ok_or_else(overflow)?;
                Ok(Self::new(major, 0, 0))
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = AssetpipeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AssetpipeError::InvalidVersion(s.to_string());

        let mut parts = s.trim().splitn(3, '.');
        let mut next = || -> Result<u64, AssetpipeError> {
            parts
                .next()
                .filter(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|p| p.parse().ok())
                .ok_or_else(invalid)
        };

        let major = next()?;
        let minor = next()?;
        let patch = next()?;
        Ok(Self::new(major, minor, patch))
    }
}

/// Read the `version` field of a metadata document.
pub fn version_of(document: &Value) -> Result<Version, AssetpipeError> {
    document
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| AssetpipeError::InvalidVersion("missing \"version\" field".to_string()))?
        .parse()
}

async fn load_metadata(path: &Path) -> Result<Value, StageError> {
    let raw = read_to_string(path).await?;
    serde_json::from_str(&raw)
        .map_err(|e| StageError::Failed(format!("parsing {}: {e}", path.display())))
}

/// Parse the version persisted in the metadata file at `path`.
pub async fn read_version(path: &Path) -> Result<Version, StageError> {
    let document = load_metadata(path).await?;
    version_of(&document).map_err(|e| StageError::Failed(format!("{}: {e}", path.display())))
}

/// Bump the version persisted at `path` and write it back, keeping every
/// other field and the field order.
pub async fn bump_version_file(path: &Path, level: BumpLevel) -> Result<Version, StageError> {
    let mut document = load_metadata(path).await?;
    let failed = |e: AssetpipeError| StageError::Failed(format!("{}: {e}", path.display()));
    let current = version_of(&document).map_err(failed)?;
    let next = current.bump(level).map_err(failed)?;

    if let Some(obj) = document.as_object_mut() {
        obj.insert("version".to_string(), Value::String(next.to_string()));
    }

    let mut rendered = serde_json::to_string_pretty(&document)
        .map_err(|e| StageError::Failed(format!("serializing {}: {e}", path.display())))?;
    rendered.push('\n');
    write_file(path, rendered).await?;

    info!(from = %current, to = %next, %level, "bumped version");
    Ok(next)
}

/// Increments the persisted version by the context's bump level.
#[derive(Debug, Default)]
pub struct BumpStage;

impl Stage for BumpStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let path = &ctx.paths.metadata;
            let version = bump_version_file(path, ctx.bump_level).await?;
            ctx.handoffs.set_version(version);

            let mut report = StageReport::new();
            report.push_output(path.clone());
            Ok(report)
        })
    }
}

/// Loads the persisted version into the handoff store.
#[derive(Debug, Default)]
pub struct ReadVersionStage;

impl Stage for ReadVersionStage {
    fn run<'a>(&'a self, ctx: &'a StageContext) -> StageFuture<'a> {
        Box::pin(async move {
            let version = read_version(&ctx.paths.metadata).await?;
            info!(%version, "current version");
            ctx.handoffs.set_version(version);
            Ok(StageReport::new())
        })
    }
}
