use std::fmt;

use serde::Deserialize;

/// Build mode for a single CLI invocation.
///
/// The mode is chosen once and then threaded through every stage invocation
/// as a plain value; nothing reads it from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    #[default]
    Development,
    Production,
}

impl Mode {
    /// Literal substituted for `process.env.NODE_ENV` in bundled scripts.
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Development => "development",
            Mode::Production => "production",
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Mode::Production)
    }

    /// Minify scripts and compress stylesheets.
    pub fn minify(self) -> bool {
        self.is_production()
    }

    /// Emit `.map` files next to compiled scripts and stylesheets.
    pub fn source_maps(self) -> bool {
        !self.is_production()
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Semantic-version component incremented by the `bump` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpLevel {
    #[default]
    Patch,
    Minor,
    Major,
}

impl BumpLevel {
    /// Resolve the level from the `--minor` / `--major` CLI flags.
    ///
    /// `--major` wins if both are somehow set.
    pub fn from_flags(minor: bool, major: bool) -> Self {
        if major {
            BumpLevel::Major
        } else if minor {
            BumpLevel::Minor
        } else {
            BumpLevel::Patch
        }
    }
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BumpLevel::Patch => "patch",
            BumpLevel::Minor => "minor",
            BumpLevel::Major => "major",
        };
        f.write_str(s)
    }
}

/// Behaviour when a file change arrives while a run is already in progress.
///
/// - `Queue`: remember the trigger and start a new run when the current one
///   finishes (default behaviour).
/// - `Cancel`: drop any previously queued batch and only keep the latest
///   trigger. The running sequence itself is never interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerWhileRunningBehaviour {
    #[default]
    Queue,
    Cancel,
}
