// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::{BumpLevel, Mode};

/// Command-line arguments for `assetpipe`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "assetpipe",
    version,
    about = "Build, watch and serve the static assets of a web front-end.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// If the default file does not exist, the built-in layout is used.
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ASSETPIPE_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate config and task graph, print the plan, but run nothing.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

pub const DEFAULT_CONFIG: &str = "Assetpipe.toml";

/// Named top-level sequences.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Clean, build in development mode, serve the output and watch sources.
    Dev,
    /// Clean, bump the version, then build in production mode.
    Build(BumpArgs),
    /// Clean and build once in development mode (same as no subcommand).
    Default,
    /// Bump the version in the project metadata without building.
    Bump(BumpArgs),
}

#[derive(Debug, Clone, Copy, Default, Args)]
pub struct BumpArgs {
    /// Increment the minor component instead of the patch component.
    #[arg(long, conflicts_with = "major")]
    pub minor: bool,

    /// Increment the major component instead of the patch component.
    #[arg(long)]
    pub major: bool,
}

impl BumpArgs {
    pub fn level(&self) -> BumpLevel {
        BumpLevel::from_flags(self.minor, self.major)
    }
}

impl Command {
    /// Sequence name used for logging and plan lookup.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Dev => "dev",
            Command::Build(_) => "build",
            Command::Default => "default",
            Command::Bump(_) => "bump",
        }
    }

    pub fn mode(&self) -> Mode {
        match self {
            Command::Build(_) => Mode::Production,
            Command::Dev | Command::Default | Command::Bump(_) => Mode::Development,
        }
    }

    pub fn bump_level(&self) -> BumpLevel {
        match self {
            Command::Build(args) | Command::Bump(args) => args.level(),
            Command::Dev | Command::Default => BumpLevel::Patch,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
