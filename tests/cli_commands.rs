// tests/cli_commands.rs

mod common;
use crate::common::builders::ProjectBuilder;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;

use clap::Parser;

use assetpipe::cli::{BumpArgs, CliArgs, Command, DEFAULT_CONFIG};
use assetpipe::errors::AssetpipeError;
use assetpipe::pipeline;
use assetpipe::stages::version::{Version, read_version};
use assetpipe::types::{BumpLevel, Mode};

type TestResult = Result<(), Box<dyn Error>>;

fn parse(args: &[&str]) -> Result<CliArgs, clap::Error> {
    CliArgs::try_parse_from(std::iter::once("assetpipe").chain(args.iter().copied()))
}

#[test]
fn no_subcommand_means_default_sequence() -> TestResult {
    let args = parse(&[])?;

    assert_eq!(args.config, DEFAULT_CONFIG);
    assert!(!args.dry_run);
    assert!(args.log_level.is_none());
    assert!(args.command.is_none());
    Ok(())
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() -> TestResult {
    let args = parse(&["build", "--minor", "--config", "site/Assetpipe.toml", "--dry-run"])?;

    assert_eq!(args.config, "site/Assetpipe.toml");
    assert!(args.dry_run);
    match args.command.as_ref() {
        Some(cmd @ Command::Build(bump)) => {
            assert!(bump.minor);
            assert!(!bump.major);
            assert_eq!(cmd.bump_level(), BumpLevel::Minor);
            assert_eq!(cmd.mode(), Mode::Production);
        }
        other => panic!("expected build, got {other:?}"),
    }
    Ok(())
}

#[test]
fn minor_and_major_conflict() {
    let err = parse(&["bump", "--minor", "--major"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
}

#[test]
fn unknown_log_level_is_rejected() {
    assert!(parse(&["--log-level", "loud", "dev"]).is_err());
    assert!(parse(&["--log-level", "debug", "dev"]).is_ok());
}

#[test]
fn commands_name_their_sequence_and_mode() {
    let major = BumpArgs {
        minor: false,
        major: true,
    };

    assert_eq!(Command::Dev.name(), "dev");
    assert_eq!(Command::Dev.mode(), Mode::Development);
    assert_eq!(Command::Default.mode(), Mode::Development);
    assert_eq!(Command::Bump(major).name(), "bump");
    assert_eq!(Command::Bump(major).bump_level(), BumpLevel::Major);
    assert_eq!(Command::Build(BumpArgs::default()).bump_level(), BumpLevel::Patch);
    assert_eq!(Command::Dev.bump_level(), BumpLevel::Patch);
}

#[test]
fn sequences_render_their_steps() {
    assert_eq!(
        pipeline::sequence_for(&Command::Default).to_string(),
        "clean -> [images, scripts, core-styles, styles, html, static, service-worker]"
    );
    assert_eq!(
        pipeline::sequence_for(&Command::Build(BumpArgs::default())).to_string(),
        "clean -> bump -> version -> [images, scripts, core-styles, styles, html, static, service-worker]"
    );
    assert_eq!(
        pipeline::sequence_for(&Command::Bump(BumpArgs::default())).to_string(),
        "bump"
    );
}

fn args_for(config: &std::path::Path, command: Command) -> CliArgs {
    CliArgs {
        config: config.to_string_lossy().into_owned(),
        log_level: None,
        dry_run: false,
        command: Some(command),
    }
}

#[tokio::test]
async fn dry_run_touches_nothing() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().config("").build();

    let mut args = args_for(&project.path("Assetpipe.toml"), Command::Dev);
    args.dry_run = true;
    with_timeout(assetpipe::run(args)).await?;

    assert!(!project.paths.output.exists());
    assert_eq!(read_version(&project.paths.metadata).await?, Version::new(1, 2, 3));
    Ok(())
}

#[tokio::test]
async fn bump_minor_rewrites_the_metadata_version() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().config("").build();

    let args = args_for(
        &project.path("Assetpipe.toml"),
        Command::Bump(BumpArgs {
            minor: true,
            major: false,
        }),
    );
    with_timeout(assetpipe::run(args)).await?;

    assert_eq!(read_version(&project.paths.metadata).await?, Version::new(1, 3, 0));
    assert!(!project.paths.output.exists(), "bump does not build");
    Ok(())
}

#[tokio::test]
async fn missing_entry_module_aborts_with_exit_code_one() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site()
        .without("src/assets/scripts/app.js")
        .config("")
        .build();

    let args = args_for(&project.path("Assetpipe.toml"), Command::Default);
    let err = with_timeout(assetpipe::run(args)).await.unwrap_err();

    match &err {
        AssetpipeError::SequenceAborted { sequence, task } => {
            assert_eq!(sequence, "default");
            assert_eq!(task, "scripts");
        }
        other => panic!("expected SequenceAborted, got {other:?}"),
    }
    assert_eq!(err.exit_code(), 1);
    Ok(())
}

#[tokio::test]
async fn explicit_missing_config_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let args = args_for(&dir.path().join("Missing.toml"), Command::Default);

    let err = assetpipe::run(args).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
}
