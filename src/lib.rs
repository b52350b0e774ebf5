// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod stages;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{
    ConfigFile, ProjectPaths, config_root_dir, load_or_default, validate_paths,
};
use crate::dag::{Scheduler, Sequence, TaskGraph};
use crate::engine::{
    CoreRuntime, ReloadSignal, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason,
};
use crate::errors::{AssetpipeError, Result};
use crate::exec::StageExecutor;
use crate::stages::StageContext;
use crate::watch::{SubscriptionSet, spawn_watcher};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and path resolution
/// - task graph validation
/// - the selected sequence (one-shot, or dev server + watcher)
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_or_default(&config_path)?;
    let root = project_root(&config_path)?;
    let paths = cfg.resolve_paths(&root);
    validate_paths(&paths)?;

    let command = args.command.clone().unwrap_or(Command::Default);
    let graph = Arc::new(pipeline::task_graph(&cfg)?);
    let sequence = pipeline::sequence_for(&command);
    sequence.validate(&graph)?;

    if args.dry_run {
        print_dry_run(&cfg, &paths, &graph, &sequence, &command);
        return Ok(());
    }

    let ctx = Arc::new(StageContext::new(
        command.mode(),
        command.bump_level(),
        paths,
    ));
    info!(sequence = %command.name(), mode = %ctx.mode, "assetpipe starting");

    match command {
        Command::Dev => run_dev(&cfg, graph, sequence, ctx).await,
        _ => {
            let summary = pipeline::run_sequence(graph, sequence, ctx).await?;
            pipeline::ensure_success(&summary)
        }
    }
}

/// Initial build, then serve and watch until Ctrl-C.
///
/// Failed runs are reported but never end the session; the next change
/// retries.
async fn run_dev(
    cfg: &ConfigFile,
    graph: Arc<TaskGraph>,
    sequence: Sequence,
    ctx: Arc<StageContext>,
) -> Result<()> {
    let paths = ctx.paths.clone();

    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let (reload_tx, _) = broadcast::channel::<ReloadSignal>(16);

    let executor = StageExecutor::new(rt_tx.clone(), ctx);
    let core = CoreRuntime::new(
        Scheduler::new(graph),
        cfg.watch.triggered_while_running_behaviour,
        cfg.watch.queue_length,
        RuntimeOptions {
            exit_when_idle: false,
        },
    );
    let runtime = Runtime::new(core, rt_rx, executor).with_reload(reload_tx.clone());

    let subscriptions = SubscriptionSet::build(&pipeline::watch_subscriptions(cfg), &paths)
        .map_err(|e| AssetpipeError::ConfigError(format!("{e:#}")))?;
    debug!(?subscriptions, "watch subscriptions");

    let server = server::start(cfg.server.port, paths.output.clone(), reload_tx).await?;
    let _watcher = spawn_watcher(subscriptions, rt_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    rt_tx
        .send(RuntimeEvent::SequenceRequested {
            sequence,
            reason: TriggerReason::Manual,
        })
        .await
        .context("runtime event channel closed before the initial build")?;

    if !cfg.server.browser.trim().is_empty() {
        server::launch_browser(&cfg.server.browser, &server.url()).await;
    }

    let summary = runtime.run().await?;
    server.shutdown();

    if let Some(report) = summary.first_failure() {
        warn!(
            sequence = %report.name,
            task = report.failed_task.as_deref().unwrap_or_default(),
            "at least one run was aborted during this session"
        );
    }
    info!(reloads = summary.reloads, "dev session ended");
    Ok(())
}

/// Absolute directory the config's relative paths resolve against.
fn project_root(config_path: &Path) -> Result<PathBuf> {
    let dir = config_root_dir(config_path);
    Ok(dir.canonicalize()?)
}

/// Print the resolved plan without executing anything.
fn print_dry_run(
    cfg: &ConfigFile,
    paths: &ProjectPaths,
    graph: &TaskGraph,
    sequence: &Sequence,
    command: &Command,
) {
    println!("assetpipe dry-run");
    println!("  sequence = {sequence}");
    println!("  mode = {}", command.mode());
    if matches!(command, Command::Build(_) | Command::Bump(_)) {
        println!("  bump = {}", command.bump_level());
    }
    println!();

    println!("paths:");
    println!("  source   = {}", paths.source.display());
    println!("  assets   = {}", paths.assets.display());
    println!("  output   = {}", paths.output.display());
    println!("  tmp      = {}", paths.tmp.display());
    println!("  metadata = {}", paths.metadata.display());
    println!();

    println!("tasks:");
    for name in graph.tasks() {
        println!("  - {name}");
        let deps = graph.dependencies_of(name);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        if let Some(policy) = graph.policy_of(name) {
            println!("      policy: {policy:?}");
        }
    }

    if matches!(command, Command::Dev) {
        println!();
        println!("watch:");
        println!(
            "  triggered_while_running_behaviour = {:?}",
            cfg.watch.triggered_while_running_behaviour
        );
        println!("  queue_length = {}", cfg.watch.queue_length);
        for spec in pipeline::watch_subscriptions(cfg) {
            println!("  - {:?} {:?} -> {:?}", spec.base, spec.watch, spec.tasks);
            if !spec.exclude.is_empty() {
                println!("      exclude: {:?}", spec.exclude);
            }
        }
        println!("server: http://127.0.0.1:{}/", cfg.server.port);
    }

    debug!("dry-run complete (no execution)");
}
