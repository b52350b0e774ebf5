// src/pipeline.rs

//! The fixed asset pipeline: task graph, named sequences and watch
//! subscriptions, plus a one-shot sequence runner.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::Command;
use crate::config::ConfigFile;
use crate::dag::{Scheduler, Sequence, TaskGraph};
use crate::engine::{
    CoreRuntime, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TriggerReason,
};
use crate::errors::{AssetpipeError, Result};
use crate::exec::StageExecutor;
use crate::stages::StageContext;
use crate::stages::clean::CleanStage;
use crate::stages::html::HtmlStage;
use crate::stages::images::ImagesStage;
use crate::stages::manifest::ServiceWorkerStage;
use crate::stages::scripts::ScriptsStage;
use crate::stages::static_files::StaticStage;
use crate::stages::styles::StylesStage;
use crate::stages::version::{BumpStage, ReadVersionStage};
use crate::types::TriggerWhileRunningBehaviour;
use crate::watch::{SubscriptionSpec, WatchBase};

pub const CLEAN: &str = "clean";
pub const BUMP: &str = "bump";
pub const VERSION: &str = "version";
pub const IMAGES: &str = "images";
pub const SCRIPTS: &str = "scripts";
pub const CORE_STYLES: &str = "core-styles";
pub const STYLES: &str = "styles";
pub const STATIC: &str = "static";
pub const HTML: &str = "html";
pub const SERVICE_WORKER: &str = "service-worker";

/// Every task that writes build output, in declaration order.
pub const BUILD_TASKS: [&str; 7] = [
    IMAGES,
    SCRIPTS,
    CORE_STYLES,
    STYLES,
    HTML,
    STATIC,
    SERVICE_WORKER,
];

/// Build and validate the task graph for this configuration.
pub fn task_graph(cfg: &ConfigFile) -> Result<TaskGraph> {
    let mut builder = TaskGraph::builder();

    builder
        .define(CLEAN, &[], Arc::new(CleanStage::new(cfg.static_files.files.clone())))
        .define(BUMP, &[], Arc::new(BumpStage))
        .define(VERSION, &[], Arc::new(ReadVersionStage))
        .define_best_effort(IMAGES, &[], Arc::new(ImagesStage::new(&cfg.images.sprite_dir)))
        .define(
            SCRIPTS,
            &[],
            Arc::new(ScriptsStage::new(
                cfg.scripts.entries.clone(),
                &cfg.scripts.bundle_name,
            )),
        )
        .define(CORE_STYLES, &[], Arc::new(StylesStage::core(&cfg.styles.core)))
        // Component styles extracted by `scripts` feed the main stylesheet.
        .define(STYLES, &[SCRIPTS], Arc::new(StylesStage::main(&cfg.styles.main)))
        .define(STATIC, &[], Arc::new(StaticStage::new(cfg.static_files.files.clone())))
        .define(
            HTML,
            &[CORE_STYLES, STYLES, IMAGES],
            Arc::new(HtmlStage::new(&cfg.html.inline_stylesheet)),
        )
        .define(
            SERVICE_WORKER,
            &[IMAGES, SCRIPTS, CORE_STYLES, STYLES, HTML, STATIC],
            Arc::new(ServiceWorkerStage),
        );

    builder.build()
}

/// The sequence a CLI command runs.
pub fn sequence_for(command: &Command) -> Sequence {
    match command {
        Command::Dev | Command::Default => Sequence::new(command.name())
            .then(&[CLEAN])
            .then(&BUILD_TASKS),
        Command::Build(_) => Sequence::new(command.name())
            .then(&[CLEAN])
            .then(&[BUMP])
            .then(&[VERSION])
            .then(&BUILD_TASKS),
        Command::Bump(_) => Sequence::new(command.name()).then(&[BUMP]),
    }
}

/// Watch subscriptions for dev mode. Globs are relative to the assets or
/// source root.
pub fn watch_subscriptions(cfg: &ConfigFile) -> Vec<SubscriptionSpec> {
    let core = cfg.styles.core.as_str();
    let sprite_svgs = format!("{}/*.svg", cfg.images.sprite_dir.trim_end_matches('/'));
    let statics: Vec<&str> = cfg.static_files.files.iter().map(String::as_str).collect();

    let mut specs = vec![
        SubscriptionSpec::new(WatchBase::Assets, &[core], &[CORE_STYLES, HTML]),
        SubscriptionSpec::new(WatchBase::Assets, &["styles/**/*.scss"], &[STYLES, HTML])
            .excluding(&[core]),
        SubscriptionSpec::new(
            WatchBase::Assets,
            &["scripts/**/*.vue"],
            &[SCRIPTS, STYLES, CORE_STYLES, HTML],
        ),
        SubscriptionSpec::new(WatchBase::Assets, &["scripts/**/*.js"], &[SCRIPTS]),
        SubscriptionSpec::new(WatchBase::Assets, &["images/**/*"], &[IMAGES])
            .excluding(&[sprite_svgs.as_str()]),
        SubscriptionSpec::new(WatchBase::Assets, &[sprite_svgs.as_str()], &[IMAGES, HTML]),
        SubscriptionSpec::new(WatchBase::Source, &["*.html"], &[HTML]),
    ];

    if !statics.is_empty() {
        specs.push(SubscriptionSpec::new(WatchBase::Source, &statics, &[STATIC]));
    }

    specs
}

/// Run `sequence` once to completion and return what happened.
///
/// Uses the production stage executor; the runtime exits as soon as the
/// sequence finishes.
pub async fn run_sequence(
    graph: Arc<TaskGraph>,
    sequence: Sequence,
    ctx: Arc<StageContext>,
) -> Result<RunSummary> {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executor = StageExecutor::new(tx.clone(), ctx);

    let core = CoreRuntime::new(
        Scheduler::new(graph),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: true,
        },
    );

    info!(%sequence, "running sequence");
    tx.send(RuntimeEvent::SequenceRequested {
        sequence,
        reason: TriggerReason::Manual,
    })
    .await
    .context("runtime event channel closed before the sequence started")?;

    Runtime::new(core, rx, executor).run().await
}

/// Turn the first aborted sequence into an error.
pub fn ensure_success(summary: &RunSummary) -> Result<()> {
    for report in &summary.reports {
        for task in &report.tolerated_failures {
            warn!(sequence = %report.name, task = %task, "best-effort task failed");
        }
    }

    match summary.first_failure() {
        Some(report) => Err(AssetpipeError::SequenceAborted {
            sequence: report.name.clone(),
            task: report.failed_task.clone().unwrap_or_default(),
        }),
        None => Ok(()),
    }
}
