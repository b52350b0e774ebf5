// tests/pipeline_end_to_end.rs

mod common;
use crate::common::builders::{Project, ProjectBuilder};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::Arc;

use assetpipe::cli::{BumpArgs, Command};
use assetpipe::engine::RunSummary;
use assetpipe::errors::AssetpipeError;
use assetpipe::pipeline::{self, BUILD_TASKS, CLEAN};
use assetpipe::stages::manifest::{SERVICE_WORKER, collect_entries, render_service_worker};
use assetpipe::stages::static_files::StaticStage;
use assetpipe::stages::version::{Version, read_version};
use assetpipe::stages::{Stage, StageContext};
use assetpipe::types::{BumpLevel, Mode};

type TestResult = Result<(), Box<dyn Error>>;

async fn run(project: &Project, command: &Command, ctx: Arc<StageContext>) -> RunSummary {
    let graph = pipeline::task_graph(&project.config).expect("pipeline graph is valid");
    with_timeout(pipeline::run_sequence(
        Arc::new(graph),
        pipeline::sequence_for(command),
        ctx,
    ))
    .await
    .expect("runtime finished")
}

#[tokio::test]
async fn development_build_writes_every_output_with_source_maps() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();

    let summary = run(&project, &Command::Dev, project.context(Mode::Development)).await;
    pipeline::ensure_success(&summary)?;

    assert_eq!(summary.reports.len(), 1);
    let report = &summary.reports[0];
    assert_eq!(report.name, "dev");
    assert_eq!(report.executed.first().map(String::as_str), Some(CLEAN));
    for task in BUILD_TASKS {
        assert!(report.ran(task), "{task} did not run");
    }
    assert_eq!(report.executed.last().map(String::as_str), Some("service-worker"));

    let files: Vec<String> = project.output_snapshot().into_iter().map(|(rel, _)| rel).collect();
    assert_eq!(
        files,
        vec![
            "images/logo.svg",
            "images/sprite.svg",
            "index.html",
            "manifest.json",
            "scripts/app.min.js",
            "scripts/app.min.js.map",
            "styles/app.min.css",
            "styles/app.min.css.map",
            "styles/core.min.css",
            "styles/core.min.css.map",
            "sw.js",
        ]
    );

    // Component styles reach the main stylesheet through the temp directory.
    assert!(project.exists(".tmp/_button.scss"));
    assert!(project.read_output("styles/app.min.css").starts_with(".button {\n  border: none;\n}\n"));

    let index = project.read_output("index.html");
    assert!(index.contains("<title>Site 1.2.3</title>"));
    assert!(index.contains("<style>body {\n  color: #333;\n  margin: 0;\n}</style>"));
    assert!(index.contains("<symbol id=\"search\" viewBox=\"0 0 10 10\">"));
    assert!(index.contains("<link rel=\"stylesheet\" href=\"styles/app.min.css\">"));
    Ok(())
}

#[tokio::test]
async fn production_build_bumps_the_version_and_minifies() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();
    let command = Command::Build(BumpArgs::default());

    let summary = run(
        &project,
        &command,
        project.context_with_bump(command.mode(), command.bump_level()),
    )
    .await;
    pipeline::ensure_success(&summary)?;

    assert_eq!(read_version(&project.paths.metadata).await?, Version::new(1, 2, 4));
    assert!(project.read_output("index.html").contains("<title>Site 1.2.4</title>"));

    let snapshot = project.output_snapshot();
    assert!(snapshot.iter().all(|(rel, _)| !rel.ends_with(".map")));

    let css = project.read_output("styles/app.min.css");
    assert!(!css.contains('\n'));
    assert!(css.starts_with(".button{border:none}"));

    let js = project.read_output("scripts/app.min.js");
    assert!(js.starts_with("var AppBundle=(function(){"));
    assert!(!js.contains("sourceMappingURL"));
    assert!(!js.contains("\n  "));
    Ok(())
}

#[tokio::test]
async fn production_output_is_deterministic() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();

    let first = run(&project, &Command::Default, project.context(Mode::Production)).await;
    pipeline::ensure_success(&first)?;
    let before = project.output_snapshot();

    let second = run(&project, &Command::Default, project.context(Mode::Production)).await;
    pipeline::ensure_success(&second)?;

    assert_eq!(project.output_snapshot(), before);
    Ok(())
}

#[tokio::test]
async fn clean_only_removes_what_the_pipeline_owns() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();
    project.write("public/styles/old.css", "stale");
    project.write("public/stale.html", "stale");
    project.write("public/robots.txt", "User-agent: *\n");
    project.write("public/downloads/report.pdf", "pdf");
    project.write(".tmp/_gone.scss", ".gone { a: b; }");

    let summary = run(&project, &Command::Default, project.context(Mode::Development)).await;
    pipeline::ensure_success(&summary)?;

    assert!(!project.exists("public/styles/old.css"));
    assert!(!project.exists("public/stale.html"));
    assert!(!project.exists(".tmp/_gone.scss"));
    assert!(project.exists("public/robots.txt"));
    assert!(project.exists("public/downloads/report.pdf"));
    assert!(!project.read_output("styles/app.min.css").contains(".gone"));
    Ok(())
}

#[tokio::test]
async fn service_worker_precaches_cacheable_outputs() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().build();

    let summary = run(&project, &Command::Default, project.context(Mode::Production)).await;
    pipeline::ensure_success(&summary)?;

    let entries = collect_entries(&project.paths.output)?;
    let urls: Vec<&str> = entries.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "index.html",
            "scripts/app.min.js",
            "styles/app.min.css",
            "styles/core.min.css",
        ]
    );

    let index = std::fs::read(project.output("index.html"))?;
    assert_eq!(entries[0].revision, blake3::hash(&index).to_hex().to_string());

    let sw = project.read_output(SERVICE_WORKER);
    assert_eq!(sw, render_service_worker(&entries));
    assert!(sw.contains(&format!("  [\"index.html\", \"{}\"]", entries[0].revision)));
    assert!(sw.contains("var CACHE_NAME = 'assetpipe-"));
    Ok(())
}

#[test]
fn cache_name_changes_with_content() {
    let entry = |rev: &str| assetpipe::stages::manifest::PrecacheEntry {
        url: "index.html".to_string(),
        revision: rev.to_string(),
    };
    let cache_line = |sw: String| {
        sw.lines()
            .find(|l| l.starts_with("var CACHE_NAME"))
            .map(str::to_string)
            .unwrap_or_default()
    };

    let a = cache_line(render_service_worker(&[entry("aaaa")]));
    let b = cache_line(render_service_worker(&[entry("bbbb")]));
    assert_ne!(a, b);
    assert_eq!(a.len(), "var CACHE_NAME = 'assetpipe-0123456789abcdef';".len());
    assert!(render_service_worker(&[]).contains("var PRECACHE = [\n\n];"));
}

#[tokio::test]
async fn missing_static_files_are_skipped_with_a_diagnostic() -> TestResult {
    let project = ProjectBuilder::site().file("src/robots.txt", "User-agent: *\n").build();
    let ctx = project.context(Mode::Development);

    let stage = StaticStage::new(vec![
        "manifest.json".to_string(),
        "robots.txt".to_string(),
        "humans.txt".to_string(),
    ]);
    let report = stage.run(&ctx).await?;

    assert_eq!(report.artifacts.len(), 2);
    assert_eq!(project.read_output("manifest.json"), "{\"name\": \"Site\"}\n");
    assert_eq!(project.read_output("robots.txt"), "User-agent: *\n");

    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].path, Some(project.path("src/humans.txt")));
    assert_eq!(report.diagnostics[0].message, "static file does not exist; skipped");
    Ok(())
}

#[tokio::test]
async fn fatal_stage_failure_aborts_dependents() -> TestResult {
    init_tracing();
    let project = ProjectBuilder::site().without("src/assets/scripts/app.js").build();

    let summary = run(&project, &Command::Default, project.context(Mode::Development)).await;

    let report = &summary.reports[0];
    assert_eq!(report.failed_task.as_deref(), Some("scripts"));
    for dependent in ["styles", "html", "service-worker"] {
        assert!(!report.ran(dependent), "{dependent} ran after scripts failed");
    }
    assert!(!project.output("sw.js").exists());

    match pipeline::ensure_success(&summary) {
        Err(AssetpipeError::SequenceAborted { sequence, task }) => {
            assert_eq!(sequence, "default");
            assert_eq!(task, "scripts");
        }
        other => panic!("expected SequenceAborted, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn bump_sequence_only_touches_metadata() -> TestResult {
    let project = ProjectBuilder::site().build();
    let command = Command::Bump(BumpArgs {
        minor: false,
        major: true,
    });

    let summary = run(
        &project,
        &command,
        project.context_with_bump(command.mode(), BumpLevel::Major),
    )
    .await;
    pipeline::ensure_success(&summary)?;

    assert_eq!(summary.reports[0].executed, vec!["bump".to_string()]);
    assert_eq!(read_version(&project.paths.metadata).await?, Version::new(2, 0, 0));
    assert!(!project.paths.output.exists());
    Ok(())
}
