// tests/runtime_fake_executor.rs

mod common;
use crate::common::builders::GraphBuilder;
use crate::common::fake_executor::{FakeExecutor, TraceEvent};
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use assetpipe::cli::{BumpArgs, Command};
use assetpipe::config::{ConfigFile, RawConfigFile};
use assetpipe::dag::{Scheduler, Sequence, TaskGraph};
use assetpipe::engine::{
    CoreRuntime, ReloadSignal, RunSummary, Runtime, RuntimeEvent, RuntimeOptions, TaskOutcome,
    TriggerReason, TriggerWhileRunningBehaviour,
};
use assetpipe::pipeline;

type TestResult = Result<(), Box<dyn Error>>;

fn pipeline_graph() -> TaskGraph {
    let cfg = ConfigFile::try_from(RawConfigFile::default()).expect("default config");
    pipeline::task_graph(&cfg).expect("pipeline graph")
}

fn one_shot_core(graph: TaskGraph) -> CoreRuntime {
    CoreRuntime::new(
        Scheduler::new(Arc::new(graph)),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: true,
        },
    )
}

fn position(list: &[String], task: &str) -> usize {
    list.iter()
        .position(|t| t == task)
        .unwrap_or_else(|| panic!("{task} missing from {list:?}"))
}

async fn run_with(
    graph: TaskGraph,
    events: Vec<RuntimeEvent>,
    configure: impl FnOnce(FakeExecutor) -> FakeExecutor,
) -> Result<(RunSummary, Vec<String>, Vec<TraceEvent>), Box<dyn Error>> {
    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = configure(FakeExecutor::new(tx.clone(), Arc::clone(&executed)));
    let trace = executor.trace();

    for event in events {
        tx.send(event).await?;
    }

    let runtime = Runtime::new(one_shot_core(graph), rx, executor);
    let summary = with_timeout(runtime.run()).await?;

    let executed = executed.lock().unwrap().clone();
    let trace = trace.lock().unwrap().clone();
    Ok((summary, executed, trace))
}

fn requested(sequence: Sequence) -> RuntimeEvent {
    RuntimeEvent::SequenceRequested {
        sequence,
        reason: TriggerReason::Manual,
    }
}

#[tokio::test]
async fn runs_a_simple_chain_to_completion() -> TestResult {
    init_tracing();

    let graph = GraphBuilder::new().task("A", &[]).task("B", &["A"]).build();
    let seq = Sequence::new("chain").then(&["B"]);

    let (summary, executed, _) = run_with(graph, vec![requested(seq)], |e| e).await?;

    assert_eq!(executed, vec!["A".to_string(), "B".to_string()]);
    assert!(summary.is_success());
    assert_eq!(summary.reports.len(), 1);
    Ok(())
}

#[tokio::test]
async fn prerequisites_finish_before_dependents_start() -> TestResult {
    init_tracing();

    let seq = pipeline::sequence_for(&Command::Default);
    let (summary, executed, trace) = run_with(pipeline_graph(), vec![requested(seq)], |e| {
        e.with_delay("scripts", Duration::from_millis(50))
            .with_delay("core-styles", Duration::from_millis(20))
    })
    .await?;

    assert!(summary.is_success());
    assert_eq!(executed.len(), 8);
    assert_eq!(executed[0], "clean");

    let graph = pipeline_graph();
    for task in graph.tasks() {
        let Some(started) = trace.iter().position(|e| *e == TraceEvent::Started(task.to_string())) else {
            continue;
        };
        for dep in graph.dependencies_of(task) {
            let finished = trace
                .iter()
                .position(|e| *e == TraceEvent::Finished(dep.clone()))
                .unwrap_or_else(|| panic!("{dep} never finished"));
            assert!(finished < started, "{task} started before {dep} finished: {trace:?}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn queued_change_runs_after_initial_build_with_one_reload() -> TestResult {
    init_tracing();

    let events = vec![
        requested(pipeline::sequence_for(&Command::Default)),
        RuntimeEvent::TasksTriggered {
            tasks: vec!["styles".into(), "html".into()],
            reason: TriggerReason::FileWatch,
        },
    ];
    let (summary, executed, _) = run_with(pipeline_graph(), events, |e| e).await?;

    assert_eq!(summary.reports.len(), 2);
    assert_eq!(summary.reports[1].executed, vec!["styles", "html"]);
    assert_eq!(summary.reloads, 1);
    assert_eq!(&executed[executed.len() - 2..], &["styles".to_string(), "html".to_string()]);
    Ok(())
}

#[tokio::test]
async fn fatal_failure_aborts_the_sequence() -> TestResult {
    init_tracing();

    let seq = pipeline::sequence_for(&Command::Build(BumpArgs::default()));
    let (summary, executed, _) =
        run_with(pipeline_graph(), vec![requested(seq)], |e| e.failing("scripts")).await?;

    let failure = summary.first_failure().expect("sequence should be aborted");
    assert_eq!(failure.failed_task.as_deref(), Some("scripts"));
    assert!(!executed.contains(&"styles".to_string()));
    assert!(!executed.contains(&"html".to_string()));
    assert!(!executed.contains(&"service-worker".to_string()));
    assert!(position(&executed, "version") < position(&executed, "scripts"));

    match pipeline::ensure_success(&summary) {
        Err(err) => {
            assert_eq!(err.exit_code(), 1);
            assert!(err.to_string().contains("'scripts'"));
        }
        Ok(()) => panic!("expected SequenceAborted"),
    }
    Ok(())
}

#[tokio::test]
async fn best_effort_failure_is_tolerated() -> TestResult {
    init_tracing();

    let seq = pipeline::sequence_for(&Command::Default);
    let (summary, executed, _) =
        run_with(pipeline_graph(), vec![requested(seq)], |e| e.failing("images")).await?;

    assert!(summary.is_success());
    assert_eq!(summary.reports[0].tolerated_failures, vec!["images"]);
    assert!(position(&executed, "images") < position(&executed, "html"));
    assert!(pipeline::ensure_success(&summary).is_ok());
    Ok(())
}

#[tokio::test]
async fn recovered_stage_does_not_block_dependents() -> TestResult {
    init_tracing();

    let seq = pipeline::sequence_for(&Command::Default);
    let (summary, executed, _) = run_with(pipeline_graph(), vec![requested(seq)], |e| {
        e.with_outcome("styles", TaskOutcome::Recovered { diagnostics: 3 })
    })
    .await?;

    assert!(summary.is_success());
    assert!(position(&executed, "styles") < position(&executed, "html"));
    Ok(())
}

#[tokio::test]
async fn reload_signal_is_broadcast_after_incremental_run() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(64);
    let (reload_tx, mut reload_rx) = broadcast::channel::<ReloadSignal>(4);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed));

    tx.send(RuntimeEvent::TasksTriggered {
        tasks: vec!["static".into()],
        reason: TriggerReason::FileWatch,
    })
    .await?;

    let runtime = Runtime::new(one_shot_core(pipeline_graph()), rx, executor).with_reload(reload_tx);
    let summary = with_timeout(runtime.run()).await?;

    assert_eq!(summary.reloads, 1);
    assert_eq!(reload_rx.try_recv()?, ReloadSignal { generation: 1 });
    assert_eq!(*executed.lock().unwrap(), vec!["static".to_string()]);
    Ok(())
}

#[tokio::test]
async fn shutdown_event_ends_a_watching_runtime() -> TestResult {
    init_tracing();

    let (tx, rx) = mpsc::channel::<RuntimeEvent>(8);
    let executed = Arc::new(Mutex::new(Vec::new()));
    let executor = FakeExecutor::new(tx.clone(), Arc::clone(&executed));
    let core = CoreRuntime::new(
        Scheduler::new(Arc::new(pipeline_graph())),
        TriggerWhileRunningBehaviour::Queue,
        1,
        RuntimeOptions {
            exit_when_idle: false,
        },
    );

    tx.send(RuntimeEvent::ShutdownRequested).await?;
    let summary = with_timeout(Runtime::new(core, rx, executor).run()).await?;

    assert!(summary.reports.is_empty());
    assert!(executed.lock().unwrap().is_empty());
    Ok(())
}
