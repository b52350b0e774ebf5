// tests/task_graph.rs

mod common;
use crate::common::builders::GraphBuilder;

use assetpipe::config::{ConfigFile, RawConfigFile};
use assetpipe::dag::{FailurePolicy, Sequence};
use assetpipe::errors::AssetpipeError;
use assetpipe::pipeline::{self, BUILD_TASKS, CORE_STYLES, HTML, IMAGES, SCRIPTS, STYLES};

fn default_config() -> ConfigFile {
    ConfigFile::try_from(RawConfigFile::default()).expect("default config is valid")
}

#[test]
fn builds_graph_and_records_edges_both_ways() {
    let graph = GraphBuilder::new()
        .task("a", &[])
        .task("b", &["a"])
        .task("c", &["a", "b"])
        .build();

    assert_eq!(graph.tasks().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    assert_eq!(graph.dependencies_of("c"), &["a".to_string(), "b".to_string()]);
    assert_eq!(graph.dependents_of("a"), &["b".to_string(), "c".to_string()]);
    assert!(graph.dependencies_of("missing").is_empty());
    assert!(graph.contains("b"));
    assert!(!graph.contains("d"));
}

#[test]
fn duplicate_task_is_rejected() {
    let result = GraphBuilder::new().task("a", &[]).task("a", &[]).try_build();

    match result {
        Err(AssetpipeError::DuplicateTask(name)) => assert_eq!(name, "a"),
        other => panic!("expected DuplicateTask, got {other:?}"),
    }
}

#[test]
fn unknown_prerequisite_is_rejected() {
    let result = GraphBuilder::new().task("x", &["ghost"]).try_build();

    match result {
        Err(AssetpipeError::TaskNotFound(msg)) => {
            assert!(msg.contains("'ghost'"), "message: {msg}");
            assert!(msg.contains("'x'"), "message: {msg}");
        }
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
}

#[test]
fn self_dependency_is_a_config_error() {
    let result = GraphBuilder::new().task("a", &["a"]).try_build();
    assert!(matches!(result, Err(AssetpipeError::ConfigError(_))));
}

#[test]
fn cycle_is_rejected() {
    let result = GraphBuilder::new()
        .task("a", &["c"])
        .task("b", &["a"])
        .task("c", &["b"])
        .try_build();

    match result {
        Err(err @ AssetpipeError::DagCycle(_)) => {
            assert!(err.to_string().contains("cycle detected"));
            assert_eq!(err.exit_code(), 2);
        }
        other => panic!("expected DagCycle, got {other:?}"),
    }
}

#[test]
fn empty_graph_is_rejected() {
    let result = GraphBuilder::new().try_build();
    assert!(matches!(result, Err(AssetpipeError::ConfigError(_))));
}

#[test]
fn best_effort_policy_is_recorded() {
    let graph = GraphBuilder::new()
        .best_effort("images", &[])
        .task("html", &["images"])
        .build();

    assert_eq!(graph.policy_of("images"), Some(FailurePolicy::BestEffort));
    assert_eq!(graph.policy_of("html"), Some(FailurePolicy::Abort));
    assert_eq!(graph.policy_of("nope"), None);
}

#[test]
fn pipeline_graph_has_expected_prerequisites() {
    let graph = pipeline::task_graph(&default_config()).expect("pipeline graph is valid");

    assert_eq!(graph.dependencies_of(STYLES), &[SCRIPTS.to_string()]);
    assert_eq!(
        graph.dependencies_of(HTML),
        &[CORE_STYLES.to_string(), STYLES.to_string(), IMAGES.to_string()]
    );
    assert_eq!(graph.dependencies_of(pipeline::SERVICE_WORKER).len(), 6);
    assert!(graph.dependencies_of(pipeline::CLEAN).is_empty());
    assert_eq!(graph.policy_of(IMAGES), Some(FailurePolicy::BestEffort));
    assert_eq!(graph.policy_of(SCRIPTS), Some(FailurePolicy::Abort));

    for task in BUILD_TASKS {
        assert!(graph.contains(task), "missing {task}");
    }
}

#[test]
fn sequence_display_groups_parallel_steps() {
    let seq = Sequence::new("demo").then(&["clean"]).then(&["a", "b"]).then(&[]).then(&["html"]);

    assert_eq!(seq.to_string(), "clean -> [a, b] -> html");
    assert_eq!(seq.steps().len(), 3);
    assert_eq!(seq.task_names(), vec!["clean", "a", "b", "html"]);
}

#[test]
fn sequence_validation_names_unknown_task() {
    let graph = GraphBuilder::new().task("clean", &[]).build();
    let seq = Sequence::new("broken").then(&["clean"]).then(&["lint"]);

    match seq.validate(&graph) {
        Err(AssetpipeError::TaskNotFound(msg)) => {
            assert!(msg.contains("'lint'"));
            assert!(msg.contains("'broken'"));
        }
        other => panic!("expected TaskNotFound, got {other:?}"),
    }
}

#[test]
fn single_step_sequence_skips_empty_batches() {
    assert!(Sequence::single_step("watch", Vec::new()).is_empty());

    let seq = Sequence::single_step("watch", vec!["styles".into(), "html".into()]);
    assert_eq!(seq.to_string(), "[styles, html]");
}
