// tests/scheduler_properties.rs

mod common;
use crate::common::builders::GraphBuilder;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;

use assetpipe::dag::{Scheduler, TaskGraph, TaskRunState};
use assetpipe::engine::TaskOutcome;

/// Random acyclic graphs: `task_i` may only depend on `task_j` with `j < i`.
/// Roughly one task in four is best-effort.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = TaskGraph> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), num_tasks),
            proptest::collection::vec(0..4u8, num_tasks),
        )
            .prop_map(|(raw_deps, policies)| {
                let mut builder = GraphBuilder::new();
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let name = format!("task_{i}");
                    let deps: Vec<String> = if i == 0 {
                        Vec::new()
                    } else {
                        potential
                            .into_iter()
                            .map(|d| d % i)
                            .collect::<HashSet<_>>()
                            .into_iter()
                            .map(|d| format!("task_{d}"))
                            .collect()
                    };
                    let deps: Vec<&str> = deps.iter().map(String::as_str).collect();

                    builder = if policies[i] == 0 {
                        builder.best_effort(&name, &deps)
                    } else {
                        builder.task(&name, &deps)
                    };
                }
                builder.build()
            })
    })
}

/// Drive one run to completion, completing tasks FIFO. Returns the order in
/// which tasks were dispatched.
fn simulate_run(
    scheduler: &mut Scheduler,
    requests: &[String],
    failing: &HashSet<String>,
) -> Result<Vec<String>, TestCaseError> {
    let mut dispatched = Vec::new();
    let mut running: VecDeque<String> = VecDeque::new();

    scheduler.start_new_run();

    let mut accept = |scheduler: &Scheduler,
                      tasks: Vec<String>,
                      running: &mut VecDeque<String>|
     -> Result<(), TestCaseError> {
        for task in tasks {
            prop_assert!(
                !dispatched.contains(&task),
                "{task} dispatched twice in one run"
            );
            for dep in scheduler.graph().dependencies_of(&task) {
                let state = scheduler.run_state_of(dep);
                prop_assert!(
                    !matches!(state, Some(TaskRunState::Pending | TaskRunState::Running)),
                    "{task} dispatched while prerequisite {dep} is {state:?}"
                );
            }
            dispatched.push(task.clone());
            running.push_back(task);
        }
        Ok(())
    };

    for task in requests {
        let ready = scheduler
            .handle_request(task)
            .into_iter()
            .map(|t| t.name)
            .collect();
        accept(scheduler, ready, &mut running)?;
    }

    let mut steps = 0;
    while let Some(task) = running.pop_front() {
        steps += 1;
        prop_assert!(steps < 1000, "simulation did not converge");

        let outcome = if failing.contains(&task) {
            TaskOutcome::Failed(format!("{task} failed"))
        } else {
            TaskOutcome::Success
        };
        let ready = scheduler
            .handle_completion(&task, outcome)
            .into_iter()
            .map(|t| t.name)
            .collect();
        accept(scheduler, ready, &mut running)?;
    }

    Ok(dispatched)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn every_run_terminates_and_respects_prerequisites(
        graph in dag_strategy(10),
        first in proptest::collection::vec(0..10usize, 1..5),
        second in proptest::collection::vec(0..10usize, 1..5),
        failing in proptest::collection::vec(0..10usize, 0..4),
    ) {
        let graph = Arc::new(graph);
        let names: Vec<String> = graph.tasks().map(str::to_string).collect();
        let pick = |indices: &[usize]| -> Vec<String> {
            indices.iter().map(|i| names[i % names.len()].clone()).collect()
        };
        let failing: HashSet<String> = pick(&failing).into_iter().collect();

        let mut scheduler = Scheduler::new(Arc::clone(&graph));

        // Two consecutive runs so the second one exercises run history.
        for requests in [pick(&first), pick(&second)] {
            let dispatched = simulate_run(&mut scheduler, &requests, &failing)?;

            prop_assert!(scheduler.is_idle(), "run left tasks pending: {:?}", scheduler.tasks_in_current_run());

            for task in &requests {
                let state = scheduler.run_state_of(task);
                prop_assert!(
                    matches!(state, Some(TaskRunState::DoneSuccess | TaskRunState::DoneFailed)),
                    "requested task {task} ended as {state:?}"
                );
            }

            // A task that ran successfully had no fatally failed prerequisite.
            for task in &dispatched {
                if scheduler.run_state_of(task) != Some(TaskRunState::DoneSuccess) {
                    continue;
                }
                for dep in graph.dependencies_of(task) {
                    let dep_failed = scheduler.run_state_of(dep) == Some(TaskRunState::DoneFailed);
                    let tolerated = scheduler.is_best_effort(dep) == Some(true);
                    prop_assert!(!dep_failed || tolerated, "{task} ran after {dep} failed");
                }
            }
        }
    }
}
