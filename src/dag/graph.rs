// src/dag/graph.rs

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{AssetpipeError, Result};
use crate::stages::Stage;

/// What happens to the surrounding sequence when a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// A failure aborts the remainder of the current sequence.
    #[default]
    Abort,
    /// A failure is logged; dependents and later steps continue.
    BestEffort,
}

/// One task definition as passed to [`TaskGraphBuilder::define`].
#[derive(Debug, Clone)]
struct TaskDef {
    name: TaskName,
    prerequisites: Vec<TaskName>,
    action: Arc<dyn Stage>,
    policy: FailurePolicy,
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct prerequisites: tasks that must complete before this one starts.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that list this one as a prerequisite.
    dependents: Vec<TaskName>,
    action: Arc<dyn Stage>,
    policy: FailurePolicy,
}

/// Collects task definitions and validates them into a [`TaskGraph`].
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    defs: Vec<TaskDef>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task whose failure aborts the current sequence.
    pub fn define(
        &mut self,
        name: &str,
        prerequisites: &[&str],
        action: Arc<dyn Stage>,
    ) -> &mut Self {
        self.define_with_policy(name, prerequisites, action, FailurePolicy::Abort)
    }

    /// Register a task whose failure is logged but never aborts a sequence.
    pub fn define_best_effort(
        &mut self,
        name: &str,
        prerequisites: &[&str],
        action: Arc<dyn Stage>,
    ) -> &mut Self {
        self.define_with_policy(name, prerequisites, action, FailurePolicy::BestEffort)
    }

    pub fn define_with_policy(
        &mut self,
        name: &str,
        prerequisites: &[&str],
        action: Arc<dyn Stage>,
        policy: FailurePolicy,
    ) -> &mut Self {
        self.defs.push(TaskDef {
            name: name.to_string(),
            prerequisites: prerequisites.iter().map(|s| s.to_string()).collect(),
            action,
            policy,
        });
        self
    }

    /// Validate and freeze the graph.
    ///
    /// Checks for:
    /// - an empty graph,
    /// - duplicate task names,
    /// - prerequisites naming undeclared tasks (or the task itself),
    /// - cycles.
    pub fn build(self) -> Result<TaskGraph> {
        if self.defs.is_empty() {
            return Err(AssetpipeError::ConfigError(
                "task graph must contain at least one task".to_string(),
            ));
        }

        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();
        let mut order: Vec<TaskName> = Vec::with_capacity(self.defs.len());

        // First pass: create nodes with their dependency lists.
        for def in self.defs {
            if nodes.contains_key(&def.name) {
                return Err(AssetpipeError::DuplicateTask(def.name));
            }
            order.push(def.name.clone());
            nodes.insert(
                def.name,
                DagNode {
                    deps: def.prerequisites,
                    dependents: Vec::new(),
                    action: def.action,
                    policy: def.policy,
                },
            );
        }

        validate_prerequisites(&order, &nodes)?;
        validate_acyclic(&order, &nodes)?;

        // Second pass: populate dependents based on deps, in definition order
        // so traversal is deterministic.
        for task_name in order.iter() {
            let deps = nodes
                .get(task_name)
                .map(|n| n.deps.clone())
                .unwrap_or_default();

            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(task_name.clone());
                }
            }
        }

        Ok(TaskGraph { nodes, order })
    }
}

fn validate_prerequisites(order: &[TaskName], nodes: &HashMap<TaskName, DagNode>) -> Result<()> {
    for name in order {
        let Some(node) = nodes.get(name) else {
            continue;
        };
        for dep in node.deps.iter() {
            if dep == name {
                return Err(AssetpipeError::ConfigError(format!(
                    "task '{name}' cannot list itself as a prerequisite"
                )));
            }
            if !nodes.contains_key(dep) {
                return Err(AssetpipeError::TaskNotFound(format!(
                    "'{dep}' (prerequisite of '{name}')"
                )));
            }
        }
    }
    Ok(())
}

fn validate_acyclic(order: &[TaskName], nodes: &HashMap<TaskName, DagNode>) -> Result<()> {
    // Edge direction: prerequisite -> task.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in order {
        graph.add_node(name.as_str());
    }

    for name in order {
        if let Some(node) = nodes.get(name) {
            for dep in node.deps.iter() {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(AssetpipeError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}

/// Immutable task graph, constructed once at startup.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: HashMap<TaskName, DagNode>,
    /// Definition order, used wherever iteration order is user-visible.
    order: Vec<TaskName>,
}

impl TaskGraph {
    pub fn builder() -> TaskGraphBuilder {
        TaskGraphBuilder::new()
    }

    /// All task names, in definition order.
    pub fn tasks(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Immediate prerequisites of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task (tasks that list this one as a prerequisite).
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn action_of(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.nodes.get(name).map(|n| Arc::clone(&n.action))
    }

    pub fn policy_of(&self, name: &str) -> Option<FailurePolicy> {
        self.nodes.get(name).map(|n| n.policy)
    }
}
