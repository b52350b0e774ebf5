// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`graph`] holds the validated directed acyclic graph of tasks.
//! - [`scheduler`] contains the per-run state machine that decides
//!   which tasks are ready to run, and when dependents can be scheduled.
//! - [`sequence`] describes ordered, step-wise task sequences.
//! - [`task_info`] provides task metadata and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] manages per-run state transitions.

pub mod graph;
pub mod scheduler;
pub mod scheduler_step;
pub mod sequence;
pub mod state_manager;
pub mod task_info;

pub use graph::{FailurePolicy, TaskGraph, TaskGraphBuilder};
pub use scheduler::Scheduler;
pub use scheduler_step::SchedulerStep;
pub use sequence::Sequence;
pub use task_info::{ScheduledTask, TaskRunState};
