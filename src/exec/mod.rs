// src/exec/mod.rs

//! Stage execution layer.
//!
//! This module runs the stage behind each scheduled task on the Tokio
//! runtime and reports back to the orchestration runtime via
//! `RuntimeEvent`s.
//!
//! - [`stage_runner`] runs a single stage invocation and maps its typed
//!   result to a `TaskOutcome`.
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `StageExecutor` that the runtime uses in production, and which tests
//!   can replace with a fake implementation.

pub mod backend;
pub mod stage_runner;

pub use backend::{ExecutorBackend, StageExecutor};
pub use stage_runner::run_stage;
