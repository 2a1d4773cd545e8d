//! Workflow Execution
//!
//! Direct execution of a built workflow: dependency-ordered rules, a
//! worker pool for enumerated runs, dry-run placeholder synthesis and
//! input/output checks around each method run.

pub mod engine;

pub use engine::{run_method_with_checks, Engine};
