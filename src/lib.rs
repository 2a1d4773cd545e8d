//! Hydroweave - Parameterized Task-Graph Engine
//!
//! A library for declaring scientific workflows as typed computational
//! steps ("methods") wired into a dependency graph, with symbolic
//! cross-references between steps and named placeholders ("wildcards")
//! that expand a step into one run per value.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: parameter bags, references, wildcards, rules and the
//!   workflow entry point
//! - [`execution`]: direct execution with a per-rule worker pool
//! - [`render`]: the YAML description format and Snakefile generation
//! - [`methods`]: the built-in generic shell method
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use hydroweave::methods::ShellMethod;
//! use hydroweave::render::{load_workflow, to_snakemake};
//! use hydroweave::workflow::MethodRegistry;
//!
//! fn main() -> hydroweave::error::Result<()> {
//!     let mut registry = MethodRegistry::new();
//!     ShellMethod::register(&mut registry);
//!
//!     // Load a workflow description and emit a Snakefile
//!     let workflow = load_workflow(Path::new("workflow.yml"), registry)?;
//!     to_snakemake(&workflow, Path::new("Snakefile"))?;
//!
//!     // Or run it directly
//!     workflow.run(4)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod execution;
pub mod methods;
pub mod render;
pub mod workflow;

// Re-export commonly used types
pub use error::{Result, WorkflowError};
pub use execution::Engine;
pub use workflow::{Method, MethodRegistry, Workflow, WorkflowConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "hydroweave";
