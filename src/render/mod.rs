//! Workflow Serialization
//!
//! Two output formats for a built workflow:
//!
//! - [`description`]: the round-trip YAML description format
//! - [`snakemake`]: a generated Snakefile for batch execution

pub mod description;
pub mod snakemake;

pub use description::{from_description, load_workflow, save_workflow, to_description};
pub use snakemake::to_snakemake;
