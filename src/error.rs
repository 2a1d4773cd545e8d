//! Workflow Error Types
//!
//! A single crate-wide error enum covering:
//! - Construction errors (references, fields, rules, wildcards)
//! - Pre-run errors (missing input files)
//! - Run errors (method failures)
//! - Post-run errors (missing output files)
//!
//! Errors that concern a single field carry the fully-qualified field path
//! in the form `rule_id.component.field`.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("invalid reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("duplicate field '{field}' in {scope}")]
    DuplicateField { scope: String, field: String },

    #[error("unknown field '{field}' in {scope}")]
    UnknownField { scope: String, field: String },

    #[error("field '{field}' expects a {expected} value, got {actual}")]
    FieldType {
        field: String,
        expected: &'static str,
        actual: String,
    },

    #[error("missing required field '{field}' in {scope}")]
    MissingField { scope: String, field: String },

    #[error("rule '{0}' already exists")]
    DuplicateRule(String),

    #[error("rule '{0}' not found")]
    UnknownRule(String),

    #[error("wildcard '{name}' already exists with different values")]
    WildcardConflict { name: String },

    #[error("wildcard '{name}' not found. Available wildcards are: {known}")]
    UnknownWildcard { name: String, known: String },

    #[error("rule '{rule}': {detail}")]
    WildcardKindMismatch { rule: String, detail: String },

    #[error("cyclic dependency detected while inserting rule '{0}'")]
    CyclicDependency(String),

    #[error("method '{0}' is not registered")]
    UnknownMethod(String),

    #[error("input file {field} not found: {path}")]
    MissingInput { field: String, path: PathBuf },

    #[error("output file {field} not created: {path}")]
    MissingOutput { field: String, path: PathBuf },

    #[error("method '{method}' failed: {reason}")]
    RunFailed { method: String, reason: String },

    #[error("invalid workflow description: {0}")]
    Description(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
