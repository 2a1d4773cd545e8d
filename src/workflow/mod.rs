//! Workflow Definition Module
//!
//! Data structures for declaring parameterized task graphs:
//!
//! - [`value`]: field value types and coercion
//! - [`parameters`]: typed parameter bags with reference tracking
//! - [`reference`]: symbolic cross-reference resolution
//! - [`wildcards`]: the wildcard registry and pattern helpers
//! - [`method`]: the method trait and the method registry
//! - [`rule`]: wildcard classification and run enumeration
//! - [`rules`]: the dependency-ordered rule collection
//! - [`workflow`]: the workflow entry point

pub mod method;
pub mod parameters;
pub mod reference;
pub mod rule;
pub mod rules;
pub mod value;
pub mod wildcards;
#[allow(clippy::module_inception)]
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

pub use method::{Method, MethodKind, MethodRegistry};
pub use parameters::{FieldSpec, Kwarg, Kwargs, ParamBag, Schema};
pub use reference::{Ref, RefObject};
pub use rule::{Rule, WildcardSets};
pub use rules::Rules;
pub use value::{Value, ValueKind};
pub use wildcards::Wildcards;
pub use workflow::{Workflow, WorkflowConfig};
