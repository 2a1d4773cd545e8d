//! Cross-Reference Resolution
//!
//! A reference is a dot-separated symbolic path that is resolved eagerly,
//! at rule declaration time, while retaining the symbolic string for
//! serialization. Supported forms:
//!
//! - `$config.<key>[.<key>...]` - a (nested) workflow config entry
//! - `$rules.<rule_id>.<component>.<field>` - a field of a previous rule,
//!   where `<component>` is one of `input`, `output` or `params`
//! - `$wildcards.<name>` - the value list bound to a wildcard
//!
//! A live object (a method added to the workflow, the workflow config, or
//! the workflow itself) can stand in for the leading path segment; the
//! workflow's identity registry recovers its symbolic name.

use crate::error::{Result, WorkflowError};
use crate::workflow::method::Method;
use crate::workflow::value::Value;
use crate::workflow::workflow::{Workflow, WorkflowConfig};

const COMPONENTS: [&str; 3] = ["input", "output", "params"];

/// A resolved cross-reference: symbolic path plus materialized value.
#[derive(Debug, Clone)]
pub struct Ref {
    reference: String,
    value: Value,
    is_expand_field: bool,
}

/// A live object standing in for the leading segment of a reference.
pub enum RefObject<'a> {
    Method(&'a dyn Method),
    Config(&'a WorkflowConfig),
    Workflow(&'a Workflow),
}

impl Ref {
    /// Resolves a symbolic reference string against a workflow.
    pub fn new(reference: &str, workflow: &Workflow) -> Result<Self> {
        let keys: Vec<&str> = reference.split('.').collect();
        match keys[0] {
            "$config" => Self::resolve_config(reference, &keys, workflow),
            "$rules" => Self::resolve_rule(reference, &keys, workflow),
            "$wildcards" => Self::resolve_wildcard(reference, &keys, workflow),
            _ => Err(invalid(
                reference,
                "should start with '$config', '$rules' or '$wildcards'",
            )),
        }
    }

    /// Resolves a reference given as a live object plus a trailing path.
    ///
    /// The object is looked up in the workflow's identity registry to
    /// recover its symbolic name, then resolution re-enters the string
    /// forms above. For a method, `tail` is `<component>.<field>`; for the
    /// config, the config key path; for the workflow itself, a full path
    /// such as `config.<key>` or `wildcards.<name>`.
    pub fn from_object(object: RefObject, tail: &str, workflow: &Workflow) -> Result<Self> {
        let reference = match object {
            RefObject::Workflow(wf) => {
                if !std::ptr::eq(wf, workflow) {
                    return Err(invalid(tail, "workflow object is not this workflow"));
                }
                format!("${}", tail)
            }
            RefObject::Config(config) => {
                if !std::ptr::eq(config, workflow.config()) {
                    return Err(invalid(tail, "config object not added to the workflow"));
                }
                format!("$config.{}", tail)
            }
            RefObject::Method(method) => {
                let symbol = workflow.method_symbol(method).ok_or_else(|| {
                    invalid(tail, "method not added to the workflow")
                })?;
                format!("{}.{}", symbol, tail)
            }
        };
        Self::new(&reference, workflow)
    }

    /// Creates a pre-resolved reference from a known symbolic string and
    /// value, without touching a workflow.
    pub fn literal(reference: impl Into<String>, value: Value) -> Self {
        Self {
            reference: reference.into(),
            value,
            is_expand_field: false,
        }
    }

    /// The symbolic reference string.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The materialized value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// True when the reference targets a field populated by an expand-kind
    /// wildcard. The renderer emits such fields as literals rather than
    /// backend references.
    pub fn is_expand_field(&self) -> bool {
        self.is_expand_field
    }

    fn resolve_config(reference: &str, keys: &[&str], workflow: &Workflow) -> Result<Self> {
        if keys.len() < 2 {
            return Err(invalid(
                reference,
                "a config reference should be in the form $config.<key>",
            ));
        }
        let value = workflow.config().get_path(&keys[1..]).ok_or_else(|| {
            invalid(reference, "key not found in workflow config")
        })?;
        Ok(Self {
            reference: reference.to_string(),
            value: value.clone(),
            is_expand_field: false,
        })
    }

    fn resolve_rule(reference: &str, keys: &[&str], workflow: &Workflow) -> Result<Self> {
        if keys.len() != 4 || !COMPONENTS.contains(&keys[2]) {
            return Err(invalid(
                reference,
                "a rule reference should be in the form \
                 $rules.<rule_id>.<component>.<field>, where <component> is \
                 one of input, output or params",
            ));
        }
        let (rule_id, component, field) = (keys[1], keys[2], keys[3]);
        let rule = workflow.rules().get(rule_id)?;
        let bag = rule.bag(component).ok_or_else(|| {
            invalid(reference, "component not found")
        })?;
        // the field's already-resolved value; no transitive re-resolution
        let value = bag.get(field).ok_or_else(|| {
            invalid(
                reference,
                &format!("field '{}' not found in {}.{}", field, rule_id, component),
            )
        })?;
        let is_expand_field = rule
            .wildcards()
            .expand
            .iter()
            .any(|wc| rule.fields_of(wc).contains(&field.to_string()));
        Ok(Self {
            reference: reference.to_string(),
            value: value.clone(),
            is_expand_field,
        })
    }

    fn resolve_wildcard(reference: &str, keys: &[&str], workflow: &Workflow) -> Result<Self> {
        if keys.len() != 2 {
            return Err(invalid(
                reference,
                "a wildcard reference should be in the form $wildcards.<name>",
            ));
        }
        let values = workflow.wildcards().get(keys[1])?;
        Ok(Self {
            reference: reference.to_string(),
            value: Value::from(values.to_vec()),
            is_expand_field: false,
        })
    }
}

fn invalid(reference: &str, reason: &str) -> WorkflowError {
    WorkflowError::InvalidReference {
        reference: reference.to_string(),
        reason: reason.to_string(),
    }
}
