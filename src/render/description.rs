//! Workflow Description Format
//!
//! Loads and saves workflow descriptions from YAML. A description holds
//! the workflow `name`, `config` and `wildcards` mappings and an ordered
//! `rules` list; each rule entry names a `method`, an optional `rule_id`
//! and its `kwargs`.
//!
//! Symbolic references are written back as strings, never as resolved
//! values, so a description survives a load/save cycle with intent intact.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::workflow::method::{method_kwargs, MethodRegistry};
use crate::workflow::value::Value;
use crate::workflow::workflow::{Workflow, WorkflowConfig};

#[derive(Debug, Serialize, Deserialize)]
struct RuleEntry {
    method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
    kwargs: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Description {
    name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    config: BTreeMap<String, serde_yaml::Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    wildcards: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

/// Serializes a workflow to its YAML description.
///
/// Rules are written in declaration order with symbolic kwargs; a rule id
/// equal to the method name is omitted.
pub fn to_description(workflow: &Workflow) -> Result<String> {
    let description = Description {
        name: workflow.name().to_string(),
        config: workflow
            .config()
            .to_map()
            .iter()
            .map(|(k, v)| (k.clone(), v.to_yaml()))
            .collect(),
        wildcards: workflow
            .wildcards()
            .iter()
            .map(|(name, values)| (name.to_string(), values.to_vec()))
            .collect(),
        rules: workflow
            .rules()
            .iter()
            .map(|rule| RuleEntry {
                method: rule.method().name().to_string(),
                rule_id: if rule.rule_id() == rule.method().name() {
                    None
                } else {
                    Some(rule.rule_id().to_string())
                },
                kwargs: method_kwargs(rule.method(), true)
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_yaml()))
                    .collect(),
            })
            .collect(),
    };
    Ok(serde_yaml::to_string(&description)?)
}

/// Builds a workflow from a YAML description, resolving references and
/// re-deriving the rule order as rules are added one at a time.
pub fn from_description(text: &str, registry: MethodRegistry) -> Result<Workflow> {
    let description: Description = serde_yaml::from_str(text)?;

    let config = description
        .config
        .into_iter()
        .map(|(k, v)| {
            Value::from_yaml(v)
                .map(|value| (k.clone(), value))
                .ok_or_else(|| {
                    WorkflowError::Description(format!("unsupported config value for '{}'", k))
                })
        })
        .collect::<Result<BTreeMap<String, Value>>>()?;

    let mut workflow = Workflow::new(description.name, WorkflowConfig::new(config), registry);
    for (name, values) in description.wildcards {
        workflow.set_wildcard(&name, values)?;
    }

    for (i, entry) in description.rules.into_iter().enumerate() {
        let kwargs = entry
            .kwargs
            .into_iter()
            .map(|(k, v)| {
                Value::from_yaml(v)
                    .map(|value| (k.clone(), value))
                    .ok_or_else(|| {
                        WorkflowError::Description(format!(
                            "rule {}: unsupported kwarg value for '{}'",
                            i + 1,
                            k
                        ))
                    })
            })
            .collect::<Result<BTreeMap<String, Value>>>()?;
        workflow.create_rule_from_kwargs(&entry.method, kwargs, entry.rule_id.as_deref())?;
    }
    Ok(workflow)
}

/// Loads a workflow description from a file.
pub fn load_workflow(path: &Path, registry: MethodRegistry) -> Result<Workflow> {
    info!("Loading workflow from: {}", path.display());
    let text = fs::read_to_string(path)?;
    let workflow = from_description(&text, registry)?;
    info!(
        "Workflow loaded: {} rules, {} wildcards",
        workflow.rules().len(),
        workflow.wildcards().len()
    );
    Ok(workflow)
}

/// Saves a workflow description to a file.
pub fn save_workflow(workflow: &Workflow, path: &Path) -> Result<()> {
    fs::write(path, to_description(workflow)?)?;
    info!("Workflow saved to: {}", path.display());
    Ok(())
}
