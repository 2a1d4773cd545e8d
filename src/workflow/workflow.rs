//! Workflow Definition
//!
//! The workflow is the user entry point. It owns:
//! - the configuration mapping
//! - the wildcard registry
//! - the method registry (handed in by the process entry point)
//! - the ordered rule collection
//! - an identity table mapping live method objects to their symbolic names
//!
//! Config and bound wildcards are fixed once set; the only growth after
//! construction is binding not-yet-bound wildcard names and adding rules.

use std::collections::{BTreeMap, HashMap};

use log::info;

use crate::error::Result;
use crate::execution::Engine;
use crate::workflow::method::{Method, MethodRegistry};
use crate::workflow::parameters::{Kwarg, Kwargs};
use crate::workflow::reference::Ref;
use crate::workflow::rule::Rule;
use crate::workflow::rules::Rules;
use crate::workflow::value::Value;
use crate::workflow::wildcards::Wildcards;

/// Workflow configuration: a nested, read-only mapping.
#[derive(Debug, Clone, Default)]
pub struct WorkflowConfig {
    values: BTreeMap<String, Value>,
}

impl WorkflowConfig {
    pub fn new(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Walks a nested key path. Returns `None` when a key is missing at
    /// any level.
    pub fn get_path(&self, keys: &[&str]) -> Option<&Value> {
        let (first, rest) = keys.split_first()?;
        let mut current = self.values.get(*first)?;
        for key in rest {
            current = current.as_map()?.get(*key)?;
        }
        Some(current)
    }

    pub fn to_map(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A workflow instance: configuration, wildcards and an ordered set of
/// rules that can be run directly or parsed to a workflow engine.
///
/// # Example
///
/// ```no_run
/// use hydroweave::workflow::{MethodRegistry, Workflow, WorkflowConfig};
/// use hydroweave::methods::shell::ShellMethod;
///
/// let mut registry = MethodRegistry::new();
/// ShellMethod::register(&mut registry);
///
/// let mut wf = Workflow::new("flood_risk", WorkflowConfig::empty(), registry);
/// wf.set_wildcard("event", vec!["p_rp50".to_string(), "p_rp100".to_string()]).unwrap();
/// ```
pub struct Workflow {
    name: String,
    config: WorkflowConfig,
    wildcards: Wildcards,
    rules: Rules,
    registry: MethodRegistry,
    // method object address -> "$rules.<rule_id>"; boxed methods do not
    // move, so the address is stable for the workflow's lifetime
    identities: HashMap<usize, String>,
}

impl Workflow {
    /// Creates a workflow with a config and the method registry to build
    /// rules from.
    pub fn new(name: impl Into<String>, config: WorkflowConfig, registry: MethodRegistry) -> Self {
        Self {
            name: name.into(),
            config,
            wildcards: Wildcards::new(),
            rules: Rules::new(),
            registry,
            identities: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn wildcards(&self) -> &Wildcards {
        &self.wildcards
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Binds a wildcard name to a value list.
    pub fn set_wildcard(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        self.wildcards.set(name, values)
    }

    /// Creates a rule from a method instance and inserts it in dependency
    /// order. The rule id defaults to the method name.
    pub fn create_rule(&mut self, method: Box<dyn Method>, rule_id: Option<&str>) -> Result<&Rule> {
        let rule = Rule::new(method, &mut self.wildcards, rule_id)?;
        let rule_id = rule.rule_id().to_string();
        self.rules.insert(rule)?;

        let rule = self.rules.get(&rule_id)?;
        self.identities
            .insert(object_key(rule.method()), format!("$rules.{}", rule_id));
        info!("Added rule '{}' ({} runs)", rule_id, rule.n_runs());
        self.rules.get(&rule_id)
    }

    /// Creates a rule for the named method with keyword arguments.
    ///
    /// String values starting with `$` are resolved as references before
    /// the method is built.
    pub fn create_rule_from_kwargs(
        &mut self,
        method: &str,
        kwargs: BTreeMap<String, Value>,
        rule_id: Option<&str>,
    ) -> Result<&Rule> {
        let mut resolved: Kwargs = BTreeMap::new();
        for (key, value) in kwargs {
            let kwarg = match &value {
                Value::String(s) if s.starts_with('$') => Kwarg::Ref(Ref::new(s, self)?),
                _ => Kwarg::Value(value),
            };
            resolved.insert(key, kwarg);
        }
        let method = self.registry.build(method, resolved)?;
        self.create_rule(method, rule_id)
    }

    /// Gets a cross-reference to previously set rule parameters, workflow
    /// config or wildcards.
    pub fn get_ref(&self, reference: &str) -> Result<Ref> {
        Ref::new(reference, self)
    }

    /// The symbolic name registered for a live method object, if the
    /// method was added to this workflow.
    pub(crate) fn method_symbol(&self, method: &dyn Method) -> Option<String> {
        self.identities.get(&object_key(method)).cloned()
    }

    /// Runs the workflow rules root-first in the maintained order.
    ///
    /// Within one rule, enumerated runs are distributed over at most
    /// `max_workers` threads; 1 forces sequential execution.
    pub fn run(&self, max_workers: usize) -> Result<()> {
        let mut engine = Engine::new(self);
        engine.set_max_workers(max_workers);
        engine.run()
    }

    /// Dry-runs the workflow: checks inputs and synthesizes empty
    /// placeholder files without invoking any method logic.
    pub fn dryrun(&self, missing_file_error: bool) -> Result<()> {
        let mut engine = Engine::new(self);
        engine.set_dry_run(true);
        engine.set_strict_missing(missing_file_error);
        engine.run()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("wildcards", &self.wildcards.names())
            .field("rules", &self.rules.order())
            .finish()
    }
}

fn object_key(method: &dyn Method) -> usize {
    method as *const dyn Method as *const () as usize
}
