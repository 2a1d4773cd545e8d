//! Method Trait and Registry
//!
//! A method is where the actual work of a rule happens. The engine treats
//! every method as a black box with three parameter bags (input, output,
//! params) and a `run()` whose only side effect is writing files at exactly
//! its declared output paths.
//!
//! Methods are built by name through an explicit [`MethodRegistry`],
//! populated by a registration step at process startup. Rule execution uses
//! the same factories to rebuild one concrete method per enumerated run.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, WorkflowError};
use crate::workflow::parameters::{Kwarg, Kwargs, ParamBag};
use crate::workflow::value::Value;

/// How a method relates to wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// One run per explode-wildcard combination (n:n).
    Standard,
    /// One run produces all values of its declared wildcards (1:n).
    Expand,
    /// One run aggregates all values of its input wildcards (n:1).
    Reduce,
}

/// A black-box computational step.
///
/// Field names must be unique across the three bags; the flattened keyword
/// view relies on it. Expand methods declare their wildcard value lists up
/// front, before `run()` ever executes.
pub trait Method: Send + Sync + std::fmt::Debug {
    /// The registered method name.
    fn name(&self) -> &str;

    fn kind(&self) -> MethodKind {
        MethodKind::Standard
    }

    fn input(&self) -> &ParamBag;

    fn output(&self) -> &ParamBag;

    fn params(&self) -> &ParamBag;

    /// Declared wildcard name -> output value list, for expand methods.
    fn expand_values(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        None
    }

    /// Executes the step. Must write every declared output path.
    fn run(&self) -> Result<()>;
}

/// Checks that field names are unique across a method's three bags.
pub fn check_unique_fields(method: &dyn Method) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::new();
    for (component, bag) in bags(method) {
        for (name, _) in bag.iter() {
            if !seen.insert(name) {
                return Err(WorkflowError::DuplicateField {
                    scope: format!("{}.{}", method.name(), component),
                    field: name.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// The three components of a method, in canonical order.
pub fn bags(method: &dyn Method) -> [(&'static str, &ParamBag); 3] {
    [
        ("input", method.input()),
        ("output", method.output()),
        ("params", method.params()),
    ]
}

/// Returns the flattened keyword arguments that reproduce the method.
///
/// With `symbolic` set, reference-backed fields re-emit their symbolic
/// strings; otherwise materialized values are returned. Flattening is safe
/// because field names are globally unique across the bags.
pub fn method_kwargs(method: &dyn Method, symbolic: bool) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    for (_, bag) in bags(method) {
        out.extend(bag.to_dict(symbolic));
    }
    out
}

/// Looks up which component a flattened kwarg name belongs to.
pub fn component_of(method: &dyn Method, field: &str) -> Option<&'static str> {
    bags(method)
        .into_iter()
        .find(|(_, bag)| bag.get(field).is_some())
        .map(|(component, _)| component)
}

type MethodFactory = Box<dyn Fn(Kwargs) -> Result<Box<dyn Method>> + Send + Sync>;

/// Explicit name -> constructor map for method implementations.
///
/// Owned by the process entry point and handed to the workflow at
/// construction; there is no global registration state.
#[derive(Default)]
pub struct MethodRegistry {
    factories: HashMap<String, MethodFactory>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a method name (lower-cased).
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Kwargs) -> Result<Box<dyn Method>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Builds a method instance by name.
    pub fn build(&self, name: &str, kwargs: Kwargs) -> Result<Box<dyn Method>> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| WorkflowError::UnknownMethod(name.to_string()))?;
        factory(kwargs)
    }

    /// Rebuilds a method from materialized values (no references).
    pub fn build_from_values(
        &self,
        name: &str,
        values: BTreeMap<String, Value>,
    ) -> Result<Box<dyn Method>> {
        let kwargs: Kwargs = values
            .into_iter()
            .map(|(k, v)| (k, Kwarg::Value(v)))
            .collect();
        self.build(name, kwargs)
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}
