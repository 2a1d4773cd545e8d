//! Ordered Rule Collection
//!
//! Rules are kept in a dependency-consistent execution order that is
//! rebuilt incrementally: each new rule is placed immediately after its
//! most-recently-positioned dependency, pulling independent branches
//! forward instead of appending them at the tail.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::error::{Result, WorkflowError};
use crate::workflow::rule::Rule;

/// The workflow's rules, in execution order.
#[derive(Debug, Default)]
pub struct Rules {
    rules: Vec<Rule>,
    // ids in the order rules were declared
    declared: Vec<String>,
    // rule id -> direct predecessor ids
    dependencies: HashMap<String, Vec<String>>,
}

impl Rules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule, deriving its dependencies from its recorded
    /// references.
    ///
    /// The rule is placed immediately after the last-positioned of its
    /// dependencies; a rule without dependencies is appended at the end.
    /// Duplicate ids, unknown dependencies and cycles are rejected before
    /// anything is inserted.
    pub fn insert(&mut self, rule: Rule) -> Result<()> {
        let rule_id = rule.rule_id().to_string();
        if self.contains(&rule_id) {
            return Err(WorkflowError::DuplicateRule(rule_id));
        }

        let deps = rule.dependencies();
        for dep in &deps {
            if *dep == rule_id {
                return Err(WorkflowError::CyclicDependency(rule_id));
            }
            if !self.contains(dep) {
                return Err(WorkflowError::UnknownRule(dep.clone()));
            }
        }
        self.check_acyclic(&rule_id, &deps)?;

        let position = deps
            .iter()
            .filter_map(|dep| self.position(dep))
            .max()
            .map(|p| p + 1)
            .unwrap_or(self.rules.len());

        debug!(
            "Inserting rule '{}' at position {} (deps: {:?})",
            rule_id, position, deps
        );
        self.rules.insert(position, rule);
        self.declared.push(rule_id.clone());
        self.dependencies.insert(rule_id, deps);
        Ok(())
    }

    /// Rejects insertions that would close a dependency loop, using the
    /// same in-degree count the execution order relies on.
    fn check_acyclic(&self, rule_id: &str, deps: &[String]) -> Result<()> {
        let mut graph: HashMap<&str, Vec<&str>> = self
            .dependencies
            .iter()
            .map(|(id, d)| (id.as_str(), d.iter().map(String::as_str).collect()))
            .collect();
        graph.insert(rule_id, deps.iter().map(String::as_str).collect());

        let mut in_degree: HashMap<&str, usize> =
            graph.iter().map(|(id, d)| (*id, d.len())).collect();
        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut sorted = 0;
        while let Some(current) = queue.pop_front() {
            sorted += 1;
            for (&id, d) in &graph {
                if d.contains(&current) {
                    let degree = in_degree.get_mut(id).expect("graph node");
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(id);
                    }
                }
            }
        }

        if sorted != graph.len() {
            return Err(WorkflowError::CyclicDependency(rule_id.to_string()));
        }
        Ok(())
    }

    fn position(&self, rule_id: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.rule_id() == rule_id)
    }

    pub fn contains(&self, rule_id: &str) -> bool {
        self.position(rule_id).is_some()
    }

    /// Gets a rule by id.
    pub fn get(&self, rule_id: &str) -> Result<&Rule> {
        self.position(rule_id)
            .map(|i| &self.rules[i])
            .ok_or_else(|| WorkflowError::UnknownRule(rule_id.to_string()))
    }

    /// Iterates rules in execution order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Rule ids in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.rule_id()).collect()
    }

    /// Direct predecessors of a rule.
    pub fn dependencies_of(&self, rule_id: &str) -> &[String] {
        self.dependencies
            .get(rule_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ids that are nobody's dependency, in declaration order. These are
    /// the default render and execution targets.
    pub fn result_rules(&self) -> Vec<&str> {
        self.declared
            .iter()
            .filter(|id| !self.dependencies.values().any(|deps| deps.contains(id)))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
