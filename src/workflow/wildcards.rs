//! Wildcard Registry and Pattern Helpers
//!
//! Wildcards are named placeholders written as `{name}` inside string and
//! path fields. Each name is bound workflow-wide to an ordered value list:
//! - Detects `{name}` patterns in field values
//! - Substitutes names with concrete values
//! - Enumerates the Cartesian product of several value lists
//!
//! Names are case-insensitive; bindings are immutable once set.

use log::info;

use crate::error::{Result, WorkflowError};

/// Workflow-wide table of wildcard name to ordered value list.
///
/// # Example
///
/// ```
/// use hydroweave::workflow::Wildcards;
///
/// let mut wildcards = Wildcards::new();
/// wildcards.set("event", vec!["p_rp50".to_string(), "p_rp100".to_string()]).unwrap();
/// assert_eq!(wildcards.get("EVENT").unwrap().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Wildcards {
    // insertion-ordered; the table stays small enough for linear lookup
    wildcards: Vec<(String, Vec<String>)>,
}

impl Wildcards {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self { wildcards: Vec::new() }
    }

    /// Binds a wildcard name to a value list.
    ///
    /// Names are lower-cased. Re-binding with an identical list is a no-op;
    /// re-binding with a different list is an error.
    pub fn set(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        let name = name.to_lowercase();
        if let Some((_, bound)) = self.wildcards.iter().find(|(n, _)| *n == name) {
            if *bound == values {
                return Ok(());
            }
            return Err(WorkflowError::WildcardConflict { name });
        }
        info!("Added wildcard '{}' with {} values", name, values.len());
        self.wildcards.push((name, values));
        Ok(())
    }

    /// Returns the value list bound to a name.
    pub fn get(&self, name: &str) -> Result<&[String]> {
        let name = name.to_lowercase();
        self.wildcards
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_slice())
            .ok_or_else(|| WorkflowError::UnknownWildcard {
                name,
                known: self.names().join(", "),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.wildcards.iter().any(|(n, _)| *n == name)
    }

    /// Bound names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.wildcards.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.wildcards.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.wildcards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wildcards.is_empty()
    }
}

/// Checks if a string contains wildcard syntax.
pub fn has_wildcards(text: &str) -> bool {
    text.contains('{') && text.contains('}')
}

/// Extracts wildcard names from a pattern.
///
/// # Example
/// ```
/// use hydroweave::workflow::wildcards::extract_wildcard_names;
///
/// let names = extract_wildcard_names("events/{event}_rp{rp}.nc");
/// assert_eq!(names, vec!["event", "rp"]);
/// ```
pub fn extract_wildcard_names(pattern: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut in_wildcard = false;
    let mut current_name = String::new();

    for ch in pattern.chars() {
        match ch {
            '{' => {
                in_wildcard = true;
                current_name.clear();
            }
            '}' => {
                if in_wildcard && !current_name.is_empty() {
                    names.push(current_name.clone());
                    current_name.clear();
                }
                in_wildcard = false;
            }
            _ => {
                if in_wildcard {
                    current_name.push(ch);
                }
            }
        }
    }

    names
}

/// Substitutes a single wildcard in a string with a concrete value.
pub fn substitute_wildcard(text: &str, name: &str, value: &str) -> String {
    text.replace(&format!("{{{}}}", name), value)
}

/// Returns the Cartesian product of the given value lists.
///
/// The result contains one entry per combination, each with one value per
/// input list, in list order. An empty input yields a single empty entry.
pub fn wildcard_product(values: &[Vec<String>]) -> Vec<Vec<String>> {
    let mut combos: Vec<Vec<String>> = vec![Vec::new()];
    for list in values {
        let mut next = Vec::with_capacity(combos.len() * list.len());
        for combo in &combos {
            for value in list {
                let mut entry = combo.clone();
                entry.push(value.clone());
                next.push(entry);
            }
        }
        combos = next;
    }
    combos
}
