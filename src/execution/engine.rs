//! Workflow Execution Engine
//!
//! Runs the rules of a workflow root-first in the maintained dependency
//! order:
//! - Within one rule, enumerated runs are distributed over a fixed-size
//!   worker pool (size 1 forces deterministic sequential execution)
//! - A failed run stops dispatch, lets already-running runs finish and
//!   aborts the remaining rules
//! - Dry-run mode checks inputs and synthesizes empty placeholder files
//!   without invoking any method logic
//!
//! Rules never run concurrently with each other: a rule's inputs may be a
//! previous rule's freshly-written outputs.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use log::{info, warn};

use crate::error::{Result, WorkflowError};
use crate::workflow::method::{self, Method};
use crate::workflow::rule::Rule;
use crate::workflow::value::Value;
use crate::workflow::wildcards::substitute_wildcard;
use crate::workflow::workflow::Workflow;

/// Executes a workflow's rules in order.
///
/// # Example
///
/// ```no_run
/// use hydroweave::execution::Engine;
/// # fn run(workflow: hydroweave::workflow::Workflow) -> hydroweave::error::Result<()> {
/// let mut engine = Engine::new(&workflow);
/// engine.set_max_workers(4);
/// engine.run()?;
/// # Ok(())
/// # }
/// ```
pub struct Engine<'a> {
    workflow: &'a Workflow,
    max_workers: usize,
    dry_run: bool,
    strict_missing: bool,
}

impl<'a> Engine<'a> {
    /// Creates an engine for a workflow with a pool sized to the machine.
    pub fn new(workflow: &'a Workflow) -> Self {
        Self {
            workflow,
            max_workers: num_cpus::get(),
            dry_run: false,
            strict_missing: false,
        }
    }

    /// Sets the maximum number of concurrent runs within one rule.
    pub fn set_max_workers(&mut self, max_workers: usize) {
        self.max_workers = max_workers.max(1);
    }

    /// Enables or disables dry-run mode.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// In dry-run mode, treat a missing declared input file as an error
    /// instead of synthesizing a placeholder.
    pub fn set_strict_missing(&mut self, strict_missing: bool) {
        self.strict_missing = strict_missing;
    }

    /// Executes all rules. Fails fast on the first error.
    pub fn run(&self) -> Result<()> {
        let nrules = self.workflow.rules().len();
        // paths written by earlier rules; dry-run placeholders count
        let mut produced: HashSet<PathBuf> = HashSet::new();

        for (i, rule) in self.workflow.rules().iter().enumerate() {
            info!(
                "Rule {}/{}: {} ({} runs)",
                i + 1,
                nrules,
                rule.rule_id(),
                rule.n_runs()
            );
            if self.dry_run {
                self.dryrun_rule(rule, &mut produced)?;
            } else {
                self.run_rule(rule)?;
            }
        }
        Ok(())
    }

    fn run_rule(&self, rule: &Rule) -> Result<()> {
        let assignments = rule.run_assignments();
        if assignments.len() == 1 || self.max_workers == 1 {
            for assignment in &assignments {
                self.run_one(rule, assignment)?;
            }
            return Ok(());
        }

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<Result<()>>();
            let mut pending = 0usize;
            let mut queue = assignments.iter();
            let mut first_error: Option<WorkflowError> = None;

            for assignment in queue.by_ref().take(self.max_workers) {
                let tx = tx.clone();
                scope.spawn(move || {
                    let _ = tx.send(self.run_one(rule, assignment));
                });
                pending += 1;
            }

            while pending > 0 {
                let result = rx.recv().map_err(|e| WorkflowError::RunFailed {
                    method: rule.method().name().to_string(),
                    reason: format!("worker channel closed: {}", e),
                })?;
                pending -= 1;

                match result {
                    Ok(()) => {
                        // keep dispatching unless a run already failed
                        if first_error.is_none() {
                            if let Some(assignment) = queue.next() {
                                let tx = tx.clone();
                                scope.spawn(move || {
                                    let _ = tx.send(self.run_one(rule, assignment));
                                });
                                pending += 1;
                            }
                        }
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some(e);
                        }
                    }
                }
            }

            match first_error {
                Some(e) => Err(e),
                None => Ok(()),
            }
        })
    }

    fn run_one(&self, rule: &Rule, assignment: &[(String, String)]) -> Result<()> {
        let kwargs = rule.kwargs_for_run(assignment);
        let method = self
            .workflow
            .registry()
            .build_from_values(rule.method().name(), kwargs)?;
        run_method_with_checks(method.as_ref(), rule.rule_id())
    }

    fn dryrun_rule(&self, rule: &Rule, produced: &mut HashSet<PathBuf>) -> Result<()> {
        for assignment in rule.run_assignments() {
            let kwargs = rule.kwargs_for_run(&assignment);
            let method = self
                .workflow
                .registry()
                .build_from_values(rule.method().name(), kwargs)?;
            info!("[DRY RUN] {}", describe_method(method.as_ref()));

            for (field, path) in input_paths(method.as_ref()) {
                if produced.contains(&path) || path.is_file() {
                    continue;
                }
                let field = format!("{}.input.{}", rule.rule_id(), field);
                if self.strict_missing {
                    return Err(WorkflowError::MissingInput { field, path });
                }
                warn!(
                    "Input file {} not found: {}; creating placeholder",
                    field,
                    path.display()
                );
                touch(&path)?;
                produced.insert(path);
            }

            for (_, path) in output_paths(method.as_ref()) {
                touch(&path)?;
                produced.insert(path);
            }
        }
        Ok(())
    }
}

/// Runs a single method with input/output checks.
///
/// Before the run every declared input path must exist; output parent
/// directories are created. After the run every declared output path must
/// exist. `scope` qualifies error field paths, e.g. a rule id.
pub fn run_method_with_checks(method: &dyn Method, scope: &str) -> Result<()> {
    for (field, path) in input_paths(method) {
        if !path.is_file() {
            return Err(WorkflowError::MissingInput {
                field: format!("{}.input.{}", scope, field),
                path,
            });
        }
    }
    for (_, path) in output_paths(method) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                fs::create_dir_all(parent)?;
            }
        }
    }

    method.run()?;

    for (field, path) in output_paths(method) {
        if !path.is_file() {
            return Err(WorkflowError::MissingOutput {
                field: format!("{}.output.{}", scope, field),
                path,
            });
        }
    }
    Ok(())
}

/// Declared input paths: path fields plus path elements of list fields.
pub fn input_paths(method: &dyn Method) -> Vec<(String, PathBuf)> {
    let mut paths = Vec::new();
    for (field, value) in method.input().iter() {
        match value {
            Value::Path(p) => paths.push((field.to_string(), p.clone())),
            Value::List(items) => {
                for item in items {
                    if let Value::Path(p) = item {
                        paths.push((field.to_string(), p.clone()));
                    }
                }
            }
            _ => {}
        }
    }
    paths
}

/// Declared output paths, with expand-method templates expanded over the
/// declared wildcard value lists.
pub fn output_paths(method: &dyn Method) -> Vec<(String, PathBuf)> {
    let mut paths = Vec::new();
    for (field, value) in method.output().iter() {
        let template = match value.as_template() {
            Some(t) => t,
            None => continue,
        };
        let mut expanded = vec![template];
        if let Some(expand_values) = method.expand_values() {
            for (name, values) in expand_values {
                expanded = expanded
                    .into_iter()
                    .flat_map(|t| {
                        if t.contains(&format!("{{{}}}", name)) {
                            values
                                .iter()
                                .map(|v| substitute_wildcard(&t, name, v))
                                .collect()
                        } else {
                            vec![t]
                        }
                    })
                    .collect();
            }
        }
        for path in expanded {
            paths.push((field.to_string(), PathBuf::from(path)));
        }
    }
    paths
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, "")?;
    Ok(())
}

/// Wraps `method::method_kwargs` for callers that narrate runs.
pub fn describe_method(m: &dyn Method) -> String {
    let kwargs = method::method_kwargs(m, false);
    let parts: Vec<String> = kwargs.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{}({})", m.name(), parts.join(", "))
}
