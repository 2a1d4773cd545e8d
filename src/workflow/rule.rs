//! Workflow Rules
//!
//! A rule binds one method into a workflow. At construction it classifies
//! which wildcards the method's fields use and validates the classification
//! against the method kind. At run time it enumerates one concrete method
//! per explode-wildcard combination.
//!
//! Wildcards are classified into three disjoint categories, based on
//! whether they "explode" (n:n), "expand" (1:n) or "reduce" (n:1) the rule:
//! - `explode`: in input/params and output, one run per value
//! - `expand`: only in output, one run produces all values
//! - `reduce`: only in input/params, one run aggregates all values

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::error::{Result, WorkflowError};
use crate::workflow::method::{self, Method, MethodKind};
use crate::workflow::parameters::ParamBag;
use crate::workflow::value::Value;
use crate::workflow::wildcards::{substitute_wildcard, wildcard_product, Wildcards};

/// The wildcard names a rule uses, split by category.
///
/// The three lists are disjoint and jointly cover every wildcard that
/// occurs in the rule's fields.
#[derive(Debug, Clone, Default)]
pub struct WildcardSets {
    pub explode: Vec<String>,
    pub expand: Vec<String>,
    pub reduce: Vec<String>,
}

/// One method bound into a workflow.
pub struct Rule {
    rule_id: String,
    method: Box<dyn Method>,
    wildcards: WildcardSets,
    // wildcard name -> field names that carry it (across all bags)
    wildcard_fields: HashMap<String, Vec<String>>,
    // value lists are fixed once bound, so they are cached at construction
    explode_values: Vec<(String, Vec<String>)>,
    reduce_values: Vec<(String, Vec<String>)>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.rule_id)
            .field("runs", &self.n_runs())
            .finish()
    }
}

impl Rule {
    /// Creates a rule for a method, classifying its wildcards against the
    /// workflow registry.
    ///
    /// Expand methods first bind their declared wildcard value lists in the
    /// registry. The rule id defaults to the method name.
    pub(crate) fn new(
        method: Box<dyn Method>,
        registry: &mut Wildcards,
        rule_id: Option<&str>,
    ) -> Result<Self> {
        method::check_unique_fields(method.as_ref())?;
        let rule_id = rule_id.unwrap_or(method.name()).to_string();

        if let Some(expand_values) = method.expand_values() {
            for (name, values) in expand_values {
                registry.set(name, values.clone())?;
            }
        }

        let (sets, wildcard_fields) = detect_wildcards(method.as_ref(), registry);
        validate_kind(&rule_id, method.as_ref(), &sets, &wildcard_fields)?;

        let explode_values = sets
            .explode
            .iter()
            .map(|name| Ok((name.clone(), registry.get(name)?.to_vec())))
            .collect::<Result<Vec<_>>>()?;
        let reduce_values = sets
            .reduce
            .iter()
            .map(|name| Ok((name.clone(), registry.get(name)?.to_vec())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rule_id,
            method,
            wildcards: sets,
            wildcard_fields,
            explode_values,
            reduce_values,
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn method(&self) -> &dyn Method {
        self.method.as_ref()
    }

    pub fn input(&self) -> &ParamBag {
        self.method.input()
    }

    pub fn output(&self) -> &ParamBag {
        self.method.output()
    }

    pub fn params(&self) -> &ParamBag {
        self.method.params()
    }

    /// Looks up a bag by component name.
    pub fn bag(&self, component: &str) -> Option<&ParamBag> {
        match component {
            "input" => Some(self.input()),
            "output" => Some(self.output()),
            "params" => Some(self.params()),
            _ => None,
        }
    }

    /// The rule's wildcard classification.
    pub fn wildcards(&self) -> &WildcardSets {
        &self.wildcards
    }

    /// Field names that carry the given wildcard.
    pub fn fields_of(&self, name: &str) -> &[String] {
        self.wildcard_fields
            .get(&name.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All fields that carry any wildcard.
    pub fn wildcard_fields(&self) -> &HashMap<String, Vec<String>> {
        &self.wildcard_fields
    }

    /// The number of required method runs: the Cartesian-product size over
    /// the explode wildcards' value lists.
    pub fn n_runs(&self) -> usize {
        self.explode_values.iter().map(|(_, v)| v.len()).product()
    }

    /// Enumerates one explode-wildcard assignment per run.
    pub fn run_assignments(&self) -> Vec<Vec<(String, String)>> {
        let lists: Vec<Vec<String>> = self.explode_values.iter().map(|(_, v)| v.clone()).collect();
        wildcard_product(&lists)
            .into_iter()
            .map(|combo| {
                self.explode_values
                    .iter()
                    .map(|(name, _)| name.clone())
                    .zip(combo)
                    .collect()
            })
            .collect()
    }

    /// Returns the method keyword arguments for one run, with templated
    /// fields re-resolved under the given explode assignment.
    ///
    /// Fields carrying a reduce wildcard are substituted once per value of
    /// that wildcard's entire bound list and collected into an ordered
    /// list, independent of the run's explode assignment. Fields carrying
    /// only expand wildcards are left untouched; the method itself resolves
    /// those from its declared value lists.
    pub fn kwargs_for_run(&self, assignment: &[(String, String)]) -> BTreeMap<String, Value> {
        let mut kwargs = method::method_kwargs(self.method.as_ref(), false);

        // invert the per-wildcard index into field -> names
        let mut field_index: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (name, fields) in &self.wildcard_fields {
            for field in fields {
                field_index.entry(field.as_str()).or_default().push(name.as_str());
            }
        }

        for (field, names) in field_index {
            let value = match kwargs.get(field) {
                Some(v) => v,
                None => continue,
            };
            let is_path = matches!(value, Value::Path(_));
            let mut template = match value.as_template() {
                Some(t) => t,
                None => continue,
            };

            for (name, val) in assignment {
                if names.iter().any(|n| *n == name.as_str()) {
                    template = substitute_wildcard(&template, name, val);
                }
            }

            let reduce_here: Vec<&(String, Vec<String>)> = self
                .reduce_values
                .iter()
                .filter(|(name, _)| names.iter().any(|n| *n == name.as_str()))
                .collect();

            let resolved = if reduce_here.is_empty() {
                scalar(template, is_path)
            } else {
                // aggregate over the full bound lists of every reduce
                // wildcard in this field
                let lists: Vec<Vec<String>> =
                    reduce_here.iter().map(|(_, v)| v.clone()).collect();
                let items = wildcard_product(&lists)
                    .into_iter()
                    .map(|combo| {
                        let mut item = template.clone();
                        for ((name, _), val) in reduce_here.iter().zip(&combo) {
                            item = substitute_wildcard(&item, name, val);
                        }
                        scalar(item, is_path)
                    })
                    .collect();
                Value::List(items)
            };
            kwargs.insert(field.to_string(), resolved);
        }

        kwargs
    }

    /// Rule ids this rule depends on, derived from the recorded references
    /// of its input and params bags.
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for bag in [self.input(), self.params()] {
            for reference in bag.refs().values() {
                if let Some(rest) = reference.strip_prefix("$rules.") {
                    if let Some(rule_id) = rest.split('.').next() {
                        if !deps.iter().any(|d| d == rule_id) {
                            deps.push(rule_id.to_string());
                        }
                    }
                }
            }
        }
        deps
    }
}

fn scalar(template: String, is_path: bool) -> Value {
    if is_path {
        Value::Path(PathBuf::from(template))
    } else {
        Value::String(template)
    }
}

/// Scans every string/path field for literal `{name}` occurrences of the
/// bound wildcard names and derives the three category sets.
fn detect_wildcards(
    method: &dyn Method,
    registry: &Wildcards,
) -> (WildcardSets, HashMap<String, Vec<String>>) {
    let known = registry.names();
    let mut per_component: HashMap<&str, Vec<String>> = HashMap::new();
    let mut wildcard_fields: HashMap<String, Vec<String>> = HashMap::new();

    for (component, bag) in method::bags(method) {
        let names = per_component.entry(component).or_default();
        for (field, value) in bag.iter() {
            let template = match value.as_template() {
                Some(t) => t,
                None => continue,
            };
            for name in &known {
                if template.contains(&format!("{{{}}}", name)) {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                    let fields = wildcard_fields.entry(name.clone()).or_default();
                    if !fields.iter().any(|f| f == field) {
                        fields.push(field.to_string());
                    }
                }
            }
        }
    }

    let empty = Vec::new();
    let input = per_component.get("input").unwrap_or(&empty);
    let params = per_component.get("params").unwrap_or(&empty);
    let output = per_component.get("output").unwrap_or(&empty);

    let in_params: Vec<String> = input.iter().chain(params.iter()).cloned().collect();
    let sets = WildcardSets {
        explode: known
            .iter()
            .cloned()
            .filter(|n| in_params.contains(n) && output.contains(n))
            .collect(),
        expand: known
            .iter()
            .cloned()
            .filter(|n| output.contains(n) && !in_params.contains(n))
            .collect(),
        reduce: known
            .iter()
            .cloned()
            .filter(|n| in_params.contains(n) && !output.contains(n))
            .collect(),
    };
    (sets, wildcard_fields)
}

/// Validates the wildcard classification against the method kind.
fn validate_kind(
    rule_id: &str,
    method: &dyn Method,
    sets: &WildcardSets,
    wildcard_fields: &HashMap<String, Vec<String>>,
) -> Result<()> {
    let fields_for = |name: &str| -> String {
        wildcard_fields
            .get(name)
            .map(|f| f.join(", "))
            .unwrap_or_default()
    };

    match method.kind() {
        MethodKind::Expand => {
            let declared: Vec<&String> = method
                .expand_values()
                .map(|m| m.keys().collect())
                .unwrap_or_default();
            for axis in &declared {
                let axis = axis.to_lowercase();
                if !sets.expand.contains(&axis) && !sets.explode.contains(&axis) {
                    return Err(WorkflowError::WildcardKindMismatch {
                        rule: rule_id.to_string(),
                        detail: format!(
                            "expand method declares wildcard '{}' which does not \
                             occur in any output field",
                            axis
                        ),
                    });
                }
            }
            for name in &sets.expand {
                if !declared.iter().any(|d| d.to_lowercase() == *name) {
                    return Err(WorkflowError::WildcardKindMismatch {
                        rule: rule_id.to_string(),
                        detail: format!(
                            "output field(s) {} carry wildcard '{}' which the \
                             expand method does not declare",
                            fields_for(name),
                            name
                        ),
                    });
                }
            }
        }
        MethodKind::Reduce => {
            if !sets.expand.is_empty() {
                let name = &sets.expand[0];
                return Err(WorkflowError::WildcardKindMismatch {
                    rule: rule_id.to_string(),
                    detail: format!(
                        "reduce method carries wildcard '{}' only in output \
                         field(s) {}; it must occur in an input or params field",
                        name,
                        fields_for(name)
                    ),
                });
            }
            if sets.reduce.is_empty() {
                return Err(WorkflowError::WildcardKindMismatch {
                    rule: rule_id.to_string(),
                    detail: "reduce method has no wildcard in its input or params fields"
                        .to_string(),
                });
            }
        }
        MethodKind::Standard => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::test_support::MockMethod;
    use crate::workflow::value::ValueKind;

    fn registry() -> Wildcards {
        let mut wc = Wildcards::new();
        wc.set("a", vec!["v1".to_string(), "v2".to_string()]).unwrap();
        wc.set("b", vec!["w1".to_string(), "w2".to_string(), "w3".to_string()])
            .unwrap();
        wc
    }

    fn explode_method() -> Box<dyn Method> {
        Box::new(
            MockMethod::builder("proc")
                .input_field("src", ValueKind::Path, Value::from("in/{a}_{b}.txt"))
                .output_field("out", ValueKind::Path, Value::from("out/{a}_{b}.txt"))
                .build(),
        )
    }

    #[test]
    fn test_classification_explode() {
        let mut wc = registry();
        let rule = Rule::new(explode_method(), &mut wc, None).unwrap();

        assert_eq!(rule.wildcards().explode, vec!["a", "b"]);
        assert!(rule.wildcards().expand.is_empty());
        assert!(rule.wildcards().reduce.is_empty());
        assert_eq!(rule.fields_of("a"), ["src", "out"]);
    }

    #[test]
    fn test_classification_sets_disjoint() {
        let mut wc = registry();
        let method = MockMethod::builder("mixed")
            .input_field("src", ValueKind::Path, Value::from("in/{a}.txt"))
            .output_field("out", ValueKind::Path, Value::from("out/{a}/{b}.txt"))
            .build();
        let rule = Rule::new(Box::new(method), &mut wc, None).unwrap();

        let sets = rule.wildcards();
        assert_eq!(sets.explode, vec!["a"]);
        assert_eq!(sets.expand, vec!["b"]);
        assert!(sets.reduce.is_empty());
        for name in &sets.explode {
            assert!(!sets.expand.contains(name));
            assert!(!sets.reduce.contains(name));
        }
        for name in &sets.expand {
            assert!(!sets.reduce.contains(name));
        }
    }

    #[test]
    fn test_run_count_is_product() {
        let mut wc = registry();
        let rule = Rule::new(explode_method(), &mut wc, None).unwrap();
        assert_eq!(rule.n_runs(), 6);
        assert_eq!(rule.run_assignments().len(), 6);
    }

    #[test]
    fn test_run_count_without_wildcards() {
        let mut wc = registry();
        let method = MockMethod::builder("plain")
            .output_field("out", ValueKind::Path, Value::from("out.txt"))
            .build();
        let rule = Rule::new(Box::new(method), &mut wc, None).unwrap();
        assert_eq!(rule.n_runs(), 1);
    }

    #[test]
    fn test_kwargs_for_run_substitutes_explode() {
        let mut wc = registry();
        let rule = Rule::new(explode_method(), &mut wc, None).unwrap();

        let runs = rule.run_assignments();
        let kwargs = rule.kwargs_for_run(&runs[0]);
        assert_eq!(kwargs["src"], Value::Path("in/v1_w1.txt".into()));
        assert_eq!(kwargs["out"], Value::Path("out/v1_w1.txt".into()));
    }

    #[test]
    fn test_kwargs_for_run_aggregates_reduce() {
        let mut wc = registry();
        let method = MockMethod::builder("merge")
            .kind(MethodKind::Reduce)
            .input_field("events", ValueKind::List, Value::from("events/{a}.nc"))
            .output_field("catalog", ValueKind::Path, Value::from("catalog.yml"))
            .build();
        let rule = Rule::new(Box::new(method), &mut wc, None).unwrap();

        assert_eq!(rule.wildcards().reduce, vec!["a"]);
        assert_eq!(rule.n_runs(), 1);

        let kwargs = rule.kwargs_for_run(&rule.run_assignments()[0]);
        assert_eq!(
            kwargs["events"],
            Value::List(vec![
                Value::String("events/v1.nc".to_string()),
                Value::String("events/v2.nc".to_string()),
            ])
        );
    }

    #[test]
    fn test_reduce_aggregates_full_list_independent_of_explode() {
        // explode on {b}, reduce on {a}: every run aggregates all of {a}
        let mut wc = registry();
        let method = MockMethod::builder("merge")
            .kind(MethodKind::Reduce)
            .input_field("events", ValueKind::List, Value::from("events/{a}_{b}.nc"))
            .input_field("extra", ValueKind::Path, Value::from("runs/{b}.toml"))
            .output_field("catalog", ValueKind::Path, Value::from("catalog_{b}.yml"))
            .build();
        let rule = Rule::new(Box::new(method), &mut wc, None).unwrap();

        assert_eq!(rule.wildcards().explode, vec!["b"]);
        assert_eq!(rule.wildcards().reduce, vec!["a"]);
        assert_eq!(rule.n_runs(), 3);

        let runs = rule.run_assignments();
        let kwargs = rule.kwargs_for_run(&runs[1]);
        assert_eq!(
            kwargs["events"],
            Value::List(vec![
                Value::String("events/v1_w2.nc".to_string()),
                Value::String("events/v2_w2.nc".to_string()),
            ])
        );
        assert_eq!(kwargs["catalog"], Value::Path("catalog_w2.yml".into()));
    }

    #[test]
    fn test_expand_method_leaves_expand_fields_untouched() {
        let mut wc = Wildcards::new();
        let method = MockMethod::builder("derive_events")
            .expand("event", vec!["q_rp10".to_string(), "q_rp50".to_string()])
            .input_field("timeseries", ValueKind::Path, Value::from("discharge.nc"))
            .output_field("events", ValueKind::Path, Value::from("events/{event}.nc"))
            .build();
        let rule = Rule::new(Box::new(method), &mut wc, None).unwrap();

        // declared values were bound in the workflow registry
        assert_eq!(wc.get("event").unwrap(), ["q_rp10", "q_rp50"]);
        assert_eq!(rule.wildcards().expand, vec!["event"]);
        assert_eq!(rule.n_runs(), 1);

        let kwargs = rule.kwargs_for_run(&rule.run_assignments()[0]);
        assert_eq!(kwargs["events"], Value::Path("events/{event}.nc".into()));
    }

    #[test]
    fn test_expand_method_undeclared_axis_fails() {
        let mut wc = registry();
        // output carries {a} which the method does not declare
        let method = MockMethod::builder("derive_events")
            .expand("event", vec!["e1".to_string()])
            .input_field("timeseries", ValueKind::Path, Value::from("discharge.nc"))
            .output_field("events", ValueKind::Path, Value::from("events/{event}_{a}.nc"))
            .build();
        let err = Rule::new(Box::new(method), &mut wc, None).unwrap_err();
        assert!(err.to_string().contains("does not declare"));
        assert!(err.to_string().contains("events"));
    }

    #[test]
    fn test_expand_method_axis_missing_from_output_fails() {
        let mut wc = registry();
        let method = MockMethod::builder("derive_events")
            .expand("event", vec!["e1".to_string()])
            .input_field("timeseries", ValueKind::Path, Value::from("discharge.nc"))
            .output_field("events", ValueKind::Path, Value::from("events/all.nc"))
            .build();
        let err = Rule::new(Box::new(method), &mut wc, None).unwrap_err();
        assert!(err.to_string().contains("event"));
    }

    #[test]
    fn test_reduce_method_output_only_wildcard_fails() {
        let mut wc = registry();
        let method = MockMethod::builder("merge")
            .kind(MethodKind::Reduce)
            .input_field("src", ValueKind::Path, Value::from("plain.txt"))
            .output_field("catalog", ValueKind::Path, Value::from("catalog_{a}.yml"))
            .build();
        let err = Rule::new(Box::new(method), &mut wc, None).unwrap_err();
        assert!(err.to_string().contains("only in output"));
        assert!(err.to_string().contains("catalog"));
    }

    #[test]
    fn test_reduce_method_without_reduce_wildcard_fails() {
        let mut wc = registry();
        let method = MockMethod::builder("merge")
            .kind(MethodKind::Reduce)
            .input_field("src", ValueKind::Path, Value::from("plain.txt"))
            .output_field("catalog", ValueKind::Path, Value::from("catalog.yml"))
            .build();
        assert!(Rule::new(Box::new(method), &mut wc, None).is_err());
    }

    #[test]
    fn test_rule_id_defaults_to_method_name() {
        let mut wc = registry();
        let rule = Rule::new(explode_method(), &mut wc, None).unwrap();
        assert_eq!(rule.rule_id(), "proc");

        let rule = Rule::new(explode_method(), &mut wc, Some("proc_2")).unwrap();
        assert_eq!(rule.rule_id(), "proc_2");
    }

    #[test]
    fn test_duplicate_field_across_bags_rejected() {
        let mut wc = registry();
        let method = MockMethod::builder("clash")
            .input_field("file", ValueKind::Path, Value::from("a.txt"))
            .output_field("file", ValueKind::Path, Value::from("b.txt"))
            .build();
        let err = Rule::new(Box::new(method), &mut wc, None).unwrap_err();
        assert!(matches!(err, WorkflowError::DuplicateField { .. }));
    }
}
