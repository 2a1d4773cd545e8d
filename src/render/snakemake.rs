//! Snakemake Rule File Generation
//!
//! Serializes an ordered workflow to a Snakefile plus a sibling config
//! file. Wildcard handling follows the backend's conventions:
//! - explode wildcards stay as bare `{name}` placeholders; the backend
//!   iterates them natively
//! - reduce inputs and expand outputs emit an `expand("...", name=NAME)`
//!   directive over value-list variables declared at the top of the file
//! - explode wildcards inside an expand directive are escaped as
//!   `{{name}}` so the backend substitutes them per run
//!
//! References emit as `config["key"]`, `rules.<id>.<component>.<field>` or
//! the uppercase wildcard variable; references to expand-populated fields
//! are emitted literally. Each rule shells back into the `run-method`
//! command of this crate's binary.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::workflow::method::{component_of, method_kwargs};
use crate::workflow::rule::Rule;
use crate::workflow::value::Value;
use crate::workflow::wildcards::extract_wildcard_names;
use crate::workflow::workflow::Workflow;

/// Writes the Snakefile and its `<stem>.config.yml` next to it.
pub fn to_snakemake(workflow: &Workflow, snakefile: &Path) -> Result<()> {
    let stem = snakefile
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Snakefile");
    let config_name = format!("{}.config.yml", stem);

    let text = render(workflow, &config_name)?;
    fs::write(snakefile, text)?;

    let mut config = serde_yaml::Mapping::new();
    for (key, value) in workflow.config().to_map() {
        config.insert(serde_yaml::Value::String(key.clone()), value.to_yaml());
    }
    let config_path = snakefile.with_file_name(&config_name);
    fs::write(&config_path, serde_yaml::to_string(&config)?)?;

    info!(
        "Snakemake workflow written to {} (config: {})",
        snakefile.display(),
        config_path.display()
    );
    Ok(())
}

/// Renders the Snakefile text.
pub fn render(workflow: &Workflow, configfile: &str) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "# This file was generated by hydroweave v{}. Do not edit by hand.",
        crate::VERSION
    );
    if !workflow.config().is_empty() {
        let _ = writeln!(out, "configfile: \"{}\"", configfile);
    }
    let _ = writeln!(out);

    for (name, values) in workflow.wildcards().iter() {
        let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
        let _ = writeln!(out, "{} = [{}]", name.to_uppercase(), quoted.join(", "));
    }
    if !workflow.wildcards().is_empty() {
        let _ = writeln!(out);
    }

    render_rule_all(workflow, &mut out)?;
    for rule in workflow.rules().iter() {
        render_rule(workflow, rule, &mut out);
    }
    Ok(out)
}

/// The aggregate target: the result rules' outputs, expanded over every
/// wildcard they carry.
fn render_rule_all(workflow: &Workflow, out: &mut String) -> Result<()> {
    let all_names = workflow.wildcards().names();
    let _ = writeln!(out, "rule all:");
    let _ = writeln!(out, "    input:");
    for rule_id in workflow.rules().result_rules() {
        let rule = workflow.rules().get(rule_id)?;
        for (_, value) in rule.output().iter() {
            if let Some(template) = value.as_template() {
                let _ = writeln!(out, "        {},", expand_over(&template, &all_names, &[]));
            }
        }
    }
    let _ = writeln!(out);
    Ok(())
}

fn render_rule(workflow: &Workflow, rule: &Rule, out: &mut String) {
    let _ = writeln!(out, "rule {}:", rule.rule_id());

    let inputs = input_entries(workflow, rule);
    if !inputs.is_empty() {
        let _ = writeln!(out, "    input:");
        for (name, value) in inputs {
            let _ = writeln!(out, "        {}={},", name, value);
        }
    }

    let params = params_entries(workflow, rule);
    if !params.is_empty() {
        let _ = writeln!(out, "    params:");
        for (name, value) in params {
            let _ = writeln!(out, "        {}={},", name, value);
        }
    }

    let _ = writeln!(out, "    output:");
    for (name, value) in output_entries(rule) {
        let _ = writeln!(out, "        {}={},", name, value);
    }

    let _ = writeln!(out, "    shell:");
    let _ = writeln!(out, "        \"\"\"");
    let _ = writeln!(out, "        {}", shell_line(rule));
    let _ = writeln!(out, "        \"\"\"");
    let _ = writeln!(out);
}

fn input_entries(workflow: &Workflow, rule: &Rule) -> Vec<(String, String)> {
    let reduce = &rule.wildcards().reduce;
    let mut entries = Vec::new();
    for (field, value) in rule.input().iter() {
        let template = match value.as_template() {
            Some(t) => t,
            None => continue,
        };
        let rendered = if carries_any(&template, reduce) {
            // aggregation over the full value list wins over the symbolic
            // reference to the producing rule
            expand_over(&template, reduce, &rule.wildcards().explode)
        } else if let Some(reference) = rule.input().ref_of(field) {
            reference_syntax(workflow, reference, &template)
        } else {
            quote(&template)
        };
        entries.push((field.to_string(), rendered));
    }
    entries
}

fn params_entries(workflow: &Workflow, rule: &Rule) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for (field, value) in rule.params().iter() {
        let rendered = match rule.params().ref_of(field) {
            Some(reference) => {
                let template = value.as_template().unwrap_or_default();
                reference_syntax(workflow, reference, &template)
            }
            None => py_literal(value),
        };
        entries.push((field.to_string(), rendered));
    }
    entries
}

fn output_entries(rule: &Rule) -> Vec<(String, String)> {
    let expand = &rule.wildcards().expand;
    let mut entries = Vec::new();
    for (field, value) in rule.output().iter() {
        let template = match value.as_template() {
            Some(t) => t,
            None => continue,
        };
        let rendered = if carries_any(&template, expand) {
            expand_over(&template, expand, &rule.wildcards().explode)
        } else {
            quote(&template)
        };
        entries.push((field.to_string(), rendered));
    }
    entries
}

/// The shell invocation that runs the method through this crate's binary.
fn shell_line(rule: &Rule) -> String {
    let mut args = Vec::new();
    for field in method_kwargs(rule.method(), false).keys() {
        if let Some(component) = component_of(rule.method(), field) {
            args.push(format!("{}=\"{{{}.{}}}\"", field, component, field));
        }
    }
    format!(
        "hydroweave run-method {} {}",
        rule.method().name(),
        args.join(" ")
    )
}

/// Emits `expand("template", name=NAME, ...)` over the wildcards of `over`
/// present in the template, escaping the given explode wildcards for the
/// backend's own substitution pass.
fn expand_over(template: &str, over: &[String], escape: &[String]) -> String {
    let present = extract_wildcard_names(template);
    let over_present: Vec<&String> = over.iter().filter(|wc| present.contains(*wc)).collect();
    if over_present.is_empty() {
        return quote(template);
    }

    let mut value = template.to_string();
    for wc in escape {
        if present.contains(wc) {
            value = value.replace(&format!("{{{}}}", wc), &format!("{{{{{}}}}}", wc));
        }
    }
    let args: Vec<String> = over_present
        .iter()
        .map(|wc| format!("{}={}", wc, wc.to_uppercase()))
        .collect();
    format!("expand(\"{}\", {})", value, args.join(", "))
}

/// Translates a symbolic reference to the backend's own syntax.
fn reference_syntax(workflow: &Workflow, reference: &str, template: &str) -> String {
    if let Some(path) = reference.strip_prefix("$config.") {
        let keys: Vec<String> = path.split('.').map(|k| format!("[\"{}\"]", k)).collect();
        return format!("config{}", keys.concat());
    }
    if reference.starts_with("$rules.") {
        // references to expand-populated fields are emitted literally;
        // the backend cannot iterate another rule's declared values
        let is_expand = workflow
            .get_ref(reference)
            .map(|r| r.is_expand_field())
            .unwrap_or(false);
        if is_expand {
            return quote(template);
        }
        return reference[1..].to_string();
    }
    if let Some(name) = reference.strip_prefix("$wildcards.") {
        return name.to_uppercase();
    }
    quote(template)
}

fn carries_any(template: &str, names: &[String]) -> bool {
    names
        .iter()
        .any(|name| template.contains(&format!("{{{}}}", name)))
}

fn quote(value: &str) -> String {
    // JSON string quoting doubles as the backend's literal syntax
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// Renders a literal value in the backend's expression language.
fn py_literal(value: &Value) -> String {
    match value {
        Value::Path(p) => quote(&p.to_string_lossy()),
        Value::String(s) => quote(s),
        Value::Number(n) => format!("{}", n),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", quote(k), py_literal(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::method::MethodRegistry;
    use crate::workflow::test_support::{register_test_methods, MockMethod};
    use crate::workflow::value::ValueKind;
    use crate::workflow::workflow::WorkflowConfig;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn render_workflow() -> Workflow {
        let mut registry = MethodRegistry::new();
        register_test_methods(&mut registry);

        let config = BTreeMap::from([(
            "model".to_string(),
            Value::Map(BTreeMap::from([("depth".to_string(), Value::from(2.5))])),
        )]);
        let mut wf = Workflow::new("risk", WorkflowConfig::new(config), registry);

        // expand method introducing the event wildcard
        let derive = MockMethod::builder("derive_events")
            .expand("event", vec!["p_rp50".to_string(), "p_rp100".to_string()])
            .input_field("timeseries", ValueKind::Path, Value::from("data/discharge.nc"))
            .output_field("events", ValueKind::Path, Value::from("events/{event}.nc"))
            .build();
        wf.create_rule(Box::new(derive), None).unwrap();

        // explode method, one run per event
        wf.create_rule_from_kwargs(
            "copy_file",
            BTreeMap::from([
                ("src".to_string(), Value::from("events/{event}.nc")),
                ("out".to_string(), Value::from("hazard/{event}.tif")),
            ]),
            Some("hazard"),
        )
        .unwrap();

        // reduce method aggregating all events
        let merge = MockMethod::builder("merge_hazard")
            .kind(crate::workflow::method::MethodKind::Reduce)
            .input_kwarg(
                "maps",
                ValueKind::List,
                crate::workflow::parameters::Kwarg::Ref(
                    wf.get_ref("$rules.hazard.output.out").unwrap(),
                ),
            )
            .params_field("depth", ValueKind::Number, Value::from(2.5))
            .output_field("catalog", ValueKind::Path, Value::from("hazard/catalog.yml"))
            .build();
        wf.create_rule(Box::new(merge), None).unwrap();
        wf
    }

    #[test]
    fn test_render_declares_wildcard_variables() {
        let wf = render_workflow();
        let text = render(&wf, "risk.config.yml").unwrap();
        assert!(text.contains("EVENT = [\"p_rp50\", \"p_rp100\"]"));
        assert!(text.contains("configfile: \"risk.config.yml\""));
    }

    #[test]
    fn test_render_expand_directive_for_expand_output() {
        let wf = render_workflow();
        let text = render(&wf, "c.yml").unwrap();
        assert!(text.contains("events=expand(\"events/{event}.nc\", event=EVENT)"));
    }

    #[test]
    fn test_render_bare_placeholder_for_explode() {
        let wf = render_workflow();
        let text = render(&wf, "c.yml").unwrap();
        // the backend iterates the explode wildcard natively
        assert!(text.contains("out=\"hazard/{event}.tif\""));
    }

    #[test]
    fn test_render_expand_directive_for_reduce_input() {
        let wf = render_workflow();
        let text = render(&wf, "c.yml").unwrap();
        assert!(text.contains("maps=expand(\"hazard/{event}.tif\", event=EVENT)"));
    }

    #[test]
    fn test_render_rule_all_targets_result_rules() {
        let wf = render_workflow();
        let text = render(&wf, "c.yml").unwrap();
        assert!(text.contains("rule all:"));
        // a result output without wildcards stays a plain literal
        assert!(!text.contains("expand(\"hazard/catalog.yml\""));
        assert!(text.contains("\"hazard/catalog.yml\","));
    }

    #[test]
    fn test_render_shell_invokes_run_method() {
        let wf = render_workflow();
        let text = render(&wf, "c.yml").unwrap();
        assert!(text.contains("hydroweave run-method merge_hazard"));
        assert!(text.contains("catalog=\"{output.catalog}\""));
    }

    #[test]
    fn test_reference_syntax_config_and_rules() {
        let wf = render_workflow();
        assert_eq!(
            reference_syntax(&wf, "$config.model.depth", ""),
            "config[\"model\"][\"depth\"]"
        );
        assert_eq!(
            reference_syntax(&wf, "$rules.hazard.output.out", "hazard/{event}.tif"),
            "rules.hazard.output.out"
        );
        assert_eq!(reference_syntax(&wf, "$wildcards.event", ""), "EVENT");
    }

    #[test]
    fn test_reference_to_expand_field_emits_literal() {
        let wf = render_workflow();
        let rendered = reference_syntax(
            &wf,
            "$rules.derive_events.output.events",
            "events/{event}.nc",
        );
        assert_eq!(rendered, "\"events/{event}.nc\"");
    }

    #[test]
    fn test_to_snakemake_writes_both_files() {
        let dir = tempdir().unwrap();
        let snakefile = dir.path().join("Snakefile");
        let wf = render_workflow();

        to_snakemake(&wf, &snakefile).unwrap();
        assert!(snakefile.is_file());
        assert!(dir.path().join("Snakefile.config.yml").is_file());

        let config = fs::read_to_string(dir.path().join("Snakefile.config.yml")).unwrap();
        assert!(config.contains("depth"));
    }

    #[test]
    fn test_expand_over_escapes_explode() {
        let rendered = expand_over(
            "maps/{event}_{rp}.tif",
            &["rp".to_string()],
            &["event".to_string()],
        );
        assert_eq!(rendered, "expand(\"maps/{{event}}_{rp}.tif\", rp=RP)");
    }
}
