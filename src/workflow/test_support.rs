//! Shared mock methods for unit tests.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::workflow::method::{Method, MethodKind, MethodRegistry};
use crate::workflow::parameters::{FieldSpec, Kwarg, Kwargs, ParamBag, Schema};
use crate::workflow::value::{Value, ValueKind};
use crate::workflow::workflow::{Workflow, WorkflowConfig};

/// A configurable stand-in for a concrete method. `run()` touches every
/// declared output path (expanding declared wildcard values first).
#[derive(Debug)]
pub struct MockMethod {
    name: String,
    kind: MethodKind,
    input: ParamBag,
    output: ParamBag,
    params: ParamBag,
    expand: Option<BTreeMap<String, Vec<String>>>,
}

impl MockMethod {
    pub fn builder(name: &str) -> MockBuilder {
        MockBuilder {
            name: name.to_string(),
            kind: MethodKind::Standard,
            input: Vec::new(),
            output: Vec::new(),
            params: Vec::new(),
            expand: None,
        }
    }
}

impl Method for MockMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> MethodKind {
        self.kind
    }

    fn input(&self) -> &ParamBag {
        &self.input
    }

    fn output(&self) -> &ParamBag {
        &self.output
    }

    fn params(&self) -> &ParamBag {
        &self.params
    }

    fn expand_values(&self) -> Option<&BTreeMap<String, Vec<String>>> {
        self.expand.as_ref()
    }

    fn run(&self) -> Result<()> {
        for (_, value) in self.output.iter() {
            if let Some(template) = value.as_template() {
                let mut paths = vec![template];
                if let Some(expand) = &self.expand {
                    for (name, values) in expand {
                        paths = paths
                            .into_iter()
                            .flat_map(|p| {
                                if p.contains(&format!("{{{}}}", name)) {
                                    values
                                        .iter()
                                        .map(|v| {
                                            crate::workflow::wildcards::substitute_wildcard(
                                                &p, name, v,
                                            )
                                        })
                                        .collect()
                                } else {
                                    vec![p]
                                }
                            })
                            .collect();
                    }
                }
                for path in paths {
                    touch(Path::new(&path))?;
                }
            }
        }
        Ok(())
    }
}

fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, "")?;
    Ok(())
}

pub struct MockBuilder {
    name: String,
    kind: MethodKind,
    input: Vec<(String, ValueKind, Kwarg)>,
    output: Vec<(String, ValueKind, Kwarg)>,
    params: Vec<(String, ValueKind, Kwarg)>,
    expand: Option<BTreeMap<String, Vec<String>>>,
}

impl MockBuilder {
    pub fn kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn expand(mut self, name: &str, values: Vec<String>) -> Self {
        self.kind = MethodKind::Expand;
        self.expand
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), values);
        self
    }

    pub fn input_field(self, name: &str, kind: ValueKind, value: Value) -> Self {
        self.input_kwarg(name, kind, Kwarg::Value(value))
    }

    pub fn input_kwarg(mut self, name: &str, kind: ValueKind, kwarg: Kwarg) -> Self {
        self.input.push((name.to_string(), kind, kwarg));
        self
    }

    pub fn output_field(mut self, name: &str, kind: ValueKind, value: Value) -> Self {
        self.output.push((name.to_string(), kind, Kwarg::Value(value)));
        self
    }

    pub fn params_field(mut self, name: &str, kind: ValueKind, value: Value) -> Self {
        self.params.push((name.to_string(), kind, Kwarg::Value(value)));
        self
    }

    pub fn build(self) -> MockMethod {
        let bag = |scope: &str, fields: Vec<(String, ValueKind, Kwarg)>| -> ParamBag {
            let schema = Schema::new(
                fields
                    .iter()
                    .map(|(name, kind, _)| FieldSpec::new(name.clone(), *kind))
                    .collect(),
            );
            let mut kwargs: Kwargs = fields
                .into_iter()
                .map(|(name, _, kwarg)| (name, kwarg))
                .collect();
            ParamBag::from_kwargs(scope, &schema, &mut kwargs).expect("mock bag")
        };

        MockMethod {
            input: bag(&format!("{}.input", self.name), self.input),
            output: bag(&format!("{}.output", self.name), self.output),
            params: bag(&format!("{}.params", self.name), self.params),
            name: self.name,
            kind: self.kind,
            expand: self.expand,
        }
    }
}

/// A method with a single `out` output path and no inputs.
pub fn touch_method(name: &str, out: &str) -> Box<dyn Method> {
    Box::new(
        MockMethod::builder(name)
            .output_field("out", ValueKind::Path, Value::from(out))
            .build(),
    )
}

/// Registers the mock factories used by registry-driven tests:
/// `touch_file` (out) and `copy_file` (src -> out).
pub fn register_test_methods(registry: &mut MethodRegistry) {
    registry.register("touch_file", |mut kwargs: Kwargs| {
        let schema = Schema::new(vec![FieldSpec::new("out", ValueKind::Path)]);
        let output = ParamBag::from_kwargs("touch_file.output", &schema, &mut kwargs)?;
        crate::workflow::parameters::ensure_consumed("touch_file", &kwargs)?;
        Ok(Box::new(BagMethod {
            name: "touch_file".to_string(),
            input: ParamBag::empty(),
            output,
            params: ParamBag::empty(),
        }) as Box<dyn Method>)
    });
    registry.register("copy_file", |mut kwargs: Kwargs| {
        let in_schema = Schema::new(vec![FieldSpec::new("src", ValueKind::Path)]);
        let out_schema = Schema::new(vec![FieldSpec::new("out", ValueKind::Path)]);
        let input = ParamBag::from_kwargs("copy_file.input", &in_schema, &mut kwargs)?;
        let output = ParamBag::from_kwargs("copy_file.output", &out_schema, &mut kwargs)?;
        crate::workflow::parameters::ensure_consumed("copy_file", &kwargs)?;
        Ok(Box::new(BagMethod {
            name: "copy_file".to_string(),
            input,
            output,
            params: ParamBag::empty(),
        }) as Box<dyn Method>)
    });
}

/// Minimal bag-backed method: `run()` copies `src` to `out` when both are
/// present, otherwise touches every output path.
#[derive(Debug)]
struct BagMethod {
    name: String,
    input: ParamBag,
    output: ParamBag,
    params: ParamBag,
}

impl Method for BagMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn input(&self) -> &ParamBag {
        &self.input
    }

    fn output(&self) -> &ParamBag {
        &self.output
    }

    fn params(&self) -> &ParamBag {
        &self.params
    }

    fn run(&self) -> Result<()> {
        match (self.input.get("src"), self.output.get("out")) {
            (Some(Value::Path(src)), Some(Value::Path(out))) => {
                if let Some(parent) = out.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
                fs::copy(src, out)?;
            }
            _ => {
                for (_, value) in self.output.iter() {
                    if let Value::Path(path) = value {
                        touch(path)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A workflow with a small config, one bound wildcard and the mock method
/// factories registered.
pub fn demo_workflow() -> Workflow {
    let mut config = BTreeMap::new();
    config.insert(
        "model".to_string(),
        Value::Map(BTreeMap::from([("depth".to_string(), Value::from(2.5))])),
    );
    config.insert("region".to_string(), Value::from("data/region.geojson"));

    let mut registry = MethodRegistry::new();
    register_test_methods(&mut registry);

    let mut wf = Workflow::new("demo", WorkflowConfig::new(config), registry);
    wf.set_wildcard("event", vec!["p_rp50".to_string(), "p_rp100".to_string()])
        .unwrap();
    wf
}
