//! Method Parameter Bags
//!
//! A parameter bag is a typed, named field container for one component of a
//! method (input, output or params). Bags are built from keyword arguments
//! against a declared schema:
//! - Reference arguments are resolved to their value before coercion, with
//!   the symbolic string recorded in a side table
//! - Field values are coerced to the declared kind
//! - Unknown fields are rejected unless the schema carries an explicit
//!   extra-fields bucket
//!
//! `to_dict` produces two views from one bag: materialized values for
//! execution, or symbolic reference strings for serialization.

use std::collections::{BTreeMap, HashMap};

use crate::error::{Result, WorkflowError};
use crate::workflow::reference::Ref;
use crate::workflow::value::{Value, ValueKind};

/// A keyword argument: either a literal value or a resolved reference.
#[derive(Debug, Clone)]
pub enum Kwarg {
    Value(Value),
    Ref(Ref),
}

impl Kwarg {
    /// The materialized value of the argument.
    pub fn value(&self) -> &Value {
        match self {
            Kwarg::Value(v) => v,
            Kwarg::Ref(r) => r.value(),
        }
    }

    fn into_parts(self) -> (Value, Option<String>) {
        match self {
            Kwarg::Value(v) => (v, None),
            Kwarg::Ref(r) => {
                let reference = r.reference().to_string();
                (r.into_value(), Some(reference))
            }
        }
    }
}

impl From<Value> for Kwarg {
    fn from(v: Value) -> Self {
        Kwarg::Value(v)
    }
}

/// Keyword arguments for building a method, keyed by field name.
pub type Kwargs = BTreeMap<String, Kwarg>;

/// Returns an error if any keyword argument was left unconsumed.
///
/// Called by method factories after every bag has taken its fields.
pub fn ensure_consumed(scope: &str, kwargs: &Kwargs) -> Result<()> {
    if let Some(field) = kwargs.keys().next() {
        return Err(WorkflowError::UnknownField {
            scope: scope.to_string(),
            field: field.clone(),
        });
    }
    Ok(())
}

/// Declared field in a bag schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: ValueKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Schema for one bag: a fixed field set plus an optional extra bucket.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    extra_kind: Option<ValueKind>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields, extra_kind: None }
    }

    /// Allows fields outside the declared set; each is coerced to `kind`
    /// and stored in the bag's explicit extra bucket.
    pub fn with_extra(mut self, kind: ValueKind) -> Self {
        self.extra_kind = Some(kind);
        self
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

/// A named field holding a coerced value.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// Typed, named field container for a method's input, output or params.
#[derive(Debug, Clone, Default)]
pub struct ParamBag {
    fields: Vec<Field>,
    // field name -> symbolic reference string, for fields built from a Ref
    refs: HashMap<String, String>,
    // present only when the schema declares an extra bucket
    extra: Option<Vec<Field>>,
}

impl ParamBag {
    /// Creates an empty bag with no schema fields.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a bag by taking schema fields out of `kwargs`.
    ///
    /// Schema fields are required; each is coerced to its declared kind.
    /// When the schema has an extra bucket, all remaining arguments are
    /// drained into it, so bags with an extra bucket must be built last.
    ///
    /// `scope` qualifies error messages, e.g. `"shell.input"`.
    pub fn from_kwargs(scope: &str, schema: &Schema, kwargs: &mut Kwargs) -> Result<Self> {
        let mut fields: Vec<Field> = Vec::with_capacity(schema.fields.len());
        let mut refs = HashMap::new();

        for spec in &schema.fields {
            if fields.iter().any(|f| f.name == spec.name) {
                return Err(WorkflowError::DuplicateField {
                    scope: scope.to_string(),
                    field: spec.name.clone(),
                });
            }
            let kwarg = kwargs.remove(&spec.name).ok_or_else(|| {
                WorkflowError::MissingField {
                    scope: scope.to_string(),
                    field: spec.name.clone(),
                }
            })?;
            let (value, reference) = kwarg.into_parts();
            let value = Self::coerce_field(scope, &spec.name, value, spec.kind)?;
            if let Some(reference) = reference {
                refs.insert(spec.name.clone(), reference);
            }
            fields.push(Field { name: spec.name.clone(), value });
        }

        let extra = match schema.extra_kind {
            None => None,
            Some(kind) => {
                let mut bucket = Vec::new();
                while let Some((name, kwarg)) = kwargs.pop_first() {
                    let (value, reference) = kwarg.into_parts();
                    let value = Self::coerce_field(scope, &name, value, kind)?;
                    if let Some(reference) = reference {
                        refs.insert(name.clone(), reference);
                    }
                    bucket.push(Field { name, value });
                }
                Some(bucket)
            }
        };

        Ok(Self { fields, refs, extra })
    }

    fn coerce_field(scope: &str, name: &str, value: Value, kind: ValueKind) -> Result<Value> {
        value.coerce(kind).map_err(|value| WorkflowError::FieldType {
            field: format!("{}.{}", scope, name),
            expected: kind.name(),
            actual: value.kind().name().to_string(),
        })
    }

    /// Looks up a field value by name, searching declared fields then the
    /// extra bucket.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// The symbolic reference a field was built from, if any.
    pub fn ref_of(&self, name: &str) -> Option<&str> {
        self.refs.get(name).map(String::as_str)
    }

    /// All recorded field -> reference entries.
    pub fn refs(&self) -> &HashMap<String, String> {
        &self.refs
    }

    /// Iterates declared fields followed by extra-bucket fields.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .chain(self.extra.iter().flatten())
            .map(|f| (f.name.as_str(), &f.value))
    }

    /// Field names, declared fields first.
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(n, _)| n).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.extra.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts the bag to a name -> value mapping.
    ///
    /// With `symbolic` set, fields built from a reference re-emit the
    /// original symbolic string instead of the resolved value.
    pub fn to_dict(&self, symbolic: bool) -> BTreeMap<String, Value> {
        self.iter()
            .map(|(name, value)| {
                let value = match (symbolic, self.refs.get(name)) {
                    (true, Some(reference)) => Value::String(reference.clone()),
                    _ => value.clone(),
                };
                (name.to_string(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn kwargs(entries: Vec<(&str, Value)>) -> Kwargs {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Kwarg::Value(v)))
            .collect()
    }

    fn schema() -> Schema {
        Schema::new(vec![
            FieldSpec::new("region", ValueKind::Path),
            FieldSpec::new("depth", ValueKind::Number),
        ])
    }

    #[test]
    fn test_bag_construction_and_coercion() {
        let mut kw = kwargs(vec![
            ("region", Value::from("data/region.geojson")),
            ("depth", Value::from(2.5)),
        ]);
        let bag = ParamBag::from_kwargs("build.input", &schema(), &mut kw).unwrap();

        assert_eq!(bag.len(), 2);
        assert_eq!(
            bag.get("region"),
            Some(&Value::Path(PathBuf::from("data/region.geojson")))
        );
        assert!(kw.is_empty());
    }

    #[test]
    fn test_bag_missing_field() {
        let mut kw = kwargs(vec![("region", Value::from("r.geojson"))]);
        let err = ParamBag::from_kwargs("build.input", &schema(), &mut kw).unwrap_err();
        assert!(matches!(err, WorkflowError::MissingField { .. }));
        assert!(err.to_string().contains("depth"));
    }

    #[test]
    fn test_bag_type_mismatch_names_field() {
        let mut kw = kwargs(vec![
            ("region", Value::from("r.geojson")),
            ("depth", Value::from("deep")),
        ]);
        let err = ParamBag::from_kwargs("build.input", &schema(), &mut kw).unwrap_err();
        assert!(err.to_string().contains("build.input.depth"));
    }

    #[test]
    fn test_unknown_field_rejected_without_extra_bucket() {
        let mut kw = kwargs(vec![
            ("region", Value::from("r.geojson")),
            ("depth", Value::from(1.0)),
            ("bogus", Value::from("x")),
        ]);
        let bag = ParamBag::from_kwargs("build.input", &schema(), &mut kw).unwrap();
        assert_eq!(bag.len(), 2);
        // the leftover surfaces when the factory checks consumption
        let err = ensure_consumed("build.input", &kw).unwrap_err();
        assert!(matches!(err, WorkflowError::UnknownField { .. }));
    }

    #[test]
    fn test_extra_bucket_drains_remaining() {
        let schema = Schema::new(vec![]).with_extra(ValueKind::Path);
        let mut kw = kwargs(vec![
            ("a", Value::from("a.txt")),
            ("b", Value::from("b.txt")),
        ]);
        let bag = ParamBag::from_kwargs("shell.input", &schema, &mut kw).unwrap();

        assert!(kw.is_empty());
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.get("a"), Some(&Value::Path(PathBuf::from("a.txt"))));
    }

    #[test]
    fn test_refs_recorded_and_symbolic_view() {
        let reference = Ref::literal("$rules.build.output.model", Value::from("model/run.toml"));
        let mut kw: Kwargs = BTreeMap::from([
            ("region".to_string(), Kwarg::Ref(reference)),
            ("depth".to_string(), Kwarg::Value(Value::from(1.0))),
        ]);
        let bag = ParamBag::from_kwargs("run.input", &schema(), &mut kw).unwrap();

        assert_eq!(bag.ref_of("region"), Some("$rules.build.output.model"));
        assert_eq!(bag.ref_of("depth"), None);

        let symbolic = bag.to_dict(true);
        assert_eq!(
            symbolic["region"],
            Value::String("$rules.build.output.model".to_string())
        );
        let materialized = bag.to_dict(false);
        assert_eq!(
            materialized["region"],
            Value::Path(PathBuf::from("model/run.toml"))
        );
    }
}
