//! Field Value Types
//!
//! Values carried by method parameter fields. Paths are kept distinct from
//! plain strings so that file checks and path rendering only ever touch
//! fields that are declared as paths. On the wire (YAML descriptions) a path
//! is indistinguishable from a string; coercion against the declared field
//! kind happens at bag construction.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Dynamic value type for method input/output/params fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Path(PathBuf),
    String(String),
    Number(f64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Declared kind of a field in a bag schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Path,
    String,
    Number,
    Bool,
    List,
    Map,
}

impl ValueKind {
    /// Human-readable kind name for error messages.
    pub fn name(&self) -> &'static str {
        match self {
            ValueKind::Path => "path",
            ValueKind::String => "string",
            ValueKind::Number => "number",
            ValueKind::Bool => "boolean",
            ValueKind::List => "list",
            ValueKind::Map => "mapping",
        }
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Path(_) => ValueKind::Path,
            Value::String(_) => ValueKind::String,
            Value::Number(_) => ValueKind::Number,
            Value::Bool(_) => ValueKind::Bool,
            Value::List(_) => ValueKind::List,
            Value::Map(_) => ValueKind::Map,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Value::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the value as a wildcard template string.
    ///
    /// Only string and path values can carry `{wildcard}` placeholders;
    /// every other kind returns `None`.
    pub fn as_template(&self) -> Option<String> {
        match self {
            Value::Path(p) => Some(p.to_string_lossy().into_owned()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Coerces the value to the given kind.
    ///
    /// Coercion rules:
    /// - `Path` accepts strings
    /// - `List` accepts a scalar string/path: a wildcard template that is
    ///   aggregated into a concrete list at run enumeration, kept scalar
    ///   until then so wildcard detection still sees it
    /// - everything else only accepts its own kind
    ///
    /// On failure the original value is handed back so the caller can build
    /// an error naming the field.
    pub fn coerce(self, kind: ValueKind) -> std::result::Result<Value, Value> {
        match (kind, self) {
            (ValueKind::Path, Value::String(s)) => Ok(Value::Path(PathBuf::from(s))),
            (ValueKind::String, Value::Path(p)) => {
                Ok(Value::String(p.to_string_lossy().into_owned()))
            }
            (ValueKind::List, v @ (Value::String(_) | Value::Path(_))) => Ok(v),
            (kind, v) if v.kind() == kind => Ok(v),
            (_, v) => Err(v),
        }
    }

    /// Converts a parsed YAML value into a field value.
    ///
    /// Strings stay strings; path coercion happens later against the schema.
    pub fn from_yaml(value: serde_yaml::Value) -> Option<Value> {
        match value {
            serde_yaml::Value::String(s) => Some(Value::String(s)),
            serde_yaml::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_yaml::Value::Bool(b) => Some(Value::Bool(b)),
            serde_yaml::Value::Sequence(seq) => seq
                .into_iter()
                .map(Value::from_yaml)
                .collect::<Option<Vec<_>>>()
                .map(Value::List),
            serde_yaml::Value::Mapping(map) => {
                let mut out = BTreeMap::new();
                for (k, v) in map {
                    let key = k.as_str()?.to_string();
                    out.insert(key, Value::from_yaml(v)?);
                }
                Some(Value::Map(out))
            }
            _ => None,
        }
    }

    /// Converts the value to YAML for serialization. Paths become strings.
    pub fn to_yaml(&self) -> serde_yaml::Value {
        match self {
            Value::Path(p) => serde_yaml::Value::String(p.to_string_lossy().into_owned()),
            Value::String(s) => serde_yaml::Value::String(s.clone()),
            Value::Number(n) => serde_yaml::Value::Number(serde_yaml::Number::from(*n)),
            Value::Bool(b) => serde_yaml::Value::Bool(*b),
            Value::List(l) => serde_yaml::Value::Sequence(l.iter().map(Value::to_yaml).collect()),
            Value::Map(m) => {
                let mut map = serde_yaml::Mapping::new();
                for (k, v) in m {
                    map.insert(serde_yaml::Value::String(k.clone()), v.to_yaml());
                }
                serde_yaml::Value::Mapping(map)
            }
        }
    }
}

impl fmt::Display for Value {
    /// Renders the value for command-line substitution.
    ///
    /// Lists render space-separated so multiple files can be passed to a
    /// shell command as separate arguments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Path(p) => write!(f, "{}", p.display()),
            Value::String(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(l) => {
                let parts: Vec<String> = l.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(" "))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{}", parts.join(" "))
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<PathBuf> for Value {
    fn from(p: PathBuf) -> Self {
        Value::Path(p)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<String>> for Value {
    fn from(l: Vec<String>) -> Self {
        Value::List(l.into_iter().map(Value::String).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_string_to_path() {
        let v = Value::from("data/file.txt").coerce(ValueKind::Path).unwrap();
        assert_eq!(v, Value::Path(PathBuf::from("data/file.txt")));
    }

    #[test]
    fn test_coerce_scalar_template_into_list_field() {
        // a template stays scalar until run enumeration aggregates it
        let v = Value::from("data/{event}.nc").coerce(ValueKind::List).unwrap();
        assert_eq!(v, Value::String("data/{event}.nc".to_string()));
    }

    #[test]
    fn test_coerce_rejects_mismatch() {
        assert!(Value::from(1.5).coerce(ValueKind::Path).is_err());
        assert!(Value::from(true).coerce(ValueKind::String).is_err());
    }

    #[test]
    fn test_as_template_only_for_strings_and_paths() {
        assert_eq!(
            Value::Path(PathBuf::from("a/{x}.txt")).as_template(),
            Some("a/{x}.txt".to_string())
        );
        assert!(Value::from(1.0).as_template().is_none());
        assert!(Value::List(vec![]).as_template().is_none());
    }

    #[test]
    fn test_display_list_space_joined() {
        let v = Value::List(vec![Value::from("a.txt"), Value::from("b.txt")]);
        assert_eq!(v.to_string(), "a.txt b.txt");
    }

    #[test]
    fn test_yaml_roundtrip() {
        let v = Value::Map(BTreeMap::from([
            ("paths".to_string(), Value::from(vec!["a".to_string(), "b".to_string()])),
            ("n".to_string(), Value::from(2.0)),
        ]));
        let back = Value::from_yaml(v.to_yaml()).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_yaml_path_becomes_string() {
        let v = Value::Path(PathBuf::from("out/result.txt"));
        let back = Value::from_yaml(v.to_yaml()).unwrap();
        assert_eq!(back, Value::String("out/result.txt".to_string()));
    }
}
