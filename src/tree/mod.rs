//! Hierarchical configuration values.
//!
//! The runtime side of a composition: a tree of [`ConfigValue`]s rooted in a
//! [`ConfigMap`], addressable by dotted path. The tree carries the pieces the
//! merge engine consults at every node:
//!
//! - **Missing sentinel** - [`ConfigValue::Missing`] marks a required field
//!   that has no value yet; it is distinct from null.
//! - **Declared kinds** - map nodes built from a schema remember the scalar
//!   kind of each declared field, so string overrides can be coerced.
//! - **Open/closed flag** - whether a node accepts fields beyond its
//!   declared set.

mod convert;
mod merge;

pub(crate) use convert::{map_from_yaml_str, parse_scalar, to_json_value};
pub(crate) use merge::merge_map;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Reserved key naming the callable a subtree instantiates.
pub const TARGET_KEY: &str = "_target_";

/// Joins a parent path and a child key into a dotted path.
pub(crate) fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Kind of value a declared field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    /// Accepts any value; used for undeclared (injected) fields.
    Any,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "str",
            ValueKind::List => "list",
            ValueKind::Map => "map",
            ValueKind::Any => "any",
        }
    }
}

/// A single configuration value: scalar, list, mapping, or the missing
/// sentinel for required-but-unset fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// "No value; must be supplied before finalization."
    Missing,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<ConfigValue>),
    Map(ConfigMap),
}

impl ConfigValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, ConfigValue::Missing)
    }

    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut ConfigMap> {
        match self {
            ConfigValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of this value's kind, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Missing => "missing",
            ConfigValue::Null => "null",
            ConfigValue::Bool(_) => "bool",
            ConfigValue::Int(_) => "int",
            ConfigValue::Float(_) => "float",
            ConfigValue::Str(_) => "str",
            ConfigValue::List(_) => "list",
            ConfigValue::Map(_) => "map",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Missing => write!(f, "???"),
            ConfigValue::Null => write!(f, "null"),
            ConfigValue::Bool(b) => write!(f, "{b}"),
            ConfigValue::Int(i) => write!(f, "{i}"),
            ConfigValue::Float(v) => write!(f, "{v}"),
            ConfigValue::Str(s) => write!(f, "{s}"),
            ConfigValue::List(_) | ConfigValue::Map(_) => {
                write!(f, "{}", to_json_value(self))
            }
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(v: bool) -> Self {
        ConfigValue::Bool(v)
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int(v as i64)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int(v)
    }
}

impl From<f64> for ConfigValue {
    fn from(v: f64) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::Str(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::Str(v)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(items: Vec<T>) -> Self {
        ConfigValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ConfigMap> for ConfigValue {
    fn from(m: ConfigMap) -> Self {
        ConfigValue::Map(m)
    }
}

/// A mapping node: entries plus the metadata the merge engine consults at
/// this level (declared kinds for coercion, the open/closed flag).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigMap {
    entries: BTreeMap<String, ConfigValue>,
    declared: BTreeMap<String, ValueKind>,
    flexible: bool,
}

impl ConfigMap {
    /// An empty closed map: merges may only touch declared fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty open map: merges may inject arbitrary fields. Raw trees
    /// parsed from YAML are built this way.
    pub fn open() -> Self {
        ConfigMap {
            flexible: true,
            ..Self::default()
        }
    }

    pub fn is_flexible(&self) -> bool {
        self.flexible
    }

    pub(crate) fn set_flexible(&mut self, on: bool) {
        self.flexible = on;
    }

    /// Records the declared kind of a field, consulted when overrides are
    /// coerced during merge.
    pub(crate) fn declare(&mut self, key: &str, kind: ValueKind) {
        self.declared.insert(key.to_string(), kind);
    }

    pub fn declared_kind(&self, key: &str) -> Option<ValueKind> {
        self.declared.get(key).copied()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ConfigValue> {
        self.entries.get_mut(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.entries.iter()
    }

    /// The target path of this node, if it carries the reserved key.
    pub fn target_path(&self) -> Option<&str> {
        match self.entries.get(TARGET_KEY) {
            Some(ConfigValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Looks a value up by dotted path. Numeric segments index into lists.
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let child = self.entries.get(head)?;
        match rest {
            None => Some(child),
            Some(r) => descend(child, r),
        }
    }

    /// Sets a value by dotted path, creating intermediate open maps along
    /// the way. Descending through a scalar is a structural conflict.
    pub fn set_path(&mut self, path: &str, value: ConfigValue) -> Result<()> {
        set_in_map(self, path, path, value)
    }

    /// Dotted paths of every missing-sentinel leaf under this node.
    pub fn missing_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.visit_leaves(&mut |path, value| {
            if value.is_missing() {
                out.push(path.to_string());
            }
        });
        out
    }

    /// Every non-container leaf under this node, with its dotted path.
    /// Lists of scalars count as leaves (they replace wholesale on merge);
    /// lists holding maps are walked into.
    pub fn leaves(&self) -> Vec<(String, ConfigValue)> {
        let mut out = Vec::new();
        self.visit_leaves(&mut |path, value| {
            out.push((path.to_string(), value.clone()));
        });
        out
    }

    fn visit_leaves(&self, visit: &mut impl FnMut(&str, &ConfigValue)) {
        for (key, child) in self.entries.iter() {
            collect_leaves(child, key, visit);
        }
    }

    /// Renders this node as a YAML document. Missing leaves appear as `???`.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yml::to_string(self).map_err(|e| Error::Parse {
            origin: "configuration for serialization".to_string(),
            message: e.to_string(),
        })
    }
}

fn descend<'a>(value: &'a ConfigValue, path: &str) -> Option<&'a ConfigValue> {
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    let child = match value {
        ConfigValue::Map(m) => m.entries.get(head)?,
        ConfigValue::List(items) => items.get(head.parse::<usize>().ok()?)?,
        _ => return None,
    };
    match rest {
        None => Some(child),
        Some(r) => descend(child, r),
    }
}

fn set_in_map(map: &mut ConfigMap, path: &str, full: &str, value: ConfigValue) -> Result<()> {
    let (head, rest) = match path.split_once('.') {
        Some((h, r)) => (h, Some(r)),
        None => (path, None),
    };
    match rest {
        None => {
            map.entries.insert(head.to_string(), value);
            Ok(())
        }
        Some(r) => {
            let child = map
                .entries
                .entry(head.to_string())
                .or_insert_with(|| ConfigValue::Map(ConfigMap::open()));
            set_in_value(child, r, full, value)
        }
    }
}

fn set_in_value(slot: &mut ConfigValue, path: &str, full: &str, value: ConfigValue) -> Result<()> {
    match slot {
        ConfigValue::Map(m) => set_in_map(m, path, full, value),
        ConfigValue::List(items) => {
            let (head, rest) = match path.split_once('.') {
                Some((h, r)) => (h, Some(r)),
                None => (path, None),
            };
            let index = head.parse::<usize>().map_err(|_| Error::SchemaViolation {
                path: full.to_string(),
                message: format!("list segment `{head}` is not an index"),
            })?;
            let child = items.get_mut(index).ok_or_else(|| Error::NotFound {
                path: full.to_string(),
            })?;
            match rest {
                None => {
                    *child = value;
                    Ok(())
                }
                Some(r) => set_in_value(child, r, full, value),
            }
        }
        other => Err(Error::SchemaViolation {
            path: full.to_string(),
            message: format!("cannot descend through {}", other.kind_name()),
        }),
    }
}

fn collect_leaves(value: &ConfigValue, path: &str, visit: &mut impl FnMut(&str, &ConfigValue)) {
    match value {
        ConfigValue::Map(m) => {
            for (key, child) in m.entries.iter() {
                collect_leaves(child, &join_path(path, key), visit);
            }
        }
        ConfigValue::List(items) if items.iter().any(|v| v.as_map().is_some()) => {
            for (i, child) in items.iter().enumerate() {
                collect_leaves(child, &join_path(path, &i.to_string()), visit);
            }
        }
        other => visit(path, other),
    }
}

/// The merged runtime configuration handed to application code.
///
/// Checked accessors fail on a missing-sentinel leaf; [`ConfigTree::get_raw`]
/// is the allow-missing inspection mode.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigTree {
    root: ConfigMap,
}

impl ConfigTree {
    pub fn new(root: ConfigMap) -> Self {
        ConfigTree { root }
    }

    /// Parses a raw (schema-less) tree from a YAML document. The resulting
    /// maps are open and carry no declared kinds.
    pub fn from_yaml(source: &str) -> Result<Self> {
        Ok(ConfigTree {
            root: map_from_yaml_str(source, "inline YAML")?,
        })
    }

    pub fn root(&self) -> &ConfigMap {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut ConfigMap {
        &mut self.root
    }

    pub fn into_root(self) -> ConfigMap {
        self.root
    }

    /// Reads the value at a dotted path. Fails on an absent path and on a
    /// missing-sentinel leaf.
    pub fn get(&self, path: &str) -> Result<&ConfigValue> {
        match self.root.get_path(path) {
            None => Err(Error::NotFound {
                path: path.to_string(),
            }),
            Some(ConfigValue::Missing) => Err(Error::MissingRequired {
                paths: vec![path.to_string()],
            }),
            Some(v) => Ok(v),
        }
    }

    /// Reads the value at a dotted path without the missing check.
    pub fn get_raw(&self, path: &str) -> Option<&ConfigValue> {
        self.root.get_path(path)
    }

    pub fn get_str(&self, path: &str) -> Result<&str> {
        match self.get(path)? {
            ConfigValue::Str(s) => Ok(s),
            other => Err(type_mismatch(path, other, "str")),
        }
    }

    pub fn get_int(&self, path: &str) -> Result<i64> {
        match self.get(path)? {
            ConfigValue::Int(i) => Ok(*i),
            other => Err(type_mismatch(path, other, "int")),
        }
    }

    pub fn get_bool(&self, path: &str) -> Result<bool> {
        match self.get(path)? {
            ConfigValue::Bool(b) => Ok(*b),
            other => Err(type_mismatch(path, other, "bool")),
        }
    }

    pub fn get_float(&self, path: &str) -> Result<f64> {
        match self.get(path)? {
            ConfigValue::Float(v) => Ok(*v),
            ConfigValue::Int(i) => Ok(*i as f64),
            other => Err(type_mismatch(path, other, "float")),
        }
    }

    /// Writes a value at a dotted path (post-finalization mutation).
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) -> Result<()> {
        self.root.set_path(path, value.into())
    }

    /// Dotted paths of every missing-sentinel leaf still in the tree.
    pub fn missing_paths(&self) -> Vec<String> {
        self.root.missing_paths()
    }

    /// Renders the tree as a YAML document.
    pub fn to_yaml(&self) -> Result<String> {
        self.root.to_yaml()
    }

    /// Renders the tree as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        let value = to_json_value(&ConfigValue::Map(self.root.clone()));
        serde_json::to_string_pretty(&value).map_err(|e| Error::Parse {
            origin: "configuration for serialization".to_string(),
            message: e.to_string(),
        })
    }

    /// Deserializes the finalized tree into a caller-defined struct. Fails
    /// up front if any missing sentinel is still present.
    pub fn extract<T: DeserializeOwned>(&self) -> Result<T> {
        let missing = self.missing_paths();
        if !missing.is_empty() {
            return Err(Error::MissingRequired { paths: missing });
        }
        let value = to_json_value(&ConfigValue::Map(self.root.clone()));
        serde_json::from_value(value).map_err(|e| Error::Parse {
            origin: "extracted configuration".to_string(),
            message: e.to_string(),
        })
    }
}

fn type_mismatch(path: &str, value: &ConfigValue, expected: &'static str) -> Error {
    Error::Coercion {
        path: path.to_string(),
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ConfigMap {
        let mut inner = ConfigMap::open();
        inner.insert("host", "localhost");
        inner.insert("port", 5432);
        let mut root = ConfigMap::open();
        root.insert("database", inner);
        root.insert("workers", 4);
        root.insert("tags", vec!["a", "b"]);
        root.insert("token", ConfigValue::Missing);
        root
    }

    #[test]
    fn dotted_get_reaches_nested_values() {
        let tree = ConfigTree::new(sample());
        assert_eq!(tree.get_str("database.host").unwrap(), "localhost");
        assert_eq!(tree.get_int("database.port").unwrap(), 5432);
        assert_eq!(
            tree.get_raw("tags.1"),
            Some(&ConfigValue::Str("b".to_string()))
        );
    }

    #[test]
    fn checked_get_fails_on_missing_leaf() {
        let tree = ConfigTree::new(sample());
        match tree.get("token") {
            Err(Error::MissingRequired { paths }) => assert_eq!(paths, vec!["token"]),
            other => panic!("expected MissingRequired, got {other:?}"),
        }
        // allow-missing inspection still sees the sentinel
        assert_eq!(tree.get_raw("token"), Some(&ConfigValue::Missing));
    }

    #[test]
    fn absent_path_is_not_found() {
        let tree = ConfigTree::new(sample());
        assert!(matches!(
            tree.get("database.nope"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn set_creates_intermediate_maps() {
        let mut tree = ConfigTree::new(sample());
        tree.set("database.pool.size", 8).unwrap();
        assert_eq!(tree.get_int("database.pool.size").unwrap(), 8);
    }

    #[test]
    fn set_through_scalar_is_structural_conflict() {
        let mut tree = ConfigTree::new(sample());
        let err = tree.set("workers.limit", 1).unwrap_err();
        assert!(matches!(err, Error::SchemaViolation { .. }));
    }

    #[test]
    fn missing_paths_reports_dotted_paths() {
        let mut root = sample();
        root.set_path("database.password", ConfigValue::Missing)
            .unwrap();
        let tree = ConfigTree::new(root);
        assert_eq!(tree.missing_paths(), vec!["database.password", "token"]);
    }
}
