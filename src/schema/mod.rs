//! Declarative configuration schemas.
//!
//! A [`Schema`] is a named record of typed fields with defaults, built
//! through a fluent API and materialized into a config tree by the merge
//! engine. A field with no default carries the missing sentinel and must be
//! supplied by an override before strict finalization.
//!
//! ```rust
//! use meld::{Field, Schema};
//!
//! let optimizer = Schema::new("optimizer")
//!     .field(Field::str("name").default("adam"))
//!     .field(Field::float("lr").default(1e-4));
//!
//! let train = Schema::new("train")
//!     .field(Field::int("batch_size").default(32))
//!     .field(Field::str("corpus").required())
//!     .field(Field::nested("optimizer", optimizer));
//! ```

use crate::error::{Error, Result};
use crate::tree::{ConfigMap, ConfigValue, ValueKind};

/// Kind of a declared field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Str,
    List,
    /// A nested record described by its own schema.
    Nested(Schema),
    /// Accepts any value.
    Any,
}

impl FieldKind {
    fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::Bool => ValueKind::Bool,
            FieldKind::Int => ValueKind::Int,
            FieldKind::Float => ValueKind::Float,
            FieldKind::Str => ValueKind::Str,
            FieldKind::List => ValueKind::List,
            FieldKind::Nested(_) => ValueKind::Map,
            FieldKind::Any => ValueKind::Any,
        }
    }
}

/// A single declared field: name, kind, and default. No default means the
/// field is required (missing sentinel).
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    kind: FieldKind,
    default: Option<ConfigValue>,
}

impl Field {
    fn typed(name: &str, kind: FieldKind) -> Self {
        Field {
            name: name.to_string(),
            kind,
            default: None,
        }
    }

    pub fn bool(name: &str) -> Self {
        Self::typed(name, FieldKind::Bool)
    }

    pub fn int(name: &str) -> Self {
        Self::typed(name, FieldKind::Int)
    }

    pub fn float(name: &str) -> Self {
        Self::typed(name, FieldKind::Float)
    }

    pub fn str(name: &str) -> Self {
        Self::typed(name, FieldKind::Str)
    }

    pub fn list(name: &str) -> Self {
        Self::typed(name, FieldKind::List)
    }

    /// A field accepting any value.
    pub fn any(name: &str) -> Self {
        Self::typed(name, FieldKind::Any)
    }

    /// A field whose value is a record described by `schema`; its default
    /// is the schema's own instantiation.
    pub fn nested(name: &str, schema: Schema) -> Self {
        Self::typed(name, FieldKind::Nested(schema))
    }

    /// Sets the default. The value must satisfy the field kind; a mismatch
    /// is reported when the schema is instantiated.
    pub fn default(mut self, value: impl Into<ConfigValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Marks the field as required. Equivalent to giving no default; reads
    /// better at declaration sites.
    pub fn required(mut self) -> Self {
        self.default = None;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named, typed record of declared fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    flexible: bool,
}

impl Schema {
    pub fn new(name: &str) -> Self {
        Schema {
            name: name.to_string(),
            fields: Vec::new(),
            flexible: false,
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Marks this record as open: merges may inject fields beyond the
    /// declared set. Applies to this record only; nested schemas stay
    /// closed unless marked themselves.
    pub fn flexible(mut self) -> Self {
        self.flexible = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_flexible(&self) -> bool {
        self.flexible
    }

    /// Materializes the declared defaults into a config tree: every default
    /// instantiated, required fields left as missing sentinels, declared
    /// kinds and the open flag stamped onto the map nodes.
    pub fn instantiate(&self) -> Result<ConfigMap> {
        let mut map = ConfigMap::new();
        map.set_flexible(self.flexible);
        for field in &self.fields {
            map.declare(&field.name, field.kind.value_kind());
            let value = match (&field.kind, &field.default) {
                (FieldKind::Nested(schema), None) => ConfigValue::Map(schema.instantiate()?),
                (FieldKind::Nested(_), Some(_)) => {
                    return Err(Error::SchemaViolation {
                        path: format!("{}.{}", self.name, field.name),
                        message: "nested fields take their defaults from the schema".to_string(),
                    });
                }
                (kind, Some(default)) => {
                    if !default_matches(kind, default) {
                        return Err(Error::SchemaViolation {
                            path: format!("{}.{}", self.name, field.name),
                            message: format!(
                                "default of kind {} does not satisfy declared kind {}",
                                default.kind_name(),
                                kind.value_kind().name()
                            ),
                        });
                    }
                    default.clone()
                }
                (_, None) => ConfigValue::Missing,
            };
            map.insert(field.name.clone(), value);
        }
        Ok(map)
    }
}

fn default_matches(kind: &FieldKind, value: &ConfigValue) -> bool {
    match (kind, value) {
        (FieldKind::Any, _) => true,
        (_, ConfigValue::Missing | ConfigValue::Null) => true,
        (FieldKind::Bool, ConfigValue::Bool(_)) => true,
        (FieldKind::Int, ConfigValue::Int(_)) => true,
        (FieldKind::Float, ConfigValue::Float(_) | ConfigValue::Int(_)) => true,
        (FieldKind::Str, ConfigValue::Str(_)) => true,
        (FieldKind::List, ConfigValue::List(_)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_materializes_defaults_and_sentinels() {
        let schema = Schema::new("train")
            .field(Field::int("batch_size").default(32))
            .field(Field::str("corpus").required());
        let map = schema.instantiate().unwrap();
        assert_eq!(map.get("batch_size"), Some(&ConfigValue::Int(32)));
        assert_eq!(map.get("corpus"), Some(&ConfigValue::Missing));
        assert_eq!(map.declared_kind("batch_size"), Some(ValueKind::Int));
        assert!(!map.is_flexible());
    }

    #[test]
    fn nested_schemas_become_map_nodes() {
        let inner = Schema::new("optimizer").field(Field::str("name").default("adam"));
        let schema = Schema::new("train").field(Field::nested("optimizer", inner));
        let map = schema.instantiate().unwrap();
        assert_eq!(
            map.get_path("optimizer.name"),
            Some(&ConfigValue::Str("adam".to_string()))
        );
    }

    #[test]
    fn mismatched_default_is_reported() {
        let schema = Schema::new("bad").field(Field::int("workers").default("four"));
        match schema.instantiate() {
            Err(Error::SchemaViolation { path, .. }) => assert_eq!(path, "bad.workers"),
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn int_default_widens_into_float_field() {
        let schema = Schema::new("s").field(Field::float("lr").default(1));
        let map = schema.instantiate().unwrap();
        // stored as given; merge-time coercion handles the widening
        assert_eq!(map.get("lr"), Some(&ConfigValue::Int(1)));
    }

    #[test]
    fn flexible_marks_the_root_only() {
        let inner = Schema::new("inner").field(Field::int("x").default(1));
        let schema = Schema::new("outer")
            .field(Field::nested("inner", inner))
            .flexible();
        let map = schema.instantiate().unwrap();
        assert!(map.is_flexible());
        let nested = map.get("inner").and_then(|v| v.as_map()).unwrap();
        assert!(!nested.is_flexible());
    }
}
