//! Deep-merge primitive with replace-wholesale semantics.
//!
//! Applied node-by-node: mappings merge recursively, everything else
//! (scalars, lists, target strings) is replaced by the override. Unknown
//! fields are injected only where the accumulator node is open; injecting
//! into a closed node, or swapping a mapping for a scalar, fails.

use std::collections::btree_map::Entry;

use super::{join_path, ConfigMap, ConfigValue, ValueKind};
use crate::error::{Error, Result};

/// Merges `incoming` into `acc`, later-wins. `prefix` is the dotted path of
/// `acc` in the full tree, used for error reporting.
pub(crate) fn merge_map(acc: &mut ConfigMap, incoming: ConfigMap, prefix: &str) -> Result<()> {
    for (key, value) in incoming.entries {
        let path = join_path(prefix, &key);
        let declared = acc.declared.get(&key).copied();
        match acc.entries.entry(key) {
            Entry::Occupied(mut slot) => {
                merge_value(slot.get_mut(), value, &path, declared)?;
            }
            Entry::Vacant(slot) => {
                if acc.flexible {
                    tracing::trace!(path = %path, "injecting undeclared field");
                    slot.insert(openify(value));
                } else {
                    return Err(Error::SchemaViolation {
                        path,
                        message: "unknown field in a closed section".to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn merge_value(
    slot: &mut ConfigValue,
    incoming: ConfigValue,
    path: &str,
    declared: Option<ValueKind>,
) -> Result<()> {
    match (slot, incoming) {
        (ConfigValue::Map(acc), ConfigValue::Map(inc)) => merge_map(acc, inc, path),
        // the sentinel may re-open any field, it carries no type of its own
        (slot, ConfigValue::Missing) => {
            *slot = ConfigValue::Missing;
            Ok(())
        }
        (slot @ (ConfigValue::Missing | ConfigValue::Null), ConfigValue::Map(inc)) => {
            match declared {
                Some(ValueKind::Map) | Some(ValueKind::Any) | None => {
                    *slot = openify(ConfigValue::Map(inc));
                    Ok(())
                }
                Some(kind) => Err(Error::SchemaViolation {
                    path: path.to_string(),
                    message: format!("mapping supplied for a {} field", kind.name()),
                }),
            }
        }
        (ConfigValue::Map(_), inc) => Err(Error::SchemaViolation {
            path: path.to_string(),
            message: format!("{} would replace a mapping", inc.kind_name()),
        }),
        (slot, ConfigValue::Map(_)) => Err(Error::SchemaViolation {
            path: path.to_string(),
            message: format!("mapping would replace {}", slot.kind_name()),
        }),
        (slot, inc) => {
            *slot = coerce(inc, declared, path)?;
            Ok(())
        }
    }
}

/// Marks an injected subtree (and everything below it) as open: it has no
/// declared fields, so later sources must still be able to write into it.
fn openify(value: ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::Map(m) => {
            let mut open = ConfigMap {
                entries: Default::default(),
                declared: m.declared,
                flexible: true,
            };
            for (key, child) in m.entries {
                open.entries.insert(key, openify(child));
            }
            ConfigValue::Map(open)
        }
        ConfigValue::List(items) => ConfigValue::List(items.into_iter().map(openify).collect()),
        other => other,
    }
}

/// Casts an override value to the declared kind of its field. CLI input is
/// always textual, so strings convert to the scalar primitives; ints widen
/// to floats; scalars render into string fields.
pub(crate) fn coerce(
    value: ConfigValue,
    declared: Option<ValueKind>,
    path: &str,
) -> Result<ConfigValue> {
    let Some(kind) = declared else {
        return Ok(value);
    };
    let coerced = match (&value, kind) {
        (_, ValueKind::Any) => Some(value.clone()),
        (ConfigValue::Missing | ConfigValue::Null, _) => Some(value.clone()),
        (ConfigValue::Bool(_), ValueKind::Bool) => Some(value.clone()),
        (ConfigValue::Int(_), ValueKind::Int) => Some(value.clone()),
        (ConfigValue::Float(_), ValueKind::Float) => Some(value.clone()),
        (ConfigValue::Str(_), ValueKind::Str) => Some(value.clone()),
        (ConfigValue::List(_), ValueKind::List) => Some(value.clone()),
        (ConfigValue::Int(i), ValueKind::Float) => Some(ConfigValue::Float(*i as f64)),
        (ConfigValue::Int(i), ValueKind::Str) => Some(ConfigValue::Str(i.to_string())),
        (ConfigValue::Float(f), ValueKind::Str) => Some(ConfigValue::Str(f.to_string())),
        (ConfigValue::Bool(b), ValueKind::Str) => Some(ConfigValue::Str(b.to_string())),
        (ConfigValue::Str(s), ValueKind::Int) => s.trim().parse::<i64>().ok().map(ConfigValue::Int),
        (ConfigValue::Str(s), ValueKind::Float) => {
            s.trim().parse::<f64>().ok().map(ConfigValue::Float)
        }
        (ConfigValue::Str(s), ValueKind::Bool) => match s.trim() {
            "true" => Some(ConfigValue::Bool(true)),
            "false" => Some(ConfigValue::Bool(false)),
            _ => None,
        },
        _ => None,
    };
    coerced.ok_or_else(|| Error::Coercion {
        path: path.to_string(),
        value: value.to_string(),
        expected: kind.name(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_replace_wholesale() {
        let mut acc = ConfigMap::open();
        acc.insert("workers", 2);
        let mut inc = ConfigMap::open();
        inc.insert("workers", 8);
        merge_map(&mut acc, inc, "").unwrap();
        assert_eq!(acc.get("workers"), Some(&ConfigValue::Int(8)));
    }

    #[test]
    fn lists_replace_wholesale_not_elementwise() {
        let mut acc = ConfigMap::open();
        acc.insert("tags", vec!["a", "b", "c"]);
        let mut inc = ConfigMap::open();
        inc.insert("tags", vec!["x"]);
        merge_map(&mut acc, inc, "").unwrap();
        assert_eq!(acc.get("tags"), Some(&ConfigValue::List(vec!["x".into()])));
    }

    #[test]
    fn mappings_merge_recursively() {
        let mut db = ConfigMap::open();
        db.insert("host", "localhost");
        db.insert("port", 5432);
        let mut acc = ConfigMap::open();
        acc.insert("database", db);

        let mut db_inc = ConfigMap::open();
        db_inc.insert("port", 6000);
        let mut inc = ConfigMap::open();
        inc.insert("database", db_inc);

        merge_map(&mut acc, inc, "").unwrap();
        assert_eq!(acc.get_path("database.port"), Some(&ConfigValue::Int(6000)));
        assert_eq!(
            acc.get_path("database.host"),
            Some(&ConfigValue::Str("localhost".to_string()))
        );
    }

    #[test]
    fn unknown_field_in_closed_node_fails() {
        let mut acc = ConfigMap::new();
        acc.insert("known", 1);
        let mut inc = ConfigMap::open();
        inc.insert("surprise", 2);
        let err = merge_map(&mut acc, inc, "").unwrap_err();
        match err {
            Error::SchemaViolation { path, .. } => assert_eq!(path, "surprise"),
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn scalar_cannot_replace_mapping() {
        let mut acc = ConfigMap::open();
        acc.insert("section", ConfigMap::open());
        let mut inc = ConfigMap::open();
        inc.insert("section", 5);
        assert!(matches!(
            merge_map(&mut acc, inc, "").unwrap_err(),
            Error::SchemaViolation { .. }
        ));
    }

    #[test]
    fn string_coerces_to_declared_numeric() {
        assert_eq!(
            coerce("42".into(), Some(ValueKind::Int), "n").unwrap(),
            ConfigValue::Int(42)
        );
        assert_eq!(
            coerce("0.5".into(), Some(ValueKind::Float), "r").unwrap(),
            ConfigValue::Float(0.5)
        );
        assert_eq!(
            coerce("true".into(), Some(ValueKind::Bool), "b").unwrap(),
            ConfigValue::Bool(true)
        );
    }

    #[test]
    fn failed_coercion_names_path_value_and_kind() {
        let err = coerce("abc".into(), Some(ValueKind::Int), "workers").unwrap_err();
        match err {
            Error::Coercion {
                path,
                value,
                expected,
            } => {
                assert_eq!(path, "workers");
                assert_eq!(value, "abc");
                assert_eq!(expected, "int");
            }
            other => panic!("expected Coercion, got {other:?}"),
        }
    }

    #[test]
    fn injected_subtrees_stay_open_for_later_sources() {
        let mut acc = ConfigMap::open();
        let mut first = ConfigMap::new();
        first.insert("a", 1);
        let mut inc = ConfigMap::open();
        inc.insert("extra", first);
        merge_map(&mut acc, inc, "").unwrap();

        let mut second_extra = ConfigMap::open();
        second_extra.insert("b", 2);
        let mut second = ConfigMap::open();
        second.insert("extra", second_extra);
        merge_map(&mut acc, second, "").unwrap();

        assert_eq!(acc.get_path("extra.a"), Some(&ConfigValue::Int(1)));
        assert_eq!(acc.get_path("extra.b"), Some(&ConfigValue::Int(2)));
    }
}
