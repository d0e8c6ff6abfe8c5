//! Conversions between config values and serde trees.
//!
//! YAML input flows through `serde_yml::Value` (anchors resolve in the
//! parser, merge keys are applied right after parse); output goes through a
//! manual `Serialize` so the missing sentinel keeps its `???` spelling.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::{ConfigMap, ConfigTree, ConfigValue};
use crate::error::{Error, Result};

/// YAML spelling of the missing sentinel.
pub(crate) const MISSING_TOKEN: &str = "???";

/// Parses a YAML document into an open, schema-less map.
pub(crate) fn map_from_yaml_str(source: &str, origin: &str) -> Result<ConfigMap> {
    if source.trim().is_empty() {
        return Ok(ConfigMap::open());
    }
    let mut value: serde_yml::Value = serde_yml::from_str(source).map_err(|e| Error::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    value.apply_merge().map_err(|e| Error::Parse {
        origin: origin.to_string(),
        message: e.to_string(),
    })?;
    match from_yaml_value(value, origin)? {
        ConfigValue::Map(m) => Ok(m),
        ConfigValue::Null => Ok(ConfigMap::open()),
        other => Err(Error::Parse {
            origin: origin.to_string(),
            message: format!("root is {}, expected a mapping", other.kind_name()),
        }),
    }
}

/// Parses a single override value with YAML scalar rules: `42` becomes an
/// int, `true` a bool, `'42'` a string, `???` the missing sentinel. Input
/// that does not parse as YAML is kept as a plain string.
pub(crate) fn parse_scalar(raw: &str) -> ConfigValue {
    if raw.trim().is_empty() {
        return ConfigValue::Str(String::new());
    }
    match serde_yml::from_str::<serde_yml::Value>(raw) {
        Ok(value) => {
            from_yaml_value(value, "override value").unwrap_or_else(|_| ConfigValue::Str(raw.to_string()))
        }
        Err(_) => ConfigValue::Str(raw.to_string()),
    }
}

fn from_yaml_value(value: serde_yml::Value, origin: &str) -> Result<ConfigValue> {
    Ok(match value {
        serde_yml::Value::Null => ConfigValue::Null,
        serde_yml::Value::Bool(b) => ConfigValue::Bool(b),
        serde_yml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                ConfigValue::Int(i)
            } else if let Some(f) = n.as_f64() {
                ConfigValue::Float(f)
            } else {
                ConfigValue::Str(n.to_string())
            }
        }
        serde_yml::Value::String(s) => {
            if s == MISSING_TOKEN {
                ConfigValue::Missing
            } else {
                ConfigValue::Str(s)
            }
        }
        serde_yml::Value::Sequence(items) => ConfigValue::List(
            items
                .into_iter()
                .map(|v| from_yaml_value(v, origin))
                .collect::<Result<Vec<_>>>()?,
        ),
        serde_yml::Value::Mapping(mapping) => {
            let mut map = ConfigMap::open();
            for (key, val) in mapping {
                let key = yaml_key_to_string(key, origin)?;
                let val = from_yaml_value(val, origin)?;
                map.insert(key, val);
            }
            ConfigValue::Map(map)
        }
        serde_yml::Value::Tagged(tagged) => from_yaml_value(tagged.value, origin)?,
    })
}

fn yaml_key_to_string(key: serde_yml::Value, origin: &str) -> Result<String> {
    match key {
        serde_yml::Value::String(s) => Ok(s),
        serde_yml::Value::Number(n) => Ok(n.to_string()),
        serde_yml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(Error::Parse {
            origin: origin.to_string(),
            message: format!("mapping key {other:?} is not a scalar"),
        }),
    }
}

/// Converts a config value into a JSON tree (missing renders as `???`).
pub(crate) fn to_json_value(value: &ConfigValue) -> serde_json::Value {
    match value {
        ConfigValue::Missing => serde_json::Value::String(MISSING_TOKEN.to_string()),
        ConfigValue::Null => serde_json::Value::Null,
        ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
        ConfigValue::Int(i) => serde_json::Value::Number((*i).into()),
        ConfigValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ConfigValue::Str(s) => serde_json::Value::String(s.clone()),
        ConfigValue::List(items) => {
            serde_json::Value::Array(items.iter().map(to_json_value).collect())
        }
        ConfigValue::Map(m) => serde_json::Value::Object(
            m.iter()
                .map(|(k, v)| (k.clone(), to_json_value(v)))
                .collect(),
        ),
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Missing => serializer.serialize_str(MISSING_TOKEN),
            ConfigValue::Null => serializer.serialize_unit(),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::Int(i) => serializer.serialize_i64(*i),
            ConfigValue::Float(f) => serializer.serialize_f64(*f),
            ConfigValue::Str(s) => serializer.serialize_str(s),
            ConfigValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigValue::Map(m) => m.serialize(serializer),
        }
    }
}

impl Serialize for ConfigMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.root().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_scalars_keep_their_kinds() {
        let map = map_from_yaml_str("port: 8080\nratio: 0.5\nname: app\nlive: true\n", "test")
            .unwrap();
        assert_eq!(map.get("port"), Some(&ConfigValue::Int(8080)));
        assert_eq!(map.get("ratio"), Some(&ConfigValue::Float(0.5)));
        assert_eq!(map.get("name"), Some(&ConfigValue::Str("app".to_string())));
        assert_eq!(map.get("live"), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn question_marks_parse_as_missing() {
        let map = map_from_yaml_str("token: ???\n", "test").unwrap();
        assert_eq!(map.get("token"), Some(&ConfigValue::Missing));
    }

    #[test]
    fn merge_keys_resolve_before_the_engine_sees_them() {
        let doc = "\
base: &base\n  host: localhost\n  port: 5432\nreplica:\n  <<: *base\n  port: 5433\n";
        let map = map_from_yaml_str(doc, "test").unwrap();
        assert_eq!(
            map.get_path("replica.host"),
            Some(&ConfigValue::Str("localhost".to_string()))
        );
        assert_eq!(map.get_path("replica.port"), Some(&ConfigValue::Int(5433)));
    }

    #[test]
    fn scalar_override_values_follow_yaml_rules() {
        assert_eq!(parse_scalar("42"), ConfigValue::Int(42));
        assert_eq!(parse_scalar("true"), ConfigValue::Bool(true));
        assert_eq!(parse_scalar("'42'"), ConfigValue::Str("42".to_string()));
        assert_eq!(parse_scalar("???"), ConfigValue::Missing);
        assert_eq!(parse_scalar(""), ConfigValue::Str(String::new()));
        assert_eq!(
            parse_scalar("[1, 2]"),
            ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)])
        );
    }

    #[test]
    fn empty_document_is_an_empty_open_map() {
        let map = map_from_yaml_str("", "test").unwrap();
        assert!(map.is_empty());
        assert!(map.is_flexible());
    }

    #[test]
    fn missing_serializes_back_to_its_token() {
        let map = map_from_yaml_str("token: ???\nport: 1\n", "test").unwrap();
        let yaml = map.to_yaml().unwrap();
        let reparsed = map_from_yaml_str(&yaml, "test").unwrap();
        assert_eq!(reparsed.get("token"), Some(&ConfigValue::Missing));
        assert_eq!(reparsed.get("port"), Some(&ConfigValue::Int(1)));
    }
}
