//! Override sources: files, inline YAML, trees, and dotted pairs.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::tree::{map_from_yaml_str, parse_scalar, ConfigMap, ConfigValue};

/// One ordered override input. Later sources win over earlier ones.
///
/// File and YAML sources are realized lazily, at finalize time, so a
/// composition can be assembled fluently and still report read/parse
/// failures from one place.
#[derive(Debug, Clone)]
pub enum OverrideSource {
    /// A YAML file, read when the composition is finalized.
    File(PathBuf),
    /// An inline YAML document.
    Yaml(String),
    /// An already-built tree.
    Tree(ConfigMap),
    /// A single dotted-path pair token, `a.b.c=value`.
    Pair(String),
}

impl OverrideSource {
    pub fn file(path: impl AsRef<Path>) -> Self {
        OverrideSource::File(path.as_ref().to_path_buf())
    }

    pub fn yaml(document: impl Into<String>) -> Self {
        OverrideSource::Yaml(document.into())
    }

    pub fn tree(map: ConfigMap) -> Self {
        OverrideSource::Tree(map)
    }

    /// A `key.path=value` token as it arrives from the command line.
    pub fn pair(token: impl Into<String>) -> Self {
        OverrideSource::Pair(token.into())
    }

    /// Realizes this source into a mergeable tree.
    pub(crate) fn load(&self) -> Result<ConfigMap> {
        match self {
            OverrideSource::File(path) => {
                let text = std::fs::read_to_string(path)?;
                map_from_yaml_str(&text, &format!("file {}", path.display()))
            }
            OverrideSource::Yaml(document) => map_from_yaml_str(document, "inline YAML"),
            OverrideSource::Tree(map) => Ok(map.clone()),
            OverrideSource::Pair(token) => pair_to_map(token),
        }
    }

    /// One-line description for logging and the `--inputs` printout.
    pub(crate) fn describe(&self) -> String {
        match self {
            OverrideSource::File(path) => format!("file {}", path.display()),
            OverrideSource::Yaml(_) => "inline YAML".to_string(),
            OverrideSource::Tree(_) => "tree".to_string(),
            OverrideSource::Pair(token) => format!("override {token}"),
        }
    }
}

/// Splits `a.b.c=value` and rebuilds it as a minimal nested mapping, so the
/// ordinary deep-merge rules apply to it.
fn pair_to_map(token: &str) -> Result<ConfigMap> {
    let (path, raw_value) = token.split_once('=').ok_or_else(|| Error::MalformedOverride {
        token: token.to_string(),
    })?;
    let path = path.trim();
    if path.is_empty() || path.split('.').any(|segment| segment.is_empty()) {
        return Err(Error::MalformedOverride {
            token: token.to_string(),
        });
    }

    let mut value = parse_scalar(raw_value);
    for segment in path.rsplit('.') {
        let mut map = ConfigMap::open();
        map.insert(segment, value);
        value = ConfigValue::Map(map);
    }
    match value {
        ConfigValue::Map(map) => Ok(map),
        // unreachable: the loop always wraps at least once
        _ => Err(Error::MalformedOverride {
            token: token.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_becomes_minimal_nested_mapping() {
        let map = OverrideSource::pair("a.b.c=7").load().unwrap();
        assert_eq!(map.get_path("a.b.c"), Some(&ConfigValue::Int(7)));
    }

    #[test]
    fn pair_values_follow_yaml_scalar_rules() {
        let map = OverrideSource::pair("flag=true").load().unwrap();
        assert_eq!(map.get("flag"), Some(&ConfigValue::Bool(true)));
        let map = OverrideSource::pair("name='42'").load().unwrap();
        assert_eq!(map.get("name"), Some(&ConfigValue::Str("42".to_string())));
    }

    #[test]
    fn tokens_without_equals_are_malformed() {
        let err = OverrideSource::pair("no-equals-here").load().unwrap_err();
        assert!(matches!(err, Error::MalformedOverride { .. }));
    }

    #[test]
    fn empty_path_segments_are_malformed() {
        for token in ["=1", "a..b=1", ".a=1"] {
            let err = OverrideSource::pair(token).load().unwrap_err();
            assert!(matches!(err, Error::MalformedOverride { .. }), "{token}");
        }
    }
}
