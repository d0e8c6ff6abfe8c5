//! The merge engine: ordered override composition over a schema base.
//!
//! A [`Composer`] starts from a base (a structured [`Schema`] or a raw
//! tree), accumulates override sources fluently in arrival order, and
//! produces a single resolved [`ConfigTree`]:
//!
//! ```rust
//! use meld::{Composer, Field, Schema};
//!
//! let schema = Schema::new("server")
//!     .field(Field::str("host").default("127.0.0.1"))
//!     .field(Field::int("port").default(8080));
//!
//! let config = Composer::new(schema)
//!     .with_yaml("port: 9000")
//!     .with_option("host=0.0.0.0")
//!     .finalize()?;
//!
//! assert_eq!(config.get_str("host")?, "0.0.0.0");
//! assert_eq!(config.get_int("port")?, 9000);
//! # Ok::<(), meld::Error>(())
//! ```
//!
//! For any key path present in more than one source, the latest source
//! wins; paths present in only one source survive unchanged.

mod source;

pub use source::OverrideSource;

use std::path::Path;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::tree::{merge_map, ConfigMap, ConfigTree};

/// Base of a composition: a structured schema or a raw tree.
#[derive(Debug, Clone)]
pub enum Base {
    Structured(Schema),
    Raw(ConfigMap),
}

impl Base {
    /// Uniform conversion to the initial accumulator tree.
    pub fn instantiate(&self) -> Result<ConfigMap> {
        match self {
            Base::Structured(schema) => schema.instantiate(),
            Base::Raw(map) => Ok(map.clone()),
        }
    }

    /// Display name for printouts.
    pub fn label(&self) -> &str {
        match self {
            Base::Structured(schema) => schema.name(),
            Base::Raw(_) => "config",
        }
    }
}

impl From<Schema> for Base {
    fn from(schema: Schema) -> Self {
        Base::Structured(schema)
    }
}

impl From<ConfigMap> for Base {
    fn from(map: ConfigMap) -> Self {
        Base::Raw(map)
    }
}

impl From<ConfigTree> for Base {
    fn from(tree: ConfigTree) -> Self {
        Base::Raw(tree.into_root())
    }
}

/// Composes a base with ordered override sources; later sources win.
#[derive(Debug, Clone)]
pub struct Composer {
    base: Base,
    sources: Vec<OverrideSource>,
}

impl Composer {
    pub fn new(base: impl Into<Base>) -> Self {
        Composer {
            base: base.into(),
            sources: Vec::new(),
        }
    }

    /// Adds a YAML file source.
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        self.with_source(OverrideSource::file(path))
    }

    /// Adds an inline YAML source.
    pub fn with_yaml(self, document: impl Into<String>) -> Self {
        self.with_source(OverrideSource::yaml(document))
    }

    /// Adds an already-built tree source.
    pub fn with_tree(self, map: ConfigMap) -> Self {
        self.with_source(OverrideSource::tree(map))
    }

    /// Adds a single `key.path=value` override.
    pub fn with_option(self, token: impl Into<String>) -> Self {
        self.with_source(OverrideSource::pair(token))
    }

    /// Adds `key.path=value` overrides in the order given.
    pub fn with_options<I, S>(self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        tokens
            .into_iter()
            .fold(self, |composer, token| composer.with_option(token))
    }

    pub fn with_source(mut self, source: OverrideSource) -> Self {
        self.sources.push(source);
        self
    }

    fn accumulate(&self) -> Result<ConfigMap> {
        let mut acc = self.base.instantiate()?;
        for source in &self.sources {
            tracing::debug!(source = %source.describe(), "merging override source");
            let tree = source.load()?;
            merge_map(&mut acc, tree, "")?;
        }
        Ok(acc)
    }

    /// Merges all sources and fails if any required field is still unset,
    /// naming every offending dotted path.
    pub fn finalize(&self) -> Result<ConfigTree> {
        let tree = self.finalize_partial()?;
        let missing = tree.missing_paths();
        if !missing.is_empty() {
            return Err(Error::MissingRequired { paths: missing });
        }
        Ok(tree)
    }

    /// Merges all sources, leaving missing sentinels in place for
    /// allow-missing inspection.
    pub fn finalize_partial(&self) -> Result<ConfigTree> {
        Ok(ConfigTree::new(self.accumulate()?))
    }
}
