//! Target resolution: dotted paths to registered callables.
//!
//! A statically compiled program cannot import a callable from a string the
//! way a dynamic runtime does, so resolvable targets form a closed,
//! capability-indexed table populated at startup: each callable is
//! registered under its module-qualified dotted path
//! (`"text.lower"`, `"models.Encoder.from_pretrained"`), and resolution is
//! a lookup in that table. The inverse direction is the canonical path a
//! resolved target carries; targets wrapped from bare closures have none.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::tree::ConfigValue;

/// A type-erased, shared instance produced by a target callable.
pub type Object = Arc<dyn Any + Send + Sync>;

/// Callable signature stored in the registry.
pub type TargetFn = dyn Fn(Args) -> Result<Object> + Send + Sync;

/// One prepared argument: a plain config value, an instantiated child
/// object, or a list mixing the two.
#[derive(Clone)]
pub enum ArgValue {
    Value(ConfigValue),
    Object(Object),
    List(Vec<ArgValue>),
}

impl ArgValue {
    fn describe(&self) -> String {
        match self {
            ArgValue::Value(v) => v.to_string(),
            ArgValue::Object(_) => "<object>".to_string(),
            ArgValue::List(items) => format!("<list of {}>", items.len()),
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

/// Named arguments prepared for a target call.
#[derive(Debug, Clone, Default)]
pub struct Args {
    entries: BTreeMap<String, ArgValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ArgValue)> {
        self.entries.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.entries.get(name)
    }

    /// The plain config value under `name`.
    pub fn value(&self, name: &str) -> Result<&ConfigValue> {
        match self.entries.get(name) {
            Some(ArgValue::Value(v)) => Ok(v),
            Some(other) => Err(Error::Coercion {
                path: name.to_string(),
                value: other.describe(),
                expected: "value",
            }),
            None => Err(Error::NotFound {
                path: name.to_string(),
            }),
        }
    }

    pub fn get_str(&self, name: &str) -> Result<&str> {
        match self.value(name)? {
            ConfigValue::Str(s) => Ok(s),
            other => Err(self.mismatch(name, other, "str")),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64> {
        match self.value(name)? {
            ConfigValue::Int(i) => Ok(*i),
            other => Err(self.mismatch(name, other, "int")),
        }
    }

    pub fn get_bool(&self, name: &str) -> Result<bool> {
        match self.value(name)? {
            ConfigValue::Bool(b) => Ok(*b),
            other => Err(self.mismatch(name, other, "bool")),
        }
    }

    pub fn get_float(&self, name: &str) -> Result<f64> {
        match self.value(name)? {
            ConfigValue::Float(v) => Ok(*v),
            ConfigValue::Int(i) => Ok(*i as f64),
            other => Err(self.mismatch(name, other, "float")),
        }
    }

    /// The instantiated child object under `name`, downcast to `T`.
    pub fn get_object<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        match self.entries.get(name) {
            Some(ArgValue::Object(object)) => {
                object
                    .clone()
                    .downcast::<T>()
                    .map_err(|_| Error::TypeContract {
                        target: format!("argument `{name}`"),
                        expected: std::any::type_name::<T>(),
                    })
            }
            Some(other) => Err(Error::Coercion {
                path: name.to_string(),
                value: other.describe(),
                expected: "object",
            }),
            None => Err(Error::NotFound {
                path: name.to_string(),
            }),
        }
    }

    fn mismatch(&self, name: &str, value: &ConfigValue, expected: &'static str) -> Error {
        Error::Coercion {
            path: name.to_string(),
            value: value.to_string(),
            expected,
        }
    }
}

/// A resolved target: the callable plus the canonical dotted path it was
/// registered under.
#[derive(Clone)]
pub struct Target {
    path: Option<String>,
    func: Arc<TargetFn>,
}

impl Target {
    /// Wraps a bare closure. The result is callable but has no importable
    /// name, so [`Target::canonical_path`] fails for it.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(Args) -> Result<Object> + Send + Sync + 'static,
    {
        Target {
            path: None,
            func: Arc::new(func),
        }
    }

    pub fn call(&self, args: Args) -> Result<Object> {
        (self.func)(args)
    }

    /// The dotted path this target resolves from; the round-trip inverse of
    /// [`TargetRegistry::resolve`].
    pub fn canonical_path(&self) -> Result<&str> {
        self.path.as_deref().ok_or_else(|| Error::UnresolvableTarget {
            path: "<anonymous>".to_string(),
            message: "target has no importable name".to_string(),
        })
    }

    /// Display name for logs and errors.
    pub(crate) fn display_name(&self) -> &str {
        self.path.as_deref().unwrap_or("<anonymous>")
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("path", &self.display_name())
            .finish()
    }
}

/// Capability-indexed lookup table from dotted paths to callables,
/// populated by explicit registration at startup.
#[derive(Clone, Default)]
pub struct TargetRegistry {
    entries: BTreeMap<String, Arc<TargetFn>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callable under its module-qualified dotted path. A later
    /// registration under the same path replaces the earlier one.
    pub fn register<F>(&mut self, path: &str, func: F)
    where
        F: Fn(Args) -> Result<Object> + Send + Sync + 'static,
    {
        tracing::trace!(path, "registering target");
        self.entries.insert(path.to_string(), Arc::new(func));
    }

    /// Registers a callable returning a concrete type, wrapping the result
    /// into a shared type-erased object.
    pub fn register_value<T, F>(&mut self, path: &str, func: F)
    where
        T: Send + Sync + 'static,
        F: Fn(Args) -> Result<T> + Send + Sync + 'static,
    {
        self.register(path, move |args| Ok(Arc::new(func(args)?) as Object));
    }

    /// Maps a dotted path to the callable it names.
    pub fn resolve(&self, path: &str) -> Result<Target> {
        match self.entries.get(path) {
            Some(func) => Ok(Target {
                path: Some(path.to_string()),
                func: func.clone(),
            }),
            None => Err(Error::UnresolvableTarget {
                path: path.to_string(),
                message: "no such registration".to_string(),
            }),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Registered paths, in order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.paths()).finish()
    }
}
