//! Layered configuration composition for experiment-driven programs.
//!
//! meld merges a declared schema with ordered override sources and can turn
//! the result into live objects:
//!
//! - **Schemas** - nested records with typed fields, defaults, and a
//!   missing sentinel for required-but-unset values
//! - **Composition** - YAML files and `key.path=value` pairs deep-merged
//!   over the schema defaults in a fixed precedence order (later wins)
//! - **Validation** - strict finalization reports every unset required
//!   field at once; string overrides coerce to the declared scalar kinds
//! - **Instantiation** - a reserved `_target_` field names a registered
//!   callable, invoked immediately or deferred, with nested targets
//!   constructed depth-first
//! - **Flexible schemas** - a schema marked open accepts override fields
//!   beyond its declared set
//!
//! # Composing
//!
//! ```rust
//! use meld::{Composer, Field, Schema};
//!
//! let schema = Schema::new("train")
//!     .field(Field::str("corpus").default("data/corpus.txt"))
//!     .field(Field::int("batch_size").default(32));
//!
//! let config = Composer::new(schema)
//!     .with_yaml("batch_size: 64")        // e.g. from a file
//!     .with_option("batch_size=128")      // e.g. from the command line
//!     .finalize()?;
//!
//! assert_eq!(config.get_int("batch_size")?, 128);
//! assert_eq!(config.get_str("corpus")?, "data/corpus.txt");
//! # Ok::<(), meld::Error>(())
//! ```
//!
//! # Instantiating
//!
//! ```rust
//! use meld::{ConfigTree, Instantiator, TargetRegistry};
//!
//! let mut registry = TargetRegistry::new();
//! registry.register_value("text.lower", |args| {
//!     Ok(args.get_str("value")?.to_lowercase())
//! });
//!
//! let config = ConfigTree::from_yaml("_target_: text.lower\nvalue: ABC")?;
//! let engine = Instantiator::new(registry).advise_untyped(false);
//! let lowered = engine.now::<String>(config.root())?;
//! assert_eq!(lowered.as_str(), "abc");
//! # Ok::<(), meld::Error>(())
//! ```
//!
//! Programs that want the full command-line surface (`-c` file flags,
//! trailing `key=value` overrides, print flags) wrap their main function
//! with [`cli::run`].

pub mod cli;
pub mod compose;
pub mod error;
pub mod init;
pub mod schema;
pub mod target;
pub mod tree;

pub use compose::{Base, Composer, OverrideSource};
pub use error::{Error, Result};
pub use init::{Deferred, Instantiator};
pub use schema::{Field, FieldKind, Schema};
pub use target::{ArgValue, Args, Object, Target, TargetRegistry};
pub use tree::{ConfigMap, ConfigTree, ConfigValue, ValueKind, TARGET_KEY};
