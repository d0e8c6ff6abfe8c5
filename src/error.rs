//! Error types for meld operations.

/// Result type for meld operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while composing configuration or instantiating targets.
///
/// Every fatal condition is a distinct variant so calling code can
/// discriminate programmatically; nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An override introduced an unknown field into a closed section, or
    /// tried to replace a mapping with a scalar (or the reverse).
    #[error("schema violation at `{path}`: {message}")]
    SchemaViolation { path: String, message: String },

    /// An override value could not be cast to the declared field kind.
    #[error("cannot coerce `{value}` at `{path}` to {expected}")]
    Coercion {
        path: String,
        value: String,
        expected: &'static str,
    },

    /// One or more required fields survived finalization unset.
    #[error("required field(s) not provided: {}", .paths.join(", "))]
    MissingRequired { paths: Vec<String> },

    /// No value exists at the addressed path.
    #[error("no value at `{path}`")]
    NotFound { path: String },

    /// A target path does not name a registered callable.
    #[error("cannot resolve target `{path}`: {message}")]
    UnresolvableTarget { path: String, message: String },

    /// An instantiated object did not have the expected type.
    #[error("target `{target}` did not produce the expected type `{expected}`")]
    TypeContract {
        target: String,
        expected: &'static str,
    },

    /// A target subtree appeared on its own construction chain.
    #[error("target at `{path}` is nested inside its own arguments")]
    SelfReferentialTarget { path: String },

    /// Instantiation was requested on a node without a `_target_` field.
    #[error("no target specified at `{path}`")]
    NoTarget { path: String },

    /// A command-line token that is neither a flag nor a `key=value` pair.
    #[error("malformed override `{token}`: expected key.path=value")]
    MalformedOverride { token: String },

    /// Source content that is not valid YAML, or whose root is not a mapping.
    #[error("cannot parse {origin}: {message}")]
    Parse { origin: String, message: String },

    /// I/O failure while reading a file source.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// Deferred invocations hand their stored preparation failure back on every
// call, so errors must be cloneable; io::Error is the one variant that
// cannot derive it.
impl Clone for Error {
    fn clone(&self) -> Self {
        match self {
            Error::SchemaViolation { path, message } => Error::SchemaViolation {
                path: path.clone(),
                message: message.clone(),
            },
            Error::Coercion {
                path,
                value,
                expected,
            } => Error::Coercion {
                path: path.clone(),
                value: value.clone(),
                expected,
            },
            Error::MissingRequired { paths } => Error::MissingRequired {
                paths: paths.clone(),
            },
            Error::NotFound { path } => Error::NotFound { path: path.clone() },
            Error::UnresolvableTarget { path, message } => Error::UnresolvableTarget {
                path: path.clone(),
                message: message.clone(),
            },
            Error::TypeContract { target, expected } => Error::TypeContract {
                target: target.clone(),
                expected,
            },
            Error::SelfReferentialTarget { path } => Error::SelfReferentialTarget {
                path: path.clone(),
            },
            Error::NoTarget { path } => Error::NoTarget { path: path.clone() },
            Error::MalformedOverride { token } => Error::MalformedOverride {
                token: token.clone(),
            },
            Error::Parse { origin, message } => Error::Parse {
                origin: origin.clone(),
                message: message.clone(),
            },
            Error::Io(e) => Error::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}
