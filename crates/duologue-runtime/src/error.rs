use std::fmt;

/// Result type for duologue-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Provider layer error
    Provider(duologue_providers::Error),

    /// Engine layer error
    Engine(duologue_engine::Error),

    /// Store layer error
    Store(duologue_store::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Serialization failed
    Json(serde_json::Error),

    /// Configuration error; fatal at startup, no events are emitted
    Config(String),

    /// The event bus rejected an emission
    Bus(String),

    /// Cooperative cancellation observed; not a failure
    Cancelled,
}

impl Error {
    /// Provider error kind when this wraps one
    pub fn provider_kind(&self) -> Option<duologue_providers::ErrorKind> {
        match self {
            Error::Provider(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Provider(err) => write!(f, "Provider error: {}", err),
            Error::Engine(err) => write!(f, "Engine error: {}", err),
            Error::Store(err) => write!(f, "Store error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Bus(msg) => write!(f, "Event bus error: {}", msg),
            Error::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Provider(err) => Some(err),
            Error::Engine(err) => Some(err),
            Error::Store(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Config(_) | Error::Bus(_) | Error::Cancelled => None,
        }
    }
}

impl From<duologue_providers::Error> for Error {
    fn from(err: duologue_providers::Error) -> Self {
        Error::Provider(err)
    }
}

impl From<duologue_engine::Error> for Error {
    fn from(err: duologue_engine::Error) -> Self {
        Error::Engine(err)
    }
}

impl From<duologue_store::Error> for Error {
    fn from(err: duologue_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

impl From<duologue_types::Error> for Error {
    fn from(err: duologue_types::Error) -> Self {
        match err {
            duologue_types::Error::Json(err) => Error::Json(err),
            duologue_types::Error::Validation(msg) => Error::Config(msg),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
