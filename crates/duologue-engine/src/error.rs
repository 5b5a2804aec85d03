use std::fmt;

/// Result type for duologue-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the engine layer
#[derive(Debug)]
pub enum Error {
    /// IO operation failed
    Io(std::io::Error),

    /// Malformed event line
    Json(serde_json::Error),

    /// Event log violates a replay invariant
    Replay(String),

    /// Invalid calculator or router input
    Invalid(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Replay(msg) => write!(f, "Replay error: {}", msg),
            Error::Invalid(msg) => write!(f, "Invalid input: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Replay(_) | Error::Invalid(_) => None,
        }
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
            duologue_types::Error::Validation(msg) => Error::Invalid(msg),
        }
    }
}
