use std::fmt;
use std::time::Duration;

/// Result type for duologue-providers operations
pub type Result<T> = std::result::Result<T, Error>;

/// Vendor-agnostic classification of a failed provider call.
///
/// Every concrete adapter maps its vendor's HTTP statuses and error bodies
/// into this taxonomy; everything above the provider layer branches on the
/// kind, never on vendor specifics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 429 with a rate signal; retryable
    RateLimit,
    /// Vendor reports capacity pressure (e.g. 529, overloaded_error); retryable
    Overloaded,
    /// 5xx without a more specific signal; retryable
    ServerError,
    /// Deadline exceeded or vendor-side timeout; retryable up to the cap
    Timeout,
    /// Connection-level failure before a status was received; retryable
    Network,
    /// Bad or missing credentials; never retried
    Authentication,
    /// Billing or hard quota exhaustion; never retried
    Quota,
    /// Malformed or unsupported request; never retried
    InvalidRequest,
    /// History exceeds the model's context window; never retried
    ContextLength,
}

impl ErrorKind {
    pub fn retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit
                | ErrorKind::Overloaded
                | ErrorKind::ServerError
                | ErrorKind::Timeout
                | ErrorKind::Network
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::Quota => "quota",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ContextLength => "context_length",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error types that can occur in the provider layer
#[derive(Debug)]
pub enum Error {
    /// Classified vendor failure
    Api {
        vendor: String,
        kind: ErrorKind,
        message: String,
        /// Vendor-reported wait hint (Retry-After), honored when it exceeds
        /// the computed backoff
        retry_after: Option<Duration>,
    },

    /// Transport failure before classification was possible
    Http(reqwest::Error),

    /// Malformed vendor payload
    Json(serde_json::Error),

    /// Missing API key or bad provider construction
    Config(String),
}

impl Error {
    pub fn api(vendor: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::Api {
            vendor: vendor.into(),
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// The taxonomy kind for this error. Transport errors classify by shape.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api { kind, .. } => *kind,
            Error::Http(err) if err.is_timeout() => ErrorKind::Timeout,
            Error::Http(_) => ErrorKind::Network,
            Error::Json(_) => ErrorKind::InvalidRequest,
            Error::Config(_) => ErrorKind::InvalidRequest,
        }
    }

    pub fn retryable(&self) -> bool {
        self.kind().retryable()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Error::Api { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Api {
                vendor,
                kind,
                message,
                ..
            } => write!(f, "{} API error ({}): {}", vendor, kind, message),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
            Error::Config(msg) => write!(f, "Provider configuration error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(err) => Some(err),
            Error::Json(err) => Some(err),
            Error::Api { .. } | Error::Config(_) => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
