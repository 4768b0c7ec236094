use crate::fetch::ResourceKind;
use thiserror::Error;

/// Result type alias for courier operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required setting is missing or malformed.
    Config,
    /// The platform (or a download host) rejected the call, was unreachable,
    /// or returned malformed data.
    Remote,
    /// Caller-supplied input failed a precondition.
    Validation,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) => ErrorKind::Config,
            Error::Remote(_) => ErrorKind::Remote,
            Error::Validation(_) => ErrorKind::Validation,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(String),

    #[error("{name} must be {expected}")]
    Invalid {
        name: String,
        expected: &'static str,
    },

    #[error("could not build HTTP client: {0}")]
    HttpClient(String),
}

/// A failure reported by, or while talking to, a remote party.
///
/// `context` names the step that failed: the platform method for API calls,
/// `upload` for raw uploads and `download` for resource fetches.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{context}: {message}")]
pub struct RemoteError {
    pub context: String,
    pub message: String,
    /// Platform error code, when the platform reported one.
    pub code: Option<i64>,
}

impl RemoteError {
    pub fn new(context: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            context: context.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: Option<i64>) -> Self {
        self.code = code;
        self
    }

    /// True when the platform refused the call because it is unavailable
    /// with a group (community) token.
    ///
    /// The platform only signals this through its message text, so this is
    /// a case-insensitive substring match on the rendered error. Only the
    /// video send fallback relies on it.
    pub fn is_group_auth_failure(&self) -> bool {
        self.to_string().to_lowercase().contains("group auth")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("URL does not point to {} (content-type {content_type})", .kind.article())]
    UnexpectedContentType {
        kind: ResourceKind,
        content_type: String,
    },

    #[error("downloaded {0} is empty")]
    EmptyResource(ResourceKind),
}
