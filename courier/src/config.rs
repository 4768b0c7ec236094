use crate::errors::ConfigError;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_VERSION: &str = "5.131";
pub const DEFAULT_API_URL: &str = "https://api.vk.com/method";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: f64 = 10.0;

/// Platform credentials and connection settings.
///
/// Built once at startup and shared read-only by every request.
#[derive(Clone, Deserialize, PartialEq)]
pub struct Credentials {
    /// Token injected into every platform call.
    pub access_token: String,
    /// Elevated (user) token for wall and video uploads. Falls back to
    /// `access_token` when unset.
    #[serde(default)]
    pub wall_access_token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Conversation that message sends are delivered to.
    pub peer_id: String,
    /// Community id, kept as configured and resolved on use.
    #[serde(default)]
    pub group_id: Option<String>,
    /// Base endpoint; method calls go to `{api_url}/{method}`.
    #[serde(default = "default_api_url")]
    pub api_url: Url,
    /// Applied to every outbound call, downloads and uploads included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: f64,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_api_url() -> Url {
    // The literal is a valid absolute URL.
    Url::parse(DEFAULT_API_URL).expect("default API URL is valid")
}

fn default_request_timeout_secs() -> f64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Credentials {
            access_token: access_token.into(),
            wall_access_token: None,
            api_version: default_api_version(),
            peer_id: peer_id.into(),
            group_id: None,
            api_url: default_api_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Startup checks. Anything rejected here would otherwise fail every
    /// request that touches it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_token.trim().is_empty() {
            return Err(ConfigError::Missing("access_token".into()));
        }
        if self.peer_id.trim().is_empty() {
            return Err(ConfigError::Missing("peer_id".into()));
        }
        if self.api_version.trim().is_empty() {
            return Err(ConfigError::Missing("api_version".into()));
        }
        let timeout = Duration::try_from_secs_f64(self.request_timeout_secs);
        if !timeout.is_ok_and(|timeout| !timeout.is_zero()) {
            return Err(ConfigError::Invalid {
                name: "request_timeout_secs".into(),
                expected: "a positive number of seconds",
            });
        }
        if !matches!(self.api_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "api_url".into(),
                expected: "an http(s) URL",
            });
        }
        // An absent group id is only an error for operations that need it.
        self.configured_group_id()?;
        Ok(())
    }

    /// Falls back to the default for values [`Credentials::validate`]
    /// rejects.
    pub fn request_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.request_timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Token for wall posts, wall photo uploads and native video uploads.
    pub fn wall_token(&self) -> &str {
        self.wall_access_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .unwrap_or(&self.access_token)
    }

    pub fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_url.as_str().trim_end_matches('/'), method)
    }

    /// The configured group id as a positive integer.
    ///
    /// The sign of the configured value is ignored, so both `100` and `-100`
    /// resolve to `100`.
    pub fn group_id(&self) -> Result<i64, ConfigError> {
        self.configured_group_id()?
            .ok_or_else(|| ConfigError::Missing("group_id".into()))
    }

    /// Owner id used for wall posts: the negated group id.
    pub fn group_owner_id(&self) -> Result<i64, ConfigError> {
        self.group_id().map(|id| -id)
    }

    /// Like [`Credentials::group_id`], but an unset value is `Ok(None)`.
    pub fn configured_group_id(&self) -> Result<Option<i64>, ConfigError> {
        let raw = match self.group_id.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ => return Ok(None),
        };

        raw.parse::<i64>()
            .ok()
            .and_then(i64::checked_abs)
            .map(Some)
            .ok_or_else(|| ConfigError::Invalid {
                name: "group_id".into(),
                expected: "an integer",
            })
    }
}

// Tokens are kept out of debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field(
                "wall_access_token",
                &self.wall_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("api_version", &self.api_version)
            .field("peer_id", &self.peer_id)
            .field("group_id", &self.group_id)
            .field("api_url", &self.api_url.as_str())
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}
