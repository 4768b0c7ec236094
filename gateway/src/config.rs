use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("internal_token cannot be empty")]
    EmptyToken,
}

/// Inbound HTTP surface configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the relay endpoints
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Listener for health and readiness checks
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
    /// Shared secret every caller must present
    pub internal_token: String,
}

impl Config {
    pub fn new(internal_token: impl Into<String>) -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
            internal_token: internal_token.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.internal_token.trim().is_empty() {
            return Err(ValidationError::EmptyToken);
        }
        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "0.0.0.0".into(),
        port: 8000,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 8001,
    }
}
