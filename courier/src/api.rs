use crate::config::Credentials;
use crate::errors::RemoteError;
use crate::metrics_defs::PLATFORM_CALLS;
use crate::transport::{Transport, TransportError};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

/// Form parameters for one platform call, excluding credentials.
pub type Params = Vec<(&'static str, String)>;

#[derive(Deserialize)]
struct Envelope {
    response: Option<Value>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error_code: Option<i64>,
    error_msg: Option<String>,
}

/// Calls RPC-style platform methods.
///
/// Every call is a form-encoded POST to `{api_url}/{method}` with
/// `access_token` and `v` injected. The reply envelope carries either a
/// `response` or an `error` object.
#[derive(Clone)]
pub struct PlatformApi {
    transport: Transport,
    credentials: Arc<Credentials>,
    access_token: String,
}

impl PlatformApi {
    pub fn new(transport: Transport, credentials: Arc<Credentials>) -> Self {
        let access_token = credentials.access_token.clone();
        PlatformApi {
            transport,
            credentials,
            access_token,
        }
    }

    /// The same client, authenticating with a different token.
    pub fn with_token(&self, access_token: &str) -> Self {
        PlatformApi {
            transport: self.transport.clone(),
            credentials: self.credentials.clone(),
            access_token: access_token.to_string(),
        }
    }

    pub(crate) fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Invokes `method` and returns the `response` payload.
    pub async fn invoke(&self, method: &str, params: Params) -> Result<Value, RemoteError> {
        tracing::debug!(method, "Invoking platform method");

        let result = self.call(method, params).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(PLATFORM_CALLS, "method" => method.to_string(), "outcome" => outcome).increment(1);

        if let Err(e) = &result {
            tracing::warn!(method, error = %e, "Platform method failed");
        }
        result
    }

    /// Invokes `method` and decodes the `response` payload into `T`.
    pub async fn invoke_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Params,
    ) -> Result<T, RemoteError> {
        let response = self.invoke(method, params).await?;
        serde_json::from_value(response)
            .map_err(|e| RemoteError::new(method, format!("unexpected response shape: {e}")))
    }

    async fn call(&self, method: &str, params: Params) -> Result<Value, RemoteError> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        form.push(("access_token", self.access_token.clone()));
        form.push(("v", self.credentials.api_version.clone()));
        form.extend(params);

        let url = self.credentials.method_url(method);
        let raw = self
            .transport
            .post_form(&url, &form)
            .await
            .and_then(|raw| raw.error_for_status())
            .map_err(|e| match e {
                TransportError::Network(_) => {
                    RemoteError::new(method, "failed to reach platform API")
                }
                TransportError::Status { summary, .. } => {
                    RemoteError::new(method, format!("platform API HTTP error ({summary})"))
                }
                TransportError::InvalidJson { summary } => {
                    RemoteError::new(
                        method,
                        format!("invalid response from platform API ({summary})"),
                    )
                }
            })?;

        let value: Value = raw.json().map_err(|_| {
            RemoteError::new(
                method,
                format!("invalid response from platform API ({})", raw.summary()),
            )
        })?;

        extract_response(method, value)
    }
}

/// Unwraps a decoded envelope: an `error` object wins, otherwise the
/// `response` field must be present.
fn extract_response(method: &str, value: Value) -> Result<Value, RemoteError> {
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|_| RemoteError::new(method, "invalid response"))?;

    if let Some(error) = envelope.error {
        let message = error
            .error_msg
            .unwrap_or_else(|| "platform API error".to_string());
        return Err(RemoteError::new(method, message).with_code(error.error_code));
    }

    envelope
        .response
        .ok_or_else(|| RemoteError::new(method, "invalid response"))
}
