use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Longest body excerpt carried in diagnostics.
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error ({summary})")]
    Status { status: StatusCode, summary: String },

    #[error("invalid JSON ({summary})")]
    InvalidJson { summary: String },
}

/// Thin wrapper over a shared `reqwest::Client` with the configured timeout.
///
/// The client holds no per-request state, so clones can be used from any
/// number of concurrent requests.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
}

impl Transport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(concat!("vkrelay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Transport { client })
    }

    /// POST form-encoded parameters.
    pub async fn post_form(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<RawResponse, TransportError> {
        let response = self.client.post(url).form(params).send().await?;
        RawResponse::read(response).await
    }

    /// POST a multipart form.
    pub async fn post_multipart(
        &self,
        url: &str,
        form: Form,
    ) -> Result<RawResponse, TransportError> {
        let response = self.client.post(url).multipart(form).send().await?;
        RawResponse::read(response).await
    }

    /// GET, following redirects.
    pub async fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let response = self.client.get(url).send().await?;
        RawResponse::read(response).await
    }
}

/// A fully collected response. Status is not checked until
/// [`RawResponse::error_for_status`] is called.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl RawResponse {
    async fn read(response: reqwest::Response) -> Result<Self, TransportError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.bytes().await?;

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.status.as_u16() >= 400 {
            return Err(TransportError::Status {
                status: self.status,
                summary: self.summary(),
            });
        }
        Ok(self)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|_| TransportError::InvalidJson {
            summary: self.summary(),
        })
    }

    /// One-line description for error messages: status, content type and a
    /// whitespace-collapsed body excerpt.
    pub fn summary(&self) -> String {
        let mut parts = vec![
            format!("HTTP {}", self.status.as_u16()),
            format!(
                "content-type {}",
                self.content_type.as_deref().unwrap_or("unknown")
            ),
        ];

        let snippet = body_snippet(&self.body);
        if !snippet.is_empty() {
            parts.push(format!("body: {snippet}"));
        }

        parts.join(", ")
    }
}

fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() > SNIPPET_MAX_CHARS {
        let truncated: String = collapsed.chars().take(SNIPPET_MAX_CHARS).collect();
        format!("{truncated}...")
    } else {
        collapsed
    }
}
