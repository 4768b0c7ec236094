//! JSON bodies accepted by the relay endpoints.

use courier::VideoDelivery;
use serde::Deserialize;
use std::fmt;
use url::Url;

/// Every request body carries the caller's token.
pub trait Authenticated {
    fn token(&self) -> &str;
}

/// An absolute `http` or `https` URL with a host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct HttpUrl(Url);

impl HttpUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for HttpUrl {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let url = Url::parse(value.trim()).map_err(|e| format!("invalid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err("URL scheme should be 'http' or 'https'".into());
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err("URL must have a host".into());
        }
        Ok(HttpUrl(url))
    }
}

impl fmt::Display for HttpUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub token: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct SendImageRequest {
    pub token: String,
    pub image: HttpUrl,
}

#[derive(Debug, Deserialize)]
pub struct SendVideoRequest {
    pub token: String,
    pub video: HttpUrl,
    /// `video` (default) or `document`.
    #[serde(default)]
    pub send_type: VideoDelivery,
}

#[derive(Debug, Deserialize)]
pub struct SendPostRequest {
    pub token: String,
    pub message: String,
    #[serde(default)]
    pub image: Option<HttpUrl>,
}

macro_rules! impl_authenticated {
    ($($ty:ty),+) => {
        $(impl Authenticated for $ty {
            fn token(&self) -> &str {
                &self.token
            }
        })+
    };
}

impl_authenticated!(
    SendMessageRequest,
    SendImageRequest,
    SendVideoRequest,
    SendPostRequest
);
