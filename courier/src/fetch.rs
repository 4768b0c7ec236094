use crate::errors::{Error, RemoteError, ValidationError};
use crate::metrics_defs::RESOURCE_DOWNLOADS;
use crate::transport::{Transport, TransportError};
use bytes::Bytes;
use reqwest::multipart::Part;
use shared::counter;
use std::fmt;
use url::Url;

const FALLBACK_MIME: &str = "application/octet-stream";

// Preferred extensions for common types; mime_guess lists several
// alternatives for these and the first one is not always the usual one.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("video/mp4", "mp4"),
    ("video/quicktime", "mov"),
    ("video/webm", "webm"),
    ("video/x-matroska", "mkv"),
    ("application/octet-stream", "bin"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    Video,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Image => "image",
            ResourceKind::Video => "video",
        }
    }

    pub(crate) const fn article(&self) -> &'static str {
        match self {
            ResourceKind::Image => "an image",
            ResourceKind::Video => "a video",
        }
    }

    /// Whether a declared content type is acceptable for this kind.
    ///
    /// Video also accepts `application/octet-stream` since many hosts serve
    /// video files with it.
    pub fn accepts(&self, content_type: &str) -> bool {
        let normalized = content_type.trim().to_ascii_lowercase();
        match self {
            ResourceKind::Image => normalized.starts_with("image/"),
            ResourceKind::Video => {
                normalized.starts_with("video/") || normalized.starts_with(FALLBACK_MIME)
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloaded binary, ready to be posted to an upload server.
#[derive(Debug, Clone)]
pub struct FetchedResource {
    pub content: Bytes,
    pub content_type: Option<String>,
    pub filename: String,
}

impl FetchedResource {
    /// Multipart part for the upload, labelled with the declared content type.
    pub fn to_part(&self) -> Part {
        let len = self.content.len() as u64;
        let part = || {
            Part::stream_with_length(self.content.clone(), len).file_name(self.filename.clone())
        };
        let mime = self.content_type.as_deref().unwrap_or(FALLBACK_MIME);

        part()
            .mime_str(mime)
            .or_else(|_| part().mime_str(FALLBACK_MIME))
            .unwrap_or_else(|_| part())
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Transport,
}

impl Fetcher {
    pub fn new(transport: Transport) -> Self {
        Fetcher { transport }
    }

    /// Downloads `url` and checks it looks like a `kind` resource.
    ///
    /// A response without a content-type header is accepted as is.
    pub async fn fetch(&self, url: &str, kind: ResourceKind) -> Result<FetchedResource, Error> {
        let result = self.download(url, kind).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(RESOURCE_DOWNLOADS, "kind" => kind.as_str(), "outcome" => outcome).increment(1);
        result
    }

    async fn download(&self, url: &str, kind: ResourceKind) -> Result<FetchedResource, Error> {
        tracing::debug!(url, kind = %kind, "Downloading resource");

        let raw = self
            .transport
            .get(url)
            .await
            .and_then(|raw| raw.error_for_status())
            .map_err(|e| match e {
                TransportError::Status { summary, .. } => {
                    RemoteError::new("download", format!("failed to download {kind} ({summary})"))
                }
                _ => RemoteError::new("download", format!("failed to download {kind}")),
            })?;

        if let Some(content_type) = &raw.content_type
            && !kind.accepts(content_type)
        {
            return Err(ValidationError::UnexpectedContentType {
                kind,
                content_type: content_type.clone(),
            }
            .into());
        }

        if raw.body.is_empty() {
            return Err(ValidationError::EmptyResource(kind).into());
        }

        let filename = filename_from_url(url, raw.content_type.as_deref(), kind);
        Ok(FetchedResource {
            content: raw.body,
            content_type: raw.content_type,
            filename,
        })
    }
}

/// Last path segment of `url`, or the kind name when there is none. An
/// extension inferred from `content_type` is appended to names without one.
pub fn filename_from_url(url: &str, content_type: Option<&str>, kind: ResourceKind) -> String {
    let mut name = Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
                .map(String::from)
        })
        .unwrap_or_else(|| kind.as_str().to_string());

    if !name.contains('.')
        && let Some(extension) = content_type.and_then(extension_for)
    {
        name = format!("{name}.{extension}");
    }

    name
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    PREFERRED_EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, extension)| *extension)
        .or_else(|| {
            mime_guess::get_mime_extensions_str(&essence)
                .and_then(|extensions| extensions.first().copied())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::testutils::{MockPlatform, MockReply};
    use std::time::Duration;

    fn fetcher() -> Fetcher {
        Fetcher::new(Transport::new(Duration::from_secs(5)).unwrap())
    }

    #[test]
    fn test_accepts() {
        assert!(ResourceKind::Image.accepts("image/png"));
        assert!(ResourceKind::Image.accepts("IMAGE/JPEG; charset=binary"));
        assert!(!ResourceKind::Image.accepts("text/html"));
        assert!(!ResourceKind::Image.accepts("video/mp4"));

        assert!(ResourceKind::Video.accepts("video/mp4"));
        assert!(ResourceKind::Video.accepts("application/octet-stream"));
        assert!(!ResourceKind::Video.accepts("image/gif"));
        assert!(!ResourceKind::Video.accepts("application/json"));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url(
                "https://cdn.example.com/a/cat.png?size=2",
                Some("image/png"),
                ResourceKind::Image,
            ),
            "cat.png"
        );
        assert_eq!(
            filename_from_url(
                "https://cdn.example.com/a/cat",
                Some("image/jpeg"),
                ResourceKind::Image,
            ),
            "cat.jpg"
        );
        assert_eq!(
            filename_from_url("https://cdn.example.com/", Some("image/png"), ResourceKind::Image),
            "image.png"
        );
        assert_eq!(
            filename_from_url("https://cdn.example.com", None, ResourceKind::Video),
            "video"
        );
        assert_eq!(
            filename_from_url(
                "https://cdn.example.com/clips/42/",
                Some("video/mp4; codecs=avc1"),
                ResourceKind::Video,
            ),
            "42.mp4"
        );
        assert_eq!(
            filename_from_url(
                "https://cdn.example.com/clip",
                Some("application/x-unknown-thing"),
                ResourceKind::Video,
            ),
            "clip"
        );
    }

    #[tokio::test]
    async fn test_fetch_image() {
        let platform = MockPlatform::start().await;
        platform.on_file("/files/cat", "image/png", b"\x89PNG fake");

        let resource = fetcher()
            .fetch(&format!("{}/files/cat", platform.url()), ResourceKind::Image)
            .await
            .unwrap();

        assert_eq!(resource.content.as_ref(), b"\x89PNG fake");
        assert_eq!(resource.content_type.as_deref(), Some("image/png"));
        assert_eq!(resource.filename, "cat.png");
    }

    #[tokio::test]
    async fn test_fetch_rejects_wrong_content_type() {
        let platform = MockPlatform::start().await;
        platform.on_file("/files/page.html", "text/html", b"<html></html>");

        let err = fetcher()
            .fetch(&format!("{}/files/page.html", platform.url()), ResourceKind::Image)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.to_string(),
            "URL does not point to an image (content-type text/html)"
        );
    }

    #[tokio::test]
    async fn test_fetch_video_accepts_octet_stream() {
        let platform = MockPlatform::start().await;
        platform.on_file("/files/clip", "application/octet-stream", b"0000ftypmp42");

        let resource = fetcher()
            .fetch(&format!("{}/files/clip", platform.url()), ResourceKind::Video)
            .await
            .unwrap();
        assert_eq!(resource.filename, "clip.bin");
    }

    #[tokio::test]
    async fn test_fetch_rejects_empty_body() {
        let platform = MockPlatform::start().await;
        platform.on_file("/files/empty.mp4", "video/mp4", b"");

        let err = fetcher()
            .fetch(&format!("{}/files/empty.mp4", platform.url()), ResourceKind::Video)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "downloaded video is empty");
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let platform = MockPlatform::start().await;
        platform.on(
            "/files/gone.png",
            MockReply::Raw {
                status: 410,
                content_type: Some("text/plain".into()),
                body: Bytes::from_static(b"gone"),
            },
        );

        let err = fetcher()
            .fetch(&format!("{}/files/gone.png", platform.url()), ResourceKind::Image)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Remote);
        assert!(err.to_string().contains("HTTP 410"));
    }

    #[tokio::test]
    async fn test_fetch_accepts_missing_content_type() {
        let platform = MockPlatform::start().await;
        platform.on(
            "/files/raw",
            MockReply::Raw {
                status: 200,
                content_type: None,
                body: Bytes::from_static(b"bytes"),
            },
        );

        let resource = fetcher()
            .fetch(&format!("{}/files/raw", platform.url()), ResourceKind::Image)
            .await
            .unwrap();
        assert_eq!(resource.content_type, None);
        assert_eq!(resource.filename, "raw");
    }
}
