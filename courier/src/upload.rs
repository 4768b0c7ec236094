//! Upload orchestration: obtain an upload server, post the binary to it,
//! save the uploaded asset and turn the save response into an attachment.
//!
//! Steps run strictly in order since each needs the previous step's output.
//! A missing key at any step fails the whole upload.

use crate::api::{Params, PlatformApi};
use crate::attachment::{Attachment, AttachmentKind};
use crate::errors::RemoteError;
use crate::fetch::FetchedResource;
use crate::metrics_defs::PLATFORM_UPLOADS;
use crate::transport::{RawResponse, TransportError};
use reqwest::multipart::Form;
use serde::Deserialize;
use serde_json::Value;
use shared::counter;

const UPLOAD_CONTEXT: &str = "upload";

#[derive(Deserialize)]
struct UploadServer {
    upload_url: Option<String>,
}

/// Upload server reply for photos.
#[derive(Deserialize)]
struct PhotoUploadReply {
    server: Option<Value>,
    photo: Option<Value>,
    hash: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SavedPhotos {
    Many(Vec<PhotoInfo>),
    One(PhotoInfo),
}

#[derive(Deserialize)]
struct PhotoInfo {
    owner_id: Option<i64>,
    id: Option<i64>,
    photo_id: Option<i64>,
    access_key: Option<String>,
}

/// `video.save` replies with the upload URL and the ids of the video record
/// it has already created.
#[derive(Deserialize)]
struct VideoSave {
    upload_url: Option<String>,
    owner_id: Option<i64>,
    video_id: Option<i64>,
    vid: Option<i64>,
    id: Option<i64>,
    access_key: Option<String>,
}

#[derive(Deserialize)]
struct DocUploadReply {
    file: Option<String>,
}

/// Shapes accepted from `docs.save`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocSaveResponse {
    /// `{"doc": {...}}`, optionally with `"type": "doc"`.
    Wrapped { doc: DocInfo },
    /// `[{...}]`; the first element is the document.
    List(Vec<DocInfo>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DocInfo {
    pub owner_id: Option<i64>,
    pub id: Option<i64>,
    pub doc_id: Option<i64>,
    pub access_key: Option<String>,
}

/// Pulls the document record out of a `docs.save` response.
pub fn extract_doc_info(save_response: Value) -> Result<DocInfo, RemoteError> {
    let invalid = || RemoteError::new("docs.save", "invalid document data");

    match serde_json::from_value::<DocSaveResponse>(save_response).map_err(|_| invalid())? {
        DocSaveResponse::Wrapped { doc } => Ok(doc),
        DocSaveResponse::List(docs) => docs.into_iter().next().ok_or_else(invalid),
    }
}

/// Runs the upload choreographies against one authenticated session.
#[derive(Clone)]
pub struct Uploader {
    api: PlatformApi,
}

impl Uploader {
    pub fn new(api: PlatformApi) -> Self {
        Uploader { api }
    }

    /// Uploads a photo for a wall post in the given community.
    pub async fn wall_photo(
        &self,
        group_id: i64,
        resource: &FetchedResource,
    ) -> Result<Attachment, RemoteError> {
        let group_id = group_id.to_string();
        self.photo(
            ("photos.getWallUploadServer", vec![("group_id", group_id.clone())]),
            ("photos.saveWallPhoto", vec![("group_id", group_id)]),
            resource,
        )
        .await
    }

    /// Uploads a photo to be attached to a message in `peer_id`.
    pub async fn message_photo(
        &self,
        peer_id: &str,
        resource: &FetchedResource,
    ) -> Result<Attachment, RemoteError> {
        self.photo(
            (
                "photos.getMessagesUploadServer",
                vec![("peer_id", peer_id.to_string())],
            ),
            ("photos.saveMessagesPhoto", vec![]),
            resource,
        )
        .await
    }

    /// Uploads a native video. `video.save` creates the record up front, so
    /// the attachment comes from its reply and there is no confirmation call.
    pub async fn message_video(
        &self,
        group_id: Option<i64>,
        resource: &FetchedResource,
    ) -> Result<Attachment, RemoteError> {
        const METHOD: &str = "video.save";

        let mut params: Params = vec![
            ("name", resource.filename.clone()),
            ("is_private", "1".to_string()),
        ];
        if let Some(group_id) = group_id {
            params.push(("group_id", group_id.to_string()));
        }

        let save: VideoSave = self.api.invoke_as(METHOD, params).await?;
        let upload_url = save
            .upload_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RemoteError::new(METHOD, "upload URL not received"))?;
        let attachment = Attachment::from_ids(
            AttachmentKind::Video,
            save.owner_id,
            save.video_id.or(save.vid).or(save.id),
            save.access_key.as_deref(),
            METHOD,
        )?;

        // The upload server's reply carries nothing the attachment needs.
        self.post_file(&upload_url, "video_file", resource).await?;

        Ok(attachment)
    }

    /// Uploads any file as a message document.
    pub async fn message_document(
        &self,
        peer_id: &str,
        resource: &FetchedResource,
    ) -> Result<Attachment, RemoteError> {
        let upload_url = self
            .upload_server(
                "docs.getMessagesUploadServer",
                vec![("peer_id", peer_id.to_string()), ("type", "doc".to_string())],
            )
            .await?;

        let reply: DocUploadReply = self
            .post_file(&upload_url, "file", resource)
            .await?
            .json()
            .map_err(invalid_upload_reply)?;
        let file = reply
            .file
            .filter(|file| !file.is_empty())
            .ok_or_else(|| {
                RemoteError::new(UPLOAD_CONTEXT, "invalid upload response: missing `file`")
            })?;

        let saved = self
            .api
            .invoke(
                "docs.save",
                vec![("file", file), ("title", resource.filename.clone())],
            )
            .await?;
        let doc = extract_doc_info(saved)?;

        Attachment::from_ids(
            AttachmentKind::Doc,
            doc.owner_id,
            doc.id.or(doc.doc_id),
            doc.access_key.as_deref(),
            "docs.save",
        )
    }

    /// Shared photo flow; wall and message photos differ only in method
    /// names and the scoping parameters.
    async fn photo(
        &self,
        (server_method, server_params): (&str, Params),
        (save_method, mut save_params): (&str, Params),
        resource: &FetchedResource,
    ) -> Result<Attachment, RemoteError> {
        let upload_url = self.upload_server(server_method, server_params).await?;

        let reply: PhotoUploadReply = self
            .post_file(&upload_url, "photo", resource)
            .await?
            .json()
            .map_err(invalid_upload_reply)?;
        for (key, value) in [
            ("server", reply.server),
            ("photo", reply.photo),
            ("hash", reply.hash),
        ] {
            let value = value.ok_or_else(|| {
                RemoteError::new(
                    UPLOAD_CONTEXT,
                    format!("invalid upload response: missing `{key}`"),
                )
            })?;
            save_params.push((key, param_value(value)));
        }

        let saved: SavedPhotos = self.api.invoke_as(save_method, save_params).await?;
        let photo = match saved {
            SavedPhotos::Many(photos) => photos.into_iter().next(),
            SavedPhotos::One(photo) => Some(photo),
        }
        .ok_or_else(|| RemoteError::new(save_method, "image was not saved"))?;

        Attachment::from_ids(
            AttachmentKind::Photo,
            photo.owner_id,
            photo.id.or(photo.photo_id),
            photo.access_key.as_deref(),
            save_method,
        )
    }

    async fn upload_server(&self, method: &str, params: Params) -> Result<String, RemoteError> {
        let server: UploadServer = self.api.invoke_as(method, params).await?;
        server
            .upload_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RemoteError::new(method, "upload URL not received"))
    }

    /// POSTs the resource as a single multipart field named `field`.
    async fn post_file(
        &self,
        upload_url: &str,
        field: &'static str,
        resource: &FetchedResource,
    ) -> Result<RawResponse, RemoteError> {
        tracing::debug!(
            field,
            filename = %resource.filename,
            size = resource.content.len(),
            "Uploading file"
        );

        let form = Form::new().part(field, resource.to_part());
        let result = self
            .api
            .transport()
            .post_multipart(upload_url, form)
            .await
            .and_then(|raw| raw.error_for_status());

        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!(PLATFORM_UPLOADS, "field" => field, "outcome" => outcome).increment(1);

        result.map_err(|e| match e {
            TransportError::Status { summary, .. } => RemoteError::new(
                UPLOAD_CONTEXT,
                format!("failed to upload {} ({summary})", resource.filename),
            ),
            _ => RemoteError::new(
                UPLOAD_CONTEXT,
                format!("failed to upload {}", resource.filename),
            ),
        })
    }
}

fn invalid_upload_reply(e: TransportError) -> RemoteError {
    match e {
        TransportError::InvalidJson { summary } => {
            RemoteError::new(UPLOAD_CONTEXT, format!("invalid upload response ({summary})"))
        }
        other => RemoteError::new(UPLOAD_CONTEXT, other.to_string()),
    }
}

/// Upload replies mix numbers and strings; both are forwarded verbatim.
fn param_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{MockPlatform, MockReply};
    use crate::transport::Transport;
    use bytes::Bytes;
    use serde_json::json;
    use std::sync::Arc;

    fn uploader_for(platform: &MockPlatform) -> Uploader {
        let credentials = Arc::new(platform.credentials());
        let transport = Transport::new(credentials.request_timeout()).unwrap();
        Uploader::new(PlatformApi::new(transport, credentials))
    }

    fn image() -> FetchedResource {
        FetchedResource {
            content: Bytes::from_static(b"fake-png"),
            content_type: Some("image/png".into()),
            filename: "cat.png".into(),
        }
    }

    fn video() -> FetchedResource {
        FetchedResource {
            content: Bytes::from_static(b"fake-mp4"),
            content_type: Some("video/mp4".into()),
            filename: "clip.mp4".into(),
        }
    }

    fn script_photo_upload(platform: &MockPlatform, server_method: &str) {
        platform.on_method(
            server_method,
            json!({"response": {"upload_url": format!("{}/upload/photo", platform.url())}}),
        );
        platform.on(
            "/upload/photo",
            MockReply::Json(json!({
                "server": 838,
                "photo": "[{\"photo\":\"abc\"}]",
                "hash": "h4sh"
            })),
        );
    }

    #[test]
    fn test_extract_doc_info_shapes() {
        let expected = DocInfo {
            owner_id: Some(-100),
            id: Some(55),
            doc_id: None,
            access_key: Some("k".into()),
        };
        let doc = json!({"owner_id": -100, "id": 55, "access_key": "k"});

        assert_eq!(extract_doc_info(json!({"doc": doc.clone()})).unwrap(), expected);
        assert_eq!(
            extract_doc_info(json!({"type": "doc", "doc": doc.clone()})).unwrap(),
            expected
        );
        assert_eq!(extract_doc_info(json!([doc.clone()])).unwrap(), expected);
    }

    #[test]
    fn test_extract_doc_info_rejects_other_shapes() {
        for value in [
            json!([]),
            json!({"owner_id": 1, "id": 2}),
            json!({"type": "doc"}),
            json!("doc"),
            json!(12),
            json!(null),
        ] {
            let err = extract_doc_info(value.clone()).unwrap_err();
            assert_eq!(err.context, "docs.save", "shape: {value}");
        }
    }

    #[tokio::test]
    async fn test_message_photo() {
        let platform = MockPlatform::start().await;
        script_photo_upload(&platform, "photos.getMessagesUploadServer");
        platform.on_method(
            "photos.saveMessagesPhoto",
            json!({"response": [{"owner_id": 123, "id": 456, "access_key": "abc"}]}),
        );

        let attachment = uploader_for(&platform)
            .message_photo("2000000001", &image())
            .await
            .unwrap();
        assert_eq!(attachment.to_string(), "photo123_456_abc");

        assert_eq!(
            platform.method_params("photos.getMessagesUploadServer")["peer_id"],
            "2000000001"
        );

        let upload = &platform.calls_to("/upload/photo")[0];
        assert!(upload.content_type.as_deref().unwrap().starts_with("multipart/form-data"));
        let body = upload.body_text();
        assert!(body.contains("name=\"photo\""));
        assert!(body.contains("filename=\"cat.png\""));
        assert!(body.contains("fake-png"));

        let save = platform.method_params("photos.saveMessagesPhoto");
        assert_eq!(save["server"], "838");
        assert_eq!(save["photo"], "[{\"photo\":\"abc\"}]");
        assert_eq!(save["hash"], "h4sh");
        assert!(!save.contains_key("group_id"));
    }

    #[tokio::test]
    async fn test_wall_photo_is_group_scoped() {
        let platform = MockPlatform::start().await;
        script_photo_upload(&platform, "photos.getWallUploadServer");
        platform.on_method(
            "photos.saveWallPhoto",
            json!({"response": [{"owner_id": -100, "photo_id": 9}]}),
        );

        let attachment = uploader_for(&platform)
            .wall_photo(100, &image())
            .await
            .unwrap();
        assert_eq!(attachment.to_string(), "photo-100_9");

        assert_eq!(platform.method_params("photos.getWallUploadServer")["group_id"], "100");
        assert_eq!(platform.method_params("photos.saveWallPhoto")["group_id"], "100");
    }

    #[tokio::test]
    async fn test_photo_upload_missing_key_stops_before_save() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "photos.getMessagesUploadServer",
            json!({"response": {"upload_url": format!("{}/upload/photo", platform.url())}}),
        );
        platform.on("/upload/photo", MockReply::Json(json!({"server": 1, "photo": "x"})));

        let err = uploader_for(&platform)
            .message_photo("1", &image())
            .await
            .unwrap_err();

        assert_eq!(err.context, "upload");
        assert!(err.message.contains("`hash`"));
        assert_eq!(platform.api_methods(), vec!["photos.getMessagesUploadServer"]);
    }

    #[tokio::test]
    async fn test_missing_upload_url() {
        let platform = MockPlatform::start().await;
        platform.on_method("photos.getMessagesUploadServer", json!({"response": {}}));

        let err = uploader_for(&platform)
            .message_photo("1", &image())
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "photos.getMessagesUploadServer: upload URL not received"
        );
        assert!(platform.calls_to("/upload/photo").is_empty());
    }

    #[tokio::test]
    async fn test_photo_not_saved() {
        let platform = MockPlatform::start().await;
        script_photo_upload(&platform, "photos.getMessagesUploadServer");
        platform.on_method("photos.saveMessagesPhoto", json!({"response": []}));

        let err = uploader_for(&platform)
            .message_photo("1", &image())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "photos.saveMessagesPhoto: image was not saved");
    }

    #[tokio::test]
    async fn test_saved_photo_without_owner() {
        let platform = MockPlatform::start().await;
        script_photo_upload(&platform, "photos.getMessagesUploadServer");
        platform.on_method("photos.saveMessagesPhoto", json!({"response": [{"id": 5}]}));

        let err = uploader_for(&platform)
            .message_photo("1", &image())
            .await
            .unwrap_err();
        assert!(err.message.contains("missing owner_id"));
    }

    #[tokio::test]
    async fn test_message_video() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "video.save",
            json!({"response": {
                "upload_url": format!("{}/upload/video", platform.url()),
                "owner_id": 77,
                "vid": 88,
                "access_key": "vk"
            }}),
        );
        // Video upload servers reply with a non-JSON body
        platform.on_file("/upload/video", "text/plain", b"ok");

        let attachment = uploader_for(&platform)
            .message_video(Some(100), &video())
            .await
            .unwrap();
        assert_eq!(attachment.to_string(), "video77_88_vk");

        let save = platform.method_params("video.save");
        assert_eq!(save["name"], "clip.mp4");
        assert_eq!(save["is_private"], "1");
        assert_eq!(save["group_id"], "100");

        let upload = &platform.calls_to("/upload/video")[0];
        assert!(upload.body_text().contains("name=\"video_file\""));
    }

    #[tokio::test]
    async fn test_message_video_missing_ids_skips_upload() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "video.save",
            json!({"response": {
                "upload_url": format!("{}/upload/video", platform.url()),
                "owner_id": 1
            }}),
        );

        let err = uploader_for(&platform)
            .message_video(None, &video())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "video.save: invalid video data: missing id");
        assert!(platform.calls_to("/upload/video").is_empty());
        assert!(!platform.method_params("video.save").contains_key("group_id"));
    }

    #[tokio::test]
    async fn test_message_video_upload_failure() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "video.save",
            json!({"response": {
                "upload_url": format!("{}/upload/video", platform.url()),
                "owner_id": 1,
                "video_id": 2
            }}),
        );
        platform.on(
            "/upload/video",
            MockReply::Raw {
                status: 503,
                content_type: None,
                body: Bytes::new(),
            },
        );

        let err = uploader_for(&platform)
            .message_video(None, &video())
            .await
            .unwrap_err();
        assert_eq!(err.context, "upload");
        assert!(err.message.contains("HTTP 503"));
    }

    #[tokio::test]
    async fn test_message_document() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "docs.getMessagesUploadServer",
            json!({"response": {"upload_url": format!("{}/upload/doc", platform.url())}}),
        );
        platform.on("/upload/doc", MockReply::Json(json!({"file": "file-token"})));
        platform.on_method(
            "docs.save",
            json!({"response": {"type": "doc", "doc": {"owner_id": 5, "doc_id": 6}}}),
        );

        let attachment = uploader_for(&platform)
            .message_document("2000000001", &video())
            .await
            .unwrap();
        assert_eq!(attachment.to_string(), "doc5_6");

        let server = platform.method_params("docs.getMessagesUploadServer");
        assert_eq!(server["peer_id"], "2000000001");
        assert_eq!(server["type"], "doc");

        assert!(platform.calls_to("/upload/doc")[0].body_text().contains("name=\"file\""));

        let save = platform.method_params("docs.save");
        assert_eq!(save["file"], "file-token");
        assert_eq!(save["title"], "clip.mp4");
    }

    #[tokio::test]
    async fn test_message_document_missing_file_token() {
        let platform = MockPlatform::start().await;
        platform.on_method(
            "docs.getMessagesUploadServer",
            json!({"response": {"upload_url": format!("{}/upload/doc", platform.url())}}),
        );
        platform.on("/upload/doc", MockReply::Json(json!({"error": "no_file"})));

        let err = uploader_for(&platform)
            .message_document("1", &video())
            .await
            .unwrap_err();

        assert_eq!(err.context, "upload");
        assert!(err.message.contains("`file`"));
        assert_eq!(platform.api_methods(), vec!["docs.getMessagesUploadServer"]);
    }
}
