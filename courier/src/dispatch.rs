use crate::api::{Params, PlatformApi};
use crate::attachment::Attachment;
use crate::config::Credentials;
use crate::errors::{ConfigError, Error, Result};
use crate::fetch::{FetchedResource, Fetcher, ResourceKind};
use crate::metrics_defs::VIDEO_FALLBACK;
use crate::transport::Transport;
use crate::upload::Uploader;
use serde::Deserialize;
use serde_json::Value;
use shared::counter;
use std::sync::Arc;

/// How a video should be delivered to the conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoDelivery {
    /// Native video, falling back to a document when the token cannot
    /// upload videos.
    #[default]
    Video,
    /// Always send as a document.
    Document,
}

/// Entry point for the four relay operations.
///
/// Stateless apart from the shared credentials and HTTP client, so a single
/// instance serves any number of concurrent requests.
#[derive(Clone)]
pub struct Courier {
    credentials: Arc<Credentials>,
    api: PlatformApi,
    wall_api: PlatformApi,
    fetcher: Fetcher,
}

impl Courier {
    pub fn new(credentials: Arc<Credentials>) -> Result<Self> {
        let transport = Transport::new(credentials.request_timeout())
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        let api = PlatformApi::new(transport.clone(), credentials.clone());
        let wall_api = api.with_token(credentials.wall_token());

        Ok(Courier {
            credentials,
            api,
            wall_api,
            fetcher: Fetcher::new(transport),
        })
    }

    /// Sends a plain text message to the configured peer.
    pub async fn send_text(&self, message: &str) -> Result<Value> {
        let params = self.message_params(vec![("message", message.to_string())]);
        Ok(self.api.invoke("messages.send", params).await?)
    }

    /// Downloads an image and sends it as a message photo.
    pub async fn send_image(&self, image_url: &str) -> Result<Value> {
        let resource = self.fetcher.fetch(image_url, ResourceKind::Image).await?;
        let attachment = Uploader::new(self.api.clone())
            .message_photo(&self.credentials.peer_id, &resource)
            .await?;
        self.send_attachment(&attachment).await
    }

    /// Downloads a video and sends it natively or as a document.
    ///
    /// A native attempt rejected with a group authorization error is retried
    /// once as a document, reusing the downloaded bytes. Any other failure is
    /// returned as is.
    pub async fn send_video(&self, video_url: &str, delivery: VideoDelivery) -> Result<Value> {
        let resource = self.fetcher.fetch(video_url, ResourceKind::Video).await?;

        if delivery == VideoDelivery::Document {
            return self.send_document(&resource).await;
        }

        match self.send_native_video(&resource).await {
            Err(Error::Remote(e)) if e.is_group_auth_failure() => {
                tracing::warn!(error = %e, "Video upload not permitted, sending as document");
                counter!(VIDEO_FALLBACK).increment(1);
                self.send_document(&resource).await
            }
            result => result,
        }
    }

    /// Publishes a wall post on behalf of the configured community, with an
    /// optional image.
    pub async fn send_post(&self, message: &str, image_url: Option<&str>) -> Result<Value> {
        let group_id = self.credentials.group_id()?;
        let owner_id = self.credentials.group_owner_id()?;

        let mut params: Params = vec![
            ("owner_id", owner_id.to_string()),
            ("from_group", "1".to_string()),
            ("message", message.to_string()),
        ];

        if let Some(image_url) = image_url {
            let resource = self.fetcher.fetch(image_url, ResourceKind::Image).await?;
            let attachment = Uploader::new(self.wall_api.clone())
                .wall_photo(group_id, &resource)
                .await?;
            params.push(("attachments", attachment.to_string()));
        }

        Ok(self.wall_api.invoke("wall.post", params).await?)
    }

    async fn send_native_video(&self, resource: &FetchedResource) -> Result<Value> {
        let group_id = self.credentials.configured_group_id()?;
        let attachment = Uploader::new(self.wall_api.clone())
            .message_video(group_id, resource)
            .await?;
        self.send_attachment(&attachment).await
    }

    async fn send_document(&self, resource: &FetchedResource) -> Result<Value> {
        let attachment = Uploader::new(self.api.clone())
            .message_document(&self.credentials.peer_id, resource)
            .await?;
        self.send_attachment(&attachment).await
    }

    async fn send_attachment(&self, attachment: &Attachment) -> Result<Value> {
        tracing::debug!(attachment = %attachment, "Sending attachment");
        let params = self.message_params(vec![("attachment", attachment.to_string())]);
        Ok(self.api.invoke("messages.send", params).await?)
    }

    fn message_params(&self, mut extra: Params) -> Params {
        let mut params: Params = vec![
            ("peer_id", self.credentials.peer_id.clone()),
            ("random_id", "0".to_string()),
        ];
        params.append(&mut extra);
        params
    }
}
