use crate::errors::RemoteError;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Photo,
    Video,
    Doc,
}

impl AttachmentKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Photo => "photo",
            AttachmentKind::Video => "video",
            AttachmentKind::Doc => "doc",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to an uploaded asset, rendered as
/// `{kind}{owner_id}_{item_id}` with an optional `_{access_key}` suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub owner_id: i64,
    pub item_id: i64,
    pub access_key: Option<String>,
}

impl Attachment {
    pub fn new(
        kind: AttachmentKind,
        owner_id: i64,
        item_id: i64,
        access_key: Option<&str>,
    ) -> Self {
        Attachment {
            kind,
            owner_id,
            item_id,
            access_key: access_key
                .filter(|key| !key.is_empty())
                .map(String::from),
        }
    }

    /// Builds an attachment from identifiers pulled out of a save response.
    /// Both ids are required; a missing one fails the request with `context`.
    pub fn from_ids(
        kind: AttachmentKind,
        owner_id: Option<i64>,
        item_id: Option<i64>,
        access_key: Option<&str>,
        context: &str,
    ) -> Result<Self, RemoteError> {
        match (owner_id, item_id) {
            (Some(owner_id), Some(item_id)) => {
                Ok(Attachment::new(kind, owner_id, item_id, access_key))
            }
            (None, _) => Err(RemoteError::new(
                context,
                format!("invalid {kind} data: missing owner_id"),
            )),
            (_, None) => Err(RemoteError::new(
                context,
                format!("invalid {kind} data: missing id"),
            )),
        }
    }
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}_{}", self.kind, self.owner_id, self.item_id)?;
        if let Some(access_key) = &self.access_key {
            write!(f, "_{access_key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let attachment = Attachment::new(AttachmentKind::Photo, 123, 456, Some("abc"));
        assert_eq!(attachment.to_string(), "photo123_456_abc");
        // Rendering is stable
        assert_eq!(attachment.to_string(), attachment.to_string());

        let attachment = Attachment::new(AttachmentKind::Photo, 123, 456, None);
        assert_eq!(attachment.to_string(), "photo123_456");

        let attachment = Attachment::new(AttachmentKind::Doc, -100, 7, Some(""));
        assert_eq!(attachment.to_string(), "doc-100_7");

        let attachment = Attachment::new(AttachmentKind::Video, 1, 2, Some("k"));
        assert_eq!(attachment.to_string(), "video1_2_k");
    }

    #[test]
    fn test_from_ids_requires_both() {
        let context = "photos.saveMessagesPhoto";
        let ok = Attachment::from_ids(AttachmentKind::Photo, Some(1), Some(2), None, context);
        assert_eq!(ok.unwrap().to_string(), "photo1_2");

        let err =
            Attachment::from_ids(AttachmentKind::Photo, None, Some(2), None, context).unwrap_err();
        assert_eq!(err.context, "photos.saveMessagesPhoto");
        assert!(err.message.contains("owner_id"));

        let err = Attachment::from_ids(AttachmentKind::Video, Some(1), None, None, "video.save")
            .unwrap_err();
        assert_eq!(err.to_string(), "video.save: invalid video data: missing id");
    }
}
