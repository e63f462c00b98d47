use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    Result,
    model::{DownloadedMedia, MediaRef, Update},
};

// ── Source side ─────────────────────────────────────────────────────────────

/// Request collaborator for the platform messages are read from.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Long-poll for updates with id ≥ `offset`, waiting at most `timeout`.
    ///
    /// An `offset` of `-1` asks for the newest pending update only.
    async fn poll(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>>;

    /// Download an attached file.
    async fn download_media(&self, media: &MediaRef) -> Result<DownloadedMedia>;
}

/// Builds a [`SourceClient`] from the account secret (e.g. a bot token).
pub trait SourceConnector: Send + Sync {
    fn connect(&self, secret: &str) -> Result<Arc<dyn SourceClient>>;
}

// ── Destination side ────────────────────────────────────────────────────────

/// Address of one forwarded copy on the destination platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestRef {
    pub message_id: String,
    pub channel_id: String,
}

impl DestRef {
    pub fn new(message_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            channel_id: channel_id.into(),
        }
    }
}

/// Message body handed to a [`Destination`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination markup.
    pub content: String,
    /// Same text without markup, used when the destination rejects `content`.
    pub plain: String,
    pub media: Vec<DownloadedMedia>,
}

/// A message as currently stored on the destination platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationMessage {
    pub id: String,
    pub channel_id: String,
    pub content: String,
}

/// Delivery collaborator for the platform messages are forwarded to.
///
/// `edit` and `reply` return [`crate::Error::NotFound`] when the addressed
/// message has been deleted on the destination side.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Post a new top-level message; returns the destination message id.
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<String>;

    /// Replace the text of an existing message. Only `content` (or `plain`
    /// on fallback) is applied; `media` is ignored and attachments already
    /// on the message stay as they are.
    async fn edit(&self, target: &DestRef, message: &OutboundMessage) -> Result<()>;

    /// Post a reply to `target` in its channel; returns the new message id.
    async fn reply(&self, target: &DestRef, message: &OutboundMessage) -> Result<String>;

    /// Look up a message, `None` if it no longer exists.
    async fn fetch(&self, target: &DestRef) -> Result<Option<DestinationMessage>>;
}
