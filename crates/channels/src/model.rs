//! Platform-neutral update and message types.
//!
//! Source adapters decode their wire payloads into these types once; from
//! then on everything downstream matches on closed enums.

use {
    bytes::Bytes,
    serde::{Deserialize, Serialize},
};

/// One inbound event envelope retrieved from the source platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Strictly increasing per source account.
    pub id: i64,
    pub kind: UpdateKind,
}

/// Payload of an [`Update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    Message(Message),
    EditedMessage(Message),
    /// Any other event kind. Only the platform tag is kept.
    Other { tag: String },
}

impl UpdateKind {
    /// Listener name used for dispatch.
    pub fn name(&self) -> &str {
        match self {
            Self::Message(_) => "message",
            Self::EditedMessage(_) => "edited_message",
            Self::Other { tag } => tag,
        }
    }
}

impl Update {
    /// Message payload for new and edited messages.
    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            UpdateKind::Message(msg) | UpdateKind::EditedMessage(msg) => Some(msg),
            UpdateKind::Other { .. } => None,
        }
    }
}

/// Who sent a message. Channel posts carry the channel itself as sender.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl Sender {
    /// Identities used for allow/block list matching: numeric id, then
    /// username when present.
    pub fn identities(&self) -> Vec<String> {
        let mut ids = vec![self.id.to_string()];
        if let Some(username) = &self.username {
            ids.push(username.clone());
        }
        ids
    }
}

/// A source message, either freshly posted or edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender: Sender,
    /// Unix seconds of the original post (not of the edit).
    pub date: i64,
    pub text: String,
    pub entities: Vec<Entity>,
    pub media: Vec<MediaRef>,
    pub reply_to: Option<i64>,
    pub edited: bool,
}

impl Message {
    /// Length of `text` in UTF-16 code units, the unit entity offsets use.
    pub fn utf16_len(&self) -> usize {
        self.text.encode_utf16().count()
    }

    /// Drop entities whose span does not fit inside the text.
    ///
    /// Keeps the declaration order of the remaining entities.
    #[must_use]
    pub fn with_valid_entities(mut self) -> Self {
        let limit = self.utf16_len();
        self.entities.retain(|e| e.fits_within(limit));
        self
    }
}

/// A formatting range over a message text, offsets in UTF-16 code units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl Entity {
    pub fn new(kind: EntityKind, offset: usize, length: usize) -> Self {
        Self {
            kind,
            offset,
            length,
        }
    }

    pub fn end(&self) -> usize {
        self.offset.saturating_add(self.length)
    }

    pub fn fits_within(&self, utf16_len: usize) -> bool {
        self.offset.checked_add(self.length).is_some() && self.end() <= utf16_len
    }
}

/// Closed set of entity kinds known to the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Spoiler,
    Code,
    Pre { language: Option<String> },
    Blockquote,
    ExpandableBlockquote,
    TextLink { url: String },
    Url,
    Email,
    PhoneNumber,
    Mention,
    TextMention { user_id: i64 },
    Hashtag,
    Cashtag,
    BotCommand,
    CustomEmoji { emoji_id: String },
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bold => "bold",
            Self::Italic => "italic",
            Self::Underline => "underline",
            Self::Strikethrough => "strikethrough",
            Self::Spoiler => "spoiler",
            Self::Code => "code",
            Self::Pre { .. } => "pre",
            Self::Blockquote => "blockquote",
            Self::ExpandableBlockquote => "expandable_blockquote",
            Self::TextLink { .. } => "text_link",
            Self::Url => "url",
            Self::Email => "email",
            Self::PhoneNumber => "phone_number",
            Self::Mention => "mention",
            Self::TextMention { .. } => "text_mention",
            Self::Hashtag => "hashtag",
            Self::Cashtag => "cashtag",
            Self::BotCommand => "bot_command",
            Self::CustomEmoji { .. } => "custom_emoji",
        }
    }
}

/// Kind of an attached media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Audio,
    Voice,
    Document,
    Sticker,
}

impl MediaKind {
    /// Extension used when the platform does not report a file name.
    pub fn default_extension(self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Video | Self::Animation => "mp4",
            Self::Audio => "mp3",
            Self::Voice => "ogg",
            Self::Document => "bin",
            Self::Sticker => "webp",
        }
    }
}

/// Reference to a media file on the source platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub file_id: String,
    pub file_name: Option<String>,
    pub size: Option<u64>,
}

impl MediaRef {
    /// File name to upload under, falling back to `<kind>.<ext>`.
    pub fn upload_name(&self) -> String {
        match &self.file_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => {
                let kind = serde_json::to_value(self.kind)
                    .ok()
                    .and_then(|v| v.as_str().map(str::to_owned))
                    .unwrap_or_else(|| "file".into());
                format!("{kind}.{}", self.kind.default_extension())
            },
        }
    }
}

/// Media bytes fetched from the source platform, ready to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedMedia {
    pub filename: String,
    pub data: Bytes,
}
