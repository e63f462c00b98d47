//! Config schema types (telegram source, discord destinations, bridge policy, storage).

use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub telegram: TelegramConfig,
    pub discord: DiscordConfig,
    pub bridge: BridgeConfig,
    pub storage: StorageConfig,
}

/// Source side: the Telegram bot and the chat it reads from.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Chat or channel id messages are forwarded from (e.g. `-1001234567890`).
    pub source_chat_id: i64,

    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,

    /// Pause after a failed poll before trying again.
    pub error_backoff_secs: u64,

    /// Pause after an empty poll result.
    pub idle_backoff_ms: u64,

    /// Resume from the persisted update cursor instead of skipping backlog.
    pub resume_from_checkpoint: bool,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("source_chat_id", &self.source_chat_id)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            source_chat_id: 0,
            poll_timeout_secs: 300,
            error_backoff_secs: 5,
            idle_backoff_ms: 250,
            resume_from_checkpoint: true,
        }
    }
}

/// Public Discord origin.
pub const DISCORD_ORIGIN: &str = "https://discord.com";

/// Destination side: the Discord bot and the channels it posts to.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token from the Discord developer portal.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Channel ids every new message is sent to, in delivery order.
    pub channel_ids: Vec<String>,

    /// Origin the REST calls go to. Anything other than the Discord origin
    /// is treated as a proxy in front of it.
    pub api_base: String,

    /// Attachments larger than this are not uploaded.
    pub max_upload_bytes: u64,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"[REDACTED]")
            .field("channel_ids", &self.channel_ids)
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            channel_ids: Vec::new(),
            api_base: DISCORD_ORIGIN.into(),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// What to do with an edit or reply whose source message has no recorded
/// destination copies.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Forward it as a fresh top-level message.
    #[default]
    SendAsNew,
    /// Forward nothing.
    Drop,
}

/// Whether forwarded messages are prefixed with the sender.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SenderDisplay {
    #[default]
    None,
    /// Display name (first + last name, or channel title).
    Name,
    /// `@username`, falling back to the display name.
    Username,
}

/// Forwarding policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Sender ids/usernames allowed through. Empty means everyone.
    pub allowlist: Vec<String>,

    /// Sender ids/usernames that are never forwarded.
    pub blocklist: Vec<String>,

    /// New messages older than this are not forwarded. Edits are exempt.
    pub freshness_secs: u64,

    /// Correlations older than this are swept.
    pub retention_days: u32,

    /// How often the retention sweep runs.
    pub sweep_interval_hours: u64,

    pub orphan_policy: OrphanPolicy,

    pub sender_display: SenderDisplay,

    /// Turn scheme-less URLs into links.
    pub linkify: bool,

    /// Download and re-upload attachments.
    pub forward_media: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            allowlist: Vec::new(),
            blocklist: Vec::new(),
            freshness_secs: 120,
            retention_days: 30,
            sweep_interval_hours: 6,
            orphan_policy: OrphanPolicy::default(),
            sender_display: SenderDisplay::default(),
            linkify: true,
            forward_media: true,
        }
    }
}

/// Where correlations and the feed checkpoint are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file. Relative paths resolve against the data dir.
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("ferry.db"),
        }
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}
