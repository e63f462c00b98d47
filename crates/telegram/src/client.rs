use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    teloxide::{
        Bot,
        payloads::GetUpdatesSetters,
        requests::{Request, Requester},
        types::{self as tg, AllowedUpdate},
    },
    tracing::{debug, info, warn},
};

use ferry_channels::{
    DownloadedMedia, Entity, EntityKind, MediaKind, MediaRef, Message, Sender, SourceClient,
    SourceConnector, Update, UpdateKind,
};

use crate::error::Error;

/// Added on top of the long-poll timeout so the HTTP client does not abort
/// the request before Telegram answers.
const POLL_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

/// Builds [`TelegramClient`]s from a bot token.
#[derive(Debug, Clone)]
pub struct TelegramConnector {
    request_timeout: Duration,
    api_url: Option<reqwest::Url>,
}

impl TelegramConnector {
    pub fn new(poll_timeout: Duration) -> Self {
        Self {
            request_timeout: poll_timeout + POLL_TIMEOUT_SLACK,
            api_url: None,
        }
    }

    /// Talk to a different Bot API server (self-hosted or a test double).
    #[must_use]
    pub fn with_api_url(mut self, api_url: reqwest::Url) -> Self {
        self.api_url = Some(api_url);
        self
    }
}

impl SourceConnector for TelegramConnector {
    fn connect(&self, secret: &str) -> ferry_channels::Result<Arc<dyn SourceClient>> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| Error::external("failed to build telegram http client", e))?;
        let mut bot = Bot::with_client(secret, client);
        if let Some(url) = &self.api_url {
            bot = bot.set_api_url(url.clone());
        }
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()
            .map_err(Error::from)?;
        Ok(Arc::new(TelegramClient::new(bot, http)))
    }
}

/// Bot API client implementing the source side of the bridge.
pub struct TelegramClient {
    bot: Bot,
    /// File downloads go through this client, not the bot's own.
    http: reqwest::Client,
    webhook_cleared: AtomicBool,
}

impl TelegramClient {
    pub fn new(bot: Bot, http: reqwest::Client) -> Self {
        Self {
            bot,
            http,
            webhook_cleared: AtomicBool::new(false),
        }
    }

    /// Long polling only works once any webhook is removed.
    async fn ensure_webhook_cleared(&self) {
        if self.webhook_cleared.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.bot.delete_webhook().send().await {
            Ok(_) => info!("telegram webhook cleared, long polling enabled"),
            Err(e) => {
                warn!(error = %e, "failed to clear telegram webhook");
                self.webhook_cleared.store(false, Ordering::SeqCst);
            },
        }
    }
}

#[async_trait]
impl SourceClient for TelegramClient {
    async fn poll(&self, offset: i64, timeout: Duration) -> ferry_channels::Result<Vec<Update>> {
        self.ensure_webhook_cleared().await;

        let offset = i32::try_from(offset).map_err(|_| {
            ferry_channels::Error::invalid_input(format!("update offset {offset} out of range"))
        })?;
        let timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);

        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(timeout)
            .allowed_updates(vec![
                AllowedUpdate::Message,
                AllowedUpdate::EditedMessage,
                AllowedUpdate::ChannelPost,
                AllowedUpdate::EditedChannelPost,
            ])
            .await
            .map_err(Error::from)?;

        debug!(offset, count = updates.len(), "got telegram updates");
        Ok(updates.into_iter().map(convert_update).collect())
    }

    async fn download_media(&self, media: &MediaRef) -> ferry_channels::Result<DownloadedMedia> {
        let file = self
            .bot
            .get_file(media.file_id.clone())
            .await
            .map_err(Error::from)?;

        // https://api.telegram.org/file/bot<token>/<file_path>
        let url = self
            .bot
            .api_url()
            .join(&format!("file/bot{}/{}", self.bot.token(), file.path))
            .map_err(|e| Error::external("invalid telegram file url", e))?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Error::from)?;
        if !response.status().is_success() {
            return Err(ferry_channels::Error::protocol(format!(
                "telegram file download returned HTTP {}",
                response.status()
            )));
        }
        let data = response.bytes().await.map_err(Error::from)?;

        debug!(
            file_id = %media.file_id,
            bytes = data.len(),
            "downloaded telegram file"
        );
        Ok(DownloadedMedia {
            filename: media.upload_name(),
            data,
        })
    }
}

/// Decode a Bot API update into the bridge's update model.
pub fn convert_update(update: tg::Update) -> Update {
    let id = i64::from(update.id.0);
    let kind = match update.kind {
        tg::UpdateKind::Message(msg) | tg::UpdateKind::ChannelPost(msg) => {
            UpdateKind::Message(convert_message(&msg))
        },
        tg::UpdateKind::EditedMessage(msg) | tg::UpdateKind::EditedChannelPost(msg) => {
            UpdateKind::EditedMessage(convert_message(&msg))
        },
        other => UpdateKind::Other {
            tag: update_tag(&other).to_string(),
        },
    };
    Update { id, kind }
}

fn update_tag(kind: &tg::UpdateKind) -> &'static str {
    match kind {
        tg::UpdateKind::Message(_) => "message",
        tg::UpdateKind::EditedMessage(_) => "edited_message",
        tg::UpdateKind::ChannelPost(_) => "channel_post",
        tg::UpdateKind::EditedChannelPost(_) => "edited_channel_post",
        tg::UpdateKind::InlineQuery(_) => "inline_query",
        tg::UpdateKind::ChosenInlineResult(_) => "chosen_inline_result",
        tg::UpdateKind::CallbackQuery(_) => "callback_query",
        tg::UpdateKind::ShippingQuery(_) => "shipping_query",
        tg::UpdateKind::PreCheckoutQuery(_) => "pre_checkout_query",
        tg::UpdateKind::Poll(_) => "poll",
        tg::UpdateKind::PollAnswer(_) => "poll_answer",
        tg::UpdateKind::MyChatMember(_) => "my_chat_member",
        tg::UpdateKind::ChatMember(_) => "chat_member",
        tg::UpdateKind::ChatJoinRequest(_) => "chat_join_request",
        tg::UpdateKind::Error(_) => "error",
        #[allow(unreachable_patterns)]
        _ => "unknown",
    }
}

/// Decode a Bot API message. Captions stand in for text on media messages.
pub fn convert_message(msg: &tg::Message) -> Message {
    let (text, raw_entities) = match msg.text() {
        Some(text) => (text, msg.entities().unwrap_or_default()),
        None => (
            msg.caption().unwrap_or_default(),
            msg.caption_entities().unwrap_or_default(),
        ),
    };

    Message {
        id: i64::from(msg.id.0),
        chat_id: msg.chat.id.0,
        sender: sender_of(msg),
        date: msg.date.timestamp(),
        text: text.to_string(),
        entities: raw_entities.iter().filter_map(convert_entity).collect(),
        media: media_of(msg),
        reply_to: msg.reply_to_message().map(|reply| i64::from(reply.id.0)),
        edited: msg.edit_date().is_some(),
    }
    .with_valid_entities()
}

fn sender_of(msg: &tg::Message) -> Sender {
    if let Some(chat) = &msg.sender_chat {
        return chat_sender(chat);
    }
    match &msg.from {
        Some(user) => {
            let name = user.full_name();
            Sender {
                id: user.id.0 as i64,
                username: user.username.clone(),
                display_name: (!name.trim().is_empty()).then_some(name),
            }
        },
        None => chat_sender(&msg.chat),
    }
}

fn chat_sender(chat: &tg::Chat) -> Sender {
    Sender {
        id: chat.id.0,
        username: chat.username().map(str::to_owned),
        display_name: chat.title().map(str::to_owned),
    }
}

fn media_of(msg: &tg::Message) -> Vec<MediaRef> {
    let mut media = Vec::new();
    let mut push = |kind, file: &tg::FileMeta, file_name: Option<&String>| {
        media.push(MediaRef {
            kind,
            file_id: file.id.clone(),
            file_name: file_name.cloned(),
            size: Some(u64::from(file.size)),
        });
    };

    // Sizes are ordered smallest first.
    if let Some(photo) = msg.photo().and_then(<[tg::PhotoSize]>::last) {
        push(MediaKind::Photo, &photo.file, None);
    }
    if let Some(video) = msg.video() {
        push(MediaKind::Video, &video.file, video.file_name.as_ref());
    }
    if let Some(animation) = msg.animation() {
        push(
            MediaKind::Animation,
            &animation.file,
            animation.file_name.as_ref(),
        );
    }
    if let Some(audio) = msg.audio() {
        push(MediaKind::Audio, &audio.file, audio.file_name.as_ref());
    }
    if let Some(voice) = msg.voice() {
        push(MediaKind::Voice, &voice.file, None);
    }
    if let Some(document) = msg.document() {
        push(
            MediaKind::Document,
            &document.file,
            document.file_name.as_ref(),
        );
    }
    if let Some(sticker) = msg.sticker() {
        push(MediaKind::Sticker, &sticker.file, None);
    }
    media
}

/// Decode an entity through its Bot API JSON shape so kinds this teloxide
/// version lacks a variant for still map when the wire carries them.
fn convert_entity(entity: &tg::MessageEntity) -> Option<Entity> {
    let value = match serde_json::to_value(&entity.kind) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "unencodable telegram entity dropped");
            return None;
        },
    };
    let Some(kind) = entity_kind_from_json(&value) else {
        debug!(entity = %value, "unsupported telegram entity dropped");
        return None;
    };
    Some(Entity::new(kind, entity.offset, entity.length))
}

fn entity_kind_from_json(value: &serde_json::Value) -> Option<EntityKind> {
    match value.get("type")?.as_str()? {
        "text_mention" => Some(EntityKind::TextMention {
            user_id: value.get("user")?.get("id")?.as_i64()?,
        }),
        "custom_emoji" => Some(EntityKind::CustomEmoji {
            emoji_id: value.get("custom_emoji_id")?.as_str()?.to_string(),
        }),
        _ => serde_json::from_value(value.clone()).ok(),
    }
}
