//! Forwarding policy: new messages, edits, replies, and orphans.

use std::sync::Arc;

use {
    async_trait::async_trait,
    ferry_channels::{
        DestRef, Destination, DownloadedMedia, Message, OutboundMessage, Sender, SourceClient,
        Update, UpdateKind,
    },
    ferry_config::{FerryConfig, OrphanPolicy, SenderDisplay},
    ferry_discord::markdown::{ensure_within_limit, escape_markdown, render_document},
    ferry_telegram::UpdateListener,
    tracing::{debug, info, warn},
};

use crate::{Result, store::CorrelationStore};

/// Forwarding settings derived from [`FerryConfig`].
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    /// Destination channels, in delivery order.
    pub channel_ids: Vec<String>,
    pub orphan_policy: OrphanPolicy,
    pub sender_display: SenderDisplay,
    pub linkify: bool,
    pub forward_media: bool,
    pub max_upload_bytes: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self::from_config(&FerryConfig::default())
    }
}

impl BridgeSettings {
    pub fn from_config(config: &FerryConfig) -> Self {
        Self {
            channel_ids: config.discord.channel_ids.clone(),
            orphan_policy: config.bridge.orphan_policy,
            sender_display: config.bridge.sender_display,
            linkify: config.bridge.linkify,
            forward_media: config.bridge.forward_media,
            max_upload_bytes: config.discord.max_upload_bytes,
        }
    }
}

/// How the bridge treats an accepted update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Edited,
    Ignored,
}

/// What happened to an orphaned edit or reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrphanAction {
    SentAsNew,
    Dropped,
}

/// A destination call that failed; the remaining destinations still ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub channel_id: String,
    pub error: String,
}

/// Calls made while processing one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outcome {
    pub sent: Vec<DestRef>,
    pub replied: Vec<DestRef>,
    pub edited: Vec<DestRef>,
    /// Destination copies that no longer exist.
    pub vanished: Vec<DestRef>,
    pub failed: Vec<DeliveryFailure>,
    pub orphan: Option<OrphanAction>,
}

impl Outcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    fn fail(&mut self, channel_id: &str, error: &dyn std::fmt::Display) {
        self.failed.push(DeliveryFailure {
            channel_id: channel_id.to_string(),
            error: error.to_string(),
        });
    }
}

#[derive(Debug, Clone, Copy)]
enum OrphanKind {
    Edit,
    Reply,
}

impl OrphanKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::Reply => "reply",
        }
    }
}

/// Forwards accepted source updates to the destination and keeps the
/// correlation store in step.
pub struct Bridge {
    store: Arc<dyn CorrelationStore>,
    destination: Arc<dyn Destination>,
    media_source: Option<Arc<dyn SourceClient>>,
    settings: BridgeSettings,
    now: fn() -> i64,
}

impl Bridge {
    pub fn new(
        store: Arc<dyn CorrelationStore>,
        destination: Arc<dyn Destination>,
        settings: BridgeSettings,
    ) -> Self {
        Self {
            store,
            destination,
            media_source: None,
            settings,
            now: ferry_common::time::unix_now,
        }
    }

    /// Client attachments are downloaded from.
    #[must_use]
    pub fn with_media_source(mut self, source: Arc<dyn SourceClient>) -> Self {
        self.media_source = Some(source);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    pub fn classify(&self, update: &Update) -> Classification {
        match &update.kind {
            UpdateKind::Message(msg) if has_content(msg) => Classification::New,
            UpdateKind::EditedMessage(msg) if has_content(msg) => Classification::Edited,
            _ => Classification::Ignored,
        }
    }

    /// Run the forwarding pipeline for one accepted update.
    pub async fn process(&self, update: &Update) -> Result<Outcome> {
        match (self.classify(update), &update.kind) {
            (Classification::New, UpdateKind::Message(msg)) => self.handle_new(msg).await,
            (Classification::Edited, UpdateKind::EditedMessage(msg)) => {
                self.handle_edit(msg).await
            },
            _ => {
                debug!(update_id = update.id, kind = update.kind.name(), "update ignored");
                Ok(Outcome::default())
            },
        }
    }

    async fn handle_new(&self, msg: &Message) -> Result<Outcome> {
        let mut outbound = self.render(msg)?;

        let Some(reply_to) = msg.reply_to else {
            outbound.media = self.collect_media(msg).await;
            let mut outcome = Outcome::default();
            self.send_all(msg.id, &outbound, &mut outcome).await;
            return Ok(outcome);
        };

        let targets = self.store.get(reply_to).await?;
        if targets.is_empty() {
            return self.handle_orphan(msg, outbound, OrphanKind::Reply).await;
        }

        outbound.media = self.collect_media(msg).await;
        let mut outcome = Outcome::default();
        let now = (self.now)();
        for target in &targets {
            match self.destination.fetch(target).await {
                Ok(Some(_)) => {},
                Ok(None) => {
                    info!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        dest_id = %target.message_id,
                        "reply target vanished, skipping"
                    );
                    outcome.vanished.push(target.clone());
                    continue;
                },
                Err(e) => {
                    warn!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        error = %e,
                        "failed to look up reply target"
                    );
                    outcome.fail(&target.channel_id, &e);
                    continue;
                },
            }

            match self.destination.reply(target, &outbound).await {
                Ok(message_id) => {
                    let dest = DestRef::new(message_id, target.channel_id.clone());
                    self.record(msg.id, &dest, now, &mut outcome).await;
                    outcome.replied.push(dest);
                },
                Err(e) if e.is_not_found() => {
                    info!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        "reply target vanished, skipping"
                    );
                    outcome.vanished.push(target.clone());
                },
                Err(e) => {
                    warn!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        error = %e,
                        "reply delivery failed"
                    );
                    outcome.fail(&target.channel_id, &e);
                },
            }
        }
        self.store.touch(reply_to, now).await?;

        log_partial(msg.id, &outcome);
        Ok(outcome)
    }

    async fn handle_edit(&self, msg: &Message) -> Result<Outcome> {
        let outbound = self.render(msg)?;

        let targets = self.store.get(msg.id).await?;
        if targets.is_empty() {
            return self.handle_orphan(msg, outbound, OrphanKind::Edit).await;
        }

        let mut outcome = Outcome::default();
        for target in &targets {
            match self.destination.edit(target, &outbound).await {
                Ok(()) => outcome.edited.push(target.clone()),
                Err(e) if e.is_not_found() => {
                    info!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        dest_id = %target.message_id,
                        "edited copy vanished, skipping"
                    );
                    outcome.vanished.push(target.clone());
                },
                Err(e) => {
                    warn!(
                        source_id = msg.id,
                        channel_id = %target.channel_id,
                        error = %e,
                        "edit delivery failed"
                    );
                    outcome.fail(&target.channel_id, &e);
                },
            }
        }
        let touched = self.store.touch(msg.id, (self.now)()).await?;
        debug!(source_id = msg.id, touched, "edit propagated");

        log_partial(msg.id, &outcome);
        Ok(outcome)
    }

    async fn handle_orphan(
        &self,
        msg: &Message,
        mut outbound: OutboundMessage,
        kind: OrphanKind,
    ) -> Result<Outcome> {
        let mut outcome = Outcome::default();
        match self.settings.orphan_policy {
            OrphanPolicy::Drop => {
                info!(source_id = msg.id, kind = kind.as_str(), "orphan dropped");
                outcome.orphan = Some(OrphanAction::Dropped);
            },
            OrphanPolicy::SendAsNew => {
                info!(source_id = msg.id, kind = kind.as_str(), "orphan sent as new message");
                outbound.media = self.collect_media(msg).await;
                self.send_all(msg.id, &outbound, &mut outcome).await;
                outcome.orphan = Some(OrphanAction::SentAsNew);
            },
        }
        Ok(outcome)
    }

    /// Post to every configured channel in order, recording each success.
    async fn send_all(&self, source_id: i64, outbound: &OutboundMessage, outcome: &mut Outcome) {
        if outbound.content.is_empty() && outbound.media.is_empty() {
            debug!(source_id, "nothing left to forward");
            return;
        }
        let now = (self.now)();
        for channel_id in &self.settings.channel_ids {
            match self.destination.send(channel_id, outbound).await {
                Ok(message_id) => {
                    let dest = DestRef::new(message_id, channel_id.clone());
                    self.record(source_id, &dest, now, outcome).await;
                    debug!(source_id, channel_id, dest_id = %dest.message_id, "forwarded");
                    outcome.sent.push(dest);
                },
                Err(e) => {
                    warn!(source_id, channel_id, error = %e, "delivery failed");
                    outcome.fail(channel_id, &e);
                },
            }
        }
        log_partial(source_id, outcome);
    }

    /// Correlate a delivered copy. A failed write is reported on the outcome
    /// and the fan-out carries on.
    async fn record(&self, source_id: i64, dest: &DestRef, now: i64, outcome: &mut Outcome) {
        if let Err(e) = self.store.add(source_id, dest, now).await {
            warn!(
                source_id,
                channel_id = %dest.channel_id,
                dest_id = %dest.message_id,
                error = %e,
                "delivered copy could not be correlated"
            );
            outcome.fail(&dest.channel_id, &e);
        }
    }

    fn render(&self, msg: &Message) -> Result<OutboundMessage> {
        let rendered = render_document(&msg.text, &msg.entities, self.settings.linkify);
        let (header, plain_header) = match sender_label(&msg.sender, self.settings.sender_display)
        {
            Some(label) => (
                format!("**{}**:\n", escape_markdown(&label)),
                format!("{label}:\n"),
            ),
            None => (String::new(), String::new()),
        };

        let content = format!("{header}{}", rendered.text);
        ensure_within_limit(&content)?;
        debug!(
            source_id = msg.id,
            entities = msg.entities.len(),
            growth = rendered.growth,
            "rendered message"
        );
        Ok(OutboundMessage {
            content,
            plain: format!("{plain_header}{}", msg.text),
            media: Vec::new(),
        })
    }

    /// Download attachments; failures and oversized files are logged and
    /// left out.
    async fn collect_media(&self, msg: &Message) -> Vec<DownloadedMedia> {
        if !self.settings.forward_media || msg.media.is_empty() {
            return Vec::new();
        }
        let Some(source) = &self.media_source else {
            debug!(source_id = msg.id, "no media source configured, attachments skipped");
            return Vec::new();
        };

        let limit = self.settings.max_upload_bytes;
        let mut downloaded = Vec::with_capacity(msg.media.len());
        for media in &msg.media {
            if media.size.is_some_and(|size| size > limit) {
                warn!(
                    source_id = msg.id,
                    file_id = %media.file_id,
                    size = media.size,
                    limit,
                    "attachment too large, skipping"
                );
                continue;
            }
            match source.download_media(media).await {
                Ok(file) if file.data.len() as u64 > limit => {
                    warn!(
                        source_id = msg.id,
                        file_id = %media.file_id,
                        size = file.data.len(),
                        limit,
                        "attachment too large, skipping"
                    );
                },
                Ok(file) => downloaded.push(file),
                Err(e) => {
                    warn!(
                        source_id = msg.id,
                        file_id = %media.file_id,
                        error = %e,
                        "attachment download failed, forwarding without it"
                    );
                },
            }
        }
        downloaded
    }
}

#[async_trait]
impl UpdateListener for Bridge {
    async fn on_update(&self, update: &Update) -> ferry_channels::Result<()> {
        self.process(update).await?;
        Ok(())
    }
}

fn has_content(msg: &Message) -> bool {
    !msg.text.is_empty() || !msg.media.is_empty()
}

fn sender_label(sender: &Sender, display: SenderDisplay) -> Option<String> {
    let name = sender.display_name.clone().filter(|n| !n.trim().is_empty());
    let username = sender
        .username
        .as_ref()
        .filter(|u| !u.trim().is_empty())
        .map(|u| format!("@{u}"));
    match display {
        SenderDisplay::None => None,
        SenderDisplay::Name => name.or(username),
        SenderDisplay::Username => username.or(name),
    }
    .or_else(|| (display != SenderDisplay::None).then(|| sender.id.to_string()))
}

fn log_partial(source_id: i64, outcome: &Outcome) {
    if outcome.is_partial() {
        let delivered = outcome.sent.len() + outcome.replied.len() + outcome.edited.len();
        warn!(
            source_id,
            delivered,
            failed = outcome.failed.len(),
            "partial delivery"
        );
    }
}
