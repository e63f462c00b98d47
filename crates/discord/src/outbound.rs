use std::{num::NonZeroU64, sync::Arc};

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    serenity::{
        all::{
            ChannelId, CreateAllowedMentions, CreateAttachment, CreateMessage, EditMessage,
            MessageId,
        },
        http::{Http, HttpBuilder, HttpError},
    },
    tracing::{debug, warn},
};

use {
    ferry_channels::{
        DestRef, Destination, DestinationMessage, DownloadedMedia, Error, OutboundMessage, Result,
    },
    ferry_config::{DISCORD_ORIGIN, DiscordConfig},
};

/// Discord JSON error codes for "Unknown Channel" and "Unknown Message".
const UNKNOWN_CHANNEL_CODE: isize = 10003;
const UNKNOWN_MESSAGE_CODE: isize = 10008;

/// Delivery collaborator backed by serenity's REST client. Rate limits are
/// handled by the client's ratelimiter.
pub struct DiscordOutbound {
    http: Arc<Http>,
}

impl DiscordOutbound {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        let token = config.token.expose_secret();
        if token.trim().is_empty() {
            return Err(Error::configuration("discord bot token is empty"));
        }
        let mut builder = HttpBuilder::new(token);
        let origin = config.api_base.trim_end_matches('/');
        if !origin.is_empty() && origin != DISCORD_ORIGIN {
            // The proxy owns rate limiting.
            builder = builder.proxy(origin).ratelimiter_disabled(true);
        }
        Ok(Self::with_http(Arc::new(builder.build())))
    }

    pub fn with_http(http: Arc<Http>) -> Self {
        Self { http }
    }

    /// Post a message, retrying once as plain text when Discord rejects the
    /// markup.
    async fn create_with_fallback(
        &self,
        channel: ChannelId,
        message: &OutboundMessage,
        reference: Option<MessageId>,
    ) -> Result<String> {
        match self
            .create(channel, &message.content, &message.media, reference)
            .await
        {
            Ok(id) => Ok(id),
            Err(e @ Error::InvalidInput { .. }) if has_plain_fallback(message) => {
                warn!(
                    channel_id = %channel,
                    error = %e,
                    "discord rejected markup, retrying as plain text"
                );
                self.create(channel, &message.plain, &message.media, reference)
                    .await
            },
            Err(e) => Err(e),
        }
    }

    async fn create(
        &self,
        channel: ChannelId,
        content: &str,
        media: &[DownloadedMedia],
        reference: Option<MessageId>,
    ) -> Result<String> {
        let mut builder = CreateMessage::new()
            .content(content)
            .allowed_mentions(CreateAllowedMentions::new());
        for m in media {
            builder = builder.add_file(CreateAttachment::bytes(m.data.to_vec(), m.filename.clone()));
        }
        if let Some(message_id) = reference {
            builder = builder.reference_message((channel, message_id));
        }

        let created = channel
            .send_message(&self.http, builder)
            .await
            .map_err(|e| map_serenity_error(e, "create message"))?;
        debug!(
            channel_id = %channel,
            message_id = %created.id,
            attachments = media.len(),
            "discord message created"
        );
        Ok(created.id.to_string())
    }

    async fn patch(&self, channel: ChannelId, message_id: MessageId, content: &str) -> Result<()> {
        let builder = EditMessage::new()
            .content(content)
            .allowed_mentions(CreateAllowedMentions::new());
        channel
            .edit_message(&self.http, message_id, builder)
            .await
            .map_err(|e| map_serenity_error(e, "edit message"))?;
        debug!(channel_id = %channel, message_id = %message_id, "discord message edited");
        Ok(())
    }
}

#[async_trait]
impl Destination for DiscordOutbound {
    async fn send(&self, channel_id: &str, message: &OutboundMessage) -> Result<String> {
        let channel = parse_channel(channel_id)?;
        self.create_with_fallback(channel, message, None).await
    }

    async fn edit(&self, target: &DestRef, message: &OutboundMessage) -> Result<()> {
        let (channel, message_id) = parse_target(target)?;
        match self.patch(channel, message_id, &message.content).await {
            Ok(()) => Ok(()),
            Err(e @ Error::InvalidInput { .. }) if has_plain_fallback(message) => {
                warn!(
                    channel_id = %target.channel_id,
                    message_id = %target.message_id,
                    error = %e,
                    "discord rejected edited markup, retrying as plain text"
                );
                self.patch(channel, message_id, &message.plain).await
            },
            Err(e) => Err(e),
        }
    }

    async fn reply(&self, target: &DestRef, message: &OutboundMessage) -> Result<String> {
        let (channel, message_id) = parse_target(target)?;
        self.create_with_fallback(channel, message, Some(message_id))
            .await
    }

    async fn fetch(&self, target: &DestRef) -> Result<Option<DestinationMessage>> {
        let (channel, message_id) = parse_target(target)?;
        match channel.message(&self.http, message_id).await {
            Ok(message) => Ok(Some(DestinationMessage {
                id: message.id.to_string(),
                channel_id: message.channel_id.to_string(),
                content: message.content,
            })),
            Err(e) => match map_serenity_error(e, "fetch message") {
                Error::NotFound { .. } => Ok(None),
                other => Err(other),
            },
        }
    }
}

fn has_plain_fallback(message: &OutboundMessage) -> bool {
    !message.plain.is_empty() && message.plain != message.content
}

fn parse_channel(raw: &str) -> Result<ChannelId> {
    if raw.trim().is_empty() {
        return Err(Error::configuration("discord channel id is empty"));
    }
    raw.trim()
        .parse::<NonZeroU64>()
        .map(ChannelId::from)
        .map_err(|_| Error::configuration(format!("discord channel id {raw:?} is not a snowflake")))
}

fn parse_target(target: &DestRef) -> Result<(ChannelId, MessageId)> {
    let channel = parse_channel(&target.channel_id)?;
    let message_id = target
        .message_id
        .trim()
        .parse::<NonZeroU64>()
        .map(MessageId::from)
        .map_err(|_| {
            Error::invalid_input(format!(
                "discord message id {:?} is not a snowflake",
                target.message_id
            ))
        })?;
    Ok((channel, message_id))
}

/// Fold a serenity failure into the neutral channel error set.
fn map_serenity_error(err: serenity::Error, operation: &'static str) -> Error {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        let status = response.status_code.as_u16();
        let code = response.error.code;
        let reason = response.error.message.clone();
        return classify_status(status, code, &reason, operation)
            .unwrap_or_else(|| Error::transient(format!("discord {operation}"), err));
    }
    if matches!(err, serenity::Error::Http(_)) {
        return Error::transient(format!("discord {operation}"), err);
    }
    if matches!(err, serenity::Error::Model(_)) {
        return Error::invalid_input(format!("discord {operation}: {err}"));
    }
    Error::external(format!("discord {operation}"), err)
}

/// Neutral error for a failed Discord response, or `None` when the failure
/// is worth retrying later.
fn classify_status(status: u16, code: isize, reason: &str, operation: &str) -> Option<Error> {
    if status == 404 || code == UNKNOWN_MESSAGE_CODE || code == UNKNOWN_CHANNEL_CODE {
        return Some(Error::not_found(format!("discord message ({operation})")));
    }
    match status {
        400 => Some(Error::invalid_input(format!("discord {operation}: {reason}"))),
        401 | 403 => Some(Error::configuration(format!(
            "discord {operation} was refused ({status}): {reason}"
        ))),
        429 | 500..=599 => None,
        _ => Some(Error::protocol(format!(
            "discord {operation}: unexpected status {status}: {reason}"
        ))),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        std::sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {
        axum::{
            Json, Router,
            body::Bytes,
            extract::{Path, State},
            http::{HeaderMap, StatusCode},
            response::IntoResponse,
            routing::post,
        },
        rstest::rstest,
        serde_json::{Value, json},
        tokio::sync::oneshot,
    };

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: &'static str,
        channel_id: String,
        message_id: Option<String>,
        authorization: Option<String>,
        content_type: Option<String>,
        body: Vec<u8>,
    }

    impl CapturedRequest {
        fn json(&self) -> Value {
            serde_json::from_slice(&self.body).expect("json body")
        }
    }

    #[derive(Clone, Default)]
    struct MockDiscordApi {
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
        next_id: Arc<AtomicUsize>,
    }

    fn header(headers: &HeaderMap, name: &str) -> Option<String> {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    fn message_json(id: &str, channel_id: &str, content: &str) -> Value {
        json!({
            "id": id,
            "channel_id": channel_id,
            "author": { "id": "7", "username": "ferry", "discriminator": "0000", "avatar": null, "bot": true },
            "content": content,
            "timestamp": "2026-01-01T00:00:00+00:00",
            "edited_timestamp": null,
            "tts": false,
            "mention_everyone": false,
            "mentions": [],
            "mention_roles": [],
            "attachments": [],
            "embeds": [],
            "pinned": false,
            "type": 0,
        })
    }

    fn api_error(status: StatusCode, code: isize, message: &str) -> (StatusCode, Json<Value>) {
        (status, Json(json!({ "code": code, "message": message })))
    }

    async fn create_message(
        State(api): State<MockDiscordApi>,
        Path(channel_id): Path<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        api.requests.lock().unwrap().push(CapturedRequest {
            method: "POST",
            channel_id: channel_id.clone(),
            message_id: None,
            authorization: header(&headers, "authorization"),
            content_type: header(&headers, "content-type"),
            body: body.to_vec(),
        });

        let text = String::from_utf8_lossy(&body);
        if text.contains("**broken") {
            return api_error(StatusCode::BAD_REQUEST, 50035, "Invalid Form Body");
        }
        if text.contains("message_reference") && text.contains("999") {
            return api_error(StatusCode::BAD_REQUEST, 10008, "Unknown Message");
        }
        match channel_id.as_str() {
            "500" => return api_error(StatusCode::BAD_GATEWAY, 0, "upstream"),
            "401" => return api_error(StatusCode::UNAUTHORIZED, 0, "401: Unauthorized"),
            _ => {},
        }

        let id = api.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        (
            StatusCode::OK,
            Json(message_json(&format!("{}", 1000 + id), &channel_id, "")),
        )
    }

    async fn edit_message(
        State(api): State<MockDiscordApi>,
        Path((channel_id, message_id)): Path<(String, String)>,
        headers: HeaderMap,
        body: Bytes,
    ) -> impl IntoResponse {
        api.requests.lock().unwrap().push(CapturedRequest {
            method: "PATCH",
            channel_id: channel_id.clone(),
            message_id: Some(message_id.clone()),
            authorization: header(&headers, "authorization"),
            content_type: header(&headers, "content-type"),
            body: body.to_vec(),
        });
        if message_id == "999" {
            return api_error(StatusCode::NOT_FOUND, 10008, "Unknown Message");
        }
        (
            StatusCode::OK,
            Json(message_json(&message_id, &channel_id, "")),
        )
    }

    async fn get_message(
        State(api): State<MockDiscordApi>,
        Path((channel_id, message_id)): Path<(String, String)>,
        headers: HeaderMap,
    ) -> impl IntoResponse {
        api.requests.lock().unwrap().push(CapturedRequest {
            method: "GET",
            channel_id: channel_id.clone(),
            message_id: Some(message_id.clone()),
            authorization: header(&headers, "authorization"),
            content_type: None,
            body: Vec::new(),
        });
        if message_id == "999" {
            return api_error(StatusCode::NOT_FOUND, 10008, "Unknown Message");
        }
        (
            StatusCode::OK,
            Json(message_json(&message_id, &channel_id, "stored")),
        )
    }

    struct MockServer {
        api: MockDiscordApi,
        outbound: DiscordOutbound,
        shutdown: Option<oneshot::Sender<()>>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl MockServer {
        async fn start() -> Self {
            let api = MockDiscordApi::default();
            let app = Router::new()
                .route("/api/v10/channels/{channel_id}/messages", post(create_message))
                .route(
                    "/api/v10/channels/{channel_id}/messages/{message_id}",
                    axum::routing::patch(edit_message).get(get_message),
                )
                .with_state(api.clone());

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind test listener");
            let addr = listener.local_addr().expect("local addr");
            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
            let handle = tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("serve mock discord api");
            });

            let config = DiscordConfig {
                token: secrecy::Secret::new("test-token".into()),
                api_base: format!("http://{addr}/"),
                ..Default::default()
            };
            let outbound = DiscordOutbound::new(&config).expect("outbound");
            Self {
                api,
                outbound,
                shutdown: Some(shutdown_tx),
                handle,
            }
        }

        fn requests(&self) -> Vec<CapturedRequest> {
            self.api.requests.lock().unwrap().clone()
        }

        async fn stop(mut self) {
            if let Some(tx) = self.shutdown.take() {
                let _ = tx.send(());
            }
            self.handle.await.expect("server task");
        }
    }

    fn outbound_text(content: &str, plain: &str) -> OutboundMessage {
        OutboundMessage {
            content: content.into(),
            plain: plain.into(),
            media: Vec::new(),
        }
    }

    #[tokio::test]
    async fn send_posts_json_with_bot_auth() {
        let server = MockServer::start().await;

        let id = server
            .outbound
            .send("111", &outbound_text("**hi**", "hi"))
            .await
            .unwrap();
        assert_eq!(id, "1001");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, "POST");
        assert_eq!(req.channel_id, "111");
        assert_eq!(req.authorization.as_deref(), Some("Bot test-token"));
        let body = req.json();
        assert_eq!(body["content"], "**hi**");
        assert!(body.get("allowed_mentions").is_some());
        assert!(body.get("message_reference").is_none());
        server.stop().await;
    }

    #[tokio::test]
    async fn send_with_media_uses_multipart() {
        let server = MockServer::start().await;
        let message = OutboundMessage {
            content: "caption".into(),
            plain: "caption".into(),
            media: vec![DownloadedMedia {
                filename: "cat.jpg".into(),
                data: Bytes::from_static(b"jpegdata"),
            }],
        };

        server.outbound.send("111", &message).await.unwrap();

        let req = &server.requests()[0];
        assert!(
            req.content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("multipart/form-data"))
        );
        let body = String::from_utf8_lossy(&req.body);
        assert!(body.contains("name=\"payload_json\""));
        assert!(body.contains("filename=\"cat.jpg\""));
        assert!(body.contains("jpegdata"));
        assert!(body.contains("caption"));
        server.stop().await;
    }

    #[tokio::test]
    async fn rejected_markup_falls_back_to_plain() {
        let server = MockServer::start().await;

        let id = server
            .outbound
            .send("111", &outbound_text("**broken", "broken"))
            .await
            .unwrap();
        assert_eq!(id, "1001");

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].json()["content"], "broken");
        server.stop().await;
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start().await;
        let err = server
            .outbound
            .send("500", &outbound_text("hi", "hi"))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        server.stop().await;
    }

    #[tokio::test]
    async fn refused_token_is_a_configuration_error() {
        let server = MockServer::start().await;
        let err = server
            .outbound
            .send("401", &outbound_text("hi", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }), "{err}");
        server.stop().await;
    }

    #[tokio::test]
    async fn reply_sets_message_reference() {
        let server = MockServer::start().await;
        let target = DestRef::new("900", "111");

        server
            .outbound
            .reply(&target, &outbound_text("re", "re"))
            .await
            .unwrap();

        let req = &server.requests()[0];
        assert_eq!(req.channel_id, "111");
        let reference = &req.json()["message_reference"];
        assert_eq!(reference["message_id"].to_string().trim_matches('"'), "900");
        assert_eq!(reference["channel_id"].to_string().trim_matches('"'), "111");
        server.stop().await;
    }

    #[tokio::test]
    async fn reply_to_vanished_message_is_not_found() {
        let server = MockServer::start().await;
        let err = server
            .outbound
            .reply(&DestRef::new("999", "111"), &outbound_text("re", "re"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
        server.stop().await;
    }

    #[tokio::test]
    async fn edit_patches_content() {
        let server = MockServer::start().await;
        server
            .outbound
            .edit(&DestRef::new("42", "111"), &outbound_text("new", "new"))
            .await
            .unwrap();

        let req = &server.requests()[0];
        assert_eq!(req.method, "PATCH");
        assert_eq!(req.message_id.as_deref(), Some("42"));
        assert_eq!(req.json()["content"], "new");
        server.stop().await;
    }

    #[tokio::test]
    async fn edit_leaves_attachments_alone() {
        let server = MockServer::start().await;
        let message = OutboundMessage {
            content: "new caption".into(),
            plain: "new caption".into(),
            media: vec![DownloadedMedia {
                filename: "cat.jpg".into(),
                data: Bytes::from_static(b"jpegdata"),
            }],
        };
        server
            .outbound
            .edit(&DestRef::new("42", "111"), &message)
            .await
            .unwrap();

        let req = &server.requests()[0];
        assert!(
            req.content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("application/json"))
        );
        assert!(!String::from_utf8_lossy(&req.body).contains("jpegdata"));
        server.stop().await;
    }

    #[tokio::test]
    async fn edit_of_vanished_message_is_not_found() {
        let server = MockServer::start().await;
        let err = server
            .outbound
            .edit(&DestRef::new("999", "111"), &outbound_text("x", "x"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        server.stop().await;
    }

    #[tokio::test]
    async fn fetch_returns_message_or_none() {
        let server = MockServer::start().await;

        let found = server
            .outbound
            .fetch(&DestRef::new("42", "111"))
            .await
            .unwrap()
            .expect("message exists");
        assert_eq!(found.id, "42");
        assert_eq!(found.channel_id, "111");
        assert_eq!(found.content, "stored");

        let missing = server
            .outbound
            .fetch(&DestRef::new("999", "111"))
            .await
            .unwrap();
        assert!(missing.is_none());
        server.stop().await;
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_api() {
        let server = MockServer::start().await;
        let err = server
            .outbound
            .send("general", &outbound_text("hi", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let err = server
            .outbound
            .edit(&DestRef::new("0", "111"), &outbound_text("hi", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput { .. }));
        assert!(server.requests().is_empty());
        server.stop().await;
    }

    #[test]
    fn new_rejects_blank_token() {
        let config = DiscordConfig::default();
        assert!(matches!(
            DiscordOutbound::new(&config),
            Err(Error::Configuration { .. })
        ));
    }

    #[rstest]
    #[case(404, 0, "not_found")]
    #[case(400, UNKNOWN_MESSAGE_CODE, "not_found")]
    #[case(403, UNKNOWN_CHANNEL_CODE, "not_found")]
    #[case(400, 50035, "invalid_input")]
    #[case(401, 0, "configuration")]
    #[case(403, 50013, "configuration")]
    #[case(429, 0, "retry")]
    #[case(503, 0, "retry")]
    #[case(418, 0, "protocol")]
    fn status_classification(#[case] status: u16, #[case] code: isize, #[case] expected: &str) {
        let kind = match classify_status(status, code, "reason", "create message") {
            None => "retry",
            Some(Error::NotFound { .. }) => "not_found",
            Some(Error::InvalidInput { .. }) => "invalid_input",
            Some(Error::Configuration { .. }) => "configuration",
            Some(Error::Protocol { .. }) => "protocol",
            Some(other) => panic!("unexpected {other}"),
        };
        assert_eq!(kind, expected);
    }
}
