//! Long-poll update feed with an ordered check/listener chain.

use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use {
    ferry_channels::{Error, Result, SourceClient, SourceConnector, Update},
    ferry_config::TelegramConfig,
};

/// Predicate an update must pass before any listener sees it.
pub trait UpdateCheck: Send + Sync {
    fn check(&self, update: &Update) -> Result<bool>;
}

impl<F> UpdateCheck for F
where
    F: Fn(&Update) -> Result<bool> + Send + Sync,
{
    fn check(&self, update: &Update) -> Result<bool> {
        self(update)
    }
}

/// Handler invoked for accepted updates of the kind it was registered for.
#[async_trait]
pub trait UpdateListener: Send + Sync {
    async fn on_update(&self, update: &Update) -> Result<()>;
}

/// Persists the feed cursor across restarts.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, feed: &str) -> Result<Option<i64>>;
    async fn save(&self, feed: &str, cursor: i64) -> Result<()>;
}

/// Polling behaviour.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Checkpoint key.
    pub name: String,
    pub poll_timeout: Duration,
    pub error_backoff: Duration,
    pub idle_backoff: Duration,
    pub resume_from_checkpoint: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            name: "telegram".into(),
            poll_timeout: Duration::from_secs(300),
            error_backoff: Duration::from_secs(5),
            idle_backoff: Duration::from_millis(250),
            resume_from_checkpoint: true,
        }
    }
}

impl From<&TelegramConfig> for FeedConfig {
    fn from(config: &TelegramConfig) -> Self {
        Self {
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            error_backoff: Duration::from_secs(config.error_backoff_secs),
            idle_backoff: Duration::from_millis(config.idle_backoff_ms),
            resume_from_checkpoint: config.resume_from_checkpoint,
            ..Self::default()
        }
    }
}

/// Cursor after dispatching `batch`: one past the highest id seen, never
/// moving backwards.
#[must_use]
pub fn next_cursor(current: i64, batch: &[Update]) -> i64 {
    batch
        .iter()
        .map(|u| u.id.saturating_add(1))
        .fold(current, i64::max)
}

struct Dispatcher {
    checks: Vec<Arc<dyn UpdateCheck>>,
    listeners: Vec<(String, Arc<dyn UpdateListener>)>,
}

impl Dispatcher {
    /// Run checks in order, then every listener registered for the update's
    /// kind. Returns whether the update reached listeners.
    async fn dispatch(&self, update: &Update) -> bool {
        for (index, check) in self.checks.iter().enumerate() {
            match check.check(update) {
                Ok(true) => {},
                Ok(false) => {
                    debug!(update_id = update.id, check = index, "update rejected");
                    return false;
                },
                Err(e) => {
                    warn!(
                        update_id = update.id,
                        check = index,
                        error = %e,
                        "update check failed, rejecting update"
                    );
                    return false;
                },
            }
        }

        let kind = update.kind.name();
        for (name, listener) in &self.listeners {
            if name != kind {
                continue;
            }
            if let Err(e) = listener.on_update(update).await {
                error!(
                    update_id = update.id,
                    listener = %name,
                    error = %e,
                    "update listener failed"
                );
            }
        }
        true
    }
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Pulls updates from the source platform and fans them out.
///
/// Checks and listeners are snapshotted when [`UpdateFeed::start`] is
/// called; registrations made while running take effect on the next start.
pub struct UpdateFeed {
    connector: Arc<dyn SourceConnector>,
    config: FeedConfig,
    checks: Vec<Arc<dyn UpdateCheck>>,
    listeners: Vec<(String, Arc<dyn UpdateListener>)>,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    cursor: Arc<AtomicI64>,
    running: Option<Running>,
}

impl UpdateFeed {
    pub fn new(connector: Arc<dyn SourceConnector>, config: FeedConfig) -> Self {
        Self {
            connector,
            config,
            checks: Vec::new(),
            listeners: Vec::new(),
            checkpoint: None,
            cursor: Arc::new(AtomicI64::new(0)),
            running: None,
        }
    }

    #[must_use]
    pub fn with_checkpoint(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn add_check(&mut self, check: Arc<dyn UpdateCheck>) {
        self.checks.push(check);
    }

    /// Register `listener` for updates whose kind name is `name`
    /// (`message`, `edited_message`, or a platform tag).
    pub fn add_listener(&mut self, listener: Arc<dyn UpdateListener>, name: impl Into<String>) {
        self.listeners.push((name.into(), listener));
    }

    /// Offset the next poll will use.
    pub fn cursor(&self) -> i64 {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Token cancelled when the loop stops, including when it stops itself
    /// after a polling conflict.
    pub fn cancellation(&self) -> Option<CancellationToken> {
        self.running.as_ref().map(|r| r.cancel.clone())
    }

    /// Connect with `secret` and spawn the polling loop.
    pub fn start(&mut self, secret: Option<&Secret<String>>) -> Result<()> {
        let secret = secret
            .map(|s| s.expose_secret().trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::configuration("source secret is missing"))?;
        if self.is_running() {
            return Err(Error::configuration("update feed is already running"));
        }

        let client = self.connector.connect(secret)?;
        let dispatcher = Arc::new(Dispatcher {
            checks: self.checks.clone(),
            listeners: self.listeners.clone(),
        });
        let cancel = CancellationToken::new();
        let poll_loop = PollLoop {
            client,
            dispatcher,
            config: self.config.clone(),
            checkpoint: self.checkpoint.clone(),
            cursor: Arc::clone(&self.cursor),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(poll_loop.run());
        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    /// Cancel polling and wait for the in-flight update to finish.
    pub async fn stop(&mut self) -> Result<()> {
        let running = self
            .running
            .take()
            .ok_or_else(|| Error::configuration("update feed is not running"))?;
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            warn!(error = %e, "update feed task ended abnormally");
        }
        Ok(())
    }
}

struct PollLoop {
    client: Arc<dyn SourceClient>,
    dispatcher: Arc<Dispatcher>,
    config: FeedConfig,
    checkpoint: Option<Arc<dyn CheckpointStore>>,
    cursor: Arc<AtomicI64>,
    cancel: CancellationToken,
}

impl PollLoop {
    async fn run(self) {
        let feed = self.config.name.as_str();
        let mut offset = self.resume_offset().await;
        if let Some(offset) = offset {
            self.cursor.store(offset, Ordering::SeqCst);
        }
        info!(feed, cursor = ?offset, "update feed started");

        while !self.cancel.is_cancelled() {
            let Some(current) = offset else {
                offset = self.skip_backlog().await;
                continue;
            };

            let polled = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = self.client.poll(current, self.config.poll_timeout) => polled,
            };

            match polled {
                Ok(updates) if updates.is_empty() => {
                    self.pause(self.config.idle_backoff).await;
                },
                Ok(updates) => {
                    debug!(feed, count = updates.len(), "received updates");
                    let mut next = current;
                    for update in &updates {
                        if self.cancel.is_cancelled() {
                            break;
                        }
                        if update.id < current {
                            debug!(feed, update_id = update.id, "skipping already seen update");
                            continue;
                        }
                        self.dispatcher.dispatch(update).await;
                        next = next_cursor(next, std::slice::from_ref(update));
                        self.cursor.store(next, Ordering::SeqCst);
                    }
                    offset = Some(next);
                    self.save_checkpoint(next).await;
                },
                Err(Error::Conflict { message }) => {
                    error!(feed, reason = %message, "another poller holds this secret, stopping feed");
                    self.cancel.cancel();
                    break;
                },
                Err(e) => {
                    warn!(feed, error = %e, "poll failed");
                    self.pause(self.config.error_backoff).await;
                },
            }
        }
        info!(feed, cursor = self.cursor.load(Ordering::SeqCst), "update feed stopped");
    }

    async fn resume_offset(&self) -> Option<i64> {
        if !self.config.resume_from_checkpoint {
            return None;
        }
        let store = self.checkpoint.as_ref()?;
        match store.load(&self.config.name).await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(feed = %self.config.name, error = %e, "failed to load feed checkpoint");
                None
            },
        }
    }

    /// Position the cursor past whatever is pending without dispatching it.
    async fn skip_backlog(&self) -> Option<i64> {
        let peeked = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            peeked = self.client.poll(-1, Duration::ZERO) => peeked,
        };
        match peeked {
            Ok(updates) => {
                let next = next_cursor(0, &updates);
                debug!(
                    feed = %self.config.name,
                    cursor = next,
                    skipped = updates.len(),
                    "skipped backlog"
                );
                self.cursor.store(next, Ordering::SeqCst);
                self.save_checkpoint(next).await;
                Some(next)
            },
            Err(Error::Conflict { message }) => {
                error!(
                    feed = %self.config.name,
                    reason = %message,
                    "another poller holds this secret, stopping feed"
                );
                self.cancel.cancel();
                None
            },
            Err(e) => {
                warn!(feed = %self.config.name, error = %e, "backlog peek failed");
                self.pause(self.config.error_backoff).await;
                None
            },
        }
    }

    async fn save_checkpoint(&self, cursor: i64) {
        let Some(store) = &self.checkpoint else {
            return;
        };
        if let Err(e) = store.save(&self.config.name, cursor).await {
            warn!(feed = %self.config.name, cursor, error = %e, "failed to save feed checkpoint");
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {},
            _ = tokio::time::sleep(duration) => {},
        }
    }
}
