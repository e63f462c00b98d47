//! Telegram source for ferry.
//!
//! [`TelegramConnector`] turns a bot token into a Bot API client (teloxide);
//! [`UpdateFeed`] long-polls it and runs every update through the registered
//! checks and listeners.

pub mod client;
pub mod error;
pub mod feed;

pub use {
    client::{TelegramClient, TelegramConnector},
    error::{Error, Result},
    feed::{CheckpointStore, FeedConfig, UpdateCheck, UpdateFeed, UpdateListener, next_cursor},
};
