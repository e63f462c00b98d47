//! Discord destination: markdown rendering and REST delivery.

pub mod markdown;
pub mod outbound;

pub use {
    markdown::{
        DISCORD_MAX_MESSAGE_LEN, Rendered, ensure_within_limit, escape_markdown, render_document,
    },
    outbound::DiscordOutbound,
};
