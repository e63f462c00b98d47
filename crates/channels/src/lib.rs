//! Platform-neutral message model and collaborator traits.
//!
//! The source platform (Telegram) implements [`SourceClient`] and the
//! destination platform (Discord) implements [`Destination`]; the bridge only
//! ever talks to these traits.

pub mod error;
pub mod gating;
pub mod model;
pub mod plugin;

pub use {
    error::{Error, Result},
    model::{
        DownloadedMedia, Entity, EntityKind, MediaKind, MediaRef, Message, Sender, Update,
        UpdateKind,
    },
    plugin::{DestRef, Destination, DestinationMessage, OutboundMessage, SourceClient, SourceConnector},
};
