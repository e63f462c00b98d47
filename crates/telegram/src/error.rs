use teloxide::{ApiError, RequestError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] RequestError),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Channel(#[from] ferry_channels::Error),

    #[error("{message}")]
    Message { message: String },

    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }
}

/// Classify Bot API failures into the platform-neutral error set the feed
/// and bridge act on.
impl From<Error> for ferry_channels::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Telegram(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                Self::conflict("terminated by other getUpdates request")
            },
            Error::Telegram(
                e @ (RequestError::RetryAfter(_) | RequestError::Network(_) | RequestError::Io(_)),
            ) => Self::transient("telegram request", e),
            Error::Telegram(e) => Self::protocol(e),
            Error::Reqwest(e) => Self::transient("telegram file download", e),
            Error::Channel(e) => e,
            Error::Message { message } => Self::message(message),
            Error::External { context, source } => Self::External { context, source },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
