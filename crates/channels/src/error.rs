use std::error::Error as StdError;

/// Crate-wide result type for channel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed channel errors shared by every collaborator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing secret, double start, stop without start, bad channel id.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The addressed destination message no longer exists.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Network failure or rate limiting that may succeed on retry.
    #[error("transient failure: {context}: {source}")]
    Transient {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// The remote side answered with something we could not interpret.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Another poller holds the same source secret.
    #[error("polling conflict: {message}")]
    Conflict { message: String },

    /// Rendered markup does not fit the destination's message size limit.
    #[error("rendered message is {length} characters, limit is {limit}")]
    MessageTooLong { length: usize, limit: usize },

    /// Input payload or parameter is invalid.
    #[error("invalid channel input: {message}")]
    InvalidInput { message: String },

    #[error("{message}")]
    Message { message: String },

    /// Wrapped source error from an external dependency.
    #[error("channel operation failed: {context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn configuration(message: impl std::fmt::Display) -> Self {
        Self::Configuration {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn not_found(resource: impl std::fmt::Display) -> Self {
        Self::NotFound {
            resource: resource.to_string(),
        }
    }

    #[must_use]
    pub fn transient(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transient {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn conflict(message: impl std::fmt::Display) -> Self {
        Self::Conflict {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl ferry_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

ferry_common::impl_context!();
