//! Error types for the Raíces notifier.

use reqwest::StatusCode;
use thiserror::Error;

use crate::repo::ChatId;

#[derive(Debug, Error)]
/// Error type for all portal, delivery and store operations.
pub enum Error {
    /// Underlying HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    /// IO error when reading or writing data.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A URL could not be built from its parts.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// Structural decode failure on a portal or store payload.
    #[error("malformed payload: {0}")]
    Decode(#[from] serde_json::Error),
    /// Parse error with a message.
    #[error("parse error: {0}")]
    Parse(String),
    /// The portal rejected the login credentials.
    #[error("login failed: {0}")]
    Auth(String),
    /// Login looked successful but no session cookie was issued.
    #[error("no session cookie received after login")]
    NoSession,
    /// HTTP response returned a non-success status with body.
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    /// Chat store failure.
    #[error("store error: {0}")]
    Store(String),
    /// Delivery stopped partway through a batch.
    #[error("delivery stopped after message {last_delivered}: {source}")]
    Delivery {
        last_delivered: u64,
        #[source]
        source: Box<Error>,
    },
    /// A failure annotated with the chat it happened for.
    #[error("chat {chat_id}: {source}")]
    Chat {
        chat_id: ChatId,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn for_chat(self, chat_id: ChatId) -> Self {
        Error::Chat {
            chat_id,
            source: Box::new(self),
        }
    }
}

/// Error returned by a notifier when a batch stops early.
///
/// `last_delivered` is the id of the last message that made it through in
/// full (text and attachments); 0 means nothing was delivered. Callers use
/// it to checkpoint progress before surfacing the failure.
#[derive(Debug, Error)]
#[error("delivery stopped after message {last_delivered}: {source}")]
pub struct DeliveryError {
    pub last_delivered: u64,
    #[source]
    pub source: Error,
}

impl From<DeliveryError> for Error {
    fn from(e: DeliveryError) -> Self {
        Error::Delivery {
            last_delivered: e.last_delivered,
            source: Box::new(e.source),
        }
    }
}

/// Result type for Raíces notifier operations.
pub type Result<T> = std::result::Result<T, Error>;
