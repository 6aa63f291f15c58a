pub mod client;
pub mod constants;
pub mod error;
pub mod models;
pub mod notifier;
pub mod repo;
pub mod sync;

pub use client::{MessageSource, RaicesClient};
pub use constants::{
    default_timeout, DEFAULT_BASE_URL, DEFAULT_TELEGRAM_BASE_URL, DEFAULT_TIMEOUT_SECS,
};
pub use error::{DeliveryError, Error, Result};
pub use models::{parse_message, Attachment, Message, RawAttachment, RawMessage};
pub use notifier::{Notifier, TelegramNotifier};
pub use repo::{Chat, ChatId, Credentials, JsonRepo, MemoryRepo, Repo};
pub use sync::Syncer;
