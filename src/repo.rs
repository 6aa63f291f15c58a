//! Chat store: per-chat portal credentials and the delivery watermark.
//!
//! The storage engine behind the trait is deliberately out of scope; a sync
//! pass only needs to enumerate chats and advance watermarks. Two small
//! implementations are provided: an in-memory store for tests and a flat
//! JSON file store for single-host deployments.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

pub type ChatId = u64;

/// Portal credentials for one chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

/// One notification target: a chat, the portal account it watches and the id
/// of the last message already delivered to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub credentials: Credentials,
    #[serde(default)]
    pub last_notified_message: u64,
}

/// Store of chats and their delivery watermarks.
#[async_trait]
pub trait Repo: Send + Sync {
    async fn get_chats(&self) -> Result<Vec<Chat>>;
    async fn update_last_notified_message(&self, chat_id: ChatId, last: u64) -> Result<()>;
}

/// In-memory chat store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryRepo {
    chats: Mutex<BTreeMap<ChatId, Chat>>,
}

impl MemoryRepo {
    pub fn new(chats: impl IntoIterator<Item = Chat>) -> Self {
        Self {
            chats: Mutex::new(chats.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// Current watermark for a chat, if the chat exists.
    pub fn last_notified_message(&self, chat_id: ChatId) -> Option<u64> {
        let chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        chats.get(&chat_id).map(|c| c.last_notified_message)
    }
}

#[async_trait]
impl Repo for MemoryRepo {
    async fn get_chats(&self) -> Result<Vec<Chat>> {
        let chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        Ok(chats.values().cloned().collect())
    }

    async fn update_last_notified_message(&self, chat_id: ChatId, last: u64) -> Result<()> {
        let mut chats = self.chats.lock().unwrap_or_else(|e| e.into_inner());
        let chat = chats
            .get_mut(&chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;
        chat.last_notified_message = last;
        Ok(())
    }
}

/// Chat store backed by a flat JSON file holding a list of [`Chat`] records.
///
/// The file is read on every `get_chats` call and rewritten in full on every
/// watermark update; a sync pass touches it a handful of times at most.
#[derive(Debug, Clone)]
pub struct JsonRepo {
    path: PathBuf,
}

impl JsonRepo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> Result<Vec<Chat>> {
        let data = std::fs::read_to_string(&self.path)?;
        let chats: Vec<Chat> = serde_json::from_str(&data)?;
        Ok(chats)
    }

    fn store(&self, chats: &[Chat]) -> Result<()> {
        let data = serde_json::to_string_pretty(chats)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

#[async_trait]
impl Repo for JsonRepo {
    async fn get_chats(&self) -> Result<Vec<Chat>> {
        let chats = self.load()?;
        debug!(path = %self.path.display(), count = chats.len(), "loaded chats");
        Ok(chats)
    }

    async fn update_last_notified_message(&self, chat_id: ChatId, last: u64) -> Result<()> {
        let mut chats = self.load()?;
        let chat = chats
            .iter_mut()
            .find(|c| c.id == chat_id)
            .ok_or_else(|| Error::Store(format!("unknown chat {chat_id}")))?;
        chat.last_notified_message = last;
        self.store(&chats)
    }
}
