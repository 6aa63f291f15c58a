//! One sync pass: fetch new messages per chat, forward them, checkpoint.

use tracing::{debug, info};

use crate::client::MessageSource;
use crate::error::{Error, Result};
use crate::notifier::Notifier;
use crate::repo::{Chat, Repo};

/// Drives sync passes over every chat in the store.
///
/// Chats are processed sequentially; the pass stops at the first chat that
/// fails. Collaborators are injected so passes can run against fakes.
pub struct Syncer<R, S, N> {
    repo: R,
    source: S,
    notifier: N,
}

impl<R, S, N> Syncer<R, S, N>
where
    R: Repo,
    S: MessageSource,
    N: Notifier,
{
    pub fn new(repo: R, source: S, notifier: N) -> Self {
        Self {
            repo,
            source,
            notifier,
        }
    }

    /// Run one pass over all chats, stopping at the first failure.
    pub async fn sync_all(&self) -> Result<()> {
        let chats = self.repo.get_chats().await?;
        info!(count = chats.len(), "starting sync pass");
        for chat in &chats {
            self.sync_one(chat).await?;
        }
        Ok(())
    }

    /// Sync a single chat: fetch, deliver, checkpoint.
    ///
    /// The checkpoint is written even when delivery stops partway, so the
    /// messages that did go out are never re-sent on the next pass. A fetch
    /// that yields nothing new is a no-op, not an error.
    pub async fn sync_one(&self, chat: &Chat) -> Result<()> {
        let msgs = self
            .source
            .fetch_messages(&chat.credentials, chat.last_notified_message)
            .await
            .map_err(|e| e.for_chat(chat.id))?;

        if msgs.is_empty() {
            debug!(chat_id = chat.id, "no new messages");
            return Ok(());
        }
        info!(chat_id = chat.id, count = msgs.len(), "delivering new messages");

        match self.notifier.notify(chat.id, &msgs).await {
            Ok(last_delivered) => {
                self.checkpoint(chat, last_delivered).await?;
                Ok(())
            }
            Err(delivery) => {
                // Persist whatever made it through before surfacing the
                // failure; a checkpoint failure at this point outranks it
                self.checkpoint(chat, delivery.last_delivered).await?;
                Err(Error::from(delivery).for_chat(chat.id))
            }
        }
    }

    async fn checkpoint(&self, chat: &Chat, last_delivered: u64) -> Result<()> {
        if last_delivered <= chat.last_notified_message {
            return Ok(());
        }
        self.repo
            .update_last_notified_message(chat.id, last_delivered)
            .await
            .map_err(|e| e.for_chat(chat.id))?;
        debug!(
            chat_id = chat.id,
            last_delivered, "checkpointed delivery watermark"
        );
        Ok(())
    }
}
