//! The reconciliation engine proper.

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use starboard_core::config::Config;
use starboard_core::gateway::{ChatGateway, ChatMessage, GatewayError};
use starboard_core::model::{BoardEntry, ChannelId, EntryReference, MessageId, UserId};
use starboard_core::pool::JoinPool;
use starboard_core::render::render;
use starboard_store::{EntryStore, StoreError};

use crate::command::{self, RecomputeMode};

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("platform error: {0}")]
    Gateway(#[from] GatewayError),
}

/// The slice of [`Config`] the engine needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub board_channel: ChannelId,
    pub minimum_endorsements: u16,
    pub emoji: String,
    pub operator: UserId,
    pub command_prefix: String,
}

impl From<&Config> for EngineConfig {
    fn from(config: &Config) -> Self {
        Self {
            board_channel: config.board_channel,
            minimum_endorsements: config.minimum_endorsements,
            emoji: config.endorsement_emoji.clone(),
            operator: config.operator,
            command_prefix: config.command_prefix.clone(),
        }
    }
}

/// Outcome of resolving a message for an endorsement signal.
enum Resolution {
    Found(ChatMessage),
    /// The message no longer exists.
    Missing,
    /// The call was rate limited; the signal is dropped.
    Dropped,
}

/// Maintains the mapping between original messages and their board copies.
///
/// Sole writer of the entry store. Every public method handles one signal
/// in isolation: a failure inside one signal never aborts unrelated
/// concurrent work, and rate-limited platform calls are dropped rather
/// than retried (the next signal touching the row reconciles it).
pub struct Engine<G, S> {
    gateway: G,
    store: S,
    config: EngineConfig,
}

impl<G: ChatGateway, S: EntryStore> Engine<G, S> {
    pub fn new(gateway: G, store: S, config: EngineConfig) -> Self {
        Self {
            gateway,
            store,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn is_board_channel(&self, channel: ChannelId) -> bool {
        channel == self.config.board_channel
    }

    /// An endorsement of `emoji` kind was added to a message.
    pub async fn endorsement_added(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> EngineResult<()> {
        if self.is_board_channel(channel) || emoji != self.config.emoji {
            return Ok(());
        }
        let message = match self.resolve_or_drop(channel, message_id).await? {
            Resolution::Found(message) => message,
            Resolution::Missing => {
                // Message already gone; make sure no stale entry survives it.
                self.remove_entry(message_id).await?;
                return Ok(());
            }
            Resolution::Dropped => return Ok(()),
        };
        let Some(count) = self.count_or_drop(&message).await? else {
            return Ok(());
        };
        if count < self.config.minimum_endorsements {
            return Ok(());
        }
        let referenced = self.resolve_reply(&message).await;
        self.reconcile(&message, referenced.as_ref(), Some(count), true)
            .await?;
        Ok(())
    }

    /// An endorsement of `emoji` kind was removed from a message.
    pub async fn endorsement_removed(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> EngineResult<()> {
        if self.is_board_channel(channel) || emoji != self.config.emoji {
            return Ok(());
        }
        let message = match self.resolve_or_drop(channel, message_id).await? {
            Resolution::Found(message) => message,
            Resolution::Missing => {
                self.remove_entry(message_id).await?;
                return Ok(());
            }
            Resolution::Dropped => return Ok(()),
        };
        let Some(count) = self.count_or_drop(&message).await? else {
            return Ok(());
        };
        if count < self.config.minimum_endorsements {
            self.remove_entry(message_id).await?;
            return Ok(());
        }
        let referenced = self.resolve_reply(&message).await;
        self.reconcile(&message, referenced.as_ref(), Some(count), false)
            .await?;
        Ok(())
    }

    /// Every endorsement on a message was cleared at once.
    pub async fn endorsements_cleared(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> EngineResult<()> {
        if self.is_board_channel(channel) {
            return Ok(());
        }
        self.remove_entry(message_id).await?;
        Ok(())
    }

    /// Every endorsement of one emoji kind was cleared from a message.
    pub async fn endorsement_emoji_cleared(
        &self,
        channel: ChannelId,
        message_id: MessageId,
        emoji: &str,
    ) -> EngineResult<()> {
        if self.is_board_channel(channel) || emoji != self.config.emoji {
            return Ok(());
        }
        self.remove_entry(message_id).await?;
        Ok(())
    }

    /// The original message's content changed. The stored count is
    /// preserved; only the rendering is refreshed.
    pub async fn message_edited(&self, message: &ChatMessage) -> EngineResult<()> {
        if self.is_board_channel(message.channel_id) {
            return Ok(());
        }
        let referenced = self.resolve_reply(message).await;
        self.reconcile(message, referenced.as_ref(), None, false)
            .await?;
        Ok(())
    }

    /// A single message was deleted. Deletions inside the board channel
    /// only clean the table; the board copy is already gone.
    pub async fn message_deleted(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> EngineResult<()> {
        if self.is_board_channel(channel) {
            self.store.delete(message_id).await?;
            return Ok(());
        }
        self.remove_entry(message_id).await?;
        Ok(())
    }

    /// A bulk deletion of messages in one channel. Every id is processed
    /// independently; failures are logged per id and never abort siblings.
    pub async fn messages_bulk_deleted(
        &self,
        channel: ChannelId,
        message_ids: &[MessageId],
    ) -> EngineResult<()> {
        let board = self.is_board_channel(channel);
        let mut pool = JoinPool::new();
        for &message_id in message_ids {
            pool.add(async move {
                let outcome = if board {
                    self.store.delete(message_id).await.map(|_| ()).map_err(EngineError::from)
                } else {
                    self.remove_entry(message_id).await.map(|_| ())
                };
                if let Err(err) = outcome {
                    warn!(message = message_id, error = %err, "failed to process bulk-deleted message");
                }
            });
        }
        pool.join().await;
        Ok(())
    }

    /// A whole channel disappeared.
    pub async fn channel_deleted(&self, channel: ChannelId) -> EngineResult<()> {
        if self.is_board_channel(channel) {
            // The board copies died with the channel; only the table needs
            // clearing.
            self.store.delete_all().await?;
            info!("board channel deleted, cleared all entries");
            return Ok(());
        }
        let removed = self.store.delete_by_channel(channel).await?;
        if removed.is_empty() {
            return Ok(());
        }
        debug!(channel, entries = removed.len(), "channel deleted, removing board copies");
        let mut pool = JoinPool::new();
        for entry in &removed {
            pool.add(self.delete_board_copy(entry.board_message_id));
        }
        pool.join().await;
        Ok(())
    }

    /// An author's display name or avatar changed; refresh every board
    /// copy showing their identity. Stored counts are preserved.
    pub async fn author_updated(&self, author: UserId) -> EngineResult<()> {
        if !self.store.has_any_for_author(author).await? {
            return Ok(());
        }
        let entries = self.store.get_by_author(author).await?;
        let mut pool = JoinPool::new();
        for entry in &entries {
            pool.add(async move {
                let message = match self
                    .gateway
                    .resolve_message(entry.original_channel_id, entry.original_message_id)
                    .await
                {
                    Ok(Some(message)) => message,
                    Ok(None) => return,
                    Err(err) => {
                        warn!(message = entry.original_message_id, error = %err, "failed to resolve message for author refresh");
                        return;
                    }
                };
                let referenced = self.resolve_entry_reference(entry).await;
                if let Err(err) = self.update_entry(&message, referenced.as_ref(), None, entry).await {
                    warn!(message = entry.original_message_id, error = %err, "failed to refresh entry after author update");
                }
            });
        }
        pool.join().await;
        Ok(())
    }

    /// Full recomputation over every tracked entry. Per-row work runs
    /// concurrently; count changes are flushed in one bulk write after the
    /// join. A row's board-copy edit and its count persistence are
    /// independent operations.
    pub async fn recompute(&self, mode: RecomputeMode) -> EngineResult<()> {
        let entries = self.store.get_all().await?;
        info!(entries = entries.len(), ?mode, "starting full recomputation");
        let pending: Mutex<Vec<(u16, MessageId)>> = Mutex::new(Vec::new());
        let mut pool = JoinPool::new();
        for entry in &entries {
            let pending = &pending;
            pool.add(async move {
                let message = match self
                    .gateway
                    .resolve_message(entry.original_channel_id, entry.original_message_id)
                    .await
                {
                    Ok(Some(message)) => message,
                    Ok(None) => {
                        // Deleted-message cleanup.
                        if let Err(err) = self.remove_entry(entry.original_message_id).await {
                            warn!(message = entry.original_message_id, error = %err, "failed to remove stale entry");
                        }
                        return;
                    }
                    Err(err) => {
                        warn!(message = entry.original_message_id, error = %err, "skipping entry during recomputation");
                        return;
                    }
                };
                let count = match self.gateway.endorsement_count(&message).await {
                    Ok(count) => count,
                    Err(err) => {
                        warn!(message = message.id, error = %err, "skipping entry during recomputation");
                        return;
                    }
                };
                if count < self.config.minimum_endorsements {
                    if let Err(err) = self.remove_entry(entry.original_message_id).await {
                        warn!(message = entry.original_message_id, error = %err, "failed to remove below-threshold entry");
                    }
                    return;
                }
                let unchanged = count == entry.endorsement_count;
                if unchanged && mode == RecomputeMode::Recount {
                    return;
                }
                if !unchanged {
                    pending.lock().await.push((count, entry.original_message_id));
                }
                let referenced = self.resolve_entry_reference(entry).await;
                self.edit_board_copy(&message, referenced.as_ref(), count, entry.board_message_id)
                    .await;
            });
        }
        pool.join().await;
        drop(pool);
        let updates = pending.into_inner();
        if !updates.is_empty() {
            info!(rows = updates.len(), "flushing recomputed counts");
            self.store.update_counts_bulk(&updates).await?;
        }
        Ok(())
    }

    /// One-time startup pass attributing rows written before the author
    /// column existed. Unresolvable rows are left for the next
    /// recomputation to clean up.
    pub async fn backfill_authors(&self) -> EngineResult<()> {
        let entries = self.store.get_unattributed().await?;
        if entries.is_empty() {
            return Ok(());
        }
        info!(rows = entries.len(), "backfilling author ids");
        let mut pool = JoinPool::new();
        for entry in &entries {
            pool.add(async move {
                match self
                    .gateway
                    .resolve_message(entry.original_channel_id, entry.original_message_id)
                    .await
                {
                    Ok(Some(message)) => {
                        match self
                            .store
                            .set_author(entry.original_message_id, message.author.id)
                            .await
                        {
                            Ok(()) => info!(
                                message = entry.original_message_id,
                                author = message.author.id,
                                "attributed board entry"
                            ),
                            Err(err) => warn!(message = entry.original_message_id, error = %err, "failed to attribute board entry"),
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(message = entry.original_message_id, error = %err, "failed to resolve message for backfill");
                    }
                }
            });
        }
        pool.join().await;
        Ok(())
    }

    /// Recognize an operator recomputation command: right author, outside
    /// the board channel, exact command form.
    pub fn operator_command(&self, message: &ChatMessage) -> Option<RecomputeMode> {
        if message.author.id != self.config.operator {
            return None;
        }
        if self.is_board_channel(message.channel_id) {
            return None;
        }
        command::parse(&message.content, &self.config.command_prefix)
    }

    /// Core update-or-create transition. `count` of `None` means the live
    /// count is unknown and the stored value must be preserved. Returns
    /// whether anything was tracked.
    async fn reconcile(
        &self,
        message: &ChatMessage,
        referenced: Option<&ChatMessage>,
        count: Option<u16>,
        create: bool,
    ) -> EngineResult<bool> {
        if let Some(entry) = self.store.get(message.id).await? {
            self.update_entry(message, referenced, count, &entry).await?;
            return Ok(true);
        }
        if !create {
            return self.refresh_referencing(message).await;
        }
        self.create_entry(message, referenced, count.unwrap_or_default())
            .await?;
        Ok(true)
    }

    /// The message has no entry of its own but may be the reply target of
    /// tracked entries; re-render each of those with this message as the
    /// referenced one.
    async fn refresh_referencing(&self, message: &ChatMessage) -> EngineResult<bool> {
        let referencing = self.store.get_referencing(message.id).await?;
        if referencing.is_empty() {
            return Ok(false);
        }
        let mut pool = JoinPool::new();
        for entry in &referencing {
            pool.add(async move {
                let original = match self
                    .gateway
                    .resolve_message(entry.original_channel_id, entry.original_message_id)
                    .await
                {
                    Ok(Some(original)) => original,
                    Ok(None) => return,
                    Err(err) => {
                        warn!(message = entry.original_message_id, error = %err, "failed to resolve referencing original");
                        return;
                    }
                };
                if let Err(err) = self.update_entry(&original, Some(message), None, entry).await {
                    warn!(message = entry.original_message_id, error = %err, "failed to refresh referencing entry");
                }
            });
        }
        pool.join().await;
        Ok(true)
    }

    async fn create_entry(
        &self,
        message: &ChatMessage,
        referenced: Option<&ChatMessage>,
        count: u16,
    ) -> EngineResult<()> {
        let payloads = render(message, count, &self.config.emoji, referenced);
        let board_message = match self.gateway.post_board_message(&payloads).await {
            Ok(id) => id,
            Err(GatewayError::RateLimited) => {
                warn!(message = message.id, "rate limited posting board copy");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        let entry = BoardEntry {
            original_message_id: message.id,
            original_channel_id: message.channel_id,
            original_author_id: Some(message.author.id),
            board_message_id: board_message,
            reference: referenced.map(|referenced| EntryReference {
                message_id: referenced.id,
                author_id: referenced.author.id,
            }),
            endorsement_count: count,
        };
        self.store.insert(&entry).await?;
        debug!(message = message.id, board_message, count, "created board entry");
        Ok(())
    }

    /// Persist a changed count and refresh the board copy in place. An
    /// update racing a concurrent delete is a benign miss: the count write
    /// no-ops and the edit failure is logged and dropped.
    async fn update_entry(
        &self,
        message: &ChatMessage,
        referenced: Option<&ChatMessage>,
        count: Option<u16>,
        entry: &BoardEntry,
    ) -> EngineResult<()> {
        if let Some(count) = count {
            if count != entry.endorsement_count {
                self.store.update_count(entry.original_message_id, count).await?;
            }
        }
        let shown = count.unwrap_or(entry.endorsement_count);
        self.edit_board_copy(message, referenced, shown, entry.board_message_id)
            .await;
        Ok(())
    }

    /// Delete the entry and, if one existed, its board copy. Returns
    /// whether an entry was removed.
    async fn remove_entry(&self, original_message: MessageId) -> EngineResult<bool> {
        let Some(entry) = self.store.delete(original_message).await? else {
            return Ok(false);
        };
        self.delete_board_copy(entry.board_message_id).await;
        Ok(true)
    }

    /// Resolve a message for an endorsement signal. A genuine miss is
    /// terminal state and triggers cleanup at the call site; a rate-limited
    /// call is dropped without touching the tracked entry.
    async fn resolve_or_drop(
        &self,
        channel: ChannelId,
        message_id: MessageId,
    ) -> EngineResult<Resolution> {
        match self.gateway.resolve_message(channel, message_id).await {
            Ok(Some(message)) => Ok(Resolution::Found(message)),
            Ok(None) => Ok(Resolution::Missing),
            Err(GatewayError::RateLimited) => {
                warn!(message = message_id, "rate limited resolving message");
                Ok(Resolution::Dropped)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn count_or_drop(&self, message: &ChatMessage) -> EngineResult<Option<u16>> {
        match self.gateway.endorsement_count(message).await {
            Ok(count) => Ok(Some(count)),
            Err(GatewayError::RateLimited) => {
                warn!(message = message.id, "rate limited counting endorsements");
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve the message this one replies to, if any. Failures degrade
    /// to rendering without the referenced payload.
    async fn resolve_reply(&self, message: &ChatMessage) -> Option<ChatMessage> {
        let target = message.replies_to?;
        match self.gateway.resolve_message(message.channel_id, target).await {
            Ok(found) => found,
            Err(err) => {
                warn!(message = message.id, error = %err, "failed to resolve referenced message");
                None
            }
        }
    }

    async fn resolve_entry_reference(&self, entry: &BoardEntry) -> Option<ChatMessage> {
        let reference = entry.reference?;
        match self
            .gateway
            .resolve_message(entry.original_channel_id, reference.message_id)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(message = entry.original_message_id, error = %err, "failed to resolve entry reference");
                None
            }
        }
    }

    /// Board-channel calls are fire-and-observe: failures are logged, the
    /// next signal touching the row reconciles any drift.
    async fn edit_board_copy(
        &self,
        message: &ChatMessage,
        referenced: Option<&ChatMessage>,
        count: u16,
        board_message: MessageId,
    ) {
        let payloads = render(message, count, &self.config.emoji, referenced);
        match self.gateway.edit_board_message(board_message, &payloads).await {
            Ok(()) => {}
            Err(GatewayError::RateLimited) => {
                warn!(board_message, "rate limited editing board copy");
            }
            Err(err) => {
                warn!(board_message, error = %err, "failed to edit board copy");
            }
        }
    }

    async fn delete_board_copy(&self, board_message: MessageId) {
        match self.gateway.delete_board_message(board_message).await {
            Ok(()) => {}
            Err(GatewayError::RateLimited) => {
                warn!(board_message, "rate limited deleting board copy");
            }
            Err(err) => {
                warn!(board_message, error = %err, "failed to delete board copy");
            }
        }
    }
}
