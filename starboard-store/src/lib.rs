//! starboard-store: durable table of board entries
//!
//! The store is a passive persistence layer with no business logic: the
//! reconciliation engine is its sole writer. All mutating operations are
//! funneled through a single logical write lane so concurrent engine
//! operations cannot interleave partial updates; reads bypass the lane and
//! observe committed state only.

pub mod error;
mod pg;

use async_trait::async_trait;

use starboard_core::model::{BoardEntry, ChannelId, MessageId, UserId};

pub use error::{StoreError, StoreResult};
pub use pg::PgStore;

/// Persistence contract for board entries.
///
/// Deletes are idempotent (absent rows return `None`/empty, never an
/// error) and count updates on absent rows are no-ops, so the engine can
/// treat "row superseded by a concurrent delete" as a benign miss.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn get(&self, original_message: MessageId) -> StoreResult<Option<BoardEntry>>;

    async fn get_by_author(&self, author: UserId) -> StoreResult<Vec<BoardEntry>>;

    /// Entries whose original message replies to `referenced_message`.
    async fn get_referencing(&self, referenced_message: MessageId) -> StoreResult<Vec<BoardEntry>>;

    async fn has_any_for_author(&self, author: UserId) -> StoreResult<bool>;

    async fn get_all(&self) -> StoreResult<Vec<BoardEntry>>;

    /// Rows still carrying the pre-migration author sentinel, awaiting the
    /// one-time backfill pass.
    async fn get_unattributed(&self) -> StoreResult<Vec<BoardEntry>>;

    /// Fails with [`StoreError::Conflict`] if either unique key already
    /// exists; the stored row is left untouched.
    async fn insert(&self, entry: &BoardEntry) -> StoreResult<()>;

    /// No-op when the row does not exist.
    async fn update_count(&self, original_message: MessageId, count: u16) -> StoreResult<()>;

    /// Batched variant of [`EntryStore::update_count`], applied atomically.
    async fn update_counts_bulk(&self, updates: &[(u16, MessageId)]) -> StoreResult<()>;

    async fn set_author(&self, original_message: MessageId, author: UserId) -> StoreResult<()>;

    /// Atomic delete-and-return; `None` when absent.
    async fn delete(&self, original_message: MessageId) -> StoreResult<Option<BoardEntry>>;

    /// Atomic bulk delete-and-return of every entry in `channel`.
    async fn delete_by_channel(&self, channel: ChannelId) -> StoreResult<Vec<BoardEntry>>;

    async fn delete_all(&self) -> StoreResult<()>;
}
