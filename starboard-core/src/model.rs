//! Persisted starboard state.

use serde::{Deserialize, Serialize};

/// Platform snowflake identifiers, stored as Postgres `bigint`.
pub type MessageId = i64;
pub type ChannelId = i64;
pub type UserId = i64;

/// Reply linkage captured when the original message itself replies to
/// another message. Both halves always travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryReference {
    pub message_id: MessageId,
    pub author_id: UserId,
}

/// One tracked message: the 1:1 link between an original message and the
/// copy posted to the board channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardEntry {
    /// Unique key; immutable for the life of the entry.
    pub original_message_id: MessageId,
    pub original_channel_id: ChannelId,
    /// `None` only for rows written before the author column existed and
    /// not yet backfilled.
    pub original_author_id: Option<UserId>,
    /// Unique; the posted board copy.
    pub board_message_id: MessageId,
    pub reference: Option<EntryReference>,
    /// Last endorsement count confirmed by the engine. May lag the live
    /// count between signals; reconciled on every touch.
    pub endorsement_count: u16,
}
