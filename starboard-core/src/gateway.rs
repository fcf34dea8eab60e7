//! Chat-platform capability consumed by the engine.
//!
//! The real client (gateway connection, entity cache, REST calls) lives
//! outside this workspace; the engine only ever talks to this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ChannelId, MessageId, UserId};
use crate::render::DisplayPayload;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAuthor {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: String,
}

/// A resolved platform message, carrying everything rendering needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: ChatAuthor,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub jump_url: String,
    /// First attachment, if any; used as the preview image.
    pub attachment_url: Option<String>,
    /// Set when the message is itself a reply to another message in the
    /// same channel.
    pub replies_to: Option<MessageId>,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The platform rate limiter rejected the call. Soft failure: the
    /// engine logs and drops the affected operation.
    #[error("rate limited by the platform")]
    RateLimited,

    #[error("platform error: {0}")]
    Platform(String),
}

/// The narrow slice of the chat platform the engine depends on.
///
/// A resolution miss is `Ok(None)`, never an error: a message that no
/// longer exists is an expected terminal state that triggers cleanup.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn resolve_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<Option<ChatMessage>, GatewayError>;

    /// Count of qualifying endorsements on `message`, excluding any cast
    /// by the message's own author.
    async fn endorsement_count(&self, message: &ChatMessage) -> Result<u16, GatewayError>;

    async fn post_board_message(
        &self,
        payloads: &[DisplayPayload],
    ) -> Result<MessageId, GatewayError>;

    async fn edit_board_message(
        &self,
        board_message: MessageId,
        payloads: &[DisplayPayload],
    ) -> Result<(), GatewayError>;

    async fn delete_board_message(&self, board_message: MessageId) -> Result<(), GatewayError>;
}
