//! starboard-core: shared primitives for the starboard service
//!
//! Holds everything the store and the reconciliation engine agree on:
//! the persisted entry model, the chat-platform gateway contract, pure
//! payload rendering, environment-driven configuration, and the
//! fan-out/join pool used by bulk operations.

pub mod config;
pub mod gateway;
pub mod model;
pub mod pool;
pub mod render;

pub use config::{Config, ConfigError, DatabaseConfig};
pub use gateway::{ChatAuthor, ChatGateway, ChatMessage, GatewayError};
pub use model::{BoardEntry, ChannelId, EntryReference, MessageId, UserId};
pub use pool::JoinPool;
pub use render::{render, DisplayPayload};
