//! Error types for starboard-store

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The connection could not be re-established within the bounded
    /// retry window. Fatal to the in-flight operation, never to the
    /// process.
    #[error("store unavailable after {attempts} reconnection attempts")]
    Unavailable { attempts: u32 },

    /// A unique key (original message id or board message id) already
    /// exists. Signals a race between two create paths for the same
    /// message; the existing row is untouched.
    #[error("conflicting board entry: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
