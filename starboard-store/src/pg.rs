//! Postgres implementation of the entry store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use starboard_core::config::DatabaseConfig;
use starboard_core::model::{BoardEntry, ChannelId, EntryReference, MessageId, UserId};

use crate::error::{StoreError, StoreResult};
use crate::EntryStore;

/// Reconnection policy: fixed-interval probes, bounded attempts.
const RECONNECT_ATTEMPTS: u32 = 5;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Author column value for rows written before the column existed.
const AUTHOR_BACKFILL_SENTINEL: i64 = -1;

pub struct PgStore {
    pool: PgPool,
    write_lane: Mutex<()>,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(&config.url())
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            write_lane: Mutex::new(()),
        }
    }

    /// Idempotent schema bootstrap. Creates the table at the latest
    /// revision and additively migrates tables left behind by any earlier
    /// revision; must run before the process starts serving signals.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        self.ensure_live().await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS starboard (
                original_message_id bigint NOT NULL PRIMARY KEY,
                original_channel_id bigint NOT NULL,
                original_author_id bigint NOT NULL DEFAULT -1,
                starboard_message_id bigint NOT NULL UNIQUE,
                referenced_message_id bigint,
                referenced_author_id bigint,
                stars smallint NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Columns introduced after the first schema revision. The author
        // column defaults to the backfill sentinel so pre-existing rows are
        // picked up by the startup backfill pass.
        for statement in [
            "ALTER TABLE IF EXISTS ONLY starboard ADD COLUMN IF NOT EXISTS original_author_id bigint NOT NULL DEFAULT -1;",
            "ALTER TABLE IF EXISTS ONLY starboard ADD COLUMN IF NOT EXISTS referenced_message_id bigint;",
            "ALTER TABLE IF EXISTS ONLY starboard ADD COLUMN IF NOT EXISTS referenced_author_id bigint;",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("starboard schema ready");
        Ok(())
    }

    async fn probe(&self) -> bool {
        sqlx::query("SELECT 1;").execute(&self.pool).await.is_ok()
    }

    /// Cheap liveness check before every operation. sqlx re-establishes
    /// pooled connections lazily, so a successful re-probe means the
    /// connection is usable again.
    async fn ensure_live(&self) -> StoreResult<()> {
        if self.probe().await {
            return Ok(());
        }
        for attempt in 1..=RECONNECT_ATTEMPTS {
            warn!(attempt, "store connection lost, retrying");
            tokio::time::sleep(RECONNECT_DELAY).await;
            if self.probe().await {
                info!(attempt, "store connection restored");
                return Ok(());
            }
        }
        Err(StoreError::Unavailable {
            attempts: RECONNECT_ATTEMPTS,
        })
    }

    /// Acquire the single-writer lane, verifying liveness before yielding
    /// it to the caller.
    async fn writable(&self) -> StoreResult<MutexGuard<'_, ()>> {
        let guard = self.write_lane.lock().await;
        self.ensure_live().await?;
        Ok(guard)
    }
}

/// The `stars` column is a `smallint`; counts past its range are clamped
/// rather than wrapped negative.
fn stars_column(count: u16) -> i16 {
    count.min(i16::MAX as u16) as i16
}

fn entry_from_row(row: &PgRow) -> Result<BoardEntry, sqlx::Error> {
    let author: i64 = row.try_get("original_author_id")?;
    let referenced_message: Option<i64> = row.try_get("referenced_message_id")?;
    let referenced_author: Option<i64> = row.try_get("referenced_author_id")?;
    let stars: i16 = row.try_get("stars")?;
    Ok(BoardEntry {
        original_message_id: row.try_get("original_message_id")?,
        original_channel_id: row.try_get("original_channel_id")?,
        original_author_id: (author != AUTHOR_BACKFILL_SENTINEL).then_some(author),
        board_message_id: row.try_get("starboard_message_id")?,
        reference: match (referenced_message, referenced_author) {
            (Some(message_id), Some(author_id)) => Some(EntryReference {
                message_id,
                author_id,
            }),
            _ => None,
        },
        endorsement_count: stars.max(0) as u16,
    })
}

fn entries_from_rows(rows: Vec<PgRow>) -> Result<Vec<BoardEntry>, sqlx::Error> {
    rows.iter().map(entry_from_row).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl EntryStore for PgStore {
    async fn get(&self, original_message: MessageId) -> StoreResult<Option<BoardEntry>> {
        self.ensure_live().await?;
        let row = sqlx::query("SELECT * FROM starboard WHERE original_message_id = $1;")
            .bind(original_message)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(entry_from_row).transpose()?)
    }

    async fn get_by_author(&self, author: UserId) -> StoreResult<Vec<BoardEntry>> {
        self.ensure_live().await?;
        let rows = sqlx::query("SELECT * FROM starboard WHERE original_author_id = $1;")
            .bind(author)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries_from_rows(rows)?)
    }

    async fn get_referencing(&self, referenced_message: MessageId) -> StoreResult<Vec<BoardEntry>> {
        self.ensure_live().await?;
        let rows = sqlx::query("SELECT * FROM starboard WHERE referenced_message_id = $1;")
            .bind(referenced_message)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries_from_rows(rows)?)
    }

    async fn has_any_for_author(&self, author: UserId) -> StoreResult<bool> {
        self.ensure_live().await?;
        let row = sqlx::query("SELECT 1 FROM starboard WHERE original_author_id = $1 LIMIT 1;")
            .bind(author)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get_all(&self) -> StoreResult<Vec<BoardEntry>> {
        self.ensure_live().await?;
        let rows = sqlx::query("SELECT * FROM starboard;")
            .fetch_all(&self.pool)
            .await?;
        Ok(entries_from_rows(rows)?)
    }

    async fn get_unattributed(&self) -> StoreResult<Vec<BoardEntry>> {
        self.ensure_live().await?;
        let rows = sqlx::query("SELECT * FROM starboard WHERE original_author_id = $1;")
            .bind(AUTHOR_BACKFILL_SENTINEL)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries_from_rows(rows)?)
    }

    async fn insert(&self, entry: &BoardEntry) -> StoreResult<()> {
        let _lane = self.writable().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO starboard (
                original_message_id, original_channel_id, original_author_id,
                starboard_message_id, referenced_message_id, referenced_author_id, stars
            ) VALUES ($1, $2, $3, $4, $5, $6, $7);
            "#,
        )
        .bind(entry.original_message_id)
        .bind(entry.original_channel_id)
        .bind(entry.original_author_id.unwrap_or(AUTHOR_BACKFILL_SENTINEL))
        .bind(entry.board_message_id)
        .bind(entry.reference.map(|r| r.message_id))
        .bind(entry.reference.map(|r| r.author_id))
        .bind(stars_column(entry.endorsement_count))
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict(format!(
                "entry for message {} already exists",
                entry.original_message_id
            ))),
            Err(err) => Err(err.into()),
        }
    }

    async fn update_count(&self, original_message: MessageId, count: u16) -> StoreResult<()> {
        let _lane = self.writable().await?;
        sqlx::query("UPDATE starboard SET stars = $1 WHERE original_message_id = $2;")
            .bind(stars_column(count))
            .bind(original_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_counts_bulk(&self, updates: &[(u16, MessageId)]) -> StoreResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let _lane = self.writable().await?;
        let mut tx = self.pool.begin().await?;
        for (count, original_message) in updates {
            sqlx::query("UPDATE starboard SET stars = $1 WHERE original_message_id = $2;")
                .bind(stars_column(*count))
                .bind(*original_message)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_author(&self, original_message: MessageId, author: UserId) -> StoreResult<()> {
        let _lane = self.writable().await?;
        sqlx::query("UPDATE starboard SET original_author_id = $1 WHERE original_message_id = $2;")
            .bind(author)
            .bind(original_message)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, original_message: MessageId) -> StoreResult<Option<BoardEntry>> {
        let _lane = self.writable().await?;
        let row = sqlx::query("DELETE FROM starboard WHERE original_message_id = $1 RETURNING *;")
            .bind(original_message)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(entry_from_row).transpose()?)
    }

    async fn delete_by_channel(&self, channel: ChannelId) -> StoreResult<Vec<BoardEntry>> {
        let _lane = self.writable().await?;
        let rows = sqlx::query("DELETE FROM starboard WHERE original_channel_id = $1 RETURNING *;")
            .bind(channel)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries_from_rows(rows)?)
    }

    async fn delete_all(&self) -> StoreResult<()> {
        let _lane = self.writable().await?;
        sqlx::query("DELETE FROM starboard;").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::stars_column;

    #[test]
    fn counts_past_smallint_range_clamp_instead_of_wrapping() {
        assert_eq!(stars_column(0), 0);
        assert_eq!(stars_column(32_767), i16::MAX);
        assert_eq!(stars_column(32_768), i16::MAX);
        assert_eq!(stars_column(u16::MAX), i16::MAX);
    }
}
