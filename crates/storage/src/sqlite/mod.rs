//! `SQLite`-backed slot store.
//!
//! Every slot is one row of `storage_slots`, keyed by slot name and holding
//! the whole JSON document. The schema is created when the store is opened.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use thiserror::Error;
use tracing::debug;

use crate::repository::{SlotStore, Storage};

mod migrate;
mod slot_repo;

/// Slot writes are small and serialized by the session manager.
const MAX_CONNECTIONS: u32 = 2;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error("invalid sqlite url {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("cannot open slot store: {0}")]
    Open(#[source] sqlx::Error),

    #[error("slot store migration {version} failed: {source}")]
    Migration {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
}

/// Slot store kept in a single `SQLite` database file.
#[derive(Clone)]
pub struct SqliteSlotStore {
    pool: SqlitePool,
}

impl SqliteSlotStore {
    /// Open (creating if missing) the database at `url` and bring the slot
    /// table up to date.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::InvalidUrl` for a malformed URL, `Open` when
    /// the database cannot be reached, and `Migration` when the schema cannot
    /// be applied.
    pub async fn open(url: &str) -> Result<Self, SqliteInitError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|source| SqliteInitError::InvalidUrl {
                url: url.to_owned(),
                source,
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(BUSY_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(SqliteInitError::Open)?;

        let version = migrate::apply(&pool).await?;
        debug!(url, schema_version = version, "opened slot store");
        Ok(Self { pool })
    }

    /// Schema version recorded in `schema_migrations`.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError::Open` if the version cannot be read.
    pub async fn schema_version(&self) -> Result<i64, SqliteInitError> {
        migrate::current_version(&self.pool)
            .await
            .map_err(SqliteInitError::Open)
    }
}

impl Storage {
    /// Build a `Storage` whose slots live in `SQLite`.
    ///
    /// # Errors
    ///
    /// See [`SqliteSlotStore::open`].
    pub async fn sqlite(url: &str) -> Result<Self, SqliteInitError> {
        let slots: Arc<dyn SlotStore> = Arc::new(SqliteSlotStore::open(url).await?);
        Ok(Self { slots })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SqliteSlotStore>();
    }

    #[tokio::test]
    async fn malformed_url_is_rejected() {
        let err = SqliteSlotStore::open("sqlite:slots.db?mode=sideways")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SqliteInitError::InvalidUrl { .. }));
    }
}
