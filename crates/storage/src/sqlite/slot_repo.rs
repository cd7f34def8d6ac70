use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use super::SqliteSlotStore;
use crate::repository::{SlotStore, StorageError};

#[async_trait]
impl SlotStore for SqliteSlotStore {
    async fn get(&self, slot: &str) -> Result<Option<String>, StorageError> {
        let row = sqlx::query("SELECT value FROM storage_slots WHERE key = ?1")
            .bind(slot)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|row| {
            row.try_get::<String, _>("value")
                .map_err(|e| StorageError::Serialization(e.to_string()))
        })
        .transpose()
    }

    async fn set(&self, slot: &str, value: &str) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO storage_slots (key, value, updated_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(slot)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn remove(&self, slot: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM storage_slots WHERE key = ?1")
            .bind(slot)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
