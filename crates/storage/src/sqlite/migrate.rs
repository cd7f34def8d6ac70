use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::SqliteInitError;

/// Schema steps in order; step `n` becomes version `n + 1`.
const MIGRATIONS: &[&str] = &[
    // One row per slot; `value` is the whole JSON document.
    r"
        CREATE TABLE IF NOT EXISTS storage_slots (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
    ",
];

pub(super) async fn current_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
        .fetch_one(pool)
        .await
}

/// Apply every step newer than the recorded version. Returns the version
/// the database is at afterwards.
pub(super) async fn apply(pool: &SqlitePool) -> Result<i64, SqliteInitError> {
    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )
        ",
    )
    .execute(pool)
    .await
    .map_err(SqliteInitError::Open)?;

    let mut version = current_version(pool)
        .await
        .map_err(SqliteInitError::Open)?;

    for (step, sql) in (1_i64..).zip(MIGRATIONS.iter().copied()) {
        if step <= version {
            continue;
        }
        apply_step(pool, step, sql)
            .await
            .map_err(|source| SqliteInitError::Migration {
                version: step,
                source,
            })?;
        debug!(version = step, "applied slot store migration");
        version = step;
    }

    Ok(version)
}

async fn apply_step(pool: &SqlitePool, version: i64, sql: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    sqlx::query(sql).execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
        .bind(version)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}
