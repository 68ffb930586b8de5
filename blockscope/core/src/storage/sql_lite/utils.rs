use anyhow::Result;
use sqlx::{Pool, Sqlite};

use super::SqliteIndexStore;
use crate::errors::StoreError;

impl SqliteIndexStore {
    pub(crate) async fn check_tables_exist(pool: &Pool<Sqlite>) -> Result<bool> {
        for table in ["checkpoints", "events"] {
            let exists =
                sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
                    .bind(table)
                    .fetch_optional(pool)
                    .await?
                    .is_some();
            if !exists {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// SQLite integers are signed.
pub(crate) fn to_column(block_number: u64) -> Result<i64, StoreError> {
    i64::try_from(block_number).map_err(|_| StoreError::BlockNumberOutOfRange(block_number))
}

pub(crate) fn from_column(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::BlockNumberOutOfRange(value as u64))
}
