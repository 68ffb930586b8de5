use std::{fs, path::Path};

use anyhow::Result;
use log::trace;
use sqlx::{query, sqlite::SqlitePoolOptions, Pool, Sqlite};

use crate::events::IndexNames;

mod storage;
mod utils;

/// An [`IndexStore`](crate::storage::IndexStore) persisting checkpoints and event documents in a
/// local SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteIndexStore {
    pub(crate) pool: Pool<Sqlite>,
    pub(crate) peer: String,
    pub(crate) index_names: IndexNames,
}

impl SqliteIndexStore {
    pub async fn new(path: &str, peer: String, index_names: IndexNames) -> Result<Self> {
        if !Path::new(path).try_exists()? {
            trace!(
                "Database file not found. A new one will be created at: {}",
                path
            );
            fs::File::create(path)?;
        } else {
            trace!("Database file found at: {}", path);
        }

        let pool = SqlitePoolOptions::new()
            .connect(&format!("sqlite:{}", path))
            .await?;

        Self::from_pool(pool, peer, index_names).await
    }

    pub(crate) async fn from_pool(
        pool: Pool<Sqlite>,
        peer: String,
        index_names: IndexNames,
    ) -> Result<Self> {
        if !Self::check_tables_exist(&pool).await? {
            trace!("Creating the 'checkpoints' and 'events' tables...");
            Self::create_tables(&pool).await?;
        } else {
            trace!("Tables 'checkpoints' and 'events' found.");
        }

        Ok(Self {
            pool,
            peer,
            index_names,
        })
    }

    async fn create_tables(pool: &Pool<Sqlite>) -> Result<()> {
        query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                peer TEXT NOT NULL,
                channel TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                PRIMARY KEY (peer, channel)
            );",
        )
        .execute(pool)
        .await?;

        // `block_hash` is only set on block documents.
        query(
            "CREATE TABLE IF NOT EXISTS events (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                peer TEXT NOT NULL,
                channel TEXT NOT NULL,
                block_number INTEGER NOT NULL,
                block_hash TEXT,
                document TEXT NOT NULL,
                PRIMARY KEY (index_name, id)
            );",
        )
        .execute(pool)
        .await?;

        query(
            "CREATE INDEX IF NOT EXISTS events_by_block
                ON events (index_name, peer, channel, block_number);",
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}
