use sqlx::{query, Row};

use super::{
    utils::{from_column, to_column},
    SqliteIndexStore,
};
use crate::{
    errors::StoreError,
    events::{Event, EventKind},
    ledger::ChannelId,
    storage::IndexStore,
};

impl IndexStore for SqliteIndexStore {
    async fn get_checkpoint(&self, channel: &ChannelId) -> Result<Option<u64>, StoreError> {
        let row = query("SELECT block_number FROM checkpoints WHERE peer = ?1 AND channel = ?2")
            .bind(self.peer.as_str())
            .bind(channel.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| from_column(row.try_get(0)?)).transpose()
    }

    async fn put_checkpoint(&self, channel: &ChannelId, block_number: u64) -> Result<(), StoreError> {
        query("INSERT OR REPLACE INTO checkpoints (peer, channel, block_number) VALUES (?1, ?2, ?3)")
            .bind(self.peer.as_str())
            .bind(channel.as_str())
            .bind(to_column(block_number)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_block_hash(
        &self,
        channel: &ChannelId,
        block_number: u64,
    ) -> Result<Option<String>, StoreError> {
        let row = query(
            "SELECT block_hash FROM events
             WHERE index_name = ?1 AND peer = ?2 AND channel = ?3 AND block_number = ?4
             LIMIT 1",
        )
        .bind(self.index_names.index_for(EventKind::Block))
        .bind(self.peer.as_str())
        .bind(channel.as_str())
        .bind(to_column(block_number)?)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => row.try_get::<Option<String>, _>(0)?,
            None => None,
        })
    }

    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        let block_hash = match event {
            Event::Block(block) => Some(block.block_hash.clone()),
            _ => None,
        };

        query(
            "INSERT OR REPLACE INTO events
                (index_name, id, peer, channel, block_number, block_hash, document)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(self.index_names.index_for(event.kind()))
        .bind(event.document_id())
        .bind(self.peer.as_str())
        .bind(event.channel_id().as_str())
        .bind(to_column(event.block_number())?)
        .bind(block_hash)
        .bind(serde_json::to_string(&event.to_document()?)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::{
        decoder::TxType,
        events::{BlockEvent, IndexNames},
    };

    async fn setup_store(peer: &str) -> SqliteIndexStore {
        // A single connection, since every in-memory connection is its own database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create database pool in memory");

        SqliteIndexStore::from_pool(pool, peer.to_string(), IndexNames::default())
            .await
            .expect("Failed to create tables")
    }

    fn block_event(peer: &str, number: u64, hash: &str) -> Event {
        Event::Block(BlockEvent {
            block_number: number,
            channel_id: ChannelId::from("mychannel"),
            peer: peer.to_string(),
            organization: "org1".to_string(),
            block_hash: hash.to_string(),
            previous_hash: String::new(),
            data_hash: String::new(),
            created_at: None,
            block_type: TxType::EndorserTransaction,
            transactions: vec!["tx-1".to_string()],
        })
    }

    #[tokio::test]
    async fn test_checkpoint_roundtrip() {
        let store = setup_store("peer0").await;
        let channel = ChannelId::from("mychannel");

        assert_eq!(
            store
                .get_checkpoint(&channel)
                .await
                .expect("Failed to get checkpoint"),
            None
        );

        store
            .put_checkpoint(&channel, 4)
            .await
            .expect("Failed to put checkpoint");
        store
            .put_checkpoint(&channel, 5)
            .await
            .expect("Failed to overwrite checkpoint");

        assert_eq!(
            store
                .get_checkpoint(&channel)
                .await
                .expect("Failed to get checkpoint"),
            Some(5)
        );
    }

    #[tokio::test]
    async fn test_block_hash_lookup() {
        let store = setup_store("peer0").await;
        let channel = ChannelId::from("mychannel");

        store
            .put_event(&block_event("peer0", 2, "first"))
            .await
            .expect("Failed to put event");
        store
            .put_event(&block_event("peer0", 2, "second"))
            .await
            .expect("Failed to upsert event");

        assert_eq!(
            store
                .get_block_hash(&channel, 2)
                .await
                .expect("Failed to get block hash")
                .as_deref(),
            Some("second")
        );
        assert_eq!(
            store
                .get_block_hash(&channel, 3)
                .await
                .expect("Failed to get block hash"),
            None
        );

        let count: i64 = query("SELECT COUNT(*) FROM events")
            .fetch_one(&store.pool)
            .await
            .expect("Failed to count events")
            .get(0);
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_peers_are_isolated() {
        let store = setup_store("peer0").await;
        let other = SqliteIndexStore {
            pool: store.pool.clone(),
            peer: "peer1".to_string(),
            index_names: IndexNames::default(),
        };
        let channel = ChannelId::from("mychannel");

        store
            .put_checkpoint(&channel, 9)
            .await
            .expect("Failed to put checkpoint");
        store
            .put_event(&block_event("peer0", 9, "h9"))
            .await
            .expect("Failed to put event");

        assert_eq!(other.get_checkpoint(&channel).await.unwrap(), None);
        assert_eq!(other.get_block_hash(&channel, 9).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_block_number_out_of_range() {
        let store = setup_store("peer0").await;
        assert!(matches!(
            store
                .put_checkpoint(&ChannelId::from("mychannel"), u64::MAX)
                .await,
            Err(StoreError::BlockNumberOutOfRange(u64::MAX))
        ));
    }
}
