use std::time::Duration;

use anyhow::Result;
use log::trace;
use reqwest::{Client, ClientBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

use crate::{
    errors::StoreError,
    events::{Event, EventKind, IndexNames},
    ledger::ChannelId,
    storage::{checkpoint_index, IndexStore},
};

const ELASTIC_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// An [`IndexStore`] backed by an Elasticsearch-compatible document store.
#[derive(Debug, Clone)]
pub struct ElasticIndexStore {
    http_client: Client,
    base_url: Url,
    peer: String,
    index_names: IndexNames,
}

#[derive(Debug)]
pub struct ElasticIndexStoreBuilder {
    base_url: Url,
    peer: String,
    index_names: IndexNames,
    timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointDocument {
    #[serde(rename = "blockNumber")]
    block_number: u64,
}

#[derive(Debug, Deserialize)]
struct GetResponse<T> {
    #[serde(rename = "_source")]
    source: T,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: BlockHashSource,
}

#[derive(Debug, Deserialize)]
struct BlockHashSource {
    block_hash: String,
}

impl ElasticIndexStoreBuilder {
    pub fn new(base_url: Url, peer: String) -> Self {
        Self {
            base_url,
            peer,
            index_names: IndexNames::default(),
            timeout: ELASTIC_HTTP_TIMEOUT,
        }
    }

    pub fn index_names(mut self, index_names: IndexNames) -> Self {
        self.index_names = index_names;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<ElasticIndexStore> {
        if self.base_url.cannot_be_a_base() {
            anyhow::bail!(StoreError::InvalidBaseUrl(self.base_url.to_string()));
        }

        Ok(ElasticIndexStore {
            http_client: ClientBuilder::new().timeout(self.timeout).build()?,
            base_url: self.base_url,
            peer: self.peer,
            index_names: self.index_names,
        })
    }
}

impl ElasticIndexStore {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn checkpoint_url(&self, channel: &ChannelId) -> Result<Url, StoreError> {
        self.endpoint(&[&checkpoint_index(&self.peer, channel), "_doc", "1"])
    }

    fn block_hash_query(&self, channel: &ChannelId, block_number: u64) -> Value {
        json!({
            "size": 1,
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "block_number": block_number } },
                        { "term": { "peer.keyword": self.peer } },
                        { "term": { "channel_id.keyword": channel.as_str() } },
                    ]
                }
            }
        })
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(StoreError::Status {
        status: status.as_u16(),
        body,
    })
}

impl IndexStore for ElasticIndexStore {
    async fn get_checkpoint(&self, channel: &ChannelId) -> Result<Option<u64>, StoreError> {
        let url = self.checkpoint_url(channel)?;
        trace!("GET {}", url);

        let response = self.http_client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let document = response
            .json::<GetResponse<CheckpointDocument>>()
            .await?;
        Ok(Some(document.source.block_number))
    }

    async fn put_checkpoint(&self, channel: &ChannelId, block_number: u64) -> Result<(), StoreError> {
        let url = self.checkpoint_url(channel)?;
        trace!("POST {} blockNumber={}", url, block_number);

        let response = self
            .http_client
            .post(url)
            .json(&CheckpointDocument { block_number })
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn get_block_hash(
        &self,
        channel: &ChannelId,
        block_number: u64,
    ) -> Result<Option<String>, StoreError> {
        let index = self.index_names.index_for(EventKind::Block);
        let url = self.endpoint(&[&index, "_search"])?;
        trace!("POST {} block_number={}", url, block_number);

        let response = self
            .http_client
            .post(url)
            .json(&self.block_hash_query(channel, block_number))
            .send()
            .await?;
        // The block index does not exist until the first block event is published.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = ensure_success(response).await?;
        let search = response.json::<SearchResponse>().await?;
        Ok(search
            .hits
            .hits
            .into_iter()
            .next()
            .map(|hit| hit.source.block_hash))
    }

    async fn put_event(&self, event: &Event) -> Result<(), StoreError> {
        let index = self.index_names.index_for(event.kind());
        let mut url = self.endpoint(&[&index, "_doc", &event.document_id()])?;
        // Block documents must be searchable before the checkpoint pointing at them is written.
        if event.kind() == EventKind::Block {
            url.query_pairs_mut().append_pair("refresh", "wait_for");
        }
        trace!("PUT {}", url);

        let response = self
            .http_client
            .put(url)
            .json(&event.to_document()?)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
