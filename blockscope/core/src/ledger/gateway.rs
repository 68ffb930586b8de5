use std::time::Duration;

use anyhow::Result;
use log::trace;
use reqwest::{Certificate, Client, ClientBuilder, Identity, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use crate::{
    errors::LedgerError,
    ledger::{ChannelId, LedgerClient, RawBlock},
};

const GATEWAY_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`LedgerClient`] talking to an HTTP ledger gateway that fronts a peer.
///
/// The gateway serves:
///
/// - `GET /channels` as `{"channels": [..]}`
/// - `GET /channels/{channel}/height` as `{"height": n}`
/// - `GET /channels/{channel}/blocks/{number}` as the serialized block
///
/// Requests authenticate with the admin certificate and key as a TLS client identity.
#[derive(Debug, Clone)]
pub struct GatewayLedgerClient {
    http_client: Client,
    base_url: Url,
}

#[derive(Debug)]
pub struct GatewayLedgerClientBuilder {
    base_url: Url,
    tls_ca_pem: Option<Vec<u8>>,
    identity_pem: Option<Vec<u8>>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    channels: Vec<ChannelId>,
}

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

impl GatewayLedgerClientBuilder {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            tls_ca_pem: None,
            identity_pem: None,
            timeout: GATEWAY_HTTP_TIMEOUT,
        }
    }

    /// Trusts the peer's TLS CA in addition to the system roots.
    pub fn tls_ca_pem(mut self, pem: Vec<u8>) -> Self {
        self.tls_ca_pem = Some(pem);
        self
    }

    /// Authenticates with the given PEM certificate and PEM private key.
    pub fn identity(mut self, cert_pem: &[u8], key_pem: &[u8]) -> Self {
        let mut identity = Vec::with_capacity(cert_pem.len() + key_pem.len() + 1);
        identity.extend_from_slice(cert_pem);
        if !cert_pem.ends_with(b"\n") {
            identity.push(b'\n');
        }
        identity.extend_from_slice(key_pem);
        self.identity_pem = Some(identity);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<GatewayLedgerClient> {
        if self.base_url.cannot_be_a_base() {
            anyhow::bail!(LedgerError::InvalidBaseUrl(self.base_url.to_string()));
        }

        let mut builder = ClientBuilder::new().timeout(self.timeout);
        if let Some(pem) = self.tls_ca_pem {
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }
        if let Some(pem) = self.identity_pem {
            builder = builder.identity(Identity::from_pem(&pem)?);
        }

        Ok(GatewayLedgerClient {
            http_client: builder.build()?,
            base_url: self.base_url,
        })
    }
}

impl GatewayLedgerClient {
    fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::InvalidBaseUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<Response, LedgerError> {
        trace!("GET {}", url);
        Ok(self.http_client.get(url).send().await?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(LedgerError::Status {
        status: status.as_u16(),
        body,
    })
}

impl LedgerClient for GatewayLedgerClient {
    async fn list_channels(&self) -> Result<Vec<ChannelId>, LedgerError> {
        let response = ensure_success(self.get(self.endpoint(&["channels"])?).await?).await?;
        Ok(response.json::<ChannelsResponse>().await?.channels)
    }

    async fn tip_height(&self, channel: &ChannelId) -> Result<u64, LedgerError> {
        let url = self.endpoint(&["channels", channel.as_str(), "height"])?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::UnknownChannel(channel.clone()));
        }

        let response = ensure_success(response).await?;
        Ok(response.json::<HeightResponse>().await?.height)
    }

    async fn get_block(&self, channel: &ChannelId, number: u64) -> Result<RawBlock, LedgerError> {
        let number_segment = number.to_string();
        let url = self.endpoint(&["channels", channel.as_str(), "blocks", &number_segment])?;
        let response = self.get(url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(LedgerError::BlockNotFound {
                channel: channel.clone(),
                number,
            });
        }

        let response = ensure_success(response).await?;
        Ok(RawBlock::new(response.bytes().await?.to_vec()))
    }
}
