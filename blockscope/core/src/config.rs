//! Agent configuration loaded from YAML, and connection profile parsing.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    block_ingestor::IngestSettings,
    errors::ConfigError,
    events::IndexNames,
    ledger::ChannelId,
    linking::ChaincodeLinkingKey,
};

/// Polling period, either a number of seconds or a string such as `500ms` or `2s`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Period {
    Seconds(u64),
    Text(String),
}

impl Period {
    pub fn to_duration(&self) -> Result<Duration, ConfigError> {
        match self {
            Self::Seconds(seconds) => Ok(Duration::from_secs(*seconds)),
            Self::Text(text) => {
                let text = text.trim();
                let invalid = || ConfigError::InvalidPeriod(text.to_string());
                let (value, unit) = match text.strip_suffix("ms") {
                    Some(value) => (value, Duration::from_millis(1)),
                    None => match text.strip_suffix('s') {
                        Some(value) => (value, Duration::from_secs(1)),
                        None => (text, Duration::from_secs(1)),
                    },
                };
                let count = value.trim().parse::<u32>().map_err(|_| invalid())?;
                Ok(unit * count)
            }
        }
    }
}

impl Default for Period {
    fn default() -> Self {
        Self::Text("1s".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockscopeConfig {
    pub period: Period,
    pub organization: String,
    pub peer: String,
    pub connection_profile: PathBuf,
    pub admin_cert_path: Option<PathBuf>,
    pub admin_key_path: Option<PathBuf>,
    #[serde(rename = "elasticURL", alias = "elasticUrl")]
    pub elastic_url: Url,
    #[serde(rename = "kibanaURL", alias = "kibanaUrl")]
    pub kibana_url: Url,
    pub block_index_name: String,
    pub transaction_index_name: String,
    pub key_index_name: String,
    pub dashboard_directory: PathBuf,
    pub template_directory: PathBuf,
    pub chaincodes: Vec<ChaincodeLinkingKey>,
    /// Channels to monitor. Every channel joined by the peer is monitored when empty.
    pub channels: Vec<String>,
}

impl Default for BlockscopeConfig {
    fn default() -> Self {
        let index_names = IndexNames::default();
        Self {
            period: Period::default(),
            organization: "org1".to_string(),
            peer: "peer0.org1.el-network.com".to_string(),
            connection_profile: PathBuf::from("connection.yaml"),
            admin_cert_path: None,
            admin_key_path: None,
            elastic_url: default_url("http://localhost:9200"),
            kibana_url: default_url("http://localhost:5601"),
            block_index_name: index_names.block,
            transaction_index_name: index_names.transaction,
            key_index_name: index_names.key,
            dashboard_directory: PathBuf::from("dashboards"),
            template_directory: PathBuf::from("kibana_templates"),
            chaincodes: Vec::new(),
            channels: Vec::new(),
        }
    }
}

// Only called with literals above.
fn default_url(url: &str) -> Url {
    Url::parse(url).unwrap_or_else(|_| unreachable!("invalid default url `{}`", url))
}

impl BlockscopeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.period.to_duration()?;
        Ok(config)
    }

    pub fn period(&self) -> Result<Duration, ConfigError> {
        self.period.to_duration()
    }

    pub fn index_names(&self) -> IndexNames {
        IndexNames {
            block: self.block_index_name.clone(),
            transaction: self.transaction_index_name.clone(),
            key: self.key_index_name.clone(),
        }
    }

    pub fn ingest_settings(&self) -> IngestSettings {
        IngestSettings {
            peer: self.peer.clone(),
            organization: self.organization.clone(),
            chaincodes: self.chaincodes.clone(),
        }
    }

    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(ChannelId::new).collect()
    }

    /// Looks up the configured peer in the connection profile.
    pub fn peer_endpoint(&self) -> Result<PeerEndpoint, ConfigError> {
        ConnectionProfile::load(&self.connection_profile)?.peer_endpoint(&self.peer)
    }
}

/// The subset of a connection profile needed to reach a peer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionProfile {
    #[serde(default)]
    peers: HashMap<String, PeerEntry>,
    /// Directory relative certificate paths are resolved against.
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PeerEntry {
    url: String,
    /// HTTP gateway in front of the peer, when it differs from the peer url.
    gateway_url: Option<String>,
    #[serde(rename = "tlsCACerts")]
    tls_ca_certs: Option<TlsCaCerts>,
}

#[derive(Debug, Clone, Deserialize)]
struct TlsCaCerts {
    path: Option<PathBuf>,
    pem: Option<String>,
}

/// Where the ledger gateway of a peer is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    pub url: Url,
    pub tls_ca_pem: Option<Vec<u8>>,
}

impl ConnectionProfile {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut profile = Self::from_yaml(&contents)?;
        profile.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(profile)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn peer_endpoint(&self, peer: &str) -> Result<PeerEndpoint, ConfigError> {
        let entry = self
            .peers
            .get(peer)
            .ok_or_else(|| ConfigError::UnknownPeer(peer.to_string()))?;

        let url = match &entry.gateway_url {
            Some(gateway_url) => Url::parse(gateway_url)?,
            None => Url::parse(&http_scheme(&entry.url))?,
        };

        let tls_ca_pem = match &entry.tls_ca_certs {
            Some(TlsCaCerts { pem: Some(pem), .. }) => Some(pem.clone().into_bytes()),
            Some(TlsCaCerts {
                path: Some(path), ..
            }) => {
                let path = self.base_dir.join(path);
                Some(std::fs::read(&path).map_err(|source| ConfigError::Io { path, source })?)
            }
            _ => None,
        };

        Ok(PeerEndpoint { url, tls_ca_pem })
    }
}

/// Maps gRPC peer urls to the matching HTTP scheme.
fn http_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("grpcs://") {
        format!("https://{}", rest)
    } else if let Some(rest) = url.strip_prefix("grpc://") {
        format!("http://{}", rest)
    } else {
        url.to_string()
    }
}
