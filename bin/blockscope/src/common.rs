use std::path::PathBuf;

use anyhow::Result;
use blockscope_core::config::{BlockscopeConfig, Period};
use clap::Parser;
use log::debug;
use url::Url;

/// Configuration file and the flags overriding its values.
#[derive(Debug, Parser)]
pub struct ConfigOptions {
    /// Path to the YAML configuration file
    #[clap(long, env = "BLOCKSCOPE_CONFIG")]
    config: Option<PathBuf>,
    /// Polling period, in seconds or with a `ms`/`s` suffix
    #[clap(long, env)]
    period: Option<String>,
    /// Organization of the monitored peer
    #[clap(long, env)]
    organization: Option<String>,
    /// Name of the monitored peer in the connection profile
    #[clap(long, env)]
    peer: Option<String>,
    /// Path to the connection profile
    #[clap(long, env)]
    connection_profile: Option<PathBuf>,
    /// Path to the admin certificate used to authenticate against the peer
    #[clap(long, env)]
    admin_cert_path: Option<PathBuf>,
    /// Path to the private key of the admin certificate
    #[clap(long, env)]
    admin_key_path: Option<PathBuf>,
    /// Index store URL
    #[clap(long, env)]
    elastic_url: Option<Url>,
    /// Dashboard API URL
    #[clap(long, env)]
    kibana_url: Option<Url>,
    /// Channels to monitor. Every channel of the peer is monitored when omitted
    #[clap(long = "channel", env = "CHANNELS", value_delimiter = ',')]
    channels: Vec<String>,
}

impl ConfigOptions {
    pub fn load(self) -> Result<BlockscopeConfig> {
        let mut config = match &self.config {
            Some(path) => {
                debug!("Loading configuration from {}", path.display());
                BlockscopeConfig::load(path)?
            }
            None => BlockscopeConfig::default(),
        };

        if let Some(period) = self.period {
            config.period = Period::Text(period);
            config.period()?;
        }
        if let Some(organization) = self.organization {
            config.organization = organization;
        }
        if let Some(peer) = self.peer {
            config.peer = peer;
        }
        if let Some(connection_profile) = self.connection_profile {
            config.connection_profile = connection_profile;
        }
        if let Some(admin_cert_path) = self.admin_cert_path {
            config.admin_cert_path = Some(admin_cert_path);
        }
        if let Some(admin_key_path) = self.admin_key_path {
            config.admin_key_path = Some(admin_key_path);
        }
        if let Some(elastic_url) = self.elastic_url {
            config.elastic_url = elastic_url;
        }
        if let Some(kibana_url) = self.kibana_url {
            config.kibana_url = kibana_url;
        }
        if !self.channels.is_empty() {
            config.channels = self.channels;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let options = ConfigOptions::parse_from([
            "blockscope",
            "--admin-cert-path",
            "crypto/admin/cert.pem",
            "--admin-key-path",
            "crypto/admin/key.pem",
            "--channel",
            "ch1,ch2",
        ]);
        let config = options.load().expect("Failed to load configuration");

        assert_eq!(
            config.admin_cert_path,
            Some(PathBuf::from("crypto/admin/cert.pem"))
        );
        assert_eq!(
            config.admin_key_path,
            Some(PathBuf::from("crypto/admin/key.pem"))
        );
        assert_eq!(config.channels, vec!["ch1", "ch2"]);
    }
}
