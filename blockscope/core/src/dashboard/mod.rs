//! Index pattern and dashboard provisioning from JSON templates.
//!
//! Templates are plain JSON files carrying upper-case placeholders such as
//! `BLOCK_DASHBOARD_TEMPLATE_ID`. Placeholders are replaced with ids and titles scoped to the
//! configured peer and organization, so that several agents can share one dashboarding instance.

use std::{path::PathBuf, time::Duration};

use anyhow::Result;
use log::info;
use reqwest::{header::CONTENT_TYPE, Client, ClientBuilder, StatusCode};
use url::Url;

use crate::{
    errors::DashboardError,
    events::{EventKind, IndexNames},
    linking::ChaincodeLinkingKey,
};

const DASHBOARD_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Event indices an index pattern is created for.
pub const INDEX_PATTERN_TEMPLATES: [EventKind; 3] =
    [EventKind::Block, EventKind::Transaction, EventKind::Write];

/// Dashboards rendered from `{name}-dashboard-TEMPLATE.json`.
pub const DASHBOARD_NAMES: [&str; 4] = ["overview", "block", "key", "transaction"];

pub const VISUALIZATION_NAMES: [&str; 4] = [
    "block_count",
    "transaction_count",
    "transaction_per_organization",
    "transaction_count_timeline",
];

const VALUE_PLACEHOLDER: &str = r#""VALUE_TEMPLATE","#;

/// Replaces every placeholder of `substitutions` in `template`.
///
/// Longer placeholders are substituted first, so a placeholder that contains another one is never
/// partially replaced.
pub fn render_template(template: &str, substitutions: &[(String, String)]) -> String {
    let mut ordered = substitutions.iter().collect::<Vec<_>>();
    ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    ordered
        .into_iter()
        .filter(|(placeholder, _)| !placeholder.is_empty())
        .fold(template.to_string(), |rendered, (placeholder, value)| {
            rendered.replace(placeholder.as_str(), value)
        })
}

/// Upper-cases the first letter, leaving the rest untouched.
fn title(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Creates the index patterns through the dashboarding API and writes dashboards to disk.
#[derive(Debug, Clone)]
pub struct DashboardProvisioner {
    http_client: Client,
    dashboard_url: Url,
    template_dir: PathBuf,
    dashboard_dir: PathBuf,
    peer: String,
    organization: String,
    index_names: IndexNames,
    chaincodes: Vec<ChaincodeLinkingKey>,
}

#[derive(Debug)]
pub struct DashboardProvisionerBuilder {
    dashboard_url: Url,
    template_dir: PathBuf,
    dashboard_dir: PathBuf,
    peer: String,
    organization: String,
    index_names: IndexNames,
    chaincodes: Vec<ChaincodeLinkingKey>,
}

/// Outcome of a provisioning run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Ids of the index patterns created or already present.
    pub index_patterns: Vec<String>,
    pub dashboards: Vec<PathBuf>,
}

impl DashboardProvisionerBuilder {
    pub fn new(dashboard_url: Url, peer: String, organization: String) -> Self {
        Self {
            dashboard_url,
            template_dir: PathBuf::from("kibana_templates"),
            dashboard_dir: PathBuf::from("dashboards"),
            peer,
            organization,
            index_names: IndexNames::default(),
            chaincodes: Vec::new(),
        }
    }

    pub fn template_dir(mut self, template_dir: PathBuf) -> Self {
        self.template_dir = template_dir;
        self
    }

    pub fn dashboard_dir(mut self, dashboard_dir: PathBuf) -> Self {
        self.dashboard_dir = dashboard_dir;
        self
    }

    pub fn index_names(mut self, index_names: IndexNames) -> Self {
        self.index_names = index_names;
        self
    }

    /// Chaincode value fields listed in key searches.
    pub fn chaincodes(mut self, chaincodes: Vec<ChaincodeLinkingKey>) -> Self {
        self.chaincodes = chaincodes;
        self
    }

    pub fn build(self) -> Result<DashboardProvisioner> {
        if self.dashboard_url.cannot_be_a_base() {
            anyhow::bail!(DashboardError::InvalidBaseUrl(
                self.dashboard_url.to_string()
            ));
        }

        Ok(DashboardProvisioner {
            http_client: ClientBuilder::new()
                .timeout(DASHBOARD_HTTP_TIMEOUT)
                .build()?,
            dashboard_url: self.dashboard_url,
            template_dir: self.template_dir,
            dashboard_dir: self.dashboard_dir,
            peer: self.peer,
            organization: self.organization,
            index_names: self.index_names,
            chaincodes: self.chaincodes,
        })
    }
}

impl DashboardProvisioner {
    pub async fn provision(&self) -> Result<ProvisionReport, DashboardError> {
        let mut report = ProvisionReport::default();
        for kind in INDEX_PATTERN_TEMPLATES {
            report.index_patterns.push(self.create_index_pattern(kind).await?);
        }
        for name in DASHBOARD_NAMES {
            report.dashboards.push(self.write_dashboard(name).await?);
        }
        Ok(report)
    }

    pub fn index_pattern_id(&self, kind: EventKind) -> String {
        format!("fabricbeat-{}-{}", kind.as_str(), self.peer)
    }

    fn scoped_id(&self, name: &str, object: &str) -> String {
        format!("{}-{}-{}-{}", name, object, self.peer, self.organization)
    }

    fn scoped_title(&self, name: &str, object: &str) -> String {
        format!("{} {} {} ({})", title(name), object, self.peer, self.organization)
    }

    /// Substitutions applied to the index pattern template of `kind`.
    pub fn index_pattern_substitutions(&self, kind: EventKind) -> Vec<(String, String)> {
        let mut substitutions = DASHBOARD_NAMES
            .iter()
            .flat_map(|name| {
                let upper = name.to_uppercase();
                [
                    (
                        format!("{}_DASHBOARD_TEMPLATE_ID", upper),
                        self.scoped_id(name, "dashboard"),
                    ),
                    (
                        format!("{}_SEARCH_TEMPLATE_ID", upper),
                        self.scoped_id(name, "search"),
                    ),
                    (
                        format!("{}_VISUALIZATION_TEMPLATE_ID", upper),
                        self.scoped_id(name, "visualization"),
                    ),
                ]
            })
            .collect::<Vec<_>>();

        substitutions.push((
            "INDEX_PATTERN_TEMPLATE_TITLE".to_string(),
            self.index_names.index_for(kind),
        ));
        substitutions
    }

    /// Substitutions applied to every dashboard template.
    pub fn dashboard_substitutions(&self) -> Vec<(String, String)> {
        let mut substitutions = Vec::new();

        for kind in INDEX_PATTERN_TEMPLATES {
            let name = kind.as_str();
            let upper = name.to_uppercase();
            substitutions.push((format!("{}_PATTERN", upper), self.index_pattern_id(kind)));
            substitutions.push((
                format!("{}_SEARCH_TEMPLATE_ID", upper),
                self.scoped_id(name, "search"),
            ));
            substitutions.push((
                format!("{}_SEARCH_TEMPLATE_TITLE", upper),
                self.scoped_title(name, "Search"),
            ));
        }

        for name in VISUALIZATION_NAMES {
            let upper = name.to_uppercase();
            substitutions.push((
                format!("{}_VISUALIZATION_TEMPLATE_ID", upper),
                self.scoped_id(name, "visualization"),
            ));
            substitutions.push((
                format!("{}_VISUALIZATION_TEMPLATE_TITLE", upper),
                self.scoped_title(name, "Visualization"),
            ));
        }

        for name in DASHBOARD_NAMES {
            let upper = name.to_uppercase();
            substitutions.push((
                format!("{}_DASHBOARD_TEMPLATE_ID", upper),
                self.scoped_id(name, "dashboard"),
            ));
            substitutions.push((
                format!("{}_DASHBOARD_TEMPLATE_TITLE", upper),
                self.scoped_title(name, "Dashboard"),
            ));
        }

        let values = self
            .chaincodes
            .iter()
            .flat_map(|chaincode| chaincode.values.iter())
            .map(|value| format!(r#" "value.{}","#, value))
            .collect::<String>();
        substitutions.push((VALUE_PLACEHOLDER.to_string(), values));

        substitutions
    }

    async fn read_template(&self, file_name: String) -> Result<String, DashboardError> {
        let path = self.template_dir.join(file_name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| DashboardError::Io { path, source })
    }

    async fn create_index_pattern(&self, kind: EventKind) -> Result<String, DashboardError> {
        let name = kind.as_str();
        info!("Creating {} index pattern for connected peer", name);

        let template = self
            .read_template(format!("{}-index-pattern-TEMPLATE.json", name))
            .await?;
        let body = render_template(&template, &self.index_pattern_substitutions(kind));

        let pattern_id = self.index_pattern_id(kind);
        let mut url = self.dashboard_url.clone();
        url.path_segments_mut()
            .map_err(|_| DashboardError::InvalidBaseUrl(self.dashboard_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "saved_objects", "index-pattern", &pattern_id]);

        let response = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header("kbn-xsrf", "true")
            .body(body)
            .send()
            .await?;

        // A conflict means the index pattern was created by an earlier run.
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CONFLICT {
            return Err(DashboardError::IndexPattern {
                name: name.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        info!("{} index pattern created", name);
        Ok(pattern_id)
    }

    async fn write_dashboard(&self, name: &str) -> Result<PathBuf, DashboardError> {
        info!("Creating {} dashboard from template", name);

        let template = self
            .read_template(format!("{}-dashboard-TEMPLATE.json", name))
            .await?;
        let dashboard = render_template(&template, &self.dashboard_substitutions());

        tokio::fs::create_dir_all(&self.dashboard_dir)
            .await
            .map_err(|source| DashboardError::Io {
                path: self.dashboard_dir.clone(),
                source,
            })?;

        let path = self.dashboard_dir.join(format!(
            "{}-{}-{}.json",
            name, self.peer, self.organization
        ));
        tokio::fs::write(&path, dashboard)
            .await
            .map_err(|source| DashboardError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::*;

    fn provisioner(template_dir: PathBuf, dashboard_dir: PathBuf) -> DashboardProvisioner {
        DashboardProvisionerBuilder::new(
            Url::parse("http://localhost:5601").unwrap(),
            "peer0.org1.el-network.com".to_string(),
            "org1".to_string(),
        )
        .template_dir(template_dir)
        .dashboard_dir(dashboard_dir)
        .chaincodes(vec![ChaincodeLinkingKey {
            name: "mycc".to_string(),
            linking_key: "linking_key".to_string(),
            values: vec!["myvalue".to_string(), "other".to_string()],
        }])
        .build()
        .expect("Failed to build provisioner")
    }

    fn scratch_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "blockscope-{}-{}-{}",
            label,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_render_template_longest_first() {
        let substitutions = vec![
            ("ID".to_string(), "short".to_string()),
            ("BLOCK_ID".to_string(), "long".to_string()),
        ];
        assert_eq!(
            render_template(r#"{"a":"BLOCK_ID","b":"ID"}"#, &substitutions),
            r#"{"a":"long","b":"short"}"#
        );
    }

    #[test]
    fn test_render_template_without_placeholders() {
        assert_eq!(render_template("{}", &[]), "{}");
    }

    #[test]
    fn test_dashboard_substitutions() {
        let provisioner = provisioner(PathBuf::new(), PathBuf::new());
        let rendered = render_template(
            r#"["BLOCK_DASHBOARD_TEMPLATE_ID","BLOCK_DASHBOARD_TEMPLATE_TITLE","KEY_PATTERN","BLOCK_COUNT_VISUALIZATION_TEMPLATE_TITLE",["VALUE_TEMPLATE", "id"]]"#,
            &provisioner.dashboard_substitutions(),
        );

        assert_eq!(
            rendered,
            r#"["block-dashboard-peer0.org1.el-network.com-org1","Block Dashboard peer0.org1.el-network.com (org1)","fabricbeat-key-peer0.org1.el-network.com","Block_count Visualization peer0.org1.el-network.com (org1)",[ "value.myvalue", "value.other", "id"]]"#
        );
    }

    #[test]
    fn test_index_pattern_substitutions() {
        let provisioner = provisioner(PathBuf::new(), PathBuf::new());
        let rendered = render_template(
            r##"{"title":"INDEX_PATTERN_TEMPLATE_TITLE","url":"#/dashboard/OVERVIEW_DASHBOARD_TEMPLATE_ID"}"##,
            &provisioner.index_pattern_substitutions(EventKind::Transaction),
        );
        assert_eq!(
            rendered,
            r##"{"title":"transaction","url":"#/dashboard/overview-dashboard-peer0.org1.el-network.com-org1"}"##
        );
        assert_eq!(
            provisioner.index_pattern_id(EventKind::Write),
            "fabricbeat-key-peer0.org1.el-network.com"
        );
    }

    #[tokio::test]
    async fn test_write_dashboard() {
        let template_dir = scratch_dir("templates");
        let dashboard_dir = scratch_dir("dashboards");
        tokio::fs::create_dir_all(&template_dir).await.unwrap();
        tokio::fs::write(
            template_dir.join("key-dashboard-TEMPLATE.json"),
            r#"{"id":"KEY_DASHBOARD_TEMPLATE_ID","search":"KEY_SEARCH_TEMPLATE_TITLE"}"#,
        )
        .await
        .unwrap();

        let provisioner = provisioner(template_dir.clone(), dashboard_dir.clone());
        let path = provisioner
            .write_dashboard("key")
            .await
            .expect("Failed to write dashboard");

        assert_eq!(
            path,
            dashboard_dir.join("key-peer0.org1.el-network.com-org1.json")
        );
        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            r#"{"id":"key-dashboard-peer0.org1.el-network.com-org1","search":"Key Search peer0.org1.el-network.com (org1)"}"#
        );

        let missing = provisioner.write_dashboard("overview").await;
        assert!(matches!(missing, Err(DashboardError::Io { .. })));

        let _ = tokio::fs::remove_dir_all(&template_dir).await;
        let _ = tokio::fs::remove_dir_all(&dashboard_dir).await;
    }
}
