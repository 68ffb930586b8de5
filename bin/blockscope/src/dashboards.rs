use anyhow::Result;
use blockscope_core::dashboard::DashboardProvisionerBuilder;
use clap::Parser;
use log::info;

use crate::common::ConfigOptions;

#[derive(Debug, Parser)]
pub struct Dashboards {
    #[clap(flatten)]
    config: ConfigOptions,
}

impl Dashboards {
    pub async fn run(self) -> Result<()> {
        let config = self.config.load()?;

        let provisioner = DashboardProvisionerBuilder::new(
            config.kibana_url.clone(),
            config.peer.clone(),
            config.organization.clone(),
        )
        .template_dir(config.template_directory.clone())
        .dashboard_dir(config.dashboard_directory.clone())
        .index_names(config.index_names())
        .chaincodes(config.chaincodes.clone())
        .build()?;

        let report = provisioner.provision().await?;
        info!(
            "Created {} index patterns and {} dashboards",
            report.index_patterns.len(),
            report.dashboards.len()
        );
        for dashboard in report.dashboards {
            info!("Dashboard written to {}", dashboard.display());
        }

        Ok(())
    }
}
