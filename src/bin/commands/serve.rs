use anyhow::{anyhow, Result};
use clap::Args;
use refdex::refresh::RefreshScheduler;
use refdex::RefdexConfig;
use std::sync::Arc;
use tracing::{info, warn};

use super::{build_refreshers, open_database};

/// Arguments for the Serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Refresh every dataset once at startup (overrides `initialise` in the config)
    #[clap(long)]
    pub initialise: bool,
}

pub fn run(config: &RefdexConfig, args: ServeArgs) -> Result<()> {
    let db = open_database(config)?;
    let (routes, vendors) = build_refreshers(config, &db);
    let eager = args.initialise || config.initialise;

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| anyhow!("Failed to start async runtime: {}", e))?;

    runtime.block_on(async {
        let handle = RefreshScheduler::new()
            .with_routes(Arc::new(routes), config.route_refresh_at)
            .with_vendors(Arc::new(vendors), config.vendor_refresh_at)
            .with_eager_refresh(eager)
            .start();

        info!(
            "Serving {} from {}, press Ctrl-C to stop",
            db.path().display(),
            config.data_dir
        );

        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for shutdown signal: {}", e);
        }

        if !handle.shutdown(config.shutdown_grace()).await {
            warn!("Some refresh jobs did not finish before shutdown");
        }
    });

    Ok(())
}
