use anyhow::{anyhow, Result};
use clap::Args;
use refdex::datasets::IpFamily;
use refdex::lens::utils::OutputFormat;
use refdex::{DataSource, RefdexConfig};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{build_refreshers, open_database};

/// Arguments for the Refresh command
#[derive(Args)]
pub struct RefreshArgs {
    /// Dataset to refresh: routes or vendors (default: both)
    #[clap()]
    pub dataset: Option<DataSource>,

    /// Only reload these route families (ipv4, ipv6); others are carried forward
    #[clap(long, value_delimiter = ',')]
    pub family: Vec<IpFamily>,
}

#[derive(Debug, Serialize)]
struct RefreshReport {
    dataset: String,
    summary: String,
}

pub fn run(config: &RefdexConfig, args: RefreshArgs, output_format: OutputFormat) -> Result<()> {
    let RefreshArgs { dataset, family } = args;

    let db = open_database(config)?;
    let (routes, vendors) = build_refreshers(config, &db);
    let cancel = CancellationToken::new();
    let mut reports = Vec::new();

    let datasets = match dataset {
        Some(d) => vec![d],
        None => DataSource::all(),
    };

    for dataset in datasets {
        let summary = match dataset {
            DataSource::Routes => routes
                .refresh(&family, &cancel)
                .map(|s| s.to_string())
                .map_err(|e| anyhow!("Route refresh failed: {}", e))?,
            DataSource::Vendors => vendors
                .refresh(&cancel)
                .map(|s| s.to_string())
                .map_err(|e| anyhow!("Vendor refresh failed: {}", e))?,
        };
        reports.push(RefreshReport {
            dataset: dataset.to_string(),
            summary,
        });
    }

    if output_format.is_json() {
        let json = match output_format {
            OutputFormat::JsonPretty => serde_json::to_string_pretty(&reports)?,
            _ => serde_json::to_string(&reports)?,
        };
        println!("{}", json);
    } else {
        for report in reports {
            println!("{}: {}", report.dataset, report.summary);
        }
    }

    Ok(())
}
