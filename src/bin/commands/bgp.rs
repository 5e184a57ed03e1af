use anyhow::Result;
use clap::Args;
use refdex::lens::bgp::RouteLens;
use refdex::lens::utils::OutputFormat;
use refdex::RefdexConfig;
use std::sync::Arc;

use super::open_database;

/// Arguments for the Bgp command
#[derive(Args)]
pub struct BgpArgs {
    /// ASN (13335 or AS13335), IPv4/IPv6 address, or owner name fragment
    #[clap(required = true)]
    pub query: Vec<String>,
}

pub fn run(config: &RefdexConfig, args: BgpArgs, output_format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");

    let db = open_database(config)?;
    let lens = RouteLens::new(Arc::new(db.routes()));

    let routes = lens.lookup(&query)?;
    if routes.is_empty() && !output_format.is_json() {
        eprintln!("No routes found for '{}'", query);
        return Ok(());
    }

    println!("{}", RouteLens::format_results(&routes, output_format));
    Ok(())
}
