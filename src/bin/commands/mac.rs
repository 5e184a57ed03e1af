use anyhow::Result;
use clap::Args;
use refdex::lens::mac::VendorLens;
use refdex::lens::utils::OutputFormat;
use refdex::RefdexConfig;
use std::sync::Arc;

use super::open_database;

/// Arguments for the Mac command
#[derive(Args)]
pub struct MacArgs {
    /// MAC address, OUI prefix or company name fragment
    #[clap(required = true)]
    pub query: Vec<String>,
}

pub fn run(config: &RefdexConfig, args: MacArgs, output_format: OutputFormat) -> Result<()> {
    let query = args.query.join(" ");

    let db = open_database(config)?;
    let lens = VendorLens::new(Arc::new(db.vendors()));

    match lens.lookup(&query) {
        Ok(vendors) => {
            println!("{}", VendorLens::format_results(&vendors, output_format));
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            if output_format.is_json() {
                println!("{}", VendorLens::format_results(&[], output_format));
            } else {
                eprintln!("No vendors found for '{}'", query);
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
