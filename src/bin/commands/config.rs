use anyhow::Result;
use clap::Args;
use refdex::lens::utils::OutputFormat;
use refdex::{format_size, get_sqlite_info, RefdexConfig, SqliteDatabaseInfo};
use serde::Serialize;

/// Arguments for the Config command
#[derive(Args)]
pub struct ConfigArgs {
    /// Also list the files in the data directory
    #[clap(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Serialize)]
struct ConfigInfo {
    config_file: String,
    data_dir: String,
    feeds: FeedInfo,
    refresh: RefreshSettings,
    database: SqliteDatabaseInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    files: Option<Vec<FileInfo>>,
}

#[derive(Debug, Serialize)]
struct FeedInfo {
    ipv4_routes: String,
    ipv6_routes: String,
    asn_details: String,
    mac_vendors: String,
}

#[derive(Debug, Serialize)]
struct RefreshSettings {
    route_refresh_at: String,
    vendor_refresh_at: String,
    fetch_timeout_secs: u64,
    insert_batch_size: usize,
    shutdown_grace_secs: u64,
    refresh_lease_secs: u64,
    initialise: bool,
}

#[derive(Debug, Serialize)]
struct FileInfo {
    name: String,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
}

pub fn run(config: &RefdexConfig, args: ConfigArgs, output_format: OutputFormat) -> Result<()> {
    let ConfigArgs { verbose } = args;

    let files = if verbose {
        let mut file_list = Vec::new();
        if let Ok(entries) = std::fs::read_dir(&config.data_dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        let modified = metadata.modified().ok().map(|t| {
                            let datetime: chrono::DateTime<chrono::Utc> = t.into();
                            datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
                        });
                        file_list.push(FileInfo {
                            name: entry.file_name().to_string_lossy().to_string(),
                            size_bytes: metadata.len(),
                            modified,
                        });
                    }
                }
            }
        }
        file_list.sort_by(|a, b| a.name.cmp(&b.name));
        Some(file_list)
    } else {
        None
    };

    let info = ConfigInfo {
        config_file: RefdexConfig::config_file_path(),
        data_dir: config.data_dir.clone(),
        feeds: FeedInfo {
            ipv4_routes: config.ipv4_routes_url.clone(),
            ipv6_routes: config.ipv6_routes_url.clone(),
            asn_details: config.asn_details_url.clone(),
            mac_vendors: config.oui_url.clone(),
        },
        refresh: RefreshSettings {
            route_refresh_at: config.route_refresh_at.to_string(),
            vendor_refresh_at: config.vendor_refresh_at.to_string(),
            fetch_timeout_secs: config.fetch_timeout_secs,
            insert_batch_size: config.insert_batch_size,
            shutdown_grace_secs: config.shutdown_grace_secs,
            refresh_lease_secs: config.refresh_lease_secs,
            initialise: config.initialise,
        },
        database: get_sqlite_info(config),
        files,
    };

    match output_format {
        OutputFormat::Json | OutputFormat::JsonLine => {
            println!("{}", serde_json::to_string(&info)?)
        }
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&info)?),
        _ => print_config_table(config, &info),
    }
    Ok(())
}

fn print_config_table(config: &RefdexConfig, info: &ConfigInfo) {
    println!("Refdex Configuration");
    println!("====================\n");

    println!("Config file:        {}", info.config_file);
    println!("{}", config.summary());
    println!();

    let db = &info.database;
    println!("SQLite Database:");
    println!(
        "  Status:           {}",
        if db.exists { "exists" } else { "not created" }
    );
    if let Some(size) = db.size_bytes {
        println!("  Size:             {}", format_size(size));
    }
    println!(
        "  Schema:           {}",
        if db.schema_initialized {
            "current"
        } else {
            "not initialized"
        }
    );
    if let Some(generation) = db.route_generation {
        println!("  Route generation: {}", generation);
    }
    if let Some(count) = db.ipv4_routes {
        println!("  IPv4 routes:      {}", count);
    }
    if let Some(count) = db.ipv6_routes {
        println!("  IPv6 routes:      {}", count);
    }
    if let Some(count) = db.vendor_count {
        println!("  MAC vendors:      {}", count);
    }

    if let Some(ref files) = info.files {
        println!();
        println!("Data Directory Files:");
        println!("  {:<40} {:>12}  {}", "Name", "Size", "Modified");
        println!("  {}", "-".repeat(80));
        for file in files {
            println!(
                "  {:<40} {:>12}  {}",
                file.name,
                format_size(file.size_bytes),
                file.modified.as_deref().unwrap_or("-")
            );
        }
    }

    eprintln!();
    eprintln!("Tips:");
    eprintln!("  Use --verbose (-v) to see all files in the data directory");
    eprintln!("  Use --format json for machine-readable output");
    eprintln!("  Edit ~/.refdex/refdex.toml to customize settings");
}
