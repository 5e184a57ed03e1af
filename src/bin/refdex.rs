use clap::{Parser, Subcommand};
use refdex::lens::utils::OutputFormat;
use refdex::RefdexConfig;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::bgp::BgpArgs;
use commands::config::ConfigArgs;
use commands::mac::MacArgs;
use commands::refresh::RefreshArgs;
use commands::serve::ServeArgs;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.refdex/refdex.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    /// Output format: table (default), markdown, json, json-pretty, json-line, psv
    #[clap(short = 'f', long, global = true, default_value = "table")]
    format: OutputFormat,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily refresh scheduler until interrupted
    Serve(ServeArgs),

    /// Refresh datasets once and exit
    Refresh(RefreshArgs),

    /// Look up routes by ASN, IP address or owner name
    Bgp(BgpArgs),

    /// Look up MAC vendors by address, OUI or company name
    Mac(MacArgs),

    /// Show dataset status
    Status,

    /// Show configuration and database information
    Config(ConfigArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match RefdexConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    };

    let level = if cli.debug || config.debug {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("refdex={}", level))),
        )
        .with_writer(std::io::stderr)
        .init();

    let output_format = cli.format;
    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(&config, args),
        Commands::Refresh(args) => commands::refresh::run(&config, args, output_format),
        Commands::Bgp(args) => commands::bgp::run(&config, args, output_format),
        Commands::Mac(args) => commands::mac::run(&config, args, output_format),
        Commands::Status => commands::status::run(&config, output_format),
        Commands::Config(args) => commands::config::run(&config, args, output_format),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {e}");
        std::process::exit(1);
    }
}
