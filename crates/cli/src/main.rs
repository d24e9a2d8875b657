use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::WrapErr;

mod commands;
mod config;

use commands::{Family, KeysCommand};
use config::Config;

#[derive(Parser)]
#[command(version, about = "Read contactless transit cards from a PC/SC reader")]
struct Cli {
    /// Config file (defaults to ~/.tapread/tapread.toml)
    #[arg(short, long, env = "TAPREAD_CONFIG")]
    config: Option<PathBuf>,

    /// Reader to use, by name or part of it (overrides the config file)
    #[arg(short, long)]
    reader: Option<String>,

    /// Debug level output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers and the card each one holds
    List,

    /// Wait for a card, read it and print the raw card as JSON
    Scan {
        /// Read as this family instead of trusting the ATR (needed for CEPAS)
        #[arg(long = "as", value_enum)]
        family: Option<Family>,

        /// Seconds to wait for a card
        #[arg(long, default_value_t = 30)]
        wait: u64,

        /// Write the raw card to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Read only the first FeliCa system
        #[arg(long)]
        felica_only_first: bool,

        /// Do not save MIFARE Classic keys found during the read
        #[arg(long)]
        no_save_keys: bool,
    },

    /// Decode a raw card saved by `scan`
    Parse {
        /// Raw card JSON file
        file: PathBuf,
    },

    /// Manage MIFARE Classic keys
    #[command(subcommand)]
    Keys(KeysCommand),
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config_file = match cli.config {
        Some(path) => path,
        None => config::default_config_file()?,
    };
    let mut config = Config::load(&config_file)
        .wrap_err_with(|| format!("loading config from {}", config_file.display()))?;
    if cli.reader.is_some() {
        config.reader = cli.reader;
    }

    match cli.command {
        Commands::List => commands::list_readers(),
        Commands::Scan {
            family,
            wait,
            output,
            felica_only_first,
            no_save_keys,
        } => {
            let args = commands::ScanArgs {
                family,
                wait: std::time::Duration::from_secs(wait),
                output: output.or_else(|| config.output.clone()),
                felica_only_first: felica_only_first || config.felica_only_first,
                save_keys: !no_save_keys,
            };
            commands::scan(&config, args).await
        }
        Commands::Parse { file } => commands::parse_file(&file),
        Commands::Keys(command) => commands::keys(&config, command),
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, filter::LevelFilter};

    let level = if verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .init();
}
