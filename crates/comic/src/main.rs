//! Comic: local comic cache front end
//!
//! Main binary with subcommands:
//! - `info`: Show a comic's metadata, fetching it if needed
//! - `newest`: Show the newest comic
//! - `download`: Download a comic's image into the cache
//! - `path`: Print where a comic's image is stored
//! - `stat`: Count cached metadata and images
//! - `backfill`: Fetch everything not cached yet

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "comic")]
#[command(about = "Browse comics through a local cache", long_about = None)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Commands,
}

/// Cache and network settings shared by every subcommand.
#[derive(Args, Debug)]
struct Settings {
    /// Cache directory (defaults to the platform cache dir)
    #[arg(long, global = true, env = "COMIC_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Comic service base URL
    #[arg(long, global = true, env = "COMIC_SERVICE_URL", default_value = comic_client::DEFAULT_SERVICE_URL)]
    service_url: String,

    /// Request timeout in seconds
    #[arg(long, global = true, env = "COMIC_REQUEST_TIMEOUT", default_value = "30")]
    request_timeout: u64,

    /// Retries after a server error
    #[arg(long, global = true, env = "COMIC_MAX_RETRIES", default_value = "2")]
    max_retries: u32,

    /// Comic numbers that never existed (repeatable)
    #[arg(long = "missing", global = true, env = "COMIC_MISSING", value_delimiter = ',', default_value = "404")]
    missing_comics: Vec<i64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a comic's metadata
    Info {
        /// Comic number
        number: i64,
    },

    /// Show the newest comic
    Newest {
        /// Ignore the newest comic known this session and ask the service again
        #[arg(long)]
        refresh: bool,
    },

    /// Download a comic's image into the cache
    Download {
        /// Comic number
        number: i64,
    },

    /// Print where a comic's image is stored
    Path {
        /// Comic number
        number: i64,
    },

    /// Count cached metadata and images
    Stat,

    /// Fetch every comic not cached yet (Ctrl-C to stop)
    Backfill {
        /// Download images instead of metadata
        #[arg(long)]
        images: bool,

        /// Log progress every N comics
        #[arg(long, env = "COMIC_BACKFILL_PROGRESS_EVERY", default_value = "25")]
        progress_every: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "comic=info,comic_cache=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    commands::run(cli.settings, cli.command).await
}
