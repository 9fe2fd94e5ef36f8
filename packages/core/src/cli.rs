use std::path::PathBuf;

use clap::Parser;

/// Booru relay CLI arguments
#[derive(Debug, Parser)]
#[command(
    name = "booru-relay",
    version,
    about = "Relays new Gelbooru posts to a Discord webhook"
)]
pub struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "config.json")]
    pub config: PathBuf,

    /// Where the already-sent post IDs are persisted
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Polling interval in seconds
    #[arg(long)]
    pub poll_interval: Option<u64>,

    /// Run a single check cycle and exit
    #[arg(long)]
    pub once: bool,
}
