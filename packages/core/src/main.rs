use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dotenvy::dotenv;

use booru_relay::cli::Cli;
use booru_relay::config::Config;
use booru_relay::error::AppError;
use booru_relay::logging::init_logging;
use booru_relay::notifier::DiscordNotifier;
use booru_relay::scheduler::{run_polling, Tracker};
use booru_relay::services::gelbooru::GelbooruClient;

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    let config = load_config(&cli).unwrap_or_else(|err| {
        tracing::error!("{}", err);
        process::exit(1);
    });

    tracing::info!(
        "Tracking {} search(es), state in {}",
        config.searches.len(),
        config.state_file.display()
    );
    tracing::debug!("Config: {:?}", config);

    let source = Arc::new(GelbooruClient::new(
        config.gelbooru_user_id.clone(),
        config.gelbooru_api_key.clone(),
    ));
    let notifier = Arc::new(DiscordNotifier::new(&config));
    let tracker = Arc::new(Tracker::new(&config, source, notifier));

    if cli.once {
        tracker.run_cycle().await;
        return;
    }

    run_polling(tracker, Duration::from_secs(config.poll_interval_seconds)).await;
}

/// File, then environment, then CLI flags; validated before use.
fn load_config(cli: &Cli) -> Result<Config, AppError> {
    let mut config = Config::load(&cli.config)?;

    if let Some(path) = &cli.state_file {
        config.state_file = path.clone();
    }
    if let Some(seconds) = cli.poll_interval {
        config.poll_interval_seconds = seconds;
    }

    config.validate()?;
    Ok(config)
}
