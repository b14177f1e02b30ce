//! fxchat: currency-conversion chat bot
//!
//! # Usage
//!
//! ```bash
//! # Console session, requests typed on stdin
//! export FXCHAT_JID="fxchat@example.org"
//! cargo run --bin fxchat -- --debug
//!
//! # With a configuration file
//! cargo run --bin fxchat -- --config fxchat.json
//! ```
//!
//! SIGINT and SIGTERM shut down gracefully; SIGHUP re-initializes the
//! session.

use clap::Parser;
use fxchat_bot::platforms::ConsoleTransport;
use fxchat_bot::{BotConfig, ExchangeRateClient, FxBot};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fxchat", version)]
#[command(about = "Currency-conversion chat bot", long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    debug: bool,
}

/// What the signal loop should do next
enum Signal {
    Shutdown,
    Reinitialize,
}

#[cfg(unix)]
async fn next_signal() -> anyhow::Result<Signal> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    Ok(tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            Signal::Shutdown
        }
        _ = terminate.recv() => Signal::Shutdown,
        _ = hangup.recv() => Signal::Reinitialize,
    })
}

#[cfg(not(unix))]
async fn next_signal() -> anyhow::Result<Signal> {
    tokio::signal::ctrl_c().await?;
    Ok(Signal::Shutdown)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BotConfig::from_file(path)?,
        None => BotConfig::default(),
    }
    .with_env_overrides();
    config.debug |= args.debug;
    config.validate()?;

    fxchat_utils::init_tracing(config.debug);
    info!("Configuration: {:?}", config);

    let source = Arc::new(ExchangeRateClient::from_config(&config)?);
    let transport = Arc::new(ConsoleTransport::new());
    let bot = FxBot::start(config, transport, source);

    loop {
        match next_signal().await? {
            Signal::Shutdown => break,
            Signal::Reinitialize => bot.reinitialize(),
        }
    }

    bot.shutdown().await?;
    Ok(())
}
