//! Currency-conversion chat bot
//!
//! Answers chat requests such as `1000 USD JPY` with a conversion computed
//! from cached exchange rates. It includes:
//!
//! - A rate store that refetches a base currency's rates once they are
//!   older than the staleness window
//! - A bounded conversion queue drained by a single worker, rejecting new
//!   requests when full and draining on shutdown
//! - A command router for help, currency list, about and conversions
//! - A session state machine that reconnects after transport faults
//! - A heartbeat re-announcing presence while the session is active
//!
//! # Example
//!
//! ```rust,ignore
//! use fxchat_bot::{BotConfig, ExchangeRateClient, FxBot};
//! use fxchat_bot::platforms::ConsoleTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BotConfig::builder()
//!         .credentials("fxchat@example.org", "secret")
//!         .build()?;
//!
//!     let source = Arc::new(ExchangeRateClient::from_config(&config)?);
//!     let bot = FxBot::start(config, Arc::new(ConsoleTransport::new()), source);
//!
//!     tokio::signal::ctrl_c().await?;
//!     bot.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod platforms;
pub mod rates;
pub mod replies;
pub mod response;
pub mod router;
pub mod session;
pub mod worker;

#[cfg(test)]
mod testing;

pub use app::FxBot;
pub use config::BotConfig;
pub use error::{BotError, Result};
pub use heartbeat::{Beat, HeartbeatLoop};
pub use rates::{ExchangeRateClient, RateSnapshot, RateStore};
pub use replies::BOT_NAME;
pub use response::{ReplyTarget, ResponseChannel};
pub use router::{Command, CommandRouter, Dispatch};
pub use session::{SessionEvent, SessionManager, SessionState};
pub use worker::{ConversionJob, ConversionWorker};

/// Crate version announced to version queries and in logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
