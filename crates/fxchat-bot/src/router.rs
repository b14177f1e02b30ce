//! Command classification and dispatch
//!
//! Every inbound chat message passes through [`CommandRouter::handle`] on
//! the transport's delivery path. Informational commands are answered in
//! place; conversions are validated and handed to the
//! [`ConversionWorker`] without waiting for the result.

use crate::config::BotConfig;
use crate::error::BotError;
use crate::replies;
use crate::response::{ReplyTarget, ResponseChannel};
use crate::worker::{ConversionJob, ConversionWorker};
use async_trait::async_trait;
use fxchat_core::{InboundMessage, MessageHandler, MessageKind, Transport};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

/// Parsed chat command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List supported currency codes
    List,
    /// Show usage
    Help,
    /// Show what the bot is
    Who,
    /// Convert `amount` (raw digits, separators included) of `base` into `target`
    Convert {
        amount: String,
        base: String,
        target: String,
    },
    /// Anything unrecognized
    Usage,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    List,
    Help,
    Who,
    Convert,
}

/// Classification rules, tried in order; the first match wins
static RULES: LazyLock<Vec<(Regex, Rule)>> = LazyLock::new(|| {
    [
        (r"(?i)list|currenc(?:y|ies)|codes?", Rule::List),
        (r"(?i)help|usage", Rule::Help),
        (r"(?i)who", Rule::Who),
        (r"(?i)(\d[\d,]*)\s+([a-z]{3})\s+([a-z]{3})", Rule::Convert),
    ]
    .into_iter()
    .map(|(pattern, rule)| (Regex::new(pattern).expect("valid command pattern"), rule))
    .collect()
});

impl Command {
    /// Classify a message body
    pub fn parse(body: &str) -> Self {
        for (pattern, rule) in RULES.iter() {
            match rule {
                Rule::List if pattern.is_match(body) => return Command::List,
                Rule::Help if pattern.is_match(body) => return Command::Help,
                Rule::Who if pattern.is_match(body) => return Command::Who,
                Rule::Convert => {
                    if let Some(caps) = pattern.captures(body) {
                        return Command::Convert {
                            amount: caps[1].to_string(),
                            base: caps[2].to_uppercase(),
                            target: caps[3].to_uppercase(),
                        };
                    }
                }
                _ => {}
            }
        }
        Command::Usage
    }
}

/// What the router did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Filtered out, nothing sent
    Ignored,
    /// Answered in place
    Replied,
    /// Conversion queued
    Enqueued,
}

/// Reason a conversion request was not queued
#[derive(Debug, PartialEq, Eq)]
enum Rejection {
    Usage,
    Error(String),
}

/// Validated conversion request
#[derive(Debug, PartialEq, Eq)]
struct Conversion {
    amount: u64,
    base: String,
    target: String,
}

/// Routes inbound messages to replies or conversion jobs
pub struct CommandRouter {
    transport: Arc<dyn Transport>,
    worker: Arc<ConversionWorker>,
    currencies: Arc<BTreeSet<String>>,
    config: Arc<BotConfig>,
}

impl CommandRouter {
    pub fn new(
        transport: Arc<dyn Transport>,
        worker: Arc<ConversionWorker>,
        currencies: Arc<BTreeSet<String>>,
        config: Arc<BotConfig>,
    ) -> Self {
        Self {
            transport,
            worker,
            currencies,
            config,
        }
    }

    /// Whether `message` deserves any answer at all
    ///
    /// Only non-empty chat messages qualify, and a relay bridge's delivery
    /// confirmations are dropped.
    pub fn accepts(&self, message: &InboundMessage) -> bool {
        if message.kind != MessageKind::Chat {
            return false;
        }
        let body = message.text();
        let notice = self.config.relay_confirmation.as_str();
        // An empty notice disables the filter
        !body.is_empty() && (notice.is_empty() || !body.contains(notice))
    }

    /// Classify `message` and act on it
    pub async fn handle(&self, message: InboundMessage) -> Dispatch {
        if !self.accepts(&message) {
            return Dispatch::Ignored;
        }

        let target = ReplyTarget::for_message(&message, &self.config);
        let reply = ResponseChannel::new(Arc::clone(&self.transport), target);

        match Command::parse(message.text()) {
            Command::List => {
                self.respond(&reply, &replies::currency_list(&self.currencies), false)
                    .await
            }
            Command::Help | Command::Usage => self.respond(&reply, replies::USAGE, false).await,
            Command::Who => {
                let about = replies::about(self.config.about_url.as_deref());
                self.respond(&reply, &about, false).await
            }
            Command::Convert {
                amount,
                base,
                target,
            } => match self.validate(&amount, &base, &target) {
                Ok(conversion) => self.enqueue(reply, conversion).await,
                Err(Rejection::Usage) => self.respond(&reply, replies::USAGE, false).await,
                Err(Rejection::Error(text)) => self.respond(&reply, &text, true).await,
            },
        }
    }

    /// Check a conversion request, stopping at the first problem
    fn validate(&self, amount: &str, base: &str, target: &str) -> Result<Conversion, Rejection> {
        let digits: String = amount.chars().filter(|c| *c != ',').collect();
        // Too many digits for u64 is over any ceiling
        let amount = match digits.parse::<u64>() {
            Ok(value) if value > self.config.amount_limit => {
                return Err(Rejection::Error(replies::AMOUNT_TOO_LARGE.to_string()));
            }
            Ok(value) => value,
            Err(_) if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) => {
                return Err(Rejection::Error(replies::AMOUNT_TOO_LARGE.to_string()));
            }
            Err(_) => return Err(Rejection::Usage),
        };

        if base.is_empty() || target.is_empty() {
            return Err(Rejection::Usage);
        }

        if amount == 0 {
            return Err(Rejection::Error(replies::AMOUNT_NOT_POSITIVE.to_string()));
        }

        for code in [base, target] {
            if !self.currencies.contains(code) {
                return Err(Rejection::Error(replies::unsupported_currency(code)));
            }
        }

        Ok(Conversion {
            amount,
            base: base.to_string(),
            target: target.to_string(),
        })
    }

    async fn enqueue(&self, reply: ResponseChannel, conversion: Conversion) -> Dispatch {
        let Conversion {
            amount,
            base,
            target,
        } = conversion;

        info!("{}: {} {} {}", reply.target().label(), amount, base, target);

        match self
            .worker
            .enqueue(ConversionJob::new(reply.clone(), amount, base, target))
        {
            Ok(()) => Dispatch::Enqueued,
            Err(BotError::QueueFull { capacity }) => {
                warn!(
                    "Conversion queue full ({} jobs), rejecting request from {}",
                    capacity,
                    reply.target().destination()
                );
                self.respond(&reply, replies::QUEUE_FULL, true).await
            }
            Err(e) => {
                warn!("Conversion not queued: {}", e);
                self.respond(&reply, replies::SHUTTING_DOWN, true).await
            }
        }
    }

    async fn respond(&self, reply: &ResponseChannel, text: &str, is_error: bool) -> Dispatch {
        let sent = if is_error {
            reply.error(text).await
        } else {
            reply.send(text).await
        };

        if let Err(e) = sent {
            warn!(
                "Failed to reply to {}: {}",
                reply.target().destination(),
                e
            );
        }
        Dispatch::Replied
    }
}

#[async_trait]
impl MessageHandler for CommandRouter {
    async fn on_message(&self, message: InboundMessage) {
        self.handle(message).await;
    }
}
