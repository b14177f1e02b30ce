//! Reply channels bound to the origin of an inbound message

use crate::config::BotConfig;
use crate::error::Result;
use fxchat_core::{InboundMessage, Transport};
use std::fmt;
use std::sync::Arc;

/// Prefix of every error reply
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Where and how replies for one request are delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Plain chat message back to the sender
    DirectChat { to: String },
    /// Direct message addressed through a relay bridge to `requester`
    RelayedDirect { bridge: String, requester: String },
}

impl ReplyTarget {
    /// Pick the target for replies to `message`
    ///
    /// Messages from a configured bridge that name their requester are
    /// answered through the bridge; everything else is answered directly.
    pub fn for_message(message: &InboundMessage, config: &BotConfig) -> Self {
        match &message.relay_sender {
            Some(requester) if config.is_relay_bridge(&message.from) => Self::RelayedDirect {
                bridge: message.from.clone(),
                requester: requester.clone(),
            },
            _ => Self::DirectChat {
                to: message.from.clone(),
            },
        }
    }

    /// Address the transport sends to
    pub fn destination(&self) -> &str {
        match self {
            Self::DirectChat { to } => to,
            Self::RelayedDirect { bridge, .. } => bridge,
        }
    }

    /// Wrap `text` in the envelope this target needs
    pub fn format(&self, text: &str) -> String {
        match self {
            Self::DirectChat { .. } => text.to_string(),
            Self::RelayedDirect { requester, .. } => format!("d {requester} {text}"),
        }
    }

    /// Short label for log lines
    pub fn label(&self) -> &'static str {
        match self {
            Self::DirectChat { .. } => "chat",
            Self::RelayedDirect { .. } => "relay",
        }
    }
}

/// Sends replies for one request back where it came from
#[derive(Clone)]
pub struct ResponseChannel {
    transport: Arc<dyn Transport>,
    target: ReplyTarget,
}

impl ResponseChannel {
    pub fn new(transport: Arc<dyn Transport>, target: ReplyTarget) -> Self {
        Self { transport, target }
    }

    pub fn target(&self) -> &ReplyTarget {
        &self.target
    }

    /// Send `text` to the requester
    pub async fn send(&self, text: &str) -> Result<()> {
        let body = self.target.format(text);
        self.transport
            .send_message(self.target.destination(), &body)
            .await?;
        Ok(())
    }

    /// Send `text` as an error reply
    pub async fn error(&self, text: &str) -> Result<()> {
        self.send(&format!("{ERROR_PREFIX}{text}")).await
    }
}

impl fmt::Debug for ResponseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseChannel")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}
