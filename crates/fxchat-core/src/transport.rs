//! Chat transport abstraction
//!
//! The bot never talks to the chat network directly. A [`Transport`]
//! provides the connection primitives, and delivers inbound traffic to
//! the handlers registered on it. Faults raised by the transport while a
//! session is live are reported through the [`FaultHandler`] instead of
//! escaping as errors.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Type of an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// One-to-one chat
    Chat,
    /// Plain message without a conversation
    Normal,
    /// Multi-user room message
    GroupChat,
    /// Broadcast headline
    Headline,
    /// Delivery error bounced back by the server
    Error,
}

/// Message delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Address of the sender
    pub from: String,

    /// Message type
    pub kind: MessageKind,

    /// Text body, if any
    pub body: Option<String>,

    /// Screen name of the original requester when the message was relayed
    /// through a bridge
    pub relay_sender: Option<String>,
}

impl InboundMessage {
    /// Create a chat message
    pub fn chat(from: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            kind: MessageKind::Chat,
            body: Some(body.into()),
            relay_sender: None,
        }
    }

    /// Set the message type
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Attach the relayed requester's screen name
    pub fn with_relay_sender(mut self, name: impl Into<String>) -> Self {
        self.relay_sender = Some(name.into());
        self
    }

    /// Body text, empty when absent
    pub fn text(&self) -> &str {
        self.body.as_deref().unwrap_or_default()
    }
}

/// Direction of a contact-subscription event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// Contact asks to see the bot's presence
    Subscribe,
    /// Roster update: the contact sees the bot's presence but the bot is
    /// not subscribed back
    SubscribedFrom,
    /// Contact removed the bot
    Unsubscribe,
}

/// Contact-subscription event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRequest {
    pub from: String,
    pub kind: SubscriptionKind,
}

/// Session lifecycle stage a transport operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Connect,
    Authenticate,
    Presence,
    /// Fault raised while the session was live
    Session,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "connect"),
            Stage::Authenticate => write!(f, "authenticate"),
            Stage::Presence => write!(f, "presence"),
            Stage::Session => write!(f, "session"),
        }
    }
}

/// Fault reported asynchronously by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFault {
    pub stage: Stage,
    pub message: String,
}

impl TransportFault {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Login credentials for the bot's identity
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub jid: String,
    password: String,
}

impl Credentials {
    pub fn new(jid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            password: password.into(),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("jid", &self.jid)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Software name and version answered to version queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoftwareVersion {
    pub name: String,
    pub version: String,
}

/// Receives inbound chat messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn on_message(&self, message: InboundMessage);
}

/// Receives contact-subscription events
#[async_trait]
pub trait SubscriptionHandler: Send + Sync {
    async fn on_subscription(&self, request: SubscriptionRequest);
}

/// Receives faults raised while a session is live
///
/// Called from the transport's own context, so implementations must not
/// block.
pub trait FaultHandler: Send + Sync {
    fn on_fault(&self, fault: TransportFault);
}

/// Persistent chat-protocol connection
///
/// Registering a handler replaces any handler of the same kind registered
/// earlier, so a restarted lifecycle can register again.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection
    async fn connect(&self) -> Result<()>;

    /// Exchange credentials on an open connection
    async fn authenticate(&self, credentials: &Credentials) -> Result<()>;

    /// Broadcast availability
    async fn send_presence(&self, available: bool) -> Result<()>;

    /// Send a chat message to `to`
    async fn send_message(&self, to: &str, body: &str) -> Result<()>;

    /// Approve a contact-subscription request
    async fn accept_subscription(&self, from: &str) -> Result<()>;

    fn register_message_handler(&self, handler: Arc<dyn MessageHandler>);

    fn register_subscription_handler(&self, handler: Arc<dyn SubscriptionHandler>);

    fn register_fault_handler(&self, handler: Arc<dyn FaultHandler>);

    /// Advertise the software version (optional)
    fn register_version(&self, _version: &SoftwareVersion) {}

    /// Whether the connection is currently usable
    fn is_connected(&self) -> bool;

    /// Close the connection
    async fn disconnect(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_message_builder() {
        let msg = InboundMessage::chat("alice@example.org", "100 USD JPY")
            .with_relay_sender("alice");
        assert_eq!(msg.kind, MessageKind::Chat);
        assert_eq!(msg.text(), "100 USD JPY");
        assert_eq!(msg.relay_sender.as_deref(), Some("alice"));
    }

    #[test]
    fn test_missing_body_is_empty_text() {
        let msg = InboundMessage {
            from: "bob@example.org".to_string(),
            kind: MessageKind::Normal,
            body: None,
            relay_sender: None,
        };
        assert_eq!(msg.text(), "");
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("bot@example.org", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("bot@example.org"));
        assert!(!rendered.contains("hunter2"));
        assert_eq!(creds.password(), "hunter2");
    }

    #[test]
    fn test_fault_display() {
        let fault = TransportFault::new(Stage::Session, "stream closed");
        assert_eq!(fault.to_string(), "session: stream closed");
    }
}
