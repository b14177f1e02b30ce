//! Core abstractions for fxchat
//!
//! This crate defines the collaborator seams the bot is written against:
//! the chat [`Transport`] with its handler traits, the exchange-rate
//! [`RateSource`], and the shared [`Error`] type.

pub mod error;
pub mod rates;
pub mod transport;

pub use error::{Error, Result};
pub use rates::{RateSource, RateTable};
pub use transport::{
    Credentials, FaultHandler, InboundMessage, MessageHandler, MessageKind, SoftwareVersion,
    Stage, SubscriptionHandler, SubscriptionKind, SubscriptionRequest, Transport, TransportFault,
};
