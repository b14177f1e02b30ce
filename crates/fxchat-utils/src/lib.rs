//! Shared utilities for fxchat
//!
//! This crate provides common functionality used across the fxchat workspace,
//! currently the tracing subscriber setup shared by the binary and tests.

pub mod logging;

pub use logging::{default_filter, init_tracing};
