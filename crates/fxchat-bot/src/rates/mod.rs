//! Exchange rates: the HTTP data source and the TTL-cached snapshot store

pub mod client;
pub mod store;

pub use client::{DEFAULT_CURRENCIES, ExchangeRateClient};
pub use store::{RateSnapshot, RateStore};
