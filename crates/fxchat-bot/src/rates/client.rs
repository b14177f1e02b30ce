//! Exchange-rate API client
//!
//! Talks to an ExchangeRate-API compatible endpoint
//! (`GET {base_url}/latest/{BASE}`). Requests are throttled with a
//! per-minute quota so a burst of cache misses cannot exhaust the free tier.

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use async_trait::async_trait;
use fxchat_core::{RateSource, RateTable};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

type SharedRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Codes quoted when the configuration does not narrow them down
pub const DEFAULT_CURRENCIES: &[&str] = &[
    "AED", "ARS", "AUD", "BGN", "BHD", "BRL", "CAD", "CHF", "CLP", "CNY", "COP", "CZK", "DKK",
    "EGP", "EUR", "GBP", "HKD", "HUF", "IDR", "ILS", "INR", "ISK", "JPY", "KRW", "KWD", "MAD",
    "MXN", "MYR", "NGN", "NOK", "NZD", "PEN", "PHP", "PKR", "PLN", "QAR", "RON", "RUB", "SAR",
    "SEK", "SGD", "THB", "TRY", "TWD", "UAH", "USD", "VND", "ZAR",
];

/// Response body of the `latest` endpoint
#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    rates: RateTable,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

/// HTTP client for exchange rates
#[derive(Debug, Clone)]
pub struct ExchangeRateClient {
    client: Client,
    base_url: String,
    rate_limiter: SharedRateLimiter,
    currencies: BTreeSet<String>,
}

impl ExchangeRateClient {
    /// Create a client for `base_url` allowing `rate_limit` requests per minute
    pub fn new(base_url: impl Into<String>, rate_limit: u32, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let quota = Quota::per_minute(NonZeroU32::new(rate_limit).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            currencies: DEFAULT_CURRENCIES.iter().map(|c| (*c).to_string()).collect(),
        })
    }

    /// Create a client from the bot configuration
    pub fn from_config(config: &BotConfig) -> Result<Self> {
        let client = Self::new(
            &config.rates_api_url,
            config.rate_limit_per_minute,
            config.request_timeout,
        )?;

        Ok(match &config.currencies {
            Some(codes) => client.with_currencies(codes.iter().cloned()),
            None => client,
        })
    }

    /// Replace the quoted currency list
    pub fn with_currencies<I: IntoIterator<Item = String>>(mut self, codes: I) -> Self {
        self.currencies = codes.into_iter().map(|c| c.to_uppercase()).collect();
        self
    }

    /// Endpoint for the rates of `base`
    pub fn latest_url(&self, base: &str) -> String {
        format!("{}/latest/{}", self.base_url, base.to_uppercase())
    }

    /// Fetch the latest rates for `base`
    pub async fn latest(&self, base: &str) -> Result<RateTable> {
        self.rate_limiter.until_ready().await;

        let response = self.client.get(self.latest_url(base)).send().await?;

        if !response.status().is_success() {
            return Err(BotError::RateFetch {
                base: base.to_string(),
                reason: format!("HTTP error: {}", response.status()),
            });
        }

        let body = response.text().await?;
        parse_latest(base, &body)
    }
}

/// Decode a `latest` response body
fn parse_latest(base: &str, body: &str) -> Result<RateTable> {
    let data: LatestResponse = serde_json::from_str(body)?;

    if data.result != "success" {
        return Err(BotError::RateFetch {
            base: base.to_string(),
            reason: data.error_type.unwrap_or(data.result),
        });
    }

    if let Some(code) = data.base_code.as_deref() {
        if !code.eq_ignore_ascii_case(base) {
            return Err(BotError::RateFetch {
                base: base.to_string(),
                reason: format!("response quoted {code} instead"),
            });
        }
    }

    Ok(data.rates)
}

#[async_trait]
impl RateSource for ExchangeRateClient {
    async fn fetch_rates(&self, base: &str) -> fxchat_core::Result<RateTable> {
        Ok(self.latest(base).await?)
    }

    fn currencies(&self) -> BTreeSet<String> {
        self.currencies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let body = r#"{"result":"success","base_code":"USD","rates":{"USD":1,"JPY":110.5,"EUR":0.91}}"#;
        let rates = parse_latest("USD", body).unwrap();
        assert_eq!(rates.get("JPY"), Some(&110.5));
        assert_eq!(rates.len(), 3);
    }

    #[test]
    fn test_parse_error_type() {
        let body = r#"{"result":"error","error-type":"unsupported-code"}"#;
        let err = parse_latest("XXX", body).unwrap_err();
        assert_eq!(err.to_string(), "Rate fetch failed for XXX: unsupported-code");
    }

    #[test]
    fn test_parse_rejects_other_base() {
        let body = r#"{"result":"success","base_code":"EUR","rates":{"USD":1.1}}"#;
        assert!(parse_latest("USD", body).is_err());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = parse_latest("USD", "<html>").unwrap_err();
        assert!(matches!(err, BotError::JsonError(_)));
    }

    #[test]
    fn test_latest_url() {
        let client =
            ExchangeRateClient::new("https://rates.example/v6/", 10, Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.latest_url("usd"), "https://rates.example/v6/latest/USD");
    }

    #[test]
    fn test_currency_override() {
        let config = BotConfig {
            currencies: Some(vec!["usd".to_string(), "JPY".to_string()]),
            ..Default::default()
        };
        let client = ExchangeRateClient::from_config(&config).unwrap();
        let codes: Vec<String> = client.currencies().into_iter().collect();
        assert_eq!(codes, vec!["JPY".to_string(), "USD".to_string()]);
    }

    #[test]
    fn test_default_currencies_include_majors() {
        let client =
            ExchangeRateClient::new(crate::config::DEFAULT_RATES_API_URL, 30, Duration::from_secs(5))
                .unwrap();
        let codes = client.currencies();
        for code in ["USD", "EUR", "JPY", "GBP"] {
            assert!(codes.contains(code));
        }
    }

    #[tokio::test]
    #[ignore] // Requires network access
    async fn test_fetch_live_rates() {
        let client =
            ExchangeRateClient::new(crate::config::DEFAULT_RATES_API_URL, 30, Duration::from_secs(30))
                .unwrap();
        let rates = client.fetch_rates("USD").await.unwrap();
        assert!(rates.contains_key("JPY"));
    }
}
