//! TTL-cached exchange-rate snapshots

use crate::error::{BotError, Result};
use cached::{Cached, TimedCache};
use chrono::{DateTime, Utc};
use fxchat_core::{RateSource, RateTable};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

/// Immutable set of rates for one base currency
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    /// Base currency code
    pub base: String,
    /// Factor from `base` to each quoted code
    pub rates: RateTable,
    /// When the snapshot was fetched
    pub fetched_at: DateTime<Utc>,
}

impl RateSnapshot {
    pub fn new(base: impl Into<String>, rates: RateTable) -> Self {
        Self {
            base: base.into(),
            rates,
            fetched_at: Utc::now(),
        }
    }

    /// Factor from the snapshot's base to `target`
    ///
    /// A currency always converts to itself at 1, quoted or not.
    pub fn rate(&self, target: &str) -> Option<f64> {
        if target == self.base {
            return Some(1.0);
        }
        self.rates.get(target).copied()
    }

    /// Wall-clock age of the snapshot
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.fetched_at
    }

    /// Whether the snapshot is older than `window`
    pub fn is_stale(&self, window: Duration) -> bool {
        chrono::Duration::from_std(window).is_ok_and(|window| self.age() > window)
    }
}

/// Exchange-rate store
///
/// Holds at most one snapshot per base currency. A snapshot older than the
/// staleness window is never served: the next lookup for that base fetches
/// synchronously and replaces it. A failed fetch is returned to the caller
/// and nothing older is used in its place.
///
/// Lookups take `&mut self`, so the check-fetch-use sequence cannot
/// interleave with another caller. The conversion worker owns the store
/// outright; anything else that needs one must put it behind a lock.
pub struct RateStore {
    source: Arc<dyn RateSource>,
    snapshots: TimedCache<String, Arc<RateSnapshot>>,
    currencies: Arc<BTreeSet<String>>,
    staleness_window: Duration,
}

impl RateStore {
    /// Create a store quoting every currency the source supports
    pub fn new(source: Arc<dyn RateSource>, staleness_window: Duration) -> Self {
        let currencies = source.currencies();
        Self::with_currencies(source, staleness_window, currencies)
    }

    /// Create a store restricted to `currencies`
    pub fn with_currencies(
        source: Arc<dyn RateSource>,
        staleness_window: Duration,
        currencies: BTreeSet<String>,
    ) -> Self {
        Self {
            source,
            snapshots: TimedCache::with_lifespan(staleness_window),
            currencies: Arc::new(currencies),
            staleness_window,
        }
    }

    /// Supported currency codes
    pub fn currencies(&self) -> &BTreeSet<String> {
        &self.currencies
    }

    /// Shared handle on the supported codes, for validating input off the
    /// worker
    pub fn shared_currencies(&self) -> Arc<BTreeSet<String>> {
        Arc::clone(&self.currencies)
    }

    /// Current snapshot for `base`, refreshed first if missing or stale
    pub async fn snapshot(&mut self, base: &str) -> Result<Arc<RateSnapshot>> {
        let key = base.to_string();

        // The cache lifespan only bounds memory; the snapshot timestamp
        // decides staleness
        match self.snapshots.cache_get(&key) {
            Some(snapshot) if !snapshot.is_stale(self.staleness_window) => {
                tracing::debug!("Rate cache hit for {}", base);
                return Ok(Arc::clone(snapshot));
            }
            Some(snapshot) => {
                tracing::debug!(
                    "Rates of {} are stale ({}s old)",
                    base,
                    snapshot.age().num_seconds()
                );
            }
            None => tracing::debug!("Rate cache miss for {}", base),
        }

        let rates = self
            .source
            .fetch_rates(base)
            .await
            .map_err(|e| BotError::RateFetch {
                base: key.clone(),
                reason: e.to_string(),
            })?;

        let snapshot = Arc::new(RateSnapshot::new(base, rates));
        let _ = self.snapshots.cache_set(key, Arc::clone(&snapshot));
        tracing::info!("Updated rates of {} ({} codes)", base, snapshot.rates.len());

        Ok(snapshot)
    }

    /// Exchange factor from `base` to `target`
    pub async fn rate(&mut self, base: &str, target: &str) -> Result<f64> {
        let snapshot = self.snapshot(base).await?;
        Self::lookup(&snapshot, target)
    }

    /// `amount` of `base` expressed in `target`
    ///
    /// Uses a single snapshot for the whole computation.
    pub async fn convert(&mut self, amount: u64, base: &str, target: &str) -> Result<f64> {
        let snapshot = self.snapshot(base).await?;
        let rate = Self::lookup(&snapshot, target)?;
        Ok(amount as f64 * rate)
    }

    /// Number of cached snapshots, stale ones included until next touched
    pub fn cached_bases(&self) -> usize {
        self.snapshots.cache_size()
    }

    fn lookup(snapshot: &RateSnapshot, target: &str) -> Result<f64> {
        snapshot.rate(target).ok_or_else(|| BotError::MissingRate {
            base: snapshot.base.clone(),
            target: target.to_string(),
        })
    }
}
