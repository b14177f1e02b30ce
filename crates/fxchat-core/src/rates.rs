//! Exchange-rate data source abstraction

use crate::error::Result;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};

/// Mapping from currency code to the factor one unit of the base buys
pub type RateTable = HashMap<String, f64>;

/// External provider of exchange rates
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch the full rate table for `base`
    async fn fetch_rates(&self, base: &str) -> Result<RateTable>;

    /// Currency codes this source can quote
    fn currencies(&self) -> BTreeSet<String>;
}
