//! Cached view of a single fleet wallet

use tracing::warn;

use super::types::{PendingOrder, Rank};
use crate::error::Result;
use crate::market::MarketAdapter;
use crate::pool::price::round;

/// Last-known balances of one signing identity
///
/// Balances are snapshots; they are only live right after [`refresh`](Self::refresh).
#[derive(Debug, Clone, PartialEq)]
pub struct WalletRecord {
    pub address: String,
    pub base_balance: f64,
    pub token_balance: f64,
    pub rank: Option<Rank>,
    pub pending_order: PendingOrder,
}

impl WalletRecord {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            base_balance: 0.0,
            token_balance: 0.0,
            rank: None,
            pending_order: PendingOrder::None,
        }
    }

    pub fn with_balances(address: impl Into<String>, base_balance: f64, token_balance: f64) -> Self {
        Self {
            base_balance,
            token_balance,
            ..Self::new(address)
        }
    }

    /// Base currency available for buying after keeping `fee_reserve` aside
    pub fn spendable(&self, fee_reserve: f64) -> f64 {
        round(self.base_balance - fee_reserve, 3)
    }

    /// Short address prefix for log lines
    pub fn short(&self) -> &str {
        let end = self
            .address
            .char_indices()
            .nth(5)
            .map(|(i, _)| i)
            .unwrap_or(self.address.len());
        &self.address[..end]
    }

    pub fn is_idle(&self) -> bool {
        self.pending_order == PendingOrder::None
    }

    /// Re-read both balances from the market
    ///
    /// On error the cached values are kept as they were.
    pub async fn refresh(&mut self, market: &dyn MarketAdapter) -> Result<()> {
        let base = market.base_balance(&self.address).await?;
        let token = market.token_balance(&self.address).await?;
        self.base_balance = base;
        self.token_balance = sanitize(token);
        Ok(())
    }

    /// Re-read only the token balance
    pub async fn refresh_token_balance(&mut self, market: &dyn MarketAdapter) -> f64 {
        match market.token_balance(&self.address).await {
            Ok(balance) => self.token_balance = sanitize(balance),
            Err(e) => warn!("Failed to query token balance for {}: {}", self.short(), e),
        }
        self.token_balance
    }
}

fn sanitize(balance: f64) -> f64 {
    if balance.is_finite() {
        balance
    } else {
        0.0
    }
}
