//! Wallet fleet: the set of wallets trading the token
//!
//! Keeps one [`WalletRecord`] per address and provides the orderings used by
//! the order builders:
//! - by token balance (supply sells, noise selection, slow sells)
//! - by base balance (rank classification)

use anyhow::Context;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::record::WalletRecord;
use super::types::{FleetTotals, PendingOrder, Rank, StatisticItem, RANKS_IN_ORDER};
use crate::error::{Error, Result};
use crate::market::MarketAdapter;
use crate::pool::price::round;

/// All wallets of the fleet, in load order
#[derive(Debug, Clone, Default)]
pub struct WalletFleet {
    wallets: Vec<WalletRecord>,
}

impl WalletFleet {
    pub fn new(wallets: Vec<WalletRecord>) -> Self {
        Self { wallets }
    }

    /// Create records with empty caches for the given addresses
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            wallets: addresses.into_iter().map(WalletRecord::new).collect(),
        }
    }

    /// Read a wallet list, one address per line
    pub async fn load_addresses<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
        let path = path.as_ref();
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read wallet list: {}", path.display()))?;

        let addresses: Vec<String> = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if addresses.is_empty() {
            return Err(Error::EmptyFleet);
        }
        Ok(addresses)
    }

    /// Query initial balances for every wallet, pausing between wallets
    pub async fn initialize(&mut self, market: &dyn MarketAdapter, delay: Duration) -> FleetTotals {
        let count = self.wallets.len();
        for (i, wallet) in self.wallets.iter_mut().enumerate() {
            if let Err(e) = wallet.refresh(market).await {
                warn!("Failed to load balances for {}: {}", wallet.address, e);
            }
            info!("{}/{}", i + 1, count);
            sleep(delay).await;
        }

        let totals = self.totals();
        info!(
            "cum base balance: {}, cum token balance: {}",
            round(totals.total_base, 4),
            round(totals.total_token, 0)
        );
        totals
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    pub fn wallets(&self) -> &[WalletRecord] {
        &self.wallets
    }

    pub fn get(&self, index: usize) -> Option<&WalletRecord> {
        self.wallets.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut WalletRecord> {
        self.wallets.get_mut(index)
    }

    /// Find wallet by address
    pub fn find_by_address(&self, address: &str) -> Option<usize> {
        self.wallets.iter().position(|w| w.address == address)
    }

    /// Sum of cached balances
    pub fn totals(&self) -> FleetTotals {
        self.wallets.iter().fold(FleetTotals::default(), |acc, w| FleetTotals {
            total_base: acc.total_base + w.base_balance,
            total_token: acc.total_token + w.token_balance,
        })
    }

    /// Tokens held across the fleet according to the cache
    pub fn total_token_supply(&self) -> f64 {
        self.totals().total_token
    }

    /// Wallet indices ordered by cached token balance
    pub fn indices_by_token(&self, ascending: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.wallets.len()).collect();
        indices.sort_by(|&a, &b| {
            let ord = self.wallets[a]
                .token_balance
                .total_cmp(&self.wallets[b].token_balance);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        indices
    }

    /// Wallet indices ordered by cached base balance
    pub fn indices_by_base(&self, ascending: bool) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.wallets.len()).collect();
        indices.sort_by(|&a, &b| {
            let ord = self.wallets[a]
                .base_balance
                .total_cmp(&self.wallets[b].base_balance);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        indices
    }

    pub fn mark_pending(&mut self, index: usize, pending: PendingOrder) {
        if let Some(wallet) = self.wallets.get_mut(index) {
            wallet.pending_order = pending;
        }
    }

    pub fn clear_pending(&mut self) {
        for wallet in &mut self.wallets {
            wallet.pending_order = PendingOrder::None;
        }
    }

    /// Refresh the given wallets from the market
    ///
    /// Duplicate indices are refreshed once. Failed queries keep the old cache.
    pub async fn reconcile(
        &mut self,
        indices: &[usize],
        market: &dyn MarketAdapter,
        delay: Duration,
    ) -> usize {
        let mut seen = Vec::with_capacity(indices.len());
        for &index in indices {
            if index < self.wallets.len() && !seen.contains(&index) {
                seen.push(index);
            }
        }

        if seen.is_empty() {
            return 0;
        }

        sleep(delay).await;

        let mut refreshed = 0;
        for index in seen {
            let wallet = &mut self.wallets[index];
            match wallet.refresh(market).await {
                Ok(()) => {
                    refreshed += 1;
                    debug!(
                        "{}: {} base, {} tokens",
                        wallet.short(),
                        wallet.base_balance,
                        wallet.token_balance
                    );
                }
                Err(e) => warn!("Failed to refresh {}: {}", wallet.address, e),
            }
            sleep(delay).await;
        }
        refreshed
    }

    /// Refresh every wallet and return the new totals
    pub async fn refresh_all(&mut self, market: &dyn MarketAdapter, delay: Duration) -> FleetTotals {
        for wallet in &mut self.wallets {
            sleep(delay).await;
            info!("public key: {}", wallet.address);
            match wallet.refresh(market).await {
                Ok(()) => {
                    info!("balance: {} base", wallet.base_balance);
                    info!("token balance: {} tokens", wallet.token_balance);
                }
                Err(e) => info!("error: {}", e),
            }
        }

        let totals = self.totals();
        info!(
            "cum base balance: {}, cum token balance: {}",
            round(totals.total_base, 4),
            round(totals.total_token, 0)
        );
        totals
    }

    /// Refresh and return the most recently added wallet
    pub async fn last_wallet_balance(&mut self, market: &dyn MarketAdapter) -> Result<&WalletRecord> {
        let wallet = self.wallets.last_mut().ok_or(Error::EmptyFleet)?;
        wallet.refresh(market).await?;
        info!(
            "last wallet balance:\n{} base\n{} tokens",
            wallet.base_balance, wallet.token_balance
        );
        Ok(&*wallet)
    }

    /// Split the fleet into equal thirds by base balance
    pub fn assign_ranks(&mut self) {
        let order = self.indices_by_base(true);
        let count = order.len();
        if count == 0 {
            return;
        }

        for (position, index) in order.into_iter().enumerate() {
            let bucket = (position * RANKS_IN_ORDER.len() / count).min(RANKS_IN_ORDER.len() - 1);
            self.wallets[index].rank = Some(RANKS_IN_ORDER[bucket]);
        }
    }

    /// Number of wallets per rank
    pub fn rank_counts(&self) -> BTreeMap<Rank, usize> {
        let mut counts = BTreeMap::new();
        for rank in self.wallets.iter().filter_map(|w| w.rank) {
            *counts.entry(rank).or_insert(0) += 1;
        }
        counts
    }

    /// Write the cached balances of every wallet as JSON
    pub async fn save_statistics<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let snapshot: HashMap<&str, StatisticItem> = self
            .wallets
            .iter()
            .map(|w| {
                (
                    w.address.as_str(),
                    StatisticItem {
                        base_balance: w.base_balance,
                        token_balance: w.token_balance,
                        rank: w.rank,
                    },
                )
            })
            .collect();

        let data = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, data).await?;

        info!("Wallet statistics written to {}", path.display());
        Ok(())
    }

    /// Log status of all wallets
    pub fn log_status(&self) {
        info!("=== Fleet Status ===");
        for wallet in &self.wallets {
            info!(
                "  {} [{}]: {:.4} base, {:.0} tokens",
                wallet.address,
                wallet.rank.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
                wallet.base_balance,
                wallet.token_balance
            );
        }
        let totals = self.totals();
        info!(
            "  Total: {:.4} base, {:.0} tokens across {} wallets",
            totals.total_base,
            totals.total_token,
            self.wallets.len()
        );
        info!("====================");
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
