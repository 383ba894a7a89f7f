//! Constant-product pool simulator
//!
//! Stands in for a live pool so fleet strategies can be exercised without
//! touching a real market. Reserves and per-address holdings are owned by the
//! simulator instance; share it behind an `Arc<Mutex<_>>` when several
//! components need it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::price::{
    base_out_for_token_in, floor_to_decimals, round_half_up, token_out_for_base_in,
};
use crate::error::{Error, Result};

/// Snapshot of pool reserves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoolState {
    pub token_reserve: f64,
    pub base_reserve: f64,
    pub decimals: u8,
}

impl PoolState {
    /// Spot price in base currency per token
    pub fn price(&self) -> f64 {
        self.base_reserve / self.token_reserve
    }

    /// Constant product k
    pub fn product(&self) -> f64 {
        self.token_reserve * self.base_reserve
    }
}

/// Per-address balances tracked by the simulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Holdings {
    pub token_balance: f64,
    pub base_balance: f64,
}

/// In-memory constant-product market maker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSimulator {
    state: PoolState,
    initial_token_reserve: f64,
    holdings: HashMap<String, Holdings>,
}

impl PoolSimulator {
    /// Create a pool with the given reserves
    pub fn new(token_reserve: f64, base_reserve: f64, decimals: u8) -> Result<Self> {
        check_reserves(token_reserve, base_reserve)?;

        Ok(Self {
            state: PoolState {
                token_reserve,
                base_reserve,
                decimals,
            },
            initial_token_reserve: token_reserve,
            holdings: HashMap::new(),
        })
    }

    /// Buy tokens with base currency
    ///
    /// Fails with [`Error::SlippageExceeded`] when the quoted output is below
    /// `min_token_out`. The fee is charged to the buyer on top of
    /// `base_amount_in` and does not enter the pool.
    pub fn buy(
        &mut self,
        address: &str,
        base_amount_in: f64,
        min_token_out: f64,
        fee: f64,
    ) -> Result<f64> {
        check_amount("base input", base_amount_in)?;
        check_fee(fee)?;

        let token_out = self.token_output_for_base_input(base_amount_in);
        if token_out < min_token_out {
            return Err(Error::SlippageExceeded {
                expected: min_token_out,
                actual: token_out,
            });
        }
        if token_out >= self.state.token_reserve {
            return Err(Error::InvalidAmount(format!(
                "buy of {} base would drain the token reserve",
                base_amount_in
            )));
        }

        let fee = round_half_up(fee, self.state.decimals);

        self.state.token_reserve -= token_out;
        self.state.base_reserve += base_amount_in;

        let entry = self.holdings.entry(address.to_string()).or_default();
        entry.token_balance += token_out;
        entry.base_balance -= base_amount_in + fee;

        debug!(
            "sim buy {}: {} base -> {} tokens, reserves {}/{}",
            address, base_amount_in, token_out, self.state.token_reserve, self.state.base_reserve
        );

        Ok(token_out)
    }

    /// Sell tokens for base currency
    ///
    /// The seller must hold `token_amount_in`; the pool settles at the quoted
    /// output, which must reach `min_base_out`. The fee is deducted from the
    /// seller's proceeds.
    pub fn sell(
        &mut self,
        address: &str,
        token_amount_in: f64,
        min_base_out: f64,
        fee: f64,
    ) -> Result<f64> {
        check_amount("token input", token_amount_in)?;
        check_fee(fee)?;

        let available = self.address_holdings(address).token_balance;
        if available < token_amount_in {
            return Err(Error::InsufficientHoldings {
                address: address.to_string(),
                available,
                required: token_amount_in,
            });
        }

        let base_out = self.base_output_for_token_input(token_amount_in);
        if base_out < min_base_out {
            return Err(Error::SlippageExceeded {
                expected: min_base_out,
                actual: base_out,
            });
        }
        if base_out >= self.state.base_reserve {
            return Err(Error::InvalidAmount(format!(
                "sell of {} tokens would drain the base reserve",
                token_amount_in
            )));
        }

        let fee = round_half_up(fee, self.state.decimals);

        self.state.token_reserve += token_amount_in;
        self.state.base_reserve -= base_out;

        let entry = self.holdings.entry(address.to_string()).or_default();
        entry.token_balance -= token_amount_in;
        entry.base_balance += base_out - fee;

        debug!(
            "sim sell {}: {} tokens -> {} base, reserves {}/{}",
            address, token_amount_in, base_out, self.state.token_reserve, self.state.base_reserve
        );

        Ok(base_out)
    }

    /// Load a saved simulator; `None` when nothing was saved at `path` yet
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }

        let data = tokio::fs::read_to_string(path).await?;
        let pool: Self = serde_json::from_str(&data)?;
        check_reserves(pool.state.token_reserve, pool.state.base_reserve)?;

        info!(
            "Loaded simulated pool from {} ({} addresses)",
            path.display(),
            pool.holdings.len()
        );
        Ok(Some(pool))
    }

    /// Write reserves and the holdings ledger as JSON
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), data).await?;
        debug!("simulated pool saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Credit an address with base currency from outside the pool
    pub fn deposit_base(&mut self, address: &str, amount: f64) -> Result<()> {
        check_amount("deposit", amount)?;
        self.holdings.entry(address.to_string()).or_default().base_balance += amount;
        Ok(())
    }

    /// Quote tokens out for a base input; no state change
    pub fn token_output_for_base_input(&self, base_in: f64) -> f64 {
        let out = token_out_for_base_in(self.state.token_reserve, self.state.base_reserve, base_in);
        floor_to_decimals(out.max(0.0), self.state.decimals)
    }

    /// Quote base out for a token input; no state change
    pub fn base_output_for_token_input(&self, token_in: f64) -> f64 {
        let out = base_out_for_token_in(self.state.token_reserve, self.state.base_reserve, token_in);
        floor_to_decimals(out.max(0.0), self.state.decimals)
    }

    pub fn pool_state(&self) -> PoolState {
        self.state
    }

    /// Spot price in base currency per token
    pub fn current_price(&self) -> f64 {
        self.state.price()
    }

    /// Holdings for an address; unseen addresses read as zero
    pub fn address_holdings(&self, address: &str) -> Holdings {
        self.holdings.get(address).copied().unwrap_or_default()
    }

    pub fn initial_token_reserve(&self) -> f64 {
        self.initial_token_reserve
    }

    /// Sum of token balances across every address the pool has seen
    pub fn total_held_tokens(&self) -> f64 {
        self.holdings.values().map(|h| h.token_balance).sum()
    }

    /// Whether the ledger has an entry for `address`
    pub fn contains(&self, address: &str) -> bool {
        self.holdings.contains_key(address)
    }

    /// Addresses with a ledger entry
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.holdings.keys().map(|k| k.as_str())
    }
}

fn check_reserves(token_reserve: f64, base_reserve: f64) -> Result<()> {
    if !(token_reserve.is_finite() && token_reserve > 0.0) {
        return Err(Error::InvalidPool(format!(
            "token reserve must be positive, got {}",
            token_reserve
        )));
    }
    if !(base_reserve.is_finite() && base_reserve > 0.0) {
        return Err(Error::InvalidPool(format!(
            "base reserve must be positive, got {}",
            base_reserve
        )));
    }
    Ok(())
}

fn check_amount(what: &str, amount: f64) -> Result<()> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(Error::InvalidAmount(format!(
            "{} must be positive, got {}",
            what, amount
        )));
    }
    Ok(())
}

fn check_fee(fee: f64) -> Result<()> {
    if !(fee.is_finite() && fee >= 0.0) {
        return Err(Error::InvalidAmount(format!(
            "fee must be non-negative, got {}",
            fee
        )));
    }
    Ok(())
}
