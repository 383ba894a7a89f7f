//! Order and intent types

use serde::{Deserialize, Serialize};

use crate::wallet::OrderKind;

/// One order for one wallet of the fleet
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOrder {
    /// Index into the fleet
    pub wallet: usize,
    /// Base currency for buys, tokens for sells
    pub amount: f64,
    pub kind: OrderKind,
}

impl TradeOrder {
    pub fn buy(wallet: usize, amount: f64) -> Self {
        Self {
            wallet,
            amount,
            kind: OrderKind::Buy,
        }
    }

    pub fn sell(wallet: usize, amount: f64) -> Self {
        Self {
            wallet,
            amount,
            kind: OrderKind::Sell,
        }
    }
}

/// What a batch should achieve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TradeIntent {
    /// Every wallet buys with its spendable base
    BuyAll,
    /// Every wallet sells its whole token balance
    SellAll,
    /// Sell a share of the fleet's token supply
    SellPercent { percent: f64, noise: bool },
    /// Spend a base currency amount across the least token-heavy wallets
    BuyAmount { amount: f64, noise: bool },
    /// Sell back part of the observed net buy volume
    SlowSell { net_volume: f64 },
}

impl TradeIntent {
    pub fn name(&self) -> &'static str {
        match self {
            TradeIntent::BuyAll => "buy-all",
            TradeIntent::SellAll => "sell-all",
            TradeIntent::SellPercent { .. } => "sell-percent",
            TradeIntent::BuyAmount { .. } => "buy-amount",
            TradeIntent::SlowSell { .. } => "slow-sell",
        }
    }
}

/// Execution switches for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Refresh touched wallets after the batch
    pub update_balances: bool,
    /// Random pacing between orders instead of the fixed send delay
    pub random_sleep: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            update_balances: true,
            random_sleep: true,
        }
    }
}
