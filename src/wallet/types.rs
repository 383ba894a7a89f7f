//! Core types for the wallet fleet

use serde::{Deserialize, Serialize};

/// Direction of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Buy,
    Sell,
}

impl OrderKind {
    pub fn opposite(&self) -> Self {
        match self {
            OrderKind::Buy => OrderKind::Sell,
            OrderKind::Sell => OrderKind::Buy,
        }
    }
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Buy => write!(f, "BUY"),
            OrderKind::Sell => write!(f, "SELL"),
        }
    }
}

/// Order a wallet has been assigned while a batch is being built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingOrder {
    #[default]
    None,
    Buy,
    Sell,
}

impl From<OrderKind> for PendingOrder {
    fn from(kind: OrderKind) -> Self {
        match kind {
            OrderKind::Buy => PendingOrder::Buy,
            OrderKind::Sell => PendingOrder::Sell,
        }
    }
}

/// Coarse classification of a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rank {
    Low,
    Mid,
    High,
}

/// Ranks from lowest to highest
pub const RANKS_IN_ORDER: [Rank; 3] = [Rank::Low, Rank::Mid, Rank::High];

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rank::Low => write!(f, "LOW"),
            Rank::Mid => write!(f, "MID"),
            Rank::High => write!(f, "HIGH"),
        }
    }
}

/// Fleet-wide balance totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetTotals {
    pub total_base: f64,
    pub total_token: f64,
}

/// Per-wallet entry of the statistics snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticItem {
    pub base_balance: f64,
    pub token_balance: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<Rank>,
}
