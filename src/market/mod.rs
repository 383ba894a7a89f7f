//! Market adapters
//!
//! One trait covers everything the scheduler needs from a venue: quotes,
//! fee price, balances and order submission. Two implementations exist:
//! - [`SimulatedAdapter`]: trades against a local [`PoolSimulator`](crate::pool::PoolSimulator)
//! - [`LiveAdapter`]: delegates to external transport, quote and balance collaborators
//!
//! The variant is chosen once when the engine is built.

pub mod live;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ExecutionError, ExecutionErrorKind, Result};
use crate::wallet::OrderKind;

pub use live::{BalanceSource, LiveAdapter, QuoteSource, TradeRequest, TradeTransport};
pub use simulated::SimulatedAdapter;

/// Error substrings that mean the order can simply be sent again
pub const TRANSIENT_ERRORS: &[&str] = &["Blockhash not found", "Node is behind by"];

/// Proof that an order was executed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub signature: String,
    pub kind: OrderKind,
    /// Amount given: base for buys, tokens for sells
    pub amount_in: f64,
    /// Amount received: tokens for buys, base for sells
    pub amount_out: f64,
}

/// A single order as handed to a venue
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSubmission<'a> {
    pub address: &'a str,
    pub kind: OrderKind,
    pub amount: f64,
    pub slippage_pct: f64,
    pub fee_price: f64,
}

/// Venue abstraction used by the scheduler and the fleet
#[async_trait]
pub trait MarketAdapter: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Tokens received for a base input at current reserves
    async fn token_output_for_base_input(&self, base_in: f64) -> Result<f64>;

    /// Base received for a token input at current reserves
    async fn base_output_for_token_input(&self, token_in: f64) -> Result<f64>;

    /// Spot price in base currency per token
    async fn current_price(&self) -> Result<f64>;

    /// Current network fee price
    async fn fee_price(&self) -> Result<f64>;

    async fn base_balance(&self, address: &str) -> Result<f64>;

    async fn token_balance(&self, address: &str) -> Result<f64>;

    /// Execute one order; failures come back already classified
    async fn submit(
        &self,
        order: &OrderSubmission<'_>,
    ) -> std::result::Result<TxReceipt, ExecutionError>;
}

/// Classify a raw venue error message
pub fn classify_error(message: &str) -> ExecutionErrorKind {
    if TRANSIENT_ERRORS.iter().any(|pattern| message.contains(pattern)) {
        return ExecutionErrorKind::Transient;
    }

    let lower = message.to_lowercase();
    if lower.contains("slippage") {
        ExecutionErrorKind::Slippage
    } else if lower.contains("insufficient") {
        ExecutionErrorKind::InsufficientFunds
    } else {
        ExecutionErrorKind::Rejected
    }
}
