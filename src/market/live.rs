//! Market adapter for a live venue
//!
//! Transaction building, signing and node communication live outside this
//! crate. The adapter composes three collaborators and turns their raw error
//! messages into typed [`ExecutionError`]s, so the scheduler never parses
//! strings itself.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{classify_error, MarketAdapter, OrderSubmission, TxReceipt};
use crate::error::{ExecutionError, Result};
use crate::pool::price::min_output_with_slippage;
use crate::wallet::OrderKind;

/// Prepared order handed to the external transport
#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub address: String,
    pub kind: OrderKind,
    /// Base for buys, tokens for sells
    pub amount: f64,
    /// Minimum acceptable output after slippage
    pub min_out: f64,
    pub fee_price: f64,
}

/// Submits prepared orders to the venue; must be safe to call again with the same request
#[async_trait]
pub trait TradeTransport: Send + Sync {
    async fn submit(&self, request: &TradeRequest) -> std::result::Result<TxReceipt, String>;
}

/// Quotes and prices from the venue
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn token_output_for_base_input(&self, base_in: f64) -> Result<f64>;
    async fn base_output_for_token_input(&self, token_in: f64) -> Result<f64>;
    async fn current_price(&self) -> Result<f64>;
    async fn fee_price(&self) -> Result<f64>;
}

/// Balance lookups against a remote node
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn base_balance(&self, address: &str) -> Result<f64>;
    async fn token_balance(&self, address: &str) -> Result<f64>;
}

/// Adapter over external collaborators
pub struct LiveAdapter {
    transport: Arc<dyn TradeTransport>,
    quotes: Arc<dyn QuoteSource>,
    balances: Arc<dyn BalanceSource>,
}

impl LiveAdapter {
    pub fn new(
        transport: Arc<dyn TradeTransport>,
        quotes: Arc<dyn QuoteSource>,
        balances: Arc<dyn BalanceSource>,
    ) -> Self {
        Self {
            transport,
            quotes,
            balances,
        }
    }
}

#[async_trait]
impl MarketAdapter for LiveAdapter {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn token_output_for_base_input(&self, base_in: f64) -> Result<f64> {
        self.quotes.token_output_for_base_input(base_in).await
    }

    async fn base_output_for_token_input(&self, token_in: f64) -> Result<f64> {
        self.quotes.base_output_for_token_input(token_in).await
    }

    async fn current_price(&self) -> Result<f64> {
        self.quotes.current_price().await
    }

    async fn fee_price(&self) -> Result<f64> {
        self.quotes.fee_price().await
    }

    async fn base_balance(&self, address: &str) -> Result<f64> {
        self.balances.base_balance(address).await
    }

    async fn token_balance(&self, address: &str) -> Result<f64> {
        self.balances.token_balance(address).await
    }

    async fn submit(
        &self,
        order: &OrderSubmission<'_>,
    ) -> std::result::Result<TxReceipt, ExecutionError> {
        // Quote fresh on every attempt so a resubmission uses current reserves
        let expected = match order.kind {
            OrderKind::Buy => self.quotes.token_output_for_base_input(order.amount).await?,
            OrderKind::Sell => self.quotes.base_output_for_token_input(order.amount).await?,
        };

        let request = TradeRequest {
            address: order.address.to_string(),
            kind: order.kind,
            amount: order.amount,
            min_out: min_output_with_slippage(expected, order.slippage_pct),
            fee_price: order.fee_price,
        };
        debug!("Submitting {:?}", request);

        self.transport
            .submit(&request)
            .await
            .map_err(|message| ExecutionError::new(classify_error(&message), message))
    }
}
