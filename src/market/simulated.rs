//! Market adapter backed by the local pool simulator

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use super::{MarketAdapter, OrderSubmission, TxReceipt};
use crate::error::{Error, ExecutionError, Result};
use crate::monitor::SwapEvent;
use crate::pool::price::min_output_with_slippage;
use crate::pool::PoolSimulator;
use crate::wallet::OrderKind;

/// Trades against a shared [`PoolSimulator`]
pub struct SimulatedAdapter {
    pool: Arc<Mutex<PoolSimulator>>,
    tx_fee: f64,
    fee_price: f64,
    events: Option<mpsc::Sender<SwapEvent>>,
}

impl SimulatedAdapter {
    pub fn new(pool: Arc<Mutex<PoolSimulator>>, tx_fee: f64, fee_price: f64) -> Self {
        Self {
            pool,
            tx_fee,
            fee_price,
            events: None,
        }
    }

    /// Publish a swap event for every executed trade
    pub fn with_event_sink(mut self, events: mpsc::Sender<SwapEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Shared simulator handle
    pub fn pool(&self) -> Arc<Mutex<PoolSimulator>> {
        self.pool.clone()
    }

    /// Fund an address with base currency
    pub async fn fund(&self, address: &str, amount: f64) -> Result<()> {
        self.pool.lock().await.deposit_base(address, amount)
    }

    fn publish(&self, receipt: &TxReceipt, address: &str) {
        let Some(events) = &self.events else {
            return;
        };

        let event = SwapEvent {
            amount_in: receipt.amount_in,
            amount_out: receipt.amount_out,
            is_buy: receipt.kind == OrderKind::Buy,
            counterparty: address.to_string(),
            timestamp: chrono::Utc::now(),
        };

        if let Err(e) = events.try_send(event) {
            warn!("Dropping simulated swap event: {}", e);
        }
    }
}

#[async_trait]
impl MarketAdapter for SimulatedAdapter {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn token_output_for_base_input(&self, base_in: f64) -> Result<f64> {
        Ok(self.pool.lock().await.token_output_for_base_input(base_in))
    }

    async fn base_output_for_token_input(&self, token_in: f64) -> Result<f64> {
        Ok(self.pool.lock().await.base_output_for_token_input(token_in))
    }

    async fn current_price(&self) -> Result<f64> {
        Ok(self.pool.lock().await.current_price())
    }

    async fn fee_price(&self) -> Result<f64> {
        Ok(self.fee_price)
    }

    async fn base_balance(&self, address: &str) -> Result<f64> {
        Ok(self.pool.lock().await.address_holdings(address).base_balance)
    }

    async fn token_balance(&self, address: &str) -> Result<f64> {
        Ok(self.pool.lock().await.address_holdings(address).token_balance)
    }

    async fn submit(
        &self,
        order: &OrderSubmission<'_>,
    ) -> std::result::Result<TxReceipt, ExecutionError> {
        let mut pool = self.pool.lock().await;

        let amount_out = match order.kind {
            OrderKind::Buy => {
                let expected = pool.token_output_for_base_input(order.amount);
                let min_out = min_output_with_slippage(expected, order.slippage_pct);
                pool.buy(order.address, order.amount, min_out, self.tx_fee)?
            }
            OrderKind::Sell => {
                let expected = pool.base_output_for_token_input(order.amount);
                let min_out = min_output_with_slippage(expected, order.slippage_pct);
                pool.sell(order.address, order.amount, min_out, self.tx_fee)?
            }
        };
        drop(pool);

        if amount_out <= 0.0 {
            return Err(Error::InvalidAmount(format!(
                "{} of {} produced no output",
                order.kind, order.amount
            ))
            .into());
        }

        let receipt = TxReceipt {
            signature: format!("sim_{}", uuid::Uuid::new_v4().simple()),
            kind: order.kind,
            amount_in: order.amount,
            amount_out,
        };
        debug!("{} {} -> {}", receipt.signature, order.kind, amount_out);

        self.publish(&receipt, order.address);
        Ok(receipt)
    }
}
