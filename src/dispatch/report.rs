//! Batch outcome summary

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::pool::price::round;
use crate::wallet::{FleetTotals, OrderKind};

/// Counters for one executed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub intent: String,
    pub buys_attempted: usize,
    pub buys_succeeded: usize,
    pub sells_attempted: usize,
    pub sells_succeeded: usize,
    /// Orders skipped because the fee price was above the ceiling
    pub skipped_fee_price: usize,
    /// Orders skipped because the cached balance did not cover them
    pub skipped_balance: usize,
    pub failed: usize,
    /// Submissions beyond the first, across all orders
    pub retries: usize,
    pub base_spent: f64,
    pub tokens_sold: f64,
    /// Tokens sold valued at the price after the batch
    pub base_received: f64,
    /// Fleet totals after reconciliation
    pub totals: Option<FleetTotals>,
}

impl BatchReport {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Default::default()
        }
    }

    pub fn orders(&self) -> usize {
        self.buys_attempted + self.sells_attempted + self.skipped()
    }

    pub fn skipped(&self) -> usize {
        self.skipped_fee_price + self.skipped_balance
    }

    pub fn succeeded(&self) -> usize {
        self.buys_succeeded + self.sells_succeeded
    }

    pub fn attempted(&self) -> usize {
        self.buys_attempted + self.sells_attempted
    }

    /// Share of all orders that went through, 1.0 for an empty batch
    pub fn success_rate(&self) -> f64 {
        let orders = self.orders();
        if orders == 0 {
            1.0
        } else {
            self.succeeded() as f64 / orders as f64
        }
    }

    pub(crate) fn record_attempt(&mut self, kind: OrderKind) {
        match kind {
            OrderKind::Buy => self.buys_attempted += 1,
            OrderKind::Sell => self.sells_attempted += 1,
        }
    }

    pub(crate) fn record_success(&mut self, kind: OrderKind, amount: f64) {
        match kind {
            OrderKind::Buy => {
                self.buys_succeeded += 1;
                self.base_spent += amount;
            }
            OrderKind::Sell => {
                self.sells_succeeded += 1;
                self.tokens_sold += amount;
            }
        }
    }

    pub fn log(&self) {
        info!(
            "[{}] success rate: {}/{} ({:.0}%)",
            self.intent,
            self.succeeded(),
            self.orders(),
            self.success_rate() * 100.0
        );
        info!(
            "  buys: {}/{}, sells: {}/{}, skipped: {} fee / {} balance, failed: {}, retries: {}",
            self.buys_succeeded,
            self.buys_attempted,
            self.sells_succeeded,
            self.sells_attempted,
            self.skipped_fee_price,
            self.skipped_balance,
            self.failed,
            self.retries
        );
        info!(
            "  base spent: {}, tokens sold: {} (~{} base)",
            round(self.base_spent, 4),
            round(self.tokens_sold, 0),
            round(self.base_received, 4)
        );
        if let Some(totals) = self.totals {
            info!(
                "  cum base balance: {}, cum token balance: {}",
                round(totals.total_base, 4),
                round(totals.total_token, 0)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_counts_skips() {
        let mut report = BatchReport::new("test");
        report.record_attempt(OrderKind::Buy);
        report.record_success(OrderKind::Buy, 0.5);
        report.record_attempt(OrderKind::Sell);
        report.failed += 1;
        report.skipped_balance += 2;

        assert_eq!(report.orders(), 4);
        assert_eq!(report.success_rate(), 0.25);
        assert_eq!(report.base_spent, 0.5);
    }

    #[test]
    fn test_empty_batch() {
        assert_eq!(BatchReport::new("empty").success_rate(), 1.0);
    }
}
