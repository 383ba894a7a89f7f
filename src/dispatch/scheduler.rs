//! Sequential batch execution
//!
//! A batch runs one order at a time against the market adapter:
//! 1. Fee price check against the configured ceiling (skip when above)
//! 2. Balance check against the cached record (skip when short)
//! 3. Submission, resubmitting transient failures a bounded number of times
//! 4. Pacing sleep before the next order
//!
//! The fleet lock is held for the whole batch, so a second trigger waits for
//! the running batch instead of trading the same wallets concurrently.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::builder::OrderBuilder;
use super::order::{DispatchOptions, TradeIntent, TradeOrder};
use super::randomizer::Randomizer;
use super::report::BatchReport;
use crate::config::{Config, ConfigHandle, DispatchConfig};
use crate::error::{Error, ExecutionError, Result};
use crate::market::{MarketAdapter, OrderSubmission, TxReceipt};
use crate::wallet::{FleetTotals, OrderKind, WalletFleet};

/// Builds and executes trade batches for the fleet
pub struct Scheduler {
    market: Arc<dyn MarketAdapter>,
    config: ConfigHandle,
    fleet: Arc<Mutex<WalletFleet>>,
    rng: Mutex<Randomizer>,
}

impl Scheduler {
    pub fn new(
        market: Arc<dyn MarketAdapter>,
        config: ConfigHandle,
        fleet: WalletFleet,
        rng: Randomizer,
    ) -> Self {
        Self {
            market,
            config,
            fleet: Arc::new(Mutex::new(fleet)),
            rng: Mutex::new(rng),
        }
    }

    pub fn market(&self) -> Arc<dyn MarketAdapter> {
        self.market.clone()
    }

    pub fn fleet(&self) -> Arc<Mutex<WalletFleet>> {
        self.fleet.clone()
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    /// Build the orders for `intent` and execute them
    pub async fn build_and_dispatch(
        &self,
        intent: TradeIntent,
        options: DispatchOptions,
    ) -> Result<BatchReport> {
        let config = self.config.snapshot().await;
        let mut fleet = self.fleet.lock().await;
        if fleet.is_empty() {
            return Err(Error::EmptyFleet);
        }

        let orders = self.build_orders(&mut fleet, intent, &config).await?;
        info!("{}: {} orders", intent.name(), orders.len());

        let report = self
            .send_orders(&mut fleet, &orders, options, &config, intent.name())
            .await;
        Ok(report)
    }

    /// Execute an already built order list
    pub async fn dispatch(
        &self,
        orders: &[TradeOrder],
        options: DispatchOptions,
    ) -> Result<BatchReport> {
        let config = self.config.snapshot().await;
        let mut fleet = self.fleet.lock().await;
        if fleet.is_empty() {
            return Err(Error::EmptyFleet);
        }
        Ok(self
            .send_orders(&mut fleet, orders, options, &config, "orders")
            .await)
    }

    async fn build_orders(
        &self,
        fleet: &mut WalletFleet,
        intent: TradeIntent,
        config: &Config,
    ) -> Result<Vec<TradeOrder>> {
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let mut rng = self.rng.lock().await;

        let orders = match intent {
            TradeIntent::BuyAll => builder.full_fleet(fleet, OrderKind::Buy),
            TradeIntent::SellAll => builder.full_fleet(fleet, OrderKind::Sell),
            TradeIntent::SellPercent { percent, noise } => {
                let orders = builder.sell_percent(fleet, percent)?;
                if noise {
                    builder.add_noise(fleet, OrderKind::Sell, orders, &mut rng)
                } else {
                    orders
                }
            }
            TradeIntent::BuyAmount { amount, noise } => {
                let orders = builder.buy_amount(fleet, amount)?;
                if noise {
                    builder.add_noise(fleet, OrderKind::Buy, orders, &mut rng)
                } else {
                    orders
                }
            }
            TradeIntent::SlowSell { net_volume } => {
                if net_volume <= 0.0 {
                    return Ok(Vec::new());
                }
                let price = self.market.current_price().await?;
                builder.slow_sell(fleet, net_volume, price, &mut rng)?
            }
        };
        Ok(orders)
    }

    /// Execution loop; per-order failures are counted, never returned
    ///
    /// A buy needs cached base strictly above the amount so fees stay
    /// payable. A sell only needs the cached tokens to cover the amount:
    /// sell-all orders are exactly the whole balance.
    async fn send_orders(
        &self,
        fleet: &mut WalletFleet,
        orders: &[TradeOrder],
        options: DispatchOptions,
        config: &Config,
        intent: &str,
    ) -> BatchReport {
        let mut report = BatchReport::new(intent);
        let market = self.market.as_ref();

        for (i, order) in orders.iter().enumerate() {
            let Some(wallet) = fleet.get(order.wallet) else {
                warn!("Order for unknown wallet #{}", order.wallet);
                report.failed += 1;
                continue;
            };
            let address = wallet.address.clone();
            let short = wallet.short().to_string();
            let (cached_base, cached_token) = (wallet.base_balance, wallet.token_balance);

            let fee_price = match market.fee_price().await {
                Ok(price) => price,
                Err(e) => {
                    warn!("Fee price unavailable, {} {} not sent: {}", order.kind, short, e);
                    report.failed += 1;
                    continue;
                }
            };
            if fee_price > config.dispatch.fee_price_ceiling {
                info!(
                    "fee price {} above {}, skipping {} {}",
                    fee_price, config.dispatch.fee_price_ceiling, order.kind, short
                );
                report.skipped_fee_price += 1;
                continue;
            }

            let available = match order.kind {
                OrderKind::Buy => cached_base,
                OrderKind::Sell if cached_token > 0.0 => cached_token,
                OrderKind::Sell => match fleet.get_mut(order.wallet) {
                    Some(record) => record.refresh_token_balance(market).await,
                    None => 0.0,
                },
            };
            let covered = match order.kind {
                OrderKind::Buy => available > order.amount,
                OrderKind::Sell => available >= order.amount,
            };
            if !covered {
                warn!(
                    "{} {} {}: only {} available, skipping",
                    order.kind, short, order.amount, available
                );
                report.skipped_balance += 1;
                continue;
            }

            report.record_attempt(order.kind);
            let submission = OrderSubmission {
                address: &address,
                kind: order.kind,
                amount: order.amount,
                slippage_pct: config.dispatch.slippage_pct,
                fee_price,
            };

            let (result, retries) = self.submit_with_retry(&submission, &config.dispatch).await;
            report.retries += retries;

            match result {
                Ok(receipt) => {
                    report.record_success(order.kind, order.amount);
                    if let Some(record) = fleet.get_mut(order.wallet) {
                        match order.kind {
                            OrderKind::Buy => record.base_balance -= order.amount,
                            OrderKind::Sell => record.token_balance -= order.amount,
                        }
                    }
                    let unit = match order.kind {
                        OrderKind::Buy => "base",
                        OrderKind::Sell => "tokens",
                    };
                    info!(
                        "{} {} {} {}, tx: {}",
                        order.kind, short, order.amount, unit, receipt.signature
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("{} {} {} failed: {}", order.kind, short, order.amount, e);
                }
            }

            if i + 1 < orders.len() {
                let pause = if options.random_sleep {
                    self.rng
                        .lock()
                        .await
                        .jitter_sleep(config.pacing.min_sleep_secs, config.pacing.max_sleep_secs)
                } else {
                    Duration::from_millis(config.pacing.rpc_send_tx_sleep_ms)
                };
                debug!("sleeping {:?}", pause);
                sleep(pause).await;
            }
        }

        if options.update_balances {
            let touched: Vec<usize> = orders.iter().map(|o| o.wallet).collect();
            let delay = Duration::from_millis(config.pacing.rpc_req_sleep_ms);
            if fleet.reconcile(&touched, market, delay).await > 0 {
                report.totals = Some(fleet.totals());
            }
        }

        if report.tokens_sold > 0.0 {
            match market.current_price().await {
                Ok(price) => report.base_received = price * report.tokens_sold,
                Err(e) => warn!("Token price unavailable for report: {}", e),
            }
        }

        report.log();
        report
    }

    /// Submit, resubmitting transient failures up to `error_max_tries` times
    async fn submit_with_retry(
        &self,
        order: &OrderSubmission<'_>,
        dispatch: &DispatchConfig,
    ) -> (std::result::Result<TxReceipt, ExecutionError>, usize) {
        let mut retries = 0;
        loop {
            match self.market.submit(order).await {
                Ok(receipt) => return (Ok(receipt), retries),
                Err(e) if e.is_transient() && retries < dispatch.error_max_tries as usize => {
                    retries += 1;
                    warn!(
                        "Retryable error for {}: {} ({}/{})",
                        order.address, e, retries, dispatch.error_max_tries
                    );
                    sleep(Duration::from_millis(dispatch.error_sleep_ms)).await;
                }
                Err(e) => return (Err(e), retries),
            }
        }
    }

    /// Refresh every wallet from the market and return fleet totals
    pub async fn report_aggregate_balances(&self) -> FleetTotals {
        let config = self.config.snapshot().await;
        let delay = Duration::from_millis(config.pacing.rpc_req_sleep_ms);
        let mut fleet = self.fleet.lock().await;
        fleet.refresh_all(self.market.as_ref(), delay).await
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionErrorKind;
    use crate::market::SimulatedAdapter;
    use crate::pool::PoolSimulator;
    use crate::wallet::WalletRecord;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Venue double with fixed balances and a scripted submission outcome
    struct ScriptedMarket {
        fee_price: f64,
        balances: HashMap<String, (f64, f64)>,
        failure: Option<ExecutionErrorKind>,
        submissions: AtomicUsize,
        balance_queries: AtomicUsize,
    }

    impl ScriptedMarket {
        fn new(failure: Option<ExecutionErrorKind>) -> Self {
            Self {
                fee_price: 1.0,
                balances: HashMap::new(),
                failure,
                submissions: AtomicUsize::new(0),
                balance_queries: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketAdapter for ScriptedMarket {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn token_output_for_base_input(&self, base_in: f64) -> Result<f64> {
            Ok(base_in * 1_000.0)
        }
        async fn base_output_for_token_input(&self, token_in: f64) -> Result<f64> {
            Ok(token_in / 1_000.0)
        }
        async fn current_price(&self) -> Result<f64> {
            Ok(0.001)
        }
        async fn fee_price(&self) -> Result<f64> {
            Ok(self.fee_price)
        }
        async fn base_balance(&self, address: &str) -> Result<f64> {
            self.balance_queries.fetch_add(1, Ordering::SeqCst);
            Ok(self.balances.get(address).map(|b| b.0).unwrap_or(0.0))
        }
        async fn token_balance(&self, address: &str) -> Result<f64> {
            Ok(self.balances.get(address).map(|b| b.1).unwrap_or(0.0))
        }
        async fn submit(
            &self,
            order: &OrderSubmission<'_>,
        ) -> std::result::Result<TxReceipt, ExecutionError> {
            self.submissions.fetch_add(1, Ordering::SeqCst);
            match self.failure {
                Some(kind) => Err(ExecutionError::new(kind, "scripted failure")),
                None => Ok(TxReceipt {
                    signature: "sig".to_string(),
                    kind: order.kind,
                    amount_in: order.amount,
                    amount_out: order.amount,
                }),
            }
        }
    }

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.pacing.min_sleep_secs = 0.0;
        config.pacing.max_sleep_secs = 0.0;
        config.pacing.rpc_req_sleep_ms = 0;
        config.pacing.rpc_send_tx_sleep_ms = 0;
        config
    }

    fn scheduler(market: Arc<dyn MarketAdapter>, config: Config, wallets: Vec<WalletRecord>) -> Scheduler {
        Scheduler::new(
            market,
            ConfigHandle::new(config),
            WalletFleet::new(wallets),
            Randomizer::seeded(17),
        )
    }

    const NO_RECONCILE: DispatchOptions = DispatchOptions {
        update_balances: false,
        random_sleep: false,
    };

    #[tokio::test]
    async fn test_transient_failures_retry_up_to_limit() {
        let market = Arc::new(ScriptedMarket::new(Some(ExecutionErrorKind::Transient)));
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![WalletRecord::with_balances("w0", 1.0, 0.0)],
        );

        let report = sched
            .dispatch(&[TradeOrder::buy(0, 0.5)], NO_RECONCILE)
            .await
            .unwrap();

        assert_eq!(market.submissions.load(Ordering::SeqCst), 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.retries, 3);
        assert_eq!(report.buys_succeeded, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let market = Arc::new(ScriptedMarket::new(Some(ExecutionErrorKind::Slippage)));
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![
                WalletRecord::with_balances("w0", 1.0, 0.0),
                WalletRecord::with_balances("w1", 1.0, 0.0),
            ],
        );

        let report = sched
            .dispatch(&[TradeOrder::buy(0, 0.5), TradeOrder::buy(1, 0.5)], NO_RECONCILE)
            .await
            .unwrap();

        // One failure does not stop the batch
        assert_eq!(market.submissions.load(Ordering::SeqCst), 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.retries, 0);
    }

    #[tokio::test]
    async fn test_fee_price_above_ceiling_skips() {
        let mut market = ScriptedMarket::new(None);
        market.fee_price = 100.0;
        let market = Arc::new(market);
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![WalletRecord::with_balances("w0", 1.0, 0.0)],
        );

        let report = sched
            .dispatch(&[TradeOrder::buy(0, 0.5)], NO_RECONCILE)
            .await
            .unwrap();

        assert_eq!(market.submissions.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped_fee_price, 1);
        assert_eq!(report.attempted(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_skips() {
        let market = Arc::new(ScriptedMarket::new(None));
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![WalletRecord::with_balances("w0", 0.5, 10.0)],
        );

        let orders = [TradeOrder::buy(0, 0.5), TradeOrder::sell(0, 10.5)];
        let report = sched.dispatch(&orders, NO_RECONCILE).await.unwrap();

        assert_eq!(market.submissions.load(Ordering::SeqCst), 0);
        assert_eq!(report.skipped_balance, 2);
    }

    #[tokio::test]
    async fn test_sell_of_whole_balance_goes_through() {
        let market = Arc::new(ScriptedMarket::new(None));
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![WalletRecord::with_balances("w0", 0.5, 40.0)],
        );

        let report = sched
            .build_and_dispatch(TradeIntent::SellAll, NO_RECONCILE)
            .await
            .unwrap();

        assert_eq!(report.sells_succeeded, 1);
        assert_eq!(report.tokens_sold, 40.0);
        assert!((report.base_received - 0.04).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_zero_token_cache_is_requeried() {
        let mut market = ScriptedMarket::new(None);
        market.balances.insert("w0".to_string(), (0.5, 100.0));
        let market = Arc::new(market);
        let sched = scheduler(market.clone(), quiet_config(), vec![WalletRecord::new("w0")]);

        let report = sched
            .dispatch(&[TradeOrder::sell(0, 60.0)], NO_RECONCILE)
            .await
            .unwrap();

        assert_eq!(report.sells_succeeded, 1);
        let fleet = sched.fleet();
        let fleet = fleet.lock().await;
        assert_eq!(fleet.wallets()[0].token_balance, 40.0);
    }

    #[tokio::test]
    async fn test_optimistic_cache_limits_later_chunks() {
        let market = Arc::new(ScriptedMarket::new(None));
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![WalletRecord::with_balances("w0", 0.5, 30.0)],
        );

        let orders = [TradeOrder::sell(0, 20.0), TradeOrder::sell(0, 20.0)];
        let report = sched.dispatch(&orders, NO_RECONCILE).await.unwrap();

        assert_eq!(report.sells_succeeded, 1);
        assert_eq!(report.skipped_balance, 1);
    }

    #[tokio::test]
    async fn test_reconcile_refreshes_each_touched_wallet_once() {
        let mut market = ScriptedMarket::new(None);
        market.balances.insert("w0".to_string(), (0.5, 10.0));
        market.balances.insert("w1".to_string(), (0.5, 20.0));
        let market = Arc::new(market);
        let sched = scheduler(
            market.clone(),
            quiet_config(),
            vec![
                WalletRecord::with_balances("w0", 0.5, 30.0),
                WalletRecord::with_balances("w1", 0.5, 30.0),
                WalletRecord::with_balances("w2", 0.5, 30.0),
            ],
        );
        let options = DispatchOptions {
            update_balances: true,
            random_sleep: false,
        };

        let orders = [
            TradeOrder::sell(0, 10.0),
            TradeOrder::sell(0, 10.0),
            TradeOrder::sell(1, 10.0),
        ];
        let report = sched.dispatch(&orders, options).await.unwrap();

        assert_eq!(report.sells_succeeded, 3);
        assert_eq!(market.balance_queries.load(Ordering::SeqCst), 2);
        let fleet = sched.fleet();
        let fleet = fleet.lock().await;
        assert_eq!(fleet.wallets()[0].token_balance, 10.0);
        assert_eq!(fleet.wallets()[1].token_balance, 20.0);
        // Untouched wallet keeps its cache
        assert_eq!(fleet.wallets()[2].token_balance, 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_pacing_only_between_sent_orders() {
        let mut config = quiet_config();
        config.pacing.rpc_send_tx_sleep_ms = 500;
        let market = Arc::new(ScriptedMarket::new(None));
        let wallets = || -> Vec<WalletRecord> {
            (0..3)
                .map(|i| WalletRecord::with_balances(format!("w{}", i), 1.0, 0.0))
                .collect()
        };

        // Sleep after the first order only, none after the final one
        let sched = scheduler(market.clone(), config.clone(), wallets());
        let start = tokio::time::Instant::now();
        sched
            .dispatch(&[TradeOrder::buy(0, 0.5), TradeOrder::buy(1, 0.5)], NO_RECONCILE)
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));

        // The skipped middle order adds no pause of its own
        let sched = scheduler(market.clone(), config, wallets());
        let start = tokio::time::Instant::now();
        let report = sched
            .dispatch(
                &[
                    TradeOrder::buy(0, 0.5),
                    TradeOrder::buy(1, 5.0),
                    TradeOrder::buy(2, 0.5),
                ],
                NO_RECONCILE,
            )
            .await
            .unwrap();
        let elapsed = start.elapsed();
        assert_eq!(report.skipped_balance, 1);
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(510));
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_pacing_within_range() {
        let mut config = quiet_config();
        config.pacing.min_sleep_secs = 2.0;
        config.pacing.max_sleep_secs = 4.0;
        config.pacing.rpc_send_tx_sleep_ms = 100_000;
        let market = Arc::new(ScriptedMarket::new(None));
        let sched = scheduler(
            market.clone(),
            config,
            (0..3)
                .map(|i| WalletRecord::with_balances(format!("w{}", i), 1.0, 0.0))
                .collect(),
        );
        let options = DispatchOptions {
            update_balances: false,
            random_sleep: true,
        };

        let start = tokio::time::Instant::now();
        let orders: Vec<_> = (0..3).map(|i| TradeOrder::buy(i, 0.5)).collect();
        sched.dispatch(&orders, options).await.unwrap();
        let elapsed = start.elapsed();

        // Two pauses of 2-4s each; the fixed delay is not used
        assert!(elapsed >= Duration::from_secs(4));
        assert!(elapsed <= Duration::from_millis(8_010));
    }

    #[tokio::test]
    async fn test_empty_fleet_is_batch_error() {
        let market = Arc::new(ScriptedMarket::new(None));
        let sched = scheduler(market, quiet_config(), Vec::new());

        let result = sched
            .build_and_dispatch(TradeIntent::BuyAll, DispatchOptions::default())
            .await;
        assert!(matches!(result, Err(Error::EmptyFleet)));
    }

    async fn simulated(wallets: usize) -> (Scheduler, Arc<SimulatedAdapter>) {
        let pool = PoolSimulator::new(1_000_000.0, 100.0, 9).unwrap();
        let market = Arc::new(SimulatedAdapter::new(Arc::new(Mutex::new(pool)), 0.0, 1.0));
        let mut addresses = Vec::new();
        for i in 0..wallets {
            let address = format!("sim-{}", i);
            market.fund(&address, 1.0).await.unwrap();
            addresses.push(address);
        }

        let mut fleet = WalletFleet::from_addresses(addresses);
        fleet.initialize(market.as_ref(), Duration::ZERO).await;

        let sched = Scheduler::new(
            market.clone(),
            ConfigHandle::new(quiet_config()),
            fleet,
            Randomizer::seeded(3),
        );
        (sched, market)
    }

    #[tokio::test]
    async fn test_buy_all_then_reconcile_matches_pool() {
        let (sched, market) = simulated(3).await;
        let options = DispatchOptions {
            update_balances: true,
            random_sleep: false,
        };

        let report = sched.build_and_dispatch(TradeIntent::BuyAll, options).await.unwrap();
        assert_eq!(report.buys_succeeded, 3);

        let totals = report.totals.unwrap();
        let pool = market.pool();
        let pool = pool.lock().await;
        assert!((totals.total_token - pool.total_held_tokens()).abs() < 1e-6);
        assert!((totals.total_base - 0.03).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let (sched, _market) = simulated(4).await;
        sched
            .build_and_dispatch(TradeIntent::BuyAll, NO_RECONCILE)
            .await
            .unwrap();

        let first = sched.report_aggregate_balances().await;
        let cached: Vec<WalletRecord> = sched.fleet().lock().await.wallets().to_vec();
        let second = sched.report_aggregate_balances().await;

        assert_eq!(first, second);
        assert_eq!(sched.fleet().lock().await.wallets(), cached.as_slice());
    }

    #[tokio::test]
    async fn test_slow_sell_without_volume_sends_nothing() {
        let (sched, _market) = simulated(2).await;
        let report = sched
            .build_and_dispatch(TradeIntent::SlowSell { net_volume: 0.0 }, NO_RECONCILE)
            .await
            .unwrap();
        assert_eq!(report.orders(), 0);
    }
}
