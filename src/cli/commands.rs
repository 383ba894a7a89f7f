//! CLI command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{BatchReport, DispatchOptions, Randomizer, TradeIntent};
use crate::engine::FleetEngine;
use crate::market::SimulatedAdapter;
use crate::monitor::{ChannelFeed, SwapEvent};
use crate::pool::price::format_price;
use crate::pool::PoolSimulator;
use crate::wallet::WalletFleet;

/// Capacity of the simulated swap event channel
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Engine plus the swap events its simulated market publishes
pub struct SimulatedSession {
    pub engine: Arc<FleetEngine>,
    pub market: Arc<SimulatedAdapter>,
    pub events: mpsc::Receiver<SwapEvent>,
    state_path: Option<String>,
}

impl SimulatedSession {
    /// Write the pool and holdings so the next command resumes from them
    pub async fn persist(&self) -> Result<()> {
        save_pool(&self.market, self.state_path.as_deref()).await
    }
}

async fn save_pool(market: &SimulatedAdapter, state_path: Option<&str>) -> Result<()> {
    let Some(path) = state_path else {
        return Ok(());
    };
    let pool = market.pool();
    let pool = pool.lock().await;
    pool.save(path)
        .await
        .with_context(|| format!("Failed to save simulated pool to {}", path))
}

/// Build an engine over the saved simulated pool, or a freshly seeded one
///
/// Wallets the pool has not seen before are funded with
/// `market.sim_wallet_funding`; known wallets keep their balances.
pub async fn simulated_session(config: &Config) -> Result<SimulatedSession> {
    if !config.market.simulation {
        anyhow::bail!(
            "market.simulation is false: live trading needs an external transport, \
             quote and balance source wired through market::LiveAdapter"
        );
    }

    let market_cfg = &config.market;
    let state_path = (!market_cfg.sim_state_path.is_empty())
        .then(|| market_cfg.sim_state_path.clone());
    let saved = match &state_path {
        Some(path) => PoolSimulator::load(path)
            .await
            .with_context(|| format!("Failed to load simulated pool from {}", path))?,
        None => None,
    };
    let pool = match saved {
        Some(pool) => pool,
        None => PoolSimulator::new(
            market_cfg.sim_token_reserve,
            market_cfg.sim_base_reserve,
            market_cfg.sim_decimals,
        )
        .context("Failed to create simulated pool")?,
    };

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let market = Arc::new(
        SimulatedAdapter::new(
            Arc::new(Mutex::new(pool)),
            market_cfg.sim_tx_fee,
            market_cfg.sim_fee_price,
        )
        .with_event_sink(tx),
    );

    let addresses = match &market_cfg.wallets_path {
        Some(path) => WalletFleet::load_addresses(path)
            .await
            .with_context(|| format!("Failed to load wallets from {}", path))?,
        None => (0..market_cfg.sim_wallet_count)
            .map(|i| format!("sim-wallet-{}", i))
            .collect(),
    };
    let mut funded = 0;
    for address in &addresses {
        if market.pool().lock().await.contains(address) {
            continue;
        }
        market.fund(address, market_cfg.sim_wallet_funding).await?;
        funded += 1;
    }
    let state = market.pool().lock().await.pool_state();
    info!(
        "Simulated pool: {} tokens / {} base, {} wallets ({} newly funded)",
        state.token_reserve,
        state.base_reserve,
        addresses.len(),
        funded
    );

    let mut fleet = WalletFleet::from_addresses(addresses);
    fleet
        .initialize(
            market.as_ref(),
            Duration::from_millis(config.pacing.rpc_req_sleep_ms),
        )
        .await;
    fleet.assign_ranks();

    let engine = Arc::new(FleetEngine::new(
        market.clone(),
        config.clone(),
        fleet,
        Randomizer::from_entropy(),
    ));

    Ok(SimulatedSession {
        engine,
        market,
        events: rx,
        state_path,
    })
}

/// Show fleet balances, ranks and pool price
pub async fn status(config: &Config) -> Result<()> {
    let session = simulated_session(config).await?;
    print_status(&session).await
}

async fn print_status(session: &SimulatedSession) -> Result<()> {
    let fleet = session.engine.scheduler().fleet();
    let mut fleet = fleet.lock().await;
    fleet.log_status();

    for (rank, count) in fleet.rank_counts() {
        info!("  {}: {} wallets", rank, count);
    }

    let pool = session.market.pool();
    let state = pool.lock().await.pool_state();
    info!(
        "Pool: {} tokens / {} base, price {}",
        state.token_reserve,
        state.base_reserve,
        format_price(state.price())
    );

    if let Err(e) = fleet.last_wallet_balance(session.market.as_ref()).await {
        warn!("Last wallet unavailable: {}", e);
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}

/// Run one batch for `intent` and print the fleet afterwards
pub async fn trade(config: &Config, intent: TradeIntent, options: DispatchOptions) -> Result<()> {
    let session = simulated_session(config).await?;
    let report = session
        .engine
        .build_and_dispatch(intent, options)
        .await
        .with_context(|| format!("{} batch failed", intent.name()))?;

    finish_batch(&session, &report).await
}

async fn finish_batch(session: &SimulatedSession, report: &BatchReport) -> Result<()> {
    if report.orders() == 0 {
        warn!("No wallet qualified for this batch");
    }
    session.persist().await?;
    print_status(session).await
}

/// Sell back part of the net buy volume
///
/// `volume` overrides the monitored value. With `watch`, simulated swaps feed
/// the monitor and slow-sell rounds run every `slow_sell.interval_secs`
/// until Ctrl+C.
pub async fn slow_sell(
    config: &Config,
    volume: Option<f64>,
    watch: bool,
    options: DispatchOptions,
) -> Result<()> {
    let session = simulated_session(config).await?;

    if !watch {
        let report = match volume {
            Some(net_volume) => Some(
                session
                    .engine
                    .build_and_dispatch(TradeIntent::SlowSell { net_volume }, options)
                    .await?,
            ),
            None => session.engine.slow_sell_tick(options).await?,
        };
        return match report {
            Some(report) => finish_batch(&session, &report).await,
            None => {
                info!("No positive net volume, nothing to sell");
                Ok(())
            }
        };
    }

    let SimulatedSession {
        engine,
        market,
        events,
        state_path,
    } = session;

    if let Some(net_volume) = volume {
        engine
            .on_new_swap_event(SwapEvent {
                amount_in: 0.0,
                amount_out: net_volume,
                is_buy: true,
                counterparty: "cli".to_string(),
                timestamp: chrono::Utc::now(),
            })
            .await;
    }

    let mut enabled = (*engine.config().snapshot().await).clone();
    enabled.slow_sell.enabled = true;
    engine.reload_config(enabled).await?;

    let monitor = engine.spawn_monitor(ChannelFeed::new(events));
    let seller = engine.spawn_slow_sell_loop(options);
    info!(
        "Slow-selling every {}s, press Ctrl+C to stop",
        config.slow_sell.interval_secs
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutting down...");

    seller.abort();
    monitor.abort();
    let _ = seller.await;

    save_pool(&market, state_path.as_deref()).await
}

/// Refresh every wallet and write the statistics snapshot
pub async fn statistics(config: &Config, output: Option<String>) -> Result<()> {
    let session = simulated_session(config).await?;
    let totals = session.engine.report_aggregate_balances().await;

    let path = output.unwrap_or_else(|| config.dispatch.statistics_path.clone());
    let fleet = session.engine.scheduler().fleet();
    fleet
        .lock()
        .await
        .save_statistics(&path)
        .await
        .with_context(|| format!("Failed to write statistics to {}", path))?;

    println!(
        "Fleet: {:.4} base, {:.0} tokens -> {}",
        totals.total_base, totals.total_token, path
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> Config {
        let mut config = Config::default();
        config.market.sim_wallet_count = 4;
        config.market.sim_state_path = String::new();
        config.pacing.min_sleep_secs = 0.0;
        config.pacing.max_sleep_secs = 0.0;
        config.pacing.rpc_req_sleep_ms = 0;
        config.pacing.rpc_send_tx_sleep_ms = 0;
        config
    }

    #[tokio::test]
    async fn test_session_funds_generated_wallets() {
        let session = simulated_session(&quiet_config()).await.unwrap();
        let fleet = session.engine.scheduler().fleet();
        let fleet = fleet.lock().await;

        assert_eq!(fleet.len(), 4);
        assert!(fleet.wallets().iter().all(|w| w.base_balance == 1.0));
        assert!(fleet.wallets().iter().all(|w| w.rank.is_some()));
    }

    #[tokio::test]
    async fn test_session_publishes_trades() {
        let mut session = simulated_session(&quiet_config()).await.unwrap();
        let report = session
            .engine
            .build_and_dispatch(
                TradeIntent::BuyAmount {
                    amount: 0.5,
                    noise: false,
                },
                DispatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.buys_succeeded, 1);
        let event = session.events.try_recv().unwrap();
        assert!(event.is_buy);
    }

    #[tokio::test]
    async fn test_live_mode_is_refused() {
        let mut config = quiet_config();
        config.market.simulation = false;
        assert!(simulated_session(&config).await.is_err());
    }

    async fn saved_pool(path: &std::path::Path) -> PoolSimulator {
        PoolSimulator::load(path).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sell_all_sells_what_an_earlier_run_bought() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("sim_state.json");
        let mut config = quiet_config();
        config.market.sim_state_path = state.to_string_lossy().into_owned();

        trade(&config, TradeIntent::BuyAll, DispatchOptions::default())
            .await
            .unwrap();
        let after_buy = saved_pool(&state).await;
        assert!(after_buy.total_held_tokens() > 0.0);

        // A new session resumes the saved wallets instead of funding them again
        let session = simulated_session(&config).await.unwrap();
        {
            let fleet = session.engine.scheduler().fleet();
            let fleet = fleet.lock().await;
            assert!(fleet.wallets().iter().all(|w| w.token_balance > 0.0));
            assert!(fleet.wallets().iter().all(|w| w.base_balance < 0.5));
        }
        drop(session);

        trade(&config, TradeIntent::SellAll, DispatchOptions::default())
            .await
            .unwrap();
        let after_sell = saved_pool(&state).await;
        assert_eq!(after_sell.total_held_tokens(), 0.0);
        assert!(after_sell.address_holdings("sim-wallet-0").base_balance > 0.5);
        assert!(after_sell.pool_state().token_reserve > after_buy.pool_state().token_reserve);
    }

    #[tokio::test]
    async fn test_slow_sell_with_volume_sells_saved_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("sim_state.json");
        let mut config = quiet_config();
        config.market.sim_state_path = state.to_string_lossy().into_owned();

        trade(&config, TradeIntent::BuyAll, DispatchOptions::default())
            .await
            .unwrap();
        let held = saved_pool(&state).await.total_held_tokens();

        slow_sell(&config, Some(1e9), false, DispatchOptions::default())
            .await
            .unwrap();
        assert!(saved_pool(&state).await.total_held_tokens() < held);
    }

    #[tokio::test]
    async fn test_statistics_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        statistics(&quiet_config(), Some(path.to_string_lossy().into_owned()))
            .await
            .unwrap();
        assert!(path.exists());
    }
}
