//! Top-level handle wiring the scheduler, the volume monitor and the config

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::config::{Config, ConfigHandle};
use crate::dispatch::{BatchReport, DispatchOptions, Randomizer, Scheduler, TradeIntent};
use crate::error::Result;
use crate::market::MarketAdapter;
use crate::monitor::{EventFeed, SwapEvent, VolumeMonitor};
use crate::wallet::{FleetTotals, WalletFleet};

/// Fleet trading engine
pub struct FleetEngine {
    scheduler: Scheduler,
    monitor: VolumeMonitor,
}

impl FleetEngine {
    pub fn new(
        market: Arc<dyn MarketAdapter>,
        config: Config,
        fleet: WalletFleet,
        rng: Randomizer,
    ) -> Self {
        let monitor = VolumeMonitor::new(&config.monitor);
        let scheduler = Scheduler::new(market, ConfigHandle::new(config), fleet, rng);
        Self { scheduler, monitor }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn monitor(&self) -> &VolumeMonitor {
        &self.monitor
    }

    pub fn config(&self) -> &ConfigHandle {
        self.scheduler.config()
    }

    pub async fn build_and_dispatch(
        &self,
        intent: TradeIntent,
        options: DispatchOptions,
    ) -> Result<BatchReport> {
        self.scheduler.build_and_dispatch(intent, options).await
    }

    pub async fn report_aggregate_balances(&self) -> FleetTotals {
        self.scheduler.report_aggregate_balances().await
    }

    /// Feed one swap into the volume window
    pub async fn on_new_swap_event(&self, event: SwapEvent) -> bool {
        self.monitor.on_new_swap_event(event).await
    }

    /// Install a new configuration; the volume window follows immediately
    pub async fn reload_config(&self, config: Config) -> Result<()> {
        let monitor = config.monitor.clone();
        self.config().replace(config).await?;
        self.monitor.reconfigure(&monitor).await;
        info!(
            "Configuration reloaded (window {} min)",
            monitor.window_size_min
        );
        Ok(())
    }

    /// One slow-sell round sized from the current net volume
    pub async fn slow_sell_tick(&self, options: DispatchOptions) -> Result<Option<BatchReport>> {
        let volume = self.monitor.calc_volume().await;
        if volume <= 0.0 {
            debug!("net volume {}, nothing to sell", volume);
            return Ok(None);
        }

        info!("volume: {}", volume);
        let report = self
            .scheduler
            .build_and_dispatch(TradeIntent::SlowSell { net_volume: volume }, options)
            .await?;
        Ok(Some(report))
    }

    /// Run the monitor over `feed` in the background
    pub fn spawn_monitor<F>(&self, feed: F) -> JoinHandle<()>
    where
        F: EventFeed + 'static,
    {
        let monitor = self.monitor.clone();
        tokio::spawn(async move {
            monitor.run(feed).await;
        })
    }

    /// Periodic slow-sell rounds while enabled in the current configuration
    ///
    /// Ticks missed while a round is still running are dropped. A reloaded
    /// `slow_sell.interval_secs` takes effect after the pending tick.
    pub fn spawn_slow_sell_loop(self: &Arc<Self>, options: DispatchOptions) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut period = engine.config().snapshot().await.slow_sell.interval_secs.max(1);
            let mut interval = slow_sell_interval(period);
            // The first tick completes immediately
            interval.tick().await;

            loop {
                interval.tick().await;

                let config = engine.config().snapshot().await;
                let wanted = config.slow_sell.interval_secs.max(1);
                if wanted != period {
                    debug!("slow-sell interval {}s -> {}s", period, wanted);
                    period = wanted;
                    interval = slow_sell_interval(period);
                    interval.tick().await;
                }
                if !config.slow_sell.enabled {
                    continue;
                }

                if let Err(e) = engine.slow_sell_tick(options).await {
                    error!("Slow-sell round failed: {}", e);
                }
            }
        })
    }
}

fn slow_sell_interval(period_secs: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}
