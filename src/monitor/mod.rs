//! Volume window monitor
//!
//! Keeps the recent swaps of the pool and reports net directional volume
//! (tokens bought minus tokens sold). The slow-sell policy reads it to size
//! its batches.
//!
//! ```text
//! EventFeed ─► VolumeMonitor::run ─► VolumeWindow ─► calc_volume()
//! ```

pub mod feed;
pub mod window;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;

pub use feed::{ChannelFeed, EventFeed};
pub use window::{SwapEvent, VolumeWindow, MIN_LATEST_TX_AMOUNT};

/// Shared handle over the volume window
#[derive(Debug, Clone)]
pub struct VolumeMonitor {
    window: Arc<RwLock<VolumeWindow>>,
}

impl VolumeMonitor {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            window: Arc::new(RwLock::new(VolumeWindow::from_minutes(
                config.window_size_min,
                config.min_retained_events,
            ))),
        }
    }

    /// Validate and ingest one event; malformed events are dropped
    pub async fn on_new_swap_event(&self, event: SwapEvent) -> bool {
        if let Err(e) = event.validate() {
            warn!("Skipping swap event: {}", e);
            return false;
        }

        debug!(
            "{} {} -> {} by {}",
            if event.is_buy { "BUY" } else { "SELL" },
            event.amount_in,
            event.amount_out,
            event.counterparty
        );
        self.window.write().await.push(event, Utc::now());
        true
    }

    /// Replace the window contents from history
    pub async fn load_history(&self, history: Vec<SwapEvent>) {
        let valid: Vec<SwapEvent> = history
            .into_iter()
            .filter(|event| match event.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Skipping history event: {}", e);
                    false
                }
            })
            .collect();

        let mut window = self.window.write().await;
        window.backfill(valid, Utc::now());
        info!("Loaded {} historical swaps", window.len());
    }

    pub async fn calc_volume(&self) -> f64 {
        self.window.read().await.calc_volume()
    }

    pub async fn len(&self) -> usize {
        self.window.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.window.read().await.is_empty()
    }

    /// Apply new window settings and compact right away
    pub async fn reconfigure(&self, config: &MonitorConfig) {
        let mut window = self.window.write().await;
        window.reconfigure(
            chrono::Duration::minutes(config.window_size_min as i64),
            config.min_retained_events,
        );
        window.compact(Utc::now());
    }

    /// Backfill, then consume the feed until it ends
    pub async fn run<F: EventFeed>(&self, mut feed: F) {
        match feed.backfill().await {
            Ok(history) => self.load_history(history).await,
            Err(e) => warn!("History backfill failed: {}", e),
        }

        while let Some(event) = feed.next_event().await {
            self.on_new_swap_event(event).await;
        }
        info!("Swap event feed closed");
    }
}
