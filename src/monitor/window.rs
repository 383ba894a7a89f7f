//! Sliding window of recent swaps

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::error::{Error, Result};

/// Minimum number of latest events kept regardless of their age
pub const MIN_LATEST_TX_AMOUNT: usize = 10;

/// A swap observed on the pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapEvent {
    pub amount_in: f64,
    pub amount_out: f64,
    pub is_buy: bool,
    pub counterparty: String,
    pub timestamp: DateTime<Utc>,
}

impl SwapEvent {
    /// Reject events that would corrupt the volume estimate
    pub fn validate(&self) -> Result<()> {
        if !self.amount_in.is_finite() || self.amount_in < 0.0 {
            return Err(Error::MalformedEvent(format!("amount_in {}", self.amount_in)));
        }
        if !self.amount_out.is_finite() || self.amount_out < 0.0 {
            return Err(Error::MalformedEvent(format!("amount_out {}", self.amount_out)));
        }
        if self.counterparty.trim().is_empty() {
            return Err(Error::MalformedEvent("missing counterparty".to_string()));
        }
        Ok(())
    }
}

/// Time window over swap events with a retention floor
///
/// Events older than the window are only dropped while at least
/// `min_retained` newer events remain, so a quiet market still reports
/// its last few trades.
#[derive(Debug, Clone)]
pub struct VolumeWindow {
    events: VecDeque<SwapEvent>,
    window: Duration,
    min_retained: usize,
}

impl VolumeWindow {
    pub fn new(window: Duration, min_retained: usize) -> Self {
        Self {
            events: VecDeque::new(),
            window,
            min_retained,
        }
    }

    pub fn from_minutes(minutes: u64, min_retained: usize) -> Self {
        Self::new(Duration::minutes(minutes as i64), min_retained)
    }

    pub fn is_in_window(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - timestamp < self.window
    }

    /// Append an event and compact the head
    pub fn push(&mut self, event: SwapEvent, now: DateTime<Utc>) {
        self.events.push_back(event);
        self.compact(now);
    }

    /// Drop stale events from the head, keeping the retention floor
    pub fn compact(&mut self, now: DateTime<Utc>) {
        while self.events.len() > self.min_retained {
            match self.events.front() {
                Some(oldest) if !self.is_in_window(oldest.timestamp, now) => {
                    self.events.pop_front();
                }
                _ => break,
            }
        }
        debug!("transactions: {}", self.events.len());
    }

    /// Replace the contents from history
    ///
    /// History may come in any order. Walking newest to oldest, everything
    /// inside the window is kept; once outside, events are kept only until the
    /// retention floor is met.
    pub fn backfill(&mut self, mut history: Vec<SwapEvent>, now: DateTime<Utc>) {
        history.sort_by_key(|e| e.timestamp);

        let mut kept = Vec::new();
        for event in history.into_iter().rev() {
            if !self.is_in_window(event.timestamp, now) && kept.len() >= self.min_retained {
                break;
            }
            kept.push(event);
        }
        kept.reverse();

        self.events = kept.into();
    }

    /// Net directional volume: tokens bought minus tokens sold
    pub fn calc_volume(&self) -> f64 {
        self.events
            .iter()
            .map(|e| if e.is_buy { e.amount_out } else { -e.amount_in })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &SwapEvent> {
        self.events.iter()
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Change window length and floor; takes effect on the next compaction
    pub fn reconfigure(&mut self, window: Duration, min_retained: usize) {
        self.window = window;
        self.min_retained = min_retained;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(minutes_ago: i64, is_buy: bool, amount: f64, now: DateTime<Utc>) -> SwapEvent {
        SwapEvent {
            amount_in: if is_buy { 0.1 } else { amount },
            amount_out: if is_buy { amount } else { 0.1 },
            is_buy,
            counterparty: "trader".to_string(),
            timestamp: now - Duration::minutes(minutes_ago),
        }
    }

    #[test]
    fn test_volume_is_buys_minus_sells() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(60, 3);
        window.push(event(5, true, 1_000.0, now), now);
        window.push(event(4, true, 500.0, now), now);
        window.push(event(3, false, 300.0, now), now);
        assert_eq!(window.calc_volume(), 1_200.0);
    }

    #[test]
    fn test_stale_events_dropped_from_head() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(10, 2);
        window.push(event(30, true, 1.0, now), now);
        window.push(event(20, true, 2.0, now), now);
        window.push(event(5, true, 4.0, now), now);
        window.push(event(1, true, 8.0, now), now);

        assert_eq!(window.len(), 2);
        assert_eq!(window.calc_volume(), 12.0);
    }

    #[test]
    fn test_retention_floor_keeps_stale_events() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(10, MIN_LATEST_TX_AMOUNT);
        for i in 0..(MIN_LATEST_TX_AMOUNT + 5) {
            window.push(event(1_000 - i as i64, true, 1.0, now), now);
        }
        assert_eq!(window.len(), MIN_LATEST_TX_AMOUNT);
    }

    #[test]
    fn test_below_floor_nothing_dropped() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(10, MIN_LATEST_TX_AMOUNT);
        for _ in 0..3 {
            window.push(event(500, false, 1.0, now), now);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.calc_volume(), -3.0);
    }

    #[test]
    fn test_backfill_keeps_window_and_floor() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(10, 3);
        let history = vec![
            event(100, true, 1.0, now),
            event(90, true, 2.0, now),
            event(80, true, 4.0, now),
            event(70, true, 8.0, now),
            event(5, true, 16.0, now),
            event(2, true, 32.0, now),
        ];
        window.backfill(history, now);

        // Two inside the window plus one stale event to reach the floor
        assert_eq!(window.len(), 3);
        assert_eq!(window.calc_volume(), 56.0);
        let times: Vec<_> = window.events().map(|e| e.timestamp).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_backfill_keeps_everything_in_window() {
        let now = Utc::now();
        let mut window = VolumeWindow::from_minutes(60, 2);
        let history = (0..5).map(|i| event(i, true, 1.0, now)).collect();
        window.backfill(history, now);
        assert_eq!(window.len(), 5);
    }

    #[test]
    fn test_validate_rejects_bad_amounts() {
        let now = Utc::now();
        let mut bad = event(1, true, 1.0, now);
        bad.amount_out = f64::NAN;
        assert!(bad.validate().is_err());

        let mut bad = event(1, true, 1.0, now);
        bad.counterparty = String::new();
        assert!(bad.validate().is_err());

        assert!(event(1, true, 1.0, now).validate().is_ok());
    }
}
