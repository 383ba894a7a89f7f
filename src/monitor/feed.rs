//! Swap event sources

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::window::SwapEvent;
use crate::error::Result;

/// Stream of swap events for one pool
#[async_trait]
pub trait EventFeed: Send {
    /// Recent history, in any order
    async fn backfill(&mut self) -> Result<Vec<SwapEvent>>;

    /// Next live event; `None` once the stream has ended
    async fn next_event(&mut self) -> Option<SwapEvent>;
}

/// Feed over an mpsc channel, optionally seeded with history
pub struct ChannelFeed {
    rx: mpsc::Receiver<SwapEvent>,
    history: Vec<SwapEvent>,
}

impl ChannelFeed {
    pub fn new(rx: mpsc::Receiver<SwapEvent>) -> Self {
        Self {
            rx,
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<SwapEvent>) -> Self {
        self.history = history;
        self
    }
}

#[async_trait]
impl EventFeed for ChannelFeed {
    async fn backfill(&mut self) -> Result<Vec<SwapEvent>> {
        Ok(std::mem::take(&mut self.history))
    }

    async fn next_event(&mut self) -> Option<SwapEvent> {
        self.rx.recv().await
    }
}
