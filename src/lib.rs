//! Fleet Trader Library
//!
//! Coordinated trading of one token across a fleet of wallets, against a
//! constant-product pool or a local simulation of one.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod market;
pub mod monitor;
pub mod pool;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use engine::FleetEngine;
pub use error::{Error, Result};
