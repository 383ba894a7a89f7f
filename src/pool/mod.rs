//! Constant-product pool simulation
//!
//! Reserve math and the in-memory simulator used when the fleet trades
//! against a local pool instead of a live one.

pub mod price;
pub mod simulator;

pub use simulator::{Holdings, PoolSimulator, PoolState};
