//! Trade dispatch
//!
//! Turns a [`TradeIntent`] into a list of per-wallet orders and executes them
//! one by one through the market adapter:
//!
//! ```text
//! TradeIntent ─► OrderBuilder ─► [noise + shuffle] ─► Scheduler::send_orders ─► BatchReport
//! ```

pub mod builder;
pub mod order;
pub mod randomizer;
pub mod report;
pub mod scheduler;

pub use builder::OrderBuilder;
pub use order::{DispatchOptions, TradeIntent, TradeOrder};
pub use randomizer::Randomizer;
pub use report::BatchReport;
pub use scheduler::Scheduler;
