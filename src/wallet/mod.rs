//! Wallet fleet module
//!
//! Cached per-wallet balances for every signing identity in the fleet.
//! Balances are snapshots refreshed explicitly through the market adapter:
//!
//! ```text
//! MarketAdapter → WalletRecord::refresh → WalletFleet (reconcile / refresh_all)
//! ```

pub mod fleet;
pub mod record;
pub mod types;

pub use fleet::WalletFleet;
pub use record::WalletRecord;
pub use types::{FleetTotals, OrderKind, PendingOrder, Rank, StatisticItem, RANKS_IN_ORDER};
