//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::monitor::MIN_LATEST_TX_AMOUNT;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub slow_sell: SlowSellConfig,
}

/// Market selection and simulated pool parameters
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    /// Trade against the local pool simulator instead of a live venue
    #[serde(default = "default_true")]
    pub simulation: bool,
    #[serde(default = "default_sim_token_reserve")]
    pub sim_token_reserve: f64,
    #[serde(default = "default_sim_base_reserve")]
    pub sim_base_reserve: f64,
    #[serde(default = "default_sim_decimals")]
    pub sim_decimals: u8,
    /// Number of generated wallets when no wallet list is given
    #[serde(default = "default_sim_wallet_count")]
    pub sim_wallet_count: usize,
    /// Base currency deposited into every simulated wallet
    #[serde(default = "default_sim_wallet_funding")]
    pub sim_wallet_funding: f64,
    /// Network fee charged per simulated trade, in base currency
    #[serde(default = "default_sim_tx_fee")]
    pub sim_tx_fee: f64,
    /// Fee price reported by the simulated venue
    #[serde(default = "default_sim_fee_price")]
    pub sim_fee_price: f64,
    /// Wallet list, one address per line
    #[serde(default)]
    pub wallets_path: Option<String>,
    /// Simulated pool and holdings carried between runs; empty disables it
    #[serde(default = "default_sim_state_path")]
    pub sim_state_path: String,
}

/// Order building and execution policy
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Slippage tolerance in percent
    #[serde(default = "default_slippage_pct")]
    pub slippage_pct: f64,
    /// Orders are skipped while the venue fee price is above this
    #[serde(default = "default_fee_price_ceiling")]
    pub fee_price_ceiling: f64,
    /// Base currency left in every wallet to pay fees
    #[serde(default = "default_fee_reserve_base")]
    pub fee_reserve_base: f64,
    /// Retries of a transiently failed order
    #[serde(default = "default_error_max_tries")]
    pub error_max_tries: u32,
    /// Pause before resubmitting a transiently failed order
    #[serde(default)]
    pub error_sleep_ms: u64,
    #[serde(default = "default_min_random_tx_pct")]
    pub min_random_tx_pct: u32,
    #[serde(default = "default_max_random_tx_pct")]
    pub max_random_tx_pct: u32,
    /// Wallets at or below this token balance are not used for supply sells
    #[serde(default = "default_sell_dust_tokens")]
    pub sell_dust_tokens: f64,
    /// Wallets at or above this token balance are not used for target buys
    #[serde(default = "default_saturation_tokens")]
    pub saturation_tokens: f64,
    /// Noise buys only come from wallets at or below this token balance
    #[serde(default = "default_noise_buy_max_tokens")]
    pub noise_buy_max_tokens: f64,
    #[serde(default = "default_statistics_path")]
    pub statistics_path: String,
}

/// Timing between orders and balance queries
#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_min_sleep_secs")]
    pub min_sleep_secs: f64,
    #[serde(default = "default_max_sleep_secs")]
    pub max_sleep_secs: f64,
    #[serde(default = "default_rpc_req_sleep_ms")]
    pub rpc_req_sleep_ms: u64,
    #[serde(default = "default_rpc_send_tx_sleep_ms")]
    pub rpc_send_tx_sleep_ms: u64,
}

/// Volume window settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_window_size_min")]
    pub window_size_min: u64,
    /// Events kept regardless of age
    #[serde(default = "default_min_retained_events")]
    pub min_retained_events: usize,
}

/// Throttled selling driven by observed volume
#[derive(Debug, Clone, Deserialize)]
pub struct SlowSellConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_slow_sell_interval_secs")]
    pub interval_secs: u64,
    /// Smallest chunk, in base currency
    #[serde(default = "default_min_chunk_base")]
    pub min_chunk_base: f64,
    /// Largest chunk, in base currency
    #[serde(default = "default_max_chunk_base")]
    pub max_chunk_base: f64,
    /// Share of net buy volume that may be sold back
    #[serde(default = "default_total_selling_limit_pct")]
    pub total_selling_limit_pct: f64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            simulation: true,
            sim_token_reserve: default_sim_token_reserve(),
            sim_base_reserve: default_sim_base_reserve(),
            sim_decimals: default_sim_decimals(),
            sim_wallet_count: default_sim_wallet_count(),
            sim_wallet_funding: default_sim_wallet_funding(),
            sim_tx_fee: default_sim_tx_fee(),
            sim_fee_price: default_sim_fee_price(),
            wallets_path: None,
            sim_state_path: default_sim_state_path(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            slippage_pct: default_slippage_pct(),
            fee_price_ceiling: default_fee_price_ceiling(),
            fee_reserve_base: default_fee_reserve_base(),
            error_max_tries: default_error_max_tries(),
            error_sleep_ms: 0,
            min_random_tx_pct: default_min_random_tx_pct(),
            max_random_tx_pct: default_max_random_tx_pct(),
            sell_dust_tokens: default_sell_dust_tokens(),
            saturation_tokens: default_saturation_tokens(),
            noise_buy_max_tokens: default_noise_buy_max_tokens(),
            statistics_path: default_statistics_path(),
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_sleep_secs: default_min_sleep_secs(),
            max_sleep_secs: default_max_sleep_secs(),
            rpc_req_sleep_ms: default_rpc_req_sleep_ms(),
            rpc_send_tx_sleep_ms: default_rpc_send_tx_sleep_ms(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_size_min: default_window_size_min(),
            min_retained_events: default_min_retained_events(),
        }
    }
}

impl Default for SlowSellConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_slow_sell_interval_secs(),
            min_chunk_base: default_min_chunk_base(),
            max_chunk_base: default_max_chunk_base(),
            total_selling_limit_pct: default_total_selling_limit_pct(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_sim_token_reserve() -> f64 {
    1_000_000_000.0
}

fn default_sim_base_reserve() -> f64 {
    100.0
}

fn default_sim_decimals() -> u8 {
    crate::pool::price::DEFAULT_TOKEN_DECIMALS
}

fn default_sim_wallet_count() -> usize {
    10
}

fn default_sim_wallet_funding() -> f64 {
    1.0
}

fn default_sim_tx_fee() -> f64 {
    0.000005
}

fn default_sim_fee_price() -> f64 {
    1.0
}

fn default_sim_state_path() -> String {
    "sim_state.json".to_string()
}

fn default_slippage_pct() -> f64 {
    5.0
}

fn default_fee_price_ceiling() -> f64 {
    50.0
}

fn default_fee_reserve_base() -> f64 {
    0.01
}

fn default_error_max_tries() -> u32 {
    3
}

fn default_min_random_tx_pct() -> u32 {
    10
}

fn default_max_random_tx_pct() -> u32 {
    30
}

fn default_sell_dust_tokens() -> f64 {
    10.0
}

fn default_saturation_tokens() -> f64 {
    20.0
}

fn default_noise_buy_max_tokens() -> f64 {
    100.0
}

fn default_statistics_path() -> String {
    "statistic.json".to_string()
}

fn default_min_sleep_secs() -> f64 {
    5.0
}

fn default_max_sleep_secs() -> f64 {
    30.0
}

fn default_rpc_req_sleep_ms() -> u64 {
    200
}

fn default_rpc_send_tx_sleep_ms() -> u64 {
    500
}

fn default_window_size_min() -> u64 {
    60
}

fn default_min_retained_events() -> usize {
    MIN_LATEST_TX_AMOUNT
}

fn default_slow_sell_interval_secs() -> u64 {
    300
}

fn default_min_chunk_base() -> f64 {
    0.05
}

fn default_max_chunk_base() -> f64 {
    0.2
}

fn default_total_selling_limit_pct() -> f64 {
    50.0
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix FLEET_)
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let numbers = [
            ("market.sim_token_reserve", self.market.sim_token_reserve),
            ("market.sim_base_reserve", self.market.sim_base_reserve),
            ("market.sim_wallet_funding", self.market.sim_wallet_funding),
            ("market.sim_tx_fee", self.market.sim_tx_fee),
            ("market.sim_fee_price", self.market.sim_fee_price),
            ("dispatch.slippage_pct", self.dispatch.slippage_pct),
            ("dispatch.fee_price_ceiling", self.dispatch.fee_price_ceiling),
            ("dispatch.fee_reserve_base", self.dispatch.fee_reserve_base),
            ("dispatch.sell_dust_tokens", self.dispatch.sell_dust_tokens),
            ("dispatch.saturation_tokens", self.dispatch.saturation_tokens),
            ("dispatch.noise_buy_max_tokens", self.dispatch.noise_buy_max_tokens),
            ("pacing.min_sleep_secs", self.pacing.min_sleep_secs),
            ("pacing.max_sleep_secs", self.pacing.max_sleep_secs),
            ("slow_sell.min_chunk_base", self.slow_sell.min_chunk_base),
            ("slow_sell.max_chunk_base", self.slow_sell.max_chunk_base),
            (
                "slow_sell.total_selling_limit_pct",
                self.slow_sell.total_selling_limit_pct,
            ),
        ];
        if let Some((name, value)) = numbers.iter().find(|(_, v)| !v.is_finite()) {
            anyhow::bail!("{} must be a finite number, got {}", name, value);
        }

        if self.market.simulation {
            if self.market.sim_token_reserve <= 0.0 || self.market.sim_base_reserve <= 0.0 {
                anyhow::bail!("simulated pool reserves must be positive");
            }
            if self.market.sim_wallet_funding < 0.0 || self.market.sim_tx_fee < 0.0 {
                anyhow::bail!("sim_wallet_funding and sim_tx_fee cannot be negative");
            }
        }

        if !(0.0..100.0).contains(&self.dispatch.slippage_pct) {
            anyhow::bail!("slippage_pct must be in [0, 100)");
        }

        if self.dispatch.fee_reserve_base < 0.0 {
            anyhow::bail!("fee_reserve_base cannot be negative");
        }

        if self.dispatch.min_random_tx_pct > self.dispatch.max_random_tx_pct {
            anyhow::bail!(
                "min_random_tx_pct ({}) exceeds max_random_tx_pct ({})",
                self.dispatch.min_random_tx_pct,
                self.dispatch.max_random_tx_pct
            );
        }

        if self.pacing.min_sleep_secs < 0.0
            || self.pacing.min_sleep_secs > self.pacing.max_sleep_secs
        {
            anyhow::bail!("sleep range must satisfy 0 <= min_sleep_secs <= max_sleep_secs");
        }

        if self.monitor.window_size_min == 0 {
            anyhow::bail!("window_size_min must be positive");
        }

        if self.slow_sell.min_chunk_base <= 0.0
            || self.slow_sell.min_chunk_base > self.slow_sell.max_chunk_base
        {
            anyhow::bail!("slow-sell chunks must satisfy 0 < min_chunk_base <= max_chunk_base");
        }

        if !(0.0..=100.0).contains(&self.slow_sell.total_selling_limit_pct) {
            anyhow::bail!("total_selling_limit_pct must be between 0 and 100");
        }

        if self.slow_sell.enabled && self.slow_sell.interval_secs == 0 {
            anyhow::bail!("slow_sell.interval_secs must be positive when enabled");
        }

        Ok(())
    }

    /// Get configuration for display
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Market:
    simulation: {}
    sim_pool: {} tokens / {} base ({} decimals)
    sim_wallets: {} x {} base
    wallets_path: {}
    sim_state_path: {}
  Dispatch:
    slippage: {}%
    fee_price_ceiling: {}
    fee_reserve: {} base
    error_max_tries: {}
    random_tx: {}-{}%
  Pacing:
    sleep: {}-{}s
    rpc_req_sleep: {}ms
    rpc_send_tx_sleep: {}ms
  Monitor:
    window: {} min (min {} events)
  Slow-Sell:
    enabled: {}
    chunks: {}-{} base
    limit: {}%
"#,
            self.market.simulation,
            self.market.sim_token_reserve,
            self.market.sim_base_reserve,
            self.market.sim_decimals,
            self.market.sim_wallet_count,
            self.market.sim_wallet_funding,
            self.market.wallets_path.as_deref().unwrap_or("(generated)"),
            if self.market.sim_state_path.is_empty() {
                "(not kept)"
            } else {
                self.market.sim_state_path.as_str()
            },
            self.dispatch.slippage_pct,
            self.dispatch.fee_price_ceiling,
            self.dispatch.fee_reserve_base,
            self.dispatch.error_max_tries,
            self.dispatch.min_random_tx_pct,
            self.dispatch.max_random_tx_pct,
            self.pacing.min_sleep_secs,
            self.pacing.max_sleep_secs,
            self.pacing.rpc_req_sleep_ms,
            self.pacing.rpc_send_tx_sleep_ms,
            self.monitor.window_size_min,
            self.monitor.min_retained_events,
            self.slow_sell.enabled,
            self.slow_sell.min_chunk_base,
            self.slow_sell.max_chunk_base,
            self.slow_sell.total_selling_limit_pct,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market: MarketConfig::default(),
            dispatch: DispatchConfig::default(),
            pacing: PacingConfig::default(),
            monitor: MonitorConfig::default(),
            slow_sell: SlowSellConfig::default(),
        }
    }
}

/// Shared, hot-swappable configuration
///
/// Readers take an `Arc` snapshot; `replace` swaps the whole value at once.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<Config>>>,
}

impl ConfigHandle {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// Current configuration
    pub async fn snapshot(&self) -> Arc<Config> {
        self.inner.read().await.clone()
    }

    /// Validate and install a new configuration
    pub async fn replace(&self, config: Config) -> crate::error::Result<()> {
        config
            .validate()
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;
        *self.inner.write().await = Arc::new(config);
        Ok(())
    }
}
