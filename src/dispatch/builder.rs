//! Order builders for every batch mode
//!
//! Builders only read cached balances. The one exception is noise injection,
//! which marks wallets as pending while it picks counter-orders so a wallet
//! never trades both sides of one batch.

use tracing::info;

use super::order::TradeOrder;
use super::randomizer::Randomizer;
use crate::config::{DispatchConfig, SlowSellConfig};
use crate::error::{Error, Result};
use crate::pool::price::round;
use crate::wallet::{OrderKind, PendingOrder, WalletFleet};

/// Builds order lists from the fleet's cached balances
pub struct OrderBuilder<'a> {
    dispatch: &'a DispatchConfig,
    slow_sell: &'a SlowSellConfig,
}

impl<'a> OrderBuilder<'a> {
    pub fn new(dispatch: &'a DispatchConfig, slow_sell: &'a SlowSellConfig) -> Self {
        Self {
            dispatch,
            slow_sell,
        }
    }

    /// One order per wallet: spendable base for buys, whole token balance for sells
    pub fn full_fleet(&self, fleet: &WalletFleet, kind: OrderKind) -> Vec<TradeOrder> {
        fleet
            .wallets()
            .iter()
            .enumerate()
            .filter_map(|(index, wallet)| {
                let amount = match kind {
                    OrderKind::Buy => wallet.spendable(self.dispatch.fee_reserve_base),
                    OrderKind::Sell => wallet.token_balance,
                };
                (amount > 0.0).then_some(TradeOrder {
                    wallet: index,
                    amount,
                    kind,
                })
            })
            .collect()
    }

    /// Sell whole balances of the heaviest holders until `percent` of supply is covered
    pub fn sell_percent(&self, fleet: &WalletFleet, percent: f64) -> Result<Vec<TradeOrder>> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(Error::InvalidAmount(format!("sell percent {}", percent)));
        }

        let target = percent * fleet.total_token_supply() / 100.0;
        let mut accumulated = 0.0;
        let mut orders = Vec::new();

        for index in fleet.indices_by_token(false) {
            if accumulated >= target {
                break;
            }
            let balance = fleet.wallets()[index].token_balance;
            if balance <= self.dispatch.sell_dust_tokens {
                continue;
            }
            accumulated += balance;
            orders.push(TradeOrder::sell(index, balance));
        }

        info!(
            "selling wallets: {}, tokens: {} of target {}",
            orders.len(),
            round(accumulated, 0),
            round(target, 0)
        );
        Ok(orders)
    }

    /// Spend `amount` base from the wallets holding the fewest tokens
    pub fn buy_amount(&self, fleet: &WalletFleet, amount: f64) -> Result<Vec<TradeOrder>> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(Error::InvalidAmount(format!("buy amount {}", amount)));
        }

        let mut accumulated = 0.0;
        let mut orders = Vec::new();

        for index in fleet.indices_by_token(true) {
            if accumulated >= amount {
                break;
            }
            let wallet = &fleet.wallets()[index];
            if wallet.token_balance >= self.dispatch.saturation_tokens {
                continue;
            }
            let spendable = wallet.spendable(self.dispatch.fee_reserve_base);
            if spendable <= 0.0 {
                continue;
            }
            accumulated += spendable;
            orders.push(TradeOrder::buy(index, spendable));
        }

        info!(
            "buying wallets: {}, sum: {}",
            orders.len(),
            round(accumulated, 3)
        );
        Ok(orders)
    }

    /// Append opposite-direction orders from idle wallets and shuffle the batch
    ///
    /// `batch_kind` is the direction of the primary batch. At least one noise
    /// order is wanted even when the primary batch came out empty.
    pub fn add_noise(
        &self,
        fleet: &mut WalletFleet,
        batch_kind: OrderKind,
        mut orders: Vec<TradeOrder>,
        rng: &mut Randomizer,
    ) -> Vec<TradeOrder> {
        for order in &orders {
            fleet.mark_pending(order.wallet, order.kind.into());
        }

        let pct = rng.random_int(self.dispatch.min_random_tx_pct, self.dispatch.max_random_tx_pct);
        let wanted = ((orders.len() as f64 * pct as f64 / 100.0).round() as usize).max(1);

        let noise = match batch_kind {
            OrderKind::Sell => self.buy_noise(fleet, wanted),
            OrderKind::Buy => self.sell_noise(fleet, wanted),
        };
        fleet.clear_pending();

        info!(
            "random {} wallets: {}, sum: {}",
            batch_kind.opposite(),
            noise.len(),
            round(noise.iter().map(|o| o.amount).sum::<f64>(), 3)
        );

        orders.extend(noise);
        rng.shuffle(&mut orders);
        orders
    }

    fn buy_noise(&self, fleet: &mut WalletFleet, wanted: usize) -> Vec<TradeOrder> {
        let mut noise = Vec::with_capacity(wanted);
        for index in fleet.indices_by_token(true) {
            if noise.len() >= wanted {
                break;
            }
            let wallet = &fleet.wallets()[index];
            let spendable = wallet.spendable(self.dispatch.fee_reserve_base);
            if wallet.is_idle()
                && wallet.token_balance <= self.dispatch.noise_buy_max_tokens
                && spendable > 0.0
            {
                noise.push(TradeOrder::buy(index, spendable));
                fleet.mark_pending(index, PendingOrder::Buy);
            }
        }
        noise
    }

    fn sell_noise(&self, fleet: &mut WalletFleet, wanted: usize) -> Vec<TradeOrder> {
        let mut noise = Vec::with_capacity(wanted);
        for index in fleet.indices_by_token(false) {
            if noise.len() >= wanted {
                break;
            }
            let wallet = &fleet.wallets()[index];
            if wallet.is_idle() && wallet.token_balance >= self.dispatch.saturation_tokens {
                noise.push(TradeOrder::sell(index, round(wallet.token_balance, 3)));
                fleet.mark_pending(index, PendingOrder::Sell);
            }
        }
        noise
    }

    /// Sell random chunks worth part of the net buy volume
    ///
    /// Chunk bounds are configured in base currency and converted to tokens at
    /// `price`. Wallets are drained from the smallest holder up.
    pub fn slow_sell(
        &self,
        fleet: &WalletFleet,
        net_volume: f64,
        price: f64,
        rng: &mut Randomizer,
    ) -> Result<Vec<TradeOrder>> {
        if net_volume <= 0.0 {
            return Ok(Vec::new());
        }
        if !price.is_finite() || price <= 0.0 {
            return Err(Error::Quote(format!("unusable token price {}", price)));
        }

        let target = net_volume * self.slow_sell.total_selling_limit_pct / 100.0;
        let min_chunk = round(self.slow_sell.min_chunk_base / price, 0);
        let max_chunk = round(self.slow_sell.max_chunk_base / price, 0).max(min_chunk);
        if min_chunk <= 0.0 {
            return Err(Error::InvalidAmount(format!(
                "minimum chunk rounds to zero tokens at price {}",
                price
            )));
        }

        info!(
            "volume: {}, selling up to {} tokens in chunks of {}-{}",
            net_volume, target, min_chunk, max_chunk
        );

        let mut accumulated = 0.0;
        let mut orders = Vec::new();

        'wallets: for index in fleet.indices_by_token(true) {
            let mut remaining = fleet.wallets()[index].token_balance;
            if remaining < min_chunk {
                continue;
            }

            while remaining >= min_chunk {
                if accumulated >= target {
                    break 'wallets;
                }
                let chunk = rng.random_float(min_chunk, max_chunk.min(remaining));
                orders.push(TradeOrder::sell(index, chunk));
                remaining -= chunk;
                accumulated += chunk;
            }
        }

        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wallet::WalletRecord;

    fn fleet(balances: &[(f64, f64)]) -> WalletFleet {
        WalletFleet::new(
            balances
                .iter()
                .enumerate()
                .map(|(i, (base, token))| WalletRecord::with_balances(format!("w{}", i), *base, *token))
                .collect(),
        )
    }

    fn tokens(fleet_tokens: &[f64]) -> WalletFleet {
        fleet(&fleet_tokens.iter().map(|t| (1.0, *t)).collect::<Vec<_>>())
    }

    #[test]
    fn test_sell_percent_takes_heaviest_first() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let fleet = tokens(&[300.0, 50.0, 500.0, 100.0]);

        let orders = builder.sell_percent(&fleet, 50.0).unwrap();
        assert_eq!(orders, vec![TradeOrder::sell(2, 500.0)]);
    }

    #[test]
    fn test_sell_percent_skips_dust() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let fleet = tokens(&[5.0, 10.0, 8.0]);

        assert!(builder.sell_percent(&fleet, 100.0).unwrap().is_empty());
        assert!(builder.sell_percent(&fleet, 150.0).is_err());
    }

    #[test]
    fn test_buy_amount_skips_saturated_and_broke_wallets() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        // w0 saturated, w1 broke, w2 and w3 eligible
        let fleet = fleet(&[(1.0, 25.0), (0.005, 0.0), (0.51, 5.0), (0.31, 1.0)]);

        let orders = builder.buy_amount(&fleet, 0.4).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0], TradeOrder::buy(3, 0.3));
        assert_eq!(orders[1], TradeOrder::buy(2, 0.5));
    }

    #[test]
    fn test_full_fleet_leaves_out_empty_wallets() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let fleet = fleet(&[(1.0, 0.0), (0.0, 40.0)]);

        assert_eq!(
            builder.full_fleet(&fleet, OrderKind::Sell),
            vec![TradeOrder::sell(1, 40.0)]
        );
        assert_eq!(
            builder.full_fleet(&fleet, OrderKind::Buy),
            vec![TradeOrder::buy(0, 0.99)]
        );
    }

    #[test]
    fn test_noise_on_sell_batch_adds_buys_from_idle_wallets() {
        let mut config = Config::default();
        config.dispatch.min_random_tx_pct = 50;
        config.dispatch.max_random_tx_pct = 50;
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let mut fleet = fleet(&[
            (1.0, 900.0),
            (1.0, 800.0),
            (1.0, 700.0),
            (1.0, 600.0),
            (0.5, 0.0),
            (0.5, 1.0),
            (0.5, 2.0),
        ]);

        let sells = (0..4).map(|i| TradeOrder::sell(i, 100.0)).collect();
        let mut rng = Randomizer::seeded(11);
        let orders = builder.add_noise(&mut fleet, OrderKind::Sell, sells, &mut rng);

        let buys: Vec<_> = orders.iter().filter(|o| o.kind == OrderKind::Buy).collect();
        assert_eq!(orders.len(), 6);
        assert_eq!(buys.len(), 2);
        assert!(buys.iter().all(|o| o.wallet == 4 || o.wallet == 5));
        assert!(fleet.wallets().iter().all(|w| w.is_idle()));
    }

    #[test]
    fn test_noise_count_is_at_least_one() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let mut fleet = fleet(&[(1.0, 0.0), (1.0, 50.0), (1.0, 40.0)]);

        let buys = vec![TradeOrder::buy(0, 0.5)];
        let mut rng = Randomizer::seeded(5);
        let orders = builder.add_noise(&mut fleet, OrderKind::Buy, buys, &mut rng);

        assert_eq!(orders.len(), 2);
        assert!(orders.contains(&TradeOrder::sell(1, 50.0)));
    }

    #[test]
    fn test_noise_never_reuses_batch_wallets() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let mut fleet = fleet(&[(1.0, 0.0), (1.0, 0.0)]);

        let sells = vec![TradeOrder::sell(0, 1.0)];
        let mut rng = Randomizer::seeded(5);
        let orders = builder.add_noise(&mut fleet, OrderKind::Sell, sells, &mut rng);

        assert!(orders.contains(&TradeOrder::buy(1, 0.99)));
        assert_eq!(orders.iter().filter(|o| o.wallet == 0).count(), 1);
    }

    #[test]
    fn test_noise_added_to_empty_primary_batch() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        // Every holder is dust, so the percent sell itself is empty
        let mut fleet = fleet(&[(1.0, 5.0), (0.5, 0.0), (0.5, 2.0)]);

        let sells = builder.sell_percent(&fleet, 50.0).unwrap();
        assert!(sells.is_empty());

        let mut rng = Randomizer::seeded(7);
        let orders = builder.add_noise(&mut fleet, OrderKind::Sell, sells, &mut rng);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].kind, OrderKind::Buy);
        assert!(fleet.wallets().iter().all(|w| w.is_idle()));
    }

    #[test]
    fn test_slow_sell_chunks_within_bounds() {
        let mut config = Config::default();
        config.slow_sell.min_chunk_base = 1.0;
        config.slow_sell.max_chunk_base = 2.0;
        config.slow_sell.total_selling_limit_pct = 50.0;
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let fleet = tokens(&[50.0, 5.0, 300.0]);

        // price 0.1 -> chunks of 10..20 tokens, target 100 tokens
        let mut rng = Randomizer::seeded(9);
        let orders = builder.slow_sell(&fleet, 200.0, 0.1, &mut rng).unwrap();

        let sold: f64 = orders.iter().map(|o| o.amount).sum();
        assert!(sold >= 100.0);
        assert!(sold < 120.0);
        assert!(orders.iter().all(|o| o.wallet != 1));
        assert!(orders.iter().all(|o| (10.0..=20.0).contains(&o.amount)));

        // Smallest eligible holder is drained first
        assert_eq!(orders[0].wallet, 0);
        let from_w0: f64 = orders.iter().filter(|o| o.wallet == 0).map(|o| o.amount).sum();
        assert!(from_w0 <= 50.0 + 1e-9);
    }

    #[test]
    fn test_slow_sell_needs_positive_volume_and_price() {
        let config = Config::default();
        let builder = OrderBuilder::new(&config.dispatch, &config.slow_sell);
        let fleet = tokens(&[1_000.0]);
        let mut rng = Randomizer::seeded(1);

        assert!(builder.slow_sell(&fleet, 0.0, 0.1, &mut rng).unwrap().is_empty());
        assert!(builder.slow_sell(&fleet, -5.0, 0.1, &mut rng).unwrap().is_empty());
        assert!(builder.slow_sell(&fleet, 100.0, 0.0, &mut rng).is_err());
    }
}
