//! Price and rounding utilities for constant-product pools

/// Default token decimals for a freshly simulated pool
pub const DEFAULT_TOKEN_DECIMALS: u8 = 18;

/// Largest decimals value that still scales without losing the integer part
const MAX_SCALED_DECIMALS: u8 = 18;

fn scale(decimals: u8) -> f64 {
    10f64.powi(decimals.min(MAX_SCALED_DECIMALS) as i32)
}

/// Floor an output amount to the pool's smallest indivisible unit
pub fn floor_to_decimals(amount: f64, decimals: u8) -> f64 {
    let factor = scale(decimals);
    (amount * factor).floor() / factor
}

/// Round a fee-equivalent amount half-up to the pool's smallest unit
pub fn round_half_up(amount: f64, decimals: u8) -> f64 {
    let factor = scale(decimals);
    ((amount + f64::EPSILON) * factor + 0.5).floor() / factor
}

/// Round to a number of display decimals
pub fn round(amount: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    ((amount + f64::EPSILON) * factor).round() / factor
}

/// Tokens received for `base_in` against the given reserves
/// Uses constant product formula: x * y = k
pub fn token_out_for_base_in(token_reserve: f64, base_reserve: f64, base_in: f64) -> f64 {
    let k = token_reserve * base_reserve;
    token_reserve - k / (base_reserve + base_in)
}

/// Base currency received for `token_in` against the given reserves
pub fn base_out_for_token_in(token_reserve: f64, base_reserve: f64, token_in: f64) -> f64 {
    let k = token_reserve * base_reserve;
    base_reserve - k / (token_reserve + token_in)
}

/// Minimum acceptable output for a trade with slippage tolerance in percent
pub fn min_output_with_slippage(expected: f64, slippage_pct: f64) -> f64 {
    expected * (100.0 - slippage_pct) / 100.0
}

/// Format price for display
pub fn format_price(price: f64) -> String {
    if price < 0.000001 {
        format!("{:.10}", price)
    } else if price < 0.001 {
        format!("{:.8}", price)
    } else if price < 1.0 {
        format!("{:.6}", price)
    } else {
        format!("{:.4}", price)
    }
}
