//! Price analytics in Decimal for client-side display
//!
//! Execution never depends on these values. They convert 256-bit integer
//! reserves into `rust_decimal::Decimal` so callers can show spot prices,
//! price impact and slippage without floating point.

use crate::ConstantProduct;
use leafswap_types::{ExchangeError, Result, U256};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Largest bit width converted to Decimal without rescaling (Decimal holds 96 bits)
const DECIMAL_MANTISSA_BITS: usize = 96;

/// Convert several amounts to Decimal with one shared right shift
///
/// Values wider than 96 bits are shifted down together, which preserves every
/// ratio between them (up to truncation of the low bits).
pub fn to_decimals_scaled(values: &[U256]) -> Result<Vec<Decimal>> {
    let widest = values.iter().map(|v| v.bits()).max().unwrap_or(0);
    let shift = widest.saturating_sub(DECIMAL_MANTISSA_BITS);

    values
        .iter()
        .map(|v| {
            let scaled = *v >> shift;
            Decimal::from_u128(scaled.low_u128()).ok_or(ExchangeError::ArithmeticOverflow)
        })
        .collect()
}

/// Spot price of token0 in units of token1, adjusted for decimals
pub fn spot_price(reserve0: U256, decimals0: u8, reserve1: U256, decimals1: u8) -> Result<Decimal> {
    if reserve0.is_zero() || reserve1.is_zero() {
        return Err(ExchangeError::InsufficientLiquidity);
    }
    let scaled = to_decimals_scaled(&[reserve0, reserve1])?;
    let raw = div(scaled[1], scaled[0])?;

    // price = (r1 / 10^d1) / (r0 / 10^d0) = raw * 10^(d0 - d1)
    let adjustment = pow10(decimals0.abs_diff(decimals1))?;
    if decimals0 >= decimals1 {
        mul(raw, adjustment)
    } else {
        div(raw, adjustment)
    }
}

/// Price impact of a trade as a percentage (fee excluded)
pub fn price_impact(amount_in: U256, reserve_in: U256, reserve_out: U256) -> Result<Decimal> {
    if amount_in.is_zero() {
        return Err(ExchangeError::InsufficientInputAmount);
    }
    let amount_out = ConstantProduct::get_amount_out(amount_in, reserve_in, reserve_out, 0)?;
    let new_reserve_in = reserve_in
        .checked_add(amount_in)
        .ok_or(ExchangeError::ArithmeticOverflow)?;
    let new_reserve_out = reserve_out - amount_out;

    let d = to_decimals_scaled(&[reserve_in, reserve_out, new_reserve_in, new_reserve_out])?;

    // Current price (before trade) and price after trade
    let price_before = div(d[1], d[0])?;
    let price_after = div(d[3], d[2])?;
    // Output side too shallow to register at the shared scale
    if price_before.is_zero() {
        return Err(ExchangeError::InsufficientLiquidity);
    }

    mul(div((price_before - price_after).abs(), price_before)?, dec!(100))
}

/// Slippage versus an infinitely deep pool, as a percentage (fee included)
pub fn slippage(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Result<Decimal> {
    let actual_output = ConstantProduct::get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)?;
    let d = to_decimals_scaled(&[amount_in, reserve_in, reserve_out, actual_output])?;

    // Ideal rate (infinite liquidity)
    let ideal_output = mul(d[0], div(d[2], d[1])?)?;
    if ideal_output.is_zero() {
        return Ok(Decimal::ZERO);
    }

    mul(div(ideal_output - d[3], ideal_output)?, dec!(100))
}

/// Combine per-hop impacts (percentages) into the impact of the whole route
pub fn compound_impact(hop_impacts: &[Decimal]) -> Decimal {
    let retained = hop_impacts
        .iter()
        .fold(Decimal::ONE, |acc, impact| acc * (Decimal::ONE - impact / dec!(100)));
    (Decimal::ONE - retained) * dec!(100)
}

fn pow10(exp: u8) -> Result<Decimal> {
    let mut value = Decimal::ONE;
    for _ in 0..exp {
        value = mul(value, dec!(10))?;
    }
    Ok(value)
}

fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b).ok_or(ExchangeError::ArithmeticOverflow)
}

/// Also fails on a zero divisor
fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_div(b).ok_or(ExchangeError::ArithmeticOverflow)
}
