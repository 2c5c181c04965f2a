//! Constant-product (x*y=k) pair math with exact integer arithmetic
//!
//! Every division rounds down, in the pool's favor, so repeated trades can
//! never erode the reserve product. All arithmetic is checked 256-bit; the
//! invariant comparison widens to 512 bits.

use leafswap_config::BPS_DENOMINATOR;
use leafswap_types::{ExchangeError, Result, U256};

/// Reserves and fee of one pair as seen from the input side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReserveSnapshot {
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub fee_bps: u32, // Fee in basis points (30 = 0.3%)
}

impl ReserveSnapshot {
    pub fn new(reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Self {
        Self {
            reserve_in,
            reserve_out,
            fee_bps,
        }
    }

    /// Same pair seen from the other side
    pub fn flipped(&self) -> Self {
        Self {
            reserve_in: self.reserve_out,
            reserve_out: self.reserve_in,
            fee_bps: self.fee_bps,
        }
    }
}

/// Constant-product formulas
pub struct ConstantProduct;

impl ConstantProduct {
    /// Floor output for a given input using x*y=k
    ///
    /// `amount_out = amount_in * (10000 - fee) * reserve_out /
    ///  (reserve_in * 10000 + amount_in * (10000 - fee))`, rounded down.
    pub fn get_amount_out(
        amount_in: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Result<U256> {
        if amount_in.is_zero() {
            return Err(ExchangeError::InsufficientInputAmount);
        }
        if reserve_in.is_zero() || reserve_out.is_zero() {
            return Err(ExchangeError::InsufficientLiquidity);
        }

        let amount_in_with_fee = mul(amount_in, fee_multiplier(fee_bps)?)?;
        let numerator = mul(amount_in_with_fee, reserve_out)?;
        let denominator = add(mul(reserve_in, U256::from(BPS_DENOMINATOR))?, amount_in_with_fee)?;

        Ok(numerator / denominator)
    }

    /// Input needed for a desired output (reverse calculation)
    ///
    /// Rounds up by adding one so the pool is never short-changed.
    pub fn get_amount_in(
        amount_out: U256,
        reserve_in: U256,
        reserve_out: U256,
        fee_bps: u32,
    ) -> Result<U256> {
        if amount_out.is_zero() {
            return Err(ExchangeError::InsufficientOutputAmount);
        }
        if reserve_in.is_zero() || reserve_out.is_zero() || amount_out >= reserve_out {
            return Err(ExchangeError::InsufficientLiquidity);
        }

        let numerator = mul(mul(reserve_in, amount_out)?, U256::from(BPS_DENOMINATOR))?;
        let denominator = mul(reserve_out - amount_out, fee_multiplier(fee_bps)?)?;

        add(numerator / denominator, U256::one())
    }

    /// Ratio-preserving counterpart amount: `amount_a * reserve_b / reserve_a`
    pub fn quote(amount_a: U256, reserve_a: U256, reserve_b: U256) -> Result<U256> {
        if amount_a.is_zero() {
            return Err(ExchangeError::InsufficientInputAmount);
        }
        if reserve_a.is_zero() || reserve_b.is_zero() {
            return Err(ExchangeError::InsufficientLiquidity);
        }
        Ok(mul(amount_a, reserve_b)? / reserve_a)
    }

    /// Shares for the first deposit: `sqrt(amount0 * amount1) - minimum_liquidity`
    pub fn initial_shares(amount0: U256, amount1: U256, minimum_liquidity: U256) -> Result<U256> {
        let root = Self::sqrt(mul(amount0, amount1)?);
        if root <= minimum_liquidity {
            return Err(ExchangeError::InsufficientLiquidityMinted);
        }
        Ok(root - minimum_liquidity)
    }

    /// Shares for a later deposit: the lower of the two proportional claims
    pub fn proportional_shares(
        amount0: U256,
        amount1: U256,
        reserve0: U256,
        reserve1: U256,
        total_shares: U256,
    ) -> Result<U256> {
        if reserve0.is_zero() || reserve1.is_zero() {
            return Err(ExchangeError::InsufficientLiquidity);
        }
        let by0 = mul(amount0, total_shares)? / reserve0;
        let by1 = mul(amount1, total_shares)? / reserve1;
        let shares = by0.min(by1);
        if shares.is_zero() {
            return Err(ExchangeError::InsufficientLiquidityMinted);
        }
        Ok(shares)
    }

    /// Underlying amounts redeemed by `shares`
    pub fn burn_amounts(
        shares: U256,
        reserve0: U256,
        reserve1: U256,
        total_shares: U256,
    ) -> Result<(U256, U256)> {
        if total_shares.is_zero() || shares > total_shares {
            return Err(ExchangeError::InsufficientLiquidityBurned);
        }
        let amount0 = mul(shares, reserve0)? / total_shares;
        let amount1 = mul(shares, reserve1)? / total_shares;
        if amount0.is_zero() || amount1.is_zero() {
            return Err(ExchangeError::InsufficientLiquidityBurned);
        }
        Ok((amount0, amount1))
    }

    /// Shares owed to the protocol fee recipient
    ///
    /// One sixth of the growth in `sqrt(k)` since `k_last`:
    /// `total * (rootK - rootKLast) / (rootK * 5 + rootKLast)`.
    pub fn protocol_fee_shares(
        reserve0: U256,
        reserve1: U256,
        k_last: U256,
        total_shares: U256,
    ) -> Result<U256> {
        if k_last.is_zero() {
            return Ok(U256::zero());
        }
        let root_k = Self::sqrt(mul(reserve0, reserve1)?);
        let root_k_last = Self::sqrt(k_last);
        if root_k <= root_k_last {
            return Ok(U256::zero());
        }
        let numerator = mul(total_shares, root_k - root_k_last)?;
        let denominator = add(mul(root_k, U256::from(5u8))?, root_k_last)?;
        Ok(numerator / denominator)
    }

    /// True when `after.0 * after.1 >= before.0 * before.1`
    ///
    /// Products are widened to 512 bits, so this cannot overflow.
    pub fn product_non_decreasing(before: (U256, U256), after: (U256, U256)) -> bool {
        after.0.full_mul(after.1) >= before.0.full_mul(before.1)
    }

    /// Integer square root (floor) by Newton's method
    pub fn sqrt(value: U256) -> U256 {
        if value.is_zero() {
            return U256::zero();
        }
        if value <= U256::from(3u8) {
            return U256::one();
        }

        // Initial guess at or above the root; iterate x_new = (x + value/x) / 2
        let mut x = value;
        let two = U256::from(2u8);
        let mut next = value / two + U256::one();
        while next < x {
            x = next;
            next = (value / x + x) / two;
        }
        x
    }
}

/// `10000 - fee_bps` as U256
fn fee_multiplier(fee_bps: u32) -> Result<U256> {
    BPS_DENOMINATOR
        .checked_sub(fee_bps)
        .map(U256::from)
        .ok_or_else(|| ExchangeError::InvalidParameter {
            name: "fee_bps",
            reason: format!("{} exceeds {}", fee_bps, BPS_DENOMINATOR),
        })
}

fn mul(a: U256, b: U256) -> Result<U256> {
    a.checked_mul(b).ok_or(ExchangeError::ArithmeticOverflow)
}

fn add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(ExchangeError::ArithmeticOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(v: u64) -> U256 {
        U256::from(v)
    }

    #[test]
    fn test_small_swap_rounds_down() {
        // 10 in against 1000:1000 at 0.3%: 99_700_000 / 10_099_700 = 9.87 -> 9
        let out = ConstantProduct::get_amount_out(u(10), u(1000), u(1000), 30).unwrap();
        assert_eq!(out, u(9));
    }

    #[test]
    fn test_output_calculation() {
        // 100 tokens in, 1000:2000 reserves, 0.3% fee: ~181.32 tokens out
        let out = ConstantProduct::get_amount_out(u(100), u(1000), u(2000), 30).unwrap();
        assert_eq!(out, u(181));
    }

    #[test]
    fn test_zero_fee_output() {
        let out = ConstantProduct::get_amount_out(u(1000), u(1000), u(1000), 0).unwrap();
        assert_eq!(out, u(500));
    }

    #[test]
    fn test_output_rejects_empty_inputs() {
        assert_eq!(
            ConstantProduct::get_amount_out(U256::zero(), u(1000), u(1000), 30),
            Err(ExchangeError::InsufficientInputAmount)
        );
        assert_eq!(
            ConstantProduct::get_amount_out(u(10), U256::zero(), u(1000), 30),
            Err(ExchangeError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_fee_above_denominator_is_rejected() {
        assert!(matches!(
            ConstantProduct::get_amount_out(u(10), u(1000), u(1000), 10_001),
            Err(ExchangeError::InvalidParameter { name: "fee_bps", .. })
        ));
    }

    #[test]
    fn test_amount_in_covers_amount_out() {
        let reserve_in = u(1_000_000);
        let reserve_out = u(2_000_000);
        let wanted = u(12_345);

        let needed = ConstantProduct::get_amount_in(wanted, reserve_in, reserve_out, 30).unwrap();
        let got = ConstantProduct::get_amount_out(needed, reserve_in, reserve_out, 30).unwrap();
        assert!(got >= wanted);

        // One unit less must not be enough
        let short = ConstantProduct::get_amount_out(needed - U256::one(), reserve_in, reserve_out, 30).unwrap();
        assert!(short <= wanted);
    }

    #[test]
    fn test_amount_in_rejects_draining_the_pool() {
        assert_eq!(
            ConstantProduct::get_amount_in(u(1000), u(1000), u(1000), 30),
            Err(ExchangeError::InsufficientLiquidity)
        );
    }

    #[test]
    fn test_quote_preserves_ratio() {
        assert_eq!(ConstantProduct::quote(u(10), u(100), u(250)).unwrap(), u(25));
    }

    #[test]
    fn test_initial_shares_locks_minimum() {
        assert_eq!(
            ConstantProduct::initial_shares(u(100_000), u(100_000), u(1000)).unwrap(),
            u(99_000)
        );
        assert_eq!(
            ConstantProduct::initial_shares(u(1000), u(1000), u(1000)),
            Err(ExchangeError::InsufficientLiquidityMinted)
        );
    }

    #[test]
    fn test_proportional_shares_takes_lower_claim() {
        // Depositing 10% of reserve0 but 20% of reserve1 only earns 10%
        let shares =
            ConstantProduct::proportional_shares(u(100), u(400), u(1000), u(2000), u(5000)).unwrap();
        assert_eq!(shares, u(500));
    }

    #[test]
    fn test_burn_amounts_are_proportional() {
        let (a0, a1) = ConstantProduct::burn_amounts(u(250), u(1000), u(4000), u(1000)).unwrap();
        assert_eq!((a0, a1), (u(250), u(1000)));

        assert_eq!(
            ConstantProduct::burn_amounts(u(1), u(10), u(10_000), u(1000)),
            Err(ExchangeError::InsufficientLiquidityBurned)
        );
    }

    #[test]
    fn test_protocol_fee_on_growth() {
        // k grew from 1000*1000 to 1100*1100: root 1000 -> 1100
        let fee = ConstantProduct::protocol_fee_shares(u(1100), u(1100), u(1_000_000), u(1000)).unwrap();
        // 1000 * 100 / (5500 + 1000) = 15
        assert_eq!(fee, u(15));

        let none = ConstantProduct::protocol_fee_shares(u(1000), u(1000), u(1_000_000), u(1000)).unwrap();
        assert!(none.is_zero());
    }

    #[test]
    fn test_product_comparison_handles_huge_values() {
        let big = U256::MAX;
        assert!(ConstantProduct::product_non_decreasing((big, big), (big, big)));
        assert!(!ConstantProduct::product_non_decreasing((big, big), (big, big - U256::one())));
    }

    #[test]
    fn test_sqrt_accuracy() {
        assert_eq!(ConstantProduct::sqrt(U256::zero()), U256::zero());
        assert_eq!(ConstantProduct::sqrt(u(1)), u(1));
        assert_eq!(ConstantProduct::sqrt(u(3)), u(1));
        assert_eq!(ConstantProduct::sqrt(u(4)), u(2));
        assert_eq!(ConstantProduct::sqrt(u(99)), u(9));
        assert_eq!(ConstantProduct::sqrt(u(10_000_000_000)), u(100_000));

        let root = ConstantProduct::sqrt(U256::MAX);
        assert_eq!(root, U256::from(u128::MAX));
    }
}
