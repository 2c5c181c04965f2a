//! Pool trait definitions for unified AMM interface

use crate::{ConstantProduct, ReserveSnapshot};
use leafswap_types::{Result, U256};

/// Unified pool interface for quoting
pub trait AmmPool {
    /// Calculate output amount for given input
    fn get_amount_out(&self, amount_in: U256) -> Result<U256>;

    /// Calculate required input for desired output
    fn get_amount_in(&self, amount_out: U256) -> Result<U256>;

    /// Get current reserves as (in, out)
    fn get_liquidity(&self) -> (U256, U256);

    /// Get fee tier
    fn get_fee_bps(&self) -> u32;
}

impl AmmPool for ReserveSnapshot {
    fn get_amount_out(&self, amount_in: U256) -> Result<U256> {
        ConstantProduct::get_amount_out(amount_in, self.reserve_in, self.reserve_out, self.fee_bps)
    }

    fn get_amount_in(&self, amount_out: U256) -> Result<U256> {
        ConstantProduct::get_amount_in(amount_out, self.reserve_in, self.reserve_out, self.fee_bps)
    }

    fn get_liquidity(&self) -> (U256, U256) {
        (self.reserve_in, self.reserve_out)
    }

    fn get_fee_bps(&self) -> u32 {
        self.fee_bps
    }
}

/// Chain exact-input quotes across consecutive pools
///
/// Returns every intermediate amount, starting with `amount_in`.
pub fn chain_amounts_out<P: AmmPool>(amount_in: U256, pools: &[P]) -> Result<Vec<U256>> {
    let mut amounts = Vec::with_capacity(pools.len() + 1);
    amounts.push(amount_in);
    let mut current = amount_in;
    for pool in pools {
        current = pool.get_amount_out(current)?;
        amounts.push(current);
    }
    Ok(amounts)
}

/// Chain exact-output quotes backwards across consecutive pools
///
/// Returns every intermediate amount, ending with `amount_out`.
pub fn chain_amounts_in<P: AmmPool>(amount_out: U256, pools: &[P]) -> Result<Vec<U256>> {
    let mut amounts = vec![U256::zero(); pools.len() + 1];
    amounts[pools.len()] = amount_out;
    for (i, pool) in pools.iter().enumerate().rev() {
        amounts[i] = pool.get_amount_in(amounts[i + 1])?;
    }
    Ok(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(r_in: u64, r_out: u64) -> ReserveSnapshot {
        ReserveSnapshot::new(U256::from(r_in), U256::from(r_out), 30)
    }

    #[test]
    fn test_chain_out_feeds_each_hop() {
        let pools = [pool(1_000_000, 1_000_000), pool(2_000_000, 1_000_000)];
        let amounts = chain_amounts_out(U256::from(1_000u64), &pools).unwrap();

        assert_eq!(amounts.len(), 3);
        assert_eq!(amounts[0], U256::from(1_000u64));
        assert_eq!(amounts[1], pools[0].get_amount_out(amounts[0]).unwrap());
        assert_eq!(amounts[2], pools[1].get_amount_out(amounts[1]).unwrap());
    }

    #[test]
    fn test_chain_in_then_out_reaches_target() {
        let pools = [pool(1_000_000, 3_000_000), pool(500_000, 800_000)];
        let target = U256::from(10_000u64);

        let ins = chain_amounts_in(target, &pools).unwrap();
        assert_eq!(ins[2], target);

        let outs = chain_amounts_out(ins[0], &pools).unwrap();
        assert!(outs[2] >= target);
    }

    #[test]
    fn test_flipped_snapshot() {
        let snap = pool(10, 20).flipped();
        assert_eq!(snap.get_liquidity(), (U256::from(20u64), U256::from(10u64)));
        assert_eq!(snap.get_fee_bps(), 30);
    }
}
