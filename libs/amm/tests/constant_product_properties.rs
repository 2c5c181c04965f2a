//! Constant-Product Property Tests
//!
//! Mathematical properties that must hold for every input the pair math
//! accepts, independent of concrete reserves.

use leafswap_amm::{chain_amounts_out, AmmPool, ConstantProduct, ReserveSnapshot};
use leafswap_types::U256;
use proptest::prelude::*;

prop_compose! {
    fn valid_reserve()
        (reserve in 1_000u128..1_000_000_000_000_000_000_000u128) -> U256 {
        U256::from(reserve)
    }
}

prop_compose! {
    fn valid_fee()
        (fee_bps in 0u32..1_000u32) -> u32 {
        fee_bps
    }
}

prop_compose! {
    fn snapshot()
        (reserve_in in valid_reserve(), reserve_out in valid_reserve(), fee_bps in valid_fee())
        -> ReserveSnapshot {
        ReserveSnapshot::new(reserve_in, reserve_out, fee_bps)
    }
}

proptest! {
    #[test]
    fn swap_never_shrinks_reserve_product(
        pool in snapshot(),
        amount_in in 1u128..1_000_000_000_000_000_000u128,
    ) {
        let amount_in = U256::from(amount_in);
        if let Ok(amount_out) = pool.get_amount_out(amount_in) {
            prop_assert!(amount_out < pool.reserve_out);
            let after = (pool.reserve_in + amount_in, pool.reserve_out - amount_out);
            prop_assert!(ConstantProduct::product_non_decreasing(
                (pool.reserve_in, pool.reserve_out),
                after,
            ));
        }
    }

    #[test]
    fn output_is_monotonic_in_input(
        pool in snapshot(),
        small in 1u64..1_000_000u64,
        extra in 0u64..1_000_000u64,
    ) {
        let small = U256::from(small);
        let large = small + U256::from(extra);
        let out_small = pool.get_amount_out(small);
        let out_large = pool.get_amount_out(large);
        if let (Ok(a), Ok(b)) = (out_small, out_large) {
            prop_assert!(a <= b);
        }
    }

    #[test]
    fn higher_fee_never_pays_more(
        reserve_in in valid_reserve(),
        reserve_out in valid_reserve(),
        amount_in in 1u64..u64::MAX,
        fee in valid_fee(),
    ) {
        let amount_in = U256::from(amount_in);
        let cheap = ConstantProduct::get_amount_out(amount_in, reserve_in, reserve_out, fee).unwrap();
        let dear = ConstantProduct::get_amount_out(amount_in, reserve_in, reserve_out, fee + 1).unwrap();
        prop_assert!(dear <= cheap);
    }

    #[test]
    fn mint_then_burn_never_returns_more(
        reserve0 in valid_reserve(),
        reserve1 in valid_reserve(),
        total in valid_reserve(),
        deposit0 in 1u64..u64::MAX,
        deposit1 in 1u64..u64::MAX,
    ) {
        let (d0, d1) = (U256::from(deposit0), U256::from(deposit1));
        if let Ok(shares) = ConstantProduct::proportional_shares(d0, d1, reserve0, reserve1, total) {
            let burned = ConstantProduct::burn_amounts(
                shares,
                reserve0 + d0,
                reserve1 + d1,
                total + shares,
            );
            if let Ok((back0, back1)) = burned {
                prop_assert!(back0 <= d0);
                prop_assert!(back1 <= d1);
            }
        }
    }

    #[test]
    fn sqrt_is_floor_root(value in any::<u128>()) {
        let value = U256::from(value);
        let root = ConstantProduct::sqrt(value);
        prop_assert!(root * root <= value);
        let next = root + U256::one();
        prop_assert!(next * next > value);
    }

    #[test]
    fn chained_quote_matches_manual_hops(
        first in snapshot(),
        second in snapshot(),
        amount_in in 1u64..1_000_000_000u64,
    ) {
        let amount_in = U256::from(amount_in);
        if let Ok(amounts) = chain_amounts_out(amount_in, &[first, second]) {
            let hop1 = first.get_amount_out(amount_in).unwrap();
            prop_assert_eq!(amounts[1], hop1);
            prop_assert_eq!(amounts[2], second.get_amount_out(hop1).unwrap());
        }
    }
}
