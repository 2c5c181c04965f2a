//! Property-Based Tests for Exchange Invariants
//!
//! Random trade and liquidity sequences against a live exchange; after
//! every call the books must still agree with each other.

use leafswap_config::ExchangeConfig;
use leafswap_exchange::{AddLiquidity, Exchange, RemoveLiquidity};
use leafswap_types::{Address, CallContext, U256};
use proptest::prelude::*;

const OWNER: u64 = 1;
const LP: u64 = 0x11;
const TRADER: u64 = 0x22;
const TKA: u64 = 0xA;
const TKB: u64 = 0xB;
const DEADLINE: u64 = u64::MAX;

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn ctx(caller: u64, block: u64) -> CallContext {
    CallContext::new(addr(caller), block, 0)
}

fn funded_exchange(config: ExchangeConfig) -> Exchange {
    let exchange: Exchange = Exchange::new(config, addr(OWNER)).unwrap();
    for token in [TKA, TKB] {
        exchange
            .ledger()
            .register_token(addr(token), format!("T{token}"), 18)
            .unwrap();
        for user in [LP, TRADER] {
            exchange
                .ledger()
                .issue(&addr(token), addr(user), U256::exp10(30))
                .unwrap();
            exchange
                .approve_router(&ctx(user, 0), &addr(token), U256::MAX)
                .unwrap();
        }
    }
    exchange
}

fn seed(exchange: &Exchange, amount_a: u128, amount_b: u128) -> U256 {
    exchange
        .router()
        .add_liquidity(
            &ctx(LP, 1),
            &AddLiquidity {
                token_a: addr(TKA),
                token_b: addr(TKB),
                amount_a_desired: U256::from(amount_a),
                amount_b_desired: U256::from(amount_b),
                amount_a_min: U256::zero(),
                amount_b_min: U256::zero(),
                to: addr(LP),
                deadline: DEADLINE,
            },
        )
        .unwrap()
        .2
}

#[derive(Debug, Clone)]
struct Trade {
    a_to_b: bool,
    amount: u128,
}

prop_compose! {
    fn reserve_amount()(amount in 1_000_000u128..1_000_000_000_000_000_000u128) -> u128 {
        amount
    }
}

prop_compose! {
    fn trade()(a_to_b in any::<bool>(), amount in 1u128..10_000_000_000_000_000u128) -> Trade {
        Trade { a_to_b, amount }
    }
}

prop_compose! {
    fn mev_config()(
        window in 0u64..50,
        fee_bps in 0u32..500,
        limit_bps in 0u32..100,
    ) -> ExchangeConfig {
        let mut config = ExchangeConfig::default();
        config.mev.anti_front_defend_block = window;
        config.mev.anti_mev_fee_bps = fee_bps;
        config.mev.anti_mev_amount_out_limit_bps = limit_bps;
        config
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reserves_match_custody_and_product_never_shrinks(
        config in mev_config(),
        reserve_a in reserve_amount(),
        reserve_b in reserve_amount(),
        trades in prop::collection::vec(trade(), 1..30),
        protected in any::<bool>(),
    ) {
        let exchange = funded_exchange(config);
        seed(&exchange, reserve_a, reserve_b);
        exchange
            .set_user_mev_enabled(&ctx(TRADER, 1), addr(TRADER), protected)
            .unwrap();
        let account = exchange.get_pair(&addr(TKA), &addr(TKB)).unwrap().account();

        let mut last = exchange.pair_state(&addr(TKA), &addr(TKB)).unwrap().reserves();
        for (block, trade) in trades.iter().enumerate() {
            let path = if trade.a_to_b {
                [addr(TKA), addr(TKB)]
            } else {
                [addr(TKB), addr(TKA)]
            };
            // Rejections (size floor, tiny outputs) are fine; they must leave no trace
            let _ = exchange.router().swap_exact_tokens_for_tokens(
                &ctx(TRADER, block as u64),
                U256::from(trade.amount),
                U256::zero(),
                &path,
                addr(TRADER),
                DEADLINE,
            );

            let state = exchange.pair_state(&addr(TKA), &addr(TKB)).unwrap();
            let reserves = state.reserves();
            prop_assert_eq!(exchange.ledger().balance_of(&state.token0, account), reserves.0);
            prop_assert_eq!(exchange.ledger().balance_of(&state.token1, account), reserves.1);
            prop_assert!(reserves.0.full_mul(reserves.1) >= last.0.full_mul(last.1));
            last = reserves;
        }

        // Supply is conserved across traders, provider and pair
        for token in [TKA, TKB] {
            let held = [LP, TRADER]
                .iter()
                .map(|user| exchange.ledger().balance_of(&addr(token), addr(*user)))
                .fold(exchange.ledger().balance_of(&addr(token), account), |acc, b| acc + b);
            prop_assert_eq!(held, exchange.ledger().total_supply(&addr(token)));
        }
    }

    #[test]
    fn mint_then_burn_never_returns_more_than_deposited(
        reserve_a in reserve_amount(),
        reserve_b in reserve_amount(),
        deposit_a in 1_000u128..1_000_000_000_000_000u128,
        deposit_b in 1_000u128..1_000_000_000_000_000u128,
    ) {
        let exchange = funded_exchange(ExchangeConfig::default());
        seed(&exchange, reserve_a, reserve_b);

        let before_a = exchange.ledger().balance_of(&addr(TKA), addr(TRADER));
        let before_b = exchange.ledger().balance_of(&addr(TKB), addr(TRADER));

        let added = exchange.router().add_liquidity(
            &ctx(TRADER, 2),
            &AddLiquidity {
                token_a: addr(TKA),
                token_b: addr(TKB),
                amount_a_desired: U256::from(deposit_a),
                amount_b_desired: U256::from(deposit_b),
                amount_a_min: U256::zero(),
                amount_b_min: U256::zero(),
                to: addr(TRADER),
                deadline: DEADLINE,
            },
        );
        let Ok((_, _, shares)) = added else {
            return Ok(());
        };

        let removed = exchange.router().remove_liquidity(
            &ctx(TRADER, 3),
            &RemoveLiquidity {
                token_a: addr(TKA),
                token_b: addr(TKB),
                shares,
                amount_a_min: U256::zero(),
                amount_b_min: U256::zero(),
                to: addr(TRADER),
                deadline: DEADLINE,
            },
        );
        if removed.is_ok() {
            prop_assert!(exchange.ledger().balance_of(&addr(TKA), addr(TRADER)) <= before_a);
            prop_assert!(exchange.ledger().balance_of(&addr(TKB), addr(TRADER)) <= before_b);
        }
    }
}
