//! Externally visible exchange events
//!
//! Besides balance changes these are the only observable effects of the
//! engine. They are published after a call commits and never for a failed
//! call.

use crate::common::identifiers::{Address, PairId, U256};
use serde::Serialize;

/// Event emitted by a committed exchange call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExchangeEvent<T> {
    /// New pair registered in the factory
    PairCreated {
        pair: PairId,
        account: Address,
        token0: T,
        token1: T,
        all_pairs_length: u64,
    },

    /// Reserves changed
    Sync {
        pair: PairId,
        reserve0: U256,
        reserve1: U256,
    },

    /// Shares issued against a deposit
    Mint {
        pair: PairId,
        provider: Address,
        shares: U256,
        amount0: U256,
        amount1: U256,
    },

    /// Shares redeemed for the underlying tokens
    Burn {
        pair: PairId,
        provider: Address,
        shares: U256,
        amount0: U256,
        amount1: U256,
        recipient: Address,
    },

    /// One swap hop executed
    Swap {
        pair: PairId,
        trader: Address,
        token_in: T,
        amount_in: U256,
        amount_out: U256,
        mev_fee: U256,
        recipient: Address,
    },
}

impl<T> ExchangeEvent<T> {
    /// Pair the event belongs to
    pub fn pair(&self) -> PairId {
        match self {
            Self::PairCreated { pair, .. }
            | Self::Sync { pair, .. }
            | Self::Mint { pair, .. }
            | Self::Burn { pair, .. }
            | Self::Swap { pair, .. } => *pair,
        }
    }

    /// Short event name, handy for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PairCreated { .. } => "pair_created",
            Self::Sync { .. } => "sync",
            Self::Mint { .. } => "mint",
            Self::Burn { .. } => "burn",
            Self::Swap { .. } => "swap",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag_matches_kind() {
        let pair = PairId::new(3);
        let events: Vec<ExchangeEvent<String>> = vec![
            ExchangeEvent::PairCreated {
                pair,
                account: Address::from_low_u64_be(0xcc),
                token0: "TKA".to_string(),
                token1: "TKB".to_string(),
                all_pairs_length: 1,
            },
            ExchangeEvent::Sync {
                pair,
                reserve0: U256::from(10u64),
                reserve1: U256::from(20u64),
            },
            ExchangeEvent::Swap {
                pair,
                trader: Address::from_low_u64_be(7),
                token_in: "TKA".to_string(),
                amount_in: U256::from(5u64),
                amount_out: U256::from(9u64),
                mev_fee: U256::zero(),
                recipient: Address::from_low_u64_be(7),
            },
        ];

        for event in &events {
            let json = serde_json::to_value(event).unwrap();
            assert_eq!(json["event"], event.kind());
            assert_eq!(event.pair(), pair);
        }

        let swap = serde_json::to_value(&events[2]).unwrap();
        assert_eq!(swap["token_in"], "TKA");
        assert!(swap.get("mev_fee").is_some());
    }
}
