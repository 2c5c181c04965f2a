//! # Identifier System - Token Identifiers + Typed ID Wrappers
//!
//! Two kinds of identifiers flow through the exchange:
//!
//! ### 1. Token identifiers
//! - Any type implementing [`TokenId`] can name a token
//! - [`Address`] (160-bit, address-equivalent) is the default
//! - Canonical pair ordering comes from `Ord`: `token0 < token1`
//!
//! ### 2. Typed simple IDs
//! - Zero-cost wrappers for sequential `u64` identifiers ([`PairId`])
//! - Prevents mixing a pair index with any other counter
//!
//! ```rust
//! use leafswap_types::{sort_tokens, Address};
//!
//! let a = Address::from_low_u64_be(2);
//! let b = Address::from_low_u64_be(1);
//! assert_eq!(sort_tokens(a, b).unwrap(), (b, a));
//! ```

use crate::common::errors::{ExchangeError, Result};
use ethers_core::utils::keccak256;
use std::fmt::Debug;
use std::hash::Hash;

pub use ethers_core::types::{Address, U256};

/// Account that receives the permanently locked minimum liquidity
pub const ZERO_ADDRESS: Address = Address::zero();

/// Identifier of a fungible token
///
/// Implementors must provide a total order (used to canonicalize pairs) and a
/// stable byte encoding (used to derive pair custody accounts).
pub trait TokenId: Clone + Ord + Hash + Debug + Send + Sync + 'static {
    /// Stable byte encoding of the identifier
    fn id_bytes(&self) -> Vec<u8>;
}

impl TokenId for Address {
    fn id_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl TokenId for String {
    fn id_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Order two tokens canonically, rejecting identical inputs
pub fn sort_tokens<T: TokenId>(token_a: T, token_b: T) -> Result<(T, T)> {
    if token_a == token_b {
        return Err(ExchangeError::IdenticalTokens);
    }
    if token_a < token_b {
        Ok((token_a, token_b))
    } else {
        Ok((token_b, token_a))
    }
}

/// Deterministic custody account for a pair
///
/// `keccak256(factory || keccak256(token0) || keccak256(token1))` truncated to
/// the low 20 bytes, the same shape as a CREATE2 address. Hashing each id
/// keeps the preimage fixed-width for variable-length ids. Tokens must
/// already be sorted.
pub fn pair_account<T: TokenId>(factory: Address, token0: &T, token1: &T) -> Address {
    let mut preimage = Vec::with_capacity(20 + 64);
    preimage.extend_from_slice(factory.as_bytes());
    preimage.extend_from_slice(&keccak256(token0.id_bytes()));
    preimage.extend_from_slice(&keccak256(token1.id_bytes()));
    let hash = keccak256(&preimage);
    Address::from_slice(&hash[12..])
}

/// Macro to generate typed ID wrappers
///
/// Creates a newtype wrapper around u64 with:
/// - Zero runtime cost (`#[repr(transparent)]`)
/// - Compile-time type safety
/// - Serde support as a raw u64
macro_rules! define_typed_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new typed ID
            #[inline(always)]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Extract the inner u64 value
            #[inline(always)]
            pub const fn inner(&self) -> u64 {
                self.0
            }

            /// Generate next sequential ID
            #[inline(always)]
            pub fn next(&self) -> Self {
                Self(self.0.wrapping_add(1))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            #[inline(always)]
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            #[inline(always)]
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

define_typed_id!(
    /// Position of a pair in the factory's creation order
    PairId
);
