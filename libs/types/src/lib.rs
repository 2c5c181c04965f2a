//! # Leafswap Types Library
//!
//! Shared vocabulary of the exchange engine: addresses and token
//! identifiers, the call context supplied by the host, the error taxonomy, and
//! the events a committed call publishes.
//!
//! ## Design Philosophy
//!
//! - **Integer Amounts**: every amount is a 256-bit unsigned integer ([`U256`])
//! - **Generic Tokens**: components are generic over [`TokenId`]; [`Address`] is the default
//! - **One Error Enum**: [`ExchangeError`] carries the whole taxonomy so a router
//!   call can abort from any layer with `?`
//!
//! ## Quick Start
//!
//! ```rust
//! use leafswap_types::{sort_tokens, Address, CallContext, ExchangeError};
//!
//! let tka = Address::from_low_u64_be(0xa);
//! let ctx = CallContext::new(Address::from_low_u64_be(1), 100, 1_700_000_000);
//!
//! assert_eq!(sort_tokens(tka, tka), Err(ExchangeError::IdenticalTokens));
//! assert!(ctx.ensure_not_expired(1_700_000_300).is_ok());
//! ```

pub mod common;
pub mod events;

pub use common::{
    pair_account, sort_tokens, Address, CallContext, ExchangeError, PairId, Result, TokenId,
    U256, ZERO_ADDRESS,
};
pub use events::ExchangeEvent;
