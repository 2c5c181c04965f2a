//! Common types shared by every exchange crate

pub mod context;
pub mod errors;
pub mod identifiers;

pub use context::CallContext;
pub use errors::{ExchangeError, Result};
pub use identifiers::{
    pair_account, sort_tokens, Address, PairId, TokenId, U256, ZERO_ADDRESS,
};
