//! # Leafswap AMM Library - Constant-Product Pair Mathematics
//!
//! ## Purpose
//!
//! Pure integer mathematics for a constant-product exchange: swap quotes in
//! both directions, ratio quotes for deposits, pool-share issuance and
//! redemption, the protocol fee on sqrt(k) growth, and the invariant check
//! used after every swap. Decimal analytics (spot price, price impact,
//! slippage) sit on top for display.
//!
//! ## Integration Points
//!
//! - **Pair state machine**: share issuance, burn amounts, invariant checks
//! - **Router**: multi-hop exact-input / exact-output quoting via [`AmmPool`]
//! - **Clients**: price impact and spot price as [`Decimal`]
//!
//! ## Precision
//!
//! - All amounts are 256-bit unsigned integers with checked arithmetic
//! - Every division rounds down (in the pool's favor); reverse quotes round up
//! - No floating point anywhere

pub mod analytics;
pub mod constant_product;
pub mod pool_traits;

pub use constant_product::{ConstantProduct, ReserveSnapshot};
pub use pool_traits::{chain_amounts_in, chain_amounts_out, AmmPool};

/// Decimal type of the price analytics
pub use rust_decimal::Decimal;
