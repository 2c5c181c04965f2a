//! Protocol constants for the constant-product exchange
//!
//! Amount-independent numbers every component agrees on: the basis-point
//! scale, fee ceilings, and deployment defaults.

/// Basis-point denominator (10,000 bps = 100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Upper bound on the factory swap fee (10%)
pub const MAX_SWAP_FEE_BPS: u32 = 1_000;

/// Default swap fee (0.3%)
pub const DEFAULT_SWAP_FEE_BPS: u32 = 30;

/// Shares permanently locked to the zero account on the first mint
pub const DEFAULT_MINIMUM_LIQUIDITY: u64 = 1_000;

/// How long a caller waits for a busy pair before giving up with `Locked`
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 250;

/// MEV guard defaults
pub mod mev {
    /// Anti-front-running window after pair creation (blocks)
    pub const DEFAULT_ANTI_FRONT_DEFEND_BLOCK: u64 = 100;

    /// Fee deducted from protected swaps inside the window (1%)
    pub const DEFAULT_ANTI_MEV_FEE_BPS: u32 = 100;

    /// Minimum protected output as a share of the output reserve (0.5%)
    pub const DEFAULT_ANTI_MEV_AMOUNT_OUT_LIMIT_BPS: u32 = 50;
}
