//! Error taxonomy for the exchange engine
//!
//! Every fallible operation in the ledger, pair, guard, factory and router
//! returns [`ExchangeError`]. Errors are terminal for the triggering call:
//! staged ledger journals and staged pair copies are dropped, so nothing
//! observable changes when an error is returned.

use ethers_core::types::U256;
use thiserror::Error;

/// Convenience alias used across the workspace
pub type Result<T, E = ExchangeError> = std::result::Result<T, E>;

/// Errors that can occur while operating the exchange
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    // Input validation
    /// Both sides of a pair refer to the same token
    #[error("identical tokens")]
    IdenticalTokens,

    /// Call arrived after its deadline
    #[error("expired: deadline {deadline} is before block timestamp {now}")]
    Expired { deadline: u64, now: u64 },

    /// Ratio-adjusted amount of token A fell below the caller's minimum
    #[error("insufficient A amount")]
    InsufficientAAmount,

    /// Ratio-adjusted amount of token B fell below the caller's minimum
    #[error("insufficient B amount")]
    InsufficientBAmount,

    /// Final output of a swap fell below the caller's minimum
    #[error("insufficient output amount")]
    InsufficientOutputAmount,

    /// Swap or quote requested with a zero input
    #[error("insufficient input amount")]
    InsufficientInputAmount,

    /// Exact-output swap needs more input than the caller allowed
    #[error("excessive input amount")]
    ExcessiveInputAmount,

    /// Pair has no reserves (or not enough) to serve the request
    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    /// Swap path is too short or names a token the pair does not hold
    #[error("invalid path: {reason}")]
    InvalidPath { reason: String },

    /// Single-pair swap output fell below `min_amount_out`
    #[error("slippage exceeded: got {actual}, wanted at least {minimum}")]
    SlippageExceeded { actual: U256, minimum: U256 },

    // Ledger
    /// Debit larger than the account balance
    #[error("insufficient balance")]
    InsufficientBalance,

    /// Spender allowance below the requested amount
    #[error("insufficient allowance")]
    InsufficientAllowance,

    /// Checked 256-bit arithmetic overflowed or underflowed
    #[error("arithmetic overflow")]
    ArithmeticOverflow,

    /// Token registered twice
    #[error("token already registered")]
    TokenExists,

    /// Issuance requested for a token the ledger does not know
    #[error("token not registered")]
    TokenNotRegistered,

    // Pair lifecycle
    #[error("pair exists")]
    PairExists,

    #[error("pair not found")]
    PairNotFound,

    #[error("insufficient liquidity minted")]
    InsufficientLiquidityMinted,

    #[error("insufficient liquidity burned")]
    InsufficientLiquidityBurned,

    /// Post-swap reserve product dropped below the pre-swap product
    #[error("constant-product invariant violated")]
    InvariantViolation,

    /// Pair is busy with another call
    #[error("pair locked")]
    Locked,

    // Guard / authorization
    #[error("permission denied")]
    PermissionDenied,

    /// Protected swap below the minimum output size
    #[error("amount too small: output {amount_out} below floor {floor}")]
    AmountTooSmall { amount_out: U256, floor: U256 },

    /// Swap fee rate above the protocol maximum
    #[error("swap fee rate too high: {fee_bps} bps exceeds {max_bps} bps")]
    FeeTooHigh { fee_bps: u32, max_bps: u32 },

    /// Parameter outside its valid range
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl ExchangeError {
    /// Build an [`ExchangeError::InvalidPath`] from any message
    pub fn invalid_path(reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            reason: reason.into(),
        }
    }

    /// True for errors that indicate a logic bug rather than bad input
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation)
    }
}
