//! MEV protection for freshly created pairs
//!
//! For a window of blocks after a pair is created, swaps by traders who
//! opted in must move at least a minimum share of the output reserve and
//! pay an extra fee on their output. The fee stays in the pool.

pub mod protection;

pub use protection::{DefendOutcome, DefendRequest, MevGuard, MevGuardStats};
