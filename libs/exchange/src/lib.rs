//! # Leafswap Exchange - Pairs, Factory and Router
//!
//! ## Purpose
//!
//! The stateful half of the exchange: per-pair reserve state machines, the
//! factory registry that creates them, and the router that strings pair
//! operations and ledger transfers into atomic calls.
//!
//! ## Architecture
//!
//! ```text
//! Router ──► Factory (resolve / create pair)
//!   │            └─► MevGuard.set_block_edge
//!   ├──► Pair (Mutex<PairState>) ──► MevGuard.defend
//!   ├──► TokenLedger (one staged journal per call)
//!   └──► EventBus (after commit)
//! ```
//!
//! ## Concurrency
//!
//! - One mutex per pair, acquired with a timeout (`Locked` on expiry)
//! - Multi-hop calls lock their pairs in ascending [`PairId`] order
//! - Pair state is mutated on copies and written back after the ledger commits
//!
//! [`PairId`]: leafswap_types::PairId

pub mod event_bus;
pub mod exchange;
pub mod factory;
pub mod pair;
pub mod router;

pub use event_bus::EventBus;
pub use exchange::Exchange;
pub use factory::Factory;
pub use pair::{BurnOutcome, MintOutcome, Pair, PairState, Side, SwapEnv, SwapOutcome};
pub use router::{AddLiquidity, RemoveLiquidity, Router, SingleSwap};
