//! # Leafswap Ledger - Fungible Token Balances
//!
//! ## Purpose
//!
//! In-process replacement for the token contracts an exchange talks to:
//! balances, allowances, a registry of token metadata and issued supply.
//!
//! ## Architecture
//!
//! ```text
//! Router call ──► LedgerTx (staged deltas, reads see base + deltas)
//!                    │
//!                    └── commit() ──► TokenLedger (single write lock,
//!                                     re-validate, apply all or nothing)
//! ```
//!
//! Every exchange call stages its transfers in one [`LedgerTx`] and commits
//! once at the end. A call that fails simply drops its journal.

pub mod ledger;
pub mod staging;

pub use ledger::{LedgerStats, TokenInfo, TokenLedger};
pub use staging::LedgerTx;
