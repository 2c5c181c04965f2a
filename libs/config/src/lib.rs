//! # Leafswap Configuration
//!
//! Centralized configuration and protocol constants for the exchange engine.
//!
//! ## Features
//!
//! - **Protocol Constants**: basis-point scale, fee ceilings, defaults
//! - **Exchange Configuration**: swap fee, minimum liquidity, lock timeout and
//!   MEV guard parameters, loaded from TOML with `LEAFSWAP_` environment overrides
//!
//! ## Usage
//!
//! ```rust
//! use leafswap_config::{protocol, ExchangeConfig};
//!
//! let config = ExchangeConfig::default();
//! assert_eq!(config.swap_fee_bps, protocol::DEFAULT_SWAP_FEE_BPS);
//! assert!(config.validate().is_ok());
//! ```

pub mod exchange_config;
pub mod protocol;

pub use exchange_config::{load_config, ExchangeConfig, MevConfig};
pub use protocol::*;
