//! Exchange Configuration Module
//!
//! Provides configuration loading and validation for the exchange engine.
//! Supports loading from TOML files with `LEAFSWAP_` environment overrides.

use crate::protocol::{
    mev, BPS_DENOMINATOR, DEFAULT_LOCK_TIMEOUT_MS, DEFAULT_MINIMUM_LIQUIDITY,
    DEFAULT_SWAP_FEE_BPS, MAX_SWAP_FEE_BPS,
};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "LEAFSWAP";

/// Main exchange configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Factory-wide swap fee in basis points (30 = 0.3%)
    pub swap_fee_bps: u32,

    /// Shares locked to the zero account on a pair's first mint
    pub minimum_liquidity: u64,

    /// Wait bound for acquiring a busy pair
    pub lock_timeout_ms: u64,

    /// Default log filter for binaries embedding the engine
    pub log_level: String,

    /// MEV guard parameters
    pub mev: MevConfig,
}

/// Global MEV guard parameters
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct MevConfig {
    /// Window length in blocks after pair creation
    pub anti_front_defend_block: u64,

    /// Fee deducted from protected output, basis points
    pub anti_mev_fee_bps: u32,

    /// Minimum protected output as a share of the output reserve, basis points
    pub anti_mev_amount_out_limit_bps: u32,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            swap_fee_bps: DEFAULT_SWAP_FEE_BPS,
            minimum_liquidity: DEFAULT_MINIMUM_LIQUIDITY,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            log_level: "info".to_string(),
            mev: MevConfig::default(),
        }
    }
}

impl Default for MevConfig {
    fn default() -> Self {
        Self {
            anti_front_defend_block: mev::DEFAULT_ANTI_FRONT_DEFEND_BLOCK,
            anti_mev_fee_bps: mev::DEFAULT_ANTI_MEV_FEE_BPS,
            anti_mev_amount_out_limit_bps: mev::DEFAULT_ANTI_MEV_AMOUNT_OUT_LIMIT_BPS,
        }
    }
}

impl MevConfig {
    /// Check basis-point parameters stay within 100%
    pub fn validate(&self) -> Result<()> {
        if self.anti_mev_fee_bps > BPS_DENOMINATOR {
            bail!(
                "anti MEV fee {} bps exceeds {} bps",
                self.anti_mev_fee_bps,
                BPS_DENOMINATOR
            );
        }
        if self.anti_mev_amount_out_limit_bps > BPS_DENOMINATOR {
            bail!(
                "anti MEV amount-out limit {} bps exceeds {} bps",
                self.anti_mev_amount_out_limit_bps,
                BPS_DENOMINATOR
            );
        }
        Ok(())
    }
}

impl ExchangeConfig {
    /// Load configuration from a TOML file with environment overrides
    ///
    /// Without a path only defaults and environment variables apply.
    /// Environment keys use `LEAFSWAP_` as prefix and `__` between nested
    /// sections, e.g. `LEAFSWAP_SWAP_FEE_BPS=25` or
    /// `LEAFSWAP_MEV__ANTI_MEV_FEE_BPS=200`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`ExchangeConfig::load`] with an explicit environment map
    /// instead of the process environment
    pub fn load_with_env(path: Option<&Path>, env: Option<Map<String, String>>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading exchange config: {:?}", path);
            builder = builder.add_source(File::from(PathBuf::from(path)).required(true));
        } else {
            debug!("No config file given, using defaults");
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: Self = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations the engine cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.swap_fee_bps > MAX_SWAP_FEE_BPS {
            warn!(
                "Rejecting config: swap fee {} bps above {} bps",
                self.swap_fee_bps, MAX_SWAP_FEE_BPS
            );
            bail!(
                "swap fee rate too high: {} bps exceeds {} bps",
                self.swap_fee_bps,
                MAX_SWAP_FEE_BPS
            );
        }
        if self.minimum_liquidity == 0 {
            bail!("minimum liquidity must be non-zero");
        }
        self.mev.validate()
    }

    /// Lock wait bound as a [`Duration`]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Render as TOML, e.g. to seed a config file
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>) -> Result<ExchangeConfig> {
    ExchangeConfig::load(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = ExchangeConfig::default();

        assert_eq!(config.swap_fee_bps, 30);
        assert_eq!(config.minimum_liquidity, 1_000);
        assert_eq!(config.mev.anti_front_defend_block, 100);
        assert_eq!(config.mev.anti_mev_fee_bps, 100);
        assert_eq!(config.mev.anti_mev_amount_out_limit_bps, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("exchange.toml");

        let config_content = r#"
swap_fee_bps = 25
log_level = "debug"

[mev]
anti_front_defend_block = 20
"#;

        fs::write(&config_path, config_content).unwrap();

        let config = ExchangeConfig::load_with_env(Some(&config_path), Some(Map::new())).unwrap();

        assert_eq!(config.swap_fee_bps, 25);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.mev.anti_front_defend_block, 20);
        // Untouched keys keep their defaults
        assert_eq!(config.mev.anti_mev_fee_bps, 100);
        assert_eq!(config.minimum_liquidity, 1_000);
    }

    #[test]
    fn test_environment_override() {
        let mut env = Map::new();
        env.insert("LEAFSWAP_SWAP_FEE_BPS".to_string(), "50".to_string());
        env.insert(
            "LEAFSWAP_MEV__ANTI_MEV_FEE_BPS".to_string(),
            "200".to_string(),
        );

        let config = ExchangeConfig::load_with_env(None, Some(env)).unwrap();

        assert_eq!(config.swap_fee_bps, 50);
        assert_eq!(config.mev.anti_mev_fee_bps, 200);
    }

    #[test]
    fn test_rejects_fee_above_maximum() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("exchange.toml");
        fs::write(&config_path, "swap_fee_bps = 1500\n").unwrap();

        let err = ExchangeConfig::load_with_env(Some(&config_path), Some(Map::new())).unwrap_err();
        assert!(err.to_string().contains("swap fee rate too high"));
    }

    #[test]
    fn test_rejects_out_of_range_mev_parameters() {
        let mut config = ExchangeConfig::default();
        config.mev.anti_mev_amount_out_limit_bps = 10_001;
        assert!(config.validate().is_err());

        let mut config = ExchangeConfig::default();
        config.minimum_liquidity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(ExchangeConfig::load_with_env(Some(&missing), Some(Map::new())).is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ExchangeConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed: ExchangeConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
