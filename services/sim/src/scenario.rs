//! Scripted scenarios
//!
//! A scenario is a TOML document naming an owner and a list of steps. Users
//! and tokens are referred to by name and mapped to deterministic addresses,
//! amounts are decimal strings so they can exceed `u64`.

use anyhow::{anyhow, Context, Result};
use ethers_core::utils::keccak256;
use leafswap_config::ExchangeConfig;
use leafswap_exchange::{AddLiquidity, Exchange, RemoveLiquidity};
use leafswap_types::{Address, CallContext, U256};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Built-in scenario replayed when no file is given
pub const DEMO: &str = include_str!("../scenarios/demo.toml");

/// Block time used to derive timestamps from block numbers
const SECONDS_PER_BLOCK: u64 = 12;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub owner: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse scenario")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&text)
    }

    pub fn demo() -> Result<Self> {
        Self::parse(DEMO)
    }
}

fn default_decimals() -> u8 {
    18
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    Register {
        token: String,
        symbol: String,
        #[serde(default = "default_decimals")]
        decimals: u8,
    },
    Issue {
        token: String,
        to: String,
        amount: String,
    },
    /// Router allowance; unlimited when `amount` is absent
    Approve {
        user: String,
        tokens: Vec<String>,
        #[serde(default)]
        amount: Option<String>,
    },
    CreatePair {
        caller: String,
        token_a: String,
        token_b: String,
        block: u64,
    },
    AddLiquidity {
        caller: String,
        token_a: String,
        token_b: String,
        amount_a: String,
        amount_b: String,
        #[serde(default)]
        amount_a_min: Option<String>,
        #[serde(default)]
        amount_b_min: Option<String>,
        block: u64,
    },
    RemoveLiquidity {
        caller: String,
        token_a: String,
        token_b: String,
        shares: String,
        block: u64,
    },
    Swap {
        caller: String,
        path: Vec<String>,
        amount_in: String,
        #[serde(default)]
        min_amount_out: Option<String>,
        block: u64,
    },
    SwapExactOut {
        caller: String,
        path: Vec<String>,
        amount_out: String,
        amount_in_max: String,
        block: u64,
    },
    SetMev {
        caller: String,
        user: String,
        enabled: bool,
        block: u64,
    },
    SetFeeTo {
        caller: String,
        #[serde(default)]
        fee_to: Option<String>,
    },
    Quote {
        path: Vec<String>,
        amount_in: String,
    },
}

impl Step {
    pub fn action(&self) -> &'static str {
        match self {
            Step::Register { .. } => "register",
            Step::Issue { .. } => "issue",
            Step::Approve { .. } => "approve",
            Step::CreatePair { .. } => "create_pair",
            Step::AddLiquidity { .. } => "add_liquidity",
            Step::RemoveLiquidity { .. } => "remove_liquidity",
            Step::Swap { .. } => "swap",
            Step::SwapExactOut { .. } => "swap_exact_out",
            Step::SetMev { .. } => "set_mev",
            Step::SetFeeTo { .. } => "set_fee_to",
            Step::Quote { .. } => "quote",
        }
    }
}

/// Address for a named user; `0x`-prefixed names are taken literally
pub fn account(name: &str) -> Result<Address> {
    if name.starts_with("0x") {
        return name
            .parse::<Address>()
            .map_err(|e| anyhow!("invalid address {name:?}: {e}"));
    }
    Ok(Address::from_slice(&keccak256(name.as_bytes())[12..]))
}

/// Token id for a symbol, kept apart from user names
pub fn token(symbol: &str) -> Address {
    let preimage = format!("token:{symbol}");
    Address::from_slice(&keccak256(preimage.as_bytes())[12..])
}

fn amount(text: &str) -> Result<U256> {
    U256::from_dec_str(text).map_err(|e| anyhow!("invalid amount {text:?}: {e:?}"))
}

fn optional_amount(text: Option<&String>) -> Result<U256> {
    text.map_or(Ok(U256::zero()), |t| amount(t))
}

fn ctx(caller: &str, block: u64) -> Result<CallContext> {
    Ok(CallContext::new(account(caller)?, block, block * SECONDS_PER_BLOCK))
}

fn path(symbols: &[String]) -> Vec<Address> {
    symbols.iter().map(|s| token(s)).collect()
}

fn decimal_strings(amounts: &[U256]) -> Vec<String> {
    amounts.iter().map(U256::to_string).collect()
}

/// Drives one exchange instance through scenario steps
pub struct Runner {
    exchange: Exchange,
}

impl Runner {
    pub fn new(config: ExchangeConfig, owner: &str) -> Result<Self> {
        let owner = account(owner)?;
        let exchange = Exchange::new(config, owner).context("Failed to start exchange")?;
        info!("Exchange up, owner {:?}", owner);
        Ok(Self { exchange })
    }

    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Apply one step and describe its result
    ///
    /// Rejections surface as `ExchangeError` inside the returned error, so
    /// callers can tell them apart from malformed steps with `downcast_ref`.
    pub fn run_step(&self, step: &Step) -> Result<Value> {
        debug!("Running {:?}", step);
        let exchange = &self.exchange;
        let router = exchange.router();
        let deadline = u64::MAX;

        let result = match step {
            Step::Register {
                token: name,
                symbol,
                decimals,
            } => {
                exchange
                    .ledger()
                    .register_token(token(name), symbol.as_str(), *decimals)?;
                json!({ "token": token(name) })
            }
            Step::Issue {
                token: name,
                to,
                amount: value,
            } => {
                exchange
                    .ledger()
                    .issue(&token(name), account(to)?, amount(value)?)?;
                json!({ "balance": exchange.ledger().balance_of(&token(name), account(to)?).to_string() })
            }
            Step::Approve {
                user,
                tokens,
                amount: value,
            } => {
                let allowance = match value {
                    Some(v) => amount(v)?,
                    None => U256::MAX,
                };
                let ctx = ctx(user, 0)?;
                for name in tokens {
                    exchange.approve_router(&ctx, &token(name), allowance)?;
                }
                json!({ "approved": tokens })
            }
            Step::CreatePair {
                caller,
                token_a,
                token_b,
                block,
            } => {
                let id = exchange.create_pair(&ctx(caller, *block)?, token(token_a), token(token_b))?;
                json!({ "pair": id.inner() })
            }
            Step::AddLiquidity {
                caller,
                token_a,
                token_b,
                amount_a,
                amount_b,
                amount_a_min,
                amount_b_min,
                block,
            } => {
                let (a, b, shares) = router.add_liquidity(
                    &ctx(caller, *block)?,
                    &AddLiquidity {
                        token_a: token(token_a),
                        token_b: token(token_b),
                        amount_a_desired: amount(amount_a)?,
                        amount_b_desired: amount(amount_b)?,
                        amount_a_min: optional_amount(amount_a_min.as_ref())?,
                        amount_b_min: optional_amount(amount_b_min.as_ref())?,
                        to: account(caller)?,
                        deadline,
                    },
                )?;
                json!({ "amounts": decimal_strings(&[a, b]), "shares": shares.to_string() })
            }
            Step::RemoveLiquidity {
                caller,
                token_a,
                token_b,
                shares,
                block,
            } => {
                let (a, b) = router.remove_liquidity(
                    &ctx(caller, *block)?,
                    &RemoveLiquidity {
                        token_a: token(token_a),
                        token_b: token(token_b),
                        shares: amount(shares)?,
                        amount_a_min: U256::zero(),
                        amount_b_min: U256::zero(),
                        to: account(caller)?,
                        deadline,
                    },
                )?;
                json!({ "amounts": decimal_strings(&[a, b]) })
            }
            Step::Swap {
                caller,
                path: symbols,
                amount_in,
                min_amount_out,
                block,
            } => {
                let amounts = router.swap_exact_tokens_for_tokens(
                    &ctx(caller, *block)?,
                    amount(amount_in)?,
                    optional_amount(min_amount_out.as_ref())?,
                    &path(symbols),
                    account(caller)?,
                    deadline,
                )?;
                json!({ "amounts": decimal_strings(&amounts) })
            }
            Step::SwapExactOut {
                caller,
                path: symbols,
                amount_out,
                amount_in_max,
                block,
            } => {
                let amounts = router.swap_tokens_for_exact_tokens(
                    &ctx(caller, *block)?,
                    amount(amount_out)?,
                    amount(amount_in_max)?,
                    &path(symbols),
                    account(caller)?,
                    deadline,
                )?;
                json!({ "amounts": decimal_strings(&amounts) })
            }
            Step::SetMev {
                caller,
                user,
                enabled,
                block,
            } => {
                exchange.set_user_mev_enabled(&ctx(caller, *block)?, account(user)?, *enabled)?;
                json!({ "user": account(user)?, "enabled": enabled })
            }
            Step::SetFeeTo { caller, fee_to } => {
                let fee_to = fee_to.as_deref().map(account).transpose()?;
                exchange.factory().set_fee_to(account(caller)?, fee_to)?;
                json!({ "fee_to": fee_to })
            }
            Step::Quote {
                path: symbols,
                amount_in,
            } => {
                let path = path(symbols);
                let amount_in = amount(amount_in)?;
                let amounts = router.get_amounts_out(amount_in, &path)?;
                let impact = router.price_impact(amount_in, &path)?;
                json!({ "amounts": decimal_strings(&amounts), "price_impact": impact.to_string() })
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leafswap_types::ExchangeError;

    fn demo_runner() -> (Runner, Scenario) {
        let scenario = Scenario::demo().unwrap();
        let runner = Runner::new(ExchangeConfig::default(), &scenario.owner).unwrap();
        (runner, scenario)
    }

    #[test]
    fn test_demo_runs_clean() {
        let (runner, scenario) = demo_runner();
        let rx = runner.exchange().subscribe();
        for step in &scenario.steps {
            runner.run_step(step).unwrap();
        }

        assert_eq!(runner.exchange().factory().all_pairs_length(), 2);
        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| e.kind() == "swap"));
        assert!(events.iter().any(|e| e.kind() == "burn"));
    }

    #[test]
    fn test_protected_swap_pays_fee() {
        let (runner, scenario) = demo_runner();
        let rx = runner.exchange().subscribe();
        for step in &scenario.steps {
            runner.run_step(step).unwrap();
        }

        let fees: Vec<U256> = rx
            .try_iter()
            .filter_map(|e| match e {
                leafswap_types::ExchangeEvent::Swap { mev_fee, .. } => Some(mev_fee),
                _ => None,
            })
            .collect();
        // One protected hop at block 20, two unprotected hops at block 200
        assert_eq!(fees.len(), 3);
        assert!(!fees[0].is_zero());
        assert!(fees[1..].iter().all(U256::is_zero));
    }

    #[test]
    fn test_rejection_is_exchange_error() {
        let (runner, _) = demo_runner();
        let step = Step::Issue {
            token: "NOPE".into(),
            to: "alice".into(),
            amount: "1".into(),
        };
        let err = runner.run_step(&step).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ExchangeError>(),
            Some(&ExchangeError::TokenNotRegistered)
        );
    }

    #[test]
    fn test_malformed_amount_is_not_exchange_error() {
        let (runner, _) = demo_runner();
        let step = Step::Register {
            token: "TKA".into(),
            symbol: "TKA".into(),
            decimals: 18,
        };
        runner.run_step(&step).unwrap();
        let step = Step::Issue {
            token: "TKA".into(),
            to: "alice".into(),
            amount: "12ab".into(),
        };
        let err = runner.run_step(&step).unwrap_err();
        assert!(err.downcast_ref::<ExchangeError>().is_none());
    }

    #[test]
    fn test_named_accounts_are_stable_and_distinct() {
        assert_eq!(account("alice").unwrap(), account("alice").unwrap());
        assert_ne!(account("alice").unwrap(), account("bob").unwrap());
        assert_ne!(account("TKA").unwrap(), token("TKA"));
        assert_eq!(
            account("0x0000000000000000000000000000000000000001").unwrap(),
            Address::from_low_u64_be(1)
        );
    }

    #[test]
    fn test_scenario_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.toml");
        fs::write(
            &path,
            r#"
owner = "deployer"

[[steps]]
action = "register"
token = "TKA"
symbol = "TKA"
"#,
        )
        .unwrap();

        let scenario = Scenario::from_file(&path).unwrap();
        assert_eq!(scenario.steps.len(), 1);
        match &scenario.steps[0] {
            Step::Register { decimals, .. } => assert_eq!(*decimals, 18),
            other => panic!("unexpected step {other:?}"),
        }
    }
}
