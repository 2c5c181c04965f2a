//! Token ledger state and direct (single-step) operations

use crate::staging::LedgerTx;
use leafswap_types::{Address, ExchangeError, Result, TokenId, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Metadata and issued supply of a registered token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Counters for monitoring
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct LedgerStats {
    pub registered_tokens: usize,
    pub funded_accounts: usize,
    pub commits: u64,
    pub rejected_commits: u64,
}

/// Raw ledger maps, only ever touched under the ledger lock
#[derive(Debug)]
pub(crate) struct LedgerState<T> {
    pub(crate) tokens: HashMap<T, TokenInfo>,
    pub(crate) balances: HashMap<(T, Address), U256>,
    pub(crate) allowances: HashMap<(T, Address, Address), U256>,
    pub(crate) commits: u64,
    pub(crate) rejected_commits: u64,
}

impl<T: TokenId> LedgerState<T> {
    pub(crate) fn balance(&self, token: &T, owner: Address) -> U256 {
        self.balances
            .get(&(token.clone(), owner))
            .copied()
            .unwrap_or_default()
    }

    pub(crate) fn allowance(&self, token: &T, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(token.clone(), owner, spender))
            .copied()
            .unwrap_or_default()
    }
}

/// Balances and allowances for every token known to the exchange
///
/// Balances are `(token, owner) -> U256`; allowances are
/// `(token, owner, spender) -> U256` with `U256::MAX` meaning unlimited.
/// Transfers do not require a registered token, issuance does.
pub struct TokenLedger<T: TokenId = Address> {
    pub(crate) state: RwLock<LedgerState<T>>,
}

impl<T: TokenId> Default for TokenLedger<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TokenId> TokenLedger<T> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState {
                tokens: HashMap::new(),
                balances: HashMap::new(),
                allowances: HashMap::new(),
                commits: 0,
                rejected_commits: 0,
            }),
        }
    }

    /// Register token metadata; a token can be registered once
    pub fn register_token(&self, token: T, symbol: impl Into<String>, decimals: u8) -> Result<()> {
        let mut state = self.state.write();
        if state.tokens.contains_key(&token) {
            return Err(ExchangeError::TokenExists);
        }
        let symbol = symbol.into();
        info!("Registered token {:?} ({}, {} decimals)", token, symbol, decimals);
        state.tokens.insert(
            token,
            TokenInfo {
                symbol,
                decimals,
                total_supply: U256::zero(),
            },
        );
        Ok(())
    }

    pub fn token_info(&self, token: &T) -> Option<TokenInfo> {
        self.state.read().tokens.get(token).cloned()
    }

    pub fn is_registered(&self, token: &T) -> bool {
        self.state.read().tokens.contains_key(token)
    }

    /// Create `amount` new units of a registered token for `to`
    pub fn issue(&self, token: &T, to: Address, amount: U256) -> Result<()> {
        let mut state = self.state.write();
        let new_supply = {
            let info = state
                .tokens
                .get(token)
                .ok_or(ExchangeError::TokenNotRegistered)?;
            info.total_supply
                .checked_add(amount)
                .ok_or(ExchangeError::ArithmeticOverflow)?
        };
        let new_balance = state
            .balance(token, to)
            .checked_add(amount)
            .ok_or(ExchangeError::ArithmeticOverflow)?;

        if let Some(info) = state.tokens.get_mut(token) {
            info.total_supply = new_supply;
        }
        state.balances.insert((token.clone(), to), new_balance);
        state.commits += 1;
        debug!("Issued {} of {:?} to {:?}", amount, token, to);
        Ok(())
    }

    /// Issued supply, zero for unregistered tokens
    pub fn total_supply(&self, token: &T) -> U256 {
        self.state
            .read()
            .tokens
            .get(token)
            .map(|info| info.total_supply)
            .unwrap_or_default()
    }

    pub fn balance_of(&self, token: &T, owner: Address) -> U256 {
        self.state.read().balance(token, owner)
    }

    pub fn allowance(&self, token: &T, owner: Address, spender: Address) -> U256 {
        self.state.read().allowance(token, owner, spender)
    }

    /// Set (not add to) the amount `spender` may move out of `owner`
    pub fn approve(&self, token: &T, owner: Address, spender: Address, amount: U256) -> Result<()> {
        let mut tx = self.stage();
        tx.approve(token, owner, spender, amount);
        tx.commit()
    }

    pub fn transfer(&self, token: &T, from: Address, to: Address, amount: U256) -> Result<()> {
        let mut tx = self.stage();
        tx.transfer(token, from, to, amount)?;
        tx.commit()
    }

    /// Move tokens on behalf of `from`, consuming the spender's allowance
    pub fn transfer_from(
        &self,
        token: &T,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let mut tx = self.stage();
        tx.transfer_from(token, spender, from, to, amount)?;
        tx.commit()
    }

    /// Open a staged transaction against this ledger
    pub fn stage(&self) -> LedgerTx<'_, T> {
        LedgerTx::new(self)
    }

    pub(crate) fn record_rejected_commit(&self, reason: &ExchangeError) {
        let mut state = self.state.write();
        state.rejected_commits += 1;
        warn!("Ledger commit rejected: {}", reason);
    }

    pub fn stats(&self) -> LedgerStats {
        let state = self.state.read();
        LedgerStats {
            registered_tokens: state.tokens.len(),
            funded_accounts: state.balances.values().filter(|b| !b.is_zero()).count(),
            commits: state.commits,
            rejected_commits: state.rejected_commits,
        }
    }
}
