//! Staged ledger transactions
//!
//! A [`LedgerTx`] journals debits, credits and allowance changes without
//! touching the ledger. Reads through the journal see the live balances plus
//! everything staged so far, so a multi-step call can validate each step as
//! it goes. [`LedgerTx::commit`] takes the ledger write lock once, re-checks
//! every staged debit against the live state and applies all of it, or
//! nothing.

use crate::ledger::{LedgerState, TokenLedger};
use leafswap_types::{Address, ExchangeError, Result, TokenId, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

type BalanceKey<T> = (T, Address);
type AllowanceKey<T> = (T, Address, Address);

/// Journal of pending ledger changes
pub struct LedgerTx<'a, T: TokenId> {
    ledger: &'a TokenLedger<T>,
    credits: HashMap<BalanceKey<T>, U256>,
    debits: HashMap<BalanceKey<T>, U256>,
    approvals: HashMap<AllowanceKey<T>, U256>,
    spent: HashMap<AllowanceKey<T>, U256>,
    transfers: usize,
}

impl<'a, T: TokenId> LedgerTx<'a, T> {
    pub(crate) fn new(ledger: &'a TokenLedger<T>) -> Self {
        Self {
            ledger,
            credits: HashMap::new(),
            debits: HashMap::new(),
            approvals: HashMap::new(),
            spent: HashMap::new(),
            transfers: 0,
        }
    }

    /// Nothing staged yet
    pub fn is_empty(&self) -> bool {
        self.credits.is_empty() && self.debits.is_empty() && self.approvals.is_empty()
    }

    /// Live balance adjusted by the staged deltas
    pub fn balance_of(&self, token: &T, owner: Address) -> U256 {
        let base = self.ledger.balance_of(token, owner);
        let key = (token.clone(), owner);
        let credit = self.credits.get(&key).copied().unwrap_or_default();
        let debit = self.debits.get(&key).copied().unwrap_or_default();
        base.saturating_add(credit).saturating_sub(debit)
    }

    /// Live allowance adjusted by staged approvals and spending
    pub fn allowance(&self, token: &T, owner: Address, spender: Address) -> U256 {
        let key = (token.clone(), owner, spender);
        let start = match self.approvals.get(&key) {
            Some(approved) => *approved,
            None => self.ledger.allowance(token, owner, spender),
        };
        if start == U256::MAX {
            return start;
        }
        start.saturating_sub(self.spent.get(&key).copied().unwrap_or_default())
    }

    pub fn approve(&mut self, token: &T, owner: Address, spender: Address, amount: U256) {
        let key = (token.clone(), owner, spender);
        self.spent.remove(&key);
        self.approvals.insert(key, amount);
    }

    pub fn transfer(&mut self, token: &T, from: Address, to: Address, amount: U256) -> Result<()> {
        if amount > self.balance_of(token, from) {
            return Err(ExchangeError::InsufficientBalance);
        }
        accumulate(&mut self.debits, (token.clone(), from), amount)?;
        accumulate(&mut self.credits, (token.clone(), to), amount)?;
        self.transfers += 1;
        Ok(())
    }

    /// Transfer on behalf of `from`, consuming `spender`'s allowance
    pub fn transfer_from(
        &mut self,
        token: &T,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let allowance = self.allowance(token, from, spender);
        if amount > allowance {
            return Err(ExchangeError::InsufficientAllowance);
        }
        self.transfer(token, from, to, amount)?;
        if allowance != U256::MAX {
            accumulate(&mut self.spent, (token.clone(), from, spender), amount)?;
        }
        Ok(())
    }

    /// Apply every staged change atomically
    ///
    /// Fails with `InsufficientBalance` / `InsufficientAllowance` when a
    /// concurrent commit spent what this journal relied on; in that case the
    /// ledger is left untouched.
    pub fn commit(mut self) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let ledger = self.ledger;
        let credits = std::mem::take(&mut self.credits);
        let debits = std::mem::take(&mut self.debits);
        let approvals = std::mem::take(&mut self.approvals);
        let spent = std::mem::take(&mut self.spent);

        let result = {
            let mut state = ledger.state.write();
            apply(&mut state, &credits, &debits, &approvals, &spent)
        };

        match &result {
            Ok(()) => debug!(
                "Committed ledger transaction: {} transfers, {} accounts touched",
                self.transfers,
                credits.len() + debits.len()
            ),
            Err(e) => ledger.record_rejected_commit(e),
        }
        result
    }
}

impl<T: TokenId> Drop for LedgerTx<'_, T> {
    fn drop(&mut self) {
        if !self.is_empty() {
            debug!(
                "Discarding uncommitted ledger transaction ({} transfers)",
                self.transfers
            );
        }
    }
}

fn accumulate<K: std::hash::Hash + Eq>(map: &mut HashMap<K, U256>, key: K, amount: U256) -> Result<()> {
    let entry = map.entry(key).or_default();
    *entry = entry
        .checked_add(amount)
        .ok_or(ExchangeError::ArithmeticOverflow)?;
    Ok(())
}

/// Validate against the live state, then write. Nothing is written on error.
fn apply<T: TokenId>(
    state: &mut LedgerState<T>,
    credits: &HashMap<BalanceKey<T>, U256>,
    debits: &HashMap<BalanceKey<T>, U256>,
    approvals: &HashMap<AllowanceKey<T>, U256>,
    spent: &HashMap<AllowanceKey<T>, U256>,
) -> Result<()> {
    let touched: HashSet<&BalanceKey<T>> = credits.keys().chain(debits.keys()).collect();
    let mut new_balances = Vec::with_capacity(touched.len());
    for key in touched {
        let credit = credits.get(key).copied().unwrap_or_default();
        let debit = debits.get(key).copied().unwrap_or_default();
        let balance = state
            .balance(&key.0, key.1)
            .checked_add(credit)
            .ok_or(ExchangeError::ArithmeticOverflow)?
            .checked_sub(debit)
            .ok_or(ExchangeError::InsufficientBalance)?;
        new_balances.push((key.clone(), balance));
    }

    let allowance_keys: HashSet<&AllowanceKey<T>> = approvals.keys().chain(spent.keys()).collect();
    let mut new_allowances = Vec::with_capacity(allowance_keys.len());
    for key in allowance_keys {
        let start = match approvals.get(key) {
            Some(approved) => *approved,
            None => state.allowance(&key.0, key.1, key.2),
        };
        let remaining = if start == U256::MAX {
            start
        } else {
            start
                .checked_sub(spent.get(key).copied().unwrap_or_default())
                .ok_or(ExchangeError::InsufficientAllowance)?
        };
        new_allowances.push((key.clone(), remaining));
    }

    state.balances.extend(new_balances);
    state.allowances.extend(new_allowances);
    state.commits += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn setup() -> (TokenLedger, Address) {
        let ledger = TokenLedger::new();
        let token = addr(0xA);
        ledger.register_token(token, "TKA", 18).unwrap();
        ledger.issue(&token, addr(1), U256::from(1_000u64)).unwrap();
        (ledger, token)
    }

    #[test]
    fn test_reads_see_staged_deltas() {
        let (ledger, token) = setup();
        let mut tx = ledger.stage();
        tx.transfer(&token, addr(1), addr(2), U256::from(300u64)).unwrap();

        assert_eq!(tx.balance_of(&token, addr(1)), U256::from(700u64));
        assert_eq!(tx.balance_of(&token, addr(2)), U256::from(300u64));
        // Live state untouched until commit
        assert_eq!(ledger.balance_of(&token, addr(2)), U256::zero());

        // A chained transfer may spend staged credit
        tx.transfer(&token, addr(2), addr(3), U256::from(300u64)).unwrap();
        tx.commit().unwrap();

        assert_eq!(ledger.balance_of(&token, addr(1)), U256::from(700u64));
        assert_eq!(ledger.balance_of(&token, addr(2)), U256::zero());
        assert_eq!(ledger.balance_of(&token, addr(3)), U256::from(300u64));
    }

    #[test]
    fn test_dropped_journal_changes_nothing() {
        let (ledger, token) = setup();
        {
            let mut tx = ledger.stage();
            tx.transfer(&token, addr(1), addr(2), U256::from(1_000u64)).unwrap();
            assert_matches!(
                tx.transfer(&token, addr(1), addr(2), U256::one()),
                Err(ExchangeError::InsufficientBalance)
            );
        }
        assert_eq!(ledger.balance_of(&token, addr(1)), U256::from(1_000u64));
        assert_eq!(ledger.stats().commits, 1); // only the issue
    }

    #[test]
    fn test_commit_revalidates_against_live_state() {
        let (ledger, token) = setup();
        let mut tx = ledger.stage();
        tx.transfer(&token, addr(1), addr(2), U256::from(800u64)).unwrap();
        tx.transfer(&token, addr(1), addr(3), U256::from(100u64)).unwrap();

        // Concurrent spend lands first
        ledger.transfer(&token, addr(1), addr(4), U256::from(500u64)).unwrap();

        assert_matches!(tx.commit(), Err(ExchangeError::InsufficientBalance));
        assert_eq!(ledger.balance_of(&token, addr(1)), U256::from(500u64));
        assert_eq!(ledger.balance_of(&token, addr(2)), U256::zero());
        assert_eq!(ledger.balance_of(&token, addr(3)), U256::zero());
        assert_eq!(ledger.stats().rejected_commits, 1);
    }

    #[test]
    fn test_allowance_within_journal() {
        let (ledger, token) = setup();
        let router = addr(9);
        let mut tx = ledger.stage();
        tx.approve(&token, addr(1), router, U256::from(500u64));
        tx.transfer_from(&token, router, addr(1), addr(2), U256::from(200u64))
            .unwrap();
        assert_eq!(tx.allowance(&token, addr(1), router), U256::from(300u64));
        assert_matches!(
            tx.transfer_from(&token, router, addr(1), addr(2), U256::from(301u64)),
            Err(ExchangeError::InsufficientAllowance)
        );
        tx.commit().unwrap();
        assert_eq!(ledger.allowance(&token, addr(1), router), U256::from(300u64));
    }

    #[test]
    fn test_commit_rejects_allowance_spent_concurrently() {
        let (ledger, token) = setup();
        let router = addr(9);
        ledger.approve(&token, addr(1), router, U256::from(100u64)).unwrap();

        let mut tx = ledger.stage();
        tx.transfer_from(&token, router, addr(1), addr(2), U256::from(80u64))
            .unwrap();
        ledger
            .transfer_from(&token, router, addr(1), addr(3), U256::from(50u64))
            .unwrap();

        assert_matches!(tx.commit(), Err(ExchangeError::InsufficientAllowance));
        assert_eq!(ledger.balance_of(&token, addr(2)), U256::zero());
    }

    #[test]
    fn test_empty_commit_is_noop() {
        let (ledger, _) = setup();
        let tx = ledger.stage();
        assert!(tx.is_empty());
        tx.commit().unwrap();
        assert_eq!(ledger.stats().commits, 1);
    }
}
