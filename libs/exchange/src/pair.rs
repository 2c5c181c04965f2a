//! Pair State Machine
//!
//! Reserves, pool shares and swap execution for one token pair. The state
//! is plain data: callers clone it, run an operation on the clone and write
//! the clone back once the matching ledger journal has committed. Token
//! custody itself lives in the ledger under the pair's account.

use leafswap_amm::ConstantProduct;
use leafswap_mev::{DefendRequest, MevGuard};
use leafswap_types::{Address, ExchangeError, PairId, Result, TokenId, U256, ZERO_ADDRESS};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Which side of the pair a token sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Token0,
    Token1,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Side::Token0 => Side::Token1,
            Side::Token1 => Side::Token0,
        }
    }
}

/// Result of a share mint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    pub shares: U256,
    /// Shares minted to the protocol fee recipient first
    pub protocol_fee_shares: U256,
}

/// Result of a share burn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnOutcome {
    pub amount0: U256,
    pub amount1: U256,
    pub protocol_fee_shares: U256,
}

/// Result of one executed swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapOutcome {
    pub amount_out: U256,
    pub mev_fee: U256,
    pub side_in: Side,
    /// The MEV guard applied its window rules to this swap
    pub protected: bool,
}

/// Everything a swap needs besides amounts
#[derive(Clone, Copy)]
pub struct SwapEnv<'a> {
    pub fee_bps: u32,
    pub trader: Address,
    pub block_number: u64,
    pub mev: &'a MevGuard,
}

/// Complete state of a single pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairState<T> {
    pub id: PairId,
    pub token0: T,
    pub token1: T,
    pub account: Address,
    pub created_at_block: u64,

    reserve0: U256,
    reserve1: U256,
    total_shares: U256,
    shares: HashMap<Address, U256>,
    k_last: U256,
}

impl<T: TokenId> PairState<T> {
    /// Create uninitialized pair state; tokens must be sorted
    pub fn new(id: PairId, token0: T, token1: T, account: Address, created_at_block: u64) -> Self {
        Self {
            id,
            token0,
            token1,
            account,
            created_at_block,
            reserve0: U256::zero(),
            reserve1: U256::zero(),
            total_shares: U256::zero(),
            shares: HashMap::new(),
            k_last: U256::zero(),
        }
    }

    /// Forward quote, see [`ConstantProduct::get_amount_out`]
    pub fn quote_swap(amount_in: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Result<U256> {
        ConstantProduct::get_amount_out(amount_in, reserve_in, reserve_out, fee_bps)
    }

    /// Reverse quote, see [`ConstantProduct::get_amount_in`]
    pub fn quote_swap_in(amount_out: U256, reserve_in: U256, reserve_out: U256, fee_bps: u32) -> Result<U256> {
        ConstantProduct::get_amount_in(amount_out, reserve_in, reserve_out, fee_bps)
    }

    /// Ratio-preserving counterpart amount
    pub fn quote(amount_a: U256, reserve_a: U256, reserve_b: U256) -> Result<U256> {
        ConstantProduct::quote(amount_a, reserve_a, reserve_b)
    }

    pub fn reserves(&self) -> (U256, U256) {
        (self.reserve0, self.reserve1)
    }

    pub fn total_shares(&self) -> U256 {
        self.total_shares
    }

    pub fn share_balance(&self, owner: Address) -> U256 {
        self.shares.get(&owner).copied().unwrap_or_default()
    }

    pub fn k_last(&self) -> U256 {
        self.k_last
    }

    /// No shares issued yet
    pub fn is_uninitialized(&self) -> bool {
        self.total_shares.is_zero()
    }

    pub fn side_of(&self, token: &T) -> Result<Side> {
        if *token == self.token0 {
            Ok(Side::Token0)
        } else if *token == self.token1 {
            Ok(Side::Token1)
        } else {
            Err(ExchangeError::invalid_path(format!(
                "token {:?} not in {}",
                token, self.id
            )))
        }
    }

    /// Token held on `side`
    pub fn token(&self, side: Side) -> &T {
        match side {
            Side::Token0 => &self.token0,
            Side::Token1 => &self.token1,
        }
    }

    /// `(reserve_in, reserve_out)` as seen when selling `token_in`
    pub fn reserves_for(&self, token_in: &T) -> Result<(U256, U256)> {
        Ok(match self.side_of(token_in)? {
            Side::Token0 => (self.reserve0, self.reserve1),
            Side::Token1 => (self.reserve1, self.reserve0),
        })
    }

    /// Issue shares for a deposit already credited to the pair account
    ///
    /// The first deposit locks `minimum_liquidity` shares to the zero account.
    pub fn mint(
        &mut self,
        amount0: U256,
        amount1: U256,
        recipient: Address,
        minimum_liquidity: U256,
        fee_to: Option<Address>,
    ) -> Result<MintOutcome> {
        let protocol_fee_shares = self.mint_protocol_fee(fee_to)?;

        let shares = if self.total_shares.is_zero() {
            let shares = ConstantProduct::initial_shares(amount0, amount1, minimum_liquidity)?;
            self.credit_shares(ZERO_ADDRESS, minimum_liquidity)?;
            shares
        } else {
            ConstantProduct::proportional_shares(
                amount0,
                amount1,
                self.reserve0,
                self.reserve1,
                self.total_shares,
            )?
        };

        self.credit_shares(recipient, shares)?;
        self.reserve0 = checked_add(self.reserve0, amount0)?;
        self.reserve1 = checked_add(self.reserve1, amount1)?;
        self.update_k_last(fee_to.is_some())?;

        debug!(
            "{} minted {} shares to {:?} for ({}, {})",
            self.id, shares, recipient, amount0, amount1
        );
        Ok(MintOutcome {
            shares,
            protocol_fee_shares,
        })
    }

    /// Redeem `shares` held by `provider` for the underlying tokens
    pub fn burn(&mut self, provider: Address, shares: U256, fee_to: Option<Address>) -> Result<BurnOutcome> {
        // Shares held by the zero address are the permanent liquidity lock
        if provider == ZERO_ADDRESS {
            return Err(ExchangeError::PermissionDenied);
        }
        if self.share_balance(provider) < shares {
            return Err(ExchangeError::InsufficientBalance);
        }
        let protocol_fee_shares = self.mint_protocol_fee(fee_to)?;

        let (amount0, amount1) =
            ConstantProduct::burn_amounts(shares, self.reserve0, self.reserve1, self.total_shares)?;

        self.debit_shares(provider, shares)?;
        self.reserve0 -= amount0;
        self.reserve1 -= amount1;
        self.update_k_last(fee_to.is_some())?;

        debug!(
            "{} burned {} shares of {:?} for ({}, {})",
            self.id, shares, provider, amount0, amount1
        );
        Ok(BurnOutcome {
            amount0,
            amount1,
            protocol_fee_shares,
        })
    }

    /// Sell `amount_in` of `token_in` into the pair
    ///
    /// The MEV fee (if any) is withheld from the output and stays in the
    /// reserves. Fails with `SlippageExceeded` when the net output is below
    /// `min_amount_out`.
    pub fn swap(
        &mut self,
        token_in: &T,
        amount_in: U256,
        min_amount_out: U256,
        env: &SwapEnv<'_>,
    ) -> Result<SwapOutcome> {
        let side_in = self.side_of(token_in)?;
        let (reserve_in, reserve_out) = self.reserves_for(token_in)?;
        let quoted = Self::quote_swap(amount_in, reserve_in, reserve_out, env.fee_bps)?;
        if quoted.is_zero() {
            return Err(ExchangeError::InsufficientOutputAmount);
        }

        let defended = env.mev.defend(&DefendRequest {
            pair: self.id,
            trader: env.trader,
            amount_in,
            amount_out: quoted,
            reserve_in,
            reserve_out,
            block_number: env.block_number,
        })?;

        if defended.amount_out < min_amount_out {
            return Err(ExchangeError::SlippageExceeded {
                actual: defended.amount_out,
                minimum: min_amount_out,
            });
        }

        let new_in = checked_add(reserve_in, amount_in)?;
        let new_out = reserve_out - defended.amount_out;
        if !ConstantProduct::product_non_decreasing((reserve_in, reserve_out), (new_in, new_out)) {
            error!(
                "{} invariant violated: ({}, {}) -> ({}, {})",
                self.id, reserve_in, reserve_out, new_in, new_out
            );
            return Err(ExchangeError::InvariantViolation);
        }

        match side_in {
            Side::Token0 => {
                self.reserve0 = new_in;
                self.reserve1 = new_out;
            }
            Side::Token1 => {
                self.reserve1 = new_in;
                self.reserve0 = new_out;
            }
        }

        debug!(
            "{} swap by {:?}: {} in, {} out, {} MEV fee",
            self.id, env.trader, amount_in, defended.amount_out, defended.mev_fee
        );
        Ok(SwapOutcome {
            amount_out: defended.amount_out,
            mev_fee: defended.mev_fee,
            side_in,
            protected: defended.protected,
        })
    }

    /// Move pool shares between holders
    pub fn transfer_shares(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        if from == ZERO_ADDRESS {
            return Err(ExchangeError::PermissionDenied);
        }
        self.debit_shares(from, amount)?;
        self.credit_shares(to, amount)
    }

    /// Force reserves to match the pair account's ledger balances
    pub fn sync(&mut self, balance0: U256, balance1: U256) {
        self.reserve0 = balance0;
        self.reserve1 = balance1;
    }

    fn mint_protocol_fee(&mut self, fee_to: Option<Address>) -> Result<U256> {
        let Some(fee_to) = fee_to else {
            return Ok(U256::zero());
        };
        let fee_shares = ConstantProduct::protocol_fee_shares(
            self.reserve0,
            self.reserve1,
            self.k_last,
            self.total_shares,
        )?;
        if !fee_shares.is_zero() {
            self.credit_shares(fee_to, fee_shares)?;
            debug!("{} protocol fee: {} shares to {:?}", self.id, fee_shares, fee_to);
        }
        Ok(fee_shares)
    }

    fn update_k_last(&mut self, fee_on: bool) -> Result<()> {
        self.k_last = if fee_on {
            self.reserve0
                .checked_mul(self.reserve1)
                .ok_or(ExchangeError::ArithmeticOverflow)?
        } else {
            U256::zero()
        };
        Ok(())
    }

    fn credit_shares(&mut self, owner: Address, amount: U256) -> Result<()> {
        self.total_shares = checked_add(self.total_shares, amount)?;
        let balance = self.shares.entry(owner).or_default();
        *balance = checked_add(*balance, amount)?;
        Ok(())
    }

    fn debit_shares(&mut self, owner: Address, amount: U256) -> Result<()> {
        let balance = self.shares.entry(owner).or_default();
        *balance = balance
            .checked_sub(amount)
            .ok_or(ExchangeError::InsufficientBalance)?;
        self.total_shares -= amount;
        Ok(())
    }
}

fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(ExchangeError::ArithmeticOverflow)
}

/// A registered pair: immutable identity plus lock-protected state
#[derive(Debug)]
pub struct Pair<T> {
    id: PairId,
    token0: T,
    token1: T,
    account: Address,
    state: Mutex<PairState<T>>,
}

impl<T: TokenId> Pair<T> {
    pub fn new(state: PairState<T>) -> Self {
        Self {
            id: state.id,
            token0: state.token0.clone(),
            token1: state.token1.clone(),
            account: state.account,
            state: Mutex::new(state),
        }
    }

    pub fn id(&self) -> PairId {
        self.id
    }

    pub fn tokens(&self) -> (&T, &T) {
        (&self.token0, &self.token1)
    }

    pub fn account(&self) -> Address {
        self.account
    }

    /// Acquire the pair, failing with `Locked` after `timeout`
    pub fn lock(&self, timeout: Duration) -> Result<MutexGuard<'_, PairState<T>>> {
        self.state.try_lock_for(timeout).ok_or_else(|| {
            debug!("{} busy for more than {:?}", self.id, timeout);
            ExchangeError::Locked
        })
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self, timeout: Duration) -> Result<PairState<T>> {
        Ok(self.lock(timeout)?.clone())
    }
}
