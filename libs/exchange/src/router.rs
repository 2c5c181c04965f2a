//! Router: liquidity and swap orchestration
//!
//! The router owns no state. Every call follows the same shape:
//!
//! 1. check the deadline
//! 2. lock the pairs involved, in ascending pair-id order
//! 3. run the pair operations on staged copies and the token movements in
//!    one ledger journal
//! 4. commit the journal, write the staged pairs back, release the locks
//! 5. publish the collected events
//!
//! An error anywhere before step 4 drops the journal and the copies, so a
//! failed call leaves no trace. Tokens are pulled from callers with
//! `transfer_from`, the router's own address acting as spender.

use crate::event_bus::EventBus;
use crate::factory::Factory;
use crate::pair::{Pair, PairState, Side, SwapEnv};
use leafswap_amm::analytics::{self, compound_impact};
use leafswap_amm::{chain_amounts_in, chain_amounts_out, ConstantProduct, Decimal, ReserveSnapshot};
use leafswap_ledger::{LedgerTx, TokenLedger};
use leafswap_mev::{DefendOutcome, MevGuard};
use leafswap_types::{
    Address, CallContext, ExchangeError, ExchangeEvent, PairId, Result, TokenId, U256,
};
use parking_lot::MutexGuard;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Arguments of [`Router::add_liquidity`]
#[derive(Debug, Clone)]
pub struct AddLiquidity<T> {
    pub token_a: T,
    pub token_b: T,
    pub amount_a_desired: U256,
    pub amount_b_desired: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub to: Address,
    pub deadline: u64,
}

/// Arguments of [`Router::remove_liquidity`]
#[derive(Debug, Clone)]
pub struct RemoveLiquidity<T> {
    pub token_a: T,
    pub token_b: T,
    pub shares: U256,
    pub amount_a_min: U256,
    pub amount_b_min: U256,
    pub to: Address,
    pub deadline: u64,
}

/// Arguments of [`Router::swap`], a swap against a single pair
#[derive(Debug, Clone)]
pub struct SingleSwap<T> {
    pub token_in: T,
    pub token_out: T,
    pub amount_in: U256,
    pub min_amount_out: U256,
    pub to: Address,
    pub deadline: u64,
}

/// Locked pairs of one call, by id
type Locks<'p, T> = BTreeMap<PairId, MutexGuard<'p, PairState<T>>>;

/// Staged pair copies of one call, by id
type Staged<T> = BTreeMap<PairId, PairState<T>>;

/// Staged result of a routed swap, applied only after commit
struct Route<T> {
    amounts: Vec<U256>,
    events: Vec<ExchangeEvent<T>>,
    defended: Vec<DefendOutcome>,
}

pub struct Router<T: TokenId> {
    address: Address,
    factory: Arc<Factory<T>>,
    ledger: Arc<TokenLedger<T>>,
    mev: Arc<MevGuard>,
    events: Arc<EventBus<T>>,
    minimum_liquidity: U256,
    lock_timeout: Duration,
}

impl<T: TokenId> Router<T> {
    pub fn new(
        address: Address,
        factory: Arc<Factory<T>>,
        ledger: Arc<TokenLedger<T>>,
        mev: Arc<MevGuard>,
        events: Arc<EventBus<T>>,
        minimum_liquidity: U256,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            address,
            factory,
            ledger,
            mev,
            events,
            minimum_liquidity,
            lock_timeout,
        }
    }

    /// Spender address users approve before trading
    pub fn address(&self) -> Address {
        self.address
    }

    // ---------------------------------------------------------------------
    // Liquidity
    // ---------------------------------------------------------------------

    /// Deposit both tokens at the pool ratio and receive pool shares
    ///
    /// Creates the pair when it does not exist yet. Returns
    /// `(amount_a, amount_b, shares)`.
    pub fn add_liquidity(&self, ctx: &CallContext, params: &AddLiquidity<T>) -> Result<(U256, U256, U256)> {
        ctx.ensure_not_expired(params.deadline)?;

        let pair = match self.factory.get_pair(&params.token_a, &params.token_b) {
            Some(pair) => pair,
            None => {
                self.preflight_first_deposit(ctx, params)?;
                match self.factory.create_pair(
                    params.token_a.clone(),
                    params.token_b.clone(),
                    ctx.block_number,
                ) {
                    Ok(pair) => pair,
                    // Lost a creation race, deposit into the winner's pair
                    Err(ExchangeError::PairExists) => self
                        .factory
                        .get_pair(&params.token_a, &params.token_b)
                        .ok_or(ExchangeError::PairNotFound)?,
                    Err(e) => return Err(e),
                }
            }
        };

        let mut guard = pair.lock(self.lock_timeout)?;
        let mut staged = guard.clone();

        let side_a = staged.side_of(&params.token_a)?;
        let (reserve_a, reserve_b) = staged.reserves_for(&params.token_a)?;
        let (amount_a, amount_b) = optimal_amounts(params, reserve_a, reserve_b)?;

        let mut tx = self.ledger.stage();
        self.pull(&mut tx, ctx, &params.token_a, pair.account(), amount_a)?;
        self.pull(&mut tx, ctx, &params.token_b, pair.account(), amount_b)?;

        let (amount0, amount1) = oriented(side_a, amount_a, amount_b);
        let minted = staged.mint(
            amount0,
            amount1,
            params.to,
            self.minimum_liquidity,
            self.factory.fee_to(),
        )?;

        tx.commit()?;
        let (reserve0, reserve1) = staged.reserves();
        *guard = staged;
        drop(guard);

        self.events.publish_all([
            ExchangeEvent::Mint {
                pair: pair.id(),
                provider: ctx.caller,
                shares: minted.shares,
                amount0,
                amount1,
            },
            ExchangeEvent::Sync {
                pair: pair.id(),
                reserve0,
                reserve1,
            },
        ]);
        info!(
            "{:?} added ({}, {}) to {} for {} shares",
            ctx.caller,
            amount_a,
            amount_b,
            pair.id(),
            minted.shares
        );
        Ok((amount_a, amount_b, minted.shares))
    }

    /// Burn the caller's shares and send the underlying tokens to `to`
    ///
    /// Returns `(amount_a, amount_b)`.
    pub fn remove_liquidity(&self, ctx: &CallContext, params: &RemoveLiquidity<T>) -> Result<(U256, U256)> {
        ctx.ensure_not_expired(params.deadline)?;
        let pair = self.resolve(&params.token_a, &params.token_b)?;

        let mut guard = pair.lock(self.lock_timeout)?;
        let mut staged = guard.clone();
        let side_a = staged.side_of(&params.token_a)?;

        let burned = staged.burn(ctx.caller, params.shares, self.factory.fee_to())?;
        let (amount_a, amount_b) = match side_a {
            Side::Token0 => (burned.amount0, burned.amount1),
            Side::Token1 => (burned.amount1, burned.amount0),
        };
        if amount_a < params.amount_a_min {
            return Err(ExchangeError::InsufficientAAmount);
        }
        if amount_b < params.amount_b_min {
            return Err(ExchangeError::InsufficientBAmount);
        }

        let mut tx = self.ledger.stage();
        tx.transfer(&staged.token0, pair.account(), params.to, burned.amount0)?;
        tx.transfer(&staged.token1, pair.account(), params.to, burned.amount1)?;

        tx.commit()?;
        let (reserve0, reserve1) = staged.reserves();
        *guard = staged;
        drop(guard);

        self.events.publish_all([
            ExchangeEvent::Burn {
                pair: pair.id(),
                provider: ctx.caller,
                shares: params.shares,
                amount0: burned.amount0,
                amount1: burned.amount1,
                recipient: params.to,
            },
            ExchangeEvent::Sync {
                pair: pair.id(),
                reserve0,
                reserve1,
            },
        ]);
        info!(
            "{:?} removed {} shares from {} for ({}, {})",
            ctx.caller,
            params.shares,
            pair.id(),
            amount_a,
            amount_b
        );
        Ok((amount_a, amount_b))
    }

    // ---------------------------------------------------------------------
    // Swaps
    // ---------------------------------------------------------------------

    /// Swap against one pair with a per-pair minimum (`SlippageExceeded`)
    pub fn swap(&self, ctx: &CallContext, params: &SingleSwap<T>) -> Result<U256> {
        ctx.ensure_not_expired(params.deadline)?;
        let path = [params.token_in.clone(), params.token_out.clone()];
        let pairs = self.resolve_path(&path)?;
        let mut locks = self.lock_pairs(&pairs)?;
        let mut staged = stage_copies(&locks);

        let mut tx = self.ledger.stage();
        let route = self.execute_hops(
            &mut tx,
            &mut staged,
            ctx,
            &path,
            &pairs,
            params.amount_in,
            params.min_amount_out,
            params.to,
        )?;

        self.finish(tx, &mut locks, staged)?;
        drop(locks);
        Ok(self.settle(route)[1])
    }

    /// Sell exactly `amount_in` of `path[0]` along `path`
    ///
    /// Returns the amount after every hop; fails with
    /// `InsufficientOutputAmount` when the last one is below `amount_out_min`.
    pub fn swap_exact_tokens_for_tokens(
        &self,
        ctx: &CallContext,
        amount_in: U256,
        amount_out_min: U256,
        path: &[T],
        to: Address,
        deadline: u64,
    ) -> Result<Vec<U256>> {
        ctx.ensure_not_expired(deadline)?;
        let pairs = self.resolve_path(path)?;
        let mut locks = self.lock_pairs(&pairs)?;
        let mut staged = stage_copies(&locks);

        let mut tx = self.ledger.stage();
        let route = self.execute_hops(
            &mut tx,
            &mut staged,
            ctx,
            path,
            &pairs,
            amount_in,
            U256::zero(),
            to,
        )?;

        let final_out = route.amounts.last().copied().unwrap_or_default();
        if final_out < amount_out_min {
            debug!("Route output {} below minimum {}", final_out, amount_out_min);
            return Err(ExchangeError::InsufficientOutputAmount);
        }

        self.finish(tx, &mut locks, staged)?;
        drop(locks);
        Ok(self.settle(route))
    }

    /// Buy exactly `amount_out` of the last token, spending at most `amount_in_max`
    ///
    /// Inputs come from the reverse quote; an MEV fee on any hop can leave the
    /// final output short, which fails with `InsufficientOutputAmount`.
    pub fn swap_tokens_for_exact_tokens(
        &self,
        ctx: &CallContext,
        amount_out: U256,
        amount_in_max: U256,
        path: &[T],
        to: Address,
        deadline: u64,
    ) -> Result<Vec<U256>> {
        ctx.ensure_not_expired(deadline)?;
        let pairs = self.resolve_path(path)?;
        let mut locks = self.lock_pairs(&pairs)?;
        let mut staged = stage_copies(&locks);

        let fee_bps = self.factory.swap_fee_bps();
        let snapshots = hop_snapshots(path, &pairs, &staged, fee_bps)?;
        let quoted = chain_amounts_in(amount_out, &snapshots)?;
        if quoted[0] > amount_in_max {
            return Err(ExchangeError::ExcessiveInputAmount);
        }

        let mut tx = self.ledger.stage();
        let route = self.execute_hops(
            &mut tx,
            &mut staged,
            ctx,
            path,
            &pairs,
            quoted[0],
            U256::zero(),
            to,
        )?;

        let final_out = route.amounts.last().copied().unwrap_or_default();
        if final_out < amount_out {
            debug!("Exact-output route delivered {} of {}", final_out, amount_out);
            return Err(ExchangeError::InsufficientOutputAmount);
        }

        self.finish(tx, &mut locks, staged)?;
        drop(locks);
        Ok(self.settle(route))
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Send the pair account's balances above reserves to `to`
    pub fn skim(&self, token_a: &T, token_b: &T, to: Address) -> Result<(U256, U256)> {
        let pair = self.resolve(token_a, token_b)?;
        let guard = pair.lock(self.lock_timeout)?;
        let (reserve0, reserve1) = guard.reserves();

        let mut tx = self.ledger.stage();
        let excess0 = tx
            .balance_of(&guard.token0, pair.account())
            .saturating_sub(reserve0);
        let excess1 = tx
            .balance_of(&guard.token1, pair.account())
            .saturating_sub(reserve1);
        tx.transfer(&guard.token0, pair.account(), to, excess0)?;
        tx.transfer(&guard.token1, pair.account(), to, excess1)?;
        tx.commit()?;
        drop(guard);

        debug!("Skimmed ({}, {}) from {} to {:?}", excess0, excess1, pair.id(), to);
        Ok((excess0, excess1))
    }

    /// Force reserves to the pair account's ledger balances
    pub fn sync(&self, token_a: &T, token_b: &T) -> Result<(U256, U256)> {
        let pair = self.resolve(token_a, token_b)?;
        let mut guard = pair.lock(self.lock_timeout)?;
        let balance0 = self.ledger.balance_of(&guard.token0, pair.account());
        let balance1 = self.ledger.balance_of(&guard.token1, pair.account());
        guard.sync(balance0, balance1);
        drop(guard);

        self.events.publish(ExchangeEvent::Sync {
            pair: pair.id(),
            reserve0: balance0,
            reserve1: balance1,
        });
        Ok((balance0, balance1))
    }

    // ---------------------------------------------------------------------
    // Quotes
    // ---------------------------------------------------------------------

    /// Ratio-preserving counterpart amount
    pub fn quote(&self, amount_a: U256, reserve_a: U256, reserve_b: U256) -> Result<U256> {
        PairState::<T>::quote(amount_a, reserve_a, reserve_b)
    }

    /// Outputs along `path` for `amount_in`, MEV policy not applied
    pub fn get_amounts_out(&self, amount_in: U256, path: &[T]) -> Result<Vec<U256>> {
        chain_amounts_out(amount_in, &self.current_snapshots(path)?)
    }

    /// Inputs along `path` needed for `amount_out`, MEV policy not applied
    pub fn get_amounts_in(&self, amount_out: U256, path: &[T]) -> Result<Vec<U256>> {
        chain_amounts_in(amount_out, &self.current_snapshots(path)?)
    }

    /// Price impact of selling `amount_in` along `path`, in percent
    pub fn price_impact(&self, amount_in: U256, path: &[T]) -> Result<Decimal> {
        let snapshots = self.current_snapshots(path)?;
        let amounts = chain_amounts_out(amount_in, &snapshots)?;
        let hops = snapshots
            .iter()
            .zip(&amounts)
            .map(|(hop, amount)| analytics::price_impact(*amount, hop.reserve_in, hop.reserve_out))
            .collect::<Result<Vec<_>>>()?;
        Ok(compound_impact(&hops))
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn resolve(&self, token_a: &T, token_b: &T) -> Result<Arc<Pair<T>>> {
        if token_a == token_b {
            return Err(ExchangeError::IdenticalTokens);
        }
        self.factory
            .get_pair(token_a, token_b)
            .ok_or(ExchangeError::PairNotFound)
    }

    /// One pair per hop
    fn resolve_path(&self, path: &[T]) -> Result<Vec<Arc<Pair<T>>>> {
        if path.len() < 2 {
            return Err(ExchangeError::invalid_path(format!(
                "path needs at least 2 tokens, got {}",
                path.len()
            )));
        }
        path.windows(2)
            .map(|hop| self.resolve(&hop[0], &hop[1]))
            .collect()
    }

    /// Lock the distinct pairs in ascending id order
    fn lock_pairs<'p>(&self, pairs: &'p [Arc<Pair<T>>]) -> Result<Locks<'p, T>> {
        let mut distinct: Vec<&'p Arc<Pair<T>>> = pairs.iter().collect();
        distinct.sort_by_key(|pair| pair.id());
        distinct.dedup_by_key(|pair| pair.id());

        let mut locks = BTreeMap::new();
        for pair in distinct {
            locks.insert(pair.id(), pair.lock(self.lock_timeout)?);
        }
        Ok(locks)
    }

    fn current_snapshots(&self, path: &[T]) -> Result<Vec<ReserveSnapshot>> {
        let pairs = self.resolve_path(path)?;
        let fee_bps = self.factory.swap_fee_bps();
        path.windows(2)
            .zip(&pairs)
            .map(|(hop, pair)| {
                let state = pair.snapshot(self.lock_timeout)?;
                let (reserve_in, reserve_out) = state.reserves_for(&hop[0])?;
                Ok(ReserveSnapshot::new(reserve_in, reserve_out, fee_bps))
            })
            .collect()
    }

    /// `transfer_from` the caller with the router as spender
    fn pull(&self, tx: &mut LedgerTx<'_, T>, ctx: &CallContext, token: &T, to: Address, amount: U256) -> Result<()> {
        tx.transfer_from(token, self.address, ctx.caller, to, amount)
    }

    /// Pull `amount_in`, then swap hop by hop on the staged pairs
    ///
    /// Each hop's output is sent straight to the next pair's account, the
    /// last one to `to`. `min_amount_out` applies to every hop.
    #[allow(clippy::too_many_arguments)]
    fn execute_hops(
        &self,
        tx: &mut LedgerTx<'_, T>,
        staged: &mut Staged<T>,
        ctx: &CallContext,
        path: &[T],
        pairs: &[Arc<Pair<T>>],
        amount_in: U256,
        min_amount_out: U256,
        to: Address,
    ) -> Result<Route<T>> {
        let env = SwapEnv {
            fee_bps: self.factory.swap_fee_bps(),
            trader: ctx.caller,
            block_number: ctx.block_number,
            mev: self.mev.as_ref(),
        };

        self.pull(tx, ctx, &path[0], pairs[0].account(), amount_in)?;

        let mut amounts = Vec::with_capacity(path.len());
        let mut events = Vec::with_capacity(pairs.len() * 2);
        let mut defended = Vec::with_capacity(pairs.len());
        amounts.push(amount_in);

        for (hop, pair) in pairs.iter().enumerate() {
            let recipient = pairs.get(hop + 1).map(|next| next.account()).unwrap_or(to);
            let state = staged.get_mut(&pair.id()).ok_or(ExchangeError::PairNotFound)?;
            let hop_in = amounts[hop];

            let outcome = state.swap(&path[hop], hop_in, min_amount_out, &env)?;
            tx.transfer(&path[hop + 1], pair.account(), recipient, outcome.amount_out)?;

            let (reserve0, reserve1) = state.reserves();
            events.push(ExchangeEvent::Swap {
                pair: pair.id(),
                trader: ctx.caller,
                token_in: path[hop].clone(),
                amount_in: hop_in,
                amount_out: outcome.amount_out,
                mev_fee: outcome.mev_fee,
                recipient,
            });
            events.push(ExchangeEvent::Sync {
                pair: pair.id(),
                reserve0,
                reserve1,
            });
            amounts.push(outcome.amount_out);
            defended.push(DefendOutcome {
                amount_out: outcome.amount_out,
                mev_fee: outcome.mev_fee,
                protected: outcome.protected,
            });
        }
        Ok(Route {
            amounts,
            events,
            defended,
        })
    }

    /// Count committed MEV defences and publish the route's events
    fn settle(&self, route: Route<T>) -> Vec<U256> {
        for outcome in &route.defended {
            self.mev.record_committed(outcome);
        }
        self.events.publish_all(route.events);
        route.amounts
    }

    /// Commit the journal and write the staged pairs back under their locks
    fn finish(&self, tx: LedgerTx<'_, T>, locks: &mut Locks<'_, T>, mut staged: Staged<T>) -> Result<()> {
        tx.commit()?;
        for (id, guard) in locks.iter_mut() {
            if let Some(state) = staged.remove(id) {
                **guard = state;
            }
        }
        Ok(())
    }
}

fn stage_copies<T: TokenId>(locks: &Locks<'_, T>) -> Staged<T> {
    locks
        .iter()
        .map(|(id, guard)| (*id, (**guard).clone()))
        .collect()
}

/// Reserve snapshots of every hop, read from the staged pairs
fn hop_snapshots<T: TokenId>(
    path: &[T],
    pairs: &[Arc<Pair<T>>],
    staged: &Staged<T>,
    fee_bps: u32,
) -> Result<Vec<ReserveSnapshot>> {
    path.windows(2)
        .zip(pairs)
        .map(|(hop, pair)| {
            let state = staged.get(&pair.id()).ok_or(ExchangeError::PairNotFound)?;
            let (reserve_in, reserve_out) = state.reserves_for(&hop[0])?;
            Ok(ReserveSnapshot::new(reserve_in, reserve_out, fee_bps))
        })
        .collect()
}

/// Amounts to deposit given the current reserves and the caller's bounds
fn optimal_amounts<T>(params: &AddLiquidity<T>, reserve_a: U256, reserve_b: U256) -> Result<(U256, U256)> {
    if reserve_a.is_zero() && reserve_b.is_zero() {
        return Ok((params.amount_a_desired, params.amount_b_desired));
    }

    let amount_b_optimal = ConstantProduct::quote(params.amount_a_desired, reserve_a, reserve_b)?;
    if amount_b_optimal <= params.amount_b_desired {
        if amount_b_optimal < params.amount_b_min {
            return Err(ExchangeError::InsufficientBAmount);
        }
        return Ok((params.amount_a_desired, amount_b_optimal));
    }

    let amount_a_optimal = ConstantProduct::quote(params.amount_b_desired, reserve_b, reserve_a)?;
    if amount_a_optimal > params.amount_a_desired || amount_a_optimal < params.amount_a_min {
        return Err(ExchangeError::InsufficientAAmount);
    }
    Ok((amount_a_optimal, params.amount_b_desired))
}

/// Map token-A / token-B amounts onto pair sides
fn oriented(side_a: Side, amount_a: U256, amount_b: U256) -> (U256, U256) {
    match side_a {
        Side::Token0 => (amount_a, amount_b),
        Side::Token1 => (amount_b, amount_a),
    }
}

impl<T: TokenId> Router<T> {
    /// Check share issuance, funds and approval of a first deposit
    /// before its pair is created
    fn preflight_first_deposit(&self, ctx: &CallContext, params: &AddLiquidity<T>) -> Result<()> {
        if params.token_a == params.token_b {
            return Err(ExchangeError::IdenticalTokens);
        }
        ConstantProduct::initial_shares(
            params.amount_a_desired,
            params.amount_b_desired,
            self.minimum_liquidity,
        )?;
        let mut tx = self.ledger.stage();
        self.pull(&mut tx, ctx, &params.token_a, self.address, params.amount_a_desired)?;
        self.pull(&mut tx, ctx, &params.token_b, self.address, params.amount_b_desired)?;
        Ok(())
    }
}
