//! Pair registry
//!
//! Pairs are keyed by the canonical (sorted) token pair in a `DashMap`, so
//! two concurrent creations of the same pair race on one map entry and
//! exactly one wins. The creation-ordered list sits behind an `RwLock`.

use crate::event_bus::EventBus;
use crate::pair::{Pair, PairState};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use leafswap_config::MAX_SWAP_FEE_BPS;
use leafswap_mev::MevGuard;
use leafswap_types::{
    pair_account, sort_tokens, Address, ExchangeError, ExchangeEvent, PairId, Result, TokenId,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Protocol fee settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeeSettings {
    fee_to: Option<Address>,
    fee_to_setter: Address,
}

pub struct Factory<T: TokenId> {
    address: Address,
    index: DashMap<(T, T), PairId>,
    pairs: RwLock<Vec<Arc<Pair<T>>>>,
    fees: RwLock<FeeSettings>,
    swap_fee_bps: AtomicU32,
    mev: Arc<MevGuard>,
    events: Arc<EventBus<T>>,
}

impl<T: TokenId> Factory<T> {
    pub fn new(
        address: Address,
        fee_to_setter: Address,
        swap_fee_bps: u32,
        mev: Arc<MevGuard>,
        events: Arc<EventBus<T>>,
    ) -> Result<Self> {
        check_fee(swap_fee_bps)?;
        Ok(Self {
            address,
            index: DashMap::new(),
            pairs: RwLock::new(Vec::new()),
            fees: RwLock::new(FeeSettings {
                fee_to: None,
                fee_to_setter,
            }),
            swap_fee_bps: AtomicU32::new(swap_fee_bps),
            mev,
            events,
        })
    }

    /// Account the factory acts as towards the MEV guard
    pub fn address(&self) -> Address {
        self.address
    }

    /// Register a new pair and open its MEV defence window
    ///
    /// If the guard refuses the block edge the pair is not created.
    pub fn create_pair(&self, token_a: T, token_b: T, block_number: u64) -> Result<Arc<Pair<T>>> {
        let (token0, token1) = sort_tokens(token_a, token_b)?;

        let created = match self.index.entry((token0.clone(), token1.clone())) {
            Entry::Occupied(_) => return Err(ExchangeError::PairExists),
            Entry::Vacant(slot) => {
                let mut pairs = self.pairs.write();
                let id = PairId::new(pairs.len() as u64);
                let account = pair_account(self.address, &token0, &token1);

                if let Err(e) = self.mev.set_block_edge(self.address, id, block_number) {
                    warn!("Pair creation for {:?}/{:?} aborted: {}", token0, token1, e);
                    return Err(e);
                }

                let pair = Arc::new(Pair::new(PairState::new(
                    id,
                    token0.clone(),
                    token1.clone(),
                    account,
                    block_number,
                )));
                pairs.push(Arc::clone(&pair));
                slot.insert(id);
                (pair, pairs.len() as u64)
            }
        };

        let (pair, all_pairs_length) = created;
        info!(
            "Created {} for {:?}/{:?} at {:?} (block {})",
            pair.id(),
            token0,
            token1,
            pair.account(),
            block_number
        );
        self.events.publish(ExchangeEvent::PairCreated {
            pair: pair.id(),
            account: pair.account(),
            token0,
            token1,
            all_pairs_length,
        });
        Ok(pair)
    }

    /// Look up a pair regardless of token order
    pub fn get_pair(&self, token_a: &T, token_b: &T) -> Option<Arc<Pair<T>>> {
        let key = if token_a <= token_b {
            (token_a.clone(), token_b.clone())
        } else {
            (token_b.clone(), token_a.clone())
        };
        let id = *self.index.get(&key)?;
        self.pair(id)
    }

    pub fn pair(&self, id: PairId) -> Option<Arc<Pair<T>>> {
        self.pairs.read().get(id.inner() as usize).cloned()
    }

    /// Pair by creation index
    pub fn all_pairs(&self, index: usize) -> Option<Arc<Pair<T>>> {
        self.pairs.read().get(index).cloned()
    }

    pub fn all_pairs_length(&self) -> usize {
        self.pairs.read().len()
    }

    pub fn swap_fee_bps(&self) -> u32 {
        self.swap_fee_bps.load(Ordering::Acquire)
    }

    pub fn fee_to(&self) -> Option<Address> {
        self.fees.read().fee_to
    }

    pub fn fee_to_setter(&self) -> Address {
        self.fees.read().fee_to_setter
    }

    fn ensure_setter(&self, caller: Address, action: &str) -> Result<()> {
        if caller != self.fee_to_setter() {
            warn!("Rejected {} from {:?}", action, caller);
            return Err(ExchangeError::PermissionDenied);
        }
        Ok(())
    }

    /// Set or clear the protocol fee recipient
    pub fn set_fee_to(&self, caller: Address, fee_to: Option<Address>) -> Result<()> {
        self.ensure_setter(caller, "set_fee_to")?;
        self.fees.write().fee_to = fee_to;
        info!("Protocol fee recipient set to {:?}", fee_to);
        Ok(())
    }

    pub fn set_fee_to_setter(&self, caller: Address, setter: Address) -> Result<()> {
        self.ensure_setter(caller, "set_fee_to_setter")?;
        self.fees.write().fee_to_setter = setter;
        info!("Fee setter handed to {:?}", setter);
        Ok(())
    }

    pub fn set_swap_fee_rate(&self, caller: Address, fee_bps: u32) -> Result<()> {
        self.ensure_setter(caller, "set_swap_fee_rate")?;
        check_fee(fee_bps)?;
        self.swap_fee_bps.store(fee_bps, Ordering::Release);
        info!("Swap fee set to {} bps", fee_bps);
        Ok(())
    }
}

fn check_fee(fee_bps: u32) -> Result<()> {
    if fee_bps > MAX_SWAP_FEE_BPS {
        return Err(ExchangeError::FeeTooHigh {
            fee_bps,
            max_bps: MAX_SWAP_FEE_BPS,
        });
    }
    Ok(())
}
