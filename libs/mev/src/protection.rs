//! MEV guard: per-pair defence window, per-user opt-in, fee / size policy

use dashmap::DashMap;
use leafswap_config::{MevConfig, BPS_DENOMINATOR};
use leafswap_types::{Address, ExchangeError, PairId, Result, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// One swap hop presented to the guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefendRequest {
    pub pair: PairId,
    pub trader: Address,
    pub amount_in: U256,
    /// Gross quoted output before any MEV fee
    pub amount_out: U256,
    pub reserve_in: U256,
    pub reserve_out: U256,
    pub block_number: u64,
}

/// What the guard lets through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DefendOutcome {
    /// Output the trader actually receives
    pub amount_out: U256,
    /// Deducted from the quoted output and left in the pool
    pub mev_fee: U256,
    /// Swap fell inside the window of an opted-in trader
    pub protected: bool,
}

impl DefendOutcome {
    fn pass_through(amount_out: U256) -> Self {
        Self {
            amount_out,
            mev_fee: U256::zero(),
            protected: false,
        }
    }
}

/// Statistics for MEV protection monitoring
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MevGuardStats {
    pub authorized_factories: usize,
    pub guarded_pairs: usize,
    pub protected_users: usize,
    pub defended_swaps: u64,
    pub rejected_swaps: u64,
    pub fee_charging_swaps: u64,
}

/// Anti-front-running guard shared by every pair of an exchange
pub struct MevGuard {
    owner: RwLock<Address>,
    params: RwLock<MevConfig>,
    factories: RwLock<HashSet<Address>>,
    /// Pair -> first block no longer protected
    block_edges: DashMap<PairId, u64>,
    /// Users who opted into protection
    user_enabled: DashMap<Address, bool>,
    defended_swaps: AtomicU64,
    rejected_swaps: AtomicU64,
    fee_charging_swaps: AtomicU64,
}

impl MevGuard {
    pub fn new(owner: Address, params: MevConfig) -> Result<Self> {
        validate_bps("anti_mev_fee_bps", params.anti_mev_fee_bps)?;
        validate_bps(
            "anti_mev_amount_out_limit_bps",
            params.anti_mev_amount_out_limit_bps,
        )?;
        info!(
            "MEV guard online: window {} blocks, fee {} bps, size floor {} bps",
            params.anti_front_defend_block,
            params.anti_mev_fee_bps,
            params.anti_mev_amount_out_limit_bps
        );
        Ok(Self {
            owner: RwLock::new(owner),
            params: RwLock::new(params),
            factories: RwLock::new(HashSet::new()),
            block_edges: DashMap::new(),
            user_enabled: DashMap::new(),
            defended_swaps: AtomicU64::new(0),
            rejected_swaps: AtomicU64::new(0),
            fee_charging_swaps: AtomicU64::new(0),
        })
    }

    pub fn owner(&self) -> Address {
        *self.owner.read()
    }

    pub fn params(&self) -> MevConfig {
        *self.params.read()
    }

    fn ensure_owner(&self, caller: Address, action: &str) -> Result<()> {
        if caller != self.owner() {
            warn!("Rejected {} from non-owner {:?}", action, caller);
            return Err(ExchangeError::PermissionDenied);
        }
        Ok(())
    }

    pub fn transfer_ownership(&self, caller: Address, new_owner: Address) -> Result<()> {
        self.ensure_owner(caller, "transfer_ownership")?;
        *self.owner.write() = new_owner;
        info!("MEV guard ownership transferred to {:?}", new_owner);
        Ok(())
    }

    /// Authorize or revoke a factory; only authorized factories set block edges
    pub fn set_factory_status(&self, caller: Address, factory: Address, enabled: bool) -> Result<()> {
        self.ensure_owner(caller, "set_factory_status")?;
        let mut factories = self.factories.write();
        if enabled {
            factories.insert(factory);
        } else {
            factories.remove(&factory);
        }
        info!("Factory {:?} authorization set to {}", factory, enabled);
        Ok(())
    }

    pub fn is_factory(&self, address: Address) -> bool {
        self.factories.read().contains(&address)
    }

    /// Open the defence window of a newly created pair
    ///
    /// The edge is `creation_block + anti_front_defend_block` and can be set
    /// once per pair. Returns the edge.
    pub fn set_block_edge(&self, caller: Address, pair: PairId, creation_block: u64) -> Result<u64> {
        if !self.is_factory(caller) {
            warn!("Rejected block edge for {} from unauthorized {:?}", pair, caller);
            return Err(ExchangeError::PermissionDenied);
        }
        let window = self.params.read().anti_front_defend_block;
        let edge = creation_block
            .checked_add(window)
            .ok_or(ExchangeError::ArithmeticOverflow)?;

        match self.block_edges.entry(pair) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                warn!(
                    "Block edge for {} already set to {}, refusing to move it",
                    pair,
                    existing.get()
                );
                Err(ExchangeError::PermissionDenied)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(edge);
                info!("{} protected until block {}", pair, edge);
                Ok(edge)
            }
        }
    }

    pub fn block_edge(&self, pair: PairId) -> Option<u64> {
        self.block_edges.get(&pair).map(|edge| *edge)
    }

    /// True while `block` is strictly before the pair's edge
    pub fn is_protected(&self, pair: PairId, block_number: u64) -> bool {
        self.block_edge(pair)
            .map(|edge| block_number < edge)
            .unwrap_or(false)
    }

    /// Opt a user in or out; users manage their own flag, the owner may manage anyone's
    pub fn set_user_mev_enabled(&self, caller: Address, user: Address, enabled: bool) -> Result<()> {
        if caller != user && caller != self.owner() {
            warn!("Rejected MEV flag change for {:?} from {:?}", user, caller);
            return Err(ExchangeError::PermissionDenied);
        }
        self.user_enabled.insert(user, enabled);
        debug!("MEV protection for {:?} set to {}", user, enabled);
        Ok(())
    }

    pub fn is_user_mev_enabled(&self, user: Address) -> bool {
        self.user_enabled.get(&user).map(|flag| *flag).unwrap_or(false)
    }

    pub fn set_anti_front_defend_block(&self, caller: Address, blocks: u64) -> Result<()> {
        self.ensure_owner(caller, "set_anti_front_defend_block")?;
        self.params.write().anti_front_defend_block = blocks;
        info!("Anti-front-running window set to {} blocks", blocks);
        Ok(())
    }

    pub fn set_anti_mev_fee_bps(&self, caller: Address, fee_bps: u32) -> Result<()> {
        self.ensure_owner(caller, "set_anti_mev_fee_bps")?;
        validate_bps("anti_mev_fee_bps", fee_bps)?;
        self.params.write().anti_mev_fee_bps = fee_bps;
        info!("Anti-MEV fee set to {} bps", fee_bps);
        Ok(())
    }

    pub fn set_anti_mev_amount_out_limit_bps(&self, caller: Address, limit_bps: u32) -> Result<()> {
        self.ensure_owner(caller, "set_anti_mev_amount_out_limit_bps")?;
        validate_bps("anti_mev_amount_out_limit_bps", limit_bps)?;
        self.params.write().anti_mev_amount_out_limit_bps = limit_bps;
        info!("Anti-MEV size floor set to {} bps", limit_bps);
        Ok(())
    }

    /// Apply the protection policy to one swap hop
    ///
    /// Inside the window and for opted-in traders: outputs below
    /// `reserve_out * limit_bps / 10000` are rejected with `AmountTooSmall`,
    /// otherwise `amount_out * fee_bps / 10000` is withheld. Everything else
    /// passes through untouched.
    pub fn defend(&self, request: &DefendRequest) -> Result<DefendOutcome> {
        if !self.is_protected(request.pair, request.block_number)
            || !self.is_user_mev_enabled(request.trader)
        {
            return Ok(DefendOutcome::pass_through(request.amount_out));
        }

        let params = self.params();
        let floor = bps_of(request.reserve_out, params.anti_mev_amount_out_limit_bps)?;
        if request.amount_out < floor {
            self.rejected_swaps.fetch_add(1, Ordering::Relaxed);
            warn!(
                "MEV guard rejected swap on {} by {:?}: output {} below floor {}",
                request.pair, request.trader, request.amount_out, floor
            );
            return Err(ExchangeError::AmountTooSmall {
                amount_out: request.amount_out,
                floor,
            });
        }

        let mev_fee = bps_of(request.amount_out, params.anti_mev_fee_bps)?;
        debug!(
            "MEV guard on {}: withheld {} of {} at block {}",
            request.pair, mev_fee, request.amount_out, request.block_number
        );
        Ok(DefendOutcome {
            amount_out: request.amount_out - mev_fee,
            mev_fee,
            protected: true,
        })
    }

    /// Count a defended swap once its call has committed
    ///
    /// `defend` runs on staged state, so only the caller knows whether the
    /// swap survived. Rejections are counted in `defend` since they always
    /// abort the call.
    pub fn record_committed(&self, outcome: &DefendOutcome) {
        if !outcome.protected {
            return;
        }
        self.defended_swaps.fetch_add(1, Ordering::Relaxed);
        if !outcome.mev_fee.is_zero() {
            self.fee_charging_swaps.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get protection statistics
    pub fn stats(&self) -> MevGuardStats {
        MevGuardStats {
            authorized_factories: self.factories.read().len(),
            guarded_pairs: self.block_edges.len(),
            protected_users: self.user_enabled.iter().filter(|flag| *flag.value()).count(),
            defended_swaps: self.defended_swaps.load(Ordering::Relaxed),
            rejected_swaps: self.rejected_swaps.load(Ordering::Relaxed),
            fee_charging_swaps: self.fee_charging_swaps.load(Ordering::Relaxed),
        }
    }
}

fn validate_bps(name: &'static str, value: u32) -> Result<()> {
    if value > BPS_DENOMINATOR {
        return Err(ExchangeError::InvalidParameter {
            name,
            reason: format!("{} bps exceeds {} bps", value, BPS_DENOMINATOR),
        });
    }
    Ok(())
}

fn bps_of(amount: U256, bps: u32) -> Result<U256> {
    amount
        .checked_mul(U256::from(bps))
        .map(|scaled| scaled / U256::from(BPS_DENOMINATOR))
        .ok_or(ExchangeError::ArithmeticOverflow)
}
