//! Top-level exchange instance
//!
//! Wires ledger, MEV guard, factory, router and event bus together from one
//! [`ExchangeConfig`]. The factory and router get deterministic service
//! accounts derived from the owner, and the factory is authorized on the
//! guard at construction.

use crate::event_bus::EventBus;
use crate::factory::Factory;
use crate::pair::{Pair, PairState};
use crate::router::Router;
use crossbeam_channel::Receiver;
use ethers_core::utils::keccak256;
use leafswap_config::ExchangeConfig;
use leafswap_ledger::TokenLedger;
use leafswap_mev::MevGuard;
use leafswap_types::{
    Address, CallContext, ExchangeError, ExchangeEvent, PairId, Result, TokenId, U256,
};
use std::sync::Arc;
use tracing::info;

pub struct Exchange<T: TokenId = Address> {
    config: ExchangeConfig,
    owner: Address,
    ledger: Arc<TokenLedger<T>>,
    mev: Arc<MevGuard>,
    factory: Arc<Factory<T>>,
    router: Router<T>,
    events: Arc<EventBus<T>>,
}

impl<T: TokenId> std::fmt::Debug for Exchange<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exchange")
            .field("config", &self.config)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl<T: TokenId> Exchange<T> {
    /// Build an exchange owned by `owner`
    ///
    /// `owner` administers the MEV guard and is the initial protocol fee
    /// setter.
    pub fn new(config: ExchangeConfig, owner: Address) -> Result<Self> {
        if config.minimum_liquidity == 0 {
            return Err(ExchangeError::InvalidParameter {
                name: "minimum_liquidity",
                reason: "must be non-zero".to_string(),
            });
        }

        let ledger = Arc::new(TokenLedger::new());
        let events = Arc::new(EventBus::new());
        let mev = Arc::new(MevGuard::new(owner, config.mev)?);

        let factory_address = service_address("leafswap.factory", owner);
        let router_address = service_address("leafswap.router", owner);
        mev.set_factory_status(owner, factory_address, true)?;

        let factory = Arc::new(Factory::new(
            factory_address,
            owner,
            config.swap_fee_bps,
            Arc::clone(&mev),
            Arc::clone(&events),
        )?);
        let router = Router::new(
            router_address,
            Arc::clone(&factory),
            Arc::clone(&ledger),
            Arc::clone(&mev),
            Arc::clone(&events),
            U256::from(config.minimum_liquidity),
            config.lock_timeout(),
        );

        info!(
            "Exchange ready: owner {:?}, factory {:?}, router {:?}, swap fee {} bps",
            owner, factory_address, router_address, config.swap_fee_bps
        );
        Ok(Self {
            config,
            owner,
            ledger,
            mev,
            factory,
            router,
            events,
        })
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn ledger(&self) -> &TokenLedger<T> {
        &self.ledger
    }

    pub fn mev(&self) -> &MevGuard {
        &self.mev
    }

    pub fn factory(&self) -> &Factory<T> {
        &self.factory
    }

    pub fn router(&self) -> &Router<T> {
        &self.router
    }

    /// Events of every call committed from now on
    pub fn subscribe(&self) -> Receiver<ExchangeEvent<T>> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus<T> {
        &self.events
    }

    /// Create a pair at the caller's block
    pub fn create_pair(&self, ctx: &CallContext, token_a: T, token_b: T) -> Result<PairId> {
        Ok(self
            .factory
            .create_pair(token_a, token_b, ctx.block_number)?
            .id())
    }

    pub fn get_pair(&self, token_a: &T, token_b: &T) -> Option<Arc<Pair<T>>> {
        self.factory.get_pair(token_a, token_b)
    }

    /// Consistent copy of a pair's state
    pub fn pair_state(&self, token_a: &T, token_b: &T) -> Result<PairState<T>> {
        self.factory
            .get_pair(token_a, token_b)
            .ok_or(ExchangeError::PairNotFound)?
            .snapshot(self.config.lock_timeout())
    }

    /// Owner-only: authorize an account to open MEV windows
    pub fn set_factory_status(&self, ctx: &CallContext, factory: Address, enabled: bool) -> Result<()> {
        self.mev.set_factory_status(ctx.caller, factory, enabled)
    }

    pub fn set_user_mev_enabled(&self, ctx: &CallContext, user: Address, enabled: bool) -> Result<()> {
        self.mev.set_user_mev_enabled(ctx.caller, user, enabled)
    }

    /// Let the router spend `amount` of the caller's `token`
    pub fn approve_router(&self, ctx: &CallContext, token: &T, amount: U256) -> Result<()> {
        self.ledger
            .approve(token, ctx.caller, self.router.address(), amount)
    }
}

/// Deterministic account for a named service of an exchange instance
fn service_address(label: &str, owner: Address) -> Address {
    let mut preimage = Vec::with_capacity(label.len() + 20);
    preimage.extend_from_slice(label.as_bytes());
    preimage.extend_from_slice(owner.as_bytes());
    Address::from_slice(&keccak256(&preimage)[12..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    #[test]
    fn test_factory_is_authorized_on_boot() {
        let exchange: Exchange = Exchange::new(ExchangeConfig::default(), addr(1)).unwrap();
        assert!(exchange.mev().is_factory(exchange.factory().address()));
        assert_ne!(exchange.factory().address(), exchange.router().address());
        assert_eq!(exchange.factory().fee_to_setter(), addr(1));
    }

    #[test]
    fn test_rejects_bad_config() {
        let mut config = ExchangeConfig::default();
        config.swap_fee_bps = 2_000;
        assert_matches!(
            Exchange::<Address>::new(config, addr(1)),
            Err(ExchangeError::FeeTooHigh { .. })
        );

        let mut config = ExchangeConfig::default();
        config.mev.anti_mev_fee_bps = 20_000;
        assert_matches!(
            Exchange::<Address>::new(config, addr(1)),
            Err(ExchangeError::InvalidParameter { .. })
        );
    }

    #[test]
    fn test_create_pair_opens_window() {
        let exchange: Exchange = Exchange::new(ExchangeConfig::default(), addr(1)).unwrap();
        let ctx = CallContext::new(addr(2), 50, 0);
        let id = exchange.create_pair(&ctx, addr(0xA), addr(0xB)).unwrap();
        assert_eq!(exchange.mev().block_edge(id), Some(150));
    }
}
