//! Exchange settled through an order-matching bridge.
//!
//! Counterparties post signed orders against a party's listing with
//! [`BridgedExchange::post_counter_order`]. When the exchange buys or sells,
//! it signs its own complementary order and hands the pair to the bridge
//! from inside the ledger's settlement step, so the ledger only commits if
//! the match executes.
//!
//! ## Legs
//!
//! - **buy** needs a posted sell order priced at or below the listing price.
//!   The exchange deposits the matched price into the party.
//! - **sell** needs a posted buy order priced at or above the held claim.
//!   The exchange withdraws its claim.
//!
//! Listings expire `duration` seconds after creation; an expired listing can
//! no longer be bought.

use std::collections::HashMap;
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::bridge::{MatchError, Order, OrderMatchingBridge, SaleKind, Side, SignedOrder};
use crate::config::ExchangeConfig;
use crate::error::{PartyError, Result};
use crate::exchange::{listing_mut, Clock, Exchange, Listing, ListingState, ListingTable, VenueParams};
use crate::ledger::Ledger;
use crate::types::{Address, Amount, LedgerEvent, PartyId};

#[derive(Default)]
struct Book {
    listings: ListingTable,
    counters: HashMap<(PartyId, Side), SignedOrder>,
}

pub struct BridgedExchange {
    key: SigningKey,
    address: Address,
    ledger: Arc<Ledger>,
    bridge: Arc<dyn OrderMatchingBridge>,
    clock: Arc<dyn Clock>,
    config: ExchangeConfig,
    book: Mutex<Book>,
}

impl BridgedExchange {
    /// The exchange acts under the address derived from `key`
    pub fn new(
        key: SigningKey,
        ledger: Arc<Ledger>,
        bridge: Arc<dyn OrderMatchingBridge>,
        clock: Arc<dyn Clock>,
        config: ExchangeConfig,
    ) -> Self {
        let address = Address::from_verifying_key(key.verifying_key());
        Self {
            key,
            address,
            ledger,
            bridge,
            clock,
            config,
            book: Mutex::new(Book::default()),
        }
    }

    /// Register a counterparty order for the next leg of a listing.
    ///
    /// Sell orders feed [`Exchange::buy`], buy orders feed [`Exchange::sell`].
    /// A later order for the same side replaces the earlier one.
    pub fn post_counter_order(&self, party_id: PartyId, order: SignedOrder) -> Result<()> {
        order.verify()?;
        if order.order.exchange != self.bridge.exchange_address() {
            return Err(MatchError::Mismatch("order references a different exchange").into());
        }

        let mut book = self.book.lock();
        if !book.listings.contains_key(&party_id) {
            return Err(PartyError::NotFound(party_id));
        }
        let side = order.order.side;
        debug!(party_id, ?side, maker = %order.order.maker, price = order.order.base_price, "counter order posted");
        book.counters.insert((party_id, side), order);
        Ok(())
    }

    /// Start another buy/sell cycle on a sold listing
    pub fn rearm(&self, party_id: PartyId) -> Result<()> {
        if !self.config.rearmable {
            return Err(PartyError::InvalidState(format!(
                "exchange {} does not re-arm listings",
                self.address
            )));
        }
        let now = self.clock.now();
        let mut book = self.book.lock();
        let listing = listing_mut(&mut book.listings, party_id)?;
        listing.rearm()?;
        if let Some(duration) = self.config.default_duration {
            listing.expires_at = Some(now.saturating_add(duration));
        }
        info!(party_id, exchange = %self.address, "listing re-armed");
        Ok(())
    }

    /// Our side of a match against `counter`, signed
    fn own_order(&self, party_id: PartyId, cycle: u32, side: Side, price: Amount, expires: u64, counter: &Order) -> Result<SignedOrder> {
        let mut salt = [0u8; 32];
        let mut hasher = Sha256::new();
        hasher.update(self.address.as_bytes());
        hasher.update(party_id.to_be_bytes());
        hasher.update(cycle.to_be_bytes());
        hasher.update([side.to_u8()]);
        salt.copy_from_slice(&hasher.finalize());

        let order = Order {
            exchange: counter.exchange,
            maker: self.address,
            taker: counter.maker,
            side,
            sale_kind: SaleKind::FixedPrice,
            target: counter.target,
            calldata: counter.calldata.clone(),
            base_price: price,
            expiration_time: expires,
            salt,
            ..Order::default()
        };
        Ok(order.sign(&self.key)?)
    }

    fn require_whitelisted(&self, action: &'static str) -> Result<()> {
        self.ledger.registry().require_whitelisted(self.address, action)
    }
}

impl Exchange for BridgedExchange {
    fn address(&self) -> Address {
        self.address
    }

    fn create_party(&self, owner: Address, threshold: Amount, target: Amount, venue: &VenueParams) -> Result<PartyId> {
        if target == 0 {
            return Err(PartyError::InvalidAmount(target));
        }
        let duration = match venue.duration.or(self.config.default_duration) {
            Some(d) if d > 0 => d,
            _ => {
                return Err(PartyError::InvalidState(
                    "bridged listings need a positive duration".into(),
                ))
            }
        };

        let mut book = self.book.lock();
        let party_id = self.ledger.create_party(self.address, owner, threshold, target)?;
        let expires_at = self.clock.now().saturating_add(duration);
        book.listings.insert(party_id, Listing::new(party_id, target, Some(expires_at)));

        info!(party_id, exchange = %self.address, price = target, expires_at, "party listed");
        Ok(party_id)
    }

    fn buy(&self, party_id: PartyId) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.book.lock();
        let book = &mut *guard;
        let listing = listing_mut(&mut book.listings, party_id)?;
        self.require_whitelisted("buy")?;
        listing.require_state(ListingState::Created, "buy")?;
        if listing.is_expired(now) {
            return Err(PartyError::InvalidState(format!("listing for party {party_id} expired")));
        }

        let counter = book
            .counters
            .get(&(party_id, Side::Sell))
            .ok_or_else(|| PartyError::InvalidState(format!("no sell order posted for party {party_id}")))?;
        let amount = counter.order.base_price;
        if amount == 0 || amount > listing.price {
            return Err(PartyError::InvalidState(format!(
                "sell order at {amount} is outside listing price {}",
                listing.price
            )));
        }

        let ours = self.own_order(
            party_id,
            listing.cycles,
            Side::Buy,
            listing.price,
            listing.expires_at.unwrap_or(0),
            &counter.order,
        )?;
        let exchange = self.address;
        let bridge = &self.bridge;
        self.ledger.deposit_settled(exchange, party_id, amount, |_| {
            let receipt = bridge.validate_and_execute(&ours, counter, now)?;
            debug!(party_id, sell = %hex::encode(receipt.sell_hash), "buy leg matched");
            Ok(Some(LedgerEvent::Bought {
                party_id,
                exchange,
                amount,
            }))
        })?;

        listing.mark_bought(amount);
        book.counters.remove(&(party_id, Side::Sell));
        Ok(())
    }

    fn sell(&self, party_id: PartyId) -> Result<()> {
        let now = self.clock.now();
        let mut guard = self.book.lock();
        let book = &mut *guard;
        let listing = listing_mut(&mut book.listings, party_id)?;
        self.require_whitelisted("sell")?;
        listing.require_state(ListingState::Listed, "sell")?;

        let counter = book
            .counters
            .get(&(party_id, Side::Buy))
            .ok_or_else(|| PartyError::InvalidState(format!("no buy order posted for party {party_id}")))?;
        let amount = listing.held;
        if counter.order.base_price < amount {
            return Err(PartyError::InvalidState(format!(
                "buy order at {} is below held claim {amount}",
                counter.order.base_price
            )));
        }

        let ours = self.own_order(party_id, listing.cycles, Side::Sell, amount, 0, &counter.order)?;
        let exchange = self.address;
        let bridge = &self.bridge;
        self.ledger.withdraw_settled(exchange, party_id, amount, |_| {
            let receipt = bridge.validate_and_execute(counter, &ours, now)?;
            debug!(party_id, buy = %hex::encode(receipt.buy_hash), "sell leg matched");
            Ok(Some(LedgerEvent::Sold {
                party_id,
                exchange,
                amount,
            }))
        })?;

        listing.mark_sold();
        book.counters.remove(&(party_id, Side::Buy));
        Ok(())
    }

    fn cancel(&self, party_id: PartyId) -> Result<()> {
        let mut guard = self.book.lock();
        let book = &mut *guard;
        let listing = listing_mut(&mut book.listings, party_id)?;
        self.require_whitelisted("cancel")?;
        let exchange = self.address;

        match listing.state {
            ListingState::Created => {
                self.ledger.record_event(LedgerEvent::Cancelled {
                    party_id,
                    exchange,
                    refunded: 0,
                });
            }
            ListingState::Listed => {
                let refunded = listing.held;
                self.ledger.withdraw_settled(exchange, party_id, refunded, |_| {
                    Ok(Some(LedgerEvent::Cancelled {
                        party_id,
                        exchange,
                        refunded,
                    }))
                })?;
            }
            ListingState::Sold | ListingState::Cancelled => {
                return listing.require_state(ListingState::Listed, "cancel");
            }
        }

        listing.mark_cancelled();
        book.counters.retain(|(id, _), _| *id != party_id);
        Ok(())
    }

    fn listing(&self, party_id: PartyId) -> Result<Listing> {
        self.book
            .lock()
            .listings
            .get(&party_id)
            .cloned()
            .ok_or(PartyError::NotFound(party_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{CallExecutor, ExecutionPlan, LocalBridge};
    use crate::exchange::FixedClock;
    use crate::ledger::InMemoryVault;

    const OWNER: Address = Address::repeat(0xaa);
    const REGISTRY: Address = Address::repeat(0xee);
    const TARGET: Address = Address::repeat(0x70);

    #[derive(Default)]
    struct Executor {
        executed: Mutex<Vec<ExecutionPlan>>,
        fail: Mutex<bool>,
    }

    impl CallExecutor for Executor {
        fn static_check(&self, _target: Address, _calldata: &[u8], _extradata: &[u8]) -> bool {
            true
        }

        fn execute(&self, plan: &ExecutionPlan) -> std::result::Result<(), MatchError> {
            if *self.fail.lock() {
                return Err(MatchError::CallFailed("reverted".into()));
            }
            self.executed.lock().push(plan.clone());
            Ok(())
        }
    }

    struct Fixture {
        ledger: Arc<Ledger>,
        vault: Arc<InMemoryVault>,
        exec: Arc<Executor>,
        clock: Arc<FixedClock>,
        ex: BridgedExchange,
    }

    fn key(b: u8) -> SigningKey {
        SigningKey::from_slice(&[b; 32]).unwrap()
    }

    fn addr(k: &SigningKey) -> Address {
        Address::from_verifying_key(k.verifying_key())
    }

    fn fixture(config: ExchangeConfig) -> Fixture {
        let ex_key = key(7);
        let vault = Arc::new(InMemoryVault::new());
        vault.fund(addr(&ex_key), 10_000);
        let ledger = Arc::new(Ledger::new(OWNER, vault.clone()));
        ledger.whitelist_host(OWNER, addr(&ex_key)).unwrap();

        let exec = Arc::new(Executor::default());
        let bridge = Arc::new(LocalBridge::new(REGISTRY, exec.clone()));
        let clock = Arc::new(FixedClock::new(1_000));
        let ex = BridgedExchange::new(ex_key, ledger.clone(), bridge, clock.clone(), config);
        Fixture {
            ledger,
            vault,
            exec,
            clock,
            ex,
        }
    }

    fn counter(k: &SigningKey, side: Side, price: Amount) -> SignedOrder {
        Order {
            exchange: REGISTRY,
            maker: addr(k),
            side,
            target: TARGET,
            calldata: vec![0x23, 0xb8, 0x72, 0xdd, 0, 0, 0, 5],
            base_price: price,
            salt: [side.to_u8() + 1; 32],
            ..Order::default()
        }
        .sign(k)
        .unwrap()
    }

    fn listed(f: &Fixture) -> PartyId {
        f.ex.create_party(OWNER, 0, 200, &VenueParams::with_duration(60)).unwrap()
    }

    #[test]
    fn test_duration_required() {
        let f = fixture(ExchangeConfig::default());
        assert!(matches!(
            f.ex.create_party(OWNER, 0, 200, &VenueParams::default()),
            Err(PartyError::InvalidState(_))
        ));
        assert!(matches!(
            f.ex.create_party(OWNER, 0, 200, &VenueParams::with_duration(0)),
            Err(PartyError::InvalidState(_))
        ));
        assert_eq!(f.ledger.party_count(), 0);

        let id = listed(&f);
        assert_eq!(f.ex.listing(id).unwrap().expires_at, Some(1_060));
    }

    #[test]
    fn test_default_duration_from_config() {
        let f = fixture(ExchangeConfig {
            default_duration: Some(30),
            ..ExchangeConfig::default()
        });
        let id = f.ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        assert_eq!(f.ex.listing(id).unwrap().expires_at, Some(1_030));
    }

    #[test]
    fn test_buy_and_sell_through_bridge() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        let seller = key(2);
        let buyer = key(3);

        f.ex.post_counter_order(id, counter(&seller, Side::Sell, 150)).unwrap();
        f.ex.buy(id).unwrap();
        assert_eq!(f.ledger.balance(id).unwrap(), 150);
        assert_eq!(f.ex.listing(id).unwrap().held, 150);

        f.ex.post_counter_order(id, counter(&buyer, Side::Buy, 150)).unwrap();
        f.ex.sell(id).unwrap();
        assert_eq!(f.ledger.balance(id).unwrap(), 0);
        assert_eq!(f.ex.listing(id).unwrap().state, ListingState::Sold);

        let plans = f.exec.executed.lock();
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].payer, f.ex.address());
        assert_eq!(plans[0].payee, addr(&seller));
        assert_eq!(plans[1].payer, addr(&buyer));
        assert_eq!(plans[1].payee, f.ex.address());
        assert_eq!(f.vault.balance_of(&f.ex.address()), 10_000);
    }

    #[test]
    fn test_buy_without_counter_order() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        assert!(matches!(f.ex.buy(id), Err(PartyError::InvalidState(_))));
    }

    #[test]
    fn test_overpriced_sell_order_rejected() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 201)).unwrap();
        assert!(matches!(f.ex.buy(id), Err(PartyError::InvalidState(_))));
        assert_eq!(f.ledger.balance(id).unwrap(), 0);
    }

    #[test]
    fn test_expired_listing_cannot_be_bought() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 100)).unwrap();

        f.clock.advance(60);
        assert!(matches!(f.ex.buy(id), Err(PartyError::InvalidState(_))));
        assert!(f.exec.executed.lock().is_empty());
    }

    #[test]
    fn test_failed_match_rolls_back_deposit() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 100)).unwrap();
        let events = f.ledger.events().len();

        *f.exec.fail.lock() = true;
        assert!(matches!(f.ex.buy(id), Err(PartyError::SettlementFailed(_))));
        assert_eq!(f.ledger.balance(id).unwrap(), 0);
        assert_eq!(f.vault.balance_of(&f.ex.address()), 10_000);
        assert_eq!(f.ledger.events().len(), events);
        assert_eq!(f.ex.listing(id).unwrap().state, ListingState::Created);

        // The counter order is still there for a retry
        *f.exec.fail.lock() = false;
        f.ex.buy(id).unwrap();
        assert_eq!(f.ledger.balance(id).unwrap(), 100);
    }

    #[test]
    fn test_foreign_exchange_order_rejected() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        let k = key(2);
        let foreign = Order {
            exchange: Address::repeat(0x01),
            maker: addr(&k),
            side: Side::Sell,
            target: TARGET,
            base_price: 100,
            ..Order::default()
        }
        .sign(&k)
        .unwrap();
        assert!(matches!(
            f.ex.post_counter_order(id, foreign),
            Err(PartyError::SettlementFailed(_))
        ));
    }

    #[test]
    fn test_forged_counter_order_rejected() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        let mut forged = counter(&key(2), Side::Sell, 100);
        forged.order.maker = Address::repeat(0x42);
        assert!(f.ex.post_counter_order(id, forged).is_err());
        assert_eq!(
            f.ex.post_counter_order(99, counter(&key(2), Side::Sell, 100)),
            Err(PartyError::NotFound(99))
        );
    }

    #[test]
    fn test_cancel_listed_refunds_without_match() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 100)).unwrap();
        f.ex.buy(id).unwrap();

        f.ex.cancel(id).unwrap();
        assert_eq!(f.ledger.balance(id).unwrap(), 0);
        assert_eq!(f.exec.executed.lock().len(), 1);
        assert!(matches!(
            f.ledger.events().last().unwrap().event,
            LedgerEvent::Cancelled { refunded: 100, .. }
        ));
    }

    #[test]
    fn test_removed_exchange_cannot_cancel() {
        let f = fixture(ExchangeConfig::default());
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 100)).unwrap();
        f.ex.buy(id).unwrap();
        f.ledger.remove_host(OWNER, f.ex.address()).unwrap();

        let events = f.ledger.events().len();
        let held = f.vault.balance_of(&f.ex.address());
        assert!(matches!(f.ex.cancel(id), Err(PartyError::Unauthorized { .. })));
        assert_eq!(f.ledger.balance(id).unwrap(), 100);
        assert_eq!(f.vault.balance_of(&f.ex.address()), held);
        assert_eq!(f.ledger.events().len(), events);
        assert_eq!(f.ex.listing(id).unwrap().state, ListingState::Listed);
    }

    #[test]
    fn test_rearm_resets_expiry() {
        let f = fixture(ExchangeConfig {
            rearmable: true,
            default_duration: Some(60),
        });
        let id = listed(&f);
        f.ex.post_counter_order(id, counter(&key(2), Side::Sell, 100)).unwrap();
        f.ex.buy(id).unwrap();
        f.ex.post_counter_order(id, counter(&key(3), Side::Buy, 100)).unwrap();
        f.ex.sell(id).unwrap();

        f.clock.advance(500);
        f.ex.rearm(id).unwrap();
        let listing = f.ex.listing(id).unwrap();
        assert_eq!(listing.state, ListingState::Created);
        assert_eq!(listing.expires_at, Some(1_560));

        // Second cycle signs fresh orders, so the bridge sees new hashes
        let mut sell = counter(&key(2), Side::Sell, 100).order;
        sell.salt = [9; 32];
        f.ex.post_counter_order(id, sell.sign(&key(2)).unwrap()).unwrap();
        f.ex.buy(id).unwrap();
    }
}
