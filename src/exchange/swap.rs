//! Simple-swap exchange.
//!
//! The listing price is the party's `target`. Buying deposits that amount
//! into the party under the exchange's own address; selling withdraws it
//! again. No external settlement is involved, so a buy followed by a sell
//! leaves the party balance where it started.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::config::ExchangeConfig;
use crate::error::{PartyError, Result};
use crate::exchange::{listing_mut, Exchange, Listing, ListingState, ListingTable, VenueParams};
use crate::ledger::Ledger;
use crate::types::{Address, Amount, LedgerEvent, PartyId};

pub struct SwapExchange {
    address: Address,
    ledger: Arc<Ledger>,
    config: ExchangeConfig,
    listings: Mutex<ListingTable>,
}

impl SwapExchange {
    pub fn new(address: Address, ledger: Arc<Ledger>, config: ExchangeConfig) -> Self {
        Self {
            address,
            ledger,
            config,
            listings: Mutex::new(ListingTable::new()),
        }
    }

    /// Start another buy/sell cycle on a sold listing
    pub fn rearm(&self, party_id: PartyId) -> Result<()> {
        if !self.config.rearmable {
            return Err(PartyError::InvalidState(format!(
                "exchange {} does not re-arm listings",
                self.address
            )));
        }
        let mut listings = self.listings.lock();
        listing_mut(&mut listings, party_id)?.rearm()?;
        info!(party_id, exchange = %self.address, "listing re-armed");
        Ok(())
    }

    fn require_whitelisted(&self, action: &'static str) -> Result<()> {
        self.ledger.registry().require_whitelisted(self.address, action)
    }
}

impl Exchange for SwapExchange {
    fn address(&self) -> Address {
        self.address
    }

    fn create_party(&self, owner: Address, threshold: Amount, target: Amount, _venue: &VenueParams) -> Result<PartyId> {
        if target == 0 {
            return Err(PartyError::InvalidAmount(target));
        }

        let mut listings = self.listings.lock();
        let party_id = self.ledger.create_party(self.address, owner, threshold, target)?;
        listings.insert(party_id, Listing::new(party_id, target, None));

        info!(party_id, exchange = %self.address, price = target, "party listed");
        Ok(party_id)
    }

    fn buy(&self, party_id: PartyId) -> Result<()> {
        let mut listings = self.listings.lock();
        let listing = listing_mut(&mut listings, party_id)?;
        self.require_whitelisted("buy")?;
        listing.require_state(ListingState::Created, "buy")?;

        let (exchange, amount) = (self.address, listing.price);
        self.ledger.deposit_settled(exchange, party_id, amount, |_| {
            Ok(Some(LedgerEvent::Bought {
                party_id,
                exchange,
                amount,
            }))
        })?;

        listing.mark_bought(amount);
        Ok(())
    }

    fn sell(&self, party_id: PartyId) -> Result<()> {
        let mut listings = self.listings.lock();
        let listing = listing_mut(&mut listings, party_id)?;
        self.require_whitelisted("sell")?;
        listing.require_state(ListingState::Listed, "sell")?;

        let (exchange, amount) = (self.address, listing.held);
        self.ledger.withdraw_settled(exchange, party_id, amount, |_| {
            Ok(Some(LedgerEvent::Sold {
                party_id,
                exchange,
                amount,
            }))
        })?;

        listing.mark_sold();
        Ok(())
    }

    fn cancel(&self, party_id: PartyId) -> Result<()> {
        let mut listings = self.listings.lock();
        let listing = listing_mut(&mut listings, party_id)?;
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
        Ok(())
    }

    fn listing(&self, party_id: PartyId) -> Result<Listing> {
        self.listings
            .lock()
            .get(&party_id)
            .cloned()
            .ok_or(PartyError::NotFound(party_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryVault;

    const OWNER: Address = Address::repeat(0xaa);
    const EX: Address = Address::repeat(0xe1);
    const D1: Address = Address::repeat(0x11);

    fn setup(config: ExchangeConfig) -> (Arc<Ledger>, SwapExchange, Arc<InMemoryVault>) {
        let vault = Arc::new(InMemoryVault::new());
        vault.fund(EX, 10_000);
        vault.fund(D1, 10_000);
        let ledger = Arc::new(Ledger::new(OWNER, vault.clone()));
        ledger.whitelist_host(OWNER, EX).unwrap();
        let ex = SwapExchange::new(EX, ledger.clone(), config);
        (ledger, ex, vault)
    }

    #[test]
    fn test_create_party_requires_whitelist() {
        let vault = Arc::new(InMemoryVault::new());
        let ledger = Arc::new(Ledger::new(OWNER, vault));
        let ex = SwapExchange::new(EX, ledger.clone(), ExchangeConfig::default());

        let err = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap_err();
        assert!(matches!(err, PartyError::Unauthorized { .. }));
        assert_eq!(ledger.party_count(), 0);
        assert!(ex.listing(1).is_err());
    }

    #[test]
    fn test_zero_price_rejected() {
        let (ledger, ex, _) = setup(ExchangeConfig::default());
        assert_eq!(
            ex.create_party(OWNER, 0, 0, &VenueParams::default()),
            Err(PartyError::InvalidAmount(0))
        );
        assert_eq!(ledger.party_count(), 0);
    }

    #[test]
    fn test_buy_then_sell_restores_balance() {
        let (ledger, ex, vault) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        ledger.deposit(D1, id, 100).unwrap();

        ex.buy(id).unwrap();
        assert_eq!(ledger.balance(id).unwrap(), 300);
        assert_eq!(ledger.stake(id, &EX).unwrap(), 200);
        assert_eq!(ex.listing(id).unwrap().state, ListingState::Listed);

        ex.sell(id).unwrap();
        assert_eq!(ledger.balance(id).unwrap(), 100);
        assert_eq!(ledger.stake(id, &EX).unwrap(), 0);
        assert_eq!(vault.balance_of(&EX), 10_000);
        assert_eq!(ex.listing(id).unwrap().state, ListingState::Sold);
    }

    #[test]
    fn test_out_of_sequence() {
        let (ledger, ex, _) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();

        assert!(matches!(ex.sell(id), Err(PartyError::InvalidState(_))));
        ex.buy(id).unwrap();
        assert!(matches!(ex.buy(id), Err(PartyError::InvalidState(_))));
        ex.sell(id).unwrap();
        assert!(matches!(ex.sell(id), Err(PartyError::InvalidState(_))));
        assert_eq!(ledger.balance(id).unwrap(), 0);
    }

    #[test]
    fn test_unknown_party() {
        let (_, ex, _) = setup(ExchangeConfig::default());
        assert_eq!(ex.buy(7), Err(PartyError::NotFound(7)));
        assert_eq!(ex.sell(7), Err(PartyError::NotFound(7)));
    }

    #[test]
    fn test_removed_exchange_cannot_trade() {
        let (ledger, ex, _) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        ledger.remove_host(OWNER, EX).unwrap();

        let events = ledger.events().len();
        assert!(matches!(ex.buy(id), Err(PartyError::Unauthorized { .. })));
        assert_eq!(ledger.balance(id).unwrap(), 0);
        assert_eq!(ledger.events().len(), events);
        assert_eq!(ex.listing(id).unwrap().state, ListingState::Created);
    }

    #[test]
    fn test_removed_exchange_cannot_cancel() {
        let (ledger, ex, vault) = setup(ExchangeConfig::default());
        let created = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        let bought = ex.create_party(OWNER, 0, 300, &VenueParams::default()).unwrap();
        ex.buy(bought).unwrap();
        ledger.remove_host(OWNER, EX).unwrap();

        let events = ledger.events().len();
        for id in [created, bought] {
            assert!(matches!(ex.cancel(id), Err(PartyError::Unauthorized { .. })));
        }
        assert_eq!(ledger.events().len(), events);
        assert_eq!(ledger.balance(bought).unwrap(), 300);
        assert_eq!(vault.balance_of(&EX), 9_700);
        assert_eq!(ex.listing(created).unwrap().state, ListingState::Created);
        assert_eq!(ex.listing(bought).unwrap().state, ListingState::Listed);
    }

    #[test]
    fn test_underfunded_buy_changes_nothing() {
        let (ledger, ex, _) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 20_000, &VenueParams::default()).unwrap();

        assert!(matches!(ex.buy(id), Err(PartyError::TransferFailed(_))));
        assert_eq!(ledger.balance(id).unwrap(), 0);
        assert_eq!(ex.listing(id).unwrap().state, ListingState::Created);
    }

    #[test]
    fn test_cancel_listed_refunds_claim() {
        let (ledger, ex, vault) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        ex.buy(id).unwrap();

        ex.cancel(id).unwrap();
        assert_eq!(ledger.balance(id).unwrap(), 0);
        assert_eq!(vault.balance_of(&EX), 10_000);
        assert_eq!(ex.listing(id).unwrap().state, ListingState::Cancelled);
        assert!(matches!(ex.cancel(id), Err(PartyError::InvalidState(_))));
        assert!(matches!(ex.buy(id), Err(PartyError::InvalidState(_))));
    }

    #[test]
    fn test_rearm() {
        let (_, ex, _) = setup(ExchangeConfig {
            rearmable: true,
            ..ExchangeConfig::default()
        });
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        ex.buy(id).unwrap();
        ex.sell(id).unwrap();

        ex.rearm(id).unwrap();
        ex.buy(id).unwrap();
        ex.sell(id).unwrap();
        assert_eq!(ex.listing(id).unwrap().cycles, 2);
    }

    #[test]
    fn test_rearm_disabled() {
        let (_, ex, _) = setup(ExchangeConfig::default());
        let id = ex.create_party(OWNER, 0, 200, &VenueParams::default()).unwrap();
        ex.buy(id).unwrap();
        ex.sell(id).unwrap();
        assert!(matches!(ex.rearm(id), Err(PartyError::InvalidState(_))));
    }
}
