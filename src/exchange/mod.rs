//! Exchange adapters.
//!
//! An exchange is a whitelisted venue that creates parties and trades claims
//! on their escrow. Each party created through an exchange gets exactly one
//! [`Listing`] at that exchange, which moves through
//!
//! ```text
//! Created ──buy──▶ Listed ──sell──▶ Sold
//!    │                │               │
//!    └────cancel──────┴──▶ Cancelled  └──rearm──▶ Created   (re-armable venues only)
//! ```
//!
//! - **buy**: the exchange acquires a claim by depositing the listing price
//!   into the party under its own address
//! - **sell**: the exchange releases that claim through the withdraw path
//! - **cancel**: terminal; a held claim is withdrawn first
//!
//! A failed buy/sell/cancel leaves both the listing and the ledger
//! unchanged.
//!
//! ## Variants
//!
//! - [`SwapExchange`]: value moves directly through the ledger
//! - [`BridgedExchange`]: each leg is settled by an
//!   [`OrderMatchingBridge`](crate::bridge::OrderMatchingBridge) inside the
//!   ledger's settlement step

pub mod bridged;
pub mod swap;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{PartyError, Result};
use crate::types::{Address, Amount, PartyId};

pub use bridged::BridgedExchange;
pub use swap::SwapExchange;

// ============================================================================
// Capability
// ============================================================================

/// Venue-specific parameters accepted at party creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VenueParams {
    /// Listing lifetime in seconds
    pub duration: Option<u64>,
}

impl VenueParams {
    pub fn with_duration(duration: u64) -> Self {
        Self { duration: Some(duration) }
    }
}

/// What every exchange variant provides.
///
/// The ledger and access control never depend on a concrete variant.
pub trait Exchange: Send + Sync {
    /// Identity the exchange acts under; must be whitelisted on the ledger
    fn address(&self) -> Address;

    /// Create a party on the ledger and list it at this venue
    fn create_party(&self, owner: Address, threshold: Amount, target: Amount, venue: &VenueParams) -> Result<PartyId>;

    /// Acquire a claim on the party's escrow
    fn buy(&self, party_id: PartyId) -> Result<()>;

    /// Release the claim acquired by [`Exchange::buy`]
    fn sell(&self, party_id: PartyId) -> Result<()>;

    /// Cancel the listing, returning any held claim
    fn cancel(&self, party_id: PartyId) -> Result<()>;

    /// Current listing for a party created at this venue
    fn listing(&self, party_id: PartyId) -> Result<Listing>;
}

// ============================================================================
// Listings
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingState {
    Created,
    Listed,
    Sold,
    Cancelled,
}

impl ListingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ListingState::Sold | ListingState::Cancelled)
    }
}

/// Binding of one party to one exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub party_id: PartyId,
    pub state: ListingState,
    /// Amount deposited on buy
    pub price: Amount,
    /// Claim currently held by the exchange
    pub held: Amount,
    /// Unix seconds after which the listing can no longer be bought
    pub expires_at: Option<u64>,
    /// Completed buy/sell cycles
    pub cycles: u32,
}

impl Listing {
    pub fn new(party_id: PartyId, price: Amount, expires_at: Option<u64>) -> Self {
        Self {
            party_id,
            state: ListingState::Created,
            price,
            held: 0,
            expires_at,
            cycles: 0,
        }
    }

    /// Fail with `InvalidState` unless the listing is in `expected`
    pub fn require_state(&self, expected: ListingState, op: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PartyError::InvalidState(format!(
                "cannot {op} party {}: listing is {:?}, expected {:?}",
                self.party_id, self.state, expected
            )))
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }

    pub(crate) fn mark_bought(&mut self, amount: Amount) {
        self.state = ListingState::Listed;
        self.held = amount;
    }

    pub(crate) fn mark_sold(&mut self) {
        self.state = ListingState::Sold;
        self.held = 0;
        self.cycles += 1;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.state = ListingState::Cancelled;
        self.held = 0;
    }

    /// `Sold -> Created` for another cycle
    pub(crate) fn rearm(&mut self) -> Result<()> {
        self.require_state(ListingState::Sold, "rearm")?;
        self.state = ListingState::Created;
        Ok(())
    }
}

/// Listings of one exchange, keyed by party
pub(crate) type ListingTable = HashMap<PartyId, Listing>;

pub(crate) fn listing_mut(table: &mut ListingTable, party_id: PartyId) -> Result<&mut Listing> {
    table.get_mut(&party_id).ok_or(PartyError::NotFound(party_id))
}

// ============================================================================
// Clock
// ============================================================================

/// Source of the current time in unix seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn new(now: u64) -> Self {
        Self(AtomicU64::new(now))
    }

    pub fn set(&self, now: u64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
