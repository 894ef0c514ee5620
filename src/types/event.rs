//! Ledger events consumed by external indexers.
//!
//! Exactly one event is recorded per successful state-changing call and none
//! for a failed call. The wire format is up to the consumer; events here are
//! plain data with serde derives.

use serde::{Deserialize, Serialize};

use crate::types::address::Address;
use crate::types::amount::Amount;
use crate::types::party::PartyId;

/// Something that happened to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A party was created by a whitelisted host
    Created {
        party_id: PartyId,
        creator: Address,
        owner: Address,
    },
    Deposited {
        party_id: PartyId,
        depositor: Address,
        amount: Amount,
    },
    Withdrawn {
        party_id: PartyId,
        depositor: Address,
        amount: Amount,
    },
    HostWhitelisted {
        host: Address,
    },
    HostRemoved {
        host: Address,
    },
    /// An exchange acquired a claim on the party
    Bought {
        party_id: PartyId,
        exchange: Address,
        amount: Amount,
    },
    /// An exchange released its claim on the party
    Sold {
        party_id: PartyId,
        exchange: Address,
        amount: Amount,
    },
    /// A listing was cancelled; `refunded` is the claim returned, if any
    Cancelled {
        party_id: PartyId,
        exchange: Address,
        refunded: Amount,
    },
}

impl LedgerEvent {
    /// Party this event concerns, if any
    pub fn party_id(&self) -> Option<PartyId> {
        match self {
            LedgerEvent::Created { party_id, .. }
            | LedgerEvent::Deposited { party_id, .. }
            | LedgerEvent::Withdrawn { party_id, .. }
            | LedgerEvent::Bought { party_id, .. }
            | LedgerEvent::Sold { party_id, .. }
            | LedgerEvent::Cancelled { party_id, .. } => Some(*party_id),
            LedgerEvent::HostWhitelisted { .. } | LedgerEvent::HostRemoved { .. } => None,
        }
    }

    /// Short name, used as a log field
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Created { .. } => "created",
            LedgerEvent::Deposited { .. } => "deposited",
            LedgerEvent::Withdrawn { .. } => "withdrawn",
            LedgerEvent::HostWhitelisted { .. } => "host_whitelisted",
            LedgerEvent::HostRemoved { .. } => "host_removed",
            LedgerEvent::Bought { .. } => "bought",
            LedgerEvent::Sold { .. } => "sold",
            LedgerEvent::Cancelled { .. } => "cancelled",
        }
    }
}

/// A journaled event with its sequence number (starting at 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: u64,
    pub event: LedgerEvent,
}
