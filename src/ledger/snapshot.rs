//! State roots and snapshots.
//!
//! The state root is a SHA-256 hash over the SSZ encoding of every party
//! header and every stake entry, in canonical order (parties by id, stakes by
//! depositor address). Two ledgers with the same parties and stakes always
//! produce the same root, regardless of insertion order.
//!
//! Snapshots are plain serde data. Restoring one re-checks
//! `balance == sum(stakes)` for every party, so an inconsistent store is
//! rejected rather than loaded.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use slab::Slab;

use crate::access::AccessRegistry;
use crate::error::{PartyError, Result};
use crate::ledger::book::LedgerState;
use crate::types::{Address, Amount, Party, MAX_BALANCE};

use self::records::{PartyHeader, StakeEntry};

/// 32-byte hash of the party table
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateRoot(pub [u8; 32]);

impl StateRoot {
    /// Hash a sequence of parties, which must be in id order
    pub fn compute<'a>(parties: impl Iterator<Item = &'a Party>) -> Result<Self> {
        let mut hasher = Sha256::new();

        for party in parties {
            let header = PartyHeader::from(party);
            hasher.update(encode(&header)?);

            let mut stakes: Vec<(&Address, &Amount)> = party.stakes().collect();
            stakes.sort_by_key(|(addr, _)| **addr);
            for (depositor, amount) in stakes {
                let entry = StakeEntry {
                    party_id: party.id(),
                    depositor: depositor.0,
                    amount_hi: (*amount >> 64) as u64,
                    amount_lo: *amount as u64,
                };
                hasher.update(encode(&entry)?);
            }
        }

        let mut root = [0u8; 32];
        root.copy_from_slice(&hasher.finalize());
        Ok(Self(root))
    }

    /// Get the state root as a hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for StateRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StateRoot({})", self)
    }
}

fn encode<T: ssz_rs::SimpleSerialize>(value: &T) -> Result<Vec<u8>> {
    ssz_rs::serialize(value).map_err(|e| PartyError::CorruptSnapshot(format!("ssz encoding failed: {e:?}")))
}

// ============================================================================
// SSZ Records
// ============================================================================

mod records {
    use ssz_rs::prelude::*;

    use crate::types::Party;

    /// Fixed-size party header. u128 values are split into hi/lo words.
    #[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
    pub(super) struct PartyHeader {
        party_id: u64,
        creator: [u8; 20],
        owner: [u8; 20],
        threshold_hi: u64,
        threshold_lo: u64,
        target_hi: u64,
        target_lo: u64,
        balance_hi: u64,
        balance_lo: u64,
    }

    impl From<&Party> for PartyHeader {
        fn from(p: &Party) -> Self {
            Self {
                party_id: p.id(),
                creator: p.creator().0,
                owner: p.owner().0,
                threshold_hi: (p.threshold() >> 64) as u64,
                threshold_lo: p.threshold() as u64,
                target_hi: (p.target() >> 64) as u64,
                target_lo: p.target() as u64,
                balance_hi: (p.balance() >> 64) as u64,
                balance_lo: p.balance() as u64,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Default, SimpleSerialize)]
    pub(super) struct StakeEntry {
        pub(super) party_id: u64,
        pub(super) depositor: [u8; 20],
        pub(super) amount_hi: u64,
        pub(super) amount_lo: u64,
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Serializable copy of a ledger: whitelist plus party table.
///
/// The event journal is not part of a snapshot; only the sequence counter is
/// carried so that restored ledgers keep numbering events monotonically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub registry_owner: Address,
    pub whitelisted: Vec<Address>,
    pub parties: Vec<Party>,
    pub last_event_seq: u64,
}

impl LedgerSnapshot {
    pub(crate) fn capture(registry: &AccessRegistry, state: &LedgerState) -> Self {
        let mut whitelisted: Vec<Address> = registry.hosts();
        whitelisted.sort();

        Self {
            registry_owner: registry.owner(),
            whitelisted,
            parties: state.parties.iter().map(|(_, p)| p.clone()).collect(),
            last_event_seq: state.next_seq,
        }
    }

    /// Validate and split into the pieces a ledger is built from
    pub(crate) fn into_parts(self) -> Result<(AccessRegistry, LedgerState)> {
        let mut parties = Slab::with_capacity(self.parties.len());

        for (index, party) in self.parties.into_iter().enumerate() {
            let expected = index as u64 + 1;
            if party.id() != expected {
                return Err(PartyError::CorruptSnapshot(format!(
                    "party ids must be dense: expected {expected}, found {}",
                    party.id()
                )));
            }
            if party.balance() > MAX_BALANCE {
                return Err(PartyError::CorruptSnapshot(format!(
                    "party {} balance {} exceeds the cap of {MAX_BALANCE}",
                    party.id(),
                    party.balance()
                )));
            }
            if !party.is_consistent() {
                return Err(PartyError::CorruptSnapshot(format!(
                    "party {} balance does not match its stakes",
                    party.id()
                )));
            }
            parties.insert(party);
        }

        let registry = AccessRegistry::with_hosts(self.registry_owner, self.whitelisted);
        let state = LedgerState {
            parties,
            journal: Vec::new(),
            next_seq: self.last_event_seq,
        };
        Ok((registry, state))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
