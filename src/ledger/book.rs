//! The party ledger.
//!
//! ## Architecture
//!
//! - **Slab**: party storage. Parties are never removed, so slab keys are
//!   dense and `party_id == key + 1`.
//! - **Mutex**: every operation holds the table lock for its whole duration,
//!   including the vault transfer and any settlement step. Operations are
//!   therefore serialized and never observe each other's partial effects.
//! - **Journal**: one [`EventRecord`] per successful state change.
//!
//! ## Commit Order
//!
//! Deposits and withdrawals follow the same sequence:
//!
//! 1. Validate (party exists, amount positive, stake/overflow checks)
//! 2. Move value through the [`Vault`]
//! 3. Run the optional settlement step; on failure reverse step 2
//! 4. Commit bookkeeping and journal the events
//!
//! Nothing is written to the party table before step 4, so any failure
//! leaves `balance == sum(stakes)` exactly as it was.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use block_parties::ledger::{InMemoryVault, Ledger};
//! use block_parties::types::Address;
//!
//! let owner = Address::repeat(0xaa);
//! let host = Address::repeat(0x01);
//! let alice = Address::repeat(0x0a);
//!
//! let vault = Arc::new(InMemoryVault::new());
//! vault.fund(alice, 1_000);
//!
//! let ledger = Ledger::new(owner, vault.clone());
//! ledger.whitelist_host(owner, host).unwrap();
//!
//! let id = ledger.create_party(host, owner, 0, 200).unwrap();
//! ledger.deposit(alice, id, 100).unwrap();
//!
//! assert_eq!(ledger.balance(id).unwrap(), 100);
//! assert_eq!(ledger.giga_stake(id, &alice).unwrap(), 1_000_000_000);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;
use tracing::{error, info, warn};

use crate::access::AccessRegistry;
use crate::error::{PartyError, Result};
use crate::ledger::snapshot::{LedgerSnapshot, StateRoot};
use crate::ledger::vault::Vault;
use crate::types::amount::{checked_credit, checked_debit, giga_stake};
use crate::types::{Address, Amount, EventRecord, LedgerEvent, Party, PartyId};

/// Settlement step run inside a deposit or withdrawal, after the value
/// transfer and before commit. It may return one extra event to journal
/// alongside the deposit/withdrawal event.
pub type SettleResult = Result<Option<LedgerEvent>>;

/// Pooled-deposit escrow ledger.
pub struct Ledger {
    registry: AccessRegistry,
    vault: Arc<dyn Vault>,
    state: Mutex<LedgerState>,
}

#[derive(Debug, Default)]
pub(crate) struct LedgerState {
    pub(crate) parties: Slab<Party>,
    pub(crate) journal: Vec<EventRecord>,
    pub(crate) next_seq: u64,
}

impl LedgerState {
    fn get(&self, party_id: PartyId) -> Result<&Party> {
        key_of(party_id)
            .and_then(|key| self.parties.get(key))
            .ok_or(PartyError::NotFound(party_id))
    }

    fn get_mut(&mut self, party_id: PartyId) -> Result<&mut Party> {
        key_of(party_id)
            .and_then(|key| self.parties.get_mut(key))
            .ok_or(PartyError::NotFound(party_id))
    }

    fn record(&mut self, event: LedgerEvent) {
        self.next_seq += 1;
        info!(seq = self.next_seq, event = event.name(), party_id = ?event.party_id(), "ledger event");
        self.journal.push(EventRecord {
            seq: self.next_seq,
            event,
        });
    }
}

/// Slab key for a party id; id 0 is never valid
fn key_of(party_id: PartyId) -> Option<usize> {
    party_id.checked_sub(1).and_then(|k| usize::try_from(k).ok())
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("registry", &self.registry)
            .field("parties", &self.party_count())
            .finish_non_exhaustive()
    }
}

impl Ledger {
    /// Create an empty ledger whose whitelist is administered by `owner`
    pub fn new(owner: Address, vault: Arc<dyn Vault>) -> Self {
        Self::with_registry(AccessRegistry::new(owner), vault)
    }

    /// Create an empty ledger around an existing registry
    pub fn with_registry(registry: AccessRegistry, vault: Arc<dyn Vault>) -> Self {
        Self {
            registry,
            vault,
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub(crate) fn from_parts(registry: AccessRegistry, vault: Arc<dyn Vault>, state: LedgerState) -> Self {
        Self {
            registry,
            vault,
            state: Mutex::new(state),
        }
    }

    // ========================================================================
    // Access Control
    // ========================================================================

    /// Read-only view of the whitelist. Changes go through
    /// [`Ledger::whitelist_host`] and [`Ledger::remove_host`] so they are
    /// journaled.
    ///
    /// ```compile_fail
    /// use std::sync::Arc;
    /// use block_parties::{Address, InMemoryVault, Ledger};
    ///
    /// let owner = Address::repeat(0xaa);
    /// let ledger = Ledger::new(owner, Arc::new(InMemoryVault::new()));
    /// ledger.registry().whitelist_host(owner, Address::repeat(0x01)).unwrap();
    /// ```
    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    /// Whitelist a host. Registry owner only; idempotent.
    pub fn whitelist_host(&self, caller: Address, host: Address) -> Result<()> {
        let mut state = self.state.lock();
        if self.registry.whitelist_host(caller, host)? {
            state.record(LedgerEvent::HostWhitelisted { host });
        }
        Ok(())
    }

    /// Remove a host from the whitelist. Registry owner only; idempotent.
    pub fn remove_host(&self, caller: Address, host: Address) -> Result<()> {
        let mut state = self.state.lock();
        if self.registry.remove_host(caller, host)? {
            state.record(LedgerEvent::HostRemoved { host });
        }
        Ok(())
    }

    pub fn is_whitelisted(&self, addr: &Address) -> bool {
        self.registry.is_whitelisted(addr)
    }

    // ========================================================================
    // Party Management
    // ========================================================================

    /// Create a party. The caller must be whitelisted.
    ///
    /// Returns the new party id. A rejected call does not consume an id.
    pub fn create_party(
        &self,
        caller: Address,
        owner: Address,
        threshold: Amount,
        target: Amount,
    ) -> Result<PartyId> {
        let mut state = self.state.lock();
        self.registry.require_whitelisted(caller, "create a party")?;

        let entry = state.parties.vacant_entry();
        let party_id = entry.key() as PartyId + 1;
        entry.insert(Party::new(party_id, caller, owner, threshold, target));

        state.record(LedgerEvent::Created {
            party_id,
            creator: caller,
            owner,
        });
        Ok(party_id)
    }

    /// Number of parties ever created
    pub fn party_count(&self) -> usize {
        self.state.lock().parties.len()
    }

    /// Snapshot of a single party
    pub fn party(&self, party_id: PartyId) -> Result<Party> {
        self.state.lock().get(party_id).cloned()
    }

    // ========================================================================
    // Deposits and Withdrawals
    // ========================================================================

    /// Deposit `amount` into a party, attributed to `caller`
    pub fn deposit(&self, caller: Address, party_id: PartyId, amount: Amount) -> Result<()> {
        self.deposit_settled(caller, party_id, amount, |_| Ok(None))
    }

    /// Withdraw `amount` of `caller`'s stake from a party
    pub fn withdraw(&self, caller: Address, party_id: PartyId, amount: Amount) -> Result<()> {
        self.withdraw_settled(caller, party_id, amount, |_| Ok(None))
    }

    /// Deposit with a settlement step that must succeed for the deposit to
    /// commit. `settle` sees the party as it was before the deposit.
    pub fn deposit_settled<F>(&self, caller: Address, party_id: PartyId, amount: Amount, settle: F) -> Result<()>
    where
        F: FnOnce(&Party) -> SettleResult,
    {
        let mut state = self.state.lock();

        let party = state.get(party_id)?;
        if amount == 0 {
            return Err(PartyError::InvalidAmount(amount));
        }
        let new_balance = checked_credit(party.balance(), amount).ok_or(PartyError::Overflow(party_id))?;

        self.vault.pull(caller, amount)?;

        let extra = match settle(party) {
            Ok(extra) => extra,
            Err(e) => {
                warn!(party_id, %caller, amount, error = %e, "deposit settlement failed");
                if let Err(undo) = self.vault.push(caller, amount) {
                    error!(party_id, %caller, amount, error = %undo, "failed to reverse deposit transfer");
                }
                return Err(e);
            }
        };

        state.get_mut(party_id)?.credit(caller, amount, new_balance);
        state.record(LedgerEvent::Deposited {
            party_id,
            depositor: caller,
            amount,
        });
        if let Some(event) = extra {
            state.record(event);
        }
        Ok(())
    }

    /// Withdrawal with a settlement step that must succeed for the
    /// withdrawal to commit. `settle` sees the party as it was before.
    pub fn withdraw_settled<F>(&self, caller: Address, party_id: PartyId, amount: Amount, settle: F) -> Result<()>
    where
        F: FnOnce(&Party) -> SettleResult,
    {
        let mut state = self.state.lock();

        let party = state.get(party_id)?;
        if amount == 0 {
            return Err(PartyError::InvalidAmount(amount));
        }
        let stake = party.stake(&caller);
        if checked_debit(stake, amount).is_none() {
            warn!(party_id, %caller, amount, stake, "rejected over-withdrawal");
            return Err(PartyError::InsufficientStake {
                requested: amount,
                stake,
            });
        }

        self.vault.push(caller, amount)?;

        let extra = match settle(party) {
            Ok(extra) => extra,
            Err(e) => {
                warn!(party_id, %caller, amount, error = %e, "withdrawal settlement failed");
                if let Err(undo) = self.vault.pull(caller, amount) {
                    error!(party_id, %caller, amount, error = %undo, "failed to reverse withdrawal transfer");
                }
                return Err(e);
            }
        };

        state
            .get_mut(party_id)?
            .debit(&caller, amount)
            .ok_or(PartyError::InsufficientStake {
                requested: amount,
                stake,
            })?;
        state.record(LedgerEvent::Withdrawn {
            party_id,
            depositor: caller,
            amount,
        });
        if let Some(event) = extra {
            state.record(event);
        }
        Ok(())
    }

    /// Journal an event that involves no value movement
    pub(crate) fn record_event(&self, event: LedgerEvent) {
        self.state.lock().record(event);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Total escrowed value of a party
    pub fn balance(&self, party_id: PartyId) -> Result<Amount> {
        Ok(self.state.lock().get(party_id)?.balance())
    }

    /// Raw stake of a depositor
    pub fn stake(&self, party_id: PartyId, depositor: &Address) -> Result<Amount> {
        Ok(self.state.lock().get(party_id)?.stake(depositor))
    }

    /// `floor(stake * 10^9 / balance)`, or 0 for an empty party
    pub fn giga_stake(&self, party_id: PartyId, depositor: &Address) -> Result<u64> {
        let state = self.state.lock();
        let party = state.get(party_id)?;
        Ok(giga_stake(party.stake(depositor), party.balance()))
    }

    /// Full event journal
    pub fn events(&self) -> Vec<EventRecord> {
        self.state.lock().journal.clone()
    }

    /// Events with a sequence number greater than `seq`
    pub fn events_since(&self, seq: u64) -> Vec<EventRecord> {
        let state = self.state.lock();
        let start = state.journal.partition_point(|r| r.seq <= seq);
        state.journal[start..].to_vec()
    }

    /// Verify `balance == sum(stakes)` for every party
    pub fn check_invariants(&self) -> Result<()> {
        let state = self.state.lock();
        for (_, party) in state.parties.iter() {
            if !party.is_consistent() {
                return Err(PartyError::CorruptSnapshot(format!(
                    "party {} balance does not match its stakes",
                    party.id()
                )));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Hash of the complete party table
    pub fn state_root(&self) -> Result<StateRoot> {
        let state = self.state.lock();
        StateRoot::compute(state.parties.iter().map(|(_, p)| p))
    }

    /// Serializable copy of the ledger
    pub fn snapshot(&self) -> LedgerSnapshot {
        let state = self.state.lock();
        LedgerSnapshot::capture(&self.registry, &state)
    }

    /// Rebuild a ledger from a snapshot, re-checking every invariant
    pub fn restore(snapshot: LedgerSnapshot, vault: Arc<dyn Vault>) -> Result<Self> {
        let (registry, state) = snapshot.into_parts()?;
        Ok(Self::from_parts(registry, vault, state))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
