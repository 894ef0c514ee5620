//! Party: a pooled escrow with many depositors and one administrative owner.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::address::Address;
use crate::types::amount::{checked_debit, giga_stake, Amount};

/// Party identifier. Assigned sequentially starting at 1; 0 is never valid.
pub type PartyId = u64;

/// A pooled escrow.
///
/// ## Invariant
///
/// `balance == stakes.values().sum()` at all times. The fields are private so
/// only the ledger can move value in or out, and it always moves both sides
/// together through [`Party::credit`] and [`Party::debit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    /// Whitelisted host that created the party
    creator: Address,
    /// Administrative owner. Holds no withdrawal rights.
    owner: Address,
    threshold: Amount,
    target: Amount,
    balance: Amount,
    stakes: HashMap<Address, Amount>,
}

impl Party {
    /// Create an empty party
    pub fn new(id: PartyId, creator: Address, owner: Address, threshold: Amount, target: Amount) -> Self {
        Self {
            id,
            creator,
            owner,
            threshold,
            target,
            balance: 0,
            stakes: HashMap::new(),
        }
    }

    pub fn id(&self) -> PartyId {
        self.id
    }

    pub fn creator(&self) -> Address {
        self.creator
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn threshold(&self) -> Amount {
        self.threshold
    }

    pub fn target(&self) -> Amount {
        self.target
    }

    /// Total escrowed value
    pub fn balance(&self) -> Amount {
        self.balance
    }

    /// Raw stake of a depositor (0 if they never deposited)
    pub fn stake(&self, depositor: &Address) -> Amount {
        self.stakes.get(depositor).copied().unwrap_or(0)
    }

    /// Proportional share of a depositor, scaled by 10^9
    pub fn giga_stake(&self, depositor: &Address) -> u64 {
        giga_stake(self.stake(depositor), self.balance)
    }

    /// Iterate over all non-zero stakes
    pub fn stakes(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.stakes.iter()
    }

    /// Number of depositors with a non-zero stake
    pub fn depositor_count(&self) -> usize {
        self.stakes.len()
    }

    /// Check `balance == sum(stakes)`
    pub fn is_consistent(&self) -> bool {
        let mut total: Amount = 0;
        for amount in self.stakes.values() {
            match total.checked_add(*amount) {
                Some(t) => total = t,
                None => return false,
            }
        }
        total == self.balance
    }

    /// Credit both the balance and the depositor's stake.
    ///
    /// Callers must have validated `new_balance` with
    /// [`checked_credit`](crate::types::amount::checked_credit) first.
    pub(crate) fn credit(&mut self, depositor: Address, amount: Amount, new_balance: Amount) {
        *self.stakes.entry(depositor).or_insert(0) += amount;
        self.balance = new_balance;
    }

    /// Debit both the balance and the depositor's stake, returning the new
    /// balance.
    ///
    /// Returns `None` and leaves the party untouched if the depositor's stake
    /// does not cover `amount`. Fully withdrawn depositors are dropped from
    /// the map.
    pub(crate) fn debit(&mut self, depositor: &Address, amount: Amount) -> Option<Amount> {
        let remaining = checked_debit(self.stake(depositor), amount)?;
        let new_balance = checked_debit(self.balance, amount)?;

        if remaining == 0 {
            self.stakes.remove(depositor);
        } else {
            self.stakes.insert(*depositor, remaining);
        }
        self.balance = new_balance;
        Some(new_balance)
    }
}
