//! Value-transfer primitive.
//!
//! The ledger never holds value itself; it asks a [`Vault`] to move funds
//! between a caller's account and escrow. Each transfer either completes or
//! fails with no effect, and the ledger only commits bookkeeping after the
//! transfer succeeded.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{PartyError, Result};
use crate::types::{Address, Amount};

/// Moves value in and out of escrow.
pub trait Vault: Send + Sync {
    /// Move `amount` from `from`'s account into escrow
    fn pull(&self, from: Address, amount: Amount) -> Result<()>;

    /// Move `amount` out of escrow into `to`'s account
    fn push(&self, to: Address, amount: Amount) -> Result<()>;
}

/// In-process vault keeping plain account balances.
///
/// Accounts can be frozen to simulate a failing transfer.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    inner: Mutex<VaultState>,
}

#[derive(Debug, Default)]
struct VaultState {
    accounts: HashMap<Address, Amount>,
    escrow: Amount,
    frozen: HashSet<Address>,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit an external account (funding a wallet)
    pub fn fund(&self, account: Address, amount: Amount) {
        let mut state = self.inner.lock();
        let entry = state.accounts.entry(account).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// External balance of an account
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.inner.lock().accounts.get(account).copied().unwrap_or(0)
    }

    /// Total value currently held in escrow
    pub fn escrow(&self) -> Amount {
        self.inner.lock().escrow
    }

    /// Make every transfer touching `account` fail until unfrozen
    pub fn freeze(&self, account: Address) {
        self.inner.lock().frozen.insert(account);
    }

    pub fn unfreeze(&self, account: &Address) {
        self.inner.lock().frozen.remove(account);
    }
}

impl Vault for InMemoryVault {
    fn pull(&self, from: Address, amount: Amount) -> Result<()> {
        let mut state = self.inner.lock();
        if state.frozen.contains(&from) {
            return Err(PartyError::TransferFailed(format!("account {from} is frozen")));
        }

        let available = state.accounts.get(&from).copied().unwrap_or(0);
        let remaining = available.checked_sub(amount).ok_or_else(|| {
            PartyError::TransferFailed(format!(
                "account {from} holds {available}, needs {amount}"
            ))
        })?;
        let escrow = state
            .escrow
            .checked_add(amount)
            .ok_or_else(|| PartyError::TransferFailed("escrow overflow".into()))?;

        state.accounts.insert(from, remaining);
        state.escrow = escrow;
        debug!(%from, amount, "vault pull");
        Ok(())
    }

    fn push(&self, to: Address, amount: Amount) -> Result<()> {
        let mut state = self.inner.lock();
        if state.frozen.contains(&to) {
            return Err(PartyError::TransferFailed(format!("account {to} is frozen")));
        }

        let escrow = state.escrow.checked_sub(amount).ok_or_else(|| {
            PartyError::TransferFailed(format!(
                "escrow holds {}, needs {amount}",
                state.escrow
            ))
        })?;
        let current = state.accounts.get(&to).copied().unwrap_or(0);
        let credited = current
            .checked_add(amount)
            .ok_or_else(|| PartyError::TransferFailed(format!("account {to} overflow")))?;

        state.escrow = escrow;
        state.accounts.insert(to, credited);
        debug!(%to, amount, "vault push");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address::repeat(0x0a);

    #[test]
    fn test_pull_and_push() {
        let vault = InMemoryVault::new();
        vault.fund(ALICE, 500);

        vault.pull(ALICE, 200).unwrap();
        assert_eq!(vault.balance_of(&ALICE), 300);
        assert_eq!(vault.escrow(), 200);

        vault.push(ALICE, 50).unwrap();
        assert_eq!(vault.balance_of(&ALICE), 350);
        assert_eq!(vault.escrow(), 150);
    }

    #[test]
    fn test_pull_more_than_available_fails_cleanly() {
        let vault = InMemoryVault::new();
        vault.fund(ALICE, 10);

        assert!(matches!(vault.pull(ALICE, 11), Err(PartyError::TransferFailed(_))));
        assert_eq!(vault.balance_of(&ALICE), 10);
        assert_eq!(vault.escrow(), 0);
    }

    #[test]
    fn test_push_more_than_escrow_fails() {
        let vault = InMemoryVault::new();
        assert!(vault.push(ALICE, 1).is_err());
        assert_eq!(vault.balance_of(&ALICE), 0);
    }

    #[test]
    fn test_frozen_account() {
        let vault = InMemoryVault::new();
        vault.fund(ALICE, 100);
        vault.freeze(ALICE);
        assert!(vault.pull(ALICE, 1).is_err());

        vault.unfreeze(&ALICE);
        assert!(vault.pull(ALICE, 1).is_ok());
    }
}
