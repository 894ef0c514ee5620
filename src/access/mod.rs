//! Host whitelist.
//!
//! A single registry owner, fixed at construction, decides which addresses may
//! create parties and act as exchanges. Membership checks are O(1).
//!
//! Outside the crate the registry is read-only. Changes go through
//! [`Ledger::whitelist_host`](crate::Ledger::whitelist_host) and
//! [`Ledger::remove_host`](crate::Ledger::remove_host), which journal them.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{PartyError, Result};
use crate::types::Address;

#[derive(Debug)]
pub struct AccessRegistry {
    owner: Address,
    whitelisted: RwLock<HashSet<Address>>,
}

impl AccessRegistry {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            whitelisted: RwLock::new(HashSet::new()),
        }
    }

    /// Seed the whitelist at construction time, e.g. from config
    pub fn with_hosts(owner: Address, hosts: impl IntoIterator<Item = Address>) -> Self {
        Self {
            owner,
            whitelisted: RwLock::new(hosts.into_iter().collect()),
        }
    }

    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Add `host` to the whitelist. Owner only.
    ///
    /// Returns `true` if the host was newly added; adding twice is a no-op.
    pub(crate) fn whitelist_host(&self, caller: Address, host: Address) -> Result<bool> {
        self.require_owner(caller, "whitelist hosts")?;
        let added = self.whitelisted.write().insert(host);
        debug!(%host, added, "whitelist add");
        Ok(added)
    }

    /// Remove `host` from the whitelist. Owner only.
    ///
    /// Returns `true` if the host was present.
    pub(crate) fn remove_host(&self, caller: Address, host: Address) -> Result<bool> {
        self.require_owner(caller, "remove hosts")?;
        let removed = self.whitelisted.write().remove(&host);
        debug!(%host, removed, "whitelist remove");
        Ok(removed)
    }

    pub fn is_whitelisted(&self, addr: &Address) -> bool {
        self.whitelisted.read().contains(addr)
    }

    /// Fail with `Unauthorized` unless `caller` is whitelisted
    pub fn require_whitelisted(&self, caller: Address, action: &'static str) -> Result<()> {
        if self.is_whitelisted(&caller) {
            Ok(())
        } else {
            warn!(%caller, action, "rejected: not whitelisted");
            Err(PartyError::unauthorized(caller, action))
        }
    }

    /// Current whitelist, unordered
    pub fn hosts(&self) -> Vec<Address> {
        self.whitelisted.read().iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.whitelisted.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.whitelisted.read().is_empty()
    }

    fn require_owner(&self, caller: Address, action: &'static str) -> Result<()> {
        if caller == self.owner {
            Ok(())
        } else {
            warn!(%caller, action, "rejected: not registry owner");
            Err(PartyError::unauthorized(caller, action))
        }
    }
}
