//! Stake-accounting ledger.
//!
//! ## Components
//!
//! - [`Ledger`]: party table, deposits, withdrawals, giga-stakes, journal
//! - [`Vault`]: value-transfer primitive the ledger moves funds through
//! - [`LedgerSnapshot`] / [`StateRoot`]: persistence and verification
//!
//! ## Invariant
//!
//! For every party, `balance == sum(stakes)` in every reachable state,
//! including after any failed operation and after restoring a snapshot.
//!
//! ## Complexity
//!
//! | Operation       | Complexity |
//! |-----------------|------------|
//! | Create party    | O(1)       |
//! | Deposit         | O(1)       |
//! | Withdraw        | O(1)       |
//! | Giga-stake      | O(1)       |
//! | State root      | O(n log n) |

pub mod book;
pub mod snapshot;
pub mod vault;

pub use book::{Ledger, SettleResult};
pub use snapshot::{LedgerSnapshot, StateRoot};
pub use vault::{InMemoryVault, Vault};
