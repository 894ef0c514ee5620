//! # Block Parties
//!
//! Pooled-deposit escrow ledger with whitelisted hosts and exchange venues.
//!
//! ## Architecture
//!
//! - **Types**: Core data structures (Address, Party, LedgerEvent)
//! - **Access**: Owner-administered host whitelist
//! - **Ledger**: Parties, deposits, withdrawals and giga-stake accounting
//! - **Exchange**: Venues that create parties and trade claims on them
//! - **Bridge**: Signed-order matching used by bridged venues
//!
//! ## Design Principles
//!
//! 1. **Conservation**: `balance == sum(stakes)` for every party, always
//! 2. **No Floating Point**: Shares are integer parts-per-billion
//! 3. **All or Nothing**: A failed operation leaves no trace in the ledger
//! 4. **Synchronous Execution**: Every ledger operation runs under one lock
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use block_parties::{Exchange, InMemoryVault, Ledger, SwapExchange, VenueParams};
//! use block_parties::config::ExchangeConfig;
//! use block_parties::types::Address;
//!
//! let owner = Address::repeat(0xaa);
//! let venue = Address::repeat(0xe1);
//!
//! let vault = Arc::new(InMemoryVault::new());
//! vault.fund(venue, 1_000);
//! let ledger = Arc::new(Ledger::new(owner, vault));
//! ledger.whitelist_host(owner, venue).unwrap();
//!
//! let exchange = SwapExchange::new(venue, ledger.clone(), ExchangeConfig::default());
//! let id = exchange.create_party(owner, 0, 200, &VenueParams::default()).unwrap();
//! exchange.buy(id).unwrap();
//! assert_eq!(ledger.balance(id).unwrap(), 200);
//! ```

// ============================================================================
// Module declarations
// ============================================================================

/// Core data types: Address, Amount, Party, LedgerEvent
pub mod types;

/// Error taxonomy
pub mod error;

/// Host whitelist
pub mod access;

/// Party ledger with slab-based storage
pub mod ledger;

/// Exchange adapters and listing state machine
pub mod exchange;

/// Order-matching bridge interface and reference implementation
pub mod bridge;

/// TOML configuration and logging setup
pub mod config;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use access::AccessRegistry;
pub use config::Config;
pub use error::{PartyError, Result};
pub use exchange::{BridgedExchange, Exchange, Listing, ListingState, SwapExchange, VenueParams};
pub use ledger::{InMemoryVault, Ledger, Vault};
pub use types::{Address, Amount, LedgerEvent, Party, PartyId};
