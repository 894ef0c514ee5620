//! Core data types for the party ledger
//!
//! ## Types
//!
//! - [`Address`]: Opaque 20-byte caller identity
//! - [`Amount`]: Raw escrow units (`u128`, no floating point)
//! - [`Party`]: A pooled escrow with per-depositor stakes
//! - [`LedgerEvent`]: Observable state changes
//!
//! ## Giga-Stake Arithmetic
//!
//! Shares are reported as `floor(stake * 10^9 / balance)`.
//! Example: 100 out of a 300 balance is 333_333_333

pub mod address;
pub mod amount;
mod event;
mod party;

// Re-export all types at module level
pub use address::Address;
pub use amount::{Amount, GIGA, MAX_BALANCE};
pub use event::{EventRecord, LedgerEvent};
pub use party::{Party, PartyId};
