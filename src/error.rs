//! Error taxonomy for the ledger, access control and exchange layers.
//!
//! Every error is returned synchronously from the failing call, is never
//! retried internally and leaves no partial state behind.

use thiserror::Error;

use crate::types::{Address, Amount, PartyId};

pub type Result<T> = std::result::Result<T, PartyError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartyError {
    /// Caller is not whitelisted, or is not the registry owner
    #[error("unauthorized: {caller} may not {action}")]
    Unauthorized { caller: Address, action: &'static str },

    /// Unknown party, or party not bound to this exchange
    #[error("party {0} not found")]
    NotFound(PartyId),

    /// Zero amount where a positive one is required
    #[error("invalid amount: {0}")]
    InvalidAmount(Amount),

    #[error("the amount requested exceeds the sender's stake (requested {requested}, stake {stake})")]
    InsufficientStake { requested: Amount, stake: Amount },

    /// Exchange operation called out of sequence
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Order-matching bridge rejected the match or one leg failed
    #[error("settlement failed: {0}")]
    SettlementFailed(String),

    /// Value transfer into or out of escrow failed
    #[error("transfer failed: {0}")]
    TransferFailed(String),

    /// Balance would leave the representable range
    #[error("arithmetic overflow on party {0}")]
    Overflow(PartyId),

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PartyError {
    pub(crate) fn unauthorized(caller: Address, action: &'static str) -> Self {
        PartyError::Unauthorized { caller, action }
    }
}

impl From<toml::de::Error> for PartyError {
    fn from(e: toml::de::Error) -> Self {
        PartyError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for PartyError {
    fn from(e: serde_json::Error) -> Self {
        PartyError::CorruptSnapshot(e.to_string())
    }
}
