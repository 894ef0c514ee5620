//! Order-matching bridge.
//!
//! The exchange layer hands a buy-side and a sell-side [`SignedOrder`] to an
//! [`OrderMatchingBridge`] when settlement needs generic two-sided order
//! matching. The bridge is an injected capability; this module defines the
//! data it receives and the guarantees the exchange relies on.
//!
//! ## Contract
//!
//! A bridge must, in order:
//!
//! 1. **Verify** both signatures against their order hashes
//! 2. **Check complementarity**: same exchange, opposite sides, same target,
//!    compatible price, taker restrictions, validity windows
//! 3. **Patch** each order's calldata with its counter-order's calldata,
//!    limited to the bytes in its replacement pattern; both results must be
//!    identical
//! 4. **Execute** atomically: run the static pre-check on the patched
//!    calldata, then the call and the payment. Either everything happens or
//!    nothing does
//!
//! Each order hash is usable at most once unless the order is marked
//! reusable.
//!
//! ## Example
//!
//! ```
//! use block_parties::bridge::{MatchError, OrderMatchingBridge, MatchReceipt, SignedOrder};
//! use block_parties::types::Address;
//!
//! /// A bridge that refuses everything
//! struct Closed;
//!
//! impl OrderMatchingBridge for Closed {
//!     fn exchange_address(&self) -> Address {
//!         Address::repeat(0xee)
//!     }
//!
//!     fn validate_and_execute(
//!         &self,
//!         _buy: &SignedOrder,
//!         _sell: &SignedOrder,
//!         _now: u64,
//!     ) -> Result<MatchReceipt, MatchError> {
//!         Err(MatchError::CallFailed("closed".into()))
//!     }
//! }
//! ```

pub mod local;
pub mod order;
pub mod pattern;

use thiserror::Error;

use crate::error::PartyError;
use crate::types::{Address, Amount};

pub use local::{CallExecutor, ExecutionPlan, LocalBridge};
pub use order::{Order, OrderHash, OrderSignature, SaleKind, Side, SignedOrder};

/// Reasons a match is rejected.
///
/// Surfaced to ledger callers as [`PartyError::SettlementFailed`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    #[error("bad signature: expected {expected}, recovered {recovered:?}")]
    BadSignature {
        expected: Address,
        recovered: Option<Address>,
    },

    #[error("orders do not match: {0}")]
    Mismatch(&'static str),

    #[error("order {side:?} is not live at {now}")]
    NotLive { side: Side, now: u64 },

    #[error("buy price {buy} below sell price {sell}")]
    PriceTooLow { buy: Amount, sell: Amount },

    #[error("replacement pattern length mismatch (calldata {calldata}, counter {counter}, mask {mask})")]
    PatternLength {
        calldata: usize,
        counter: usize,
        mask: usize,
    },

    #[error("patched calldata differs between buy and sell")]
    CalldataMismatch,

    #[error("order {0} already finalized")]
    AlreadyFinalized(String),

    #[error("static pre-check rejected the call")]
    StaticCheckFailed,

    #[error("call failed: {0}")]
    CallFailed(String),

    #[error("encoding error: {0}")]
    Encoding(String),
}

impl From<MatchError> for PartyError {
    fn from(e: MatchError) -> Self {
        PartyError::SettlementFailed(e.to_string())
    }
}

/// Result of a successful match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchReceipt {
    pub buy_hash: OrderHash,
    pub sell_hash: OrderHash,
    /// Price the match settled at (the sell side's fixed price)
    pub price: Amount,
    /// Final calldata executed against the target
    pub calldata: Vec<u8>,
}

/// Settlement capability the bridged exchange depends on.
pub trait OrderMatchingBridge: Send + Sync {
    /// Exchange registry address orders must reference
    fn exchange_address(&self) -> Address;

    /// Validate the pair and execute it atomically
    fn validate_and_execute(&self, buy: &SignedOrder, sell: &SignedOrder, now: u64) -> Result<MatchReceipt, MatchError>;
}
