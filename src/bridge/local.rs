//! In-process reference bridge.
//!
//! [`LocalBridge`] implements the full matching contract (signatures,
//! complementarity, mask patching, static pre-check, replay protection) and
//! delegates the call-level effects to an injected [`CallExecutor`]. The
//! executor is responsible for applying a plan atomically; the bridge only
//! marks orders finalized once the executor reports success.
//!
//! ## Replay Protection
//!
//! Non-reusable order hashes are reserved before the executor runs, in the
//! same critical section that checks them. A concurrent match on either hash
//! fails with `AlreadyFinalized` while the first one is in flight. The
//! reservation becomes final on success and is released on failure.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bridge::order::{OrderHash, SaleKind, Side, SignedOrder};
use crate::bridge::pattern::patched;
use crate::bridge::{MatchError, MatchReceipt, OrderMatchingBridge};
use crate::types::{Address, Amount};

/// What a validated match executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    /// Buy-side maker, pays `price`
    pub payer: Address,
    /// Sell-side maker, receives `price`
    pub payee: Address,
    pub price: Amount,
    pub target: Address,
    pub calldata: Vec<u8>,
}

/// Call-level effects of a match.
pub trait CallExecutor: Send + Sync {
    /// Read-only pre-check against the patched calldata
    fn static_check(&self, static_target: Address, calldata: &[u8], extradata: &[u8]) -> bool;

    /// Run the call and the payment. Must apply both or neither.
    fn execute(&self, plan: &ExecutionPlan) -> Result<(), MatchError>;
}

/// Order hashes that can no longer be matched
#[derive(Debug, Default)]
struct ReplaySet {
    finalized: HashSet<OrderHash>,
    /// Reserved by a match whose call has not returned yet
    in_flight: HashSet<OrderHash>,
}

impl ReplaySet {
    fn is_used(&self, hash: &OrderHash) -> bool {
        self.finalized.contains(hash) || self.in_flight.contains(hash)
    }
}

/// Reference implementation of [`OrderMatchingBridge`]
pub struct LocalBridge {
    exchange: Address,
    executor: Arc<dyn CallExecutor>,
    replay: Mutex<ReplaySet>,
}

impl LocalBridge {
    pub fn new(exchange: Address, executor: Arc<dyn CallExecutor>) -> Self {
        Self {
            exchange,
            executor,
            replay: Mutex::new(ReplaySet::default()),
        }
    }

    /// Whether an order hash has already been matched
    pub fn is_finalized(&self, hash: &OrderHash) -> bool {
        self.replay.lock().finalized.contains(hash)
    }

    /// Mark an order as unusable without matching it
    pub fn cancel(&self, order: &SignedOrder) -> Result<(), MatchError> {
        let hash = order.verify()?;
        self.replay.lock().finalized.insert(hash);
        debug!(hash = %hex::encode(hash), "order cancelled");
        Ok(())
    }

    /// Run every check and build the plan, without executing anything
    pub fn prepare(&self, buy: &SignedOrder, sell: &SignedOrder, now: u64) -> Result<(ExecutionPlan, OrderHash, OrderHash), MatchError> {
        let (b, s) = (&buy.order, &sell.order);

        let buy_hash = buy.verify()?;
        let sell_hash = sell.verify()?;

        if b.side != Side::Buy || s.side != Side::Sell {
            return Err(MatchError::Mismatch("sides must be buy and sell"));
        }
        if b.exchange != self.exchange || s.exchange != self.exchange {
            return Err(MatchError::Mismatch("orders reference a different exchange"));
        }
        if b.sale_kind != SaleKind::FixedPrice || s.sale_kind != b.sale_kind {
            return Err(MatchError::Mismatch("sale kinds differ"));
        }
        if b.target != s.target || b.target.is_zero() {
            return Err(MatchError::Mismatch("call targets differ"));
        }
        if !b.taker.is_zero() && b.taker != s.maker {
            return Err(MatchError::Mismatch("buy order restricted to another taker"));
        }
        if !s.taker.is_zero() && s.taker != b.maker {
            return Err(MatchError::Mismatch("sell order restricted to another taker"));
        }
        if !b.is_live(now) {
            return Err(MatchError::NotLive { side: Side::Buy, now });
        }
        if !s.is_live(now) {
            return Err(MatchError::NotLive { side: Side::Sell, now });
        }
        if b.base_price < s.base_price {
            return Err(MatchError::PriceTooLow {
                buy: b.base_price,
                sell: s.base_price,
            });
        }

        {
            let replay = self.replay.lock();
            for (order, hash) in [(b, &buy_hash), (s, &sell_hash)] {
                if !order.reusable && replay.is_used(hash) {
                    return Err(MatchError::AlreadyFinalized(hex::encode(hash)));
                }
            }
        }

        let buy_call = patched(&b.calldata, &s.calldata, &b.replacement_pattern)?;
        let sell_call = patched(&s.calldata, &b.calldata, &s.replacement_pattern)?;
        if buy_call != sell_call {
            return Err(MatchError::CalldataMismatch);
        }

        for order in [b, s] {
            if !order.static_target.is_zero()
                && !self
                    .executor
                    .static_check(order.static_target, &buy_call, &order.static_extradata)
            {
                return Err(MatchError::StaticCheckFailed);
            }
        }

        let plan = ExecutionPlan {
            payer: b.maker,
            payee: s.maker,
            price: s.base_price,
            target: s.target,
            calldata: buy_call,
        };
        Ok((plan, buy_hash, sell_hash))
    }

    /// Check and reserve `hashes` under one lock
    fn reserve(&self, hashes: &[OrderHash]) -> Result<(), MatchError> {
        let mut replay = self.replay.lock();
        if let Some(hash) = hashes.iter().find(|h| replay.is_used(h)) {
            return Err(MatchError::AlreadyFinalized(hex::encode(hash)));
        }
        replay.in_flight.extend(hashes.iter().copied());
        Ok(())
    }

    /// Drop a reservation, keeping the hashes as finalized if the match ran
    fn release(&self, hashes: &[OrderHash], finalize: bool) {
        let mut replay = self.replay.lock();
        for hash in hashes {
            replay.in_flight.remove(hash);
            if finalize {
                replay.finalized.insert(*hash);
            }
        }
    }
}

impl OrderMatchingBridge for LocalBridge {
    fn exchange_address(&self) -> Address {
        self.exchange
    }

    fn validate_and_execute(&self, buy: &SignedOrder, sell: &SignedOrder, now: u64) -> Result<MatchReceipt, MatchError> {
        let (plan, buy_hash, sell_hash) = self.prepare(buy, sell, now).map_err(|e| {
            warn!(error = %e, "match rejected");
            e
        })?;

        let single_use: Vec<OrderHash> = [(buy, buy_hash), (sell, sell_hash)]
            .into_iter()
            .filter(|(signed, _)| !signed.order.reusable)
            .map(|(_, hash)| hash)
            .collect();
        self.reserve(&single_use)?;

        if let Err(e) = self.executor.execute(&plan) {
            self.release(&single_use, false);
            return Err(e);
        }
        self.release(&single_use, true);

        info!(
            buy = %hex::encode(buy_hash),
            sell = %hex::encode(sell_hash),
            price = plan.price,
            "orders matched"
        );
        Ok(MatchReceipt {
            buy_hash,
            sell_hash,
            price: plan.price,
            calldata: plan.calldata,
        })
    }
}
