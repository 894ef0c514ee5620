//! Exact escrow amounts and giga-stake arithmetic.
//!
//! ## Overview
//!
//! All balances and stakes are raw integer units stored as `u128`. There is
//! no floating point anywhere in the ledger.
//!
//! ## Giga-Stake
//!
//! A depositor's share of a party is reported as a *giga-stake*: the stake
//! divided by the party balance, scaled by 10^9 and floor-rounded.
//!
//! Because every term is floored, the giga-stakes of all depositors of a
//! party sum to at most [`GIGA`], never more.
//!
//! ## Overflow
//!
//! Party balances are capped at [`MAX_BALANCE`] so `stake * GIGA` always fits
//! in a `u128`.
//!
//! ## Examples
//!
//! ```
//! use block_parties::types::amount::{giga_stake, GIGA};
//!
//! assert_eq!(giga_stake(100, 100), GIGA);
//! assert_eq!(giga_stake(100, 200), 500_000_000);
//! assert_eq!(giga_stake(1, 3), 333_333_333);
//! assert_eq!(giga_stake(0, 0), 0);
//! ```

use rust_decimal::Decimal;

/// Raw escrow amount in the smallest unit of value
pub type Amount = u128;

/// Scaling factor for giga-stakes: 10^9
pub const GIGA: u64 = 1_000_000_000;

/// Largest balance a single party may hold
///
/// u128::MAX / GIGA ≈ 3.4 * 10^29
pub const MAX_BALANCE: Amount = Amount::MAX / GIGA as Amount;

// ============================================================================
// Share Functions
// ============================================================================

/// Compute `floor(stake * 10^9 / balance)`
///
/// Returns 0 when `balance` is 0. The result is clamped to [`GIGA`], which
/// only matters for inconsistent inputs where `stake > balance`.
///
/// # Example
///
/// ```
/// use block_parties::types::amount::giga_stake;
///
/// assert_eq!(giga_stake(2, 3), 666_666_666);
/// ```
pub fn giga_stake(stake: Amount, balance: Amount) -> u64 {
    if balance == 0 {
        return 0;
    }
    let stake = stake.min(balance);

    match stake.checked_mul(GIGA as Amount) {
        Some(scaled) => (scaled / balance) as u64,
        // Only reachable above MAX_BALANCE: split the division instead
        None => {
            let whole = stake / balance;
            let rem = stake % balance;
            let frac = rem / (balance / GIGA as Amount).max(1);
            ((whole * GIGA as Amount) + frac).min(GIGA as Amount) as u64
        }
    }
}

/// Add `amount` to a balance, failing if the result would leave the
/// representable range.
pub fn checked_credit(balance: Amount, amount: Amount) -> Option<Amount> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= MAX_BALANCE)
}

/// Subtract `amount` from a balance
pub fn checked_debit(balance: Amount, amount: Amount) -> Option<Amount> {
    balance.checked_sub(amount)
}

// ============================================================================
// Display Helpers
// ============================================================================

/// Convert a giga-stake to a Decimal fraction in `[0, 1]`
pub fn giga_to_decimal(giga: u64) -> Decimal {
    Decimal::from(giga) / Decimal::from(GIGA)
}

/// Format a giga-stake as a percentage with 7 decimal places
///
/// # Example
///
/// ```
/// use block_parties::types::amount::giga_to_percent;
///
/// assert_eq!(giga_to_percent(500_000_000), "50.0000000%");
/// assert_eq!(giga_to_percent(1), "0.0000001%");
/// ```
pub fn giga_to_percent(giga: u64) -> String {
    let pct = giga_to_decimal(giga) * Decimal::from(100);
    format!("{:.7}%", pct)
}

// ============================================================================
// Unit Tests
// ============================================================================
