//! Stress tests for the party ledger.
//!
//! These tests verify:
//! 1. `balance == sum(stakes)` after every operation, successful or not
//! 2. Giga-stakes of a party never sum above 10^9
//! 3. Determinism is preserved across runs
//! 4. Concurrent callers never observe or produce partial state
//!
//! ## Running Stress Tests
//!
//! ```bash
//! cargo test --release --test stress_test -- --nocapture
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use block_parties::ledger::StateRoot;
use block_parties::types::GIGA;
use block_parties::{Address, Amount, InMemoryVault, Ledger, PartyError, PartyId};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

// ============================================================================
// TEST CONSTANTS
// ============================================================================

const OWNER: Address = Address::repeat(0xaa);
const HOST: Address = Address::repeat(0x01);

/// Parties created up front
const PARTY_COUNT: u64 = 16;

/// Distinct depositors
const DEPOSITOR_COUNT: u8 = 32;

/// Starting wallet balance of every depositor
const FUNDING: Amount = 1_000_000_000;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn depositor(i: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xd0;
    bytes[19] = i;
    Address::new(bytes)
}

fn setup() -> (Arc<Ledger>, Arc<InMemoryVault>) {
    let vault = Arc::new(InMemoryVault::new());
    for i in 0..DEPOSITOR_COUNT {
        vault.fund(depositor(i), FUNDING);
    }
    let ledger = Arc::new(Ledger::new(OWNER, vault.clone()));
    ledger.whitelist_host(OWNER, HOST).unwrap();
    for _ in 0..PARTY_COUNT {
        ledger.create_party(HOST, OWNER, 0, 1_000).unwrap();
    }
    (ledger, vault)
}

fn assert_party_consistent(ledger: &Ledger, party_id: PartyId) {
    let party = ledger.party(party_id).unwrap();
    let sum: Amount = party.stakes().map(|(_, s)| *s).sum();
    assert_eq!(party.balance(), sum, "party {party_id} balance drifted from its stakes");

    let giga: u64 = party.stakes().map(|(d, _)| party.giga_stake(d)).sum();
    assert!(giga <= GIGA, "party {party_id} giga-stakes sum to {giga}");
}

/// Apply `count` random deposits/withdrawals, checking the ledger against a
/// plain model after each one.
fn run_random_sequence(seed: u64, count: usize) -> StateRoot {
    let (ledger, _) = setup();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut model: HashMap<(PartyId, u8), Amount> = HashMap::new();

    for _ in 0..count {
        let party_id = rng.gen_range(1..=PARTY_COUNT);
        let who = rng.gen_range(0..DEPOSITOR_COUNT);
        let stake = model.get(&(party_id, who)).copied().unwrap_or(0);

        if rng.gen_bool(0.6) {
            let amount = rng.gen_range(0..=1_000);
            match ledger.deposit(depositor(who), party_id, amount) {
                Ok(()) => *model.entry((party_id, who)).or_insert(0) += amount,
                Err(e) => assert_eq!(e, PartyError::InvalidAmount(0)),
            }
        } else {
            // Occasionally ask for more than the stake
            let amount = rng.gen_range(1..=stake + 10);
            match ledger.withdraw(depositor(who), party_id, amount) {
                Ok(()) => *model.entry((party_id, who)).or_insert(0) -= amount,
                Err(e) => {
                    assert!(amount > stake);
                    assert_eq!(e, PartyError::InsufficientStake { requested: amount, stake });
                }
            }
        }

        assert_eq!(
            ledger.stake(party_id, &depositor(who)).unwrap(),
            model.get(&(party_id, who)).copied().unwrap_or(0)
        );
        assert_party_consistent(&ledger, party_id);
    }

    ledger.check_invariants().unwrap();
    ledger.state_root().unwrap()
}

// ============================================================================
// STRESS TESTS
// ============================================================================

/// Random operations keep every party consistent with a reference model.
#[test]
fn stress_random_operations() {
    println!("\n=== STRESS TEST: Random Ledger Operations ===\n");

    const OPS: usize = 20_000;
    let start = Instant::now();
    let root = run_random_sequence(42, OPS);
    let elapsed = start.elapsed();

    println!("  Operations:        {:>12}", OPS);
    println!("  Elapsed time:      {:>12.2?}", elapsed);
    println!("  State root:        {}", root);

    println!("\n=== STRESS TEST PASSED ===\n");
}

/// Same sequence, same state root.
#[test]
fn verify_determinism() {
    const OPS: usize = 5_000;
    const SEED: u64 = 12345;

    let root1 = run_random_sequence(SEED, OPS);
    let root2 = run_random_sequence(SEED, OPS);
    assert_eq!(root1, root2, "State roots must match for determinism");

    let root3 = run_random_sequence(SEED + 1, OPS);
    assert_ne!(root1, root3, "Different seeds should produce different roots");
}

/// Threads hammering the same parties never break conservation of value.
#[test]
fn stress_concurrent_depositors() {
    const THREADS: u8 = 8;
    const OPS_PER_THREAD: usize = 2_000;

    let (ledger, vault) = setup();

    thread::scope(|s| {
        for t in 0..THREADS {
            let ledger = ledger.clone();
            s.spawn(move || {
                let mut rng = ChaCha8Rng::seed_from_u64(t as u64);
                // Each thread owns a disjoint group of depositors
                let group: Vec<u8> = (0..DEPOSITOR_COUNT).filter(|d| d % THREADS == t).collect();

                for _ in 0..OPS_PER_THREAD {
                    let party_id = rng.gen_range(1..=PARTY_COUNT);
                    let who = depositor(group[rng.gen_range(0..group.len())]);
                    let amount = rng.gen_range(1..=500);
                    if rng.gen_bool(0.5) {
                        ledger.deposit(who, party_id, amount).unwrap();
                    } else {
                        let _ = ledger.withdraw(who, party_id, amount);
                    }
                }
            });
        }
    });

    ledger.check_invariants().unwrap();

    // Escrow equals the sum of all party balances, wallets make up the rest
    let escrowed: Amount = (1..=PARTY_COUNT).map(|id| ledger.balance(id).unwrap()).sum();
    assert_eq!(vault.escrow(), escrowed);

    let wallets: Amount = (0..DEPOSITOR_COUNT).map(|i| vault.balance_of(&depositor(i))).sum();
    assert_eq!(wallets + escrowed, FUNDING * DEPOSITOR_COUNT as Amount);

    for id in 1..=PARTY_COUNT {
        assert_party_consistent(&ledger, id);
    }
}

/// Snapshot and restore after a long random run reproduces the state root.
#[test]
fn stress_snapshot_roundtrip() {
    let (ledger, vault) = setup();
    let mut rng = ChaCha8Rng::seed_from_u64(7);

    for _ in 0..2_000 {
        let party_id = rng.gen_range(1..=PARTY_COUNT);
        let who = depositor(rng.gen_range(0..DEPOSITOR_COUNT));
        ledger.deposit(who, party_id, rng.gen_range(1..=1_000)).unwrap();
    }

    let json = ledger.snapshot().to_json().unwrap();
    let restored = Ledger::restore(
        block_parties::ledger::LedgerSnapshot::from_json(&json).unwrap(),
        vault,
    )
    .unwrap();

    assert_eq!(restored.state_root().unwrap(), ledger.state_root().unwrap());
    assert_eq!(restored.party_count(), PARTY_COUNT as usize);
    restored.check_invariants().unwrap();
}
