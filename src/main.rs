//! Block Parties - Binary Entry Point
//!
//! Runs one party through both exchange variants against an in-memory
//! vault and prints the resulting shares, journal and state root.
//!
//! ```bash
//! block-parties [config.toml]
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use k256::ecdsa::SigningKey;
use tracing::{error, info};

use block_parties::bridge::{CallExecutor, ExecutionPlan, LocalBridge, MatchError, Order, Side};
use block_parties::config::Config;
use block_parties::exchange::SystemClock;
use block_parties::types::amount::giga_to_percent;
use block_parties::{Address, BridgedExchange, Exchange, InMemoryVault, Ledger, Result, SwapExchange, VenueParams};

const OWNER: Address = Address::repeat(0xaa);
const SWAP_VENUE: Address = Address::repeat(0xe1);
const REGISTRY: Address = Address::repeat(0xee);
const TARGET: Address = Address::repeat(0x70);

/// Executor that accepts every call and logs it
struct LoggingExecutor;

impl CallExecutor for LoggingExecutor {
    fn static_check(&self, _static_target: Address, _calldata: &[u8], _extradata: &[u8]) -> bool {
        true
    }

    fn execute(&self, plan: &ExecutionPlan) -> std::result::Result<(), MatchError> {
        info!(payer = %plan.payer, payee = %plan.payee, price = plan.price, target = %plan.target, "executing matched call");
        Ok(())
    }
}

fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path)),
        None => {
            let mut config = Config::new(OWNER);
            config.whitelisted.push(SWAP_VENUE);
            config.exchange.default_duration = Some(3_600);
            Ok(config)
        }
    }
}

fn signing_key(byte: u8) -> Result<SigningKey> {
    SigningKey::from_slice(&[byte; 32])
        .map_err(|e| block_parties::PartyError::Config(format!("bad demo key: {e}")))
}

fn counter_order(key: &SigningKey, side: Side, price: u128) -> Result<block_parties::bridge::SignedOrder> {
    let order = Order {
        exchange: REGISTRY,
        maker: Address::from_verifying_key(key.verifying_key()),
        side,
        target: TARGET,
        calldata: vec![0x23, 0xb8, 0x72, 0xdd],
        base_price: price,
        salt: [side.to_u8() + 1; 32],
        ..Order::default()
    };
    Ok(order.sign(key)?)
}

fn run(config: Config) -> Result<()> {
    let alice = Address::repeat(0x0a);
    let bob = Address::repeat(0x0b);
    let bridged_key = signing_key(7)?;
    let bridged_addr = Address::from_verifying_key(bridged_key.verifying_key());

    let vault = Arc::new(InMemoryVault::new());
    for account in [alice, bob, SWAP_VENUE, bridged_addr] {
        vault.fund(account, 10_000);
    }

    let ledger = Arc::new(Ledger::with_registry(config.registry(), vault.clone()));
    let owner = config.registry_owner;
    ledger.whitelist_host(owner, bridged_addr)?;
    if !ledger.is_whitelisted(&SWAP_VENUE) {
        ledger.whitelist_host(owner, SWAP_VENUE)?;
    }

    println!("===========================================");
    println!("  Block Parties");
    println!("===========================================");
    println!();

    // Swap venue: buy then sell leaves the balance unchanged
    let swap = SwapExchange::new(SWAP_VENUE, ledger.clone(), config.exchange);
    let party = swap.create_party(owner, 0, 200, &VenueParams::default())?;
    ledger.deposit(alice, party, 100)?;
    ledger.deposit(bob, party, 300)?;
    swap.buy(party)?;
    println!("Party {party} after swap buy: balance {}", ledger.balance(party)?);
    swap.sell(party)?;
    println!("Party {party} after swap sell: balance {}", ledger.balance(party)?);

    for who in [alice, bob] {
        println!("  {who}: {}", giga_to_percent(ledger.giga_stake(party, &who)?));
    }
    println!();

    // Bridged venue: each leg settles through signed-order matching
    let bridge = Arc::new(LocalBridge::new(REGISTRY, Arc::new(LoggingExecutor)));
    let bridged = BridgedExchange::new(bridged_key, ledger.clone(), bridge, Arc::new(SystemClock), config.exchange);
    let duration = config.exchange.default_duration.unwrap_or(3_600);
    let listed = bridged.create_party(owner, 0, 500, &VenueParams::with_duration(duration))?;
    ledger.deposit(alice, listed, 50)?;

    bridged.post_counter_order(listed, counter_order(&signing_key(2)?, Side::Sell, 400)?)?;
    bridged.buy(listed)?;
    println!("Party {listed} after bridged buy: balance {}", ledger.balance(listed)?);

    bridged.post_counter_order(listed, counter_order(&signing_key(3)?, Side::Buy, 400)?)?;
    bridged.sell(listed)?;
    println!("Party {listed} after bridged sell: balance {}", ledger.balance(listed)?);
    println!();

    ledger.check_invariants()?;
    println!("Journal:");
    for record in ledger.events() {
        println!("  #{:<3} {}", record.seq, record.event.name());
    }
    println!();
    println!("State root: {}", ledger.state_root()?);
    Ok(())
}

fn main() -> ExitCode {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };
    config.logging.init();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "demo failed");
            ExitCode::FAILURE
        }
    }
}
