//! Concurrent transfer tests
//!
//! Many threads push transfers through the same pair of accounts at once.
//! Money must be conserved, no update may be lost, and transfers in
//! opposite directions must never deadlock.
//!
//! Run with: cargo test --test concurrent_access_test -- --nocapture
//! Run specific test: cargo test --test concurrent_access_test test_name -- --nocapture

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use simplebank_core::adapters::duckdb::DuckDbStore;
use simplebank_core::adapters::memory::MemoryStore;
use simplebank_core::ports::{AddAccountBalanceParams, CancellationToken, Database};
use simplebank_core::services::{AccountService, TransferService, TxManager};
use simplebank_core::{AccountId, Currency, Error, TransferTxParams};

/// Number of concurrent threads for stress tests.
const THREAD_COUNT: usize = 8;

/// Number of transfers per thread
const ITERATIONS_PER_THREAD: usize = 5;

const OPENING_BALANCE: i64 = 1_000;

struct Setup<D: Database> {
    store: Arc<D>,
    accounts: AccountService<D>,
    transfers: Arc<TransferService<D>>,
    a: AccountId,
    b: AccountId,
}

fn setup<D: Database>(store: D) -> Setup<D> {
    let store = Arc::new(store);
    let tx_manager = TxManager::new(Arc::clone(&store));
    let accounts = AccountService::new(tx_manager.clone());
    let transfers = Arc::new(TransferService::new(tx_manager));

    let ctx = CancellationToken::new();
    let a = accounts
        .open_account_with_balance(&ctx, "alice", Currency::Usd, OPENING_BALANCE)
        .unwrap()
        .id;
    let b = accounts
        .open_account_with_balance(&ctx, "bob", Currency::Usd, OPENING_BALANCE)
        .unwrap()
        .id;

    Setup {
        store,
        accounts,
        transfers,
        a,
        b,
    }
}

/// Run `THREAD_COUNT` threads released together by a barrier. `direction`
/// picks (from, to) for each thread. Returns (successes, errors).
fn run_transfers<D, F>(setup: &Setup<D>, amount: i64, direction: F) -> (usize, Vec<Error>)
where
    D: Database + 'static,
    F: Fn(usize) -> (AccountId, AccountId),
{
    let barrier = Arc::new(Barrier::new(THREAD_COUNT));
    let success_count = Arc::new(AtomicUsize::new(0));
    let mut handles = vec![];

    for thread_id in 0..THREAD_COUNT {
        let barrier = Arc::clone(&barrier);
        let transfers = Arc::clone(&setup.transfers);
        let success_count = Arc::clone(&success_count);
        let (from, to) = direction(thread_id);

        handles.push(thread::spawn(move || {
            let ctx = CancellationToken::new();
            let mut errors = vec![];
            barrier.wait();

            for _ in 0..ITERATIONS_PER_THREAD {
                match transfers.transfer_tx(&ctx, TransferTxParams::new(from, to, amount)) {
                    Ok(_) => {
                        success_count.fetch_add(1, Ordering::SeqCst);
                    }
                    Err(e) => errors.push(e),
                }
            }
            errors
        }));
    }

    let mut errors = vec![];
    for handle in handles {
        errors.extend(handle.join().expect("Thread panicked"));
    }
    (success_count.load(Ordering::SeqCst), errors)
}

fn balance<D: Database>(setup: &Setup<D>, id: AccountId) -> i64 {
    setup
        .accounts
        .get_account(&CancellationToken::new(), id)
        .unwrap()
        .balance
}

// ============================================================================
// No lost updates: one direction, many writers
// ============================================================================

fn check_no_lost_updates<D: Database + 'static>(setup: Setup<D>) {
    let (a, b) = (setup.a, setup.b);
    let (successes, errors) = run_transfers(&setup, 10, |_| (a, b));

    println!("Successes: {}, Errors: {}", successes, errors.len());
    assert!(errors.is_empty(), "Unexpected errors: {:?}", errors);

    let total = (THREAD_COUNT * ITERATIONS_PER_THREAD) as i64;
    assert_eq!(balance(&setup, a), OPENING_BALANCE - 10 * total);
    assert_eq!(balance(&setup, b), OPENING_BALANCE + 10 * total);
}

#[test]
fn test_memory_concurrent_transfers_lose_no_updates() {
    check_no_lost_updates(setup(MemoryStore::default()));
}

#[test]
fn test_duckdb_concurrent_transfers_lose_no_updates() {
    check_no_lost_updates(setup(DuckDbStore::open_in_memory().unwrap()));
}

// ============================================================================
// Deadlock freedom: opposite directions over the same pair
// ============================================================================

fn check_opposite_directions<D: Database + 'static>(setup: Setup<D>) {
    let (a, b) = (setup.a, setup.b);
    let start = Instant::now();

    // Even threads move a -> b, odd threads b -> a
    let (successes, errors) = run_transfers(&setup, 7, |thread_id| {
        if thread_id % 2 == 0 {
            (a, b)
        } else {
            (b, a)
        }
    });

    println!(
        "Successes: {}, Errors: {}, elapsed: {:?}",
        successes,
        errors.len(),
        start.elapsed()
    );
    assert!(errors.is_empty(), "Unexpected errors: {:?}", errors);
    assert_eq!(successes, THREAD_COUNT * ITERATIONS_PER_THREAD);

    // Half the threads go each way, so both balances end where they began
    assert_eq!(balance(&setup, a), OPENING_BALANCE);
    assert_eq!(balance(&setup, b), OPENING_BALANCE);
    assert_eq!(balance(&setup, a) + balance(&setup, b), 2 * OPENING_BALANCE);
}

/// With row locks that time out, any lock-order cycle would surface as
/// `Error::Conflict` here.
#[test]
fn test_memory_opposite_transfers_do_not_deadlock() {
    let setup = setup(MemoryStore::new(Duration::from_secs(2)));
    check_opposite_directions(setup);
}

#[test]
fn test_duckdb_opposite_transfers_do_not_deadlock() {
    check_opposite_directions(setup(DuckDbStore::open_in_memory().unwrap()));
}

#[test]
fn test_memory_locks_always_taken_lower_id_first() {
    let setup = setup(MemoryStore::default());
    let (a, b) = (setup.a, setup.b);

    run_transfers(&setup, 1, |thread_id| {
        if thread_id % 2 == 0 {
            (a, b)
        } else {
            (b, a)
        }
    });

    let (low, high) = if a < b { (a, b) } else { (b, a) };
    let history = setup.store.lock_history();
    assert_eq!(history.len(), 2 * THREAD_COUNT * ITERATIONS_PER_THREAD);
    for pair in history.chunks(2) {
        assert_eq!(pair, [low, high]);
    }
}

/// Counterpart to the tests above: locking the two rows in opposite orders
/// from two transactions does cycle, and the lock wait timeout breaks it.
#[test]
fn test_memory_unordered_locking_times_out() {
    let setup = setup(MemoryStore::new(Duration::from_millis(200)));
    let (a, b) = (setup.a, setup.b);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [(a, b), (b, a)]
        .into_iter()
        .map(|(first, second)| {
            let tx_manager = TxManager::new(Arc::clone(&setup.store));
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                tx_manager.exec_tx(&CancellationToken::new(), |q| {
                    q.add_account_balance(&AddAccountBalanceParams { id: first, amount: -1 })?;
                    barrier.wait();
                    q.add_account_balance(&AddAccountBalanceParams { id: second, amount: 1 })
                })
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    assert!(
        results.iter().any(|r| matches!(r, Err(Error::Conflict(_)))),
        "Expected a lock wait timeout, got {:?}",
        results
    );
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(Error::is_retryable));

    // Whatever committed, the pair still sums to the same total
    assert_eq!(balance(&setup, a) + balance(&setup, b), 2 * OPENING_BALANCE);
}
