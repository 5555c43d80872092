use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use wallet_ledger::{LedgerError, LedgerStore, MemoryStore, TransferEngine, Wallet};

const W1: &str = "0x0000000000000000000000000000000000000001";
const W2: &str = "0x0000000000000000000000000000000000000002";
const W3: &str = "0x0000000000000000000000000000000000000003";

fn setup(wallets: &[(&str, Decimal)]) -> (TransferEngine, MemoryStore) {
    let store = MemoryStore::from_wallets(wallets.iter().map(|(a, b)| Wallet::new(*a, *b)));
    (TransferEngine::new(Arc::new(store.clone())), store)
}

async fn total(store: &MemoryStore) -> Decimal {
    store
        .wallets()
        .await
        .unwrap()
        .iter()
        .map(|w| w.balance)
        .sum()
}

async fn assert_no_negative(store: &MemoryStore) {
    for wallet in store.wallets().await.unwrap() {
        assert!(wallet.balance >= Decimal::ZERO, "{} went negative", wallet.address);
    }
}

// ============================================================================
// SINGLE TRANSFER SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_transfer_updates_both_wallets() {
    let (engine, _) = setup(&[(W1, dec!(10)), (W2, dec!(15))]);

    let new_balance = engine.transfer(W1, W2, "6").await.unwrap();
    assert_eq!(new_balance.to_string(), "4");
    assert_eq!(engine.balance(W1).await.unwrap(), dec!(4));
    assert_eq!(engine.balance(W2).await.unwrap(), dec!(21));
}

#[tokio::test]
async fn test_large_transfer() {
    let (engine, _) = setup(&[(W1, dec!(1000000)), (W2, dec!(400000))]);
    assert_eq!(engine.transfer(W1, W2, "700000").await.unwrap(), dec!(300000));
}

#[tokio::test]
async fn test_insufficient_balance_is_rejected() {
    let (engine, store) = setup(&[(W1, dec!(500)), (W2, dec!(300))]);

    let err = engine.transfer(W1, W2, "700").await.unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientBalance));
    assert_eq!(err.to_string(), "insufficient balance");
    assert_eq!(engine.balance(W1).await.unwrap(), dec!(500));
    assert_eq!(engine.balance(W2).await.unwrap(), dec!(300));
    assert_eq!(store.tracked_locks(), 0);
}

#[tokio::test]
async fn test_negative_amount() {
    let (engine, _) = setup(&[(W1, dec!(1000)), (W2, dec!(500))]);
    let err = engine.transfer(W1, W2, "-100").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotPositive));
    assert_eq!(err.to_string(), "amount must be positive");
}

#[tokio::test]
async fn test_non_numeric_amount() {
    let (engine, _) = setup(&[(W1, dec!(1000)), (W2, dec!(500))]);
    let err = engine.transfer(W1, W2, "10q").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidFormat(_)));
    assert_eq!(err.to_string(), "invalid amount format: can't convert 10q to decimal");
}

#[tokio::test]
async fn test_fractional_amount() {
    let (engine, _) = setup(&[(W1, dec!(1000)), (W2, dec!(500))]);
    let err = engine.transfer(W1, W2, "100.7").await.unwrap_err();
    assert!(matches!(err, LedgerError::NotInteger));
    assert_eq!(err.to_string(), "amount must be an integer (cant be floating point)");
}

#[tokio::test]
async fn test_unknown_sender() {
    let (engine, store) = setup(&[(W1, dec!(500)), (W2, dec!(300))]);

    let err = engine.transfer(W3, W2, "100").await.unwrap_err();
    assert!(matches!(err, LedgerError::SenderNotFound));
    assert_eq!(err.to_string(), "transfer fail: sender wallet not found");
    assert_eq!(engine.balance(W2).await.unwrap(), dec!(300));
    assert!(matches!(engine.balance(W3).await, Err(LedgerError::NotFound)));
    assert_eq!(store.wallets().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_receiver_is_created() {
    let (engine, store) = setup(&[(W1, dec!(500)), (W2, dec!(300))]);

    assert_eq!(engine.transfer(W1, W3, "100").await.unwrap(), dec!(400));
    assert_eq!(engine.balance(W3).await.unwrap(), dec!(100));
    assert_eq!(total(&store).await, dec!(800));
}

#[tokio::test]
async fn test_self_transfer() {
    let (engine, store) = setup(&[(W1, dec!(500))]);

    let err = engine.transfer(W1, W1, "100").await.unwrap_err();
    assert!(matches!(err, LedgerError::SameAddress));
    assert_eq!(store.wallets().await.unwrap(), vec![Wallet::new(W1, dec!(500))]);
}

#[tokio::test]
async fn test_failures_never_mutate() {
    let (engine, store) = setup(&[(W1, dec!(5)), (W2, dec!(7))]);
    let before = store.wallets().await.unwrap();

    for (from, to, amount) in [
        (W1, W2, "6"),
        (W1, W2, "0"),
        (W1, W2, "abc"),
        (W1, W2, "1.5"),
        (W3, W1, "1"),
        (W2, W2, "1"),
    ] {
        assert!(engine.transfer(from, to, amount).await.is_err());
    }

    assert_eq!(store.wallets().await.unwrap(), before);
    assert_eq!(store.tracked_locks(), 0);
}

#[tokio::test]
async fn test_sequential_transfers_conserve_value() {
    let (engine, store) = setup(&[(W1, dec!(100)), (W2, dec!(50)), (W3, dec!(0))]);

    for (from, to, amount) in [(W1, W2, "30"), (W2, W3, "80"), (W3, W1, "5"), (W2, W1, "1")] {
        let before_from = engine.balance(from).await.unwrap();
        let before_to = engine.balance(to).await.unwrap();

        engine.transfer(from, to, amount).await.unwrap();

        let after_from = engine.balance(from).await.unwrap();
        let after_to = engine.balance(to).await.unwrap();
        assert_eq!(before_from + before_to, after_from + after_to);
    }

    assert_eq!(total(&store).await, dec!(150));
    assert_no_negative(&store).await;
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_race_three_transfers() {
    for _ in 0..50 {
        let (engine, store) = setup(&[(W1, dec!(10)), (W2, dec!(1)), (W3, dec!(0))]);

        let mut handles = vec![];
        for (from, to, amount) in [(W2, W1, "1"), (W1, W2, "4"), (W1, W3, "7")] {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.transfer(from, to, amount).await
            }));
        }
        for handle in handles {
            // Only insufficient balance is an acceptable failure here.
            if let Err(e) = handle.await.unwrap() {
                assert!(matches!(e, LedgerError::InsufficientBalance), "{e}");
            }
        }

        assert_eq!(total(&store).await, dec!(11));
        assert_no_negative(&store).await;
        assert_eq!(store.tracked_locks(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_many_opposing_transfers_do_not_deadlock() {
    let addresses: Vec<String> = (0..6).map(|i| format!("wallet-{i}")).collect();
    let (engine, store) = setup(
        &addresses
            .iter()
            .map(|a| (a.as_str(), dec!(100)))
            .collect::<Vec<_>>(),
    );

    let mut handles = vec![];
    for i in 0..400usize {
        let engine = engine.clone();
        // Every pair is exercised in both directions.
        let from = addresses[i % 6].clone();
        let to = addresses[(i * 7 + 1 + i / 6) % 6].clone();
        let amount = ((i % 13) + 1).to_string();
        handles.push(tokio::spawn(async move {
            engine.transfer(&from, &to, &amount).await
        }));
    }

    let all = futures::future::join_all(handles);
    let results = tokio::time::timeout(Duration::from_secs(30), all)
        .await
        .expect("transfers deadlocked");

    for result in results {
        match result.unwrap() {
            Ok(balance) => assert!(balance >= Decimal::ZERO),
            Err(LedgerError::InsufficientBalance) | Err(LedgerError::SameAddress) => {}
            Err(e) => panic!("unexpected failure: {e}"),
        }
    }

    assert_eq!(total(&store).await, dec!(600));
    assert_no_negative(&store).await;
    assert_eq!(store.tracked_locks(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creation_of_same_receiver() {
    let senders: Vec<String> = (0..20).map(|i| format!("sender-{i:02}")).collect();
    let (engine, store) = setup(
        &senders
            .iter()
            .map(|a| (a.as_str(), dec!(5)))
            .collect::<Vec<_>>(),
    );

    let mut handles = vec![];
    for sender in senders {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine.transfer(&sender, "newcomer", "5").await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), dec!(0));
    }

    assert_eq!(engine.balance("newcomer").await.unwrap(), dec!(100));
    assert_eq!(total(&store).await, dec!(100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_never_see_partial_transfer() {
    let (engine, store) = setup(&[(W1, dec!(1000)), (W2, dec!(0))]);

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for _ in 0..200 {
                engine.transfer(W1, W2, "1").await.unwrap();
                engine.transfer(W2, W1, "1").await.unwrap();
            }
        })
    };

    while !writer.is_finished() {
        let wallets = store.wallets().await.unwrap();
        let sum: Decimal = wallets.iter().map(|w| w.balance).sum();
        assert_eq!(sum, dec!(1000));
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
}
