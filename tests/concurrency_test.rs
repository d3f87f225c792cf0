mod common;

use anyhow::Result;
use common::{test_ledger, test_ledger_with_connections};
use holdbook::Repository;
use holdbook::application::{ReserveError, TransactionEngine, WithdrawError};
use tokio::task::JoinSet;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_never_overdraw() -> Result<()> {
    let t = test_ledger_with_connections(8).await?;
    t.engine.replenish(1, 200).await?;

    let mut tasks = JoinSet::new();
    for order_id in 0..50 {
        let engine = t.engine.clone();
        tasks.spawn(async move { engine.reserve(1, 10, order_id, 1).await });
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(account) => {
                assert!(account.balance >= 0);
                succeeded += 1;
            }
            Err(ReserveError::InsufficientBalance { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 20);
    assert_eq!(insufficient, 30);

    let balance = t.engine.get_balance(1).await?;
    assert_eq!(balance.balance, 0);
    assert_eq!(balance.reserved, 200);

    let report = t.engine.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reservations_serialize_across_separate_pools() -> Result<()> {
    let t = test_ledger_with_connections(4).await?;
    t.engine.replenish(1, 1000).await?;

    // A second pool on the same file stands in for another process
    let other_repo = Repository::init(&t.config).await?;
    let engines = [t.engine.clone(), TransactionEngine::new(other_repo.clone())];

    let mut tasks = JoinSet::new();
    for order_id in 0..40 {
        let engine = engines[order_id as usize % 2].clone();
        tasks.spawn(async move { engine.reserve(1, 50, order_id, 3).await });
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => succeeded += 1,
            Err(ReserveError::InsufficientBalance { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 20);
    assert_eq!(insufficient, 20);

    let balance = t.engine.get_balance(1).await?;
    assert_eq!(balance.balance, 0);
    assert_eq!(balance.reserved, 1000);

    let report = TransactionEngine::new(other_repo.clone())
        .check_integrity()
        .await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);

    other_repo.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_reservation_applies_once() -> Result<()> {
    let t = test_ledger_with_connections(8).await?;
    t.engine.replenish(1, 1000).await?;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let engine = t.engine.clone();
        tasks.spawn(async move { engine.reserve(1, 40, 5, 9).await });
    }

    let mut succeeded = 0;
    let mut duplicates = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(_) => succeeded += 1,
            Err(ReserveError::AlreadyProcessed(_)) => duplicates += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(duplicates, 19);
    assert_eq!(t.engine.get_balance(1).await?.balance, 960);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_withdrawal_releases_once() -> Result<()> {
    let t = test_ledger_with_connections(8).await?;
    t.engine.replenish(1, 100).await?;
    t.engine.reserve(1, 40, 5, 9).await?;

    let mut tasks = JoinSet::new();
    for _ in 0..20 {
        let engine = t.engine.clone();
        tasks.spawn(async move { engine.withdraw(1, 40, 5, 9).await });
    }

    let mut succeeded = 0;
    let mut cancelled = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined? {
            Ok(account) => {
                assert_eq!(account.balance, 60);
                succeeded += 1;
            }
            Err(WithdrawError::AlreadyCancelled(_)) => cancelled += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(cancelled, 19);

    let balance = t.engine.get_balance(1).await?;
    assert_eq!(balance.balance, 60);
    assert_eq!(balance.reserved, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_credits_across_users() -> Result<()> {
    let t = test_ledger().await?;

    let mut tasks = JoinSet::new();
    for user_id in 1..=5 {
        for _ in 0..10 {
            let engine = t.engine.clone();
            tasks.spawn(async move { engine.replenish(user_id, user_id * 10).await });
        }
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    for user_id in 1..=5 {
        let balance = t.engine.get_balance(user_id).await?;
        assert_eq!(balance.balance, user_id * 100);
        assert_eq!(t.engine.history(user_id).await?.len(), 10);
    }

    let report = t.engine.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    assert_eq!(report.account_count, 5);
    assert_eq!(report.entry_count, 50);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_workload_conserves_balance() -> Result<()> {
    let t = test_ledger_with_connections(8).await?;
    t.engine.replenish(1, 300).await?;

    let mut tasks = JoinSet::new();
    for order_id in 0..30 {
        let engine = t.engine.clone();
        tasks.spawn(async move {
            if engine.reserve(1, 15, order_id, 2).await.is_ok() {
                engine.withdraw(1, 15, order_id, 2).await?;
            }
            engine.replenish(1, 5).await?;
            anyhow::Ok(())
        });
    }
    while let Some(joined) = tasks.join_next().await {
        joined??;
    }

    let balance = t.engine.get_balance(1).await?;
    assert!(balance.balance >= 0);
    assert_eq!(balance.reserved, 0);

    let report = t.engine.check_integrity().await?;
    assert!(report.is_healthy(), "issues: {:?}", report.issues);
    Ok(())
}
