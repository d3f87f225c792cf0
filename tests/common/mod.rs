// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use holdbook::application::{ReportMaterializer, TransactionEngine};
use holdbook::domain::{Cents, LedgerEntry, OrderRef};
use holdbook::storage::{Repository, accounts, ledger};
use holdbook::LedgerConfig;
use tempfile::TempDir;

/// Engine, materializer and repository over a fresh database in a temp directory.
pub struct TestLedger {
    pub engine: TransactionEngine,
    pub reports: ReportMaterializer,
    pub repo: Repository,
    pub config: LedgerConfig,
    pub temp_dir: TempDir,
}

/// Helper to create a test ledger with a temporary database
pub async fn test_ledger() -> Result<TestLedger> {
    test_ledger_with_connections(LedgerConfig::DEFAULT_MAX_CONNECTIONS).await
}

pub async fn test_ledger_with_connections(max_connections: u32) -> Result<TestLedger> {
    let temp_dir = TempDir::new()?;
    let config = LedgerConfig::new(
        temp_dir.path().join("test.db"),
        temp_dir.path().join("reports"),
    )
    .with_max_connections(max_connections)
    .with_busy_timeout(Duration::from_secs(60));

    let repo = Repository::init(&config).await?;
    Ok(TestLedger {
        engine: TransactionEngine::new(repo.clone()),
        reports: ReportMaterializer::new(repo.clone(), &config.reports_dir),
        repo,
        config,
        temp_dir,
    })
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
}

/// Write a complete reserve + release sequence for `order` directly through the
/// stores, stamped at `at`. Used to place settled orders in past periods.
pub async fn settle_order_at(
    repo: &Repository,
    order: OrderRef,
    amount: Cents,
    at: DateTime<Utc>,
) -> Result<()> {
    let mut uow = repo.begin().await?;
    accounts::get_or_create(uow.conn(), order.user_id).await?;

    // Fund the order first so the account stays consistent with its ledger
    if amount > 0 {
        let mut credit = LedgerEntry::credit(order.user_id, amount).with_created_at(at);
        ledger::append(uow.conn(), &mut credit).await?;
    }

    let mut debit = LedgerEntry::reservation_debit(order, amount).with_created_at(at);
    let mut hold = LedgerEntry::hold(order, amount).with_created_at(at);
    ledger::append(uow.conn(), &mut debit).await?;
    ledger::append(uow.conn(), &mut hold).await?;
    let mut release = LedgerEntry::release_of(&hold).with_created_at(at);
    ledger::append(uow.conn(), &mut release).await?;

    uow.commit().await?;
    Ok(())
}

/// Replenish, reserve and withdraw in one go through the engine.
pub async fn settle_order(
    engine: &TransactionEngine,
    user_id: i64,
    amount: Cents,
    order_id: i64,
    service_id: i64,
) -> Result<()> {
    engine.replenish(user_id, amount.max(1)).await?;
    engine.reserve(user_id, amount, order_id, service_id).await?;
    engine.withdraw(user_id, amount, order_id, service_id).await?;
    Ok(())
}
