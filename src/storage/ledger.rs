//! Ledger store: the append-only log of balance-affecting events.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteExecutor, SqliteRow};

use crate::domain::{
    Account, AccountAudit, Cents, EntryId, LedgerEntry, OrderRef, Period, ServiceTotal, UserId,
};

const ENTRY_COLUMNS: &str =
    "id, user_id, amount, service_id, order_id, is_hold, created_at, cancels_entry_id";

/// Debits whose order was reserved and then released, joined to that release.
/// Period membership is decided by the debit's timestamp.
const SETTLED_DEBITS: &str = r#"
    FROM ledger_entries d
    JOIN ledger_entries h
      ON h.user_id = d.user_id
     AND h.service_id = d.service_id
     AND h.order_id = d.order_id
     AND h.is_hold = 1
     AND h.cancels_entry_id IS NULL
    JOIN ledger_entries r
      ON r.cancels_entry_id = h.id
    WHERE d.is_hold = 0
      AND d.amount < 0
      AND d.service_id IS NOT NULL
      AND d.order_id IS NOT NULL
      AND substr(d.created_at, 1, 7) = ?
"#;

/// Append an entry. The store assigns the id and writes it back into `entry`.
pub async fn append<'e, E>(executor: E, entry: &mut LedgerEntry) -> Result<EntryId>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO ledger_entries (user_id, amount, service_id, order_id, is_hold, created_at, cancels_entry_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.user_id)
    .bind(entry.amount)
    .bind(entry.service_id)
    .bind(entry.order_id)
    .bind(entry.is_hold)
    .bind(entry.created_at.to_rfc3339())
    .bind(entry.cancels_entry_id)
    .execute(executor)
    .await
    .context("Failed to append ledger entry")?;

    entry.id = result.last_insert_rowid();
    Ok(entry.id)
}

/// Find the reservation debit (`is_hold = false`) or the hold (`is_hold = true`) of an order.
/// Releases are never returned here; use `find_release_of` for those.
pub async fn find_by_tuple<'e, E>(
    executor: E,
    order: OrderRef,
    is_hold: bool,
) -> Result<Option<LedgerEntry>>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        r#"
        SELECT {ENTRY_COLUMNS}
        FROM ledger_entries
        WHERE user_id = ? AND service_id = ? AND order_id = ? AND is_hold = ?
          AND cancels_entry_id IS NULL
        ORDER BY id
        LIMIT 1
        "#
    );

    let row = sqlx::query(&query)
        .bind(order.user_id)
        .bind(order.service_id)
        .bind(order.order_id)
        .bind(is_hold)
        .fetch_optional(executor)
        .await
        .context("Failed to find order entry")?;

    row.as_ref().map(row_to_entry).transpose()
}

/// Find the release that closes hold `entry_id`, if any.
pub async fn find_release_of<'e, E>(executor: E, entry_id: EntryId) -> Result<Option<LedgerEntry>>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE cancels_entry_id = ? ORDER BY id LIMIT 1"
    );

    let row = sqlx::query(&query)
        .bind(entry_id)
        .fetch_optional(executor)
        .await
        .context("Failed to find hold release")?;

    row.as_ref().map(row_to_entry).transpose()
}

/// Sum of every hold-side entry for a user. Releases are negative, so this
/// is the amount still held for open orders.
pub async fn sum_held_amount<'e, E>(executor: E, user_id: UserId) -> Result<Cents>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(amount), 0) as reserved
        FROM ledger_entries
        WHERE user_id = ? AND is_hold = 1
        "#,
    )
    .bind(user_id)
    .fetch_one(executor)
    .await
    .context("Failed to sum held amount")?;

    Ok(row.try_get("reserved")?)
}

/// Highest release id among orders settled in `period`, `None` if none were.
pub async fn max_watermark<'e, E>(executor: E, period: Period) -> Result<Option<EntryId>>
where
    E: SqliteExecutor<'e>,
{
    let query = format!("SELECT MAX(r.id) as watermark {SETTLED_DEBITS}");

    let row = sqlx::query(&query)
        .bind(period.timestamp_prefix())
        .fetch_one(executor)
        .await
        .context("Failed to compute report watermark")?;

    Ok(row.try_get("watermark")?)
}

/// Settled spend per service for `period`, ordered by service id.
pub async fn aggregate_by_service<'e, E>(executor: E, period: Period) -> Result<Vec<ServiceTotal>>
where
    E: SqliteExecutor<'e>,
{
    let query = format!(
        r#"
        SELECT d.service_id as service_id, SUM(-d.amount) as total, MAX(r.id) as last_entry_id
        {SETTLED_DEBITS}
        GROUP BY d.service_id
        ORDER BY d.service_id
        "#
    );

    let rows = sqlx::query(&query)
        .bind(period.timestamp_prefix())
        .fetch_all(executor)
        .await
        .context("Failed to aggregate settled orders by service")?;

    rows.iter()
        .map(|row| -> Result<ServiceTotal> {
            Ok(ServiceTotal {
                service_id: row.try_get("service_id")?,
                total: row.try_get("total")?,
                last_entry_id: row.try_get("last_entry_id")?,
            })
        })
        .collect()
}

/// All entries for a user in append order.
pub async fn list_for_user<'e, E>(executor: E, user_id: UserId) -> Result<Vec<LedgerEntry>>
where
    E: SqliteExecutor<'e>,
{
    let query =
        format!("SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE user_id = ? ORDER BY id");

    let rows = sqlx::query(&query)
        .bind(user_id)
        .fetch_all(executor)
        .await
        .context("Failed to list ledger entries")?;

    rows.iter().map(row_to_entry).collect()
}

/// Stored balance next to the ledger-derived balance and reserved amount, per account.
pub async fn audit_accounts<'e, E>(executor: E) -> Result<Vec<AccountAudit>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT
            a.id as id,
            a.balance as balance,
            COALESCE(SUM(CASE WHEN e.is_hold = 0 THEN e.amount ELSE 0 END), 0) as ledger_balance,
            COALESCE(SUM(CASE WHEN e.is_hold = 1 THEN e.amount ELSE 0 END), 0) as reserved
        FROM accounts a
        LEFT JOIN ledger_entries e ON e.user_id = a.id
        GROUP BY a.id, a.balance
        ORDER BY a.id
        "#,
    )
    .fetch_all(executor)
    .await
    .context("Failed to audit accounts")?;

    rows.iter()
        .map(|row| -> Result<AccountAudit> {
            Ok(AccountAudit {
                account: Account {
                    id: row.try_get("id")?,
                    balance: row.try_get("balance")?,
                },
                ledger_balance: row.try_get("ledger_balance")?,
                reserved: row.try_get("reserved")?,
            })
        })
        .collect()
}

/// Counts used by the integrity check: total entries, releases pointing at
/// something other than a hold, and holds released more than once.
pub async fn release_anomalies<'e, E>(executor: E) -> Result<(i64, i64, i64)>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        SELECT
            (SELECT COUNT(*) FROM ledger_entries) as entry_count,
            (SELECT COUNT(*)
               FROM ledger_entries r
              WHERE r.cancels_entry_id IS NOT NULL
                AND NOT EXISTS (
                    SELECT 1 FROM ledger_entries h
                     WHERE h.id = r.cancels_entry_id
                       AND h.is_hold = 1
                       AND h.cancels_entry_id IS NULL
                )) as orphan_releases,
            (SELECT COUNT(*) FROM (
                SELECT cancels_entry_id
                  FROM ledger_entries
                 WHERE cancels_entry_id IS NOT NULL
                 GROUP BY cancels_entry_id
                HAVING COUNT(*) > 1
            )) as over_released
        "#,
    )
    .fetch_one(executor)
    .await
    .context("Failed to check hold releases")?;

    Ok((
        row.try_get("entry_count")?,
        row.try_get("orphan_releases")?,
        row.try_get("over_released")?,
    ))
}

fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
    let created_at_str: String = row.try_get("created_at")?;

    Ok(LedgerEntry {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        service_id: row.try_get("service_id")?,
        order_id: row.try_get("order_id")?,
        is_hold: row.try_get::<i32, _>("is_hold")? != 0,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid created_at timestamp")?
            .with_timezone(&Utc),
        cancels_entry_id: row.try_get("cancels_entry_id")?,
    })
}
