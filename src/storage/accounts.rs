//! Account store: one balance row per user.

use anyhow::{Context, Result, anyhow};
use sqlx::Row;
use sqlx::sqlite::{SqliteExecutor, SqliteRow};

use crate::domain::{Account, Cents, UserId};

/// Get an account by user id.
pub async fn get<'e, E>(executor: E, id: UserId) -> Result<Option<Account>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query("SELECT id, balance FROM accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
        .context("Failed to fetch account")?;

    row.as_ref().map(row_to_account).transpose()
}

/// Get an account, creating it with a zero balance if absent.
pub async fn get_or_create<'e, E>(executor: E, id: UserId) -> Result<Account>
where
    E: SqliteExecutor<'e>,
{
    // Upsert so the statement is a write and claims the write lock up front
    let row = sqlx::query(
        r#"
        INSERT INTO accounts (id, balance)
        VALUES (?, 0)
        ON CONFLICT(id) DO UPDATE SET balance = balance
        RETURNING id, balance
        "#,
    )
    .bind(id)
    .fetch_one(executor)
    .await
    .context("Failed to create account")?;

    row_to_account(&row)
}

/// Take the exclusive lock on an account for the rest of the unit of work.
/// Returns `None` if the account does not exist.
///
/// The no-op update is what acquires the lock: SQLite grants a single writer,
/// so concurrent lockers (in this process or any other sharing the file)
/// block in the busy handler until the holder commits or rolls back.
pub async fn lock_for_update<'e, E>(executor: E, id: UserId) -> Result<Option<Account>>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = balance
        WHERE id = ?
        RETURNING id, balance
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("Failed to lock account")?;

    row.as_ref().map(row_to_account).transpose()
}

/// Add `delta` to the balance and return the updated row.
/// The caller must hold the lock from `lock_for_update`.
pub async fn apply_delta<'e, E>(executor: E, id: UserId, delta: Cents) -> Result<Account>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        UPDATE accounts
        SET balance = balance + ?
        WHERE id = ?
        RETURNING id, balance
        "#,
    )
    .bind(delta)
    .bind(id)
    .fetch_optional(executor)
    .await
    .context("Failed to update account balance")?;

    row.as_ref()
        .map(row_to_account)
        .transpose()?
        .ok_or_else(|| anyhow!("Account not found: {}", id))
}

/// List all accounts ordered by id.
pub async fn list<'e, E>(executor: E) -> Result<Vec<Account>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query("SELECT id, balance FROM accounts ORDER BY id")
        .fetch_all(executor)
        .await
        .context("Failed to list accounts")?;

    rows.iter().map(row_to_account).collect()
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        balance: row
            .try_get("balance")
            .context("Account balance is not an integer")?,
    })
}
