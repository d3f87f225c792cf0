//! Report store: materialized report artifacts keyed by period and watermark.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteExecutor, SqliteRow};

use crate::domain::{EntryId, Period, ReportArtifact};

/// Find a stored artifact for `period` built at exactly `watermark`.
/// A `None` watermark matches artifacts built when nothing qualified.
pub async fn find<'e, E>(
    executor: E,
    period: Period,
    watermark: Option<EntryId>,
) -> Result<Option<ReportArtifact>>
where
    E: SqliteExecutor<'e>,
{
    // `IS` compares NULL to NULL as equal
    let row = sqlx::query(
        r#"
        SELECT id, month, year, created_at, file_path, last_transaction_id
        FROM reports
        WHERE year = ? AND month = ? AND last_transaction_id IS ?
        ORDER BY id
        LIMIT 1
        "#,
    )
    .bind(period.year())
    .bind(period.month())
    .bind(watermark)
    .fetch_optional(executor)
    .await
    .context("Failed to find report")?;

    row.as_ref().map(row_to_artifact).transpose()
}

/// Persist a new artifact. The store assigns the id and writes it back into `artifact`.
pub async fn insert<'e, E>(executor: E, artifact: &mut ReportArtifact) -> Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO reports (month, year, created_at, file_path, last_transaction_id)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(artifact.month)
    .bind(artifact.year)
    .bind(artifact.created_at.to_rfc3339())
    .bind(&artifact.file_path)
    .bind(artifact.last_transaction_id)
    .execute(executor)
    .await
    .context("Failed to save report")?;

    artifact.id = result.last_insert_rowid();
    Ok(artifact.id)
}

/// Every artifact generated for `period`, oldest first.
pub async fn list_for_period<'e, E>(executor: E, period: Period) -> Result<Vec<ReportArtifact>>
where
    E: SqliteExecutor<'e>,
{
    let rows = sqlx::query(
        r#"
        SELECT id, month, year, created_at, file_path, last_transaction_id
        FROM reports
        WHERE year = ? AND month = ?
        ORDER BY id
        "#,
    )
    .bind(period.year())
    .bind(period.month())
    .fetch_all(executor)
    .await
    .context("Failed to list reports")?;

    rows.iter().map(row_to_artifact).collect()
}

fn row_to_artifact(row: &SqliteRow) -> Result<ReportArtifact> {
    let created_at_str: String = row.try_get("created_at")?;

    Ok(ReportArtifact {
        id: row.try_get("id")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .context("Invalid created_at timestamp")?
            .with_timezone(&Utc),
        file_path: row.try_get("file_path")?,
        last_transaction_id: row.try_get("last_transaction_id")?,
    })
}
