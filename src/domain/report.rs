use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, EntryId, ServiceId};

/// A calendar month a report is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    month: u32,
    year: i32,
}

impl Period {
    pub const MAX_YEAR: i32 = 9999;

    /// Returns `None` unless `month` is in 1..=12 and `year` in 0..=9999.
    pub fn new(month: u32, year: i32) -> Option<Self> {
        if (1..=12).contains(&month) && (0..=Self::MAX_YEAR).contains(&year) {
            Some(Self { month, year })
        } else {
            None
        }
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// The `YYYY-MM` prefix shared by every RFC 3339 timestamp inside this period.
    pub fn timestamp_prefix(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }

    pub fn containing(timestamp: DateTime<Utc>) -> Self {
        use chrono::Datelike;
        Self {
            month: timestamp.month(),
            year: timestamp.year(),
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.timestamp_prefix())
    }
}

/// Settled spend for one service within a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTotal {
    pub service_id: ServiceId,
    pub total: Cents,
    /// Newest ledger entry that contributed to this total
    pub last_entry_id: EntryId,
}

/// A materialized CSV of per-service totals.
/// Immutable once stored; the watermark decides whether it can be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub id: i64,
    pub month: u32,
    pub year: i32,
    pub created_at: DateTime<Utc>,
    pub file_path: String,
    pub last_transaction_id: Option<EntryId>,
}

impl ReportArtifact {
    pub fn new(period: Period, file_path: String, last_transaction_id: Option<EntryId>) -> Self {
        Self {
            id: 0, // Will be set by the report store
            month: period.month(),
            year: period.year(),
            created_at: Utc::now(),
            file_path,
            last_transaction_id,
        }
    }
}

/// Highest entry id across all service totals, `None` when nothing qualified.
pub fn report_watermark(totals: &[ServiceTotal]) -> Option<EntryId> {
    totals.iter().map(|t| t.last_entry_id).max()
}
