use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::{Period, ReportArtifact, report_watermark};
use crate::io::export::write_service_totals_csv;
use crate::storage::{Repository, ledger, reports};

use super::ReportError;

/// Produces monthly per-service CSV reports and reuses them while the
/// underlying settled orders stay the same.
///
/// Takes no locks. Two concurrent calls for the same period may both miss the
/// cache and write identical artifacts; the content is a pure function of the
/// watermark, so either one is correct.
#[derive(Clone)]
pub struct ReportMaterializer {
    repo: Repository,
    reports_dir: PathBuf,
}

impl ReportMaterializer {
    pub fn new(repo: Repository, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo,
            reports_dir: reports_dir.into(),
        }
    }

    /// Return the report for `month`/`year`, generating a new artifact only
    /// when an order in that period has been settled since the last one.
    #[instrument(skip(self))]
    pub async fn generate_report(
        &self,
        month: u32,
        year: i32,
    ) -> Result<ReportArtifact, ReportError> {
        let period = Period::new(month, year).ok_or(ReportError::InvalidPeriod { month, year })?;
        let pool = self.repo.pool();

        let watermark = ledger::max_watermark(pool, period).await?;
        if let Some(artifact) = reports::find(pool, period, watermark).await? {
            debug!(?watermark, path = %artifact.file_path, "Report cache hit");
            return Ok(artifact);
        }

        let totals = ledger::aggregate_by_service(pool, period).await?;
        // Taken from what was aggregated, in case a settlement landed in between
        let watermark = report_watermark(&totals);

        let mut contents = Vec::new();
        write_service_totals_csv(&mut contents, &totals)?;

        tokio::fs::create_dir_all(&self.reports_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create reports directory {}",
                    self.reports_dir.display()
                )
            })?;
        let file_path = self.reports_dir.join(format!("{}.csv", Uuid::new_v4()));
        tokio::fs::write(&file_path, &contents)
            .await
            .with_context(|| format!("Failed to write report {}", file_path.display()))?;

        let mut artifact =
            ReportArtifact::new(period, file_path.display().to_string(), watermark);
        if let Err(err) = reports::insert(pool, &mut artifact).await {
            let _ = tokio::fs::remove_file(&file_path).await;
            return Err(err.into());
        }

        info!(
            ?watermark,
            services = totals.len(),
            path = %artifact.file_path,
            "Generated report"
        );
        Ok(artifact)
    }

    /// Every artifact generated so far for `month`/`year`, oldest first.
    pub async fn list_reports(
        &self,
        month: u32,
        year: i32,
    ) -> Result<Vec<ReportArtifact>, ReportError> {
        let period = Period::new(month, year).ok_or(ReportError::InvalidPeriod { month, year })?;
        Ok(reports::list_for_period(self.repo.pool(), period).await?)
    }
}
