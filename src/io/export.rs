use anyhow::Result;
use std::io::Write;

use crate::domain::ServiceTotal;

/// Write per-service totals as headerless `service_id,total` CSV rows.
/// Returns the number of rows written.
pub fn write_service_totals_csv<W: Write>(writer: W, totals: &[ServiceTotal]) -> Result<usize> {
    let mut csv_writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    let mut count = 0;
    for total in totals {
        csv_writer.write_record(&[total.service_id.to_string(), total.total.to_string()])?;
        count += 1;
    }

    csv_writer.flush()?;
    Ok(count)
}
