use anyhow::{Context, Result};

use crate::domain::entities::column::ColumnRegistry;
use crate::domain::entities::row::{value_text, Row};

/// Writes `rows` as CSV: one header row with the column headers, then one record per row.
/// `edit` and `delete` columns are left out.
pub fn rows_to_csv(columns: &ColumnRegistry, rows: &[Row]) -> Result<Vec<u8>> {
    let exported: Vec<_> = columns
        .iter()
        .filter(|column| !column.is_action_column())
        .collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(exported.iter().map(|column| column.header.as_str()))
        .context("failed to write csv header")?;

    for row in rows {
        let record: Vec<String> = exported
            .iter()
            .map(|column| row.get(&column.key).map(value_text).unwrap_or_default())
            .collect();
        writer
            .write_record(&record)
            .context("failed to write csv record")?;
    }

    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush csv writer: {}", err.error()))
}
