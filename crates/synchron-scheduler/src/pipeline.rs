//! Row data → header/record model → CSV file on disk.
//!
//! Ragged input never fails: short rows are padded with empty strings and
//! values past the header width are dropped.

use std::collections::HashMap;
use std::path::Path;

use synchron_sheets::Rows;
use tracing::debug;

use crate::error::SyncError;

/// One header column: synthetic field id (`col0`, `col1`, …) plus the literal
/// header text from the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderColumn {
    pub id: String,
    pub title: String,
}

/// A data row keyed by [`HeaderColumn::id`].
pub type Record = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<HeaderColumn>,
    pub records: Vec<Record>,
}

impl Table {
    /// Row 0 is the header; every later row becomes a record.
    pub fn from_rows(rows: Rows) -> Result<Self, SyncError> {
        let mut rows = rows.into_iter();
        let header_row = match rows.next() {
            Some(h) if !h.is_empty() => h,
            _ => return Err(SyncError::EmptyDataset),
        };

        let headers: Vec<HeaderColumn> = header_row
            .into_iter()
            .enumerate()
            .map(|(i, title)| HeaderColumn {
                id: format!("col{i}"),
                title,
            })
            .collect();

        let records: Vec<Record> = rows
            .map(|row| {
                let mut values = row.into_iter();
                headers
                    .iter()
                    .map(|h| (h.id.clone(), values.next().unwrap_or_default()))
                    .collect()
            })
            .collect();

        if records.is_empty() {
            return Err(SyncError::EmptyDataset);
        }

        Ok(Self { headers, records })
    }

    /// UTF-8, comma-delimited, standard quoting, literal header texts first.
    pub fn to_csv_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.headers.iter().map(|h| h.title.as_str()))?;
        for record in &self.records {
            writer.write_record(
                self.headers
                    .iter()
                    .map(|h| record.get(&h.id).map(String::as_str).unwrap_or("")),
            )?;
        }
        writer.into_inner().map_err(|e| e.into_error())
    }
}

/// Create the parent directory if needed and replace `path` with the table.
///
/// The bytes go to a sibling temp file first and are renamed into place, so a
/// failed write leaves the previous file intact.
pub async fn write_table(path: &Path, table: &Table) -> Result<(), SyncError> {
    let unwritable = |source: std::io::Error| SyncError::DestinationUnwritable {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(unwritable)?;
    }

    let bytes = table.to_csv_bytes().map_err(unwritable)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".synchron-tmp");

    if let Err(e) = tokio::fs::write(&tmp, &bytes).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(unwritable(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(unwritable(e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), records = table.records.len(), "csv written");
    Ok(())
}
