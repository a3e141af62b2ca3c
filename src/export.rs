//! CSV reports of raw collections.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::ValueEnum;
use serde_json::Value;
use tracing::info;

use crate::{
    error::StoreError,
    store::{fetch_collection, Collection, RecordStore, REVENUE_PATH},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportKind {
    Users,
    Properties,
    Transactions,
    Revenue,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Users => "users",
            ExportKind::Properties => "properties",
            ExportKind::Transactions => "transactions",
            ExportKind::Revenue => "revenue",
        }
    }

    fn path(&self) -> &'static str {
        match self {
            ExportKind::Users => Collection::Users.path(),
            ExportKind::Properties => Collection::Property.path(),
            ExportKind::Transactions => Collection::Transactions.path(),
            ExportKind::Revenue => REVENUE_PATH,
        }
    }

    /// `houselook_<kind>_report_<YYYY-MM-DD>.csv`
    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("houselook_{}_report_{}.csv", self.as_str(), date.format("%Y-%m-%d"))
    }
}

/// `(key, record)` pairs of the collection behind `kind`
pub async fn export_rows(
    store: &dyn RecordStore,
    kind: ExportKind,
) -> Result<Vec<(String, Value)>, StoreError> {
    fetch_collection(store, kind.path()).await
}

/// Renders rows as CSV.
///
/// Columns are `id` followed by the keys of the first record; scalar
/// records get a single `value` column. Nested values are written as
/// compact JSON. Empty input renders as an empty string.
pub fn to_csv(rows: &[(String, Value)]) -> String {
    let Some((_, first)) = rows.first() else {
        return String::new();
    };

    let columns: Vec<String> = match first {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => vec!["value".to_string()],
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        std::iter::once("id")
            .chain(columns.iter().map(String::as_str))
            .map(escape)
            .collect::<Vec<_>>()
            .join(","),
    );

    for (id, record) in rows {
        let mut cells = vec![escape(id)];
        for column in &columns {
            let value = match record {
                Value::Object(map) => map.get(column),
                scalar => Some(scalar),
            };
            cells.push(escape(&cell(value)));
        }
        lines.push(cells.join(","));
    }

    lines.join("\n")
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Quotes fields containing a delimiter, quote or line break
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Writes the report for `kind` and returns where it went.
///
/// Without `out` the file lands in the working directory under its default name.
pub async fn write_report(
    store: &dyn RecordStore,
    kind: ExportKind,
    out: Option<PathBuf>,
) -> anyhow::Result<PathBuf> {
    let rows = export_rows(store, kind)
        .await
        .with_context(|| format!("Failed to export {} data", kind.as_str()))?;

    let path = out.unwrap_or_else(|| PathBuf::from(kind.file_name(Utc::now().date_naive())));
    tokio::fs::write(&path, to_csv(&rows))
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!("💾 Exported {} {} rows to {}", rows.len(), kind.as_str(), path.display());
    Ok(path)
}
