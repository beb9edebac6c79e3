//! Loading raw records into the source relation.
//!
//! The raw table keys rows by `customer_id`, an INTEGER column. A batch is
//! accepted only if every record has the raw shape and every key casts to a
//! non-null integer not already present (in the table or earlier in the
//! batch). Keys are compared after the cast, so `1`, `"01"` and `1.0` are
//! the same customer. A rejected batch writes nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::api::logs::{log_detail, log_info, log_success, LogLevel};
use crate::error::{CastError, IngestError, IngestResult};
use crate::models::{RawSubscriptionRecord, SourceRef, RAW_COLUMNS};
use crate::parser::load_raw_file;
use crate::transform::cast::{cast_integer, CastContext};
use crate::validation::validate_raw_record;
use crate::warehouse::{RelationInfo, Warehouse};

/// How a batch is combined with existing raw rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Insert alongside existing rows
    #[default]
    Append,
    /// Truncate the table first
    Replace,
}

/// Outcome of an ingest
#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    /// Rows inserted by this batch
    pub inserted: usize,
    /// Relation after the insert
    pub table: RelationInfo,
}

/// Primary key of a record, as stored in the INTEGER key column.
fn key_of(index: usize, record: &RawSubscriptionRecord) -> Result<Option<i32>, CastError> {
    cast_integer(&record.customer_id, CastContext::new(index, "customer_id"))
}

/// Check a batch against the raw table constraints.
pub fn check_batch(existing: &[RawSubscriptionRecord], batch: &[RawSubscriptionRecord]) -> IngestResult<()> {
    let mut seen: HashSet<i32> = existing
        .iter()
        .enumerate()
        .filter_map(|(i, record)| key_of(i, record).ok().flatten())
        .collect();

    for (index, record) in batch.iter().enumerate() {
        validate_raw_record(&record.to_value())
            .map_err(|errors| IngestError::InvalidRecord { index, errors })?;

        let key = key_of(index, record)
            .map_err(|source| IngestError::InvalidKey { index, source })?
            .ok_or(IngestError::NullKey { index })?;
        if !seen.insert(key) {
            return Err(IngestError::DuplicateKey { index, key: key.to_string() });
        }
    }

    Ok(())
}

/// Insert a batch of raw records into the source relation.
pub fn ingest(
    warehouse: &Warehouse,
    source: &SourceRef,
    records: Vec<RawSubscriptionRecord>,
    mode: IngestMode,
) -> IngestResult<IngestSummary> {
    let relation = source.relation();

    let existing: Vec<RawSubscriptionRecord> = match mode {
        IngestMode::Append if warehouse.exists(&relation) => warehouse.read_rows(&relation)?,
        _ => Vec::new(),
    };

    check_batch(&existing, &records)?;

    let inserted = records.len();
    let table = match mode {
        IngestMode::Append => warehouse.append_rows(&relation, &RAW_COLUMNS, records)?,
        IngestMode::Replace => warehouse.write_table(&relation, &RAW_COLUMNS, &records, None)?,
    };

    Ok(IngestSummary { inserted, table })
}

/// Parse a JSON or CSV file and ingest its records.
pub fn ingest_file(
    warehouse: &Warehouse,
    source: &SourceRef,
    path: &Path,
    mode: IngestMode,
) -> IngestResult<IngestSummary> {
    log_info(format!("Reading {}", path.display()));
    let input = load_raw_file(path)?;
    if !input.headers.is_empty() {
        log_info(format!("Columns: {}", input.headers.join(", ")));
        for header in input.headers.iter().filter(|h| !RAW_COLUMNS.contains(&h.as_str())) {
            log_detail(LogLevel::Warning, format!("'{}' is not a raw column, ignored", header));
        }
    }
    if let (Some(encoding), Some(delimiter)) = (&input.encoding, input.delimiter) {
        log_info(format!("Detected encoding {} and delimiter {:?}", encoding, delimiter));
    }
    log_success(format!("Read {} {} records", input.records.len(), input.format));

    let summary = ingest(warehouse, source, input.records, mode)?;
    log_success(format!(
        "Ingested {} records into {} ({} rows total)",
        summary.inserted, summary.table.relation, summary.table.row_count
    ));
    Ok(summary)
}
