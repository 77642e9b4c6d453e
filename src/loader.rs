//! Bulk Load Executor (BLE): drives the adapter to place each spool
//! file into its staging table, one transaction per table, and reports row
//! counts back to the director.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::info;

use crate::catalog;
use crate::database::DatabaseAdapter;
use crate::errors::Error;

/// Result of ingesting one spool file.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub table: &'static str,
    pub rows: u64,
}

/// Ingest every spool file into `schema`, in the catalog's parent-before-
/// child order. `spool_files` is the list PTC returned, `(table, path)`.
pub fn ingest_all(adapter: &dyn DatabaseAdapter, schema: &str, spool_files: &[(&'static str, std::path::PathBuf)]) -> Result<Vec<IngestReport>, Error> {
    let mut reports = Vec::with_capacity(spool_files.len());
    for table in catalog::TABLES {
        let Some((_, path)) = spool_files.iter().find(|(name, _)| *name == table.name) else {
            continue;
        };
        let rows = ingest_one(adapter, schema, table.name, table.columns, path)?;
        info!(schema, table = table.name, rows, "bulk-ingested spool file");
        reports.push(IngestReport { table: table.name, rows });
    }
    Ok(reports)
}

fn ingest_one(adapter: &dyn DatabaseAdapter, schema: &str, table: &str, columns: &'static [&'static str], path: &Path) -> Result<u64, Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(GzDecoder::new(file));
    adapter.bulk_ingest(schema, table, columns, &mut reader).map_err(|err| match err {
        Error::Database(source) => Error::BulkIngestFailure { table: table.to_string(), detail: source.to_string() },
        other => other,
    })
}
