//! Database Adapter (DA): the narrow capability interface the core depends
//! on. Nothing outside this module is allowed to hold a live database
//! connection; `postgres` is the reference implementation, and the top-level
//! `testutil` module holds an in-memory stand-in for exercising the Load
//! Strategy Director without Postgres.

pub mod postgres;
pub mod schema;

use std::io::BufRead;

use crate::catalog::Catalog;
use crate::errors::Error;

/// One row read from or written to `py_load_uniprot_metadata`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRow {
    pub version: String,
    pub release_date: String,
    pub load_timestamp: String,
    pub swissprot_entry_count: i64,
    pub trembl_entry_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl LoadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadStatus::Running => "running",
            LoadStatus::Succeeded => "succeeded",
            LoadStatus::Failed => "failed",
            LoadStatus::Cancelled => "cancelled",
        }
    }
}

/// A row in `load_history`. `id` is assigned by `insert_load_history` and fed
/// back into `update_load_history` when the run reaches a terminal state.
#[derive(Debug, Clone)]
pub struct LoadHistoryRow {
    pub id: i64,
    pub run_id: String,
    pub status: LoadStatus,
    pub mode: String,
    pub dataset: String,
    pub start_time: String,
    pub end_time: Option<String>,
    pub error_message: Option<String>,
}

/// Narrow capability contract the core depends on. Every method takes
/// `&self`, not `&mut self`: implementations own their interior mutability
/// (a connection pool, or a mutex around an in-memory map) so that a single
/// `dyn DatabaseAdapter` can be shared across the reader, the worker pool's
/// callers and the director without threading a unique borrow through them.
///
/// A generic "run this closure inside a transaction" method is deliberately
/// absent here: that shape is not object-safe, and this trait needs to be
/// usable as `Box<dyn DatabaseAdapter>` so alternate adapters can plug in
/// without touching the director. The two places that actually need grouped
/// atomic execution — the cutover rename and a per-table merge — are named
/// operations instead, each one a fixed transaction shape the implementation
/// is free to build however its backend does transactions.
pub trait DatabaseAdapter: Send + Sync {
    fn create_schema(&self, name: &str) -> Result<(), Error>;

    fn apply_table_definitions(&self, schema: &str, catalog: &Catalog) -> Result<(), Error>;

    /// Stream `columns`-shaped, tab-separated records from `source` into
    /// `schema.table` via the adapter's native bulk-load path. Row-by-row
    /// insertion is forbidden by contract; implementations must use a
    /// bulk protocol.
    fn bulk_ingest(&self, schema: &str, table: &str, columns: &[&str], source: &mut dyn BufRead) -> Result<u64, Error>;

    fn create_indexes(&self, schema: &str, catalog: &Catalog) -> Result<(), Error>;

    fn analyze(&self, schema: &str) -> Result<(), Error>;

    fn drop_schema(&self, name: &str) -> Result<(), Error>;

    /// Rename `old` to `new` as a single statement. Used directly by tests
    /// and by `cutover`'s own implementation.
    fn rename_schema(&self, old: &str, new: &str) -> Result<(), Error>;

    /// Atomic schema-swap cutover: rename the current
    /// production schema to `archive_name`, rename `staging` to
    /// `production`, all inside one transaction. If `production` does not
    /// yet exist (first-ever full load) the archive rename is skipped.
    fn cutover(&self, production: &str, staging: &str, archive_name: &str) -> Result<(), Error>;

    /// Merge one table from `staging` into `production`. For
    /// key-based tables this is an upsert keyed on the table's primary key;
    /// for set-valued child tables (`catalog::is_set_valued_child`) this
    /// deletes production rows whose `protein_accession` appears in staging
    /// and re-inserts the staging rows. Returns the number of rows affected
    /// in production. Runs inside one transaction.
    fn merge_table(&self, staging: &str, production: &str, table: &str) -> Result<u64, Error>;

    /// Delete `proteins` (and FK-cascading children) rows in `production`
    /// whose `primary_accession` is absent from `staging.proteins`. Used by
    /// the `hard-delete` deprecation policy. Returns the number removed.
    fn delete_deprecated(&self, staging: &str, production: &str) -> Result<u64, Error>;

    fn read_metadata(&self, schema: &str) -> Result<Option<MetadataRow>, Error>;

    fn write_metadata(&self, schema: &str, row: &MetadataRow) -> Result<(), Error>;

    fn insert_load_history(&self, schema: &str, row: &LoadHistoryRow) -> Result<i64, Error>;

    fn update_load_history(&self, schema: &str, id: i64, status: LoadStatus, end_time: &str, error_message: Option<&str>) -> Result<(), Error>;

    fn recent_load_history(&self, schema: &str, limit: i64) -> Result<Vec<LoadHistoryRow>, Error>;
}
