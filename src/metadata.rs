//! Metadata Registry (MR): release-version bookkeeping and run
//! history. A thin layer over the `DatabaseAdapter`'s metadata/history
//! operations — MR owns the *shape* of those two rows, DA owns storage.

use crate::database::{DatabaseAdapter, LoadHistoryRow, LoadStatus, MetadataRow};
use crate::errors::Error;

pub struct MetadataRegistry<'a> {
    adapter: &'a dyn DatabaseAdapter,
}

impl<'a> MetadataRegistry<'a> {
    pub fn new(adapter: &'a dyn DatabaseAdapter) -> Self {
        MetadataRegistry { adapter }
    }

    pub fn current_release(&self, schema: &str) -> Result<Option<MetadataRow>, Error> {
        self.adapter.read_metadata(schema)
    }

    pub fn record_release(
        &self,
        schema: &str,
        version: &str,
        release_date: &str,
        load_timestamp: &str,
        swissprot_entry_count: i64,
        trembl_entry_count: i64,
    ) -> Result<(), Error> {
        self.adapter.write_metadata(
            schema,
            &MetadataRow { version: version.to_string(), release_date: release_date.to_string(), load_timestamp: load_timestamp.to_string(), swissprot_entry_count, trembl_entry_count },
        )
    }

    /// Insert a `load_history` row with `status = running`, returning its id
    /// for the later `finish` call.
    pub fn start_run(&self, schema: &str, run_id: &str, mode: &str, dataset: &str, start_time: &str) -> Result<i64, Error> {
        self.adapter.insert_load_history(
            schema,
            &LoadHistoryRow {
                id: 0,
                run_id: run_id.to_string(),
                status: LoadStatus::Running,
                mode: mode.to_string(),
                dataset: dataset.to_string(),
                start_time: start_time.to_string(),
                end_time: None,
                error_message: None,
            },
        )
    }

    pub fn finish_run(&self, schema: &str, id: i64, status: LoadStatus, end_time: &str, error_message: Option<&str>) -> Result<(), Error> {
        self.adapter.update_load_history(schema, id, status, end_time, error_message)
    }

    pub fn recent_runs(&self, schema: &str, limit: i64) -> Result<Vec<LoadHistoryRow>, Error> {
        self.adapter.recent_load_history(schema, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockAdapter;

    #[test]
    fn records_a_release_and_reads_it_back_as_current() {
        let adapter = MockAdapter::new();
        adapter.create_schema("uniprot_public").unwrap();
        let mr = MetadataRegistry::new(&adapter);

        assert!(mr.current_release("uniprot_public").unwrap().is_none());
        mr.record_release("uniprot_public", "2024_03", "2024-03-01", "2024-03-02T00:00:00Z", 500_000, 200_000_000).unwrap();

        let current = mr.current_release("uniprot_public").unwrap().unwrap();
        assert_eq!(current.version, "2024_03");
        assert_eq!(current.swissprot_entry_count, 500_000);
    }

    #[test]
    fn a_run_moves_from_running_to_succeeded() {
        let adapter = MockAdapter::new();
        adapter.create_schema("uniprot_public").unwrap();
        let mr = MetadataRegistry::new(&adapter);

        let id = mr.start_run("uniprot_public", "run-1", "full", "swissprot", "2024-03-01T00:00:00Z").unwrap();
        mr.finish_run("uniprot_public", id, LoadStatus::Succeeded, "2024-03-01T01:00:00Z", None).unwrap();

        let runs = mr.recent_runs("uniprot_public", 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, LoadStatus::Succeeded);
    }
}
