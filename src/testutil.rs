//! In-memory `DatabaseAdapter` for exercising the Load Strategy
//! Director, Bulk Load Executor and Metadata Registry without a live
//! Postgres. Schemas are `HashMap<String, HashMap<String, Vec<Row>>>`
//! guarded by a single mutex; good enough for the small fixtures these
//! tests run, not a model of Postgres's actual concurrency.

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::Mutex;

use crate::catalog::{self, Catalog};
use crate::database::{DatabaseAdapter, LoadHistoryRow, LoadStatus, MetadataRow};
use crate::encoder::{self, Row};
use crate::errors::Error;

const METADATA_COLUMNS: usize = 5;
const HISTORY_COLUMNS: usize = 8;

pub struct MockAdapter {
    schemas: Mutex<HashMap<String, HashMap<String, Vec<Row>>>>,
    next_history_id: Mutex<i64>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        MockAdapter { schemas: Mutex::new(HashMap::new()), next_history_id: Mutex::new(1) }
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test-only inspection hook: rows currently sitting in `schema.table`.
    pub fn rows(&self, schema: &str, table: &str) -> Vec<Row> {
        self.schemas.lock().unwrap().get(schema).and_then(|tables| tables.get(table)).cloned().unwrap_or_default()
    }

    pub fn schema_exists(&self, schema: &str) -> bool {
        self.schemas.lock().unwrap().contains_key(schema)
    }

    fn key_indices(table: &catalog::TableDef) -> Vec<usize> {
        table.primary_key.iter().map(|key| table.columns.iter().position(|c| c == key).expect("primary key column missing from table definition")).collect()
    }
}

impl DatabaseAdapter for MockAdapter {
    fn create_schema(&self, name: &str) -> Result<(), Error> {
        self.schemas.lock().unwrap().entry(name.to_string()).or_default();
        Ok(())
    }

    fn apply_table_definitions(&self, schema: &str, catalog: &Catalog) -> Result<(), Error> {
        let mut schemas = self.schemas.lock().unwrap();
        let tables = schemas.entry(schema.to_string()).or_default();
        for table in catalog.iter() {
            tables.entry(table.name.to_string()).or_default();
        }
        tables.entry(catalog::METADATA_TABLE.to_string()).or_default();
        tables.entry(catalog::LOAD_HISTORY_TABLE.to_string()).or_default();
        Ok(())
    }

    fn bulk_ingest(&self, schema: &str, table: &str, _columns: &[&str], source: &mut dyn BufRead) -> Result<u64, Error> {
        let mut count = 0u64;
        let mut schemas = self.schemas.lock().unwrap();
        let tables = schemas.entry(schema.to_string()).or_default();
        let rows = tables.entry(table.to_string()).or_default();
        let mut line = String::new();
        loop {
            line.clear();
            let read = source.read_line(&mut line).map_err(Error::Io)?;
            if read == 0 {
                break;
            }
            rows.push(encoder::parse_row(&line));
            count += 1;
        }
        Ok(count)
    }

    fn create_indexes(&self, _schema: &str, _catalog: &Catalog) -> Result<(), Error> {
        Ok(())
    }

    fn analyze(&self, _schema: &str) -> Result<(), Error> {
        Ok(())
    }

    fn drop_schema(&self, name: &str) -> Result<(), Error> {
        self.schemas.lock().unwrap().remove(name);
        Ok(())
    }

    fn rename_schema(&self, old: &str, new: &str) -> Result<(), Error> {
        let mut schemas = self.schemas.lock().unwrap();
        let tables = schemas.remove(old).ok_or_else(|| Error::CutoverFailure(format!("schema '{old}' does not exist")))?;
        schemas.insert(new.to_string(), tables);
        Ok(())
    }

    fn cutover(&self, production: &str, staging: &str, archive_name: &str) -> Result<(), Error> {
        let mut schemas = self.schemas.lock().unwrap();
        if let Some(tables) = schemas.remove(production) {
            schemas.insert(archive_name.to_string(), tables);
        }
        let staged = schemas.remove(staging).ok_or_else(|| Error::CutoverFailure(format!("staging schema '{staging}' does not exist")))?;
        schemas.insert(production.to_string(), staged);
        Ok(())
    }

    fn merge_table(&self, staging: &str, production: &str, table: &str) -> Result<u64, Error> {
        let def = catalog::find(table).unwrap_or_else(|| panic!("'{table}' is not a declared catalog table"));
        let mut schemas = self.schemas.lock().unwrap();
        let staging_rows = schemas.get(staging).and_then(|t| t.get(table)).cloned().unwrap_or_default();

        let production_tables = schemas.entry(production.to_string()).or_default();
        let production_rows = production_tables.entry(table.to_string()).or_default();

        if catalog::is_set_valued_child(table) {
            let account_idx = def.columns.iter().position(|c| *c == "protein_accession").expect("set-valued child tables key on protein_accession");
            let touched: std::collections::HashSet<_> = staging_rows.iter().map(|row| row[account_idx].clone()).collect();
            production_rows.retain(|row| !touched.contains(&row[account_idx]));
            let affected = staging_rows.len() as u64;
            production_rows.extend(staging_rows);
            Ok(affected)
        }
        else {
            let key_idx = Self::key_indices(def);
            let mut affected = 0u64;
            for incoming in staging_rows {
                let key: Vec<_> = key_idx.iter().map(|i| incoming[*i].clone()).collect();
                if let Some(existing) = production_rows.iter_mut().find(|row| key_idx.iter().map(|i| row[*i].clone()).collect::<Vec<_>>() == key) {
                    *existing = incoming;
                }
                else {
                    production_rows.push(incoming);
                }
                affected += 1;
            }
            Ok(affected)
        }
    }

    fn delete_deprecated(&self, staging: &str, production: &str) -> Result<u64, Error> {
        let mut schemas = self.schemas.lock().unwrap();
        let staying: std::collections::HashSet<_> = schemas.get(staging).and_then(|t| t.get("proteins")).into_iter().flatten().map(|row| row[0].clone()).collect();

        let mut removed = 0u64;
        if let Some(tables) = schemas.get_mut(production) {
            if let Some(proteins) = tables.get_mut("proteins") {
                let before = proteins.len();
                proteins.retain(|row| staying.contains(&row[0]));
                removed += (before - proteins.len()) as u64;
            }
            for table_name in ["sequences", "accessions", "genes", "keywords", "protein_to_go", "protein_to_taxonomy"] {
                if let Some(rows) = tables.get_mut(table_name) {
                    rows.retain(|row| staying.contains(&row[0]));
                }
            }
        }
        Ok(removed)
    }

    fn read_metadata(&self, schema: &str) -> Result<Option<MetadataRow>, Error> {
        let schemas = self.schemas.lock().unwrap();
        let Some(row) = schemas.get(schema).and_then(|t| t.get(catalog::METADATA_TABLE)).and_then(|rows| rows.last()) else {
            return Ok(None);
        };
        assert_eq!(row.len(), METADATA_COLUMNS, "metadata row has the wrong shape");
        Ok(Some(MetadataRow {
            version: row[0].clone().unwrap_or_default(),
            release_date: row[1].clone().unwrap_or_default(),
            load_timestamp: row[2].clone().unwrap_or_default(),
            swissprot_entry_count: row[3].clone().unwrap_or_default().parse().unwrap_or(0),
            trembl_entry_count: row[4].clone().unwrap_or_default().parse().unwrap_or(0),
        }))
    }

    fn write_metadata(&self, schema: &str, row: &MetadataRow) -> Result<(), Error> {
        let mut schemas = self.schemas.lock().unwrap();
        let tables = schemas.entry(schema.to_string()).or_default();
        let rows = tables.entry(catalog::METADATA_TABLE.to_string()).or_default();
        rows.retain(|existing| existing[0].as_deref() != Some(row.version.as_str()));
        rows.push(vec![
            Some(row.version.clone()),
            Some(row.release_date.clone()),
            Some(row.load_timestamp.clone()),
            Some(row.swissprot_entry_count.to_string()),
            Some(row.trembl_entry_count.to_string()),
        ]);
        Ok(())
    }

    fn insert_load_history(&self, schema: &str, row: &LoadHistoryRow) -> Result<i64, Error> {
        let id = {
            let mut next = self.next_history_id.lock().unwrap();
            let id = *next;
            *next += 1;
            id
        };
        let mut schemas = self.schemas.lock().unwrap();
        let tables = schemas.entry(schema.to_string()).or_default();
        let rows = tables.entry(catalog::LOAD_HISTORY_TABLE.to_string()).or_default();
        rows.push(vec![
            Some(id.to_string()),
            Some(row.run_id.clone()),
            Some(row.status.as_str().to_string()),
            Some(row.mode.clone()),
            Some(row.dataset.clone()),
            Some(row.start_time.clone()),
            None,
            None,
        ]);
        Ok(id)
    }

    fn update_load_history(&self, schema: &str, id: i64, status: LoadStatus, end_time: &str, error_message: Option<&str>) -> Result<(), Error> {
        let mut schemas = self.schemas.lock().unwrap();
        let rows = schemas.entry(schema.to_string()).or_default().entry(catalog::LOAD_HISTORY_TABLE.to_string()).or_default();
        let row = rows
            .iter_mut()
            .find(|row| row[0].as_deref() == Some(id.to_string().as_str()))
            .ok_or_else(|| Error::AdapterUnavailable(format!("no load_history row with id {id}")))?;
        assert_eq!(row.len(), HISTORY_COLUMNS, "load_history row has the wrong shape");
        row[2] = Some(status.as_str().to_string());
        row[6] = Some(end_time.to_string());
        row[7] = error_message.map(|m| m.to_string());
        Ok(())
    }

    fn recent_load_history(&self, schema: &str, limit: i64) -> Result<Vec<LoadHistoryRow>, Error> {
        let schemas = self.schemas.lock().unwrap();
        let Some(rows) = schemas.get(schema).and_then(|t| t.get(catalog::LOAD_HISTORY_TABLE)) else {
            return Ok(Vec::new());
        };
        let mut rows: Vec<_> = rows
            .iter()
            .map(|row| LoadHistoryRow {
                id: row[0].clone().unwrap_or_default().parse().unwrap_or(0),
                run_id: row[1].clone().unwrap_or_default(),
                status: match row[2].as_deref() {
                    Some("succeeded") => LoadStatus::Succeeded,
                    Some("cancelled") => LoadStatus::Cancelled,
                    Some("running") => LoadStatus::Running,
                    _ => LoadStatus::Failed,
                },
                mode: row[3].clone().unwrap_or_default(),
                dataset: row[4].clone().unwrap_or_default(),
                start_time: row[5].clone().unwrap_or_default(),
                end_time: row[6].clone(),
                error_message: row[7].clone(),
            })
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_ingest_parses_spool_lines_into_rows() {
        let adapter = MockAdapter::new();
        adapter.create_schema("staging_x").unwrap();
        let mut source = std::io::Cursor::new("9606\tHomo sapiens\tEukaryota\n10090\tMus musculus\t\\N\n".as_bytes());
        let count = adapter.bulk_ingest("staging_x", "taxonomy", &["ncbi_taxid", "scientific_name", "lineage"], &mut source).unwrap();
        assert_eq!(count, 2);
        assert_eq!(adapter.rows("staging_x", "taxonomy")[1][2], None);
    }

    #[test]
    fn cutover_renames_production_to_archive_and_staging_to_production() {
        let adapter = MockAdapter::new();
        adapter.create_schema("uniprot_public").unwrap();
        adapter.create_schema("uniprot_staging_2024_02").unwrap();
        adapter
            .schemas
            .lock()
            .unwrap()
            .get_mut("uniprot_public")
            .unwrap()
            .insert("proteins".to_string(), vec![vec![Some("P11111".to_string())]]);

        adapter.cutover("uniprot_public", "uniprot_staging_2024_02", "uniprot_archive_20240201").unwrap();

        assert!(adapter.schema_exists("uniprot_archive_20240201"));
        assert!(!adapter.schema_exists("uniprot_staging_2024_02"));
        assert!(adapter.schema_exists("uniprot_public"));
    }

    #[test]
    fn merge_table_upserts_key_based_tables_and_replaces_sets_for_child_tables() {
        let adapter = MockAdapter::new();
        adapter.create_schema("production").unwrap();
        adapter.create_schema("staging").unwrap();
        {
            let mut schemas = adapter.schemas.lock().unwrap();
            schemas.get_mut("production").unwrap().insert(
                "proteins".to_string(),
                vec![vec![Some("P11111".to_string()), Some("OLD_NAME".to_string())]],
            );
            schemas
                .get_mut("production")
                .unwrap()
                .insert("genes".to_string(), vec![vec![Some("P11111".to_string()), Some("GENEA".to_string()), Some("true".to_string())]]);
            schemas.get_mut("staging").unwrap().insert(
                "proteins".to_string(),
                vec![vec![Some("P11111".to_string()), Some("NEW_NAME".to_string())]],
            );
            schemas
                .get_mut("staging")
                .unwrap()
                .insert("genes".to_string(), vec![vec![Some("P11111".to_string()), Some("GENEB".to_string()), Some("true".to_string())]]);
        }

        adapter.merge_table("staging", "production", "proteins").unwrap();
        adapter.merge_table("staging", "production", "genes").unwrap();

        let proteins = adapter.rows("production", "proteins");
        assert_eq!(proteins.len(), 1);
        assert_eq!(proteins[0][1], Some("NEW_NAME".to_string()));

        let genes = adapter.rows("production", "genes");
        assert_eq!(genes.len(), 1);
        assert_eq!(genes[0][1], Some("GENEB".to_string()));
    }

    #[test]
    fn delete_deprecated_removes_proteins_and_children_missing_from_staging() {
        let adapter = MockAdapter::new();
        adapter.create_schema("production").unwrap();
        adapter.create_schema("staging").unwrap();
        {
            let mut schemas = adapter.schemas.lock().unwrap();
            schemas.get_mut("production").unwrap().insert(
                "proteins".to_string(),
                vec![vec![Some("P11111".to_string())], vec![Some("P22222".to_string())]],
            );
            schemas
                .get_mut("production")
                .unwrap()
                .insert("genes".to_string(), vec![vec![Some("P22222".to_string()), Some("GENEA".to_string())]]);
            schemas.get_mut("staging").unwrap().insert("proteins".to_string(), vec![vec![Some("P11111".to_string())]]);
        }

        let removed = adapter.delete_deprecated("staging", "production").unwrap();
        assert_eq!(removed, 1);
        assert_eq!(adapter.rows("production", "proteins").len(), 1);
        assert!(adapter.rows("production", "genes").is_empty());
    }
}
