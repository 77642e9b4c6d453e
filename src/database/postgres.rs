//! Reference `DatabaseAdapter` targeting PostgreSQL. Bulk ingest goes
//! through diesel's native `COPY ... FORMAT text` support; schema
//! management, index creation and the dynamic merge/cutover operations go
//! through `diesel::sql_query` because their table and schema names are
//! runtime strings the typed DSL in `schema` cannot express.

use std::io::BufRead;

use diesel::connection::SimpleConnection;
use diesel::pg::CopyFormat;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_types::Text;
use diesel::prelude::ExecuteCopyFromDsl;
use diesel::{Connection, ExpressionMethods, OptionalExtension, QueryDsl, QueryableByName, RunQueryDsl};

use crate::catalog::{self, Catalog, IndexKind, TableDef};
use crate::database::schema as s;
use crate::database::{DatabaseAdapter, LoadHistoryRow, LoadStatus, MetadataRow};
use crate::errors::Error;

pub type PgPool = Pool<ConnectionManager<diesel::PgConnection>>;

pub fn build_pool(database_url: &str) -> Result<PgPool, Error> {
    let manager = ConnectionManager::<diesel::PgConnection>::new(database_url);
    let pool = Pool::builder().build(manager)?;
    Ok(pool)
}

/// Wire diesel's query instrumentation hook into `tracing`, so every
/// statement this adapter issues shows up at `debug` level alongside the
/// rest of a run's spans.
pub fn install_instrumentation() {
    diesel::connection::set_default_instrumentation(|| {
        Some(Box::new(|event: diesel::connection::InstrumentationEvent<'_>| {
            if let diesel::connection::InstrumentationEvent::FinishQuery { query, .. } = event {
                tracing::debug!(query = %query, "executed query");
            }
        }))
    })
    .expect("failed to install diesel instrumentation hook");
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        PostgresAdapter { pool }
    }

    fn connection(&self) -> Result<PooledConnection<ConnectionManager<diesel::PgConnection>>, Error> {
        Ok(self.pool.get()?)
    }

    /// Run `body` with the connection's `search_path` pointed at `schema`,
    /// for the duration of one statement or one transaction.
    fn with_schema<T>(
        &self,
        schema: &str,
        body: impl FnOnce(&mut diesel::PgConnection) -> Result<T, diesel::result::Error>,
    ) -> Result<T, Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(&format!("SET search_path TO {}", quote_ident(schema)))?;
        Ok(body(&mut conn)?)
    }

    fn column_type_sql(table: &str, column: &str) -> &'static str {
        match (table, column) {
            ("taxonomy", "ncbi_taxid") => "bigint",
            ("proteins", "ncbi_taxid") | ("proteins", "sequence_length") => "integer",
            ("proteins", "molecular_weight") => "bigint",
            ("proteins", "created_date") | ("proteins", "modified_date") => "date",
            ("proteins", c) if c.ends_with("_data") => "jsonb",
            ("genes", "is_primary") => "boolean",
            ("protein_to_taxonomy", "ncbi_taxid") => "bigint",
            _ => "text",
        }
    }

    fn create_table_ddl(schema: &str, table: &TableDef) -> String {
        let columns = table
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(c), Self::column_type_sql(table.name, c)))
            .collect::<Vec<_>>()
            .join(",\n    ");
        let pk = table.primary_key.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\n    {},\n    PRIMARY KEY ({})\n)",
            quote_ident(schema),
            quote_ident(table.name),
            columns,
            pk
        );
        for fk in table.foreign_keys {
            let cols = fk.columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
            let ref_cols = fk.references_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
            ddl.push_str(&format!(
                ";\nALTER TABLE {}.{} ADD FOREIGN KEY ({}) REFERENCES {}.{} ({})",
                quote_ident(schema),
                quote_ident(table.name),
                cols,
                quote_ident(schema),
                quote_ident(fk.references_table),
                ref_cols
            ));
        }
        ddl
    }
}

impl DatabaseAdapter for PostgresAdapter {
    fn create_schema(&self, name: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(name)))?;
        Ok(())
    }

    fn apply_table_definitions(&self, schema: &str, catalog: &Catalog) -> Result<(), Error> {
        let mut conn = self.connection()?;
        for table in catalog.iter() {
            conn.batch_execute(&Self::create_table_ddl(schema, table))?;
        }
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                version text PRIMARY KEY,
                release_date text NOT NULL,
                load_timestamp text NOT NULL,
                swissprot_entry_count bigint NOT NULL,
                trembl_entry_count bigint NOT NULL
            )",
            quote_ident(schema),
            quote_ident(catalog::METADATA_TABLE)
        ))?;
        conn.batch_execute(&format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (
                id bigserial PRIMARY KEY,
                run_id text NOT NULL,
                status text NOT NULL,
                mode text NOT NULL,
                dataset text NOT NULL,
                start_time text NOT NULL,
                end_time text,
                error_message text
            )",
            quote_ident(schema),
            quote_ident(catalog::LOAD_HISTORY_TABLE)
        ))?;
        Ok(())
    }

    fn bulk_ingest(&self, schema: &str, table: &str, columns: &[&str], source: &mut dyn BufRead) -> Result<u64, Error> {
        self.with_schema(schema, |conn| copy_into(conn, table, columns, source)).map_err(|err| match err {
            Error::Database(source) => Error::BulkIngestFailure { table: table.to_string(), detail: source.to_string() },
            other => other,
        })
    }

    fn create_indexes(&self, schema: &str, catalog: &Catalog) -> Result<(), Error> {
        let mut conn = self.connection()?;
        for table in catalog.iter() {
            for index in table.indexes {
                let method = match index.kind {
                    IndexKind::BTree => "btree",
                    IndexKind::Gin => "gin",
                };
                let index_name = format!("{}_{}_{}_idx", schema, table.name, index.column);
                conn.batch_execute(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}.{} USING {} ({})",
                    quote_ident(&index_name),
                    quote_ident(schema),
                    quote_ident(table.name),
                    method,
                    quote_ident(index.column)
                ))?;
            }
        }
        Ok(())
    }

    fn analyze(&self, schema: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(&format!("ANALYZE {}", quote_ident(schema)))?;
        Ok(())
    }

    fn drop_schema(&self, name: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_ident(name)))?;
        Ok(())
    }

    fn rename_schema(&self, old: &str, new: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(&format!("ALTER SCHEMA {} RENAME TO {}", quote_ident(old), quote_ident(new)))?;
        Ok(())
    }

    fn cutover(&self, production: &str, staging: &str, archive_name: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.transaction(|conn| -> Result<(), diesel::result::Error> {
            let production_exists: bool = diesel::sql_query("SELECT EXISTS (SELECT 1 FROM information_schema.schemata WHERE schema_name = $1) AS exists")
                .bind::<Text, _>(production)
                .get_result::<Exists>(conn)?
                .exists;
            if production_exists {
                conn.batch_execute(&format!("ALTER SCHEMA {} RENAME TO {}", quote_ident(production), quote_ident(archive_name)))?;
            }
            conn.batch_execute(&format!("ALTER SCHEMA {} RENAME TO {}", quote_ident(staging), quote_ident(production)))?;
            Ok(())
        })
        .map_err(|source| Error::CutoverFailure(source.to_string()))
    }

    fn merge_table(&self, staging: &str, production: &str, table: &str) -> Result<u64, Error> {
        let def = catalog::find(table).unwrap_or_else(|| panic!("'{table}' is not a declared catalog table"));
        let mut conn = self.connection()?;
        let affected = conn
            .transaction(|conn| -> Result<u64, diesel::result::Error> {
                if catalog::is_set_valued_child(table) {
                    merge_set_valued_child(conn, staging, production, def)
                }
                else {
                    merge_key_based(conn, staging, production, def)
                }
            })
            .map_err(|source| Error::ConstraintViolation { table: table.to_string(), detail: source.to_string() })?;
        Ok(affected)
    }

    fn delete_deprecated(&self, staging: &str, production: &str) -> Result<u64, Error> {
        let mut conn = self.connection()?;
        let sql = format!(
            "DELETE FROM {production}.proteins p WHERE NOT EXISTS (
                SELECT 1 FROM {staging}.proteins s WHERE s.primary_accession = p.primary_accession
            )",
            production = quote_ident(production),
            staging = quote_ident(staging),
        );
        let affected = diesel::sql_query(sql).execute(&mut conn)?;
        Ok(affected as u64)
    }

    fn read_metadata(&self, schema: &str) -> Result<Option<MetadataRow>, Error> {
        self.with_schema(schema, |conn| {
            use s::py_load_uniprot_metadata::dsl::*;
            py_load_uniprot_metadata
                .order(load_timestamp.desc())
                .select((version, release_date, load_timestamp, swissprot_entry_count, trembl_entry_count))
                .first::<(String, String, String, i64, i64)>(conn)
                .optional()
        })
        .map(|row| {
            row.map(|(version, release_date, load_timestamp, swissprot_entry_count, trembl_entry_count)| MetadataRow {
                version,
                release_date,
                load_timestamp,
                swissprot_entry_count,
                trembl_entry_count,
            })
        })
    }

    fn write_metadata(&self, schema: &str, row: &MetadataRow) -> Result<(), Error> {
        self.with_schema(schema, |conn| {
            use s::py_load_uniprot_metadata::dsl::*;
            diesel::insert_into(py_load_uniprot_metadata)
                .values((
                    version.eq(&row.version),
                    release_date.eq(&row.release_date),
                    load_timestamp.eq(&row.load_timestamp),
                    swissprot_entry_count.eq(row.swissprot_entry_count),
                    trembl_entry_count.eq(row.trembl_entry_count),
                ))
                .on_conflict(version)
                .do_update()
                .set((
                    release_date.eq(&row.release_date),
                    load_timestamp.eq(&row.load_timestamp),
                    swissprot_entry_count.eq(row.swissprot_entry_count),
                    trembl_entry_count.eq(row.trembl_entry_count),
                ))
                .execute(conn)
        })?;
        Ok(())
    }

    fn insert_load_history(&self, schema: &str, row: &LoadHistoryRow) -> Result<i64, Error> {
        self.with_schema(schema, |conn| {
            use s::load_history::dsl::*;
            diesel::insert_into(load_history)
                .values((
                    run_id.eq(&row.run_id),
                    status.eq(row.status.as_str()),
                    mode.eq(&row.mode),
                    dataset.eq(&row.dataset),
                    start_time.eq(&row.start_time),
                ))
                .returning(id)
                .get_result::<i64>(conn)
        })
    }

    fn update_load_history(&self, schema: &str, row_id: i64, new_status: LoadStatus, end_time: &str, error_message: Option<&str>) -> Result<(), Error> {
        self.with_schema(schema, |conn| {
            use s::load_history::dsl::*;
            diesel::update(load_history.filter(id.eq(row_id)))
                .set((status.eq(new_status.as_str()), end_time.eq(end_time), error_message.eq(error_message)))
                .execute(conn)
        })?;
        Ok(())
    }

    fn recent_load_history(&self, schema: &str, limit: i64) -> Result<Vec<LoadHistoryRow>, Error> {
        self.with_schema(schema, |conn| {
            use s::load_history::dsl::*;
            load_history
                .order(id.desc())
                .limit(limit)
                .select((id, run_id, status, mode, dataset, start_time, end_time, error_message))
                .load::<(i64, String, String, String, String, String, Option<String>, Option<String>)>(conn)
        })
        .map(|rows| {
            rows.into_iter()
                .map(|(row_id, run_id, status, mode, dataset, start_time, end_time, error_message)| LoadHistoryRow {
                    id: row_id,
                    run_id,
                    status: parse_status(&status),
                    mode,
                    dataset,
                    start_time,
                    end_time,
                    error_message,
                })
                .collect()
        })
    }
}

fn parse_status(value: &str) -> LoadStatus {
    match value {
        "running" => LoadStatus::Running,
        "succeeded" => LoadStatus::Succeeded,
        "cancelled" => LoadStatus::Cancelled,
        _ => LoadStatus::Failed,
    }
}

#[derive(QueryableByName)]
struct Exists {
    #[diesel(sql_type = diesel::sql_types::Bool)]
    exists: bool,
}

/// Dispatch a COPY onto the statically-declared `schema::<table>::table` the
/// diesel DSL understands; runtime table names otherwise have no typed
/// counterpart to hand `copy_from`.
fn copy_into(conn: &mut diesel::PgConnection, table: &str, columns: &[&str], source: &mut dyn BufRead) -> Result<u64, diesel::result::Error> {
    let _ = columns; // column order is fixed by the catalog and matches the table! declarations below
    let source = std::cell::RefCell::new(source);
    let action = |copy: &mut dyn std::io::Write| -> Result<(), diesel::result::Error> {
        std::io::copy(&mut *source.borrow_mut(), copy).map_err(|err| diesel::result::Error::DeserializationError(Box::new(err)))?;
        Ok(())
    };
    let affected = match table {
        "taxonomy" => diesel::copy_from(s::taxonomy::table).from_raw_data(s::taxonomy::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "proteins" => diesel::copy_from(s::proteins::table).from_raw_data(s::proteins::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "sequences" => diesel::copy_from(s::sequences::table).from_raw_data(s::sequences::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "accessions" => diesel::copy_from(s::accessions::table).from_raw_data(s::accessions::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "genes" => diesel::copy_from(s::genes::table).from_raw_data(s::genes::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "keywords" => diesel::copy_from(s::keywords::table).from_raw_data(s::keywords::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "protein_to_go" => diesel::copy_from(s::protein_to_go::table).from_raw_data(s::protein_to_go::table, action).with_format(CopyFormat::Text).execute(conn)?,
        "protein_to_taxonomy" => diesel::copy_from(s::protein_to_taxonomy::table).from_raw_data(s::protein_to_taxonomy::table, action).with_format(CopyFormat::Text).execute(conn)?,
        other => panic!("'{other}' has no bulk_ingest dispatch arm"),
    };
    Ok(affected as u64)
}

fn merge_key_based(conn: &mut diesel::PgConnection, staging: &str, production: &str, table: &TableDef) -> Result<u64, diesel::result::Error> {
    let key_cols = table.primary_key.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let updatable: Vec<_> = table.columns.iter().filter(|c| !table.primary_key.contains(c)).collect();
    let all_cols = column_list(table);

    let set_clause = updatable.iter().map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(c))).collect::<Vec<_>>().join(", ");

    let sql = if set_clause.is_empty() {
        format!(
            "INSERT INTO {production}.{table} ({cols})
             SELECT {cols} FROM {staging}.{table}
             ON CONFLICT ({key}) DO NOTHING",
            production = quote_ident(production),
            staging = quote_ident(staging),
            table = quote_ident(table.name),
            cols = all_cols,
            key = key_cols,
        )
    }
    else {
        format!(
            "INSERT INTO {production}.{table} ({cols})
             SELECT {cols} FROM {staging}.{table}
             ON CONFLICT ({key}) DO UPDATE SET {set_clause}",
            production = quote_ident(production),
            staging = quote_ident(staging),
            table = quote_ident(table.name),
            cols = all_cols,
            key = key_cols,
        )
    };
    let affected = diesel::sql_query(sql).execute(conn)?;
    Ok(affected as u64)
}

/// Set-valued child merge: delete every production row whose
/// `protein_accession` appears in staging, then insert all staging rows.
/// Chosen over per-row upsert because these tables model a set that can
/// shrink, not just grow.
fn merge_set_valued_child(conn: &mut diesel::PgConnection, staging: &str, production: &str, table: &TableDef) -> Result<u64, diesel::result::Error> {
    let cols = column_list(table);
    let delete_sql = format!(
        "DELETE FROM {production}.{table} WHERE protein_accession IN (SELECT DISTINCT protein_accession FROM {staging}.{table})",
        production = quote_ident(production),
        staging = quote_ident(staging),
        table = quote_ident(table.name),
    );
    diesel::sql_query(delete_sql).execute(conn)?;

    let insert_sql = format!(
        "INSERT INTO {production}.{table} ({cols}) SELECT {cols} FROM {staging}.{table}",
        production = quote_ident(production),
        staging = quote_ident(staging),
        table = quote_ident(table.name),
        cols = cols,
    );
    let affected = diesel::sql_query(insert_sql).execute(conn)?;
    Ok(affected as u64)
}

fn column_list(table: &TableDef) -> String {
    table.columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}
