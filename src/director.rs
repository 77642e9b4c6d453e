//! Load Strategy Director (LSD): orchestrates one run end to end,
//! picking the full-load (atomic schema swap) or delta-load (stage-then-
//! merge) sequence. Every DA call happens on this thread; the only
//! parallelism in a run lives inside `pipeline::run`.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog;
use crate::config::{DeprecationPolicy, Settings};
use crate::database::{DatabaseAdapter, LoadStatus};
use crate::loader;
use crate::metadata::MetadataRegistry;
use crate::model::Profile;
use crate::pipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Full,
    Delta,
}

impl Mode {
    fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::Delta => "delta",
        }
    }
}

pub struct RunRequest<R> {
    pub mode: Mode,
    pub dataset: String,
    pub profile: Profile,
    pub input: R,
}

fn staging_schema_name(production: &str, release_tag: &str) -> String {
    format!("{production}_staging_{release_tag}")
}

fn archive_schema_name(production: &str) -> String {
    format!("{production}_archive_{}", Utc::now().format("%Y%m%d%H%M%S"))
}

/// Drive one run to completion, updating `load_history` and returning the
/// originating error (not swallowing it) on any failure.
pub fn run<R>(adapter: &dyn DatabaseAdapter, settings: &Settings, request: RunRequest<R>, cancel: Option<Arc<AtomicBool>>) -> Result<(), crate::errors::Error>
where
    R: BufRead + Send + 'static,
{
    let RunRequest { mode, dataset, profile, input } = request;
    let run_id = Uuid::new_v4().to_string();
    let start_time = Utc::now().to_rfc3339();

    match mode {
        Mode::Full => run_full(adapter, settings, input, profile, &run_id, &dataset, &start_time, cancel),
        Mode::Delta => run_delta(adapter, settings, input, profile, &run_id, &dataset, &start_time, cancel),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_full<R>(
    adapter: &dyn DatabaseAdapter,
    settings: &Settings,
    input: R,
    profile: Profile,
    run_id: &str,
    dataset: &str,
    start_time: &str,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(), crate::errors::Error>
where
    R: BufRead + Send + 'static,
{
    let production = &settings.production_schema;
    let spool_dir = settings.spool_dir.join(run_id);
    let mr = MetadataRegistry::new(adapter);

    // The release tag isn't known until PTC reads the root element, but the
    // staging schema name needs to embed it, so the transform runs against a
    // provisional staging schema named after the run id and gets renamed
    // once the tag is known. This keeps the staging schema's naming contract
    // without requiring the caller to pre-parse the input.
    let provisional_staging = format!("{production}_staging_{run_id}");
    adapter.create_schema(&provisional_staging)?;
    adapter.apply_table_definitions(&provisional_staging, &catalog::TABLES)?;

    // The running row is inserted into staging, not production: on a
    // first-ever full load `production` doesn't exist yet, and on every
    // later one the cutover renames this schema straight into production,
    // carrying the row along instead of stranding it "running" in the
    // schema that gets archived.
    let history_id = mr.start_run(&provisional_staging, run_id, Mode::Full.as_str(), dataset, start_time)?;

    let outcome = match pipeline::run(input, profile, settings.worker_count, settings.queue_bound, &spool_dir, cancel) {
        Ok(outcome) => outcome,
        Err(err) => {
            adapter.drop_schema(&provisional_staging).ok();
            return Err(err);
        }
    };

    let staging = staging_schema_name(production, &outcome.release_tag);
    if staging != provisional_staging {
        adapter.rename_schema(&provisional_staging, &staging)?;
    }

    if let Err(err) = ingest_and_finalize_full(adapter, settings, &outcome, &staging) {
        adapter.drop_schema(&staging).ok();
        return Err(err);
    }

    let end_time = Utc::now().to_rfc3339();
    mr.finish_run(production, history_id, LoadStatus::Succeeded, &end_time, None)?;

    std::fs::remove_dir_all(&spool_dir).ok();
    Ok(())
}

fn ingest_and_finalize_full(adapter: &dyn DatabaseAdapter, settings: &Settings, outcome: &pipeline::Outcome, staging: &str) -> Result<(), crate::errors::Error> {
    let production = &settings.production_schema;
    loader::ingest_all(adapter, staging, &outcome.spool_files)?;

    adapter.create_indexes(staging, &catalog::TABLES)?;
    adapter.analyze(staging)?;

    let swissprot_count = outcome.entries_processed as i64;
    let timestamp = Utc::now().to_rfc3339();
    let metadata = crate::database::MetadataRow {
        version: outcome.release_tag.clone(),
        release_date: timestamp.clone(),
        load_timestamp: timestamp,
        swissprot_entry_count: swissprot_count,
        trembl_entry_count: 0,
    };
    adapter.write_metadata(staging, &metadata)?;

    let archive = archive_schema_name(production);
    warn!(archive, "cutover moves production's load_history into the archive schema, run history before this point becomes unreachable from production");
    adapter.cutover(production, staging, &archive).map_err(|err| {
        warn!(error = %err, "cutover failed, production left untouched");
        err
    })?;

    info!(release_tag = %metadata.version, archive, "full load cutover complete");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_delta<R>(
    adapter: &dyn DatabaseAdapter,
    settings: &Settings,
    input: R,
    profile: Profile,
    run_id: &str,
    dataset: &str,
    start_time: &str,
    cancel: Option<Arc<AtomicBool>>,
) -> Result<(), crate::errors::Error>
where
    R: BufRead + Send + 'static,
{
    let production = &settings.production_schema;
    let staging = format!("{production}_staging_{run_id}");
    let spool_dir = settings.spool_dir.join(run_id);
    let mr = MetadataRegistry::new(adapter);

    // Delta loads only run against an existing production schema, so the
    // running row can go straight there instead of riding through a rename.
    let history_id = mr.start_run(production, run_id, Mode::Delta.as_str(), dataset, start_time)?;

    adapter.create_schema(&staging)?;
    adapter.apply_table_definitions(&staging, &catalog::TABLES)?;

    let outcome = match pipeline::run(input, profile, settings.worker_count, settings.queue_bound, &spool_dir, cancel) {
        Ok(outcome) => outcome,
        Err(err) => {
            adapter.drop_schema(&staging).ok();
            let end_time = Utc::now().to_rfc3339();
            mr.finish_run(production, history_id, LoadStatus::Failed, &end_time, Some(&err.to_string())).ok();
            return Err(err);
        }
    };

    if let Err(err) = merge_delta(adapter, settings, &outcome, &staging) {
        adapter.drop_schema(&staging).ok();
        let end_time = Utc::now().to_rfc3339();
        mr.finish_run(production, history_id, LoadStatus::Failed, &end_time, Some(&err.to_string())).ok();
        return Err(err);
    }

    adapter.drop_schema(&staging)?;
    std::fs::remove_dir_all(&spool_dir).ok();

    let end_time = Utc::now().to_rfc3339();
    mr.finish_run(production, history_id, LoadStatus::Succeeded, &end_time, None)?;
    Ok(())
}

fn merge_delta(adapter: &dyn DatabaseAdapter, settings: &Settings, outcome: &pipeline::Outcome, staging: &str) -> Result<(), crate::errors::Error> {
    let production = &settings.production_schema;
    loader::ingest_all(adapter, staging, &outcome.spool_files)?;

    // parents before children
    for table in catalog::TABLES {
        let affected = adapter.merge_table(staging, production, table.name)?;
        info!(table = table.name, affected, "merged staging into production");
    }

    if settings.deprecation_policy == DeprecationPolicy::HardDelete {
        let removed = adapter.delete_deprecated(staging, production)?;
        info!(removed, "hard-deleted proteins absent from new staging input");
    }

    let timestamp = Utc::now().to_rfc3339();
    let metadata = crate::database::MetadataRow {
        version: outcome.release_tag.clone(),
        release_date: timestamp.clone(),
        load_timestamp: timestamp,
        swissprot_entry_count: outcome.entries_processed as i64,
        trembl_entry_count: 0,
    };
    adapter.write_metadata(production, &metadata)?;
    Ok(())
}
