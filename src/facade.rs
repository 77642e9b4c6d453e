//! Pipeline Facade: the one programmatic entry point, `(mode, dataset,
//! profile)` in, nothing out on success, a typed `Error` on failure.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use flate2::read::GzDecoder;

use crate::config::Settings;
use crate::database::postgres::{self, PostgresAdapter};
use crate::database::DatabaseAdapter;
use crate::director::{self, Mode, RunRequest};
use crate::errors::Error;
use crate::model::Profile;

pub struct Request {
    pub mode: Mode,
    pub dataset: String,
    pub profile: Profile,
    pub input_path: std::path::PathBuf,
}

/// Run one load. Opens `input_path` as gzip-compressed XML, builds the
/// reference Postgres adapter from `settings.database_url`, and drives the
/// Load Strategy Director to completion.
pub fn run(settings: &Settings, request: Request) -> Result<(), Error> {
    let pool = postgres::build_pool(&settings.database_url)?;
    let adapter = PostgresAdapter::new(pool);
    run_with_adapter(&adapter, settings, request)
}

/// Same as `run`, but against a caller-supplied adapter — the seam the
/// in-memory test adapter and any alternate `DatabaseAdapter` plug into.
pub fn run_with_adapter(adapter: &dyn DatabaseAdapter, settings: &Settings, request: Request) -> Result<(), Error> {
    let input = open_gzip(&request.input_path)?;
    let run_request = RunRequest { mode: request.mode, dataset: request.dataset, profile: request.profile, input };
    director::run(adapter, settings, run_request, None)
}

fn open_gzip(path: &Path) -> Result<BufReader<GzDecoder<File>>, Error> {
    let file = File::open(path)?;
    Ok(BufReader::new(GzDecoder::new(file)))
}
