//! Typed configuration the core receives by value. `Settings::defaults()`
//! gives built-in fallbacks; `with_env_overrides` layers `UNIPROT_LOADER_*`
//! environment variables on top. The core itself never reads an environment
//! variable or a file.

use std::path::PathBuf;

use crate::model::Profile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeprecationPolicy {
    Retain,
    HardDelete,
}

impl std::str::FromStr for DeprecationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "retain" => Ok(DeprecationPolicy::Retain),
            "hard-delete" => Ok(DeprecationPolicy::HardDelete),
            other => Err(format!("unknown deprecation policy '{other}', expected 'retain' or 'hard-delete'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub production_schema: String,
    pub profile: Profile,
    pub worker_count: usize,
    pub queue_bound: usize,
    pub spool_dir: PathBuf,
    pub deprecation_policy: DeprecationPolicy,
}

impl Settings {
    /// Built-in defaults before environment or CLI overrides are applied.
    pub fn defaults() -> Self {
        let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Settings {
            database_url: String::new(),
            production_schema: "uniprot_public".to_string(),
            profile: Profile::Standard,
            worker_count,
            queue_bound: worker_count * 2,
            spool_dir: std::env::temp_dir().join("uniprot-loader-spool"),
            deprecation_policy: DeprecationPolicy::Retain,
        }
    }

    /// Overlay `UNIPROT_LOADER_*` environment variables (read after
    /// `dotenvy::dotenv()` has populated the process environment from any
    /// `.env` file) onto the defaults.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = std::env::var("UNIPROT_LOADER_DATABASE_URL") {
            self.database_url = value;
        }
        if let Ok(value) = std::env::var("UNIPROT_LOADER_PRODUCTION_SCHEMA") {
            self.production_schema = value;
        }
        if let Ok(value) = std::env::var("UNIPROT_LOADER_PROFILE") {
            if let Ok(profile) = value.parse() {
                self.profile = profile;
            }
        }
        if let Ok(value) = std::env::var("UNIPROT_LOADER_WORKER_COUNT") {
            if let Ok(count) = value.parse() {
                self.worker_count = count;
            }
        }
        if let Ok(value) = std::env::var("UNIPROT_LOADER_QUEUE_BOUND") {
            if let Ok(bound) = value.parse() {
                self.queue_bound = bound;
            }
        }
        if let Ok(value) = std::env::var("UNIPROT_LOADER_DEPRECATION_POLICY") {
            if let Ok(policy) = value.parse() {
                self.deprecation_policy = policy;
            }
        }
        self
    }
}
