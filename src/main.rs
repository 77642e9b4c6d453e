mod catalog;
mod config;
mod database;
mod director;
mod encoder;
mod errors;
mod facade;
mod loader;
mod metadata;
mod model;
mod pipeline;
mod spool;
#[cfg(test)]
mod testutil;
mod utils;
mod xml_parser;
mod xml_value;

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use config::{DeprecationPolicy, Settings};
use director::Mode;
use errors::Error;
use model::Profile;
use tracing_subscriber::fmt::format::FmtSpan;

/// The UniProtKB relational loader
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform and load a UniProtKB XML dump
    Load {
        /// Full load (atomic schema swap) or delta load (stage-then-merge)
        #[arg(long, value_enum)]
        mode: LoadMode,
        /// Dataset this input belongs to, recorded in load_history
        #[arg(long, default_value = "swissprot")]
        dataset: String,
        /// How much semi-structured data to retain
        #[arg(long, default_value = "standard")]
        profile: String,
        /// Deprecated-entry policy for delta loads
        #[arg(long, default_value = "retain")]
        deprecation_policy: String,
        /// Path to the gzip-compressed UniProtKB XML input
        input: PathBuf,
    },

    /// Print the current release and recent run history
    Status,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LoadMode {
    Full,
    Delta,
}

fn load_settings() -> Settings {
    dotenvy::dotenv().ok();
    Settings::defaults().with_env_overrides()
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::fmt().with_span_events(FmtSpan::CLOSE).with_target(false).with_level(false).init();

    database::postgres::install_instrumentation();

    let cli = Cli::parse();
    let settings = load_settings();

    match cli.command {
        Commands::Load { mode, dataset, profile, deprecation_policy, input } => {
            let mut settings = settings;
            settings.profile = Profile::from_str(&profile).map_err(Error::Parsing)?;
            settings.deprecation_policy =
                DeprecationPolicy::from_str(&deprecation_policy).map_err(errors::ParseError::InvalidValue).map_err(Error::Parsing)?;

            let request = facade::Request {
                mode: match mode {
                    LoadMode::Full => Mode::Full,
                    LoadMode::Delta => Mode::Delta,
                },
                dataset,
                profile: settings.profile,
                input_path: input,
            };
            facade::run(&settings, request)?;
            println!("load succeeded");
        }

        Commands::Status => {
            let pool = database::postgres::build_pool(&settings.database_url)?;
            let adapter = database::postgres::PostgresAdapter::new(pool);
            let registry = metadata::MetadataRegistry::new(&adapter);

            match registry.current_release(&settings.production_schema)? {
                Some(release) => println!("current release: {} (loaded {})", release.version, release.load_timestamp),
                None => println!("no release loaded yet"),
            }

            for run in registry.recent_runs(&settings.production_schema, 10)? {
                println!("{} {} {} {} started={}", run.run_id, run.mode, run.dataset, run.status.as_str(), run.start_time);
            }
        }
    }

    Ok(())
}
