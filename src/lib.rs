pub mod classifier;
pub mod config;
pub mod db;
pub mod models;
pub mod runner;
pub mod sampling;
pub mod service;
mod utils;

use std::sync::Arc;

use anyhow::Result;

pub use classifier::{Classification, CrowdLevel, CrowdThresholds};
pub use config::AppConfig;
pub use db::{Database, NewReading, Reading};
pub use models::{Subject, SubjectKey};
pub use runner::{RunnerController, RunnerSettings};
pub use sampling::{ConfiguredSource, CountSource, Sampler, SamplingError, SamplingErrorPolicy};
pub use service::CrowdService;

/// Reads `RUST_LOG`, defaulting to info.
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

/// Opens the log and wires the configured sampler into a service.
pub fn build_service(config: AppConfig) -> Result<CrowdService<ConfiguredSource>> {
    let database = Database::new(config.database_path.clone())?;
    let source = ConfiguredSource::from_config(&config.sampler)?;
    let sampler = Arc::new(Sampler::new(source, config.sampler.on_error));

    Ok(CrowdService::new(Arc::new(config), sampler, database))
}
