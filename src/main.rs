use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use crowdlog_lib::{
    build_service, init_logging,
    runner::RunnerSettings,
    service::{HISTORY_LIMIT, LOG_LIMIT},
    AppConfig, RunnerController,
};

#[derive(Parser, Debug)]
#[command(name = "crowdlog", about = "Sample, log and query crowd levels")]
struct Args {
    #[arg(long, default_value = "crowdlog.json")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured cities
    Cities,
    /// Sample every attraction of a city once and log the counts
    Survey { city: String },
    /// Recent counts for one attraction, oldest first
    History {
        city: String,
        attraction: String,
        #[arg(long, default_value_t = HISTORY_LIMIT)]
        limit: usize,
    },
    /// Latest count and crowd level per attraction of a city
    Snapshot { city: String },
    /// Most recent rows across all subjects
    Logs {
        #[arg(long, default_value_t = LOG_LIMIT)]
        limit: usize,
    },
    /// Sample every subject on a timer until Ctrl-C
    Watch {
        /// Stop after this many passes
        #[arg(long)]
        passes: Option<u64>,
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print the effective configuration
    Config,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();

    let config = AppConfig::load(&args.config)?;

    if let Command::Config = args.command {
        return print_json(&config);
    }

    let service = build_service(config)?;

    match args.command {
        Command::Cities => print_json(&service.cities()),
        Command::Survey { city } => print_json(&service.survey_city(&city).await?),
        Command::History {
            city,
            attraction,
            limit,
        } => print_json(&service.attraction_history(&city, &attraction, limit).await?),
        Command::Snapshot { city } => print_json(&service.city_snapshot(&city).await?),
        Command::Logs { limit } => print_json(&service.recent_logs(limit).await?),
        Command::Watch {
            passes,
            interval_secs,
        } => {
            let mut runner_config = service.config().runner.clone();
            if let Some(secs) = interval_secs.filter(|secs| *secs > 0) {
                runner_config.interval_secs = secs;
            }
            let settings = RunnerSettings {
                max_passes: passes,
                ..RunnerSettings::from_config(&runner_config)
            };

            let mut controller = RunnerController::new();
            controller.start(
                service.config().subjects(),
                service.sampler(),
                service.database().clone(),
                settings,
            )?;

            let summary = if passes.is_some() {
                controller.wait().await?
            } else {
                tokio::signal::ctrl_c().await?;
                info!("Ctrl-C received, stopping sampling runner");
                controller.stop().await?
            };
            print_json(&summary)
        }
        Command::Config => Ok(()),
    }
}
