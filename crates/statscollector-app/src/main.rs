use std::process;

use statscollector_app::cli::{Cli, log_level};
use statscollector_app::config::{self, AppConfig};
use statscollector_app::error::AppError;
use statscollector_app::run::{self as collector_run, RunPlan};
use tracing_subscriber::{filter::LevelFilter, fmt};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };
    init_tracing(log_level(&config.logging.level, cli.verbose));

    if let Err(err) = run(cli, config).await {
        tracing::error!(error = %err, "statscollector failed");
        eprintln!("{err}");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig, AppError> {
    Ok(config::load_from(cli.config.as_deref())?)
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    if cli.verify_access {
        collector_run::verify_access(&config).await?;
        return Ok(());
    }

    let plan: RunPlan = cli.plan();
    if plan.is_empty() {
        Cli::print_help();
        return Ok(());
    }

    let report = collector_run::execute(&config, &plan).await?;
    for (series, published) in &report.published {
        tracing::debug!(
            series = %series,
            pushed = published.pushed,
            simulated = published.simulated,
            failed = published.failed,
            "series summary"
        );
    }
    Ok(())
}
