use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, Parser};
use tracing_subscriber::filter::LevelFilter;

use crate::run::RunPlan;

/// Top-level CLI entry point.
#[derive(Debug, Default, Parser)]
#[command(
    name = "statscollector",
    version,
    about = "Collect pipeline statistics, push them to Prometheus and reconcile bibcodes"
)]
pub struct Cli {
    /// Verify archive (Google Drive) access and exit.
    #[arg(long)]
    pub verify_access: bool,
    /// Collect log volume counts from Graylog.
    #[arg(long)]
    pub graylog: bool,
    /// Collect index statistics from Solr.
    #[arg(long)]
    pub solr: bool,
    /// Collect record statistics from Postgres.
    #[arg(long)]
    pub postgres: bool,
    /// Compare bibcodes in Postgres and Solr against the canonical list.
    #[arg(long)]
    pub classic: bool,
    /// Compute statistics but only log what would be pushed.
    #[arg(long)]
    pub no_push: bool,
    /// Do not archive the missing/extra bibcode files.
    #[arg(long)]
    pub no_classic_upload: bool,
    /// Simulate both metric pushes and archive uploads.
    #[arg(long)]
    pub dry_run: bool,
    /// Extra configuration file layered above `config/settings`.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }

    /// Collectors and side effects selected by the flags.
    pub fn plan(&self) -> RunPlan {
        RunPlan {
            graylog: self.graylog,
            solr: self.solr,
            postgres: self.postgres,
            classic: self.classic,
            simulate_push: self.no_push || self.dry_run,
            upload: !self.no_classic_upload,
            simulate_upload: self.dry_run,
        }
    }
}

/// Level from configuration, raised one step per `-v`.
pub fn log_level(configured: &str, verbose: u8) -> LevelFilter {
    const LADDER: [LevelFilter; 6] = [
        LevelFilter::OFF,
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
        LevelFilter::TRACE,
    ];
    let base = configured
        .trim()
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    let start = LADDER.iter().position(|l| *l == base).unwrap_or(3);
    let index = (start + usize::from(verbose)).min(LADDER.len() - 1);
    LADDER[index]
}
