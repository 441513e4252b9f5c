use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};
use crate::edgar::config::{ConfigOverrides, YearRange, load_config};
use crate::logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "edgar-visits",
    version,
    about = "Reconcile EDGAR access logs with the quarterly master index"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// TOML config file (defaults to EDGAR_CONFIG_PATH, then ./edgar.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base directory for downloads, aggregates and the final dataset
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Inclusive log year range, e.g. 2011-2017
    #[arg(long, global = true)]
    log_years: Option<YearRange>,

    /// Inclusive master index year range, e.g. 2010-2017
    #[arg(long, global = true)]
    index_years: Option<YearRange>,

    /// CSV allow-list with a `netblock` column
    #[arg(long, global = true)]
    ip_list: Option<PathBuf>,

    /// Prefix for processed files and the final dataset
    #[arg(long, global = true)]
    prefix: Option<String>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            data_base_dir: self.data_dir.clone(),
            log_years: self.log_years,
            index_years: self.index_years,
            target_ip_list_path: self.ip_list.clone(),
            processed_log_prefix: self.prefix.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest logs, build the master index, then merge
    Run,
    /// Download, filter and aggregate the access logs
    IngestLogs,
    /// Download and parse the quarterly master index
    BuildIndex,
    /// Build the master index and merge it with already ingested logs
    Merge,
    /// Summarize the final dataset
    Summary {
        /// How many of the most common forms to list
        #[arg(long, default_value_t = 5)]
        top: usize,
    },
    /// Show resolved configuration and layout
    Status,
}

fn print_report(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "issues" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let cfg = load_config(&cli.global.overrides())?;
    let report = match cli.command {
        Command::Run => commands::run::run(&cfg)?,
        Command::IngestLogs => commands::ingest_logs::run(&cfg)?,
        Command::BuildIndex => commands::build_index::run(&cfg)?,
        Command::Merge => commands::merge::run(&cfg)?,
        Command::Summary { top } => commands::summary::run(&cfg, &commands::summary::SummaryOptions { top })?,
        Command::Status => commands::status::run(&cfg)?,
    };
    print_report(&report, cli.global.json)
}
