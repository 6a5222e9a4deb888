use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use daily_workbook::cli;
use daily_workbook::command::Redactor;
use daily_workbook::config::{ConfigOverrides, PipelineConfig};
use daily_workbook::logging;
use daily_workbook::types::TimeOfDay;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "daily-workbook")]
#[command(about = "Export a day of telemetry and merge it into a dated copy of the master template")]
#[command(long_about = "Daily workbook - telemetry export into dated spreadsheet templates

Runs the export tool for one business day, copies the master template to
<prefix>_MMDDYY.xlsx in the working directory, replaces the 'Raw Import'
sheet with the export's 'RAW' sheet and recalculates formulas when an
office suite is available.

TARGET DATE:
  --date YYYY-MM-DD wins. Otherwise the day after the template's own date
  (3895th_070124.xlsx -> 2024-07-02). Otherwise yesterday.

CONFIGURATION:
  YAML file via --config, overridden by flags and DAILY_WORKBOOK_* variables.

EXAMPLES:
  daily-workbook --config report.yaml process templates/3895th_070124.xlsx
  daily-workbook --config report.yaml plan templates/master.xlsx --date 2024-07-04
  daily-workbook --config report.yaml check")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// YAML configuration file
    #[arg(long, env = "DAILY_WORKBOOK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Working directory for raw exports and dated workbooks
    #[arg(long, env = "DAILY_WORKBOOK_WORK_DIR", global = true)]
    work_dir: Option<PathBuf>,

    /// Path to the export tool script
    #[arg(long, env = "DAILY_WORKBOOK_EXPORT_SCRIPT", global = true)]
    export_script: Option<PathBuf>,

    /// Export API key id
    #[arg(long, env = "DAILY_WORKBOOK_API_KEY_ID", hide_env_values = true, global = true)]
    api_key_id: Option<String>,

    /// Export API key
    #[arg(long, env = "DAILY_WORKBOOK_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Organization id
    #[arg(long, env = "DAILY_WORKBOOK_ORG_ID", global = true)]
    org_id: Option<String>,

    /// IANA time zone of the business day, e.g. America/New_York
    #[arg(long, env = "DAILY_WORKBOOK_TIMEZONE", global = true)]
    timezone: Option<String>,

    /// Start of the export window (H:MM)
    #[arg(long, value_parser = parse_time, global = true)]
    export_start: Option<TimeOfDay>,

    /// End of the export window (H:MM)
    #[arg(long, value_parser = parse_time, global = true)]
    export_end: Option<TimeOfDay>,

    /// Office suite used for recalculation
    #[arg(long, env = "DAILY_WORKBOOK_OFFICE", global = true)]
    office_program: Option<String>,
}

impl GlobalArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            work_dir: self.work_dir.clone(),
            export_script: self.export_script.clone(),
            api_key_id: self.api_key_id.clone(),
            api_key: self.api_key.clone(),
            org_id: self.org_id.clone(),
            timezone: self.timezone.clone(),
            export_start: self.export_start,
            export_end: self.export_end,
            office_program: self.office_program.clone(),
        }
    }
}

fn parse_time(s: &str) -> Result<TimeOfDay, String> {
    s.parse().map_err(|e: daily_workbook::ReportError| e.to_string())
}

#[derive(Subcommand)]
enum Commands {
    /// Export one day and merge it into a dated copy of TEMPLATE
    Process {
        /// Master template (.xlsx / .xlsm)
        template: PathBuf,

        /// Target business date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show what process would do, without running or writing anything
    Plan {
        /// Master template (.xlsx / .xlsm)
        template: PathBuf,

        /// Target business date (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Probe the export runtime and the office suite
    Check,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = PipelineConfig::load(cli.global.config.as_deref(), cli.global.overrides())
        .context("Invalid configuration")?;
    logging::init(cli.verbose, Redactor::new(config.credentials.secrets()));

    match cli.command {
        Commands::Process {
            template,
            date,
            json,
        } => cli::process(config, template, date, json)?,

        Commands::Plan { template, date } => cli::plan(config, &template, date)?,

        Commands::Check => cli::check(config)?,
    }
    Ok(())
}
