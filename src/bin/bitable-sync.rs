use std::cell::Cell;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use bitable_sync::{
    BatchOutcome, BatchResult, BitableSync, PhaseReport, Settings, SyncPhase, SyncProgress,
    SyncReport, SyncStatus,
};

#[derive(Parser)]
#[command(name = "bitable-sync", about = "Replace a Bitable table's records with a local row set")]
struct Cli {
    /// Config file path (default: ~/.bitable-sync/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TableArgs {
    /// Bitable app token (overrides BITABLE_APP_TOKEN)
    #[arg(long)]
    app_token: Option<String>,
    /// Table id (overrides BITABLE_TABLE_ID)
    #[arg(long)]
    table_id: Option<String>,
}

#[derive(Args)]
struct TuningArgs {
    /// API base URL (overrides BITABLE_ENDPOINT)
    #[arg(long)]
    endpoint: Option<String>,
    /// Records per delete/create call (at most 500)
    #[arg(long)]
    batch_size: Option<usize>,
    /// Records per list page (at most 500)
    #[arg(long)]
    page_size: Option<usize>,
    /// Batches in flight at once (default 1: strictly sequential)
    #[arg(long)]
    concurrency: Option<usize>,
    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the table's records with rows from a JSON records file
    Sync {
        /// JSON array of row objects; `-` reads stdin
        #[arg(long, value_name = "FILE")]
        rows: String,
        /// Keep existing records and only insert
        #[arg(long)]
        append: bool,
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the record ids currently in the table
    List {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Print only the number of records
        #[arg(long)]
        count: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every record in the table
    Purge {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective settings (file + environment), secret redacted
    Show,
}

/// Progress reporter that writes to stderr.
#[derive(Default)]
struct StderrProgress {
    line_open: Cell<bool>,
}

impl StderrProgress {
    fn end_line(&self) {
        if self.line_open.replace(false) {
            eprintln!();
        }
    }
}

impl SyncProgress for StderrProgress {
    fn on_phase_start(&self, phase: SyncPhase) {
        self.end_line();
        match phase {
            SyncPhase::Reported => {}
            _ => eprintln!("{}...", capitalize(&phase.to_string())),
        }
    }

    fn on_page_fetched(&self, page: usize, records_so_far: usize) {
        eprint!("\r  Listed {records_so_far} records ({page} pages)   ");
        self.line_open.set(true);
    }

    fn on_phase_batches(&self, _phase: SyncPhase, total_items: usize, total_batches: usize) {
        self.end_line();
        eprintln!("  {total_items} records in {total_batches} batches");
    }

    fn on_batch_complete(&self, _phase: SyncPhase, result: &BatchResult, total_batches: usize) {
        let current = result.batch_index + 1;
        let mark = if result.is_failure() { " (failed)" } else { "" };
        eprint!("\r  Batch {current}/{total_batches}{mark}   ");
        self.line_open.set(true);
        if current == total_batches {
            self.end_line();
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };

    match cli.command {
        Commands::Config { action } => {
            handle_config(&config_path, action)?;
        }
        Commands::Sync {
            rows,
            append,
            table,
            tuning,
            json,
        } => {
            let settings = load_settings(&config_path, &table, &tuning)?;
            let rows = if rows == "-" {
                bitable_sync::rows::read_rows(std::io::stdin().lock())?
            } else {
                bitable_sync::rows::load_rows(&rows)?
            };
            log::info!("Loaded {} rows", rows.len());

            let engine = build_engine(&settings)?;
            let progress = StderrProgress::default();
            let report = engine
                .sync(&rows, &settings.table()?, !append, &progress)
                .await?;
            finish(&report, json)?;
        }
        Commands::List {
            table,
            tuning,
            count,
            json,
        } => {
            let settings = load_settings(&config_path, &table, &tuning)?;
            let engine = build_engine(&settings)?;
            let ids = engine.list_record_ids(&settings.table()?).await?;
            if count {
                println!("{}", ids.len());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else {
                for id in &ids {
                    println!("{id}");
                }
            }
        }
        Commands::Purge {
            table,
            tuning,
            yes,
            json,
        } => {
            if !yes {
                anyhow::bail!("purge deletes every record in the table; pass --yes to confirm");
            }
            let settings = load_settings(&config_path, &table, &tuning)?;
            let engine = build_engine(&settings)?;
            let progress = StderrProgress::default();
            let report = engine.purge(&settings.table()?, &progress).await?;
            finish(&report, json)?;
        }
    }

    Ok(())
}

fn handle_config(path: &Path, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Show => {
            let mut settings = Settings::load(path)?.with_env();
            if settings.app_secret.is_some() {
                settings.app_secret = Some("<redacted>".into());
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
    }
    Ok(())
}

fn load_settings(path: &Path, table: &TableArgs, tuning: &TuningArgs) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(path)?.with_env();
    if let Some(v) = &table.app_token {
        settings.app_token = Some(v.clone());
    }
    if let Some(v) = &table.table_id {
        settings.table_id = Some(v.clone());
    }
    if let Some(v) = &tuning.endpoint {
        settings.endpoint = Some(v.clone());
    }
    settings.batch_size = tuning.batch_size.or(settings.batch_size);
    settings.page_size = tuning.page_size.or(settings.page_size);
    settings.concurrency = tuning.concurrency.or(settings.concurrency);
    settings.timeout_secs = tuning.timeout.or(settings.timeout_secs);
    Ok(settings)
}

fn build_engine(settings: &Settings) -> anyhow::Result<BitableSync> {
    let options = settings.sync_options();
    cancel_on_ctrl_c(options.cancellation.clone());
    Ok(BitableSync::new(settings.credential()?, options)?)
}

/// Cancel the run on Ctrl-C; batches already sent still complete and the
/// partial report is printed.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupted, stopping after in-flight batches...");
            token.cancel();
        }
    });
}

fn finish(report: &SyncReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_sync_report(report);
    }
    if report.status != SyncStatus::Success {
        std::process::exit(1);
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!("Sync: {} ({:?})", report.table, report.mode);
    println!("  Status:   {:?}", report.status);
    if let Some(listing) = &report.listing {
        print!(
            "  Listed:   {} records over {} pages",
            listing.records_found, listing.pages_fetched
        );
        match &listing.error {
            Some(err) => println!(" (incomplete: {err})"),
            None => println!(),
        }
    }
    if let Some(delete) = &report.delete {
        print_phase("Deleted", delete);
    }
    print_phase("Inserted", &report.insert);
    if report.cancelled {
        println!("  Cancelled before completion");
    }
    println!(
        "  Elapsed:  {:.1}s",
        (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
    );
}

fn print_phase(label: &str, phase: &PhaseReport) {
    if phase.is_no_op() {
        println!("  {label}: nothing to do");
        return;
    }
    println!(
        "  {label}: {} of {} records ({}/{} batches ok)",
        phase.succeeded_items, phase.total_items, phase.success_batches, phase.total_batches
    );
    for result in phase.failed_batches() {
        if let BatchOutcome::Failure {
            kind,
            http_status,
            message,
        } = &result.outcome
        {
            let status = http_status.map(|s| format!(" HTTP {s}")).unwrap_or_default();
            println!(
                "    batch {} ({} records): {kind:?}{status} {message}",
                result.batch_index + 1,
                result.requested_count
            );
        }
    }
}
