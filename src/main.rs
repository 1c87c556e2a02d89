use clap::{Parser, Subcommand};
use log::{error, info};
use ruche::configuration::{retention_from_hours, Config, StorageBackend};
use ruche::error_handling::types::ConfigError;
use ruche::data_capture::types::{Record, RecordKind};
use ruche::storage::record_filter::RecordFilter;
use ruche::storage::retention::cutoff;
use ruche::storage::{open_store, Store};
use std::path::PathBuf;
use std::process::exit;

#[derive(Parser)]
#[command(name = "ruche")]
#[command(version)]
#[command(about = "Inspect the records of a file-backed capture store")]
struct Args {
    /// TOML capture configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Record directory, takes precedence over the configuration
    #[arg(short, long, env = "RUCHE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List records, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// 0 lists every matching record
        #[arg(long, default_value_t = 20)]
        page_size: usize,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        status: Option<u16>,
        /// http, streaming or process
        #[arg(long)]
        kind: Option<String>,
        /// Substring of the URL
        #[arg(long)]
        url: Option<String>,
        /// Only records carrying an error
        #[arg(long)]
        errors: bool,
    },
    /// Case-insensitive search over URL, bodies, headers and errors
    Search {
        keyword: String,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
    },
    /// Print one record as JSON
    Show { id: String },
    /// Print store statistics and histograms
    Stats,
    /// Remove old records
    Cleanup {
        /// Defaults to the configured retention
        #[arg(long)]
        older_than_hours: Option<u64>,
    },
}

fn load_config(args: &Args) -> Config {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path).unwrap_or_else(|e| {
            error!("Unable to import configuration from {}: {}", path.display(), e);
            exit(1);
        }),
        None => Config::default(),
    };
    config.storage.backend = StorageBackend::File;
    if let Some(dir) = &args.storage_dir {
        config.storage.path = Some(dir.clone());
    }
    config.validated().unwrap_or_else(|e| {
        error!("Invalid configuration: {}", e);
        exit(1);
    })
}

fn summary_line(record: &Record) -> String {
    let mut line = format!(
        "{}  {}  {:<9}",
        record.id,
        record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        record.kind
    );
    match (record.kind, &record.http, &record.process) {
        (RecordKind::Process, _, Some(process)) => {
            line.push_str(&format!(
                "  {} ({})  {:?}",
                process.name, process.process_type, process.status
            ));
        }
        (_, Some(http), _) => {
            line.push_str(&format!("  {:<6} {}  {}", http.method, http.status_code, http.url));
        }
        _ => {}
    }
    line.push_str(&format!("  {} ms", record.duration_ms));
    if record.has_error() {
        line.push_str(&format!("  error: {}", record.error));
    }
    line
}

fn print_page(records: &[Record], total: usize, page: usize, page_size: usize) {
    for record in records {
        println!("{}", summary_line(record));
    }
    if page_size == 0 {
        println!("{} record(s)", total);
    } else {
        let pages = total.div_ceil(page_size);
        println!("page {}/{} of {} record(s)", page.max(1), pages.max(1), total);
    }
}

/// Age limit for `cleanup`: the flag when given, else the configured retention.
fn cleanup_window(
    older_than_hours: Option<u64>,
    config: &Config,
) -> Result<Option<chrono::TimeDelta>, ConfigError> {
    match older_than_hours {
        Some(hours) => retention_from_hours(hours).map(Some),
        None => Ok(config.retention()),
    }
}

fn run(
    command: Command,
    store: &dyn Store,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::List {
            page,
            page_size,
            method,
            status,
            kind,
            url,
            errors,
        } => {
            let filter = RecordFilter {
                method,
                status_code: status,
                kind: kind.as_deref().and_then(RecordKind::parse),
                url,
                has_error: errors.then_some(true),
                ..Default::default()
            };
            let (records, total) = store.find_all(page, page_size, &filter)?;
            print_page(&records, total, page, page_size);
        }
        Command::Search {
            keyword,
            page,
            page_size,
        } => {
            let (records, total) = store.search(&keyword, page, page_size)?;
            print_page(&records, total, page, page_size);
        }
        Command::Show { id } => match store.find_by_id(&id)? {
            Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
            None => {
                error!("No record with id {}", id);
                exit(2);
            }
        },
        Command::Stats => {
            let stats = store.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            println!("methods: {:?}", store.methods_histogram()?);
            println!("status codes: {:?}", store.status_histogram()?);
        }
        Command::Cleanup { older_than_hours } => {
            let Some(retention) = cleanup_window(older_than_hours, config)? else {
                info!("Retention disabled, nothing to clean up");
                return Ok(());
            };
            let Some(before) = cutoff(retention) else {
                info!("Retention window reaches past the clock range, nothing to clean up");
                return Ok(());
            };
            let removed = store.cleanup(before)?;
            println!("removed {} record(s)", removed);
        }
    }
    Ok(())
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();
    let config = load_config(&args);

    let store = open_store(&config).unwrap_or_else(|e| {
        error!("Unable to open the record store: {}", e);
        exit(1);
    });

    if let Err(e) = run(args.command, store.as_ref(), &config) {
        error!("{}", e);
        exit(1);
    }
}
