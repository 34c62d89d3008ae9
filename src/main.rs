use std::env;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tilestash::{
    acquire, expand_home, Error, FolderSync, Generation, Settings, Summary, SyncReport,
    SyncSettings, TileStore, DEFAULT_FETCH_RATE,
};

/// Rough per-tile size used for the dry-run download estimate.
const TILE_SIZE_ESTIMATE: f64 = 10_000.0;

#[derive(Parser)]
#[command(name = "tilestash", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the tiles of every configured zone into the disk cache.
    Fetch {
        /// YAML configuration file (zones and map source).
        #[arg(short, long, default_value = "etc/config.yaml")]
        config: PathBuf,

        /// Tile cache root. Defaults to $DOWNLOAD_DIRECTORY, then to
        /// ~/Desktop/maps.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of tiles fetched in parallel.
        #[arg(short, long, default_value_t = DEFAULT_FETCH_RATE)]
        rate: usize,

        /// Timeout in seconds for fetching a single tile; 0 disables it.
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,

        /// Don't fetch anything; report what would be downloaded.
        #[arg(long)]
        dry_run: bool,
    },

    /// Ingest a directory tree of downloaded tiles into a tile store.
    Ingest {
        /// YAML configuration file with a `database` section.
        #[arg(short, long, conflicts_with_all = ["store", "from"])]
        config: Option<PathBuf>,

        /// Tile store file, overriding the configuration.
        #[arg(long, requires = "from")]
        store: Option<PathBuf>,

        /// Directory tree to ingest, overriding the configuration.
        #[arg(long, requires = "store")]
        from: Option<PathBuf>,

        /// Store schema generation ('a' or 'b').
        #[arg(short, long, default_value = "b")]
        generation: String,
    },

    /// Mirror directory trees, copying only files missing at the destination.
    Sync {
        /// YAML file with a list of source/destination pairs.
        #[arg(short, long, default_value = "etc/synchmaps.yaml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        let code = match err.downcast_ref::<Error>() {
            Some(Error::OutputDir(..)) => 2,
            _ => 1,
        };
        process::exit(code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Fetch {
            config,
            output,
            rate,
            timeout,
            dry_run,
        } => fetch(&config, output, rate, timeout, dry_run).await,
        Command::Ingest {
            config,
            store,
            from,
            generation,
        } => ingest(config.as_deref(), store, from, &generation),
        Command::Sync { config } => sync(&config),
    }
}

async fn fetch(
    config: &Path,
    output: Option<PathBuf>,
    rate: usize,
    timeout: u64,
    dry_run: bool,
) -> Result<()> {
    let settings = Settings::load(config)?;

    let output_dir = output
        .or_else(|| env::var_os("DOWNLOAD_DIRECTORY").map(PathBuf::from))
        .map(|p| expand_home(&p))
        .unwrap_or_else(default_output_dir);
    info!("store destination set at {}", output_dir.display());

    // The debug environment toggle short-circuits the network just like
    // an explicit --dry-run.
    let dry_run = dry_run || env::var("DEBUG").is_ok_and(|v| v.eq_ignore_ascii_case("true"));
    if dry_run {
        warn!("dry run: no tiles will be fetched");
    }

    let cfg = settings.fetch_config(output_dir, rate, Duration::from_secs(timeout), dry_run)?;
    let summary = acquire(&cfg).await?;

    report_summary(&summary);
    Ok(())
}

fn report_summary(summary: &Summary) {
    if summary.planned > 0 {
        eprintln!(
            "would download {} tiles (approx {}, assuming 10 kb per tile)",
            summary.planned,
            pretty_bytes::converter::convert(summary.planned as f64 * TILE_SIZE_ESTIMATE)
        );
    }
    info!(
        "finished: {} fetched, {} cached, {} failed ({} tiles total)",
        summary.fetched,
        summary.skipped,
        summary.failed,
        summary.total()
    );
}

fn ingest(
    config: Option<&Path>,
    store: Option<PathBuf>,
    from: Option<PathBuf>,
    generation: &str,
) -> Result<()> {
    let (filename, flat_files, generation) = match (store, from) {
        (Some(store), Some(from)) => (store, from, generation.parse::<Generation>()?),
        _ => {
            let path = config.ok_or_else(|| {
                Error::InvalidConfig("ingest needs either --config or --store/--from".to_owned())
            })?;
            let database = Settings::load(path)?.database.ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "no database section in {}",
                    path.display()
                ))
            })?;
            (
                expand_home(&database.filename),
                expand_home(&database.flat_files),
                database.generation,
            )
        }
    };

    let mut store = TileStore::open(&filename, generation)
        .with_context(|| format!("failed opening tile store {}", filename.display()))?;
    let report = store
        .ingest(&flat_files)
        .with_context(|| format!("failed ingesting {}", flat_files.display()))?;

    info!(
        "ingested {} tile(s) into {}, skipped {} file(s)",
        report.ingested,
        filename.display(),
        report.skipped
    );
    Ok(())
}

fn sync(config: &Path) -> Result<()> {
    let settings = SyncSettings::load(config)?;

    let mut failed = 0u64;
    let mut totals = SyncReport::default();
    for unit in &settings.sync {
        let syncer = FolderSync::new(expand_home(&unit.source), expand_home(&unit.destination));
        match syncer.sync() {
            Ok(report) => {
                totals.copied += report.copied;
                totals.skipped += report.skipped;
            }
            Err(err) => {
                error!("sync failed: {err}");
                failed += 1;
            }
        }
    }

    info!(
        "total syncs: {} succeeded, {} failed; {} file(s) copied, {} skipped",
        settings.sync.len() as u64 - failed,
        failed,
        totals.copied,
        totals.skipped
    );
    Ok(())
}

fn default_output_dir() -> PathBuf {
    dirs::desktop_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("maps")
}
