use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use band_catalog::bench::{
    add_record_album_to_top_band, run_ladder, BenchTarget, DocumentTarget, LevelReport,
    RelationalTarget,
};
use band_catalog::config::{AppConfig, CliConfig, FileConfig};
use band_catalog::source::{extract, Band, SourceTables};
use band_catalog::temporal::CalendarDate;
use band_catalog::{document, relational, DocumentStore, SqliteRelationalStore};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn parse_release_date(s: &str) -> Result<CalendarDate> {
    CalendarDate::parse_source(s)
        .with_context(|| format!("Invalid release date {:?}, expected DD/MM/YYYY", s))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in it override the flags below.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding the scraped band CSV files.
    #[clap(long, value_parser = parse_path)]
    pub source_dir: Option<PathBuf>,

    /// Path to the SQLite database of the relational model.
    #[clap(long, value_parser = parse_path)]
    pub relational_db: Option<PathBuf>,

    /// Path to the JSON file of the document model. Defaults to the
    /// relational database path with a .json extension.
    #[clap(long, value_parser = parse_path)]
    pub document_db: Option<PathBuf>,

    /// Number of timed trials per optimization level.
    #[clap(long)]
    pub trials: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reads the source files and loads them into the selected models.
    Import {
        #[clap(long, value_enum, default_value = "both")]
        model: Model,
    },

    /// Runs the top genre query on the selected models at every
    /// optimization level and prints the mean latency of each.
    Bench {
        #[clap(long, value_enum, default_value = "both")]
        model: Model,
    },

    /// Adds an album outselling every other one to the top band of the
    /// early decade's top genre in the document model.
    RecordAlbum {
        #[clap(long, default_value = "Record Breaker")]
        name: String,

        /// Release date as DD/MM/YYYY.
        #[clap(long, value_parser = parse_release_date, default_value = "01/01/2019")]
        release_date: CalendarDate,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Model {
    Relational,
    Documents,
    Both,
}

impl Model {
    fn relational(&self) -> bool {
        matches!(self, Model::Relational | Model::Both)
    }

    fn documents(&self) -> bool {
        matches!(self, Model::Documents | Model::Both)
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config file {:?}...", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        source_dir: cli_args.source_dir.clone(),
        relational_db: cli_args.relational_db.clone(),
        document_db: cli_args.document_db.clone(),
        trials: cli_args.trials,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    match cli_args.command {
        Command::Import { model } => import(&config, model),
        Command::Bench { model } => bench(&config, model),
        Command::RecordAlbum { name, release_date } => {
            record_album(&config, &name, release_date)
        }
    }
}

fn read_bands(source_dir: &Path) -> Result<Vec<Band>> {
    info!("Reading source files from {:?}...", source_dir);
    let tables = SourceTables::load(source_dir)?;
    Ok(extract(&tables).bands)
}

fn import(config: &AppConfig, model: Model) -> Result<()> {
    let bands = read_bands(config.require_source_dir()?)?;

    if model.relational() {
        info!(
            "Opening SQLite relational database at {:?}...",
            config.relational_db
        );
        let store = SqliteRelationalStore::open(&config.relational_db)?;
        let summary = relational::ingest(&store, &bands)?;
        println!("Relational import complete: {}", summary);
    }

    if model.documents() {
        info!("Opening document store at {:?}...", config.document_db);
        let mut store = DocumentStore::open(&config.document_db)?;
        let count = document::ingest(&mut store, &bands)?;
        println!("Document import complete: {} band documents", count);
    }

    Ok(())
}

fn bench(config: &AppConfig, model: Model) -> Result<()> {
    if model.relational() {
        let target = RelationalTarget::new(&config.relational_db);
        print_reports(&target, &run_ladder(&target, config.trials)?);
    }

    if model.documents() {
        let target = DocumentTarget::new(&config.document_db);
        print_reports(&target, &run_ladder(&target, config.trials)?);
    }

    Ok(())
}

fn record_album(config: &AppConfig, name: &str, release_date: CalendarDate) -> Result<()> {
    info!("Opening document store at {:?}...", config.document_db);
    let mut store = DocumentStore::open(&config.document_db)?;
    let record = add_record_album_to_top_band(&mut store, name, Some(release_date))?;
    store.flush()?;
    println!(
        "Added '{}' to {} (top {} band), album id {}",
        name, record.band_url, record.genre, record.album_id
    );
    Ok(())
}

fn print_reports<T: BenchTarget>(target: &T, reports: &[LevelReport]) {
    println!("{}", target.name());
    for report in reports {
        println!(
            "  {:<24} {:>12.3?}  {}",
            report.level.to_string(),
            report.mean_latency,
            report.answer
        );
    }
}
