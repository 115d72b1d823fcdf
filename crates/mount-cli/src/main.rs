//! mountctl
//!
//! Attach, fetch, list and detach files on a JSON-backed record.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mount_core::{
    ColumnValue, MountOptions, MountRegistry, UploadedFile, UploaderConfig, UrlOptions,
};
use mount_uploaders::{FileDownloader, LocalStorage, Mounter, UploaderSettings};

mod record;

use record::JsonRecord;

#[derive(Parser)]
#[command(name = "mountctl")]
#[command(about = "Manage files mounted on a record")]
struct Cli {
    /// JSON file holding the record's columns
    #[arg(short, long, default_value = "record.json", env = "MOUNT_RECORD")]
    record: PathBuf,

    /// Root directory for stored files
    #[arg(short, long, default_value = ".", env = "MOUNT_STORAGE_ROOT")]
    storage_root: PathBuf,

    /// Uploader config file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<String>,

    /// Raise integrity, processing and download errors for the slot
    #[arg(long)]
    strict: bool,

    /// Serialize the slot into this column instead of its own name
    #[arg(long)]
    mount_on: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cache and store local files into a slot
    Attach { slot: String, files: Vec<PathBuf> },
    /// Download remote files into a slot
    Fetch { slot: String, urls: Vec<String> },
    /// Print the URLs of a slot's files
    Urls {
        slot: String,
        #[arg(long)]
        version: Option<String>,
    },
    /// Remove every file of a slot
    Detach { slot: String },
    /// Print the record's columns
    Show,
}

fn main() -> Result<()> {
    init_tracing();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => UploaderConfig::load(path)?,
        None => UploaderConfig::from_env().unwrap_or_else(|e| {
            warn!("Failed to load uploader config from env: {}, using defaults", e);
            UploaderConfig::default()
        }),
    };

    let storage = Arc::new(LocalStorage::new(&cli.storage_root, config.base_url.clone()));
    let settings = Arc::new(UploaderSettings::from_config(&config).downloader(FileDownloader));
    let mounts = mount_registry(&cli, config);

    let mut record = JsonRecord::load(&cli.record, mounts, storage, settings)?;

    match cli.command {
        Commands::Attach { slot, files } => {
            let uploads = files
                .iter()
                .map(read_upload)
                .collect::<Result<Vec<_>>>()?;
            let (column, value) = {
                let mut mounter = Mounter::new(&record, slot.as_str());
                mounter.cache(uploads)?;
                report_errors(&mounter);
                mounter.store()?;
                (mounter.serialization_column(), persisted(&mut mounter))
            };
            record.write_uploader(&column, value);
            record.save()?;
            info!(slot = %slot, column = %column, "Files attached");
        }
        Commands::Fetch { slot, urls } => {
            let (column, value) = {
                let mut mounter = Mounter::new(&record, slot.as_str());
                mounter.set_remote_urls(urls)?;
                report_errors(&mounter);
                mounter.store()?;
                (mounter.serialization_column(), persisted(&mut mounter))
            };
            record.write_uploader(&column, value);
            record.save()?;
            info!(slot = %slot, column = %column, "Remote files attached");
        }
        Commands::Urls { slot, version } => {
            let mut options = UrlOptions::new();
            if let Some(version) = version {
                options = options.version(version);
            }
            let mut mounter = Mounter::new(&record, slot.as_str());
            for url in mounter.urls(&options) {
                println!("{}", url.unwrap_or_default());
            }
        }
        Commands::Detach { slot } => {
            let column = {
                let mut mounter = Mounter::new(&record, slot.as_str());
                mounter.set_remove(true);
                mounter.store()?;
                mounter.serialization_column()
            };
            record.write_uploader(&column, None);
            record.save()?;
            info!(slot = %slot, column = %column, "Files detached");
        }
        Commands::Show => {
            println!("{}", serde_json::to_string_pretty(record.columns())?);
        }
    }

    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,mount_cli=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Class-level defaults plus the per-invocation overrides for every slot named on the command line
fn mount_registry(cli: &Cli, config: UploaderConfig) -> MountRegistry {
    let slot = match &cli.command {
        Commands::Attach { slot, .. }
        | Commands::Fetch { slot, .. }
        | Commands::Urls { slot, .. }
        | Commands::Detach { slot } => slot.clone(),
        Commands::Show => return MountRegistry::new(config),
    };

    let mut options = MountOptions::new();
    if cli.strict {
        options = options
            .ignore_integrity_errors(false)
            .ignore_processing_errors(false)
            .ignore_download_errors(false);
    }
    if let Some(column) = &cli.mount_on {
        options = options.mount_on(column.clone());
    }

    MountRegistry::new(config).mount(slot, options)
}

fn read_upload(path: &PathBuf) -> Result<UploadedFile> {
    if !path.is_file() {
        bail!("{} is not a file", path.display());
    }
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;
    Ok(UploadedFile::new(filename, data))
}

fn report_errors(mounter: &Mounter<'_, JsonRecord>) {
    let recorded = [
        mounter.integrity_error(),
        mounter.processing_error(),
        mounter.download_error(),
    ];
    for err in recorded.into_iter().flatten() {
        warn!(code = err.error_code(), "{}", err);
    }
}

fn persisted(mounter: &mut Mounter<'_, JsonRecord>) -> Option<ColumnValue> {
    mounter
        .identifiers()
        .and_then(ColumnValue::from_identifiers)
}
