mod backup_service;
mod models;
mod repo;
mod service;
mod utils;

use crate::backup_service::BackupService;
use crate::models::backup_run::RunStatus;
use crate::models::config::{load_config_or_default, setup_config, Config};
use crate::models::config_validator::{validate_config, validate_importer_config};
use crate::repo::sqlite::{count_quotes, select_quote, set_db_pool, setup_database, upsert_quote};
use crate::service::quotes::QuoteImporter;
use crate::utils::status_panel::StatusPanel;
use crate::utils::threads::join_logged;
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "RustyZipBackUp")]
#[command(about = "Daily zip backups of a directory, with a market quote importer", long_about = None)]
struct Cli {
    #[arg(
        short = 'c',
        long = "config",
        default_value = "config.json",
        env = "RUSTYZIPBACKUP_CONFIG"
    )]
    config_file: String,

    /// Directory to back up (overrides the config file)
    #[arg(short = 's', long = "source")]
    source: Option<String>,

    /// Directory receiving the archives (overrides the config file)
    #[arg(short = 'd', long = "destination")]
    destination: Option<String>,

    /// Daily backup time as HH:MM (overrides the config file)
    #[arg(short = 't', long = "time")]
    time: Option<String>,

    #[arg(
        short = 'l',
        long = "log-level",
        default_value = "info",
        env = "LOG_LEVEL"
    )]
    log_level: String,

    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    #[arg(short = 'v', long = "validate-only")]
    validate_only: bool,

    /// Run a backup right away, then keep the daily schedule
    #[arg(short = 'n', long = "now", conflicts_with = "once")]
    now: bool,

    /// Run a single backup and exit
    #[arg(short = 'o', long = "once")]
    once: bool,

    /// Import stock and crypto quotes into the database and exit
    #[arg(long = "import-quotes", conflicts_with_all = ["once", "now"])]
    import_quotes: bool,
}

impl Cli {
    fn has_overrides(&self) -> bool {
        self.source.is_some() || self.destination.is_some() || self.time.is_some()
    }

    fn apply_overrides(&self, config: &mut Config) {
        if let Some(source) = &self.source {
            config.source_directory = source.clone();
        }
        if let Some(destination) = &self.destination {
            config.destination_directory = destination.clone();
        }
        if let Some(time) = &self.time {
            config.backup_time = time.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let log_level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .init();

    info!("RustyZipBackUp starting...");

    if args.import_quotes {
        return import_quotes(&args);
    }

    let config = load_backup_config(&args)?;
    debug!("Loaded config: {:?}", &config);

    if args.validate_only {
        info!("Configuration is valid. Exiting (--validate-only mode).");
        return Ok(());
    }

    let service = BackupService::from_config(&config);
    service
        .configure(&config)
        .context("Failed to schedule backup")?;

    if args.once {
        return run_once(&service);
    }

    run_scheduled(&service, &config, &args)
}

/// Config file plus command-line overrides, validated. A missing config
/// file is fine when the overrides supply the backup inputs.
fn load_backup_config(args: &Cli) -> Result<Config> {
    let config_file = args
        .config_file
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string();

    if !args.has_overrides() {
        return setup_config(&config_file).context("Failed to load configuration");
    }

    let mut config =
        load_config_or_default(&config_file).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    validate_config(&config).context("Configuration is invalid")?;
    Ok(config)
}

fn run_once(service: &BackupService) -> Result<()> {
    let run = service.run_now().context("Backup could not start")?;
    match run.status {
        RunStatus::Completed => {
            if let Some(archive) = &run.archive_path {
                info!("Backup written to {}", archive.display());
            }
            Ok(())
        }
        _ => bail!(
            "Backup failed: {}",
            run.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn run_scheduled(service: &BackupService, config: &Config, args: &Cli) -> Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let s = shutdown.clone();

    ctrlc::set_handler(move || {
        info!("Received shutdown signal, stopping scheduler...");
        s.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let panel = if args.quiet {
        None
    } else {
        Some(
            StatusPanel::new()
                .spawn(service.clone(), config.monitor_ui_interval(), shutdown.clone())
                .context("Failed to start status panel")?,
        )
    };

    if let (Some(time), Some(next)) = (service.scheduler().armed_time(), service.next_scheduled()) {
        info!(
            "Daily backup at {} (next: {}), activity log: {}",
            time,
            next.format("%Y-%m-%d %H:%M"),
            service.activity_log().path().display()
        );
    }

    let manual = if args.now {
        Some(
            service
                .spawn_manual_run()
                .context("Failed to start manual backup")?,
        )
    } else {
        None
    };

    let scheduler = service
        .start_scheduler(shutdown.clone())
        .context("Failed to start scheduler")?;

    scheduler
        .join()
        .map_err(|_| anyhow::anyhow!("Scheduler thread panicked"))?;
    if let Some(panel) = panel {
        join_logged(panel, "Status panel");
    }

    if service.is_running() {
        info!("Waiting for the active backup to finish...");
    }
    if let Some(Err(e)) = manual.and_then(|handle| join_logged(handle, "Manual backup")) {
        warn!("Manual backup could not start: {}", e);
    }
    service.wait_for_active_run();

    let history = service.history();
    for entry in history.iter().rev() {
        debug!(
            "Run {} {}: started {}, finished {}, {} archived, {} skipped, archive {}{}",
            entry.id,
            entry.status,
            entry.started_at,
            entry.completed_at.as_deref().unwrap_or("-"),
            entry.files_archived,
            entry.skipped_files,
            entry
                .archive_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry
                .error
                .as_ref()
                .map(|e| format!(", error: {}", e))
                .unwrap_or_default()
        );
    }
    info!(
        "Shutdown complete, {} backup(s) run this session",
        history.len()
    );
    Ok(())
}

fn import_quotes(args: &Cli) -> Result<()> {
    let config =
        load_config_or_default(&args.config_file).context("Failed to load configuration")?;
    let importer_config = &config.importer;
    validate_importer_config(importer_config).context("Importer configuration is invalid")?;

    set_db_pool(&importer_config.database_file)
        .context("Failed to initialize database connection pool")?;
    setup_database().context("Failed to set up database schema")?;

    let importer =
        QuoteImporter::from_config(importer_config).context("Failed to build HTTP client")?;
    let summary = importer.import_all(
        &importer_config.stocks,
        &importer_config.cryptos,
        upsert_quote,
    );

    for code in &summary.imported {
        if let Some(quote) = select_quote(code).context("Failed to read back quote")? {
            info!("{} ({}): {:.2} {}", quote.code, quote.kind, quote.price, quote.currency);
        }
    }
    info!(
        "{} investment(s) stored in {}",
        count_quotes().context("Failed to count stored quotes")?,
        importer_config.database_file
    );

    if summary.abandoned.is_empty() {
        info!("Investments imported successfully!");
    } else {
        warn!("Some quotes were not imported: {}", summary.abandoned.join(", "));
    }
    Ok(())
}
