use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{error, info};
use volume_backup::config::{
    self, BackupOverrides, ProcessEnv, RestoreOverrides, Source,
};
use volume_backup::managers::backup::BackupManager;
use volume_backup::managers::logging::{self, LoggingConfig};
use volume_backup::managers::notification::{NotificationManager, Notifier};
use volume_backup::managers::restore::RestoreManager;
use volume_backup::managers::scheduler::{self, Mode, Scheduler};

#[derive(Parser)]
#[command(name = "volume-backup")]
#[command(about = "Backup and restore a data volume to local, S3, SSH or FTP storage", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StorageArgs {
    /// Storage backend: local, s3, ssh or ftp
    #[arg(short, long)]
    storage: Option<String>,

    /// Remote path without file name, e.g. /custom_path
    #[arg(short = 'P', long)]
    path: Option<String>,

    /// File name, relative to the data root for backups
    #[arg(short, long)]
    file: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Back up the data volume, once or on a cron schedule
    Backup {
        #[command(flatten)]
        storage: StorageArgs,

        /// Cron expression for scheduled mode, e.g. "0 1 * * *"
        #[arg(long, alias = "period", value_name = "EXPR")]
        cron_expression: Option<String>,

        /// Delete backups older than the retention period
        #[arg(long)]
        prune: bool,

        /// Retention period in days (implies --prune)
        #[arg(long, value_name = "DAYS")]
        keep_last: Option<u32>,
    },

    /// Restore a backup into the data volume
    Restore {
        #[command(flatten)]
        storage: StorageArgs,
    },

    /// Show version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("volume-backup {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let logging_config = LoggingConfig::from_env(&ProcessEnv);
    let _log_guard = match logging::init_logging(&logging_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_console_logging();
            error!("Falling back to console logging: {:#}", e);
            None
        }
    };

    let result = match cli.command {
        Commands::Backup {
            storage,
            cron_expression,
            prune,
            keep_last,
        } => handle_backup(BackupOverrides {
            storage: storage.storage,
            path: storage.path,
            file: storage.file,
            cron_expression,
            prune,
            keep_last,
        }),
        Commands::Restore { storage } => handle_restore(RestoreOverrides {
            storage: storage.storage,
            path: storage.path,
            file: storage.file,
        }),
        Commands::Version => Ok(()),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn intro() {
    info!("Starting Volume Backup {}...", env!("CARGO_PKG_VERSION"));
}

fn notifier() -> Arc<dyn Notifier> {
    let manager = NotificationManager::from_env(&ProcessEnv);
    if manager.is_enabled() {
        info!("Notifications enabled: {}", manager.channel_names().join(", "));
    }
    Arc::new(manager)
}

fn handle_backup(overrides: BackupOverrides) -> Result<()> {
    intro();

    let config = config::resolve_backup_config(&overrides, &ProcessEnv)
        .context("Invalid backup configuration")?;
    config.export_env();

    let scheduler = Scheduler::from_expression(&config.cron_expression)?;
    let storage = config.storage;
    match &config.source {
        Source::File(name) => info!("Backup mode: single file {}", name),
        Source::Folder => info!("Backup mode: data folder {}", config.paths.data.display()),
    }
    if config.encryption() {
        info!("Encryption is enabled");
    }

    let manager = Arc::new(BackupManager::new(config, notifier()));

    match scheduler.mode() {
        Mode::OneShot => {
            manager.run()?;
        }
        Mode::Scheduled => {
            info!("Running in Scheduled mode");
            info!("Backup cron expression: {}", scheduler.expression());
            info!("Storage type {}", storage);

            info!("Testing backup configuration...");
            manager.run().context("Backup configuration test failed")?;
            info!("Testing backup configuration...done");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start the scheduler runtime")?;

            let job = manager.clone();
            runtime.block_on(scheduler.run(
                move || job.run().map(|_| ()),
                scheduler::shutdown_signal(),
            ))?;
            info!("Scheduler stopped");
        }
    }

    Ok(())
}

fn handle_restore(overrides: RestoreOverrides) -> Result<()> {
    intro();

    let config = config::resolve_restore_config(&overrides, &ProcessEnv)
        .context("Invalid restore configuration")?;
    config.export_env();

    let manager = RestoreManager::new(config, notifier());
    manager.run()?;

    Ok(())
}
