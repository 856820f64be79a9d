// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use dotvault::{
    path::{default_config_path, PathResolver, ShellPathResolver},
    BackupOrchestrator, CancelFlag, Configuration, ErrorKind, ItemId, OperationResult,
    OperationStatus, PathStatus, ProgressSink, RestoreOptions, RestoreOrchestrator,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{
    fs,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "dotvault [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file to use instead of the default one.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config_path = match self.config {
            Some(path) => path,
            None => default_config_path()?,
        };

        match self.command {
            Command::Backup(opts) => run_backup(&config_path, opts).await,
            Command::Restore(opts) => run_restore(&config_path, opts).await,
            Command::Check => run_check(&config_path),
            Command::Enable(opts) => run_toggle(&config_path, opts, true),
            Command::Disable(opts) => run_toggle(&config_path, opts, false),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Back up every enabled item.
    #[command(override_usage = "dotvault backup [options]")]
    Backup(BackupOptions),

    /// Restore files out of a mirror backup.
    #[command(override_usage = "dotvault restore [options] <backup_dir>")]
    Restore(RestoreCliOptions),

    /// Validate configuration, and show which paths would be backed up.
    #[command(override_usage = "dotvault check [options]")]
    Check,

    /// Enable item for future backups.
    #[command(override_usage = "dotvault enable <category> <subcategory> <application>")]
    Enable(ItemOptions),

    /// Disable item for future backups.
    #[command(override_usage = "dotvault disable <category> <subcategory> <application>")]
    Disable(ItemOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct BackupOptions {
    /// Copy every file, even if its mirrored copy is unchanged.
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestoreCliOptions {
    /// Mirror directory to restore from.
    #[arg(required = true, value_name = "backup_dir")]
    pub backup_dir: PathBuf,

    /// Restore backup of another host.
    #[arg(long, value_name = "hostname")]
    pub host: Option<String>,

    /// Restore backup of given date instead of the latest one.
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub date: Option<String>,

    /// Only show what would be restored.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ItemOptions {
    #[arg(value_name = "category")]
    pub category: String,

    #[arg(value_name = "subcategory")]
    pub subcategory: String,

    #[arg(value_name = "application")]
    pub application_name: String,
}

/// Progress bar that the orchestrators report into.
struct BarSink {
    bar: ProgressBar,
}

impl BarSink {
    fn new() -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}] {pos:>3}%",
        )?
        .progress_chars("-Cco.");
        let bar = ProgressBar::new(100);
        bar.set_style(style);
        Ok(Self { bar })
    }
}

impl ProgressSink for BarSink {
    fn on_progress(&mut self, percent_complete: u8, current_item_label: &str) {
        self.bar.set_position(u64::from(percent_complete));
        self.bar.set_message(current_item_label.to_string());
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info"),
    };
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn run_backup(config_path: &Path, opts: BackupOptions) -> Result<()> {
    let configuration = load_config(config_path)?;
    let cancel = cancel_on_interrupt();
    let mut sink = BarSink::new()?;
    let bar = sink.bar.clone();

    let result = tokio::task::spawn_blocking(move || {
        BackupOrchestrator::new()
            .with_cancel_flag(cancel)
            .execute(&configuration, opts.force, &mut sink)
    })
    .await?;
    bar.finish_and_clear();

    report(&result)
}

async fn run_restore(config_path: &Path, opts: RestoreCliOptions) -> Result<()> {
    let configuration = load_config(config_path)?;
    let options = RestoreOptions {
        source_host: opts.host,
        date: opts.date,
        dry_run: opts.dry_run,
    };
    let orchestrator =
        RestoreOrchestrator::new(configuration).with_cancel_flag(cancel_on_interrupt());

    let layout = orchestrator.inspect(&opts.backup_dir, &options)?;
    info!(
        "restore {} file(s) from {:?}",
        layout.file_count,
        layout.tree.display()
    );

    if layout.foreign_host && !opts.yes && !options.dry_run {
        let host = layout.host.as_deref().unwrap_or_default();
        let prompt = format!("backup was taken on {host:?}, restore it onto this machine anyway?");
        if !Confirm::new(&prompt).with_default(false).prompt()? {
            info!("restore aborted");
            return Ok(());
        }
    }

    let mut sink = BarSink::new()?;
    let bar = sink.bar.clone();
    let backup_dir = opts.backup_dir;
    let result = tokio::task::spawn_blocking(move || {
        orchestrator.execute(&backup_dir, &options, &mut sink)
    })
    .await?;
    bar.finish_and_clear();

    report(&result)
}

fn run_check(config_path: &Path) -> Result<()> {
    let configuration = load_config(config_path)?;
    configuration
        .validate()
        .with_context(|| format!("invalid configuration {:?}", config_path.display()))?;

    let resolver = ShellPathResolver::new();
    let mut missing = 0;
    let mut total = 0;
    for item in configuration.enabled_items() {
        for raw in &item.paths {
            total += 1;
            match resolver.resolve(raw) {
                Ok(path) if resolver.check_readable(path.as_path()) => {
                    info!("{}: {}", item.label(), path.as_path().display());
                }
                Ok(path) => {
                    missing += 1;
                    warn!(
                        "{}: {} is missing or unreadable",
                        item.label(),
                        path.as_path().display()
                    );
                }
                Err(error) => {
                    missing += 1;
                    warn!("{}: {error}", item.label());
                }
            }
        }
    }

    println!("{total} path(s) configured, {missing} missing or unreadable");
    Ok(())
}

fn run_toggle(config_path: &Path, opts: ItemOptions, enabled: bool) -> Result<()> {
    let mut configuration = load_config(config_path)?;
    let id = ItemId::new(opts.category, opts.subcategory, opts.application_name);
    configuration.set_enabled(&id, enabled)?;
    save_config(config_path, &configuration)?;
    info!("{} {id}", if enabled { "enabled" } else { "disabled" });

    Ok(())
}

fn load_config(path: &Path) -> Result<Configuration> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {:?}", path.display()))?;
    let configuration = data
        .parse::<Configuration>()
        .with_context(|| format!("failed to parse configuration {:?}", path.display()))?;

    Ok(configuration)
}

fn save_config(path: &Path, configuration: &Configuration) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent)?;
    }
    fs::write(path, configuration.to_string())
        .with_context(|| format!("failed to write configuration {:?}", path.display()))?;

    Ok(())
}

fn cancel_on_interrupt() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping after current file");
            flag.cancel();
        }
    });

    cancel
}

fn report(result: &OperationResult) -> Result<()> {
    for warning in &result.warnings {
        warn!("{warning}");
    }

    for (path, outcome) in result.failures() {
        let message = outcome.message.as_deref().unwrap_or_default();
        match &outcome.status {
            PathStatus::Failed(kind) => error!("{}: {message} ({})", path.display(), hint(*kind)),
            _ => error!("{}: {message}", path.display()),
        }
    }

    println!("{}: {}", result.status, result.summary());
    match result.status {
        OperationStatus::Success => Ok(()),
        status => Err(anyhow!("run finished with status: {status}")),
    }
}

fn hint(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::PermissionDenied => "check file permissions",
        ErrorKind::NotFound => "path no longer exists, update or disable its item",
        ErrorKind::FilesystemError => "check free space and destination file system",
        ErrorKind::Unknown => "see log for details",
    }
}
