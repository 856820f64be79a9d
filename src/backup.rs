// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Backup orchestration.
//!
//! A backup run takes every enabled item of a [`Configuration`], and writes
//! its paths into one or both destination layouts.
//!
//! # Mirror Layout
//!
//! The __mirror__ replicates the directory structure of every backed-up file
//! 1:1 underneath a root. The root is `mirror_dir`, optionally followed by
//! the hostname, and optionally followed by the backup date. So with both
//! enabled, `/home/user/.bashrc` lands at
//! `{mirror_dir}/{hostname}/{YYYY-MM-DD}/home/user/.bashrc`. Restore depends
//! on this layout staying stable.
//!
//! Files whose size and modification time already match their mirrored copy
//! are skipped, unless the run forces a full backup.
//!
//! # Archive Layout
//!
//! The __archive__ is a single compressed snapshot per run, named
//! `dotfiles_backup_<timestamp>.<ext>`, placed in `archive_dir` with the same
//! optional hostname and date namespacing. Entries inside use the same
//! root-stripped paths as the mirror. Archives are always full snapshots.
//! Old archives beyond `max_archives` are rotated away after a successful
//! write.
//!
//! # Failure Model
//!
//! Only two things stop a run before it starts: a configuration error, or a
//! destination root that cannot be created at all. Everything else is caught
//! per path, recorded, and the run moves on to the next path.

pub mod archive;
pub mod mirror;

use crate::{
    backup::{archive::ArchivePass, mirror::MirrorPass},
    compare::{FileComparator, MetadataComparator},
    config::Configuration,
    path::{self, PathResolver, ShellPathResolver},
    progress::{percent, CancelFlag, ProgressSink},
    report::OperationResult,
    stats::StatisticsTracker,
};

use chrono::{DateTime, Local};
use std::{marker::PhantomData, path::PathBuf, sync::Arc};
use tracing::{info, instrument, warn};

/// Execute backup runs over a configuration.
#[derive(Debug)]
pub struct BackupOrchestrator<R = ShellPathResolver, C = MetadataComparator>
where
    R: PathResolver,
    C: FileComparator,
{
    resolver: R,
    hostname: String,
    stats: Arc<StatisticsTracker>,
    cancel: CancelFlag,
    comparator: PhantomData<C>,
}

impl Default for BackupOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl BackupOrchestrator {
    /// Construct new orchestrator with default components.
    pub fn new() -> Self {
        Self::with_resolver(ShellPathResolver::new())
    }
}

impl<R, C> BackupOrchestrator<R, C>
where
    R: PathResolver,
    C: FileComparator,
{
    /// Construct new orchestrator with given path resolver.
    pub fn with_resolver(resolver: R) -> Self {
        Self {
            resolver,
            hostname: path::hostname(),
            stats: Arc::new(StatisticsTracker::new()),
            cancel: CancelFlag::new(),
            comparator: PhantomData,
        }
    }

    /// Use given hostname for namespacing instead of the machine's own.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Check given flag between files, stopping the run once it is set.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Live statistics of the current, or last, run.
    pub fn stats(&self) -> Arc<StatisticsTracker> {
        Arc::clone(&self.stats)
    }

    /// Execute one backup run.
    ///
    /// Never fails outright. Configuration errors yield a `Failed` result
    /// before any I/O happens. Per-path failures are recorded, and the run
    /// continues with the next path.
    ///
    /// With `force_full_backup`, every existing path is copied even if its
    /// mirrored copy is unchanged.
    #[instrument(skip_all, level = "debug")]
    pub fn execute(
        &self,
        configuration: &Configuration,
        force_full_backup: bool,
        progress: &mut dyn ProgressSink,
    ) -> OperationResult {
        if !configuration.mirror_enabled && !configuration.archive_enabled {
            warn!("neither mirror nor archive backup is enabled");
            return OperationResult::failed(
                "configuration error: neither mirror nor archive backup is enabled",
            )
            .finish(false);
        }

        if let Err(error) = configuration.validate() {
            warn!("invalid configuration: {error}");
            return OperationResult::failed(format!("configuration error: {error}")).finish(false);
        }

        let targets = BackupTarget::collect(configuration);
        if targets.is_empty() {
            info!("no enabled items to back up");
            return OperationResult::new().finish(false);
        }

        self.stats.reset();
        let now = Local::now();
        let mut result = OperationResult::new();
        let passes = usize::from(configuration.mirror_enabled)
            + usize::from(configuration.archive_enabled);
        let total = targets.len() * passes;
        let mut done = 0;

        info!(
            "back up {} path(s) from {} item(s)",
            targets.len(),
            configuration.enabled_items().count()
        );

        if configuration.mirror_enabled {
            let root = match self.destination_root(&configuration.mirror_dir, configuration, now)
            {
                Ok(root) => root,
                Err(warning) => return result.finish_fatal(warning),
            };

            let pass = MirrorPass::<R, C>::new(
                &self.resolver,
                &self.stats,
                &self.cancel,
                root,
                configuration,
                force_full_backup,
            );

            for target in &targets {
                if self.cancel.is_cancelled() {
                    break;
                }

                if let Err(warning) = pass.backup_target(target, &mut result) {
                    return result.finish_fatal(warning);
                }
                done += 1;
                progress.on_progress(percent(done, total), &target.label);
            }
        }

        if configuration.archive_enabled && !self.cancel.is_cancelled() {
            let root = match self.destination_root(&configuration.archive_dir, configuration, now)
            {
                Ok(root) => root,
                Err(warning) => return result.finish_fatal(warning),
            };

            let mut pass = match ArchivePass::begin(
                &self.resolver,
                &self.stats,
                &self.cancel,
                root,
                configuration,
                now,
            ) {
                Ok(pass) => pass,
                Err(warning) => return result.finish_fatal(warning),
            };

            for target in &targets {
                if self.cancel.is_cancelled() {
                    break;
                }

                pass.backup_target(target, &mut result);
                done += 1;
                progress.on_progress(percent(done, total), &target.label);
            }

            pass.finish(configuration, &mut result);
        }

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            warn!("backup cancelled");
            result.warn("backup cancelled before all items were processed");
        }

        let result = result.finish(cancelled);
        info!("backup {}: {}", result.status, result.summary());
        result
    }

    /// Compute destination root of a run.
    ///
    /// Appends hostname and date namespaces as configured.
    fn destination_root(
        &self,
        raw: &str,
        configuration: &Configuration,
        now: DateTime<Local>,
    ) -> Result<PathBuf, String> {
        let mut root = self
            .resolver
            .resolve(raw)
            .map_err(|err| format!("cannot resolve destination {raw:?}: {err}"))?
            .into_path_buf();

        if configuration.hostname_subdir {
            root.push(&self.hostname);
        }

        if configuration.date_subdir {
            root.push(date_dir_name(now));
        }

        Ok(root)
    }
}

/// Name of date namespace directory.
pub fn date_dir_name(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// One configured path of an enabled item.
#[derive(Debug, Clone)]
pub(crate) struct BackupTarget {
    pub(crate) label: String,
    pub(crate) raw_path: String,
    pub(crate) exclude: Vec<String>,
}

impl BackupTarget {
    /// Flatten enabled items into their paths, in declared order.
    pub(crate) fn collect(configuration: &Configuration) -> Vec<Self> {
        configuration
            .enabled_items()
            .flat_map(|item| {
                let label = item.label();
                item.paths.iter().map(move |raw_path| Self {
                    label: label.clone(),
                    raw_path: raw_path.clone(),
                    exclude: item.exclude.clone(),
                })
            })
            .collect()
    }
}
