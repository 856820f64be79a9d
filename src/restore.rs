// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Restore orchestration.
//!
//! Restore reads a mirror backup tree, turns every file in it back into the
//! absolute path it was taken from, and copies it there.
//!
//! # Safety Backups
//!
//! With `pre_restore_backup` enabled, the live version of every file is saved
//! right before that file is overwritten. Saving and restoring alternate file
//! by file, so a restore that dies halfway has already saved everything it
//! touched. If the live version cannot be saved, that one file is left alone
//! and reported failed. The rest of the run goes on.
//!
//! # Foreign Hosts
//!
//! A backup taken on another machine can still be restored, but the paths in
//! it may not mean anything here. The run carries a warning about it. Asking
//! the user whether to go on is up to the caller, see
//! [`RestoreOrchestrator::inspect`].

pub mod layout;
pub mod safety;

pub use layout::{BackupLayout, LayoutError, RestoreOptions};

use crate::{
    config::Configuration,
    copy::copy_file,
    path::{self, PathResolver, ShellPathResolver},
    progress::{percent, CancelFlag, ProgressSink},
    report::{describe, ErrorKind, OperationResult, PathResult},
    stats::StatisticsTracker,
};
use safety::SafetyBackup;

use chrono::Local;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, instrument, warn};

/// Execute restore runs out of mirror backups.
#[derive(Debug)]
pub struct RestoreOrchestrator<R = ShellPathResolver>
where
    R: PathResolver,
{
    configuration: Configuration,
    resolver: R,
    hostname: String,
    stats: Arc<StatisticsTracker>,
    cancel: CancelFlag,
}

impl RestoreOrchestrator {
    /// Construct new orchestrator using safety backup settings of configuration.
    pub fn new(configuration: Configuration) -> Self {
        Self::with_resolver(configuration, ShellPathResolver::new())
    }
}

impl<R> RestoreOrchestrator<R>
where
    R: PathResolver,
{
    /// Construct new orchestrator with given path resolver.
    pub fn with_resolver(configuration: Configuration, resolver: R) -> Self {
        Self {
            configuration,
            resolver,
            hostname: path::hostname(),
            stats: Arc::new(StatisticsTracker::new()),
            cancel: CancelFlag::new(),
        }
    }

    /// Treat given hostname as the current machine.
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

    /// Look at what a restore would use, without copying anything.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError`] if no restorable tree can be picked out of
    ///   backup source.
    pub fn inspect(
        &self,
        backup_source_dir: impl AsRef<Path>,
        options: &RestoreOptions,
    ) -> Result<BackupLayout, LayoutError> {
        BackupLayout::discover(backup_source_dir.as_ref(), options, &self.hostname)
    }

    /// Execute one restore run.
    ///
    /// Never fails outright. A backup source whose layout cannot be made out
    /// yields a `Failed` result before anything is written. Per-file failures
    /// are recorded, keyed by the backed up file, with the live path as
    /// destination.
    #[instrument(skip(self, options, progress), level = "debug")]
    pub fn execute(
        &self,
        backup_source_dir: &Path,
        options: &RestoreOptions,
        progress: &mut dyn ProgressSink,
    ) -> OperationResult {
        let layout = match self.inspect(backup_source_dir, options) {
            Ok(layout) => layout,
            Err(error) => {
                warn!("cannot restore from {:?}: {error}", backup_source_dir.display());
                return OperationResult::failed(describe(&error)).finish(false);
            }
        };

        let mut safety = None;
        if self.configuration.pre_restore_backup && !options.dry_run {
            match self.safety_root() {
                Ok(root) => safety = Some(SafetyBackup::new(root, Local::now())),
                Err(warning) => return OperationResult::failed(warning).finish(false),
            }
        }

        self.stats.reset();
        let mut result = OperationResult::new();
        if layout.foreign_host {
            result.warn(format!(
                "restoring backup of host {:?} onto {:?}, paths may not match this machine",
                layout.host.as_deref().unwrap_or_default(),
                self.hostname
            ));
        }

        let files = layout.files();
        let total = files.len();
        info!(
            "restore {total} file(s) from {:?}{}",
            layout.tree.display(),
            if options.dry_run { " (dry run)" } else { "" }
        );

        for (done, entry) in files.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }

            match entry {
                Ok(file) => {
                    let outcome = self.restore_file(&layout, &file, options, safety.as_mut());
                    progress.on_progress(percent(done + 1, total), &file.display().to_string());
                    result.record(file, outcome);
                }
                Err(error) => {
                    warn!("{error}");
                    self.stats.record_failed();
                    result.record(
                        error.path().to_path_buf(),
                        PathResult::failed(error.kind(), describe(&error)),
                    );
                }
            }
        }

        let cancelled = self.cancel.is_cancelled();
        if let Some(safety) = &safety {
            if let Some(run_dir) = safety.run_dir() {
                info!("saved overwritten files to {:?}", run_dir.display());
            }

            if !cancelled {
                safety.rotate(self.configuration.max_restore_backups);
            }
        }

        if cancelled {
            warn!("restore cancelled");
            result.warn("restore cancelled before all files were processed");
        }

        let result = result.finish(cancelled);
        info!("restore {}: {}", result.status, result.summary());
        result
    }

    fn restore_file(
        &self,
        layout: &BackupLayout,
        file: &Path,
        options: &RestoreOptions,
        safety: Option<&mut SafetyBackup>,
    ) -> PathResult {
        let Some(live) = layout.original_path(file) else {
            self.stats.record_failed();
            return PathResult::failed(
                ErrorKind::Unknown,
                format!("{} is outside of backup tree", file.display()),
            );
        };

        if options.dry_run {
            debug!("would restore {:?} to {:?}", file.display(), live.display());
            self.stats.record_skipped();
            return PathResult::skipped(live, "dry run");
        }

        if let Some(safety) = safety {
            if let Err(error) = safety.save(&live) {
                warn!("not restoring {:?}, cannot save it first: {error}", live.display());
                self.stats.record_failed();
                return PathResult::failed(
                    error.kind(),
                    format!("pre-restore backup failed: {}", describe(&error)),
                )
                .with_destination(live);
            }
        }

        match copy_file(file, &live) {
            Ok(bytes) => {
                self.stats.record_copied(bytes);
                PathResult::copied(live)
            }
            Err(error) => {
                warn!("{error}");
                self.stats.record_failed();
                PathResult::failed(error.kind(), describe(&error)).with_destination(live)
            }
        }
    }

    fn safety_root(&self) -> Result<PathBuf, String> {
        match &self.configuration.restore_backup_dir {
            Some(raw) => self
                .resolver
                .resolve(raw)
                .map(|path| path.into_path_buf())
                .map_err(|err| format!("cannot resolve restore backup directory {raw:?}: {err}")),
            None => path::default_restore_backup_dir()
                .map_err(|err| format!("cannot determine restore backup directory: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        path::strip_root,
        progress::NoProgress,
        report::{OperationStatus, PathStatus},
        rotate::GlobRotator,
    };
    use pretty_assertions::assert_eq;
    use std::fs;

    struct Fixture {
        _dir: tempfile::TempDir,
        mirror: PathBuf,
        live: PathBuf,
        safety: PathBuf,
    }

    impl Fixture {
        fn new() -> anyhow::Result<Self> {
            let dir = tempfile::tempdir()?;
            let mirror = dir.path().join("mirror");
            let live = dir.path().join("live/.bashrc");
            let safety = dir.path().join("safety");
            Ok(Self {
                mirror,
                live,
                safety,
                _dir: dir,
            })
        }

        fn stage(&self, host: &str, content: &str) -> anyhow::Result<PathBuf> {
            let backed_up = self.mirror.join(host).join(strip_root(&self.live));
            fs::create_dir_all(backed_up.parent().unwrap_or(&self.mirror))?;
            fs::write(&backed_up, content)?;
            Ok(backed_up)
        }

        fn configuration(&self) -> Configuration {
            Configuration {
                restore_backup_dir: Some(self.safety.display().to_string()),
                ..Default::default()
            }
        }
    }

    #[test]
    fn restore_saves_live_file_before_overwrite() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let backed_up = fixture.stage("box", "from backup")?;
        fs::create_dir_all(fixture.live.parent().unwrap_or(&fixture.mirror))?;
        fs::write(&fixture.live, "live before restore")?;

        let result = RestoreOrchestrator::new(fixture.configuration())
            .with_hostname("box")
            .execute(&fixture.mirror, &RestoreOptions::default(), &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!(result.get(&backed_up), Some(&PathResult::copied(&fixture.live)));
        assert_eq!(fs::read_to_string(&fixture.live)?, "from backup");

        let saved = GlobRotator::new("pre_restore_*")?.list(&fixture.safety);
        assert_eq!(saved.len(), 1);
        assert_eq!(
            fs::read_to_string(saved[0].join(strip_root(&fixture.live)))?,
            "live before restore"
        );

        Ok(())
    }

    #[test]
    fn dry_run_writes_nothing() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        let backed_up = fixture.stage("box", "from backup")?;

        let options = RestoreOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = RestoreOrchestrator::new(fixture.configuration())
            .with_hostname("box")
            .execute(&fixture.mirror, &options, &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!(
            result.get(&backed_up).map(|r| &r.status),
            Some(&PathStatus::Skipped("dry run".into()))
        );
        assert!(!fixture.live.exists());
        assert!(!fixture.safety.exists());

        Ok(())
    }

    #[test]
    fn foreign_host_is_warning() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.stage("laptop", "from laptop")?;

        let orchestrator =
            RestoreOrchestrator::new(fixture.configuration()).with_hostname("desktop");
        let layout = orchestrator.inspect(&fixture.mirror, &RestoreOptions::default())?;
        assert!(layout.foreign_host);
        assert_eq!(layout.file_count, 1);

        let result =
            orchestrator.execute(&fixture.mirror, &RestoreOptions::default(), &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("laptop"));
        assert_eq!(fs::read_to_string(&fixture.live)?, "from laptop");

        Ok(())
    }

    #[test]
    fn unreadable_layout_fails_run() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.stage("a", "a")?;
        fixture.stage("b", "b")?;

        let result = RestoreOrchestrator::new(fixture.configuration())
            .with_hostname("box")
            .execute(&fixture.mirror, &RestoreOptions::default(), &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Failed);
        assert!(result.per_path_results.is_empty());
        assert!(!fixture.live.exists());

        Ok(())
    }

    #[test]
    fn cancelled_restore_stops_between_files() -> anyhow::Result<()> {
        let fixture = Fixture::new()?;
        fixture.stage("box", "from backup")?;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let result = RestoreOrchestrator::new(fixture.configuration())
            .with_hostname("box")
            .with_cancel_flag(cancel)
            .execute(&fixture.mirror, &RestoreOptions::default(), &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Cancelled);
        assert!(!fixture.live.exists());

        Ok(())
    }
}
