// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Mirror backup pass.
//!
//! Copies every configured path underneath the mirror root, at the location
//! of its original absolute path. Directories are walked, and each file in
//! them gets its own skip-or-copy decision.

use crate::{
    backup::BackupTarget,
    compare::{hash_file, FileComparator},
    config::Configuration,
    copy::{copy_file, exclusions, walk_files},
    path::{strip_root, PathResolver},
    progress::CancelFlag,
    report::{describe, ErrorKind, OperationResult, PathResult},
    stats::StatisticsTracker,
};

use std::{
    cell::Cell,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// State of one mirror pass.
pub(crate) struct MirrorPass<'run, R, C>
where
    R: PathResolver,
    C: FileComparator,
{
    resolver: &'run R,
    comparator: C,
    stats: &'run StatisticsTracker,
    cancel: &'run CancelFlag,
    root: PathBuf,
    root_ready: Cell<bool>,
    skip_identical: bool,
    verify: bool,
    hash_verification: bool,
}

impl<'run, R, C> MirrorPass<'run, R, C>
where
    R: PathResolver,
    C: FileComparator,
{
    pub(crate) fn new(
        resolver: &'run R,
        stats: &'run StatisticsTracker,
        cancel: &'run CancelFlag,
        root: PathBuf,
        configuration: &Configuration,
        force_full_backup: bool,
    ) -> Self {
        Self {
            resolver,
            comparator: C::from_configuration(configuration),
            stats,
            cancel,
            root,
            root_ready: Cell::new(false),
            skip_identical: configuration.skip_identical && !force_full_backup,
            verify: configuration.verify_after_backup,
            hash_verification: configuration.hash_verification,
        }
    }

    /// Create mirror root on first file that needs it.
    fn ensure_root(&self) -> Result<(), String> {
        if self.root_ready.get() {
            return Ok(());
        }

        mkdirp::mkdirp(&self.root).map_err(|err| {
            warn!("cannot create mirror root {:?}: {err}", self.root.display());
            format!(
                "cannot create mirror directory {:?}: {err}",
                self.root.display()
            )
        })?;
        self.root_ready.set(true);

        Ok(())
    }

    /// Mirror one configured path.
    ///
    /// # Errors
    ///
    /// - Return description of failure if mirror root cannot be created. The
    ///   run cannot go on at that point.
    pub(crate) fn backup_target(
        &self,
        target: &BackupTarget,
        result: &mut OperationResult,
    ) -> Result<(), String> {
        let source = match self.resolver.resolve(&target.raw_path) {
            Ok(source) => source.into_path_buf(),
            Err(error) => {
                warn!("cannot resolve {:?}: {error}", target.raw_path);
                self.stats.record_failed();
                result.record(
                    &target.raw_path,
                    PathResult::failed(ErrorKind::Unknown, describe(&error)),
                );
                return Ok(());
            }
        };

        let metadata = match fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(error) => {
                warn!("skip {:?} of {}: {error}", source.display(), target.label);
                self.stats.record_failed();
                result.record(
                    &source,
                    PathResult::failed((&error).into(), format!("{}: {error}", source.display())),
                );
                return Ok(());
            }
        };

        if !self.resolver.check_readable(&source) {
            warn!("cannot read {:?}", source.display());
            self.stats.record_failed();
            result.record(
                &source,
                PathResult::failed(
                    ErrorKind::PermissionDenied,
                    format!("{} is not readable", source.display()),
                ),
            );
            return Ok(());
        }

        if !metadata.is_dir() {
            let outcome = self.backup_file(&source)?;
            result.record(source, outcome);
            return Ok(());
        }

        let exclude = match exclusions(&source, &target.exclude) {
            Ok(exclude) => exclude,
            Err(error) => {
                warn!("{}: {error}", target.label);
                self.stats.record_failed();
                result.record(&source, PathResult::failed(error.kind(), describe(&error)));
                return Ok(());
            }
        };

        for entry in walk_files(&source, &exclude) {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            match entry {
                Ok(file) => {
                    let outcome = self.backup_file(&file)?;
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

        Ok(())
    }

    /// Copy single file into mirror, unless it is already there unchanged.
    fn backup_file(&self, source: &Path) -> Result<PathResult, String> {
        let dest = self.root.join(strip_root(source));

        if self.skip_identical && self.comparator.are_identical(source, &dest) {
            debug!("unchanged {:?}", source.display());
            self.stats.record_skipped();
            return Ok(PathResult::skipped(dest, "unchanged"));
        }

        self.ensure_root()?;
        let bytes = match copy_file(source, &dest) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!("{error}");
                self.stats.record_failed();
                let outcome = PathResult::failed(error.kind(), describe(&error));
                return Ok(outcome.with_destination(dest));
            }
        };

        if self.verify {
            if let Err(message) = self.verify_copy(source, &dest) {
                warn!("{message}");
                self.stats.record_failed();
                let outcome = PathResult::failed(ErrorKind::FilesystemError, message);
                return Ok(outcome.with_destination(dest));
            }
        }

        self.stats.record_copied(bytes);
        Ok(PathResult::copied(dest))
    }

    fn verify_copy(&self, source: &Path, dest: &Path) -> Result<(), String> {
        let failed = |reason: String| {
            format!(
                "verification of {:?} failed: {reason}",
                dest.display()
            )
        };

        let source_len = fs::metadata(source).map_err(|err| failed(err.to_string()))?.len();
        let dest_len = fs::metadata(dest).map_err(|err| failed(err.to_string()))?.len();
        if source_len != dest_len {
            return Err(failed(format!("size {dest_len} != {source_len}")));
        }

        if self.hash_verification {
            let source_hash = hash_file(source).map_err(|err| failed(err.to_string()))?;
            let dest_hash = hash_file(dest).map_err(|err| failed(err.to_string()))?;
            if source_hash != dest_hash {
                return Err(failed("content hash differs".into()));
            }
        }

        Ok(())
    }
}
