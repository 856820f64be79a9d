// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Pre-restore safety backups.
//!
//! Every restore run gets its own `pre_restore_<timestamp>` directory. Live
//! files are copied into it, at their mirrored location, right before they
//! get overwritten. The directory only comes into existence once the first
//! file needs saving.

use crate::{
    copy::{copy_file, Result},
    path::strip_root,
    rotate::{ArchiveRotator, GlobRotator},
};

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prefix of every safety backup directory.
pub const SAFETY_PREFIX: &str = "pre_restore_";

/// Safety backup of one restore run.
#[derive(Debug)]
pub(crate) struct SafetyBackup {
    root: PathBuf,
    run_dir: PathBuf,
    saved: usize,
}

impl SafetyBackup {
    pub(crate) fn new(root: PathBuf, now: DateTime<Local>) -> Self {
        let stamp = now.format("%Y%m%d_%H%M%S_%6f");
        let mut run_dir = root.join(format!("{SAFETY_PREFIX}{stamp}"));
        let mut n = 1;
        while run_dir.exists() {
            run_dir = root.join(format!("{SAFETY_PREFIX}{stamp}_{n}"));
            n += 1;
        }

        Self {
            root,
            run_dir,
            saved: 0,
        }
    }

    /// Save current content of live file, if there is any.
    ///
    /// Returns where the content was saved to, or `None` if the live file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// - Return [`CopyError`](crate::copy::CopyError) if live file exists,
    ///   but cannot be saved.
    pub(crate) fn save(&mut self, live: &Path) -> Result<Option<PathBuf>> {
        if !live.exists() {
            return Ok(None);
        }

        let dest = self.run_dir.join(strip_root(live));
        copy_file(live, &dest)?;
        self.saved += 1;
        debug!("saved {:?} to {:?}", live.display(), dest.display());

        Ok(Some(dest))
    }

    /// Directory of this run, if anything was saved into it.
    pub(crate) fn run_dir(&self) -> Option<&Path> {
        (self.saved > 0).then_some(self.run_dir.as_path())
    }

    /// Delete oldest safety backups beyond limit.
    pub(crate) fn rotate(&self, max_restore_backups: usize) -> Vec<PathBuf> {
        match GlobRotator::new(format!("{SAFETY_PREFIX}*")) {
            Ok(rotator) => rotator.rotate(&self.root, max_restore_backups),
            Err(error) => {
                warn!("cannot rotate safety backups: {error}");
                Vec::new()
            }
        }
    }
}
