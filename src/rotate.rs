// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rotation of backup artifacts.
//!
//! Archives and pre-restore safety backups pile up over time. Rotation keeps
//! only the most recent ones. It only ever touches entries whose names match
//! the naming convention dotvault itself uses, never arbitrary files that
//! happen to live in the same directory.
//!
//! Rotation is best effort. A deletion that fails is logged, and left for the
//! next run to try again. It must never block a new backup from being written.

use glob::Pattern;
use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};
use tracing::{debug, info, instrument, warn};

/// Delete oldest backup artifacts beyond a retention limit.
pub trait ArchiveRotator: Send + Sync + 'static {
    /// Rotate artifacts in destination directory, keeping `max_archives`.
    ///
    /// Returns paths that were actually deleted.
    fn rotate(&self, destination_dir: &Path, max_archives: usize) -> Vec<PathBuf>;
}

/// Rotate artifacts whose file name matches a glob pattern.
#[derive(Debug, Clone)]
pub struct GlobRotator {
    pattern: Pattern,
}

impl GlobRotator {
    /// Construct new rotator for file names matching pattern.
    ///
    /// # Errors
    ///
    /// - Return [`glob::PatternError`] if pattern is invalid.
    pub fn new(pattern: impl AsRef<str>) -> Result<Self, glob::PatternError> {
        Ok(Self {
            pattern: Pattern::new(pattern.as_ref())?,
        })
    }

    /// List matching artifacts, oldest first.
    ///
    /// Ties on modification time are broken by name, which embeds the
    /// creation timestamp.
    pub fn list(&self, destination_dir: &Path) -> Vec<PathBuf> {
        let entries = match fs::read_dir(destination_dir) {
            Ok(entries) => entries,
            Err(error) => {
                debug!(
                    "nothing to rotate in {:?}: {error}",
                    destination_dir.display()
                );
                return Vec::new();
            }
        };

        let mut artifacts: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.pattern.matches(name))
            })
            .map(|entry| {
                let modified = entry
                    .metadata()
                    .and_then(|meta| meta.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (modified, entry.path())
            })
            .collect();
        artifacts.sort();

        artifacts.into_iter().map(|(_, path)| path).collect()
    }
}

impl ArchiveRotator for GlobRotator {
    #[instrument(skip(self), level = "debug")]
    fn rotate(&self, destination_dir: &Path, max_archives: usize) -> Vec<PathBuf> {
        let artifacts = self.list(destination_dir);
        if artifacts.len() <= max_archives {
            return Vec::new();
        }

        let excess = artifacts.len() - max_archives;
        let mut deleted = Vec::new();
        for path in artifacts.into_iter().take(excess) {
            let outcome = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };

            match outcome {
                Ok(()) => {
                    info!("rotate out {:?}", path.display());
                    deleted.push(path);
                }
                Err(error) => warn!("failed to rotate out {:?}: {error}", path.display()),
            }
        }

        deleted
    }
}
