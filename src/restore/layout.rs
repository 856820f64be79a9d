// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Discovery of mirror backup layout.
//!
//! A mirror root may hold one namespace directory per machine, and inside
//! that, one namespace directory per backup date. Before anything can be
//! restored, the right namespace has to be picked, so the remaining relative
//! paths can be turned back into absolute ones.
//!
//! # Recognizing Mirrored Trees
//!
//! The layout is read off the tree itself, not off the configuration that
//! wrote it. The caller may point at the mirror root, at a host namespace, or
//! at a date namespace, and may have changed `hostname_subdir` or
//! `date_subdir` since the backup was taken.
//!
//! A directory counts as a mirrored tree when one of its subdirectories names
//! an entry of the live file system root, like `home` or `etc`. A host
//! namespace is only accepted when it holds such a tree, directly or under a
//! `YYYY-MM-DD` directory. Nothing is ever guessed: a source that fits more
//! than one reading, or none, is a layout error.

use crate::copy::{exclusions, walk_files};

use chrono::NaiveDate;
use std::{
    fs,
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// How to pick what gets restored out of a backup tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreOptions {
    /// Restore from this host's namespace instead of the current machine's.
    pub source_host: Option<String>,

    /// Restore from this `YYYY-MM-DD` namespace instead of the latest one.
    pub date: Option<String>,

    /// Report what would be restored without writing anything.
    pub dry_run: bool,
}

/// Resolved layout of one backup tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupLayout {
    /// Host namespace that was selected, if any.
    pub host: Option<String>,

    /// Selected host differs from current machine.
    pub foreign_host: bool,

    /// Date namespace that was selected, if any.
    pub date: Option<String>,

    /// Directory whose contents mirror the root of the file system.
    pub tree: PathBuf,

    /// Number of files found in tree.
    pub file_count: usize,
}

impl BackupLayout {
    /// Discover layout of backup tree at root.
    ///
    /// Root may be a mirror root, a host namespace, or a date namespace.
    /// Explicit options always win over what the tree suggests.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::Missing`] if root is not a directory.
    /// - Return [`LayoutError::ReadDir`] if a namespace cannot be listed.
    /// - Return [`LayoutError::HostNotFound`] if requested host is absent.
    /// - Return [`LayoutError::AmbiguousHost`] if no single host qualifies.
    /// - Return [`LayoutError::DateNotFound`] if requested date is absent.
    /// - Return [`LayoutError::Unrecognized`] if selected tree does not mirror
    ///   the file system root.
    pub fn discover(root: &Path, options: &RestoreOptions, current_host: &str) -> Result<Self> {
        Layout::new(&on_live_root).discover(root, options, current_host)
    }

    /// List every file in tree, in sorted order.
    pub fn files(&self) -> Vec<crate::copy::Result<PathBuf>> {
        files(&self.tree)
    }

    /// Turn backed up file back into the absolute path it was taken from.
    ///
    /// Returns `None` for paths outside of the tree.
    pub fn original_path(&self, file: &Path) -> Option<PathBuf> {
        let relative = file.strip_prefix(&self.tree).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }

        Some(Path::new("/").join(relative))
    }
}

fn on_live_root(name: &str) -> bool {
    Path::new("/").join(name).exists()
}

struct Layout<'a> {
    is_root_entry: &'a dyn Fn(&str) -> bool,
}

impl<'a> Layout<'a> {
    fn new(is_root_entry: &'a dyn Fn(&str) -> bool) -> Self {
        Self { is_root_entry }
    }

    fn discover(
        &self,
        root: &Path,
        options: &RestoreOptions,
        current_host: &str,
    ) -> Result<BackupLayout> {
        if !root.is_dir() {
            return Err(LayoutError::Missing { path: root.into() });
        }

        let mut tree = root.to_path_buf();
        let host = self.select_host(root, options.source_host.as_deref(), current_host)?;
        let foreign_host = host.as_deref().is_some_and(|host| host != current_host);
        if let Some(host) = &host {
            if foreign_host {
                warn!("restore source {host:?} is not this machine ({current_host:?})");
            }
            tree.push(host);
        }

        let date = self.select_date(&tree, options.date.as_deref())?;
        if let Some(date) = &date {
            tree.push(date);
        }

        if !self.is_restorable(&tree)? {
            return Err(LayoutError::Unrecognized { path: tree });
        }

        let file_count = files(&tree).iter().filter(|entry| entry.is_ok()).count();
        debug!("restore tree {:?} holds {file_count} file(s)", tree.display());

        Ok(BackupLayout {
            host,
            foreign_host,
            date,
            tree,
            file_count,
        })
    }

    fn select_host(
        &self,
        root: &Path,
        requested: Option<&str>,
        current_host: &str,
    ) -> Result<Option<String>> {
        if let Some(requested) = requested {
            if root.join(requested).is_dir() {
                return Ok(Some(requested.into()));
            }

            return Err(LayoutError::HostNotFound {
                host: requested.into(),
                path: root.into(),
            });
        }

        let own = root.join(current_host);
        if own.is_dir() && self.is_host_namespace(&own)? {
            return Ok(Some(current_host.into()));
        }

        // Root already is a host namespace, or has none at all.
        if self.is_mirrored(root)? || !dates(root)?.is_empty() {
            return Ok(None);
        }

        let mut candidates = Vec::new();
        for name in subdirs(root)? {
            if self.is_host_namespace(&root.join(&name))? {
                candidates.push(name);
            }
        }

        match candidates.len() {
            1 => Ok(candidates.pop()),
            0 if subdirs(root)?.is_empty() => Ok(None),
            _ => Err(LayoutError::AmbiguousHost {
                candidates,
                path: root.into(),
            }),
        }
    }

    fn select_date(&self, tree: &Path, requested: Option<&str>) -> Result<Option<String>> {
        if let Some(requested) = requested {
            if is_date(requested) && tree.join(requested).is_dir() {
                return Ok(Some(requested.into()));
            }

            return Err(LayoutError::DateNotFound {
                date: requested.into(),
                path: tree.into(),
            });
        }

        if self.is_mirrored(tree)? {
            return Ok(None);
        }

        // INVARIANT: ISO dates sort chronologically as plain strings.
        Ok(dates(tree)?.into_iter().max())
    }

    fn is_host_namespace(&self, dir: &Path) -> Result<bool> {
        if self.is_mirrored(dir)? {
            return Ok(true);
        }

        for date in dates(dir)? {
            if self.is_mirrored(&dir.join(date))? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn is_mirrored(&self, dir: &Path) -> Result<bool> {
        Ok(subdirs(dir)?.iter().any(|name| (self.is_root_entry)(name.as_str())))
    }

    /// Tree mirrors the file system root, or holds nothing to restore.
    fn is_restorable(&self, tree: &Path) -> Result<bool> {
        if self.is_mirrored(tree)? {
            return Ok(true);
        }

        let mut entries = fs::read_dir(tree).map_err(|err| LayoutError::ReadDir {
            source: err,
            path: tree.into(),
        })?;
        Ok(entries.next().is_none())
    }
}

fn files(tree: &Path) -> Vec<crate::copy::Result<PathBuf>> {
    match exclusions(tree, &[]) {
        Ok(exclude) => walk_files(tree, &exclude),
        Err(error) => vec![Err(error)],
    }
}

fn subdirs(path: &Path) -> Result<Vec<String>> {
    let read_err = |err| LayoutError::ReadDir {
        source: err,
        path: path.into(),
    };

    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        if !entry.file_type().map_err(read_err)?.is_dir() {
            continue;
        }

        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();

    Ok(names)
}

fn dates(path: &Path) -> Result<Vec<String>> {
    Ok(subdirs(path)?.into_iter().filter(|name| is_date(name)).collect())
}

fn is_date(name: &str) -> bool {
    name.len() == 10 && NaiveDate::parse_from_str(name, "%Y-%m-%d").is_ok()
}

/// Backup layout discovery error types.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Backup root does not exist, or is not a directory.
    #[error("backup source {:?} is not a directory", path.display())]
    Missing { path: PathBuf },

    /// Namespace directory cannot be listed.
    #[error("failed to list {:?}", path.display())]
    ReadDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Requested host has no namespace.
    #[error("no backup of host {host:?} in {:?}", path.display())]
    HostNotFound { host: String, path: PathBuf },

    /// Current host has no namespace, and not exactly one other host holds a
    /// mirrored tree.
    #[error(
        "cannot pick host in {:?}, candidates are {candidates:?}; choose one explicitly",
        path.display()
    )]
    AmbiguousHost {
        candidates: Vec<String>,
        path: PathBuf,
    },

    /// Requested date has no namespace.
    #[error("no backup dated {date:?} in {:?}", path.display())]
    DateNotFound { date: String, path: PathBuf },

    /// Selected directory does not mirror the file system root.
    #[error("{:?} does not look like a mirror backup", path.display())]
    Unrecognized { path: PathBuf },
}

/// Friendly result alias :3
pub type Result<T, E = LayoutError> = std::result::Result<T, E>;
