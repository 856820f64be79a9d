// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! File copy and directory walking shared by backup and restore.
//!
//! # Atomic Copies
//!
//! Files are never written in place. Content goes into a temporary file next
//! to the destination first, gets the permissions and modification time of
//! its source, and is then renamed over the destination. Whoever looks at the
//! destination sees either the old file or the new one, never half of it.
//!
//! Carrying the modification time over is what lets the size+mtime check of
//! [`MetadataComparator`](crate::compare::MetadataComparator) recognize an
//! unchanged file on the next run.

use crate::report::ErrorKind;

use ignore::{
    gitignore::{Gitignore, GitignoreBuilder},
    WalkBuilder,
};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::debug;

/// Copy file atomically, preserving permissions and modification time.
///
/// Parent directories of the destination are created as needed. Returns
/// number of bytes copied.
///
/// # Errors
///
/// - Return [`CopyError::CreateDir`] if parent directory cannot be created.
/// - Return [`CopyError::Read`] if source cannot be read.
/// - Return [`CopyError::Write`] if destination cannot be written.
pub fn copy_file(source: &Path, dest: &Path) -> Result<u64> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    mkdirp::mkdirp(parent).map_err(|err| CopyError::CreateDir {
        source: err,
        path: parent.into(),
    })?;

    let read_err = |err| CopyError::Read {
        source: err,
        path: source.into(),
    };
    let write_err = |err| CopyError::Write {
        source: err,
        path: dest.into(),
    };

    let metadata = fs::metadata(source).map_err(read_err)?;
    let mut reader = File::open(source).map_err(read_err)?;
    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    let bytes = io::copy(&mut reader, tmp.as_file_mut()).map_err(write_err)?;

    tmp.as_file().sync_all().map_err(write_err)?;
    if let Ok(modified) = metadata.modified() {
        tmp.as_file().set_modified(modified).map_err(write_err)?;
    }
    fs::set_permissions(tmp.path(), metadata.permissions()).map_err(write_err)?;
    tmp.persist(dest).map_err(|err| write_err(err.error))?;

    debug!("copy {:?} -> {:?}", source.display(), dest.display());
    Ok(bytes)
}

/// Compile gitignore-style exclusion patterns relative to a directory.
///
/// # Errors
///
/// - Return [`CopyError::Exclude`] if any pattern is invalid.
pub fn exclusions(root: &Path, patterns: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .map_err(|err| CopyError::Exclude {
                source: err,
                pattern: pattern.clone(),
            })?;
    }

    builder.build().map_err(|err| CopyError::Exclude {
        source: err,
        pattern: patterns.join(", "),
    })
}

/// Walk directory recursively, listing every file in sorted order.
///
/// Hidden files are included, no ignore files are honored, and symlinks are
/// not followed. Entries matching exclusions are pruned. Entries that cannot
/// be read are returned as errors alongside the files that could.
pub fn walk_files(root: &Path, exclude: &Gitignore) -> Vec<Result<PathBuf>> {
    let exclude = exclude.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|kind| kind.is_dir());
            !exclude.matched(entry.path(), is_dir).is_ignore()
        })
        .build();

    walker
        .filter_map(|entry| match entry {
            Ok(entry) => {
                let kind = entry.file_type()?;
                if kind.is_dir() {
                    return None;
                }

                // INVARIANT: Symlinks count as files when they point to one.
                if kind.is_symlink() && entry.path().is_dir() {
                    return None;
                }

                Some(Ok(entry.into_path()))
            }
            Err(err) => Some(Err(CopyError::from_walk(err, root))),
        })
        .collect()
}

/// File copy and walk error types.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    /// Directory cannot be created.
    #[error("failed to create directory {:?}", path.display())]
    CreateDir {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Source cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Destination cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Directory entry cannot be walked.
    #[error("failed to walk {:?}", path.display())]
    Walk {
        #[source]
        source: ignore::Error,
        kind: io::ErrorKind,
        path: PathBuf,
    },

    /// Exclusion pattern is invalid.
    #[error("invalid exclusion pattern {pattern:?}")]
    Exclude {
        #[source]
        source: ignore::Error,
        pattern: String,
    },
}

impl CopyError {
    fn from_walk(err: ignore::Error, root: &Path) -> Self {
        let kind = err
            .io_error()
            .map(io::Error::kind)
            .unwrap_or(io::ErrorKind::Other);
        let path = walk_error_path(&err).unwrap_or_else(|| root.to_path_buf());

        Self::Walk {
            source: err,
            kind,
            path,
        }
    }

    /// Path that the error happened on.
    pub fn path(&self) -> &Path {
        match self {
            Self::CreateDir { path, .. }
            | Self::Read { path, .. }
            | Self::Write { path, .. }
            | Self::Walk { path, .. } => path.as_path(),
            Self::Exclude { .. } => Path::new(""),
        }
    }

    /// Category of failure for reporting.
    pub fn kind(&self) -> ErrorKind {
        match self.io_kind() {
            Some(kind) => kind.into(),
            None => ErrorKind::Unknown,
        }
    }

    /// Underlying I/O error kind, if any.
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::CreateDir { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. } => Some(source.kind()),
            Self::Walk { kind, .. } => Some(*kind),
            Self::Exclude { .. } => None,
        }
    }
}

fn walk_error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            walk_error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        _ => None,
    }
}

/// Friendly result alias :3
pub type Result<T, E = CopyError> = std::result::Result<T, E>;
