// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Structured outcome of backup and restore runs.
//!
//! Neither orchestrator ever fails outright. Whatever happens during a run is
//! folded into an [`OperationResult`], so the caller can always tell partial
//! success apart from total failure, or total success.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};

/// Overall status of one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    /// No failures at all.
    #[default]
    Success,

    /// At least one failure, and at least one copied or skipped path.
    PartialFailure,

    /// Every attempted path failed, or run could not start.
    Failed,

    /// Run stopped early through a cancellation request.
    Cancelled,
}

impl Display for OperationStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Success => fmt.write_str("success"),
            Self::PartialFailure => fmt.write_str("partial failure"),
            Self::Failed => fmt.write_str("failed"),
            Self::Cancelled => fmt.write_str("cancelled"),
        }
    }
}

/// Category of a per-path failure.
///
/// Each category is distinct so the caller can render specific guidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    NotFound,
    FilesystemError,
    Unknown,
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind as Io;

        match kind {
            Io::PermissionDenied | Io::ReadOnlyFilesystem => Self::PermissionDenied,
            Io::NotFound => Self::NotFound,
            Io::AlreadyExists
            | Io::NotADirectory
            | Io::IsADirectory
            | Io::DirectoryNotEmpty
            | Io::StorageFull
            | Io::QuotaExceeded
            | Io::FileTooLarge
            | Io::CrossesDevices
            | Io::InvalidData
            | Io::UnexpectedEof
            | Io::WriteZero
            | Io::InvalidInput
            | Io::Interrupted
            | Io::ResourceBusy => Self::FilesystemError,
            _ => Self::Unknown,
        }
    }
}

impl From<&std::io::Error> for ErrorKind {
    fn from(error: &std::io::Error) -> Self {
        error.kind().into()
    }
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::PermissionDenied => fmt.write_str("permission denied"),
            Self::NotFound => fmt.write_str("not found"),
            Self::FilesystemError => fmt.write_str("filesystem error"),
            Self::Unknown => fmt.write_str("unknown error"),
        }
    }
}

/// Outcome of one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStatus {
    Copied,
    Skipped(String),
    Failed(ErrorKind),
}

impl PathStatus {
    // INVARIANT: Failed outranks copied, copied outranks skipped.
    fn severity(&self) -> u8 {
        match self {
            Self::Skipped(_) => 0,
            Self::Copied => 1,
            Self::Failed(_) => 2,
        }
    }

    /// Check if status is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-path outcome, with where it went and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResult {
    pub status: PathStatus,
    pub destination: Option<PathBuf>,
    pub message: Option<String>,
}

impl PathResult {
    /// Path was copied to destination.
    pub fn copied(destination: impl Into<PathBuf>) -> Self {
        Self {
            status: PathStatus::Copied,
            destination: Some(destination.into()),
            message: None,
        }
    }

    /// Path was skipped for given reason.
    pub fn skipped(destination: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            status: PathStatus::Skipped(reason.into()),
            destination: Some(destination.into()),
            message: None,
        }
    }

    /// Path failed with a human-readable message.
    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: PathStatus::Failed(kind),
            destination: None,
            message: Some(message.into()),
        }
    }

    /// Attach destination to result.
    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = Some(destination.into());
        self
    }
}

/// Aggregate outcome of one backup or restore run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub items_copied: usize,
    pub items_skipped: usize,
    pub items_failed: usize,
    pub warnings: Vec<String>,
    pub per_path_results: BTreeMap<PathBuf, PathResult>,
}

impl OperationResult {
    /// Construct new empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct result for a run that could not start at all.
    pub fn failed(warning: impl Into<String>) -> Self {
        Self {
            status: OperationStatus::Failed,
            warnings: vec![warning.into()],
            ..Default::default()
        }
    }

    /// Record outcome of a path.
    ///
    /// A path that already has an outcome keeps the more severe of the two.
    pub fn record(&mut self, source: impl Into<PathBuf>, result: PathResult) {
        let source = source.into();
        match self.per_path_results.get(&source) {
            Some(existing) if existing.status.severity() >= result.status.severity() => {}
            _ => {
                self.per_path_results.insert(source, result);
            }
        }
    }

    /// Add warning to result.
    pub fn warn(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Lookup outcome of a path.
    pub fn get(&self, source: impl AsRef<Path>) -> Option<&PathResult> {
        self.per_path_results.get(source.as_ref())
    }

    /// Iterate through failed paths only.
    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &PathResult)> {
        self.per_path_results
            .iter()
            .filter(|(_, result)| result.status.is_failed())
    }

    /// Derive counts and final status from recorded outcomes.
    ///
    /// A cancelled run stays cancelled. A run that already failed before
    /// recording anything stays failed.
    pub fn finish(mut self, cancelled: bool) -> Self {
        self.items_copied = 0;
        self.items_skipped = 0;
        self.items_failed = 0;
        for result in self.per_path_results.values() {
            match result.status {
                PathStatus::Copied => self.items_copied += 1,
                PathStatus::Skipped(_) => self.items_skipped += 1,
                PathStatus::Failed(_) => self.items_failed += 1,
            }
        }

        let succeeded = self.items_copied + self.items_skipped;
        self.status = if cancelled {
            OperationStatus::Cancelled
        } else if self.status == OperationStatus::Failed && self.per_path_results.is_empty() {
            OperationStatus::Failed
        } else if self.items_failed == 0 {
            OperationStatus::Success
        } else if succeeded > 0 {
            OperationStatus::PartialFailure
        } else {
            OperationStatus::Failed
        };

        self
    }

    /// Derive counts, but fail whole run for given reason.
    ///
    /// Used when the environment itself is broken, e.g., a destination root
    /// cannot be created at all.
    pub fn finish_fatal(self, warning: impl Into<String>) -> Self {
        let mut result = self.finish(false);
        result.warn(warning);
        result.status = OperationStatus::Failed;
        result
    }

    /// One line summary of counts.
    pub fn summary(&self) -> String {
        format!(
            "{} copied, {} skipped, {} failed",
            self.items_copied, self.items_skipped, self.items_failed
        )
    }
}

/// Render error together with its chain of sources.
pub fn describe(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}
