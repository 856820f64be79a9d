// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Dotfile backup and restore engine.
//!
//! A __dotfile__ is any configuration file or directory that some program
//! keeps for the user, e.g., `~/.bashrc` or `~/.config/nvim`. dotvault takes a
//! [`Configuration`] listing such dotfiles as categorized items, and writes
//! them into a __mirror__ tree, into a compressed __archive__, or both. A
//! mirror can later be restored back onto the file system.
//!
//! # Entry Points
//!
//! - [`BackupOrchestrator::execute`] runs one backup.
//! - [`RestoreOrchestrator::execute`] runs one restore.
//!
//! Both are blocking, and meant to run off of any UI event loop. Neither ever
//! fails outright. Every outcome, good or bad, ends up in the returned
//! [`OperationResult`].
//!
//! # See Also
//!
//! 1. [ArchWiki - dotfiles](https://wiki.archlinux.org/title/Dotfiles)

pub mod backup;
pub mod compare;
pub mod config;
pub mod copy;
pub mod path;
pub mod progress;
pub mod report;
pub mod restore;
pub mod rotate;
pub mod stats;

pub use backup::BackupOrchestrator;
pub use config::{ArchiveFormat, ConfigItem, Configuration, ItemId};
pub use progress::{CancelFlag, NoProgress, ProgressSink};
pub use report::{ErrorKind, OperationResult, OperationStatus, PathResult, PathStatus};
pub use restore::{BackupLayout, RestoreOptions, RestoreOrchestrator};
pub use stats::{StatisticsTracker, StatsSnapshot};
