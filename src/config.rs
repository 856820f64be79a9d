// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the backup plan that dotvault executes to simplify
//! the process of serialization and deserialization. File I/O is left to the
//! caller to figure out. The engine only ever reads a [`Configuration`] that
//! it is handed, and never mutates it during a run.
//!
//! # General Layout
//!
//! A configuration is composed of two basic parts: options and items. The
//! options determine where backups go and how they are made. Each item names
//! one application whose dotfiles should be backed up.
//!
//! ```toml
//! mirror_dir = "~/DotfilesMirror"
//! hostname_subdir = true
//!
//! [[item]]
//! category = "Shell"
//! subcategory = "Bash"
//! application_name = "bash"
//! paths = ["~/.bashrc", "~/.bash_profile"]
//! ```

use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeSet, HashSet},
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Full backup plan.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    /// Write a 1:1 mirror of every configured path.
    pub mirror_enabled: bool,

    /// Write a compressed snapshot of every configured path.
    pub archive_enabled: bool,

    /// Root of mirror backups.
    pub mirror_dir: String,

    /// Root of archive backups.
    pub archive_dir: String,

    /// Namespace destinations by hostname.
    pub hostname_subdir: bool,

    /// Namespace destinations by backup date.
    pub date_subdir: bool,

    pub archive_format: ArchiveFormat,

    /// Gzip compression level from 0 to 9.
    pub archive_compression_level: u32,

    pub rotate_archives: bool,

    /// Number of archives kept after rotation.
    pub max_archives: usize,

    /// Skip mirrored files whose size and mtime already match.
    pub skip_identical: bool,

    /// Save live files before restore overwrites them.
    pub pre_restore_backup: bool,

    /// Number of pre-restore safety backups kept after rotation.
    pub max_restore_backups: usize,

    /// Where pre-restore safety backups go. Defaults to
    /// `$XDG_DATA_HOME/dotvault/restore-backups` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_backup_dir: Option<String>,

    pub verify_after_backup: bool,

    /// Compare SHA-256 digests when size and mtime already match.
    pub hash_verification: bool,

    #[serde(rename = "item")]
    pub items: Vec<ConfigItem>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            mirror_enabled: true,
            archive_enabled: false,
            mirror_dir: "~/DotfilesMirror".into(),
            archive_dir: "~/DotfilesArchive".into(),
            hostname_subdir: true,
            date_subdir: false,
            archive_format: ArchiveFormat::default(),
            archive_compression_level: 9,
            rotate_archives: true,
            max_archives: 5,
            skip_identical: true,
            pre_restore_backup: true,
            max_restore_backups: 5,
            restore_backup_dir: None,
            verify_after_backup: false,
            hash_verification: false,
            items: Vec::new(),
        }
    }
}

impl Configuration {
    /// Check configuration for errors that must stop a run before any I/O.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::EmptyPaths`] if an item lists no paths.
    /// - Return [`ConfigError::DuplicateItem`] if two items share an identity.
    /// - Return [`ConfigError::InvalidCompressionLevel`] if compression level
    ///   is above 9.
    /// - Return [`ConfigError::InvalidRetention`] if a retention count is 0.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.paths.is_empty() {
                return Err(ConfigError::EmptyPaths(item.id()));
            }

            if !seen.insert(item.id()) {
                return Err(ConfigError::DuplicateItem(item.id()));
            }
        }

        if self.archive_compression_level > 9 {
            return Err(ConfigError::InvalidCompressionLevel(
                self.archive_compression_level,
            ));
        }

        if self.max_archives == 0 {
            return Err(ConfigError::InvalidRetention("max_archives"));
        }

        if self.max_restore_backups == 0 {
            return Err(ConfigError::InvalidRetention("max_restore_backups"));
        }

        Ok(())
    }

    /// Iterate through enabled items in declared order.
    pub fn enabled_items(&self) -> impl Iterator<Item = &ConfigItem> {
        self.items.iter().filter(|item| item.enabled)
    }

    /// Lookup item by identity.
    pub fn item(&self, id: &ItemId) -> Option<&ConfigItem> {
        self.items.iter().find(|item| &item.id() == id)
    }

    /// Append new item.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::EmptyPaths`] if item lists no paths.
    /// - Return [`ConfigError::DuplicateItem`] if item identity is taken.
    pub fn add_item(&mut self, item: ConfigItem) -> Result<()> {
        if item.paths.is_empty() {
            return Err(ConfigError::EmptyPaths(item.id()));
        }

        if self.item(&item.id()).is_some() {
            return Err(ConfigError::DuplicateItem(item.id()));
        }

        self.items.push(item);
        Ok(())
    }

    /// Replace existing item in place, keeping its position.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ItemNotFound`] if no item has given identity.
    /// - Return [`ConfigError::EmptyPaths`] if replacement lists no paths.
    /// - Return [`ConfigError::DuplicateItem`] if replacement identity clashes
    ///   with some other item.
    pub fn update_item(&mut self, id: &ItemId, item: ConfigItem) -> Result<()> {
        if item.paths.is_empty() {
            return Err(ConfigError::EmptyPaths(item.id()));
        }

        let index = self.position(id)?;
        let new_id = item.id();
        if &new_id != id && self.item(&new_id).is_some() {
            return Err(ConfigError::DuplicateItem(new_id));
        }

        self.items[index] = item;
        Ok(())
    }

    /// Remove existing item.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ItemNotFound`] if no item has given identity.
    pub fn remove_item(&mut self, id: &ItemId) -> Result<ConfigItem> {
        let index = self.position(id)?;
        Ok(self.items.remove(index))
    }

    /// Toggle whether item takes part in the next run.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ItemNotFound`] if no item has given identity.
    pub fn set_enabled(&mut self, id: &ItemId, enabled: bool) -> Result<()> {
        let index = self.position(id)?;
        self.items[index].enabled = enabled;
        Ok(())
    }

    fn position(&self, id: &ItemId) -> Result<usize> {
        self.items
            .iter()
            .position(|item| &item.id() == id)
            .ok_or_else(|| ConfigError::ItemNotFound(id.clone()))
    }
}

impl FromStr for Configuration {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        toml::de::from_str(data).map_err(ConfigError::Deserialize)
    }
}

impl Display for Configuration {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// One backed-up application.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ConfigItem {
    pub category: String,

    pub subcategory: String,

    pub application_name: String,

    #[serde(default)]
    pub description: String,

    /// Files or directories to back up, possibly starting with `~`.
    pub paths: Vec<String>,

    /// Gitignore-style patterns left out while walking a directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,

    /// Free form labels for filtering. Not used by the engine.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

impl ConfigItem {
    /// Construct new enabled item.
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        application_name: impl Into<String>,
        paths: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            application_name: application_name.into(),
            description: String::new(),
            paths: paths.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
            tags: BTreeSet::new(),
            enabled: true,
        }
    }

    /// Identity of item within a configuration.
    pub fn id(&self) -> ItemId {
        ItemId::new(&self.category, &self.subcategory, &self.application_name)
    }

    /// Human-readable label used for progress reporting.
    pub fn label(&self) -> String {
        self.id().to_string()
    }
}

/// Identity of a configured item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId {
    pub category: String,
    pub subcategory: String,
    pub application_name: String,
}

impl ItemId {
    /// Construct new item identity.
    pub fn new(
        category: impl Into<String>,
        subcategory: impl Into<String>,
        application_name: impl Into<String>,
    ) -> Self {
        Self {
            category: category.into(),
            subcategory: subcategory.into(),
            application_name: application_name.into(),
        }
    }
}

impl Display for ItemId {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "{}/{}/{}",
            self.category, self.subcategory, self.application_name
        )
    }
}

/// Archive container format.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
pub enum ArchiveFormat {
    #[default]
    #[serde(rename = "tar.gz")]
    TarGz,

    #[serde(rename = "tar")]
    Tar,
}

impl ArchiveFormat {
    /// File extension of archive, without leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::Tar => "tar",
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Two items share one identity.
    #[error("item {0} is configured more than once")]
    DuplicateItem(ItemId),

    /// Item lists no paths.
    #[error("item {0} has no paths to back up")]
    EmptyPaths(ItemId),

    /// No item has given identity.
    #[error("no item named {0}")]
    ItemNotFound(ItemId),

    /// Compression level is outside 0-9.
    #[error("archive compression level {0} is not within 0-9")]
    InvalidCompressionLevel(u32),

    /// Retention count is zero.
    #[error("{0} must be at least 1")]
    InvalidRetention(&'static str),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
