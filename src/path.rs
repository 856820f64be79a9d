// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for configured dotfiles, and for the
//! destinations that dotvault writes backups into.
//!
//! # Resolution Versus Existence
//!
//! Resolving a path never checks whether it exists. A configured dotfile that
//! went missing is reported as a per-path failure by the orchestrators, so it
//! must still resolve cleanly. Existence and readability are separate checks.

use std::{
    fs::{self, File},
    path::{Component, Path, PathBuf},
};
use tracing::warn;

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if home directory path cannot be
///   determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to pre-restore safety backup directory.
///
/// Uses XDG Base Directory path `$XDG_DATA_HOME/dotvault/restore-backups` as
/// the default. Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if data directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_restore_backup_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|path| path.join("dotvault").join("restore-backups"))
        .ok_or(PathError::NoWayHome)
}

/// Determine default absolute path to configuration file.
///
/// Uses `$XDG_CONFIG_HOME/dotvault/config.toml`.
///
/// # Errors
///
/// - Return [`PathError::NoWayHome`] if config directory cannot be determined.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("dotvault").join("config.toml"))
        .ok_or(PathError::NoWayHome)
}

/// Name of current machine.
///
/// Falls back to "localhost" if the system refuses to tell us, or the name is
/// not valid UTF-8.
pub fn hostname() -> String {
    match hostname::get() {
        Ok(name) => match name.into_string() {
            Ok(name) if !name.is_empty() => name,
            _ => {
                warn!("hostname is empty or not valid UTF-8, using \"localhost\"");
                "localhost".into()
            }
        },
        Err(error) => {
            warn!("cannot determine hostname, using \"localhost\": {error}");
            "localhost".into()
        }
    }
}

/// Strip root and prefix components off an absolute path.
///
/// This is how every original location is laid out underneath a mirror root,
/// inside an archive, or in a safety backup: `/home/user/.bashrc` becomes
/// `home/user/.bashrc`.
pub fn strip_root(path: impl AsRef<Path>) -> PathBuf {
    path.as_ref()
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

/// Resolve raw configured paths into absolute ones.
pub trait PathResolver: Send + Sync + 'static {
    /// Resolve raw path into an absolute path.
    ///
    /// Expands leading `~`. Does not require the path to exist.
    fn resolve(&self, raw_path: &str) -> Result<ResolvedPath>;

    /// Check if path exists and can be opened for reading.
    fn check_readable(&self, path: &Path) -> bool;
}

/// Path resolution through shell-style tilde expansion.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellPathResolver;

impl ShellPathResolver {
    /// Construct new shell path resolver.
    pub fn new() -> Self {
        Self
    }
}

impl PathResolver for ShellPathResolver {
    /// Resolve raw path into an absolute path.
    ///
    /// Relative paths are taken relative to the current working directory.
    /// The result is lexically normalized, i.e., "." components are dropped
    /// and ".." components pop their parent, without touching the file
    /// system.
    ///
    /// # Errors
    ///
    /// - Return [`PathError::Empty`] if raw path is zero-length.
    /// - Return [`PathError::NulByte`] if raw path contains a null byte.
    /// - Return [`PathError::NoWayHome`] if `~` cannot be expanded.
    /// - Return [`PathError::Absolute`] if current working directory cannot
    ///   be determined for a relative path.
    fn resolve(&self, raw_path: &str) -> Result<ResolvedPath> {
        if raw_path.is_empty() {
            return Err(PathError::Empty);
        }

        if raw_path.contains('\0') {
            return Err(PathError::NulByte(raw_path.into()));
        }

        let home = || dirs::home_dir().map(|path| path.to_string_lossy().into_owned());
        if raw_path.starts_with('~') && home().is_none() {
            return Err(PathError::NoWayHome);
        }
        let expanded = shellexpand::tilde_with_context(raw_path, home);

        let absolute =
            std::path::absolute(&*expanded).map_err(|err| PathError::Absolute {
                source: err,
                path: PathBuf::from(&*expanded),
            })?;

        Ok(ResolvedPath(normalize(&absolute)))
    }

    fn check_readable(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => fs::read_dir(path).is_ok(),
            Ok(_) => File::open(path).is_ok(),
            Err(_) => false,
        }
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut normal = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            // INVARIANT: Never pop past the root.
            Component::ParentDir => {
                if normal.file_name().is_some() {
                    normal.pop();
                }
            }
            other => normal.push(other.as_os_str()),
        }
    }

    normal
}

/// Absolute, lexically normalized path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Treat resolved path as [`Path`] slice.
    pub fn as_path(&self) -> &Path {
        self.0.as_path()
    }

    /// Check if resolved path currently exists.
    pub fn exists(&self) -> bool {
        self.0.exists()
    }

    /// Place resolved path underneath target root, mirroring its location.
    pub fn mirrored_under(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref().join(strip_root(&self.0))
    }

    /// Convert into owned [`PathBuf`].
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// No way to determine user's home directory.
    ///
    /// # See Also
    ///
    /// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
    #[error("cannot determine absolute path to user's home directory")]
    NoWayHome,

    /// Raw path is zero-length.
    #[error("path is empty")]
    Empty,

    /// Raw path contains a null byte.
    #[error("path {0:?} contains a null byte")]
    NulByte(String),

    /// Relative path cannot be made absolute.
    #[error("cannot make {:?} absolute", path.display())]
    Absolute {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
