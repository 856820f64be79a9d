// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Skip-if-unchanged decisions.
//!
//! A destination file is considered identical to its source when both have
//! the same size and modification time. This is cheap, and right in the
//! common case. Content hashing is opt-in on top of that, because it needs to
//! read both files in full.

use crate::config::Configuration;

use sha2::{Digest, Sha256};
use std::{
    fs::{self, File},
    io::{self, BufReader, Read},
    path::Path,
};
use tracing::debug;

/// Decide whether destination file already matches its source.
pub trait FileComparator {
    /// Construct comparator for the options of a run.
    fn from_configuration(configuration: &Configuration) -> Self
    where
        Self: Sized;

    /// Check if destination file is identical to source file.
    ///
    /// A missing destination is never identical.
    fn are_identical(&self, source: &Path, dest: &Path) -> bool;
}

/// Compare size and mtime, with optional SHA-256 tie-breaker.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataComparator {
    hash_verification: bool,
}

impl MetadataComparator {
    /// Construct new metadata comparator.
    pub fn new(hash_verification: bool) -> Self {
        Self { hash_verification }
    }
}

impl FileComparator for MetadataComparator {
    fn from_configuration(configuration: &Configuration) -> Self {
        Self::new(configuration.hash_verification)
    }

    fn are_identical(&self, source: &Path, dest: &Path) -> bool {
        let (source_meta, dest_meta) = match (fs::metadata(source), fs::metadata(dest)) {
            (Ok(source), Ok(dest)) => (source, dest),
            _ => return false,
        };

        if !dest_meta.is_file() || source_meta.len() != dest_meta.len() {
            return false;
        }

        match (source_meta.modified(), dest_meta.modified()) {
            (Ok(source_time), Ok(dest_time)) if source_time == dest_time => {}
            _ => return false,
        }

        if !self.hash_verification {
            return true;
        }

        // INVARIANT: Hash only breaks ties after size and mtime already match.
        match (hash_file(source), hash_file(dest)) {
            (Ok(source_hash), Ok(dest_hash)) => {
                if source_hash != dest_hash {
                    debug!(
                        "{:?} matches on size and mtime, but not on content",
                        dest.display()
                    );
                }
                source_hash == dest_hash
            }
            _ => false,
        }
    }
}

/// Compute hex encoded SHA-256 digest of file content.
///
/// # Errors
///
/// - Return [`io::Error`] if file cannot be opened or read.
pub fn hash_file(path: impl AsRef<Path>) -> io::Result<String> {
    let mut reader = BufReader::new(File::open(path.as_ref())?);
    let mut hasher = Sha256::new();
    let mut buffer = [0; 8192];

    loop {
        let count = reader.read(&mut buffer)?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, SystemTime};

    fn set_mtime(path: &Path, time: SystemTime) -> anyhow::Result<()> {
        File::options().write(true).open(path)?.set_modified(time)?;
        Ok(())
    }

    #[test]
    fn missing_destination_is_never_identical() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        fs::write(&source, "content")?;
        assert!(!MetadataComparator::new(false).are_identical(&source, &dir.path().join("nope")));
        Ok(())
    }

    #[test]
    fn size_and_mtime_decide() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let comparator = MetadataComparator::new(false);

        fs::write(&source, "content")?;
        fs::write(&dest, "content")?;
        set_mtime(&source, time)?;
        set_mtime(&dest, time)?;
        assert!(comparator.are_identical(&source, &dest));

        set_mtime(&dest, time + Duration::from_secs(60))?;
        assert!(!comparator.are_identical(&source, &dest));

        fs::write(&dest, "content but longer")?;
        set_mtime(&dest, time)?;
        assert!(!comparator.are_identical(&source, &dest));

        Ok(())
    }

    #[test]
    fn hash_breaks_ties_on_same_size_and_mtime() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("source");
        let dest = dir.path().join("dest");
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        fs::write(&source, "aaaa")?;
        fs::write(&dest, "bbbb")?;
        set_mtime(&source, time)?;
        set_mtime(&dest, time)?;

        assert!(MetadataComparator::new(false).are_identical(&source, &dest));
        assert!(!MetadataComparator::new(true).are_identical(&source, &dest));

        Ok(())
    }

    #[test]
    fn hash_file_is_sha256() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("abc");
        fs::write(&path, "abc")?;
        assert_eq!(
            hash_file(&path)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }
}
