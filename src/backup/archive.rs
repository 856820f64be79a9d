// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Archive backup pass.
//!
//! Writes every configured path into one new tar archive, optionally gzip
//! compressed. The archive is assembled in a temporary file inside the
//! archive directory, and only renamed to its final timestamped name once it
//! is complete. A run that dies midway never leaves a truncated archive
//! behind that rotation would mistake for a real one.

use crate::{
    backup::BackupTarget,
    config::{ArchiveFormat, Configuration},
    copy::{exclusions, walk_files},
    path::{strip_root, PathResolver},
    progress::CancelFlag,
    report::{describe, ErrorKind, OperationResult, PathResult, PathStatus},
    rotate::{ArchiveRotator, GlobRotator},
    stats::StatisticsTracker,
};

use chrono::{DateTime, Local};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::{
    fs::{self, File},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// Prefix of every archive file name.
pub const ARCHIVE_PREFIX: &str = "dotfiles_backup_";

/// Pick a fresh archive file name in directory.
pub fn archive_path(root: &Path, format: ArchiveFormat, now: DateTime<Local>) -> PathBuf {
    let stamp = now.format("%Y%m%d_%H%M%S_%6f");
    let ext = format.extension();
    let mut path = root.join(format!("{ARCHIVE_PREFIX}{stamp}.{ext}"));

    // INVARIANT: Suffixes sort after the plain name, keeping creation order.
    let mut n = 1;
    while path.exists() {
        path = root.join(format!("{ARCHIVE_PREFIX}{stamp}_{n}.{ext}"));
        n += 1;
    }

    path
}

/// Glob matching every archive of given format.
pub fn archive_pattern(format: ArchiveFormat) -> String {
    format!("{ARCHIVE_PREFIX}*.{}", format.extension())
}

/// Tar builder over the chosen compression.
enum ArchiveWriter {
    TarGz(tar::Builder<GzEncoder<File>>),
    Tar(tar::Builder<File>),
}

impl ArchiveWriter {
    fn new(file: File, format: ArchiveFormat, level: u32) -> Self {
        match format {
            ArchiveFormat::TarGz => Self::TarGz(tar::Builder::new(GzEncoder::new(
                file,
                Compression::new(level),
            ))),
            ArchiveFormat::Tar => Self::Tar(tar::Builder::new(file)),
        }
    }

    fn append(&mut self, source: &Path, name: &Path) -> io::Result<()> {
        match self {
            Self::TarGz(builder) => builder.append_path_with_name(source, name),
            Self::Tar(builder) => builder.append_path_with_name(source, name),
        }
    }

    fn finish(self) -> io::Result<File> {
        let mut file = match self {
            Self::TarGz(builder) => builder.into_inner()?.finish()?,
            Self::Tar(builder) => builder.into_inner()?,
        };
        file.flush()?;
        file.sync_all()?;
        Ok(file)
    }
}

/// State of one archive pass.
pub(crate) struct ArchivePass<'run, R>
where
    R: PathResolver,
{
    resolver: &'run R,
    stats: &'run StatisticsTracker,
    cancel: &'run CancelFlag,
    root: PathBuf,
    format: ArchiveFormat,
    tmp: NamedTempFile,
    writer: ArchiveWriter,
    added: Vec<PathBuf>,
    now: DateTime<Local>,
}

impl<'run, R> ArchivePass<'run, R>
where
    R: PathResolver,
{
    /// Create archive root, and open temporary archive inside it.
    ///
    /// # Errors
    ///
    /// - Return description of failure if archive root cannot be created, or
    ///   temporary archive cannot be opened.
    pub(crate) fn begin(
        resolver: &'run R,
        stats: &'run StatisticsTracker,
        cancel: &'run CancelFlag,
        root: PathBuf,
        configuration: &Configuration,
        now: DateTime<Local>,
    ) -> Result<Self, String> {
        mkdirp::mkdirp(&root).map_err(|err| {
            warn!("cannot create archive root {:?}: {err}", root.display());
            format!("cannot create archive directory {:?}: {err}", root.display())
        })?;

        let tmp = NamedTempFile::new_in(&root)
            .map_err(|err| format!("cannot open archive in {:?}: {err}", root.display()))?;
        let file = tmp
            .reopen()
            .map_err(|err| format!("cannot open archive in {:?}: {err}", root.display()))?;
        let writer = ArchiveWriter::new(
            file,
            configuration.archive_format,
            configuration.archive_compression_level,
        );

        Ok(Self {
            resolver,
            stats,
            cancel,
            root,
            format: configuration.archive_format,
            tmp,
            writer,
            added: Vec::new(),
            now,
        })
    }

    /// Add one configured path to archive.
    pub(crate) fn backup_target(&mut self, target: &BackupTarget, result: &mut OperationResult) {
        let source = match self.resolver.resolve(&target.raw_path) {
            Ok(source) => source.into_path_buf(),
            Err(error) => {
                self.stats.record_failed();
                result.record(
                    &target.raw_path,
                    PathResult::failed(ErrorKind::Unknown, describe(&error)),
                );
                return;
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
                return;
            }
        };

        if !metadata.is_dir() {
            self.add_file(&source, result);
            return;
        }

        let exclude = match exclusions(&source, &target.exclude) {
            Ok(exclude) => exclude,
            Err(error) => {
                self.stats.record_failed();
                result.record(&source, PathResult::failed(error.kind(), describe(&error)));
                return;
            }
        };

        for entry in walk_files(&source, &exclude) {
            if self.cancel.is_cancelled() {
                return;
            }

            match entry {
                Ok(file) => self.add_file(&file, result),
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
    }

    fn add_file(&mut self, source: &Path, result: &mut OperationResult) {
        let name = strip_root(source);
        match self.writer.append(source, &name) {
            Ok(()) => {
                debug!("archive {:?}", source.display());
                let bytes = fs::metadata(source).map(|meta| meta.len()).unwrap_or(0);
                self.stats.record_copied(bytes);
                self.added.push(source.to_path_buf());
                result.record(source, PathResult::copied(self.tmp.path()));
            }
            Err(error) => {
                warn!("cannot archive {:?}: {error}", source.display());
                self.stats.record_failed();
                result.record(
                    source,
                    PathResult::failed((&error).into(), format!("{}: {error}", source.display())),
                );
            }
        }
    }

    /// Finish archive, move it to its final name, then rotate old archives.
    ///
    /// A failure here marks every file of the archive failed. A cancelled
    /// run discards its partial archive, so rotation never counts it as a
    /// snapshot.
    #[instrument(skip_all, level = "debug")]
    pub(crate) fn finish(self, configuration: &Configuration, result: &mut OperationResult) {
        let Self {
            cancel,
            root,
            format,
            tmp,
            writer,
            added,
            now,
            ..
        } = self;

        if cancel.is_cancelled() {
            drop(writer);
            discard(tmp, result);
            return;
        }

        if let Err(error) = writer.finish() {
            fail_all(result, &added, format!("cannot write archive: {error}"));
            return;
        }

        if configuration.verify_after_backup {
            match count_entries(tmp.path(), format) {
                Ok(count) if count == added.len() => debug!("archive holds {count} file(s)"),
                Ok(count) => {
                    fail_all(
                        result,
                        &added,
                        format!(
                            "archive verification failed: {count} entries, expected {}",
                            added.len()
                        ),
                    );
                    return;
                }
                Err(error) => {
                    fail_all(result, &added, format!("archive verification failed: {error}"));
                    return;
                }
            }
        }

        let dest = archive_path(&root, format, now);
        let tmp_path = tmp.path().to_path_buf();
        if let Err(error) = tmp.persist_noclobber(&dest) {
            fail_all(
                result,
                &added,
                format!("cannot move archive to {:?}: {}", dest.display(), error.error),
            );
            return;
        }
        info!("wrote archive {:?} with {} file(s)", dest.display(), added.len());

        // INVARIANT: Point results at the final archive name, not the temporary one.
        for outcome in result.per_path_results.values_mut() {
            if outcome.destination.as_deref() == Some(tmp_path.as_path()) {
                outcome.destination = Some(dest.clone());
            }
        }

        if !configuration.rotate_archives {
            return;
        }

        match GlobRotator::new(archive_pattern(format)) {
            Ok(rotator) => {
                let deleted = rotator.rotate(&root, configuration.max_archives);
                if !deleted.is_empty() {
                    info!("rotated out {} old archive(s)", deleted.len());
                }
            }
            Err(error) => {
                warn!("cannot rotate archives: {error}");
                result.warn(format!("archive rotation skipped: {error}"));
            }
        }
    }
}

/// Drop partial archive of a cancelled run.
fn discard(tmp: NamedTempFile, result: &mut OperationResult) {
    let tmp_path = tmp.path().to_path_buf();
    if let Err(error) = tmp.close() {
        warn!("cannot remove partial archive {:?}: {error}", tmp_path.display());
    }

    // INVARIANT: Only paths whose sole copy went into this archive point at it.
    for outcome in result.per_path_results.values_mut() {
        if outcome.destination.as_deref() == Some(tmp_path.as_path()) {
            *outcome = PathResult {
                status: PathStatus::Skipped("backup cancelled".into()),
                destination: None,
                message: Some("partial archive discarded".into()),
            };
        }
    }

    info!("discarded partial archive of cancelled run");
    result.warn("backup cancelled, partial archive discarded");
}

/// Mark every archived file failed.
///
/// Statistics already counted these files as copied when they were added, and
/// are left alone.
fn fail_all(result: &mut OperationResult, added: &[PathBuf], message: String) {
    warn!("{message}");
    for source in added {
        result.record(
            source,
            PathResult::failed(ErrorKind::FilesystemError, message.clone()),
        );
    }
    result.warn(message);
}

/// Count regular file entries in archive.
///
/// # Errors
///
/// - Return [`io::Error`] if archive cannot be opened or parsed.
pub fn count_entries(path: &Path, format: ArchiveFormat) -> io::Result<usize> {
    let file = File::open(path)?;
    match format {
        ArchiveFormat::TarGz => count_regular(tar::Archive::new(GzDecoder::new(file))),
        ArchiveFormat::Tar => count_regular(tar::Archive::new(file)),
    }
}

fn count_regular<R: Read>(mut archive: tar::Archive<R>) -> io::Result<usize> {
    let mut count = 0;
    for entry in archive.entries()? {
        if entry?.header().entry_type().is_file() {
            count += 1;
        }
    }

    Ok(count)
}
