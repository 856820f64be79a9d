// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{HomeFixture, HOST};

use anyhow::Result;
use dotvault::{
    backup::archive::archive_pattern, path::strip_root, rotate::GlobRotator, ArchiveFormat,
    BackupOrchestrator, ErrorKind, NoProgress, OperationStatus, PathStatus,
};
use pretty_assertions::assert_eq;
use std::{fs, thread, time::Duration};

fn orchestrator() -> BackupOrchestrator {
    BackupOrchestrator::new().with_hostname(HOST)
}

#[test]
fn second_run_skips_unchanged_files() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "alias g=git")?;
    fixture.write(".config/nvim/init.lua", "vim.o.number = true")?;
    let configuration = fixture.configuration(vec![
        fixture.item("bash", &[".bashrc"]),
        fixture.item("nvim", &[".config/nvim"]),
    ]);

    let first = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(first.status, OperationStatus::Success);
    assert_eq!((first.items_copied, first.items_skipped), (2, 0));

    let second = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(second.status, OperationStatus::Success);
    assert_eq!((second.items_copied, second.items_skipped), (0, 2));

    let mirrored = fixture
        .mirror()
        .join(HOST)
        .join(strip_root(fixture.home(".bashrc")));
    assert_eq!(fs::read_to_string(mirrored)?, "alias g=git");

    Ok(())
}

#[test]
fn force_full_backup_copies_everything() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".vimrc", "set nu")?;
    fixture.write(".gitconfig", "[core]")?;
    let configuration =
        fixture.configuration(vec![fixture.item("misc", &[".vimrc", ".gitconfig"])]);

    for _ in 0..2 {
        let result = orchestrator().execute(&configuration, true, &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Success);
        assert_eq!((result.items_copied, result.items_skipped), (2, 0));
    }

    Ok(())
}

#[test]
fn changed_file_is_copied_again() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".zshrc", "one")?;
    let configuration = fixture.configuration(vec![fixture.item("zsh", &[".zshrc"])]);
    orchestrator().execute(&configuration, false, &mut NoProgress);

    fixture.write(".zshrc", "two, longer")?;
    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(
        result.get(fixture.home(".zshrc")).map(|r| &r.status),
        Some(&PathStatus::Copied)
    );

    Ok(())
}

#[test]
fn missing_path_does_not_stop_the_rest() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".tmux.conf", "set -g mouse on")?;
    let configuration = fixture.configuration(vec![
        fixture.item("ghost", &[".not-there"]),
        fixture.item("tmux", &[".tmux.conf"]),
    ]);

    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::PartialFailure);
    assert_eq!(
        (result.items_copied, result.items_skipped, result.items_failed),
        (1, 0, 1)
    );
    assert_eq!(
        result.get(fixture.home(".not-there")).map(|r| &r.status),
        Some(&PathStatus::Failed(ErrorKind::NotFound))
    );
    assert_eq!(
        result.get(fixture.home(".tmux.conf")).map(|r| &r.status),
        Some(&PathStatus::Copied)
    );

    Ok(())
}

#[test]
fn archive_rotation_keeps_most_recent() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let bashrc = fixture.write(".bashrc", "export PAGER=less")?;
    let mut configuration = fixture.configuration(vec![fixture.item("bash", &[".bashrc"])]);
    configuration.mirror_enabled = false;
    configuration.archive_enabled = true;
    configuration.max_archives = 2;

    let mut written = Vec::new();
    for _ in 0..4 {
        let result = orchestrator().execute(&configuration, false, &mut NoProgress);
        assert_eq!(result.status, OperationStatus::Success);
        let archive = result
            .get(&bashrc)
            .and_then(|r| r.destination.clone())
            .ok_or_else(|| anyhow::anyhow!("archive destination missing"))?;
        written.push(archive);
        thread::sleep(Duration::from_millis(20));
    }

    let remaining = GlobRotator::new(archive_pattern(ArchiveFormat::TarGz))?
        .list(&fixture.archive().join(HOST));
    assert_eq!(remaining, written[2..].to_vec());

    Ok(())
}

#[test]
fn mirror_and_archive_share_one_entry_per_path() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".inputrc", "set editing-mode vi")?;
    let mut configuration = fixture.configuration(vec![fixture.item("readline", &[".inputrc"])]);
    configuration.archive_enabled = true;
    configuration.archive_format = ArchiveFormat::Tar;
    configuration.verify_after_backup = true;

    orchestrator().execute(&configuration, false, &mut NoProgress);
    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.per_path_results.len(), 1);

    // Mirror skipped it, archive still took a full snapshot.
    assert_eq!(result.items_copied, 1);
    let archives = GlobRotator::new(archive_pattern(ArchiveFormat::Tar))?
        .list(&fixture.archive().join(HOST));
    assert_eq!(archives.len(), 2);

    Ok(())
}

#[test]
fn all_items_disabled_is_noop() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "")?;
    let mut item = fixture.item("bash", &[".bashrc"]);
    item.enabled = false;
    let configuration = fixture.configuration(vec![item]);

    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(
        (result.items_copied, result.items_skipped, result.items_failed),
        (0, 0, 0)
    );
    assert!(!fixture.mirror().exists());

    Ok(())
}

#[test]
fn no_destination_writes_nothing() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "")?;
    let mut configuration = fixture.configuration(vec![fixture.item("bash", &[".bashrc"])]);
    configuration.mirror_enabled = false;
    configuration.archive_enabled = false;

    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Failed);
    assert!(result.warnings[0].contains("configuration error"));
    assert!(result.per_path_results.is_empty());
    assert!(!fixture.mirror().exists());
    assert!(!fixture.archive().exists());

    Ok(())
}

#[test]
fn uncreatable_mirror_root_fails_run() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "set -o vi")?;
    let configuration = fixture.configuration(vec![fixture.item("bash", &[".bashrc"])]);

    // A plain file where the mirror directory should go.
    fs::write(fixture.mirror(), "in the way")?;

    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Failed);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("cannot create mirror directory")));
    assert!(fixture.mirror().is_file());

    Ok(())
}

#[test]
fn missing_paths_leave_no_mirror_behind() -> Result<()> {
    let fixture = HomeFixture::new()?;
    let configuration = fixture.configuration(vec![fixture.item("ghost", &[".nope", ".nada"])]);

    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.items_failed, 2);
    assert!(!fixture.mirror().exists());

    Ok(())
}

#[cfg(unix)]
#[test]
fn unreadable_file_fails_alone() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let fixture = HomeFixture::new()?;
    fixture.write(".ssh/config", "Host *\n  ForwardAgent no\n")?;
    let secret = fixture.write(".ssh/id_ed25519", "private key")?;
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000))?;

    // Permission bits mean nothing to root.
    if fs::File::open(&secret).is_ok() {
        return Ok(());
    }

    let configuration = fixture.configuration(vec![fixture.item("ssh", &[".ssh"])]);
    let result = orchestrator().execute(&configuration, false, &mut NoProgress);
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o600))?;

    assert_eq!(result.status, OperationStatus::PartialFailure);
    assert_eq!(
        result.get(&secret).map(|r| &r.status),
        Some(&PathStatus::Failed(ErrorKind::PermissionDenied))
    );
    assert_eq!(
        result.get(fixture.home(".ssh/config")).map(|r| &r.status),
        Some(&PathStatus::Copied)
    );

    Ok(())
}
