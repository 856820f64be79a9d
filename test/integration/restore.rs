// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{HomeFixture, HOST};

use anyhow::Result;
use dotvault::{
    path::strip_root, restore::safety::SAFETY_PREFIX, rotate::GlobRotator, BackupOrchestrator,
    Configuration, NoProgress, OperationStatus, PathStatus, RestoreOptions, RestoreOrchestrator,
};
use pretty_assertions::assert_eq;
use std::fs;

fn backup(configuration: &Configuration) -> Result<()> {
    let result = BackupOrchestrator::new()
        .with_hostname(HOST)
        .execute(configuration, false, &mut NoProgress);
    anyhow::ensure!(
        result.status == OperationStatus::Success,
        "backup failed: {:?}",
        result.warnings
    );
    Ok(())
}

fn restorer(configuration: Configuration) -> RestoreOrchestrator {
    RestoreOrchestrator::new(configuration).with_hostname(HOST)
}

#[test]
fn backup_then_restore_round_trips() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "alias ll='ls -l'\n")?;
    fixture.write(".config/git/config", "[user]\n\tname = Blah\n")?;
    fixture.write(".config/git/ignore", "*.swp\n")?;
    let configuration = fixture.configuration(vec![
        fixture.item("bash", &[".bashrc"]),
        fixture.item("git", &[".config/git"]),
    ]);
    backup(&configuration)?;

    fs::remove_file(fixture.home(".bashrc"))?;
    fs::remove_dir_all(fixture.home(".config"))?;

    let result = restorer(configuration).execute(
        &fixture.mirror(),
        &RestoreOptions::default(),
        &mut NoProgress,
    );
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.items_copied, 3);
    assert_eq!(fixture.read(".bashrc")?, "alias ll='ls -l'\n");
    assert_eq!(fixture.read(".config/git/config")?, "[user]\n\tname = Blah\n");
    assert_eq!(fixture.read(".config/git/ignore")?, "*.swp\n");

    // Nothing was live, so nothing needed saving.
    assert!(!fixture.safety().exists());

    Ok(())
}

#[test]
fn live_content_saved_before_overwrite() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".vimrc", "set nu")?;
    let configuration = fixture.configuration(vec![fixture.item("vim", &[".vimrc"])]);
    backup(&configuration)?;

    fixture.write(".vimrc", "set rnu\nsyntax on")?;
    let result = restorer(configuration).execute(
        &fixture.mirror(),
        &RestoreOptions::default(),
        &mut NoProgress,
    );
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(fixture.read(".vimrc")?, "set nu");

    let runs = GlobRotator::new(format!("{SAFETY_PREFIX}*"))?.list(&fixture.safety());
    assert_eq!(runs.len(), 1);
    let saved = runs[0].join(strip_root(fixture.home(".vimrc")));
    assert_eq!(fs::read_to_string(saved)?, "set rnu\nsyntax on");

    Ok(())
}

#[test]
fn failed_safety_backup_leaves_live_file_alone() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".profile", "from backup")?;
    let configuration = fixture.configuration(vec![fixture.item("profile", &[".profile"])]);
    backup(&configuration)?;
    fixture.write(".profile", "precious live edit")?;

    // A plain file where the safety directory should go.
    fs::write(fixture.safety(), "in the way")?;

    let result = restorer(configuration).execute(
        &fixture.mirror(),
        &RestoreOptions::default(),
        &mut NoProgress,
    );
    assert_eq!(result.status, OperationStatus::Failed);
    assert_eq!(result.items_failed, 1);
    assert!(result
        .failures()
        .all(|(_, outcome)| matches!(outcome.status, PathStatus::Failed(_))));
    assert_eq!(fixture.read(".profile")?, "precious live edit");

    Ok(())
}

#[test]
fn safety_backups_are_rotated() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".npmrc", "registry=local")?;
    let mut configuration = fixture.configuration(vec![fixture.item("npm", &[".npmrc"])]);
    configuration.max_restore_backups = 2;
    backup(&configuration)?;

    for _ in 0..4 {
        let result = restorer(configuration.clone()).execute(
            &fixture.mirror(),
            &RestoreOptions::default(),
            &mut NoProgress,
        );
        assert_eq!(result.status, OperationStatus::Success);
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    let runs = GlobRotator::new(format!("{SAFETY_PREFIX}*"))?.list(&fixture.safety());
    assert_eq!(runs.len(), 2);

    Ok(())
}

#[test]
fn dated_backups_restore_latest() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "today")?;
    let mut configuration = fixture.configuration(vec![fixture.item("bash", &[".bashrc"])]);
    configuration.date_subdir = true;
    configuration.pre_restore_backup = false;
    backup(&configuration)?;

    // An older snapshot that must lose against today's.
    let old = fixture
        .mirror()
        .join(HOST)
        .join("2000-01-01")
        .join(strip_root(fixture.home(".bashrc")));
    fs::create_dir_all(old.parent().unwrap_or(&fixture.mirror()))?;
    fs::write(&old, "long ago")?;

    fixture.write(".bashrc", "scribbled over")?;
    let orchestrator = restorer(configuration);
    let layout = orchestrator.inspect(fixture.mirror(), &RestoreOptions::default())?;
    assert_ne!(layout.date.as_deref(), Some("2000-01-01"));

    let result =
        orchestrator.execute(&fixture.mirror(), &RestoreOptions::default(), &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(fixture.read(".bashrc")?, "today");

    let options = RestoreOptions {
        date: Some("2000-01-01".into()),
        ..Default::default()
    };
    orchestrator.execute(&fixture.mirror(), &options, &mut NoProgress);
    assert_eq!(fixture.read(".bashrc")?, "long ago");

    Ok(())
}

#[test]
fn restore_from_host_directory_itself() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".bashrc", "export EDITOR=vi")?;
    let configuration = fixture.configuration(vec![fixture.item("bash", &[".bashrc"])]);
    backup(&configuration)?;
    fixture.write(".bashrc", "scribbled over")?;

    let orchestrator = restorer(configuration);
    let host_dir = fixture.mirror().join(HOST);
    let layout = orchestrator.inspect(&host_dir, &RestoreOptions::default())?;
    assert_eq!(layout.host, None);
    assert!(!layout.foreign_host);
    assert_eq!(layout.tree, host_dir);

    let result = orchestrator.execute(&host_dir, &RestoreOptions::default(), &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    let backed_up = host_dir.join(strip_root(fixture.home(".bashrc")));
    assert_eq!(
        result.get(&backed_up).and_then(|r| r.destination.clone()),
        Some(fixture.home(".bashrc"))
    );
    assert_eq!(fixture.read(".bashrc")?, "export EDITOR=vi");

    Ok(())
}

#[test]
fn layout_follows_tree_not_configuration() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".gitconfig", "[core]\n\tpager = less\n")?;
    let mut configuration = fixture.configuration(vec![fixture.item("git", &[".gitconfig"])]);
    configuration.date_subdir = true;
    backup(&configuration)?;

    // Settings changed after the backup was taken.
    configuration.hostname_subdir = false;
    configuration.date_subdir = false;
    fixture.write(".gitconfig", "scribbled over")?;

    let orchestrator = restorer(configuration);
    let layout = orchestrator.inspect(fixture.mirror(), &RestoreOptions::default())?;
    assert_eq!(layout.host.as_deref(), Some(HOST));
    assert!(layout.date.is_some());

    let result =
        orchestrator.execute(&fixture.mirror(), &RestoreOptions::default(), &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(fixture.read(".gitconfig")?, "[core]\n\tpager = less\n");

    Ok(())
}

#[test]
fn flat_backup_restores_with_host_namespaces_configured() -> Result<()> {
    let fixture = HomeFixture::new()?;
    fixture.write(".inputrc", "set bell-style none")?;
    let mut configuration = fixture.configuration(vec![fixture.item("readline", &[".inputrc"])]);
    configuration.hostname_subdir = false;
    backup(&configuration)?;

    configuration.hostname_subdir = true;
    fs::remove_file(fixture.home(".inputrc"))?;

    let orchestrator = restorer(configuration);
    let layout = orchestrator.inspect(fixture.mirror(), &RestoreOptions::default())?;
    assert_eq!(layout.host, None);

    let result =
        orchestrator.execute(&fixture.mirror(), &RestoreOptions::default(), &mut NoProgress);
    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(fixture.read(".inputrc")?, "set bell-style none");

    Ok(())
}
