//! Independent backup tasks run alongside the mailbox pool: the system
//! database dump, the directory-service metadata dump, and the config
//! file-tree archive.
//!
//! Each task is the same four-stage pipeline: dump into its save directory,
//! archive the save directory into its repository, prune the repository by
//! retention policy, then clear the save directory. A dump or archive
//! failure marks the task unclean; a prune or cleanup failure is logged
//! only.

use std::path::Path;
use std::sync::Arc;

use crate::archive;
use crate::command::{expand, CommandRunner};
use crate::config::types::{JobConfig, RetentionPolicy};

/// Dump the system database and archive the result.
pub async fn run_database_task(runner: CommandRunner, config: Arc<JobConfig>) -> bool {
    let root = config.backup_root();
    let save = config.database.save_dir(&root);
    let dest = save.to_string_lossy().into_owned();

    let argv = expand(&config.commands.database_dump, &[("dest", &dest)], &[]);
    let result = runner.run(&argv).await;
    if !result.success() {
        tracing::error!(
            exit_code = result.exit_code,
            stderr = %result.stderr_lossy(),
            "database dump failed"
        );
        return false;
    }
    tracing::info!("database dump complete");

    archive_save_dir(
        &runner,
        &config,
        &config.database.repo_dir(&root),
        &config.database.prefix,
        &config.database.retention,
        &save,
    )
    .await
}

/// Dump directory-service metadata and archive the result. Every configured
/// dump command must succeed before the archive stage runs.
pub async fn run_directory_task(runner: CommandRunner, config: Arc<JobConfig>) -> bool {
    let root = config.backup_root();
    let save = config.directory.save_dir(&root);
    let dest = save.to_string_lossy().into_owned();

    for template in &config.commands.directory_dump {
        let argv = expand(template, &[("dest", &dest)], &[]);
        let result = runner.run(&argv).await;
        if !result.success() {
            tracing::error!(
                command = %argv.join(" "),
                exit_code = result.exit_code,
                stderr = %result.stderr_lossy(),
                "directory dump failed"
            );
            return false;
        }
    }
    tracing::info!("directory dump complete");

    archive_save_dir(
        &runner,
        &config,
        &config.directory.repo_dir(&root),
        &config.directory.prefix,
        &config.directory.retention,
        &save,
    )
    .await
}

/// Archive the configured file trees. The dump exit code is checked against
/// `ok_exit_codes`: tar's "file changed as we read it" warning exit is
/// routinely tolerated here.
pub async fn run_tree_task(runner: CommandRunner, config: Arc<JobConfig>) -> bool {
    let root = config.backup_root();
    let save = config.files.save_dir(&root);
    let dest = save.to_string_lossy().into_owned();
    let paths: Vec<String> = config
        .files
        .paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();

    let argv = expand(
        &config.commands.tree_archive,
        &[("dest", &dest)],
        &[("paths", &paths)],
    );
    let result = runner.run(&argv).await;
    if !config.files.ok_exit_codes.contains(&result.exit_code) {
        tracing::error!(
            exit_code = result.exit_code,
            stderr = %result.stderr_lossy(),
            "file tree archive failed"
        );
        return false;
    }
    if result.exit_code != 0 {
        tracing::warn!(
            exit_code = result.exit_code,
            "file tree archive exited non-zero but within tolerated codes"
        );
    }
    tracing::info!("file tree dump complete");

    archive_save_dir(
        &runner,
        &config,
        &config.files.repo_dir(&root),
        &config.files.prefix,
        &config.files.retention,
        &save,
    )
    .await
}

/// Shared tail of every task: archive the save directory, prune the
/// repository, clear the save directory. Returns false only when the archive
/// itself fails; the save directory is then left intact for recovery.
async fn archive_save_dir(
    runner: &CommandRunner,
    config: &JobConfig,
    repo: &Path,
    prefix: &str,
    retention: &RetentionPolicy,
    save: &Path,
) -> bool {
    let entry = archive::entry_name(prefix);
    let created = archive::create(runner, &config.commands.archive_create, repo, &entry, save).await;
    if !created.success() {
        tracing::error!(
            prefix,
            exit_code = created.exit_code,
            stderr = %created.stderr_lossy(),
            "archive failed, keeping save directory"
        );
        return false;
    }
    tracing::info!(prefix, entry = %entry, "archived");

    let pruned = archive::prune(runner, &config.commands.archive_prune, repo, prefix, retention).await;
    if !pruned.success() {
        tracing::error!(prefix, exit_code = pruned.exit_code, "repository prune failed");
    }

    if let Err(err) = clear_dir(save) {
        tracing::error!(dir = %save.display(), %err, "failed to clear save directory");
    }

    true
}

/// Remove every entry of `dir`, keeping the directory itself.
fn clear_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
