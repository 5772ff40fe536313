//! Top-level run sequence: mount, lock, fan out the backup workloads, tear
//! down, classify.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;

use crate::command::CommandRunner;
use crate::config::types::JobConfig;
use crate::lock::LockFile;
use crate::pool::{self, UnitPoolReport};
use crate::report::{BackupStepStatus, RunReport, Verdict};
use crate::storage;
use crate::tasks;

/// Run one full backup. Never returns an error: every failure is folded
/// into the report's verdict, and teardown is attempted regardless of how
/// far the run got.
pub async fn run_backup(config: &JobConfig) -> RunReport {
    let started = Instant::now();
    let config = Arc::new(config.clone());
    let runner = CommandRunner::new(config.environment.clone());
    tracing::info!(job = %config.job, "backup starting");

    let mut steps = BackupStepStatus::default();
    let mut pool_report = UnitPoolReport::default();
    let mut database_clean = false;
    let mut directory_clean = false;
    let mut files_clean = false;

    steps.mounted = storage::mount(&runner, &config).await;

    if steps.mounted && destinations_ready(&config) {
        match LockFile::acquire(config.lock_path(), config.lock.fail_if_held) {
            Ok(lock) => {
                let unit_pool = tokio::spawn(pool::run_unit_pool(runner.clone(), config.clone()));
                let database =
                    tokio::spawn(tasks::run_database_task(runner.clone(), config.clone()));
                let directory =
                    tokio::spawn(tasks::run_directory_task(runner.clone(), config.clone()));
                let tree = tokio::spawn(tasks::run_tree_task(runner.clone(), config.clone()));

                pool_report = match unit_pool.await {
                    Ok(report) => report,
                    Err(err) => {
                        tracing::error!(%err, "mailbox pool crashed");
                        UnitPoolReport {
                            crashed: true,
                            ..UnitPoolReport::default()
                        }
                    }
                };
                database_clean = join_flag(database, "database").await;
                directory_clean = join_flag(directory, "directory").await;
                files_clean = join_flag(tree, "files").await;

                steps.workers_clean =
                    database_clean && directory_clean && files_clean && !pool_report.crashed;
                steps.units_clean = pool_report.units_clean();

                lock.release();
            }
            Err(err) => {
                // Another run appears to be in progress; skip the workloads
                // but still tear storage down.
                tracing::error!(%err, "backup workloads skipped");
            }
        }
    }

    steps.unmounted = storage::umount(&runner, &config).await;

    let report = RunReport {
        verdict: steps.verdict(),
        duration_secs: started.elapsed().as_secs(),
        units_enumerated: pool_report.enumerated,
        units_completed: pool_report.completed,
        units_failed: pool_report.failed,
        database_clean,
        directory_clean,
        files_clean,
        steps,
    };

    match report.verdict {
        Verdict::Success => tracing::info!(
            job = %config.job,
            duration_secs = report.duration_secs,
            units = report.units_completed,
            "backup finished"
        ),
        Verdict::SuccessWithErrors => tracing::warn!(
            job = %config.job,
            duration_secs = report.duration_secs,
            units_failed = report.units_failed,
            unmounted = steps.unmounted,
            "backup finished with errors"
        ),
        Verdict::Failed => tracing::error!(
            job = %config.job,
            duration_secs = report.duration_secs,
            mounted = steps.mounted,
            workers_clean = steps.workers_clean,
            "backup failed"
        ),
    }

    report
}

/// The backup root and every save directory must exist and be writable on
/// the mounted storage; anything less means the mount is not the volume we
/// expect and the run must not write anywhere.
fn destinations_ready(config: &JobConfig) -> bool {
    let root = config.backup_root();
    let dirs = [
        root.clone(),
        config.mailboxes.save_dir(&root),
        config.database.save_dir(&root),
        config.directory.save_dir(&root),
        config.files.save_dir(&root),
    ];
    for dir in dirs {
        if let Err(err) = check_writable(&dir) {
            tracing::error!(dir = %dir.display(), %err, "backup destination not writable");
            return false;
        }
    }
    true
}

/// A destination is usable only if it is a directory we can actually write
/// into. The permission bits are checked first so a read-only directory is
/// rejected even when the process runs as root; then an actual write is
/// attempted to catch read-only filesystems.
fn check_writable(dir: &Path) -> std::io::Result<()> {
    let metadata = std::fs::metadata(dir)?;
    if !metadata.is_dir() {
        return Err(std::io::Error::other("not a directory"));
    }
    if metadata.permissions().readonly() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "directory is read-only",
        ));
    }
    let marker = dir.join(".mailvault-access");
    std::fs::write(&marker, [])?;
    std::fs::remove_file(&marker)
}

async fn join_flag(handle: JoinHandle<bool>, task: &'static str) -> bool {
    match handle.await {
        Ok(clean) => clean,
        Err(err) => {
            tracing::error!(task, %err, "backup task crashed");
            false
        }
    }
}
