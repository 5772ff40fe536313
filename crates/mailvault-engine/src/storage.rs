//! Storage lifecycle: remote volume mounts and the union mount over them.

use crate::command::{expand, CommandRunner};
use crate::config::types::JobConfig;

/// Mount every remote volume in order, then the union view spanning them.
/// The first failure aborts the remaining mounts and returns false; rolling
/// back already-mounted volumes is `umount`'s job.
pub async fn mount(runner: &CommandRunner, config: &JobConfig) -> bool {
    for volume in &config.storage.volumes {
        let mount_point = volume.mount_point.to_string_lossy();
        let argv = expand(
            &config.commands.mount,
            &[("url", volume.url.as_str()), ("mount_point", &mount_point)],
            &[],
        );
        let result = runner.run(&argv).await;
        if result.success() {
            tracing::info!(mount_point = %mount_point, "volume mounted");
        } else {
            tracing::error!(
                mount_point = %mount_point,
                exit_code = result.exit_code,
                stderr = %result.stderr_lossy(),
                "failed to mount volume"
            );
            return false;
        }
    }

    let branches = config
        .storage
        .volumes
        .iter()
        .map(|v| v.mount_point.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(":");
    let merged = config.storage.merged_mount_point.to_string_lossy();
    let argv = expand(
        &config.commands.merge_mount,
        &[("branches", branches.as_str()), ("merged", &merged)],
        &[],
    );
    let result = runner.run(&argv).await;
    if result.success() {
        tracing::info!(merged = %merged, "union mount ready");
        true
    } else {
        tracing::error!(
            merged = %merged,
            exit_code = result.exit_code,
            stderr = %result.stderr_lossy(),
            "failed to mount union view"
        );
        false
    }
}

/// Unmount the union view first, then every remote volume. Every unmount is
/// attempted even after a failure; returns false if any step failed.
pub async fn umount(runner: &CommandRunner, config: &JobConfig) -> bool {
    let mut clean = true;

    let merged = config.storage.merged_mount_point.to_string_lossy();
    let argv = expand(&config.commands.unmount, &[("mount_point", &merged)], &[]);
    let result = runner.run(&argv).await;
    if result.success() {
        tracing::info!(merged = %merged, "union mount unmounted");
    } else {
        tracing::error!(
            merged = %merged,
            exit_code = result.exit_code,
            "failed to unmount union view"
        );
        clean = false;
    }

    for volume in &config.storage.volumes {
        let mount_point = volume.mount_point.to_string_lossy();
        let argv = expand(
            &config.commands.unmount,
            &[("mount_point", &mount_point)],
            &[],
        );
        let result = runner.run(&argv).await;
        if result.success() {
            tracing::info!(mount_point = %mount_point, "volume unmounted");
        } else {
            tracing::error!(
                mount_point = %mount_point,
                exit_code = result.exit_code,
                "failed to unmount volume"
            );
            clean = false;
        }
    }

    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{
        CommandsConfig, FilesConfig, LockConfig, MailboxConfig, RetentionPolicy, StorageConfig,
        TaskConfig, VolumeConfig,
    };
    use std::collections::BTreeMap;
    use std::path::Path;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn retention() -> RetentionPolicy {
        RetentionPolicy {
            daily: 1,
            weekly: 1,
            monthly: 1,
            yearly: 1,
        }
    }

    fn storage_config(root: &Path) -> JobConfig {
        let mount_log = root.join("mount.log");
        let unmount_log = root.join("unmount.log");
        JobConfig {
            version: "1.0".to_string(),
            job: "storage-test".to_string(),
            storage: StorageConfig {
                volumes: vec![
                    VolumeConfig {
                        url: "nfs1:/export".to_string(),
                        mount_point: root.join("vol1"),
                    },
                    VolumeConfig {
                        url: "nfs2:/export".to_string(),
                        mount_point: root.join("vol2"),
                    },
                ],
                merged_mount_point: root.join("merged"),
                backup_dir: "backup".to_string(),
            },
            lock: LockConfig::default(),
            environment: BTreeMap::new(),
            mailboxes: MailboxConfig {
                workers: 1,
                save_to: "mailbox".to_string(),
                repo: "mailbox_repo".to_string(),
                retention: retention(),
            },
            database: TaskConfig {
                save_to: "db".to_string(),
                repo: "db_repo".to_string(),
                prefix: "db".to_string(),
                retention: retention(),
            },
            directory: TaskConfig {
                save_to: "dir".to_string(),
                repo: "dir_repo".to_string(),
                prefix: "dir".to_string(),
                retention: retention(),
            },
            files: FilesConfig {
                paths: vec![root.join("etc")],
                save_to: "files".to_string(),
                repo: "files_repo".to_string(),
                prefix: "files".to_string(),
                retention: retention(),
                ok_exit_codes: vec![0],
            },
            commands: CommandsConfig {
                mount: argv(&[
                    "/bin/sh",
                    "-c",
                    &format!("echo {{url}} {{mount_point}} >> {}", mount_log.display()),
                ]),
                merge_mount: argv(&[
                    "/bin/sh",
                    "-c",
                    &format!("echo {{branches}} {{merged}} >> {}", mount_log.display()),
                ]),
                unmount: argv(&[
                    "/bin/sh",
                    "-c",
                    &format!("echo {{mount_point}} >> {}", unmount_log.display()),
                ]),
                list_units: argv(&["/bin/true"]),
                export_unit: argv(&["/bin/true"]),
                archive_create: argv(&["/bin/true"]),
                archive_prune: argv(&["/bin/true"]),
                database_dump: argv(&["/bin/true"]),
                directory_dump: vec![argv(&["/bin/true"])],
                tree_archive: argv(&["/bin/true"]),
            },
        }
    }

    fn log_lines(path: &Path) -> Vec<String> {
        match std::fs::read_to_string(path) {
            Ok(contents) => contents.lines().map(str::to_string).collect(),
            Err(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mount_invokes_each_volume_then_union() {
        let dir = tempfile::tempdir().unwrap();
        let config = storage_config(dir.path());

        assert!(mount(&CommandRunner::default(), &config).await);

        let lines = log_lines(&dir.path().join("mount.log"));
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("nfs1:/export"));
        assert!(lines[1].starts_with("nfs2:/export"));
        // Union mount last, with colon-joined branches.
        assert!(lines[2].contains(&format!(
            "{}:{}",
            dir.path().join("vol1").display(),
            dir.path().join("vol2").display()
        )));
    }

    #[tokio::test]
    async fn test_mount_failure_aborts_remaining_mounts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = storage_config(dir.path());
        config.commands.mount = argv(&["/bin/false"]);

        assert!(!mount(&CommandRunner::default(), &config).await);
        // The union mount never ran.
        assert!(log_lines(&dir.path().join("mount.log")).is_empty());
    }

    #[tokio::test]
    async fn test_umount_attempts_every_step_after_failure() {
        let dir = tempfile::tempdir().unwrap();
        let unmount_log = dir.path().join("unmount.log");
        let mut config = storage_config(dir.path());
        // Union unmount fails, volume unmounts still record themselves.
        config.commands.unmount = argv(&[
            "/bin/sh",
            "-c",
            &format!(
                "echo {{mount_point}} >> {}; case {{mount_point}} in *merged) exit 1;; esac",
                unmount_log.display()
            ),
        ]);

        assert!(!umount(&CommandRunner::default(), &config).await);
        assert_eq!(log_lines(&unmount_log).len(), 3);
    }

    #[tokio::test]
    async fn test_mount_umount_cycle_is_repeatable() {
        let dir = tempfile::tempdir().unwrap();
        let config = storage_config(dir.path());
        let runner = CommandRunner::default();

        assert!(mount(&runner, &config).await);
        assert!(umount(&runner, &config).await);
        assert!(mount(&runner, &config).await);
        assert!(umount(&runner, &config).await);

        // Each cycle issues the same command sequence.
        assert_eq!(log_lines(&dir.path().join("mount.log")).len(), 6);
        assert_eq!(log_lines(&dir.path().join("unmount.log")).len(), 6);
    }
}
