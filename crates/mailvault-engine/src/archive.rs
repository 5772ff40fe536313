//! Versioned repository operations: create timestamped entries, prune by
//! retention policy. The archive tool itself is an opaque configured command.

use std::path::Path;

use chrono::Utc;

use crate::command::{expand, CommandResult, CommandRunner};
use crate::config::types::RetentionPolicy;

const ENTRY_TIMESTAMP_FMT: &str = "%Y-%m-%dT%H:%M:%S";

/// Repository entry name for one archive run: `<prefix>-<UTC timestamp>`.
pub fn entry_name(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().format(ENTRY_TIMESTAMP_FMT))
}

/// Archive `artifact` into `repo` under `entry`.
pub async fn create(
    runner: &CommandRunner,
    template: &[String],
    repo: &Path,
    entry: &str,
    artifact: &Path,
) -> CommandResult {
    let repo = repo.to_string_lossy();
    let artifact = artifact.to_string_lossy();
    let argv = expand(
        template,
        &[("repo", &repo), ("entry", entry), ("artifact", &artifact)],
        &[],
    );
    runner.run(&argv).await
}

/// Prune entries under `prefix` in `repo`, keeping the configured number of
/// daily/weekly/monthly/yearly entries.
pub async fn prune(
    runner: &CommandRunner,
    template: &[String],
    repo: &Path,
    prefix: &str,
    keep: &RetentionPolicy,
) -> CommandResult {
    let repo = repo.to_string_lossy();
    let daily = keep.daily.to_string();
    let weekly = keep.weekly.to_string();
    let monthly = keep.monthly.to_string();
    let yearly = keep.yearly.to_string();
    let argv = expand(
        template,
        &[
            ("repo", &repo),
            ("prefix", prefix),
            ("keep_daily", &daily),
            ("keep_weekly", &weekly),
            ("keep_monthly", &monthly),
            ("keep_yearly", &yearly),
        ],
        &[],
    );
    runner.run(&argv).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_entry_name_shape() {
        let entry = entry_name("mysql");
        // mysql-2024-01-15T10:30:00
        assert!(entry.starts_with("mysql-"));
        assert_eq!(entry.len(), "mysql-".len() + 19);
        assert!(entry.contains('T'));
    }

    #[tokio::test]
    async fn test_create_expands_repo_and_entry() {
        let runner = CommandRunner::default();
        let template = argv(&["/bin/echo", "{repo}::{entry}", "{artifact}"]);
        let result = create(
            &runner,
            &template,
            &PathBuf::from("/mnt/repo"),
            "alice-2024-01-15T10:30:00",
            &PathBuf::from("/mnt/save/alice.tar"),
        )
        .await;
        assert!(result.success());
        assert_eq!(
            String::from_utf8_lossy(&result.stdout),
            "/mnt/repo::alice-2024-01-15T10:30:00 /mnt/save/alice.tar\n"
        );
    }

    #[tokio::test]
    async fn test_prune_expands_retention_counts() {
        let runner = CommandRunner::default();
        let template = argv(&[
            "/bin/echo",
            "--keep-daily={keep_daily}",
            "--keep-weekly={keep_weekly}",
            "--keep-monthly={keep_monthly}",
            "--keep-yearly={keep_yearly}",
            "--prefix",
            "{prefix}",
            "{repo}",
        ]);
        let keep = RetentionPolicy {
            daily: 7,
            weekly: 4,
            monthly: 6,
            yearly: 1,
        };
        let result = prune(
            &runner,
            &template,
            &PathBuf::from("/mnt/repo"),
            "mysql",
            &keep,
        )
        .await;
        assert!(result.success());
        assert_eq!(
            String::from_utf8_lossy(&result.stdout),
            "--keep-daily=7 --keep-weekly=4 --keep-monthly=6 --keep-yearly=1 --prefix mysql /mnt/repo\n"
        );
    }
}
