use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level backup job configuration, parsed from a YAML job file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub version: String,
    pub job: String,
    pub storage: StorageConfig,
    #[serde(default)]
    pub lock: LockConfig,
    /// Environment variables applied to every spawned command.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub mailboxes: MailboxConfig,
    pub database: TaskConfig,
    pub directory: TaskConfig,
    pub files: FilesConfig,
    pub commands: CommandsConfig,
}

impl JobConfig {
    /// Root directory under which all backup destinations live.
    pub fn backup_root(&self) -> PathBuf {
        self.storage
            .merged_mount_point
            .join(&self.storage.backup_dir)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.backup_root().join(&self.lock.file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Remote volumes mounted in order before the union mount.
    pub volumes: Vec<VolumeConfig>,
    /// Union mount point spanning all volumes; the backup destination root.
    pub merged_mount_point: PathBuf,
    pub backup_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub url: String,
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_file")]
    pub file: String,
    /// Abort the run if the lock file already exists. Default keeps the
    /// advisory behavior: log the stale lock and proceed.
    #[serde(default)]
    pub fail_if_held: bool,
}

fn default_lock_file() -> String {
    "backup.lock".to_string()
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            file: default_lock_file(),
            fail_if_held: false,
        }
    }
}

/// Retention counts handed to every prune invocation. Presence-validated
/// only; the prune tool owns the arithmetic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub daily: u32,
    pub weekly: u32,
    pub monthly: u32,
    pub yearly: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailboxConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub save_to: String,
    pub repo: String,
    pub retention: RetentionPolicy,
}

fn default_workers() -> usize {
    4
}

impl MailboxConfig {
    pub fn save_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.save_to)
    }

    pub fn repo_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.repo)
    }

    /// Local artifact path for one exported mailbox.
    pub fn artifact_path(&self, root: &Path, unit: &str) -> PathBuf {
        self.save_dir(root).join(format!("{unit}.tar"))
    }
}

/// A single-shot backup task (database dump, directory-metadata dump).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub save_to: String,
    pub repo: String,
    pub prefix: String,
    pub retention: RetentionPolicy,
}

impl TaskConfig {
    pub fn save_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.save_to)
    }

    pub fn repo_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.repo)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Filesystem paths rolled into the file-tree archive.
    pub paths: Vec<PathBuf>,
    pub save_to: String,
    pub repo: String,
    pub prefix: String,
    pub retention: RetentionPolicy,
    /// Export exit codes treated as success. GNU tar exits 1 when files
    /// changed mid-archive; only 2 is fatal.
    #[serde(default = "default_ok_exit_codes")]
    pub ok_exit_codes: Vec<i32>,
}

fn default_ok_exit_codes() -> Vec<i32> {
    vec![0]
}

impl FilesConfig {
    pub fn save_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.save_to)
    }

    pub fn repo_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.repo)
    }
}

/// External utilities as argv templates. Elements may carry `{placeholder}`
/// tokens expanded at invocation time; see `command::expand`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Mount one remote volume: `{url}`, `{mount_point}`.
    pub mount: Vec<String>,
    /// Mount the union view: `{branches}` (colon-joined), `{merged}`.
    pub merge_mount: Vec<String>,
    /// Unmount one mount point: `{mount_point}`.
    pub unmount: Vec<String>,
    /// Enumerate work units, one per line on stdout.
    pub list_units: Vec<String>,
    /// Export one unit to a local artifact: `{unit}`, `{artifact}`.
    pub export_unit: Vec<String>,
    /// Archive a path into a repository entry: `{repo}`, `{entry}`, `{artifact}`.
    pub archive_create: Vec<String>,
    /// Prune a repository prefix: `{repo}`, `{prefix}`, `{keep_daily}`,
    /// `{keep_weekly}`, `{keep_monthly}`, `{keep_yearly}`.
    pub archive_prune: Vec<String>,
    /// Dump the system database: `{dest}`.
    pub database_dump: Vec<String>,
    /// Dump directory metadata; every command must succeed: `{dest}`.
    pub directory_dump: Vec<Vec<String>>,
    /// Archive the configured file trees: `{dest}`, `{paths}` (list splice).
    pub tree_archive: Vec<String>,
}
