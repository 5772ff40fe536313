//! Backup orchestration engine for a mail platform: mounts the backup
//! storage, exports every mailbox through a worker pool, archives the
//! results into versioned repositories alongside database, directory and
//! file-tree backups, then tears the storage down and classifies the run.

pub mod archive;
pub mod command;
pub mod config;
pub mod enumerate;
pub mod lock;
pub mod orchestrator;
pub mod pool;
pub mod report;
pub mod storage;
pub mod tasks;

pub use orchestrator::run_backup;
pub use report::{RunReport, Verdict};
