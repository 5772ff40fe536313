use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use mailvault_engine::config::{parser, validator};

/// Execute the `check` command: parse and validate a job file.
pub async fn execute(job_path: &Path) -> Result<ExitCode> {
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    validator::validate_job(&config)?;

    println!("Job structure:   OK");
    println!("  Job:           {}", config.job);
    println!("  Volumes:       {}", config.storage.volumes.len());
    println!("  Workers:       {}", config.mailboxes.workers);
    println!("  Backup root:   {}", config.backup_root().display());
    println!("  Lock file:     {}", config.lock_path().display());
    println!("\nAll checks passed.");

    Ok(ExitCode::SUCCESS)
}
