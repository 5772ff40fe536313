use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use mailvault_engine::config::{parser, validator};
use mailvault_engine::{run_backup, Verdict};

/// Execute the `run` command: parse, validate, and run a backup job.
///
/// The exit code mirrors the verdict: 0 success, 1 success with errors,
/// 2 failed.
pub async fn execute(job_path: &Path) -> Result<ExitCode> {
    let config = parser::parse_job(job_path)
        .with_context(|| format!("Failed to parse job: {}", job_path.display()))?;

    validator::validate_job(&config)?;

    tracing::info!(
        job = config.job,
        volumes = config.storage.volumes.len(),
        workers = config.mailboxes.workers,
        "Job validated"
    );

    let report = run_backup(&config).await;

    println!("Backup '{}' finished: {}", config.job, report.verdict);
    println!("  Units enumerated: {}", report.units_enumerated);
    println!("  Units completed:  {}", report.units_completed);
    println!("  Units failed:     {}", report.units_failed);
    println!("  Database:         {}", ok_str(report.database_clean));
    println!("  Directory:        {}", ok_str(report.directory_clean));
    println!("  Files:            {}", ok_str(report.files_clean));
    println!("  Unmounted:        {}", ok_str(report.steps.unmounted));
    println!("  Duration:         {}s", report.duration_secs);

    // Machine-readable JSON for monitoring tools
    let json = serde_json::json!({
        "verdict": report.verdict.as_str(),
        "duration_secs": report.duration_secs,
        "units_enumerated": report.units_enumerated,
        "units_completed": report.units_completed,
        "units_failed": report.units_failed,
        "database_clean": report.database_clean,
        "directory_clean": report.directory_clean,
        "files_clean": report.files_clean,
        "mounted": report.steps.mounted,
        "workers_clean": report.steps.workers_clean,
        "units_clean": report.steps.units_clean,
        "unmounted": report.steps.unmounted,
    });
    println!("@@REPORT_JSON@@{}", json);

    Ok(match report.verdict {
        Verdict::Success => ExitCode::SUCCESS,
        Verdict::SuccessWithErrors => ExitCode::from(1),
        Verdict::Failed => ExitCode::from(2),
    })
}

fn ok_str(clean: bool) -> &'static str {
    if clean {
        "OK"
    } else {
        "FAILED"
    }
}
