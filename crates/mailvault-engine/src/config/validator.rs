//! Semantic validation for parsed job configuration values.

use anyhow::{bail, Result};

use crate::config::types::JobConfig;

/// Validate a parsed job configuration.
/// Returns Ok(()) if valid, Err with all validation errors if not.
pub fn validate_job(config: &JobConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported job version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.job.trim().is_empty() {
        errors.push("Job name must not be empty".to_string());
    }

    if config.storage.volumes.is_empty() {
        errors.push("Storage must define at least one volume".to_string());
    }

    for (i, volume) in config.storage.volumes.iter().enumerate() {
        if volume.url.trim().is_empty() {
            errors.push(format!("Volume {i} has an empty url"));
        }
        if volume.mount_point.as_os_str().is_empty() {
            errors.push(format!("Volume {i} has an empty mount_point"));
        }
    }

    if config.storage.merged_mount_point.as_os_str().is_empty() {
        errors.push("merged_mount_point must not be empty".to_string());
    }

    if config.mailboxes.workers == 0 {
        errors.push("mailboxes.workers must be at least 1".to_string());
    }

    if config.files.paths.is_empty() {
        errors.push("files.paths must list at least one path to archive".to_string());
    }

    if config.lock.file.trim().is_empty() {
        errors.push("lock.file must not be empty".to_string());
    }

    let argv_templates: [(&str, &Vec<String>); 9] = [
        ("commands.mount", &config.commands.mount),
        ("commands.merge_mount", &config.commands.merge_mount),
        ("commands.unmount", &config.commands.unmount),
        ("commands.list_units", &config.commands.list_units),
        ("commands.export_unit", &config.commands.export_unit),
        ("commands.archive_create", &config.commands.archive_create),
        ("commands.archive_prune", &config.commands.archive_prune),
        ("commands.database_dump", &config.commands.database_dump),
        ("commands.tree_archive", &config.commands.tree_archive),
    ];
    for (name, argv) in argv_templates {
        if argv.is_empty() {
            errors.push(format!("{name} must not be an empty command line"));
        }
    }

    if config.commands.directory_dump.is_empty() {
        errors.push("commands.directory_dump must list at least one command".to_string());
    }
    for (i, argv) in config.commands.directory_dump.iter().enumerate() {
        if argv.is_empty() {
            errors.push(format!(
                "commands.directory_dump[{i}] must not be an empty command line"
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Job validation failed:\n  - {}", errors.join("\n  - "));
    }
}
