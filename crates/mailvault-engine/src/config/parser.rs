//! Job YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::JobConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` references with environment variable values.
/// Unset variables are collected across the whole document and reported in
/// one error, each variable once, in the same accumulate-everything style
/// as job validation. Argv `{placeholder}` tokens are not `${ENV}`
/// references and pass through untouched.
///
/// # Errors
///
/// Returns an error naming every referenced environment variable that is
/// not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing: Vec<String> = Vec::new();

    let substituted = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                if !missing.iter().any(|m| m == name) {
                    missing.push(name.to_string());
                }
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(substituted.into_owned())
    } else {
        anyhow::bail!(
            "Job file references unset environment variable(s): {}",
            missing.join(", ")
        );
    }
}

/// Parse a job YAML string, substituting `${ENV}` references first.
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML does not
/// deserialize into a job.
pub fn parse_job_str(yaml_str: &str) -> Result<JobConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: JobConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse job YAML")?;
    Ok(config)
}

/// Parse a job YAML file. All errors carry the offending file path.
///
/// # Errors
///
/// Returns an error if the file cannot be read, references unset
/// environment variables, or does not deserialize into a job.
pub fn parse_job(path: &Path) -> Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read job file: {}", path.display()))?;
    parse_job_str(&content).with_context(|| format!("Invalid job file: {}", path.display()))
}
