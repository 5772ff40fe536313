//! Command runner: single transparent attempt at an external command.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::LazyLock;

use regex::Regex;
use tokio::process::Command;

/// Exit code reported when the command could not be launched at all.
pub const LAUNCH_FAILURE_EXIT_CODE: i32 = 127;

/// Exit code reported when the child was killed by a signal and has no
/// exit code of its own.
pub const SIGNALED_EXIT_CODE: i32 = -1;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("valid placeholder regex"));

/// Captured result of one command invocation. A value type: callers decide
/// what an exit code means.
#[derive(Debug)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    fn launch_failure(message: String) -> Self {
        Self {
            exit_code: LAUNCH_FAILURE_EXIT_CODE,
            stdout: Vec::new(),
            stderr: message.into_bytes(),
        }
    }
}

/// Runs external commands with a fixed environment overlay. Never fails:
/// launch errors are normalized into a `CommandResult` with exit code 127
/// and the error text in stderr. No retries, no timeout.
#[derive(Debug, Clone, Default)]
pub struct CommandRunner {
    env: BTreeMap<String, String>,
}

impl CommandRunner {
    pub fn new(env: BTreeMap<String, String>) -> Self {
        Self { env }
    }

    /// Run one command to completion, draining stdout and stderr.
    pub async fn run(&self, argv: &[String]) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            return CommandResult::launch_failure("empty command line".to_string());
        };

        tracing::debug!(command = %argv.join(" "), "running command");

        let output = Command::new(program)
            .args(args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) => CommandResult {
                exit_code: output.status.code().unwrap_or(SIGNALED_EXIT_CODE),
                stdout: output.stdout,
                stderr: output.stderr,
            },
            Err(err) => {
                CommandResult::launch_failure(format!("failed to launch {program}: {err}"))
            }
        }
    }
}

/// Expand an argv template: `{name}` tokens inside arguments are replaced
/// from `vars`; an argument that is exactly a key in `lists` is spliced
/// into multiple arguments. Unknown placeholders pass through untouched so
/// a misconfigured template fails loudly in the command itself.
pub fn expand(
    template: &[String],
    vars: &[(&str, &str)],
    lists: &[(&str, &[String])],
) -> Vec<String> {
    let mut argv = Vec::with_capacity(template.len());
    'args: for arg in template {
        for (key, values) in lists {
            if arg == &format!("{{{key}}}") {
                argv.extend(values.iter().cloned());
                continue 'args;
            }
        }
        let expanded = PLACEHOLDER_RE.replace_all(arg, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            vars.iter()
                .find(|(key, _)| *key == name)
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        });
        argv.push(expanded.into_owned());
    }
    argv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_exit_code_and_stdout() {
        let runner = CommandRunner::default();
        let result = runner.run(&argv(&["/bin/echo", "hello"])).await;
        assert_eq!(result.exit_code, 0);
        assert!(result.success());
        assert_eq!(result.stdout, b"hello\n");
        assert!(result.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_code() {
        let runner = CommandRunner::default();
        let result = runner.run(&argv(&["/bin/false"])).await;
        assert_eq!(result.exit_code, 1);
        assert!(!result.success());
    }

    #[tokio::test]
    async fn test_launch_failure_is_normalized() {
        let runner = CommandRunner::default();
        let result = runner
            .run(&argv(&["/nonexistent/binary/mailvault-test"]))
            .await;
        assert_eq!(result.exit_code, LAUNCH_FAILURE_EXIT_CODE);
        assert!(result.stderr_lossy().contains("failed to launch"));
    }

    #[tokio::test]
    async fn test_empty_command_line_is_normalized() {
        let runner = CommandRunner::default();
        let result = runner.run(&[]).await;
        assert_eq!(result.exit_code, LAUNCH_FAILURE_EXIT_CODE);
        assert!(result.stderr_lossy().contains("empty command line"));
    }

    #[tokio::test]
    async fn test_environment_overlay_reaches_child() {
        let mut env = BTreeMap::new();
        env.insert("MV_TEST_FLAG".to_string(), "overlay".to_string());
        let runner = CommandRunner::new(env);
        let result = runner
            .run(&argv(&["/bin/sh", "-c", "printf %s \"$MV_TEST_FLAG\""]))
            .await;
        assert_eq!(result.stdout, b"overlay");
    }

    #[test]
    fn test_expand_scalar_placeholders() {
        let template = argv(&["/usr/bin/borg", "create", "{repo}::{entry}", "{artifact}"]);
        let expanded = expand(
            &template,
            &[
                ("repo", "/mnt/repo"),
                ("entry", "alice-2024"),
                ("artifact", "/mnt/save/alice.tar"),
            ],
            &[],
        );
        assert_eq!(
            expanded,
            argv(&[
                "/usr/bin/borg",
                "create",
                "/mnt/repo::alice-2024",
                "/mnt/save/alice.tar"
            ])
        );
    }

    #[test]
    fn test_expand_splices_list_placeholder() {
        let template = argv(&["/bin/tar", "chf", "{dest}/files.tar", "{paths}"]);
        let paths = argv(&["/etc", "/opt/conf"]);
        let expanded = expand(&template, &[("dest", "/mnt/files")], &[("paths", &paths)]);
        assert_eq!(
            expanded,
            argv(&["/bin/tar", "chf", "/mnt/files/files.tar", "/etc", "/opt/conf"])
        );
    }

    #[test]
    fn test_expand_leaves_unknown_placeholders() {
        let template = argv(&["/bin/echo", "{not_bound}"]);
        let expanded = expand(&template, &[("unit", "alice")], &[]);
        assert_eq!(expanded[1], "{not_bound}");
    }
}
