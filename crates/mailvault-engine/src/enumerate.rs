//! Work-unit enumeration: one pass over the listing command's stdout.

use std::collections::BTreeMap;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::pool::WorkUnit;

/// Spawn the listing command and stream its line-oriented stdout into the
/// work queue: first whitespace token per line, empty lines skipped. Returns
/// the number of units enumerated. A launch failure or non-zero exit yields
/// whatever was parsed so far (possibly zero units) and is only logged; the
/// caller cannot distinguish an empty inventory from broken enumeration.
pub async fn stream_units(
    argv: &[String],
    env: &BTreeMap<String, String>,
    queue: &mpsc::UnboundedSender<WorkUnit>,
) -> u64 {
    let Some((program, args)) = argv.split_first() else {
        tracing::error!("enumeration command line is empty");
        return 0;
    };

    let mut child = match Command::new(program)
        .args(args)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            tracing::error!(command = %program, %err, "failed to launch enumeration command");
            return 0;
        }
    };

    let Some(stdout) = child.stdout.take() else {
        tracing::error!(command = %program, "enumeration command has no stdout");
        return 0;
    };

    // Drain stderr concurrently so a chatty listing tool cannot block on a
    // full pipe; its diagnostics are surfaced if the command exits unclean.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_end(&mut buf).await;
        }
        buf
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut count = 0u64;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(unit) = line.split_whitespace().next() else {
                    continue;
                };
                if queue.send(unit.to_string()).is_err() {
                    // All workers are gone; stop reading.
                    break;
                }
                count += 1;
            }
            Ok(None) => break,
            Err(err) => {
                tracing::error!(%err, "error reading enumeration output");
                break;
            }
        }
    }

    let stderr_buf = stderr_task.await.unwrap_or_default();

    match child.wait().await {
        Ok(status) if status.success() => {
            tracing::info!(units = count, "enumeration complete");
        }
        Ok(status) => {
            tracing::error!(
                units = count,
                exit_code = status.code().unwrap_or(-1),
                stderr = %String::from_utf8_lossy(&stderr_buf),
                "enumeration command exited unclean"
            );
        }
        Err(err) => {
            tracing::error!(%err, "failed to await enumeration command");
        }
    }

    count
}
