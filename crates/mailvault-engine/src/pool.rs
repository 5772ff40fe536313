//! Mailbox worker pool: N export workers over a shared work queue, a single
//! archiving worker downstream, and an outcome aggregator.
//!
//! Termination is signaled by channel close rather than sentinel values: the
//! enumeration task drops the work-queue sender when the listing is
//! exhausted, so every worker observes end-of-work exactly once, and the
//! forwarding/outcome channels close when the last worker drops its sender
//! clones. Counting sentinels against the pool size is thereby enforced
//! structurally by the channels.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;

use crate::archive;
use crate::command::{expand, CommandRunner};
use crate::config::types::JobConfig;
use crate::enumerate;

/// Opaque identifier of one independently-backable entity.
pub type WorkUnit = String;

/// Outcome of exporting one unit. Exactly one per enumerated unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub unit: WorkUnit,
    pub exit_code: i32,
}

/// Successful export forwarded to the archiving worker.
#[derive(Debug)]
struct ArchiveRequest {
    unit: WorkUnit,
    artifact: PathBuf,
}

/// Aggregated result of one pool run.
#[derive(Debug, Default)]
pub struct UnitPoolReport {
    pub enumerated: u64,
    pub completed: u64,
    pub failed: u64,
    /// A worker, the archiver, or the aggregator panicked.
    pub crashed: bool,
}

impl UnitPoolReport {
    /// True iff every enumerated unit exported clean.
    pub fn units_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Enumerate units and run the full pool: export workers, archiving worker,
/// outcome aggregator. Returns once every task has terminated.
pub async fn run_unit_pool(runner: CommandRunner, config: Arc<JobConfig>) -> UnitPoolReport {
    let (work_tx, work_rx) = mpsc::unbounded_channel::<WorkUnit>();
    let work_rx = Arc::new(Mutex::new(work_rx));
    let (forward_tx, forward_rx) = mpsc::unbounded_channel::<ArchiveRequest>();
    let (outcome_tx, outcome_rx) = mpsc::unbounded_channel::<UnitOutcome>();

    let enum_config = config.clone();
    let enumerator = tokio::spawn(async move {
        // work_tx drops on return: the end-of-work signal for every worker.
        enumerate::stream_units(
            &enum_config.commands.list_units,
            &enum_config.environment,
            &work_tx,
        )
        .await
    });

    let mut workers = JoinSet::new();
    for id in 0..config.mailboxes.workers {
        workers.spawn(unit_worker(
            id,
            runner.clone(),
            config.clone(),
            work_rx.clone(),
            forward_tx.clone(),
            outcome_tx.clone(),
        ));
    }
    drop(forward_tx);
    drop(outcome_tx);

    let archiver = tokio::spawn(archive_worker(runner.clone(), config.clone(), forward_rx));
    let aggregator = tokio::spawn(outcome_aggregator(outcome_rx));

    let mut crashed = false;
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            tracing::error!(%err, "mailbox worker crashed");
            crashed = true;
        }
    }

    let enumerated = match enumerator.await {
        Ok(count) => count,
        Err(err) => {
            tracing::error!(%err, "enumeration task crashed");
            crashed = true;
            0
        }
    };

    if let Err(err) = archiver.await {
        tracing::error!(%err, "archiving worker crashed");
        crashed = true;
    }

    let (completed, failed) = match aggregator.await {
        Ok(counts) => counts,
        Err(err) => {
            tracing::error!(%err, "outcome aggregator crashed");
            crashed = true;
            (0, 0)
        }
    };

    UnitPoolReport {
        enumerated,
        completed,
        failed,
        crashed,
    }
}

/// One export worker: drain the shared queue until it closes. A failed
/// export is recorded and logged; it never aborts sibling workers.
async fn unit_worker(
    id: usize,
    runner: CommandRunner,
    config: Arc<JobConfig>,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<WorkUnit>>>,
    forward: mpsc::UnboundedSender<ArchiveRequest>,
    outcomes: mpsc::UnboundedSender<UnitOutcome>,
) {
    tracing::info!(worker = id, "mailbox worker started");
    let root = config.backup_root();

    loop {
        // Hold the queue lock only for the dequeue, not the export.
        let unit = { queue.lock().await.recv().await };
        let Some(unit) = unit else { break };

        let artifact = config.mailboxes.artifact_path(&root, &unit);
        let artifact_str = artifact.to_string_lossy().into_owned();
        let argv = expand(
            &config.commands.export_unit,
            &[("unit", unit.as_str()), ("artifact", &artifact_str)],
            &[],
        );
        let result = runner.run(&argv).await;

        if result.success() {
            tracing::info!(worker = id, unit = %unit, "mailbox exported");
            let _ = forward.send(ArchiveRequest {
                unit: unit.clone(),
                artifact,
            });
        } else {
            tracing::error!(
                worker = id,
                unit = %unit,
                exit_code = result.exit_code,
                stderr = %result.stderr_lossy(),
                "mailbox export failed"
            );
        }

        let _ = outcomes.send(UnitOutcome {
            unit,
            exit_code: result.exit_code,
        });
    }

    tracing::info!(worker = id, "mailbox worker stopped");
}

/// Archive forwarded artifacts until the forwarding channel closes. The
/// local artifact is deleted only after a successful archive; on archive
/// failure it stays behind for manual recovery. Failures never block later
/// items and do not influence the verdict.
async fn archive_worker(
    runner: CommandRunner,
    config: Arc<JobConfig>,
    mut requests: mpsc::UnboundedReceiver<ArchiveRequest>,
) {
    let root = config.backup_root();
    let repo = config.mailboxes.repo_dir(&root);

    while let Some(request) = requests.recv().await {
        let entry = archive::entry_name(&request.unit);
        let created = archive::create(
            &runner,
            &config.commands.archive_create,
            &repo,
            &entry,
            &request.artifact,
        )
        .await;
        if !created.success() {
            tracing::error!(
                unit = %request.unit,
                exit_code = created.exit_code,
                "mailbox archive failed, keeping local artifact"
            );
            continue;
        }
        tracing::info!(unit = %request.unit, entry = %entry, "mailbox archived");

        let pruned = archive::prune(
            &runner,
            &config.commands.archive_prune,
            &repo,
            &request.unit,
            &config.mailboxes.retention,
        )
        .await;
        if !pruned.success() {
            tracing::error!(
                unit = %request.unit,
                exit_code = pruned.exit_code,
                "mailbox repository prune failed"
            );
        }

        if let Err(err) = tokio::fs::remove_file(&request.artifact).await {
            tracing::error!(unit = %request.unit, %err, "failed to remove local artifact");
        }
    }
}

/// Count outcomes until the channel closes, i.e. until every worker exited.
async fn outcome_aggregator(mut outcomes: mpsc::UnboundedReceiver<UnitOutcome>) -> (u64, u64) {
    let mut completed = 0u64;
    let mut failed = 0u64;

    while let Some(outcome) = outcomes.recv().await {
        if outcome.exit_code == 0 {
            completed += 1;
        } else {
            failed += 1;
        }
    }

    if failed > 0 {
        tracing::error!(completed, failed, "mailbox backup finished with failures");
    } else {
        tracing::info!(completed, failed, "mailbox backup finished");
    }

    (completed, failed)
}
