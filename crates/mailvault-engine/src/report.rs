//! Run outcome model: per-phase step flags and the tri-state verdict.

/// Per-phase flags, each set at most once by the orchestrator after the
/// corresponding phase completes. All default to false so a skipped phase
/// counts against the verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupStepStatus {
    /// Remote volumes and the union view mounted.
    pub mounted: bool,
    /// Every worker task exited clean: all three independent tasks
    /// succeeded and nothing in the unit pool crashed.
    pub workers_clean: bool,
    /// Zero failed unit outcomes.
    pub units_clean: bool,
    /// Storage torn down clean.
    pub unmounted: bool,
}

impl BackupStepStatus {
    /// Classify the run. The priority ordering is deliberate: a mount or
    /// worker-process failure outranks granular per-unit and unmount
    /// failures, which only demote the run to success-with-errors.
    pub fn verdict(&self) -> Verdict {
        if !self.mounted || !self.workers_clean {
            Verdict::Failed
        } else if !self.units_clean || !self.unmounted {
            Verdict::SuccessWithErrors
        } else {
            Verdict::Success
        }
    }
}

/// Final tri-state outcome of one orchestrator run; the external contract
/// consumed by alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    SuccessWithErrors,
    Failed,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::SuccessWithErrors => "success-with-errors",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one backup run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub verdict: Verdict,
    pub duration_secs: u64,
    pub units_enumerated: u64,
    pub units_completed: u64,
    pub units_failed: u64,
    pub database_clean: bool,
    pub directory_clean: bool,
    pub files_clean: bool,
    pub steps: BackupStepStatus,
}
