//! Runtime state of one playbook execution

use super::context::WorkflowContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Workflow lifecycle: Running is the only non-terminal status, and the
/// transition out of it is one-way
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        *self != WorkflowStatus::Running
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    /// The step never ran: its guard condition was false
    Skipped,
}

/// Outcome of one dispatched step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Collaborator invocation attempts, 1 unless retried
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl StepResult {
    pub fn completed(name: &str, output: String, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Completed,
            started_at,
            finished_at: Utc::now(),
            output,
            error: None,
            attempts: 1,
        }
    }

    pub fn failed(name: &str, error: String, started_at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            status: StepStatus::Failed,
            started_at,
            finished_at: Utc::now(),
            output: String::new(),
            error: Some(error),
            attempts: 1,
        }
    }

    pub fn skipped(name: &str, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            status: StepStatus::Skipped,
            started_at: now,
            finished_at: now,
            output: reason.to_string(),
            error: None,
            attempts: 1,
        }
    }

    /// Dry-run placeholder: Completed with synthetic output and zero elapsed time
    pub fn simulated(name: &str, output: String) -> Self {
        let now = Utc::now();
        Self {
            name: name.to_string(),
            status: StepStatus::Completed,
            started_at: now,
            finished_at: now,
            output,
            error: None,
            attempts: 1,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Execution counters kept on each instance
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub steps_completed: u32,
    pub steps_failed: u32,
    pub retries_performed: u32,
}

/// One runtime execution of a playbook.
///
/// Mutated only by the owning executor task; other threads observe snapshots
/// through the registry. The cooperative stop flag lives on the registry
/// handle, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: Uuid,
    pub playbook: String,
    pub playbook_version: String,
    pub context: WorkflowContext,
    pub status: WorkflowStatus,
    pub step_results: Vec<StepResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub metrics: WorkflowMetrics,
    pub dry_run: bool,
}

impl WorkflowInstance {
    pub fn new(
        id: Uuid,
        playbook: &str,
        playbook_version: &str,
        context: WorkflowContext,
        dry_run: bool,
    ) -> Self {
        Self {
            id,
            playbook: playbook.to_string(),
            playbook_version: playbook_version.to_string(),
            context,
            status: WorkflowStatus::Running,
            step_results: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            metrics: WorkflowMetrics::default(),
            dry_run,
        }
    }

    /// Append step results and fold them into the metrics
    pub fn record(&mut self, results: Vec<StepResult>) {
        for result in &results {
            match result.status {
                StepStatus::Completed => self.metrics.steps_completed += 1,
                StepStatus::Failed => self.metrics.steps_failed += 1,
                StepStatus::Skipped => {}
            }
            self.metrics.retries_performed += result.attempts.saturating_sub(1);
        }
        self.step_results.extend(results);
    }

    /// One-way transition out of Running
    pub fn finalize(&mut self, status: WorkflowStatus) {
        debug_assert!(status.is_terminal());
        if self.status == WorkflowStatus::Running {
            self.status = status;
            self.finished_at = Some(Utc::now());
        }
    }
}
