use std::time::Duration;
use thiserror::Error;

/// Errors produced by the orchestration engine.
///
/// Step-level failures are captured into `StepResult` entries by the
/// dispatcher and never propagate past it; validation errors surface to the
/// caller before a workflow instance is created.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    #[error("parameter resolution failed: {0}")]
    ParameterResolution(String),

    #[error("step execution failed: {0}")]
    StepExecution(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("workflow cancelled: {0}")]
    Cancelled(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("playbook not found: {0}")]
    PlaybookNotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
