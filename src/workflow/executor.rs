//! Workflow execution: validate, resolve parameters, then walk the step list
//!
//! The executor owns the lifecycle of one instance at a time. Steps run
//! strictly in declared order; the cooperative stop flag is observed between
//! steps, never mid-step.

use super::context::WorkflowContext;
use super::dispatcher::StepDispatcher;
use super::instance::{StepResult, StepStatus, WorkflowInstance, WorkflowMetrics, WorkflowStatus};
use super::registry::WorkflowRegistry;
use crate::error::{EngineError, Result};
use crate::handler::HandlerRegistry;
use crate::playbook::{PlaybookDefinition, PlaybookValidator};
use crate::retry::RetryCoordinator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// How strictly the pre-execution validation gate is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Warnings are logged and execution proceeds
    #[default]
    Standard,
    /// Warnings block execution like errors
    Strict,
}

/// Caller-supplied inputs for one workflow execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    pub parameters: HashMap<String, Value>,
    pub mode: ExecutionMode,
    /// Environment tag exposed as `$env.context`
    pub environment: String,
    /// Resolve conditions and placeholders but invoke no collaborators
    pub dry_run: bool,
    /// Keep dispatching after a failed step instead of finalizing Failed
    pub continue_on_error: bool,
    /// Caller-chosen instance id, generated when absent
    pub workflow_id: Option<Uuid>,
}

/// Summary handed back to the caller once the instance is terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub playbook: String,
    pub status: WorkflowStatus,
    pub step_results: Vec<StepResult>,
    pub metrics: WorkflowMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    pub fn success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    fn from_instance(instance: WorkflowInstance, error: Option<String>) -> Self {
        Self {
            workflow_id: instance.id,
            playbook: instance.playbook,
            status: instance.status,
            step_results: instance.step_results,
            metrics: instance.metrics,
            started_at: instance.started_at,
            finished_at: instance.finished_at,
            error,
        }
    }
}

/// Drives playbook definitions to a terminal workflow status
pub struct WorkflowExecutor {
    registry: Arc<WorkflowRegistry>,
    handlers: Arc<HandlerRegistry>,
    retry: RetryCoordinator,
    parallel_ceiling: usize,
}

impl WorkflowExecutor {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        handlers: Arc<HandlerRegistry>,
        retry: RetryCoordinator,
        parallel_ceiling: usize,
    ) -> Self {
        Self {
            registry,
            handlers,
            retry,
            parallel_ceiling,
        }
    }

    /// Validate, resolve parameters, register an instance, and run it to a
    /// terminal status. Validation and parameter errors surface before any
    /// instance exists.
    pub async fn execute(
        &self,
        definition: &PlaybookDefinition,
        options: ExecutionOptions,
    ) -> Result<WorkflowResult> {
        let report = PlaybookValidator::new().validate(definition);
        if !report.is_valid() {
            return Err(EngineError::Validation(report.errors.join("; ")));
        }
        if !report.warnings.is_empty() {
            if options.mode == ExecutionMode::Strict {
                return Err(EngineError::Validation(format!(
                    "strict mode: {}",
                    report.warnings.join("; ")
                )));
            }
            for warning in &report.warnings {
                warn!(playbook = %definition.name, warning, "validation warning");
            }
        }

        if !options.dry_run {
            for module in &definition.required_modules {
                if self.handlers.module(module).is_none() {
                    return Err(EngineError::Validation(format!(
                        "required module '{module}' is not installed"
                    )));
                }
            }
        }

        let parameters = resolve_parameters(definition, &options.parameters)?;
        let context = WorkflowContext::new(parameters, options.environment.clone());

        let id = options.workflow_id.unwrap_or_else(Uuid::new_v4);
        let instance = WorkflowInstance::new(
            id,
            &definition.name,
            &definition.version,
            context.clone(),
            options.dry_run,
        );
        let handle = self.registry.register(instance)?;

        info!(
            workflow_id = %id,
            playbook = %definition.name,
            steps = definition.steps.len(),
            dry_run = options.dry_run,
            "workflow started"
        );

        let dispatcher = StepDispatcher::new(
            Arc::clone(&self.handlers),
            self.retry.clone(),
            self.parallel_ceiling,
            options.dry_run,
            options.continue_on_error,
        );

        let mut final_status = WorkflowStatus::Completed;
        let mut error = None;

        for step in &definition.steps {
            if handle.stop_requested() {
                final_status = WorkflowStatus::Stopped;
                error = Some(
                    EngineError::Cancelled("stop requested at step boundary".to_string())
                        .to_string(),
                );
                break;
            }

            let results = dispatcher.dispatch(step, &context).await;
            let first_failure = results
                .iter()
                .find(|r| r.status == StepStatus::Failed)
                .and_then(|r| r.error.clone());
            handle.update(|instance| instance.record(results));

            if let Some(failure) = first_failure {
                if !options.continue_on_error {
                    final_status = WorkflowStatus::Failed;
                    error = Some(failure);
                    break;
                }
                error.get_or_insert(failure);
            }
        }

        handle.update(|instance| instance.finalize(final_status));
        self.registry.finalize(id);

        let snapshot = self
            .registry
            .get(id)
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))?;
        info!(
            workflow_id = %id,
            status = %snapshot.status,
            completed = snapshot.metrics.steps_completed,
            failed = snapshot.metrics.steps_failed,
            retries = snapshot.metrics.retries_performed,
            "workflow finished"
        );

        Ok(WorkflowResult::from_instance(snapshot, error))
    }
}

/// Merge caller-supplied parameters over declared defaults, enforcing
/// required parameters
fn resolve_parameters(
    definition: &PlaybookDefinition,
    supplied: &HashMap<String, Value>,
) -> Result<HashMap<String, Value>> {
    let mut resolved = HashMap::new();

    for (name, spec) in &definition.parameters {
        match supplied.get(name) {
            Some(value) => {
                resolved.insert(name.clone(), value.clone());
            }
            None => match &spec.default {
                Some(default) => {
                    resolved.insert(name.clone(), default.clone());
                }
                None if spec.required => {
                    return Err(EngineError::Validation(format!(
                        "required parameter '{name}' was not supplied"
                    )));
                }
                None => {}
            },
        }
    }

    // Extra caller-supplied parameters pass through untouched
    for (name, value) in supplied {
        resolved.entry(name.clone()).or_insert_with(|| value.clone());
    }

    Ok(resolved)
}
