//! Step dispatch: routes each step kind to its execution strategy
//!
//! The dispatcher owns no workflow state. It takes one step plus the
//! execution context and returns the step results it produced, leaving
//! sequencing, cancellation, and bookkeeping to the executor.

use super::context::WorkflowContext;
use super::instance::{StepResult, StepStatus};
use crate::expression::ConditionEvaluator;
use crate::handler::{HandlerInvocation, HandlerOutcome, HandlerRegistry, StepHandler};
use crate::playbook::Step;
use crate::retry::{RetryCoordinator, StepFailure};
use crate::substitution;
use chrono::Utc;
use futures::future::{join_all, BoxFuture};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Ceiling on parallel sub-step concurrency when the step does not set its own
pub const DEFAULT_PARALLEL_CEILING: usize = 8;

pub struct StepDispatcher {
    handlers: Arc<HandlerRegistry>,
    evaluator: ConditionEvaluator,
    retry: RetryCoordinator,
    parallel_ceiling: usize,
    dry_run: bool,
    continue_on_error: bool,
}

impl StepDispatcher {
    pub fn new(
        handlers: Arc<HandlerRegistry>,
        retry: RetryCoordinator,
        parallel_ceiling: usize,
        dry_run: bool,
        continue_on_error: bool,
    ) -> Self {
        Self {
            handlers,
            evaluator: ConditionEvaluator::new(),
            retry,
            parallel_ceiling: parallel_ceiling.max(1),
            dry_run,
            continue_on_error,
        }
    }

    /// Dispatch one step, returning every result it produced.
    ///
    /// Script and module steps produce exactly one result. Condition steps
    /// produce the taken branch's results and nothing for the other branch.
    /// Parallel steps produce each sub-step's results followed by one
    /// summary result for the parallel step itself.
    pub fn dispatch<'a>(
        &'a self,
        step: &'a Step,
        context: &'a WorkflowContext,
    ) -> BoxFuture<'a, Vec<StepResult>> {
        Box::pin(async move {
            match step {
                Step::Script {
                    name,
                    command,
                    shell,
                    condition,
                } => self
                    .dispatch_script(name, command, shell, condition.as_deref(), context)
                    .await,
                Step::Condition {
                    name,
                    condition,
                    then_steps,
                    else_steps,
                } => {
                    self.dispatch_condition(name, condition, then_steps, else_steps, context)
                        .await
                }
                Step::Parallel {
                    name,
                    parallel,
                    max_concurrency,
                } => {
                    self.dispatch_parallel(name, parallel, *max_concurrency, context)
                        .await
                }
                Step::Module {
                    name,
                    module,
                    function,
                    parameters,
                    condition,
                } => {
                    self.dispatch_module(
                        name,
                        module,
                        function,
                        parameters,
                        condition.as_deref(),
                        context,
                    )
                    .await
                }
            }
        })
    }

    /// Evaluate an optional guard. A false guard skips the step; an
    /// evaluation error fails it rather than guessing.
    fn check_condition(
        &self,
        name: &str,
        condition: Option<&str>,
        context: &WorkflowContext,
    ) -> Result<(), StepResult> {
        let Some(condition) = condition else {
            return Ok(());
        };
        match self.evaluator.evaluate(condition, context) {
            Ok(true) => Ok(()),
            Ok(false) => {
                debug!(step = name, condition, "condition false, skipping step");
                Err(StepResult::skipped(name, "condition evaluated to false"))
            }
            Err(e) => {
                warn!(step = name, condition, error = %e, "condition evaluation failed");
                Err(StepResult::failed(name, e.to_string(), Utc::now()))
            }
        }
    }

    async fn dispatch_script(
        &self,
        name: &str,
        command: &str,
        shell: &str,
        condition: Option<&str>,
        context: &WorkflowContext,
    ) -> Vec<StepResult> {
        let started = Utc::now();

        if let Err(result) = self.check_condition(name, condition, context) {
            return vec![result];
        }

        let resolved = match substitution::resolve(command, context) {
            Ok(resolved) => resolved,
            Err(e) => return vec![StepResult::failed(name, e.to_string(), started)],
        };

        if self.dry_run {
            return vec![StepResult::simulated(
                name,
                format!("simulated: {resolved}"),
            )];
        }

        let handler = self.handlers.shell();
        let invocation = HandlerInvocation::script(resolved, shell);
        let (outcome, attempts) = self.invoke(handler, invocation, name).await;
        vec![self.outcome_to_result(name, outcome, started, attempts)]
    }

    async fn dispatch_condition(
        &self,
        name: &str,
        condition: &str,
        then_steps: &[Step],
        else_steps: &[Step],
        context: &WorkflowContext,
    ) -> Vec<StepResult> {
        let branch = match self.evaluator.evaluate(condition, context) {
            Ok(true) => then_steps,
            Ok(false) => else_steps,
            Err(e) => {
                warn!(step = name, condition, error = %e, "condition evaluation failed");
                return vec![StepResult::failed(name, e.to_string(), Utc::now())];
            }
        };

        debug!(step = name, substeps = branch.len(), "dispatching branch");
        self.run_sequence(branch, context).await
    }

    /// Sequential dispatch of a step list, stopping at the first failure
    /// unless continue-on-error is set
    async fn run_sequence(&self, steps: &[Step], context: &WorkflowContext) -> Vec<StepResult> {
        let mut results = Vec::new();
        for step in steps {
            let step_results = self.dispatch(step, context).await;
            let failed = step_results
                .iter()
                .any(|r| r.status == StepStatus::Failed);
            results.extend(step_results);
            if failed && !self.continue_on_error {
                break;
            }
        }
        results
    }

    async fn dispatch_parallel(
        &self,
        name: &str,
        substeps: &[Step],
        max_concurrency: Option<usize>,
        context: &WorkflowContext,
    ) -> Vec<StepResult> {
        let started = Utc::now();
        let limit = max_concurrency
            .unwrap_or(substeps.len())
            .clamp(1, self.parallel_ceiling);
        debug!(step = name, substeps = substeps.len(), limit, "parallel fan-out");

        let semaphore = Arc::new(Semaphore::new(limit));
        let futures = substeps.iter().map(|substep| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                self.dispatch(substep, context).await
            }
        });

        // Declared order is preserved in the joined results
        let mut results: Vec<StepResult> = join_all(futures).await.into_iter().flatten().collect();

        let completed = results
            .iter()
            .filter(|r| r.status == StepStatus::Completed)
            .count();
        let failed = results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
            .count();
        let skipped = results.len() - completed - failed;
        let finished = results
            .iter()
            .map(|r| r.finished_at)
            .max()
            .unwrap_or(started);

        let summary = StepResult {
            name: name.to_string(),
            status: if failed > 0 && !self.continue_on_error {
                StepStatus::Failed
            } else {
                StepStatus::Completed
            },
            started_at: started,
            finished_at: finished,
            output: format!(
                "{} sub-steps: {completed} completed, {failed} failed, {skipped} skipped",
                results.len()
            ),
            error: (failed > 0).then(|| format!("{failed} sub-step(s) failed")),
            attempts: 1,
        };
        results.push(summary);
        results
    }

    async fn dispatch_module(
        &self,
        name: &str,
        module: &str,
        function: &str,
        parameters: &HashMap<String, String>,
        condition: Option<&str>,
        context: &WorkflowContext,
    ) -> Vec<StepResult> {
        let started = Utc::now();

        if let Err(result) = self.check_condition(name, condition, context) {
            return vec![result];
        }

        let mut resolved = HashMap::new();
        for (key, template) in parameters {
            match substitution::resolve(template, context) {
                Ok(value) => {
                    resolved.insert(key.clone(), value);
                }
                Err(e) => return vec![StepResult::failed(name, e.to_string(), started)],
            }
        }

        let operation = format!("{module}.{function}");
        if self.dry_run {
            return vec![StepResult::simulated(
                name,
                format!("simulated: {operation}"),
            )];
        }

        let Some(handler) = self.handlers.module(module) else {
            let error =
                crate::error::EngineError::StepExecution(format!("module '{module}' is not installed"));
            return vec![StepResult::failed(name, error.to_string(), started)];
        };

        let invocation = HandlerInvocation::module_call(operation, resolved);
        let (outcome, attempts) = self.invoke(handler, invocation, name).await;
        vec![self.outcome_to_result(name, outcome, started, attempts)]
    }

    /// Invoke a collaborator, retrying transient failures when the handler
    /// opts in
    async fn invoke(
        &self,
        handler: Arc<dyn StepHandler>,
        invocation: HandlerInvocation,
        label: &str,
    ) -> (HandlerOutcome, u32) {
        if !handler.retriable() {
            return (handler.execute(invocation).await, 1);
        }

        let outcome = self
            .retry
            .execute_with_retry(
                || {
                    let handler = Arc::clone(&handler);
                    let invocation = invocation.clone();
                    async move {
                        let outcome = handler.execute(invocation).await;
                        if outcome.success {
                            Ok(outcome)
                        } else {
                            let message = outcome
                                .error
                                .clone()
                                .unwrap_or_else(|| "collaborator reported failure".to_string());
                            Err(StepFailure::new(message, outcome.category))
                        }
                    }
                },
                label,
            )
            .await;

        let attempts = outcome.attempts;
        match outcome.value {
            Some(value) => (value, attempts),
            None => {
                let failure = outcome
                    .last_error
                    .map(|f| HandlerOutcome::failed(f.message, f.category))
                    .unwrap_or_else(|| HandlerOutcome::failed("retries exhausted", None));
                (failure, attempts)
            }
        }
    }

    fn outcome_to_result(
        &self,
        name: &str,
        outcome: HandlerOutcome,
        started: chrono::DateTime<Utc>,
        attempts: u32,
    ) -> StepResult {
        if outcome.success {
            StepResult::completed(name, outcome.output, started).with_attempts(attempts)
        } else {
            let error = outcome
                .error
                .unwrap_or_else(|| "collaborator reported failure".to_string());
            StepResult::failed(name, error, started).with_attempts(attempts)
        }
    }
}
