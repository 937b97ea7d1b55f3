//! The engine's public surface: run, inspect, stop, and validate playbooks
//!
//! All state hangs off an explicit [`Orchestrator`] value. Embedders build
//! one with their own handler registry and storage root; nothing is global.

use crate::error::{EngineError, Result};
use crate::handler::HandlerRegistry;
use crate::playbook::{PlaybookDefinition, PlaybookValidator, ValidationReport};
use crate::retry::{RetryCoordinator, RetryPolicy};
use crate::storage::PlaybookStore;
use crate::workflow::{
    ExecutionOptions, WorkflowExecutor, WorkflowInstance, WorkflowRegistry, WorkflowResult,
    DEFAULT_HISTORY_RETENTION, DEFAULT_PARALLEL_CEILING,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Engine-wide tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Ceiling on concurrent sub-steps within one parallel step
    pub max_parallel_steps: usize,
    /// Retry policy applied to retriable collaborators
    pub retry: RetryPolicy,
    /// Terminal instances kept in the in-memory history ring
    pub history_retention: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_steps: DEFAULT_PARALLEL_CEILING,
            retry: RetryPolicy::default(),
            history_retention: DEFAULT_HISTORY_RETENTION,
        }
    }
}

/// Where a playbook definition comes from
pub enum PlaybookSource {
    /// Load by name from the store
    Stored(String),
    /// Caller-supplied definition, bypassing storage
    Inline(PlaybookDefinition),
}

/// Everything known about one workflow when its status is requested
#[derive(Debug, Clone)]
pub enum StatusReport {
    /// A single instance, live or from history
    Instance(Box<WorkflowInstance>),
    /// The overview when no id is given
    Summary {
        active: Vec<WorkflowInstance>,
        recent: Vec<WorkflowInstance>,
    },
}

pub struct Orchestrator {
    registry: Arc<WorkflowRegistry>,
    handlers: Arc<HandlerRegistry>,
    store: PlaybookStore,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(store: PlaybookStore, handlers: HandlerRegistry, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(WorkflowRegistry::new(config.history_retention)),
            handlers: Arc::new(handlers),
            store,
            config,
        }
    }

    pub fn registry(&self) -> Arc<WorkflowRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn store(&self) -> &PlaybookStore {
        &self.store
    }

    /// Run a playbook to a terminal status and persist the outcome.
    /// Dry runs leave no trace on disk.
    pub async fn run_playbook(
        &self,
        source: PlaybookSource,
        options: ExecutionOptions,
    ) -> Result<WorkflowResult> {
        let definition = match source {
            PlaybookSource::Stored(name) => self.store.load_playbook(&name)?,
            PlaybookSource::Inline(definition) => definition,
        };

        let executor = WorkflowExecutor::new(
            self.registry(),
            Arc::clone(&self.handlers),
            RetryCoordinator::new(self.config.retry.clone()),
            self.config.max_parallel_steps,
        );
        let dry_run = options.dry_run;
        let result = executor.execute(&definition, options).await?;

        if !dry_run {
            if let Some(instance) = self.registry.get(result.workflow_id) {
                self.store.save_instance(&instance)?;
            }
        }
        Ok(result)
    }

    /// Status of one workflow, or an overview of active plus recent ones.
    /// Falls back to on-disk history for ids this process no longer holds.
    pub fn workflow_status(&self, id: Option<Uuid>) -> Result<StatusReport> {
        match id {
            Some(id) => {
                if let Some(instance) = self.registry.get(id) {
                    return Ok(StatusReport::Instance(Box::new(instance)));
                }
                debug!(workflow_id = %id, "not in memory, consulting on-disk history");
                let instance = self.store.load_instance(id)?;
                Ok(StatusReport::Instance(Box::new(instance)))
            }
            None => Ok(StatusReport::Summary {
                active: self.registry.list_active(),
                recent: self.registry.history(),
            }),
        }
    }

    /// Request a cooperative stop. Only workflows running in this process
    /// can be stopped.
    pub fn stop_workflow(&self, id: Uuid) -> Result<()> {
        self.registry.stop(id)
    }

    /// Structural validation without executing anything
    pub fn validate_playbook(&self, definition: &PlaybookDefinition) -> ValidationReport {
        PlaybookValidator::new().validate(definition)
    }

    /// Validate and store a playbook definition for later `Stored` runs
    pub fn save_playbook(&self, definition: &PlaybookDefinition) -> Result<ValidationReport> {
        let report = self.validate_playbook(definition);
        if !report.is_valid() {
            return Err(EngineError::Validation(report.errors.join("; ")));
        }
        self.store.save_playbook(definition)?;
        Ok(report)
    }

    pub fn list_playbooks(&self) -> Result<Vec<String>> {
        self.store.list_playbooks()
    }
}
