//! Declarative playbook orchestration engine
//!
//! A playbook is a named, versioned JSON document describing an ordered list
//! of steps: shell scripts, condition branches, parallel fan-outs, and calls
//! into external capability modules. The engine validates a playbook,
//! resolves `{{name}}` parameter placeholders, evaluates sandboxed step
//! guards, and drives each workflow instance to a terminal status with
//! bounded retries for transient collaborator failures.
//!
//! All state hangs off an explicit [`orchestrator::Orchestrator`]; embedders
//! supply their own [`handler::HandlerRegistry`] and storage root.
//!
//! ```no_run
//! use runbook::handler::HandlerRegistry;
//! use runbook::orchestrator::{EngineConfig, Orchestrator, PlaybookSource};
//! use runbook::playbook::PlaybookDefinition;
//! use runbook::storage::PlaybookStore;
//! use runbook::workflow::ExecutionOptions;
//!
//! # async fn run() -> runbook::error::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     PlaybookStore::new(".runbook"),
//!     HandlerRegistry::production(),
//!     EngineConfig::default(),
//! );
//!
//! let definition = PlaybookDefinition::from_json(
//!     r#"{"name": "hello", "steps": [
//!         {"type": "script", "name": "greet", "command": "echo hello"}
//!     ]}"#,
//! ).expect("valid json");
//!
//! let result = orchestrator
//!     .run_playbook(PlaybookSource::Inline(definition), ExecutionOptions::default())
//!     .await?;
//! assert!(result.success());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod expression;
pub mod handler;
pub mod orchestrator;
pub mod playbook;
pub mod retry;
pub mod storage;
pub mod substitution;
pub mod workflow;

pub use error::{EngineError, Result};
pub use orchestrator::{EngineConfig, Orchestrator, PlaybookSource, StatusReport};
pub use playbook::{PlaybookDefinition, PlaybookValidator, Step, ValidationReport};
pub use workflow::{
    ExecutionMode, ExecutionOptions, StepResult, StepStatus, WorkflowResult, WorkflowStatus,
};
