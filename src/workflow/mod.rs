//! Workflow runtime: context, instances, dispatch, execution, and the
//! in-process registry

pub mod context;
pub mod dispatcher;
pub mod executor;
pub mod instance;
pub mod registry;

pub use context::WorkflowContext;
pub use dispatcher::{StepDispatcher, DEFAULT_PARALLEL_CEILING};
pub use executor::{ExecutionMode, ExecutionOptions, WorkflowExecutor, WorkflowResult};
pub use instance::{StepResult, StepStatus, WorkflowInstance, WorkflowMetrics, WorkflowStatus};
pub use registry::{WorkflowHandle, WorkflowRegistry, DEFAULT_HISTORY_RETENTION};
