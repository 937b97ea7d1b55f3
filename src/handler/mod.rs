//! Collaborator boundary for step execution
//!
//! The engine never runs shell commands or module operations itself; it calls
//! a [`StepHandler`] through this narrow contract. Production code installs
//! the shell handler and whatever module handlers the deployment provides;
//! tests install mocks.

pub mod mock;
pub mod shell;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

pub use mock::MockStepHandler;
pub use shell::ShellHandler;

/// Structured failure category supplied by a collaborator.
///
/// The retry classifier prefers this over substring matching on the error
/// text, which stays available as a fallback for collaborators that cannot
/// categorize their failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Timeout,
    RateLimit,
    Resource,
    Configuration,
    Fatal,
}

impl ErrorCategory {
    /// Categories considered transient when no explicit matcher list is given
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCategory::Network | ErrorCategory::Timeout | ErrorCategory::RateLimit
        )
    }
}

/// A resolved unit of work handed to a collaborator
#[derive(Debug, Clone)]
pub struct HandlerInvocation {
    /// Resolved command line (script steps) or operation name (module steps)
    pub operation: String,
    /// Resolved key/value parameters for module operations
    pub parameters: HashMap<String, String>,
    /// Shell program for script steps (`sh`, `bash`, or `none` for direct exec)
    pub shell: Option<String>,
}

impl HandlerInvocation {
    pub fn script(command: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            operation: command.into(),
            parameters: HashMap::new(),
            shell: Some(shell.into()),
        }
    }

    pub fn module_call(
        operation: impl Into<String>,
        parameters: HashMap<String, String>,
    ) -> Self {
        Self {
            operation: operation.into(),
            parameters,
            shell: None,
        }
    }
}

/// What a collaborator reports back for one invocation
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub category: Option<ErrorCategory>,
}

impl HandlerOutcome {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            exit_code: Some(0),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, category: Option<ErrorCategory>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            category,
            ..Default::default()
        }
    }
}

/// External capability invoked by the step dispatcher
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// Whether transient failures from this handler may be retried.
    /// Network-sensitive collaborators opt in.
    fn retriable(&self) -> bool {
        false
    }

    async fn execute(&self, invocation: HandlerInvocation) -> HandlerOutcome;
}

/// Registry of installed collaborators: one shell handler plus named module
/// handlers for `module` steps
#[derive(Clone)]
pub struct HandlerRegistry {
    shell: Arc<dyn StepHandler>,
    modules: HashMap<String, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new(shell: Arc<dyn StepHandler>) -> Self {
        Self {
            shell,
            modules: HashMap::new(),
        }
    }

    /// Registry backed by the production shell handler
    pub fn production() -> Self {
        Self::new(Arc::new(ShellHandler::default()))
    }

    pub fn register_module(&mut self, name: impl Into<String>, handler: Arc<dyn StepHandler>) {
        self.modules.insert(name.into(), handler);
    }

    pub fn shell(&self) -> Arc<dyn StepHandler> {
        Arc::clone(&self.shell)
    }

    pub fn module(&self, name: &str) -> Option<Arc<dyn StepHandler>> {
        self.modules.get(name).map(Arc::clone)
    }

    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_categories() {
        assert!(ErrorCategory::Network.is_transient());
        assert!(ErrorCategory::Timeout.is_transient());
        assert!(ErrorCategory::RateLimit.is_transient());
        assert!(!ErrorCategory::Configuration.is_transient());
        assert!(!ErrorCategory::Fatal.is_transient());
    }

    #[test]
    fn registry_resolves_modules() {
        let mut registry = HandlerRegistry::new(Arc::new(MockStepHandler::new()));
        registry.register_module("backup", Arc::new(MockStepHandler::new()));

        assert!(registry.module("backup").is_some());
        assert!(registry.module("licensing").is_none());
        assert_eq!(registry.module_names(), vec!["backup".to_string()]);
    }
}
