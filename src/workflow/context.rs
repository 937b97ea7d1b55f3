//! Read-only runtime context shared by every step of a workflow instance
//!
//! The context is frozen at instance creation. Parallel workers receive
//! shared references to it, which keeps fan-out free of data races.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Resolved parameters plus the environment tag for one workflow instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowContext {
    parameters: HashMap<String, Value>,
    environment: String,
}

impl WorkflowContext {
    pub fn new(parameters: HashMap<String, Value>, environment: impl Into<String>) -> Self {
        Self {
            parameters,
            environment: environment.into(),
        }
    }

    /// Look up a declared parameter by name
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &HashMap<String, Value> {
        &self.parameters
    }

    /// The environment tag, addressable as `$env.context` in conditions and
    /// `{{env.context}}` in command templates
    pub fn environment(&self) -> &str {
        &self.environment
    }
}
