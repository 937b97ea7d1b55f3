//! Playbook definitions: the declarative step graph plus parameter schema
//!
//! The JSON wire format uses a `type` discriminator on each step
//! (`script | condition | parallel | module`). Definitions are immutable
//! once loaded; each workflow instance works from its own copy.

pub mod validator;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub use validator::{PlaybookValidator, ValidationReport};

/// A named, versioned, declarative definition of an ordered step graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybookDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    /// Parameter schema: name -> {type, required, default}
    #[serde(default)]
    pub parameters: HashMap<String, ParameterSpec>,

    pub steps: Vec<Step>,

    /// External capability modules the playbook expects to be installed
    #[serde(default, rename = "requiredModules")]
    pub required_modules: Vec<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl PlaybookDefinition {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Declared parameter: type, whether the caller must supply it, and an
/// optional default applied otherwise
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ParameterSpec {
    #[serde(default, rename = "type")]
    pub param_type: ParameterType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Bool,
    Json,
}

/// One unit of work in a playbook
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Step {
    /// Run a command through the shell collaborator
    Script {
        name: String,
        command: String,
        #[serde(default = "default_shell")]
        shell: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
    /// Branch on a condition; exactly one branch is dispatched
    Condition {
        name: String,
        condition: String,
        #[serde(default, rename = "then")]
        then_steps: Vec<Step>,
        #[serde(default, rename = "else")]
        else_steps: Vec<Step>,
    },
    /// Fan sub-steps out onto a bounded worker pool and join
    Parallel {
        name: String,
        parallel: Vec<Step>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_concurrency: Option<usize>,
    },
    /// Invoke an operation on a named collaborator module
    Module {
        name: String,
        module: String,
        function: String,
        #[serde(default)]
        parameters: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<String>,
    },
}

fn default_shell() -> String {
    "sh".to_string()
}

impl Step {
    pub fn name(&self) -> &str {
        match self {
            Step::Script { name, .. }
            | Step::Condition { name, .. }
            | Step::Parallel { name, .. }
            | Step::Module { name, .. } => name,
        }
    }

    /// Child step lists, used for recursive validation
    pub fn children(&self) -> Vec<&[Step]> {
        match self {
            Step::Script { .. } | Step::Module { .. } => Vec::new(),
            Step::Condition {
                then_steps,
                else_steps,
                ..
            } => vec![then_steps.as_slice(), else_steps.as_slice()],
            Step::Parallel { parallel, .. } => vec![parallel.as_slice()],
        }
    }
}
