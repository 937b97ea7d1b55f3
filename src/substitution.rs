//! `{{name}}` placeholder substitution for step commands and module parameters
//!
//! Substitution runs once per step invocation, immediately before dispatch.
//! A placeholder that names no declared parameter (and is not `env.context`)
//! is a terminal `ParameterResolutionError` for that step, never a silent
//! pass-through. One successful pass leaves no `{{ }}` syntax behind, so
//! re-resolving an already-resolved string returns it unchanged.

use crate::error::{EngineError, Result};
use crate::workflow::context::WorkflowContext;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("invalid placeholder regex")
    })
}

/// Replace every `{{name}}` occurrence with the stringified parameter value
pub fn resolve(template: &str, context: &WorkflowContext) -> Result<String> {
    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;

    for captures in placeholder_regex().captures_iter(template) {
        let whole = captures.get(0).expect("regex match without group 0");
        let name = &captures[1];

        result.push_str(&template[last_end..whole.start()]);
        result.push_str(&lookup(name, context)?);
        last_end = whole.end();
    }
    result.push_str(&template[last_end..]);

    Ok(result)
}

/// Names every placeholder referenced by a template, for validation
pub fn referenced_names(template: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(template)
        .map(|captures| captures[1].to_string())
        .collect()
}

fn lookup(name: &str, context: &WorkflowContext) -> Result<String> {
    if name == "env.context" {
        return Ok(context.environment().to_string());
    }
    context
        .parameter(name)
        .map(value_to_string)
        .ok_or_else(|| {
            EngineError::ParameterResolution(format!("unresolved placeholder '{{{{{name}}}}}'"))
        })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
