//! Sandboxed condition evaluation for step guards
//!
//! Conditions are a restricted expression language, not host-language code:
//! the evaluator walks a small AST and can only read the workflow context.
//! Unknown variables and malformed expressions are reported as
//! `EngineError::ConditionEvaluation`; the calling step is marked Failed
//! rather than silently treated as false.

use crate::error::{EngineError, Result};
use crate::workflow::context::WorkflowContext;

mod parser;
mod value;

pub use parser::{collect_variables, parse_expression, ComparisonOp, Expression, LogicalOp};
pub use value::Value;

/// Evaluates step guard conditions against a read-only workflow context
#[derive(Debug, Default, Clone)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Parse and evaluate a condition string to a boolean
    pub fn evaluate(&self, condition: &str, context: &WorkflowContext) -> Result<bool> {
        let expr = parse_expression(condition)?;
        let value = self.eval_node(&expr, context)?;
        Ok(value.is_truthy())
    }

    fn eval_node(&self, expr: &Expression, context: &WorkflowContext) -> Result<Value> {
        match expr {
            Expression::Variable(path) => resolve_variable(path, context),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Comparison { left, op, right } => {
                let left = self.eval_node(left, context)?;
                let right = self.eval_node(right, context)?;
                compare(&left, op, &right)
            }
            Expression::Logical { left, op, right } => match op {
                LogicalOp::And => {
                    if !self.eval_node(left, context)?.is_truthy() {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval_node(right, context)?.is_truthy()))
                }
                LogicalOp::Or => {
                    if self.eval_node(left, context)?.is_truthy() {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval_node(right, context)?.is_truthy()))
                }
            },
            Expression::Not(inner) => {
                let value = self.eval_node(inner, context)?;
                Ok(Value::Bool(!value.is_truthy()))
            }
        }
    }
}

/// Resolve `params.<name>` and `env.context` references.
/// Anything else, including a missing parameter, is an evaluation error.
fn resolve_variable(path: &str, context: &WorkflowContext) -> Result<Value> {
    if path == "env.context" {
        return Ok(Value::String(context.environment().to_string()));
    }
    if let Some(name) = path.strip_prefix("params.") {
        return context
            .parameter(name)
            .map(Value::from_json)
            .ok_or_else(|| {
                EngineError::ConditionEvaluation(format!("unknown parameter '{name}'"))
            });
    }
    Err(EngineError::ConditionEvaluation(format!(
        "unknown variable '${path}' (expected $params.<name> or $env.context)"
    )))
}

fn compare(left: &Value, op: &ComparisonOp, right: &Value) -> Result<Value> {
    let result = match op {
        ComparisonOp::Equal => loose_eq(left, right),
        ComparisonOp::NotEqual => !loose_eq(left, right),
        ComparisonOp::GreaterThan => ordered(left, right, op)? == std::cmp::Ordering::Greater,
        ComparisonOp::LessThan => ordered(left, right, op)? == std::cmp::Ordering::Less,
        ComparisonOp::GreaterThanOrEqual => ordered(left, right, op)? != std::cmp::Ordering::Less,
        ComparisonOp::LessThanOrEqual => ordered(left, right, op)? != std::cmp::Ordering::Greater,
    };
    Ok(Value::Bool(result))
}

/// Equality with numeric string coercion, so `$params.count == 3` holds when
/// the caller passed the parameter as "3".
fn loose_eq(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            s.parse::<f64>().map(|parsed| parsed == *n).unwrap_or(false)
        }
        _ => false,
    }
}

fn ordered(left: &Value, right: &Value, op: &ComparisonOp) -> Result<std::cmp::Ordering> {
    if let (Some(l), Some(r)) = (left.as_number(), right.as_number()) {
        return l.partial_cmp(&r).ok_or_else(|| {
            EngineError::ConditionEvaluation("NaN is not comparable".to_string())
        });
    }
    if let (Value::String(l), Value::String(r)) = (left, right) {
        return Ok(l.cmp(r));
    }
    Err(EngineError::ConditionEvaluation(format!(
        "cannot compare {} and {} with {:?}",
        left.type_name(),
        right.type_name(),
        op
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn context(params: &[(&str, serde_json::Value)], env: &str) -> WorkflowContext {
        let map: HashMap<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        WorkflowContext::new(map, env)
    }

    #[test]
    fn string_equality_against_env_tag() {
        let ctx = context(&[], "prod");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$env.context == 'prod'", &ctx).unwrap());
        assert!(!eval.evaluate("$env.context == 'dev'", &ctx).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let ctx = context(&[("replicas", json!(5))], "dev");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$params.replicas >= 3", &ctx).unwrap());
        assert!(!eval.evaluate("$params.replicas < 5", &ctx).unwrap());
    }

    #[test]
    fn numeric_string_coercion() {
        let ctx = context(&[("count", json!("3"))], "dev");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$params.count == 3", &ctx).unwrap());
        assert!(eval.evaluate("$params.count > 2", &ctx).unwrap());
    }

    #[test]
    fn logical_combinators_short_circuit() {
        let ctx = context(&[("a", json!(true)), ("b", json!(false))], "dev");
        let eval = ConditionEvaluator::new();
        assert!(!eval.evaluate("$params.a and $params.b", &ctx).unwrap());
        assert!(eval.evaluate("$params.a or $params.b", &ctx).unwrap());
        assert!(eval.evaluate("not $params.b", &ctx).unwrap());
        // Right side of a short-circuited `or` is never resolved
        assert!(eval
            .evaluate("$params.a or $params.missing == 1", &ctx)
            .unwrap());
    }

    #[test]
    fn unknown_parameter_is_an_error_not_false() {
        let ctx = context(&[], "dev");
        let eval = ConditionEvaluator::new();
        let err = eval.evaluate("$params.missing == 'x'", &ctx).unwrap_err();
        assert!(matches!(err, EngineError::ConditionEvaluation(_)));
    }

    #[test]
    fn unknown_namespace_is_an_error() {
        let ctx = context(&[], "dev");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$secrets.token == 'x'", &ctx).is_err());
    }

    #[test]
    fn malformed_expression_is_an_error() {
        let ctx = context(&[], "dev");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$params.a ==", &ctx).is_err());
    }

    #[test]
    fn incomparable_types_error() {
        let ctx = context(&[("flag", json!(true))], "dev");
        let eval = ConditionEvaluator::new();
        assert!(eval.evaluate("$params.flag > 'abc'", &ctx).is_err());
    }
}
