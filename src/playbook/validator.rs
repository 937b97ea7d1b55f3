//! Structural validation of playbook definitions
//!
//! Errors block execution and surface before any workflow instance exists;
//! warnings are advisory. Validation never mutates the definition.

use super::{PlaybookDefinition, Step};
use crate::expression::{collect_variables, parse_expression};
use crate::substitution;
use std::collections::HashSet;

/// Maximum nesting depth for condition/parallel step graphs
pub const MAX_STEP_DEPTH: usize = 8;

/// Outcome of validating a playbook definition
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates the structure of a playbook prior to execution
#[derive(Debug, Clone)]
pub struct PlaybookValidator {
    max_depth: usize,
}

impl Default for PlaybookValidator {
    fn default() -> Self {
        Self {
            max_depth: MAX_STEP_DEPTH,
        }
    }
}

impl PlaybookValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self, definition: &PlaybookDefinition) -> ValidationReport {
        let mut report = ValidationReport::default();
        let mut used_parameters = HashSet::new();

        if definition.name.trim().is_empty() {
            report.errors.push("playbook name must not be empty".to_string());
        }
        if definition.steps.is_empty() {
            report
                .errors
                .push("playbook must declare at least one step in 'steps'".to_string());
        }

        self.check_steps(
            &definition.steps,
            definition,
            1,
            &mut report,
            &mut used_parameters,
        );

        for name in definition.parameters.keys() {
            if !used_parameters.contains(name) {
                report
                    .warnings
                    .push(format!("parameter '{name}' is declared but never used"));
            }
        }

        report
    }

    fn check_steps(
        &self,
        steps: &[Step],
        definition: &PlaybookDefinition,
        depth: usize,
        report: &mut ValidationReport,
        used: &mut HashSet<String>,
    ) {
        if depth > self.max_depth {
            report.errors.push(format!(
                "step nesting exceeds the maximum depth of {}",
                self.max_depth
            ));
            return;
        }

        let mut sibling_names = HashSet::new();
        for step in steps {
            let name = step.name();
            if name.trim().is_empty() {
                report.errors.push("step name must not be empty".to_string());
            } else if !sibling_names.insert(name.to_string()) {
                report.errors.push(format!(
                    "step name '{name}' is duplicated among its siblings"
                ));
            }

            self.check_step(step, definition, report, used);

            for children in step.children() {
                self.check_steps(children, definition, depth + 1, report, used);
            }
        }
    }

    fn check_step(
        &self,
        step: &Step,
        definition: &PlaybookDefinition,
        report: &mut ValidationReport,
        used: &mut HashSet<String>,
    ) {
        match step {
            Step::Script {
                name,
                command,
                condition,
                ..
            } => {
                if command.trim().is_empty() {
                    report
                        .errors
                        .push(format!("script step '{name}' has an empty command"));
                }
                self.check_template(name, command, definition, report, used);
                if let Some(condition) = condition {
                    self.check_condition(name, condition, definition, report, used);
                }
            }
            Step::Condition {
                name,
                condition,
                then_steps,
                else_steps,
            } => {
                if condition.trim().is_empty() {
                    report
                        .errors
                        .push(format!("condition step '{name}' has an empty condition"));
                } else {
                    self.check_condition(name, condition, definition, report, used);
                }
                if then_steps.is_empty() && else_steps.is_empty() {
                    report.errors.push(format!(
                        "condition step '{name}' must have at least one of 'then'/'else'"
                    ));
                }
            }
            Step::Parallel { name, parallel, .. } => {
                if parallel.is_empty() {
                    report.errors.push(format!(
                        "parallel step '{name}' must have at least one sub-step"
                    ));
                }
            }
            Step::Module {
                name,
                module,
                function,
                parameters,
                condition,
            } => {
                if module.trim().is_empty() {
                    report
                        .errors
                        .push(format!("module step '{name}' has an empty module name"));
                }
                if function.trim().is_empty() {
                    report
                        .errors
                        .push(format!("module step '{name}' has an empty function name"));
                }
                for value in parameters.values() {
                    self.check_template(name, value, definition, report, used);
                }
                if let Some(condition) = condition {
                    self.check_condition(name, condition, definition, report, used);
                }
            }
        }
    }

    /// `{{name}}` references must name a declared parameter or `env.*`
    fn check_template(
        &self,
        step_name: &str,
        template: &str,
        definition: &PlaybookDefinition,
        report: &mut ValidationReport,
        used: &mut HashSet<String>,
    ) {
        for reference in substitution::referenced_names(template) {
            if reference.starts_with("env.") {
                continue;
            }
            if definition.parameters.contains_key(&reference) {
                used.insert(reference);
            } else {
                report.errors.push(format!(
                    "step '{step_name}' references undeclared parameter '{{{{{reference}}}}}'"
                ));
            }
        }
    }

    /// Conditions must parse, and `$params.*` references must be declared
    fn check_condition(
        &self,
        step_name: &str,
        condition: &str,
        definition: &PlaybookDefinition,
        report: &mut ValidationReport,
        used: &mut HashSet<String>,
    ) {
        let expr = match parse_expression(condition) {
            Ok(expr) => expr,
            Err(e) => {
                report
                    .errors
                    .push(format!("step '{step_name}' has an invalid condition: {e}"));
                return;
            }
        };

        let mut references = Vec::new();
        collect_variables(&expr, &mut references);
        for path in references {
            if let Some(param) = path.strip_prefix("params.") {
                if definition.parameters.contains_key(param) {
                    used.insert(param.to_string());
                } else {
                    report.errors.push(format!(
                        "step '{step_name}' condition references undeclared parameter '{param}'"
                    ));
                }
            } else if path != "env.context" {
                report.errors.push(format!(
                    "step '{step_name}' condition references unknown variable '${path}'"
                ));
            }
        }
    }
}
