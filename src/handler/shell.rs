//! Production shell collaborator backed by tokio::process

use super::{ErrorCategory, HandlerInvocation, HandlerOutcome, StepHandler};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs script steps through a shell (or directly when `shell` is `none`).
///
/// A timeout, when configured, marks the outcome failed with the Timeout
/// category; the engine does not attempt to cancel work the process may
/// leave behind.
pub struct ShellHandler {
    timeout: Option<Duration>,
    retriable: bool,
}

impl Default for ShellHandler {
    fn default() -> Self {
        Self {
            timeout: None,
            retriable: false,
        }
    }
}

impl ShellHandler {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            timeout,
            retriable: false,
        }
    }

    /// Mark this handler network-sensitive so script failures are retried
    pub fn with_retries(mut self) -> Self {
        self.retriable = true;
        self
    }

    fn build_command(invocation: &HandlerInvocation) -> Result<tokio::process::Command, String> {
        let shell = invocation.shell.as_deref().unwrap_or("sh");
        if shell == "none" {
            let words = shell_words::split(&invocation.operation)
                .map_err(|e| format!("cannot split command: {e}"))?;
            let (program, args) = words
                .split_first()
                .ok_or_else(|| "empty command".to_string())?;
            let mut cmd = tokio::process::Command::new(program);
            cmd.args(args);
            Ok(cmd)
        } else {
            let mut cmd = tokio::process::Command::new(shell);
            cmd.arg("-c").arg(&invocation.operation);
            Ok(cmd)
        }
    }
}

#[async_trait]
impl StepHandler for ShellHandler {
    fn retriable(&self) -> bool {
        self.retriable
    }

    async fn execute(&self, invocation: HandlerInvocation) -> HandlerOutcome {
        debug!(command = %invocation.operation, "executing script step");
        let start = Instant::now();

        let mut cmd = match Self::build_command(&invocation) {
            Ok(cmd) => cmd,
            Err(message) => {
                return HandlerOutcome::failed(message, Some(ErrorCategory::Configuration))
            }
        };
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(command = %invocation.operation, ?limit, "script step timed out");
                    return HandlerOutcome::failed(
                        crate::error::EngineError::Timeout(limit).to_string(),
                        Some(ErrorCategory::Timeout),
                    );
                }
            },
            None => cmd.output().await,
        };

        let output = match waited {
            Ok(output) => output,
            Err(e) => {
                let category = if e.kind() == std::io::ErrorKind::NotFound {
                    ErrorCategory::Configuration
                } else {
                    ErrorCategory::Resource
                };
                return HandlerOutcome::failed(format!("failed to spawn: {e}"), Some(category));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        let exit_code = output.status.code();

        debug!(
            command = %invocation.operation,
            code = ?exit_code,
            elapsed = ?start.elapsed(),
            "script step finished"
        );

        if output.status.success() {
            HandlerOutcome {
                success: true,
                output: stdout,
                error: None,
                exit_code,
                category: None,
            }
        } else {
            HandlerOutcome {
                success: false,
                output: stdout,
                error: Some(if stderr.is_empty() {
                    format!("exit code {}", exit_code.unwrap_or(-1))
                } else {
                    stderr
                }),
                exit_code,
                category: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_command_through_sh() {
        let handler = ShellHandler::default();
        let outcome = handler
            .execute(HandlerInvocation::script("echo hello", "sh"))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hello");
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[tokio::test]
    async fn reports_nonzero_exit_as_failure() {
        let handler = ShellHandler::default();
        let outcome = handler
            .execute(HandlerInvocation::script("exit 3", "sh"))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn captures_stderr_as_error() {
        let handler = ShellHandler::default();
        let outcome = handler
            .execute(HandlerInvocation::script("echo oops >&2; exit 1", "sh"))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("oops"));
    }

    #[tokio::test]
    async fn direct_exec_without_shell() {
        let handler = ShellHandler::default();
        let outcome = handler
            .execute(HandlerInvocation::script("echo direct", "none"))
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "direct");
    }

    #[tokio::test]
    async fn timeout_is_categorized() {
        let handler = ShellHandler::new(Some(Duration::from_millis(50)));
        let outcome = handler
            .execute(HandlerInvocation::script("sleep 5", "sh"))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.category, Some(ErrorCategory::Timeout));
    }

    #[tokio::test]
    async fn missing_program_is_configuration_error() {
        let handler = ShellHandler::default();
        let outcome = handler
            .execute(HandlerInvocation::script("definitely_not_a_program_xyz", "none"))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.category, Some(ErrorCategory::Configuration));
    }
}
