//! Project test suite check run by the reviewer gate.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ReviewConfig;

/// Result of running the configured test command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteOutcome {
    Passed { output: String },
    Failed { summary: String },
    /// No test command configured
    Skipped,
}

impl SuiteOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, SuiteOutcome::Failed { .. })
    }

    /// Short description handed to the reviewer.
    pub fn describe(&self) -> String {
        match self {
            SuiteOutcome::Passed { .. } => "The configured test command exited with status 0.".to_string(),
            SuiteOutcome::Failed { summary } => format!("FAILED: {}", summary),
            SuiteOutcome::Skipped => "No test command is configured; run the project's tests yourself.".to_string(),
        }
    }
}

/// Shell command that must exit zero for a change to be approvable
#[derive(Debug, Clone)]
pub struct TestSuite {
    command: Option<String>,
    timeout_ms: u64,
}

/// Longest output tail kept in a failure summary
const TAIL_LINES: usize = 20;

impl TestSuite {
    pub fn new(command: Option<String>, timeout_ms: u64) -> Self {
        Self {
            command: command.filter(|c| !c.trim().is_empty()),
            timeout_ms,
        }
    }

    pub fn from_config(config: &ReviewConfig) -> Self {
        Self::new(config.test_command.clone(), config.test_timeout_ms)
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    async fn execute(&self, command: &str, dir: &Path) -> std::io::Result<std::process::Output> {
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let timeout = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("timed out after {}ms", self.timeout_ms),
            )),
        }
    }

    pub async fn run(&self, dir: &Path) -> SuiteOutcome {
        let Some(command) = self.command.as_deref() else {
            log::warn!("No test command configured; reviewer verifies tests unaided");
            return SuiteOutcome::Skipped;
        };

        log::info!("Running test command: {}", command);
        match self.execute(command, dir).await {
            Ok(output) if output.status.success() => SuiteOutcome::Passed {
                output: String::from_utf8_lossy(&output.stdout).to_string(),
            },
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                SuiteOutcome::Failed {
                    summary: format!(
                        "test command '{}' exited with code {:?}; last output:\n{}",
                        command,
                        output.status.code(),
                        tail(&combined, TAIL_LINES)
                    ),
                }
            }
            Err(e) => SuiteOutcome::Failed {
                summary: format!("test command '{}' could not run: {}", command, e),
            },
        }
    }
}

fn tail(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
