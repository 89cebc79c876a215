//! Sandboxed command execution.
//!
//! Every run gets a fresh container that is torn down afterwards, whatever
//! the outcome. Results carry parsed test counts and coverage from
//! [`signals`], and output bounded by [`OutputLimits`].
//!
//! | Entry point | Purpose |
//! |-------------|---------|
//! | [`SandboxBackend::execute`] | one request, one container |
//! | [`BranchRunner`] | clone a branch, then test / cover / mutate / lint / debug |
//! | [`validate_syntax`] | quick syntax check of an in-memory file |

mod branch;
mod config;
mod docker;
mod mutation;
pub mod signals;
mod validate;

pub use branch::{BranchRunner, BranchTarget};
pub use config::{SandboxConfig, parse_memory_limit};
pub use docker::DockerSandbox;
pub use mutation::{MutationCounts, MutationResult, MutationScore, MutationStatus, parse_mutation_output};
pub use signals::{OutputSignals, TestCounts, extract_signals};
pub use validate::{SyntaxCheck, SyntaxLanguage, validate_syntax};

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::util::{redact, truncate_output};

const TIMEOUT_NOTICE: &str = "Command timed out after";

/// Abstraction over the container backend.
/// Real implementation: `DockerSandbox`. Test double: `FakeSandbox`.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Run one request in a fresh, isolated environment. Never panics and never
    /// returns a Rust error: backend problems become `ExecutionStatus::Error`.
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Timeout,
    Error,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failure => write!(f, "failure"),
            ExecutionStatus::Timeout => write!(f, "timeout"),
            ExecutionStatus::Error => write!(f, "error"),
        }
    }
}

/// Character bounds applied to captured output before it leaves the sandbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLimits {
    pub stdout: usize,
    pub stderr: usize,
}

impl OutputLimits {
    pub const STANDARD: OutputLimits = OutputLimits {
        stdout: 4000,
        stderr: 2000,
    };
    pub const DEBUG: OutputLimits = OutputLimits {
        stdout: 6000,
        stderr: 3000,
    };
    /// Keep everything; callers re-bound with [`ExecutionResult::bounded`].
    pub const UNBOUNDED: OutputLimits = OutputLimits {
        stdout: usize::MAX,
        stderr: usize::MAX,
    };
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Outcome of one sandboxed command run.
///
/// `status` and `exit_code` are only settable through the constructors, which
/// keep `Success` tied to exit code 0.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    status: ExecutionStatus,
    exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub tests: TestCounts,
    pub coverage_percent: Option<f64>,
}

impl ExecutionResult {
    /// The process ran to completion. Signals are parsed from the full output
    /// before truncation.
    pub fn completed(
        exit_code: i64,
        stdout: &str,
        stderr: &str,
        duration: Duration,
        limits: OutputLimits,
    ) -> Self {
        let signals = extract_signals(stdout, stderr);
        let status = if exit_code == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Failure
        };
        Self {
            status,
            exit_code,
            stdout: truncate_output(stdout, limits.stdout),
            stderr: truncate_output(stderr, limits.stderr),
            duration,
            tests: signals.tests,
            coverage_percent: signals.coverage_percent,
        }
    }

    /// The wall-clock ceiling fired before the process exited.
    pub fn timed_out(
        stdout: &str,
        stderr: &str,
        duration: Duration,
        timeout: Duration,
        limits: OutputLimits,
    ) -> Self {
        let signals = extract_signals(stdout, stderr);
        let mut stderr = truncate_output(stderr, limits.stderr);
        if !stderr.is_empty() {
            stderr.push('\n');
        }
        stderr.push_str(&format!("{} {}s", TIMEOUT_NOTICE, timeout.as_secs()));
        Self {
            status: ExecutionStatus::Timeout,
            exit_code: -1,
            stdout: truncate_output(stdout, limits.stdout),
            stderr,
            duration,
            tests: signals.tests,
            coverage_percent: signals.coverage_percent,
        }
    }

    /// The backend failed before or while running the command.
    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            status: ExecutionStatus::Error,
            exit_code: -1,
            stdout: String::new(),
            stderr: message.into(),
            duration,
            tests: TestCounts::default(),
            coverage_percent: None,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Success
    }

    /// Apply display bounds to a result captured with wider ones.
    /// A timeout notice survives the stderr bound.
    pub fn bounded(mut self, limits: OutputLimits) -> Self {
        self.stdout = truncate_output(&self.stdout, limits.stdout);
        let notice_at = match self.status {
            ExecutionStatus::Timeout => self.stderr.rfind(TIMEOUT_NOTICE),
            _ => None,
        };
        self.stderr = match notice_at {
            Some(at) => {
                let (head, notice) = self.stderr.split_at(at);
                let head = truncate_output(head.trim_end_matches('\n'), limits.stderr);
                if head.is_empty() {
                    notice.to_string()
                } else {
                    format!("{}\n{}", head, notice)
                }
            }
            None => truncate_output(&self.stderr, limits.stderr),
        };
        self
    }

    /// Replace `secret` with `***` in both output streams.
    pub fn redacted(mut self, secret: &str) -> Self {
        self.stdout = redact(&self.stdout, secret);
        self.stderr = redact(&self.stderr, secret);
        self
    }

    /// Markdown summary handed to roles and reviewers.
    pub fn to_report(&self) -> String {
        let count = |c: Option<u32>| c.map_or_else(|| "unknown".to_string(), |n| n.to_string());
        let mut out = format!(
            "## Execution Result\n\n**Status:** {}\n**Exit Code:** {}\n**Duration:** {:.2}s\n\n\
             ### Test Summary\n- Passed: {}\n- Failed: {}\n- Skipped: {}\n- Coverage: {}\n",
            self.status.to_string().to_uppercase(),
            self.exit_code,
            self.duration.as_secs_f64(),
            count(self.tests.passed),
            count(self.tests.failed),
            count(self.tests.skipped),
            self.coverage_percent
                .map_or_else(|| "unknown".to_string(), |c| format!("{:.1}%", c)),
        );
        if !self.stdout.is_empty() {
            out.push_str(&format!("\n### Output\n```\n{}\n```\n", self.stdout));
        }
        if !self.stderr.is_empty() {
            out.push_str(&format!("\n### Errors\n```\n{}\n```\n", self.stderr));
        }
        out
    }
}

/// What to run: one command, or labelled debug steps that all run even when
/// an earlier one fails.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandSpec {
    Single(String),
    Steps(Vec<String>),
}

/// One sandbox invocation.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub image: String,
    pub command: CommandSpec,
    /// Run before the command, chained with `&&`.
    pub setup: Vec<String>,
    /// Materialized under `/app` as a single archive upload.
    pub files: BTreeMap<String, String>,
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub memory: String,
    pub cpus: f64,
    pub network: String,
    pub volumes: HashMap<String, String>,
    pub limits: OutputLimits,
}

impl ExecutionRequest {
    pub fn new(config: &SandboxConfig, command: impl Into<String>) -> Self {
        Self::with_spec(config, CommandSpec::Single(command.into()))
    }

    pub fn steps(config: &SandboxConfig, steps: Vec<String>) -> Self {
        let mut req = Self::with_spec(config, CommandSpec::Steps(steps));
        req.limits = OutputLimits::DEBUG;
        req
    }

    fn with_spec(config: &SandboxConfig, command: CommandSpec) -> Self {
        Self {
            image: config.image.clone(),
            command,
            setup: Vec::new(),
            files: BTreeMap::new(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            timeout: Duration::from_secs(config.timeout),
            memory: config.memory.clone(),
            cpus: config.cpus,
            network: config.network.clone(),
            volumes: config.volumes.clone(),
            limits: OutputLimits::STANDARD,
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn setup(mut self, setup: Vec<String>) -> Self {
        self.setup = setup;
        self
    }

    pub fn files(mut self, files: BTreeMap<String, String>) -> Self {
        self.files = files;
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn memory(mut self, memory: impl Into<String>) -> Self {
        self.memory = memory.into();
        self
    }

    /// The full shell script passed to `sh -c`.
    pub fn script(&self) -> String {
        match &self.command {
            CommandSpec::Single(command) => {
                let mut parts = self.setup.clone();
                parts.push(command.clone());
                parts.join(" && ")
            }
            CommandSpec::Steps(steps) => {
                let labelled = steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| {
                        format!(
                            "echo {} ; {} ; echo \"=== EXIT CODE: $? ===\"",
                            shell_quote(&format!("=== COMMAND {}: {} ===", i + 1, step)),
                            step
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(" ; ");
                if self.setup.is_empty() {
                    labelled
                } else {
                    format!("{} && {}", self.setup.join(" && "), labelled)
                }
            }
        }
    }
}

/// Single-quote `s` for POSIX sh.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_status_follows_exit_code() {
        let ok = ExecutionResult::completed(0, "", "", Duration::ZERO, OutputLimits::STANDARD);
        assert_eq!(ok.status(), ExecutionStatus::Success);
        for code in [1, 2, 127, -1] {
            let r = ExecutionResult::completed(code, "", "", Duration::ZERO, OutputLimits::STANDARD);
            assert_eq!(r.status(), ExecutionStatus::Failure);
            assert!(!r.succeeded());
        }
    }

    #[test]
    fn test_timeout_and_error_are_never_success() {
        let t = ExecutionResult::timed_out(
            "partial",
            "",
            Duration::from_secs(5),
            Duration::from_secs(5),
            OutputLimits::STANDARD,
        );
        assert_eq!(t.status(), ExecutionStatus::Timeout);
        assert_ne!(t.exit_code(), 0);
        assert!(t.stderr.contains("timed out after 5s"));

        let e = ExecutionResult::error("Docker is not available", Duration::ZERO);
        assert_eq!(e.status(), ExecutionStatus::Error);
        assert_eq!(e.exit_code(), -1);
    }

    #[test]
    fn test_rebounding_keeps_timeout_notice() {
        let noisy = "e".repeat(5000);
        let t = ExecutionResult::timed_out(
            "",
            &noisy,
            Duration::from_secs(600),
            Duration::from_secs(600),
            OutputLimits::UNBOUNDED,
        )
        .bounded(OutputLimits::STANDARD);
        assert!(t.stderr.contains("[truncated"));
        assert!(t.stderr.ends_with("Command timed out after 600s"));
        assert!(t.stderr.chars().count() < 2100);
    }

    #[test]
    fn test_completed_parses_before_truncating() {
        let mut stdout = "x".repeat(5000);
        stdout.push_str("\n12 passed, 2 failed\nTOTAL 100 20 80%");
        let r = ExecutionResult::completed(1, &stdout, "", Duration::ZERO, OutputLimits::STANDARD);
        assert_eq!(r.tests.passed, Some(12));
        assert_eq!(r.tests.failed, Some(2));
        assert_eq!(r.coverage_percent, Some(80.0));
        assert!(r.stdout.contains("[truncated"));
        assert!(r.stdout.chars().count() < 4100);
    }

    #[test]
    fn test_redacted_masks_both_streams() {
        let r = ExecutionResult::completed(
            128,
            "cloning https://ghp_secret@github.com/a/b.git",
            "fatal: ghp_secret rejected",
            Duration::ZERO,
            OutputLimits::STANDARD,
        )
        .redacted("ghp_secret");
        assert!(!r.stdout.contains("ghp_secret"));
        assert!(!r.stderr.contains("ghp_secret"));
        assert!(r.stdout.contains("***"));
    }

    #[test]
    fn test_report_marks_unknown_counts() {
        let r = ExecutionResult::completed(0, "done", "", Duration::ZERO, OutputLimits::STANDARD);
        let report = r.to_report();
        assert!(report.contains("**Status:** SUCCESS"));
        assert!(report.contains("- Passed: unknown"));
        assert!(report.contains("- Coverage: unknown"));
    }

    #[test]
    fn test_script_chains_setup_with_and() {
        let req = ExecutionRequest::new(&SandboxConfig::default(), "pytest")
            .setup(vec!["pip install -r requirements.txt".into(), "pip install pytest".into()]);
        assert_eq!(
            req.script(),
            "pip install -r requirements.txt && pip install pytest && pytest"
        );
    }

    #[test]
    fn test_script_steps_are_labelled_and_independent() {
        let req = ExecutionRequest::steps(
            &SandboxConfig::default(),
            vec!["pip list".into(), "cat 'a b.txt'".into()],
        );
        let script = req.script();
        assert!(script.contains("=== COMMAND 1: pip list ==="));
        assert!(script.contains("=== COMMAND 2: cat '\\''a b.txt'\\'' ==="));
        assert!(script.contains(" ; "));
        assert!(script.contains("EXIT CODE: $?"));
        assert_eq!(req.limits, OutputLimits::DEBUG);
    }

    #[test]
    fn test_request_inherits_config() {
        let mut config = SandboxConfig::default();
        config.env.insert("CI".into(), "true".into());
        let req = ExecutionRequest::new(&config, "true")
            .env(BTreeMap::from([("DATABASE_URL".to_string(), "sqlite://".to_string())]));
        assert_eq!(req.image, "python:3.11-slim");
        assert_eq!(req.timeout, Duration::from_secs(300));
        assert_eq!(req.env.get("CI").map(String::as_str), Some("true"));
        assert_eq!(req.env.len(), 2);
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
    }
}
