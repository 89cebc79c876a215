use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::markers::{parse_developer_output, parse_qa_output};
use super::tools::{ROLE_ENV, TOOLS_ENV, ToolSet};
use super::{DeveloperBrief, DeveloperReport, QaBrief, QaReport, Role, RoleDelegate};
use crate::errors::WorkflowError;

pub const DEFAULT_AGENT_CMD: &str = "claude";
const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(3600);
const STDERR_TAIL: usize = 2000;

/// Runs a role by invoking an agent CLI once per delegation and reading the
/// status marker from its stdout.
pub struct AgentCommandDelegate {
    command: String,
    developer_model: Option<String>,
    qa_model: Option<String>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl AgentCommandDelegate {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            developer_model: None,
            qa_model: None,
            working_dir: None,
            timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }

    pub fn with_models(mut self, developer: Option<String>, qa: Option<String>) -> Self {
        self.developer_model = developer;
        self.qa_model = qa;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn model_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Developer => self.developer_model.as_deref(),
            Role::Qa => self.qa_model.as_deref(),
        }
    }

    /// The role and its tool names are exported so `nightwatch tool` calls made
    /// by the agent are checked against the brief's tool set.
    fn build_command(&self, tools: &ToolSet, prompt: &str) -> Command {
        let role = tools.role();
        let mut cmd = Command::new(&self.command);
        cmd.args(["--print", "--dangerously-skip-permissions"]);
        if let Some(model) = self.model_for(role) {
            cmd.args(["--model", model]);
        }
        cmd.args(["-p", prompt])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env(ROLE_ENV, role.to_string())
            .env(TOOLS_ENV, tools.names())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run the agent once and return its stdout.
    async fn invoke(&self, tools: &ToolSet, prompt: &str) -> Result<String, WorkflowError> {
        let role = tools.role();
        let delegation_error = |message: String| WorkflowError::Delegation {
            role: role.to_string(),
            message,
        };

        info!(role = %role, command = %self.command, "delegating");
        let child = self
            .build_command(tools, prompt)
            .spawn()
            .map_err(|e| delegation_error(format!("failed to spawn {}: {}", self.command, e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| delegation_error(e.to_string()))?,
            Err(_) => {
                warn!(role = %role, timeout_secs = self.timeout.as_secs(), "agent timed out");
                return Err(delegation_error(format!(
                    "agent did not return within {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .chars()
                .rev()
                .take(STDERR_TAIL)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Err(delegation_error(format!(
                "agent exited with {}: {}",
                output.status,
                tail.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(role = %role, bytes = stdout.len(), "agent returned");
        Ok(stdout)
    }
}

#[async_trait]
impl RoleDelegate for AgentCommandDelegate {
    async fn develop(&self, brief: &DeveloperBrief) -> Result<DeveloperReport, WorkflowError> {
        let stdout = self.invoke(&brief.tools, &brief.to_prompt()).await?;
        Ok(parse_developer_output(&stdout))
    }

    async fn verify(&self, brief: &QaBrief) -> Result<QaReport, WorkflowError> {
        let stdout = self.invoke(&brief.tools, &brief.to_prompt()).await?;
        Ok(parse_qa_output(&stdout))
    }
}
