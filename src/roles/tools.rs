//! The tools a role may call while it works.
//!
//! Each role gets a declared [`ToolSet`]. The agent backend reaches the tools
//! through the `nightwatch tool <name>` subcommand, which parses a [`ToolCall`],
//! checks it against the caller's set and runs it with a [`ToolRunner`].
//!
//! | Group      | Tools |
//! |------------|-------|
//! | Repository | `get_issue`, `get_file`, `list_directory`, `get_pr`, `branch_info`, `read_env_config` |
//! | Writes     | `create_branch_with_files`, `push_files`, `delete_files`, `create_pr`, `update_pr`, `add_comment` |
//! | Sandbox    | `run_tests`, `run_coverage`, `run_mutation_tests`, `lint`, `debug`, `validate_syntax` |
//! | CI         | `watch_ci`, `workflow_runs`, `dispatch_workflow` |

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Role;
use crate::ci::{CiMonitor, DEFAULT_CI_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::errors::ToolError;
use crate::github::{NewPr, RepoGateway, build_env_config, render_tree};
use crate::sandbox::{BranchRunner, BranchTarget, SyntaxLanguage, validate_syntax};

/// Environment variable carrying the invoking role into tool calls.
pub const ROLE_ENV: &str = "NIGHTWATCH_ROLE";
/// Environment variable carrying the comma-separated tool names of that role.
pub const TOOLS_ENV: &str = "NIGHTWATCH_TOOLS";

const DEFAULT_RUN_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    GetIssue,
    GetFile,
    ListDirectory,
    GetPr,
    BranchInfo,
    ReadEnvConfig,
    CreateBranchWithFiles,
    PushFiles,
    DeleteFiles,
    CreatePr,
    UpdatePr,
    AddComment,
    RunTests,
    RunCoverage,
    RunMutationTests,
    Lint,
    Debug,
    ValidateSyntax,
    WatchCi,
    WorkflowRuns,
    DispatchWorkflow,
}

impl Tool {
    pub const ALL: [Tool; 21] = [
        Tool::GetIssue,
        Tool::GetFile,
        Tool::ListDirectory,
        Tool::GetPr,
        Tool::BranchInfo,
        Tool::ReadEnvConfig,
        Tool::CreateBranchWithFiles,
        Tool::PushFiles,
        Tool::DeleteFiles,
        Tool::CreatePr,
        Tool::UpdatePr,
        Tool::AddComment,
        Tool::RunTests,
        Tool::RunCoverage,
        Tool::RunMutationTests,
        Tool::Lint,
        Tool::Debug,
        Tool::ValidateSyntax,
        Tool::WatchCi,
        Tool::WorkflowRuns,
        Tool::DispatchWorkflow,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::GetIssue => "get_issue",
            Tool::GetFile => "get_file",
            Tool::ListDirectory => "list_directory",
            Tool::GetPr => "get_pr",
            Tool::BranchInfo => "branch_info",
            Tool::ReadEnvConfig => "read_env_config",
            Tool::CreateBranchWithFiles => "create_branch_with_files",
            Tool::PushFiles => "push_files",
            Tool::DeleteFiles => "delete_files",
            Tool::CreatePr => "create_pr",
            Tool::UpdatePr => "update_pr",
            Tool::AddComment => "add_comment",
            Tool::RunTests => "run_tests",
            Tool::RunCoverage => "run_coverage",
            Tool::RunMutationTests => "run_mutation_tests",
            Tool::Lint => "lint",
            Tool::Debug => "debug",
            Tool::ValidateSyntax => "validate_syntax",
            Tool::WatchCi => "watch_ci",
            Tool::WorkflowRuns => "workflow_runs",
            Tool::DispatchWorkflow => "dispatch_workflow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Tool::ALL.into_iter().find(|t| t.name() == name)
    }

    /// One line for the role's prompt: what it does and the input it takes.
    pub fn usage(self) -> &'static str {
        match self {
            Tool::GetIssue => r#"issue body and discussion. {"number": 42}"#,
            Tool::GetFile => r#"file content. {"path": "src/app.py", "git_ref": "main"}"#,
            Tool::ListDirectory => r#"directory listing. {"path": "src", "git_ref": "main"}"#,
            Tool::GetPr => r#"PR status, branches, changed files, CI. {"number": 17}"#,
            Tool::BranchInfo => r#"head sha and protection. {"branch": "fix-issue-42"}"#,
            Tool::ReadEnvConfig => r#"env vars the tests need. {"git_ref": "main"}"#,
            Tool::CreateBranchWithFiles => {
                r#"new branch plus files in one commit. {"branch": "...", "files": {"path": "content"}, "message": "..."}"#
            }
            Tool::PushFiles => {
                r#"commit files to a branch. {"branch": "...", "files": {"path": "content"}, "message": "..."}"#
            }
            Tool::DeleteFiles => r#"remove files. {"branch": "...", "paths": ["..."], "message": "..."}"#,
            Tool::CreatePr => {
                r#"open a PR from an existing branch. {"branch": "...", "title": "...", "body": "Fixes #42"}"#
            }
            Tool::UpdatePr => r#"push files to a PR's branch. {"number": 17, "files": {...}, "message": "..."}"#,
            Tool::AddComment => r#"comment on an issue or PR. {"number": 17, "body": "..."}"#,
            Tool::RunTests => r#"clone a branch and run tests. {"branch": "...", "command": "pytest -v", "setup": ["pip install -e ."]}"#,
            Tool::RunCoverage => r#"tests with coverage. {"branch": "...", "command": "pytest --cov"}"#,
            Tool::RunMutationTests => {
                r#"baseline then mutants. {"branch": "...", "baseline_command": "pytest", "mutation_command": "mutmut run"}"#
            }
            Tool::Lint => r#"run a linter. {"branch": "...", "command": "ruff check ."}"#,
            Tool::Debug => r#"labelled commands in the clone. {"branch": "...", "commands": ["ls -la"]}"#,
            Tool::ValidateSyntax => {
                r#"syntax check. {"filename": "app.py", "content": "...", "language": "python"}"#
            }
            Tool::WatchCi => r#"wait for the PR's CI to finish. {"number": 17, "timeout_secs": 600}"#,
            Tool::WorkflowRuns => r#"recent workflow runs. {"limit": 10}"#,
            Tool::DispatchWorkflow => r#"trigger a workflow. {"workflow": "ci.yml", "git_ref": "main"}"#,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The tools one role is allowed to call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSet {
    role: Role,
    tools: Vec<Tool>,
}

impl ToolSet {
    pub fn developer() -> Self {
        Self {
            role: Role::Developer,
            tools: vec![
                Tool::GetIssue,
                Tool::GetFile,
                Tool::ListDirectory,
                Tool::BranchInfo,
                Tool::ReadEnvConfig,
                Tool::CreateBranchWithFiles,
                Tool::PushFiles,
                Tool::DeleteFiles,
                Tool::ValidateSyntax,
                Tool::RunTests,
                Tool::Lint,
                Tool::Debug,
                Tool::CreatePr,
                Tool::UpdatePr,
                Tool::WatchCi,
            ],
        }
    }

    /// Mutation testing is only offered when the gate requires it.
    pub fn qa(mutation: bool) -> Self {
        let mut tools = vec![
            Tool::GetPr,
            Tool::GetFile,
            Tool::ListDirectory,
            Tool::BranchInfo,
            Tool::ReadEnvConfig,
            Tool::RunTests,
            Tool::RunCoverage,
            Tool::Lint,
            Tool::PushFiles,
            Tool::AddComment,
            Tool::WatchCi,
            Tool::WorkflowRuns,
            Tool::DispatchWorkflow,
        ];
        if mutation {
            tools.insert(7, Tool::RunMutationTests);
        }
        Self { role: Role::Qa, tools }
    }

    pub fn for_role(role: Role, mutation: bool) -> Self {
        match role {
            Role::Developer => Self::developer(),
            Role::Qa => Self::qa(mutation),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    pub fn allows(&self, tool: Tool) -> bool {
        self.tools.contains(&tool)
    }

    pub fn check(&self, tool: Tool) -> Result<(), ToolError> {
        if self.allows(tool) {
            Ok(())
        } else {
            Err(ToolError::NotAllowed {
                tool: tool.name().to_string(),
                role: self.role.to_string(),
            })
        }
    }

    /// Value for [`TOOLS_ENV`].
    pub fn names(&self) -> String {
        self.tools.iter().map(|t| t.name()).collect::<Vec<_>>().join(",")
    }

    pub fn to_prompt(&self, repo: &str) -> String {
        let mut out = format!(
            "## Tools\nRun each tool as a shell command and read its stdout:\n`nightwatch tool <name> --repo {} --role {} --input '<json>'`\n\n",
            repo, self.role
        );
        for tool in &self.tools {
            out.push_str(&format!("- `{}`: {}\n", tool.name(), tool.usage()));
        }
        out
    }
}

/// A parsed tool invocation: the tool plus its typed input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case")]
pub enum ToolCall {
    GetIssue {
        number: u64,
    },
    GetFile {
        path: String,
        git_ref: Option<String>,
    },
    ListDirectory {
        #[serde(default)]
        path: String,
        git_ref: Option<String>,
    },
    GetPr {
        number: u64,
    },
    BranchInfo {
        branch: String,
    },
    ReadEnvConfig {
        git_ref: Option<String>,
    },
    CreateBranchWithFiles {
        branch: String,
        files: BTreeMap<String, String>,
        message: String,
        base: Option<String>,
    },
    PushFiles {
        branch: String,
        files: BTreeMap<String, String>,
        message: String,
    },
    DeleteFiles {
        branch: String,
        paths: Vec<String>,
        message: String,
    },
    CreatePr {
        branch: String,
        title: String,
        #[serde(default)]
        body: String,
        base: Option<String>,
        #[serde(default)]
        draft: bool,
    },
    UpdatePr {
        number: u64,
        files: BTreeMap<String, String>,
        message: String,
    },
    AddComment {
        number: u64,
        body: String,
    },
    RunTests(CommandCall),
    RunCoverage(CommandCall),
    RunMutationTests(MutationCall),
    Lint(CommandCall),
    Debug(DebugCall),
    ValidateSyntax {
        filename: String,
        content: String,
        language: String,
    },
    WatchCi {
        number: u64,
        timeout_secs: Option<u64>,
    },
    WorkflowRuns {
        limit: Option<usize>,
    },
    DispatchWorkflow {
        workflow: String,
        git_ref: Option<String>,
    },
}

/// Where a sandbox tool runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SandboxTarget {
    pub branch: String,
    #[serde(default)]
    pub setup: Vec<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommandCall {
    #[serde(flatten)]
    pub target: SandboxTarget,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MutationCall {
    #[serde(flatten)]
    pub target: SandboxTarget,
    pub baseline_command: String,
    pub mutation_command: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DebugCall {
    #[serde(flatten)]
    pub target: SandboxTarget,
    pub commands: Vec<String>,
}

impl ToolCall {
    /// Parse `input` (a JSON object, or empty) as the arguments of tool `name`.
    pub fn parse(name: &str, input: &str) -> Result<Self, ToolError> {
        let tool = Tool::from_name(name).ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        let invalid = |message: String| ToolError::InvalidInput {
            tool: tool.name().to_string(),
            message,
        };

        let mut args = if input.trim().is_empty() {
            serde_json::Map::new()
        } else {
            match serde_json::from_str::<serde_json::Value>(input).map_err(|e| invalid(e.to_string()))? {
                serde_json::Value::Object(map) => map,
                other => return Err(invalid(format!("expected a JSON object, got {}", other))),
            }
        };
        args.insert("tool".into(), serde_json::Value::String(tool.name().into()));
        serde_json::from_value(serde_json::Value::Object(args)).map_err(|e| invalid(e.to_string()))
    }

    pub fn tool(&self) -> Tool {
        match self {
            ToolCall::GetIssue { .. } => Tool::GetIssue,
            ToolCall::GetFile { .. } => Tool::GetFile,
            ToolCall::ListDirectory { .. } => Tool::ListDirectory,
            ToolCall::GetPr { .. } => Tool::GetPr,
            ToolCall::BranchInfo { .. } => Tool::BranchInfo,
            ToolCall::ReadEnvConfig { .. } => Tool::ReadEnvConfig,
            ToolCall::CreateBranchWithFiles { .. } => Tool::CreateBranchWithFiles,
            ToolCall::PushFiles { .. } => Tool::PushFiles,
            ToolCall::DeleteFiles { .. } => Tool::DeleteFiles,
            ToolCall::CreatePr { .. } => Tool::CreatePr,
            ToolCall::UpdatePr { .. } => Tool::UpdatePr,
            ToolCall::AddComment { .. } => Tool::AddComment,
            ToolCall::RunTests(_) => Tool::RunTests,
            ToolCall::RunCoverage(_) => Tool::RunCoverage,
            ToolCall::RunMutationTests(_) => Tool::RunMutationTests,
            ToolCall::Lint(_) => Tool::Lint,
            ToolCall::Debug(_) => Tool::Debug,
            ToolCall::ValidateSyntax { .. } => Tool::ValidateSyntax,
            ToolCall::WatchCi { .. } => Tool::WatchCi,
            ToolCall::WorkflowRuns { .. } => Tool::WorkflowRuns,
            ToolCall::DispatchWorkflow { .. } => Tool::DispatchWorkflow,
        }
    }
}

/// Runs tool calls against the gateway, the sandbox and the CI monitor.
pub struct ToolRunner {
    gateway: Arc<dyn RepoGateway>,
    branches: BranchRunner,
    base_branch: String,
    ci_interval: Duration,
    ci_timeout: Duration,
    min_mutation_score: f64,
}

impl ToolRunner {
    pub fn new(gateway: Arc<dyn RepoGateway>, branches: BranchRunner) -> Self {
        Self {
            gateway,
            branches,
            base_branch: "main".into(),
            ci_interval: DEFAULT_POLL_INTERVAL,
            ci_timeout: DEFAULT_CI_TIMEOUT,
            min_mutation_score: 60.0,
        }
    }

    pub fn with_base_branch(mut self, base: impl Into<String>) -> Self {
        self.base_branch = base.into();
        self
    }

    pub fn with_ci(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ci_interval = interval;
        self.ci_timeout = timeout;
        self
    }

    pub fn with_min_mutation_score(mut self, score: f64) -> Self {
        self.min_mutation_score = score;
        self
    }

    fn git_ref(&self, git_ref: Option<String>) -> String {
        git_ref.unwrap_or_else(|| self.base_branch.clone())
    }

    /// Clone target for a sandbox tool, with the repository's resolved variables.
    async fn target(&self, repo: &str, target: SandboxTarget) -> BranchTarget {
        let env = build_env_config(self.gateway.as_ref(), repo, &target.branch).await;
        let branch = BranchTarget::new(repo, target.branch)
            .setup(target.setup)
            .env(env.sandbox_env());
        match target.image {
            Some(image) => branch.image(image),
            None => branch,
        }
    }

    /// Run one call. The returned text is what the role reads.
    pub async fn run(&self, repo: &str, call: ToolCall) -> Result<String, ToolError> {
        let tool = call.tool();
        info!(repo, tool = %tool, "running tool");
        let gw = self.gateway.as_ref();
        match call {
            ToolCall::GetIssue { number } => Ok(gw.get_issue(repo, number).await?.to_prompt()),
            ToolCall::GetFile { path, git_ref } => Ok(gw.get_file(repo, &path, &self.git_ref(git_ref)).await?),
            ToolCall::ListDirectory { path, git_ref } => {
                let entries = gw.list_directory(repo, &path, &self.git_ref(git_ref)).await?;
                Ok(render_tree(&path, &entries))
            }
            ToolCall::GetPr { number } => Ok(gw.get_pr(repo, number).await?.to_prompt()),
            ToolCall::BranchInfo { branch } => render(tool, &gw.branch_info(repo, &branch).await?),
            ToolCall::ReadEnvConfig { git_ref } => {
                Ok(build_env_config(gw, repo, &self.git_ref(git_ref)).await.to_prompt())
            }
            ToolCall::CreateBranchWithFiles {
                branch,
                files,
                message,
                base,
            } => {
                let base = self.git_ref(base);
                render(tool, &gw.create_branch_with_files(repo, &branch, &files, &message, &base).await?)
            }
            ToolCall::PushFiles {
                branch,
                files,
                message,
            } => render(tool, &gw.push_files(repo, &branch, &files, &message).await?),
            ToolCall::DeleteFiles {
                branch,
                paths,
                message,
            } => render(tool, &gw.delete_files(repo, &branch, &paths, &message).await?),
            ToolCall::CreatePr {
                branch,
                title,
                body,
                base,
                draft,
            } => {
                let pr = NewPr {
                    branch,
                    title,
                    body,
                    base: self.git_ref(base),
                    draft,
                };
                render(tool, &gw.create_pr(repo, &pr).await?)
            }
            ToolCall::UpdatePr {
                number,
                files,
                message,
            } => render(tool, &gw.update_pr(repo, number, &files, &message).await?),
            ToolCall::AddComment { number, body } => {
                gw.add_comment(repo, number, &body).await?;
                Ok(format!("Comment added to #{}", number))
            }
            ToolCall::RunTests(run) => {
                let target = self.target(repo, run.target).await;
                Ok(self.branches.run_tests(&target, &run.command).await.to_report())
            }
            ToolCall::RunCoverage(run) => {
                let target = self.target(repo, run.target).await;
                Ok(self.branches.run_coverage(&target, &run.command).await.to_report())
            }
            ToolCall::RunMutationTests(run) => {
                let target = self.target(repo, run.target).await;
                let result = self
                    .branches
                    .run_mutation_tests(&target, &run.baseline_command, &run.mutation_command)
                    .await;
                Ok(result.to_report(self.min_mutation_score))
            }
            ToolCall::Lint(run) => {
                let target = self.target(repo, run.target).await;
                Ok(self.branches.lint(&target, &run.command).await.to_report())
            }
            ToolCall::Debug(run) => {
                let target = self.target(repo, run.target).await;
                Ok(self.branches.debug(&target, &run.commands).await.to_report())
            }
            ToolCall::ValidateSyntax {
                filename,
                content,
                language,
            } => {
                let language = SyntaxLanguage::parse(&language).ok_or_else(|| ToolError::InvalidInput {
                    tool: tool.name().to_string(),
                    message: format!("unsupported language '{}'", language),
                })?;
                let check = validate_syntax(
                    self.branches.backend(),
                    self.branches.config(),
                    &filename,
                    &content,
                    language,
                )
                .await;
                Ok(check.to_report(&filename, language))
            }
            ToolCall::WatchCi { number, timeout_secs } => {
                let pr = gw.get_pr(repo, number).await?;
                let timeout = timeout_secs.map_or(self.ci_timeout, Duration::from_secs);
                let result = CiMonitor::new(self.gateway.clone())
                    .with_interval(self.ci_interval)
                    .with_timeout(timeout)
                    .watch(repo, &pr.head_sha)
                    .await;
                Ok(result.to_report())
            }
            ToolCall::WorkflowRuns { limit } => {
                render(tool, &gw.workflow_runs(repo, limit.unwrap_or(DEFAULT_RUN_LIMIT)).await?)
            }
            ToolCall::DispatchWorkflow { workflow, git_ref } => {
                let git_ref = self.git_ref(git_ref);
                gw.dispatch_workflow(repo, &workflow, &git_ref).await?;
                Ok(format!("Workflow {} dispatched on {}", workflow, git_ref))
            }
        }
    }
}

fn render<T: Serialize>(tool: Tool, value: &T) -> Result<String, ToolError> {
    serde_json::to_string_pretty(value).map_err(|e| ToolError::InvalidInput {
        tool: tool.name().to_string(),
        message: format!("result could not be rendered: {}", e),
    })
}
