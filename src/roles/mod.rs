//! Role delegation boundary.
//!
//! Roles (developer, QA) receive a brief and return a tagged report. Only
//! [`markers`] looks at free text, and only at the edge with an agent backend.

pub mod agent;
pub mod markers;
pub mod mission;
pub mod tools;

pub use agent::AgentCommandDelegate;
pub use mission::Mission;
pub use tools::{Tool, ToolCall, ToolRunner, ToolSet};

use async_trait::async_trait;
use serde::Serialize;

use crate::errors::WorkflowError;
use crate::github::{EnvConfig, IssueDetail};

/// Abstraction over whatever actually performs a role.
/// Real implementation: `AgentCommandDelegate`. Test double: `ScriptedDelegate`.
#[async_trait]
pub trait RoleDelegate: Send + Sync {
    /// Implement the issue. Returns once the developer hands control back.
    async fn develop(&self, brief: &DeveloperBrief) -> Result<DeveloperReport, WorkflowError>;

    /// Verify a pull request.
    async fn verify(&self, brief: &QaBrief) -> Result<QaReport, WorkflowError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    Qa,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Developer => write!(f, "developer"),
            Role::Qa => write!(f, "qa"),
        }
    }
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "developer" | "dev" => Some(Role::Developer),
            "qa" => Some(Role::Qa),
            _ => None,
        }
    }
}

/// Itemized guidance produced after a blocked attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coaching {
    pub problem: String,
    pub suggestion: String,
    pub files: Vec<String>,
    /// Root listing of the base branch, when it could be read.
    pub layout: Option<String>,
    pub attempt: u32,
    pub max_attempts: u32,
}

impl Coaching {
    pub fn to_prompt(&self) -> String {
        let mut out = format!(
            "COACHING_DEVELOPER:\n- Problem identified: {}\n- Suggestion: {}\n- Files to focus on: {}\n- Retry attempt: {}/{}\n",
            self.problem,
            self.suggestion,
            if self.files.is_empty() {
                "(none identified)".to_string()
            } else {
                self.files.join(", ")
            },
            self.attempt,
            self.max_attempts
        );
        if let Some(layout) = &self.layout {
            out.push_str("- Repository layout:\n```\n");
            out.push_str(layout.trim_end());
            out.push_str("\n```\n");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeveloperBrief {
    pub repo: String,
    pub issue: IssueDetail,
    /// Branch this issue owns; no other worker pushes to it.
    pub branch: String,
    pub base: String,
    pub env: EnvConfig,
    pub attempt: u32,
    pub max_attempts: u32,
    pub coaching: Option<Coaching>,
    /// Itemized reviewer findings from a rejected quality gate.
    pub review_feedback: Option<String>,
    pub tools: ToolSet,
}

impl DeveloperBrief {
    pub fn to_prompt(&self) -> String {
        let mut out = format!(
            "MISSION: Fix issue #{} in {}\nBRANCH: {} (base: {})\nATTEMPT: {}/{}\n\n{}\nENV_CONFIG:\n{}",
            self.issue.issue.number,
            self.repo,
            self.branch,
            self.base,
            self.attempt,
            self.max_attempts,
            self.issue.to_prompt(),
            self.env.to_prompt(),
        );
        if let Some(coaching) = &self.coaching {
            out.push('\n');
            out.push_str(&coaching.to_prompt());
        }
        if let Some(feedback) = &self.review_feedback {
            out.push_str("\n## Code Review Feedback\n");
            out.push_str(feedback);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.tools.to_prompt(&self.repo));
        out.push_str(&format!(
            "\nWhen done, report `{}` with Branch, PR and URL lines, or `{}` with the Issue you hit.\n",
            markers::DEVELOPMENT_COMPLETE,
            markers::DEVELOPMENT_BLOCKED
        ));
        out
    }
}

/// What the developer delivered.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Delivery {
    pub branch: Option<String>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DeveloperReport {
    Complete(Delivery),
    Blocked { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaBrief {
    pub repo: String,
    pub issue_number: u64,
    pub pr_number: u64,
    pub pr_url: String,
    pub branch: String,
    pub env: EnvConfig,
    pub min_coverage: f64,
    pub min_mutation_score: f64,
    pub tools: ToolSet,
}

impl QaBrief {
    pub fn to_prompt(&self) -> String {
        format!(
            "PR_TO_TEST: #{}\nURL: {}\nISSUE: #{}\nREPOSITORY: {}\nBRANCH: {}\nREQUIRED_COVERAGE: {:.0}%\nREQUIRED_MUTATION_SCORE: {:.0}%\nENV_CONFIG:\n{}\n{}\n\
             Report `{}` or `{}` with coverage and recommendations.\n",
            self.pr_number,
            self.pr_url,
            self.issue_number,
            self.repo,
            self.branch,
            self.min_coverage,
            self.min_mutation_score,
            self.env.to_prompt(),
            self.tools.to_prompt(&self.repo),
            markers::VERIFICATION_PASS,
            markers::VERIFICATION_FAIL
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QaVerdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QaReport {
    pub verdict: QaVerdict,
    pub coverage_percent: Option<f64>,
    /// Structured findings for the developer when the verdict is `Fail`.
    pub feedback: String,
}

impl QaReport {
    pub fn passed(&self) -> bool {
        self.verdict == QaVerdict::Pass
    }
}
