use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{
    ExecutionRequest, ExecutionResult, MutationResult, OutputLimits, SandboxBackend, SandboxConfig,
    shell_quote,
};

const CLONE_DIR: &str = "/app/repo";
const BRANCH_MEMORY: &str = "2g";
const TEST_TIMEOUT: Duration = Duration::from_secs(600);
const MUTATION_TIMEOUT: Duration = Duration::from_secs(900);
const LINT_TIMEOUT: Duration = Duration::from_secs(300);

/// Works on debian, alpine and rhel-family images; never fails the chain.
const INSTALL_GIT: &str = "(apt-get update -qq && apt-get install -y -qq git > /dev/null 2>&1 \
     || apk add --no-cache git > /dev/null 2>&1 \
     || yum install -y git > /dev/null 2>&1 || true)";

/// A repository branch to clone into the sandbox, plus how to prepare it.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTarget {
    pub repo: String,
    pub branch: String,
    /// Overrides the configured default image.
    pub image: Option<String>,
    /// Run inside the clone before the primary command.
    pub setup: Vec<String>,
    /// Exported for this run on top of the runner's own variables.
    pub env: BTreeMap<String, String>,
}

impl BranchTarget {
    pub fn new(repo: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            branch: branch.into(),
            image: None,
            setup: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn setup(mut self, setup: Vec<String>) -> Self {
        self.setup = setup;
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Clone-then-run wrappers over a [`SandboxBackend`].
///
/// Every returned result has the clone token replaced by `***`.
pub struct BranchRunner {
    backend: Arc<dyn SandboxBackend>,
    config: SandboxConfig,
    token: String,
    env: BTreeMap<String, String>,
}

impl BranchRunner {
    pub fn new(backend: Arc<dyn SandboxBackend>, config: SandboxConfig, token: impl Into<String>) -> Self {
        Self {
            backend,
            config,
            token: token.into(),
            env: BTreeMap::new(),
        }
    }

    /// Extra variables exported into every container this runner starts.
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn backend(&self) -> &dyn SandboxBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    fn clone_url(&self, repo: &str) -> String {
        if self.token.is_empty() {
            format!("https://github.com/{}.git", repo)
        } else {
            format!("https://{}@github.com/{}.git", self.token, repo)
        }
    }

    /// Install git, shallow-clone the branch, enter it, then the target's setup.
    fn prelude(&self, target: &BranchTarget) -> Vec<String> {
        let mut chain = vec![
            INSTALL_GIT.to_string(),
            format!(
                "git clone --depth 1 --branch {} {} {}",
                shell_quote(&target.branch),
                self.clone_url(&target.repo),
                CLONE_DIR
            ),
            format!("cd {}", CLONE_DIR),
        ];
        chain.extend(target.setup.iter().cloned());
        chain
    }

    /// Runner variables, then the target's, then the clone token.
    fn run_env(&self, target: &BranchTarget) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.extend(target.env.clone());
        if !self.token.is_empty() {
            env.insert("GITHUB_TOKEN".into(), self.token.clone());
        }
        env
    }

    fn request(&self, target: &BranchTarget, command: &str, timeout: Duration) -> ExecutionRequest {
        let env = self.run_env(target);
        let req = ExecutionRequest::new(&self.config, format!("cd {} && {}", CLONE_DIR, command))
            .setup(self.prelude(target))
            .env(env)
            .timeout(timeout)
            .memory(BRANCH_MEMORY);
        match &target.image {
            Some(image) => req.image(image.clone()),
            None => req,
        }
    }

    /// Capture everything, scrub the token, then apply the request's bounds. A
    /// token cut in half by truncation would no longer match the redaction.
    async fn run(&self, req: ExecutionRequest) -> ExecutionResult {
        let limits = req.limits;
        self.run_unbounded(req).await.bounded(limits)
    }

    async fn run_unbounded(&self, mut req: ExecutionRequest) -> ExecutionResult {
        req.limits = OutputLimits::UNBOUNDED;
        self.backend.execute(&req).await.redacted(&self.token)
    }

    pub async fn run_tests(&self, target: &BranchTarget, command: &str) -> ExecutionResult {
        info!(repo = %target.repo, branch = %target.branch, "running tests on branch");
        self.run(self.request(target, command, TEST_TIMEOUT)).await
    }

    /// Same as [`run_tests`](Self::run_tests); the command is expected to print a
    /// coverage summary, which lands in `coverage_percent`.
    pub async fn run_coverage(&self, target: &BranchTarget, command: &str) -> ExecutionResult {
        info!(repo = %target.repo, branch = %target.branch, "running coverage on branch");
        self.run(self.request(target, command, TEST_TIMEOUT)).await
    }

    /// Baseline first. A failing baseline skips the mutation run entirely.
    pub async fn run_mutation_tests(
        &self,
        target: &BranchTarget,
        baseline_command: &str,
        mutation_command: &str,
    ) -> MutationResult {
        info!(repo = %target.repo, branch = %target.branch, "running baseline before mutation");
        let baseline = self
            .run(self.request(target, baseline_command, MUTATION_TIMEOUT))
            .await;
        if !baseline.succeeded() {
            info!(branch = %target.branch, exit_code = baseline.exit_code(), "baseline failed, mutation skipped");
            return MutationResult::skipped(baseline);
        }

        info!(repo = %target.repo, branch = %target.branch, "running mutation tests on branch");
        let req = self.request(target, mutation_command, MUTATION_TIMEOUT);
        let mut result = MutationResult::from_run(self.run_unbounded(req).await);
        result.execution = result.execution.bounded(OutputLimits::STANDARD);
        result
    }

    pub async fn lint(&self, target: &BranchTarget, command: &str) -> ExecutionResult {
        info!(repo = %target.repo, branch = %target.branch, "linting branch");
        self.run(self.request(target, command, LINT_TIMEOUT)).await
    }

    /// Run each command in the clone, labelled, continuing past failures.
    pub async fn debug(&self, target: &BranchTarget, commands: &[String]) -> ExecutionResult {
        info!(repo = %target.repo, branch = %target.branch, steps = commands.len(), "running debug commands");
        let env = self.run_env(target);
        let steps = commands
            .iter()
            .map(|c| format!("cd {} && {}", CLONE_DIR, c))
            .collect();
        let req = ExecutionRequest::steps(&self.config, steps)
            .setup(self.prelude(target))
            .env(env)
            .timeout(TEST_TIMEOUT)
            .memory(BRANCH_MEMORY);
        let req = match &target.image {
            Some(image) => req.image(image.clone()),
            None => req,
        };
        self.run(req).await
    }
}
