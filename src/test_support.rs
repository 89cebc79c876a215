//! In-memory doubles for the three async seams.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::{GatewayError, WorkflowError};
use crate::github::*;
use crate::roles::{DeveloperBrief, DeveloperReport, QaBrief, QaReport, RoleDelegate};
use crate::sandbox::{ExecutionRequest, ExecutionResult, OutputLimits, SandboxBackend};

enum Scripted {
    Result(ExecutionResult),
    /// Raw output, bounded by whatever limits the request carries.
    Output {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },
}

/// Records every request; answers from a queue, then with an empty success.
#[derive(Default)]
pub(crate) struct FakeSandbox {
    results: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl FakeSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: ExecutionResult) {
        self.results.lock().unwrap().push_back(Scripted::Result(result));
    }

    /// Answer with raw streams, the way a real backend captures them.
    pub fn push_output(&self, exit_code: i64, stdout: &str, stderr: &str) {
        self.results.lock().unwrap().push_back(Scripted::Output {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SandboxBackend for FakeSandbox {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.requests.lock().unwrap().push(request.clone());
        match self.results.lock().unwrap().pop_front() {
            Some(Scripted::Result(result)) => result,
            Some(Scripted::Output {
                exit_code,
                stdout,
                stderr,
            }) => ExecutionResult::completed(exit_code, &stdout, &stderr, Duration::ZERO, request.limits),
            None => ExecutionResult::completed(0, "", "", Duration::ZERO, OutputLimits::STANDARD),
        }
    }
}

#[derive(Default)]
struct GatewayState {
    issues: BTreeMap<u64, IssueDetail>,
    files: HashMap<String, String>,
    directory: Vec<DirEntry>,
    prs: BTreeMap<u64, PrRecord>,
    comments: Vec<(u64, String)>,
    ci: VecDeque<Result<CiStatus, GatewayError>>,
    failed_jobs: Vec<FailedJob>,
    failed_job_lookups: usize,
    secrets_error: Option<GatewayError>,
    variables: BTreeMap<String, String>,
    env_template: Option<EnvTemplate>,
    pushes: Vec<(String, BTreeMap<String, String>)>,
}

/// Repository gateway backed by plain maps. Files are keyed by path only;
/// every ref sees the same content.
#[derive(Default)]
pub(crate) struct MockGateway {
    state: Mutex<GatewayState>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_issue(&self, issue: Issue, comments: Vec<Comment>) {
        self.state
            .lock()
            .unwrap()
            .issues
            .insert(issue.number, IssueDetail { issue, comments });
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    /// Entries returned for every directory listing.
    pub fn set_directory(&self, entries: Vec<DirEntry>) {
        self.state.lock().unwrap().directory = entries;
    }

    pub fn set_pr(&self, pr: PrRecord) {
        self.state.lock().unwrap().prs.insert(pr.number, pr);
    }

    pub fn push_ci(&self, status: Result<CiStatus, GatewayError>) {
        self.state.lock().unwrap().ci.push_back(status);
    }

    pub fn set_failed_jobs(&self, jobs: Vec<FailedJob>) {
        self.state.lock().unwrap().failed_jobs = jobs;
    }

    pub fn failed_job_lookups(&self) -> usize {
        self.state.lock().unwrap().failed_job_lookups
    }

    pub fn fail_secrets(&self, error: GatewayError) {
        self.state.lock().unwrap().secrets_error = Some(error);
    }

    pub fn set_variables(&self, variables: BTreeMap<String, String>) {
        self.state.lock().unwrap().variables = variables;
    }

    pub fn set_env_template(&self, template: EnvTemplate) {
        self.state.lock().unwrap().env_template = Some(template);
    }

    /// `(number, body)` for every comment posted, in order.
    pub fn comments(&self) -> Vec<(u64, String)> {
        self.state.lock().unwrap().comments.clone()
    }

    fn push(&self, branch: &str, files: &BTreeMap<String, String>) -> BranchPush {
        let mut state = self.state.lock().unwrap();
        let mut push = BranchPush {
            branch: branch.to_string(),
            commit_sha: format!("sha{}", state.pushes.len() + 1),
            ..Default::default()
        };
        for (path, content) in files {
            match state.files.insert(path.clone(), content.clone()) {
                Some(_) => push.updated.push(path.clone()),
                None => push.created.push(path.clone()),
            }
        }
        state.pushes.push((branch.to_string(), files.clone()));
        push
    }
}

#[async_trait]
impl RepoGateway for MockGateway {
    async fn current_user(&self) -> Result<String, GatewayError> {
        Ok("nightwatch-bot".into())
    }

    async fn list_assigned_issues(&self, _repo: &str) -> Result<Vec<Issue>, GatewayError> {
        let mut issues: Vec<Issue> = self
            .state
            .lock()
            .unwrap()
            .issues
            .values()
            .map(|d| d.issue.clone())
            .collect();
        sort_backlog(&mut issues);
        Ok(issues)
    }

    async fn get_issue(&self, _repo: &str, number: u64) -> Result<IssueDetail, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&number)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("issue #{}", number)))
    }

    async fn get_file(&self, _repo: &str, path: &str, _git_ref: &str) -> Result<String, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(path.to_string()))
    }

    async fn list_directory(
        &self,
        _repo: &str,
        _path: &str,
        _git_ref: &str,
    ) -> Result<Vec<DirEntry>, GatewayError> {
        Ok(self.state.lock().unwrap().directory.clone())
    }

    async fn create_branch_with_files(
        &self,
        _repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        _message: &str,
        _base: &str,
    ) -> Result<BranchPush, GatewayError> {
        Ok(self.push(branch, files))
    }

    async fn push_files(
        &self,
        _repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        _message: &str,
    ) -> Result<BranchPush, GatewayError> {
        Ok(self.push(branch, files))
    }

    async fn delete_files(
        &self,
        _repo: &str,
        _branch: &str,
        paths: &[String],
        _message: &str,
    ) -> Result<DeleteOutcome, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let mut outcome = DeleteOutcome::default();
        for path in paths {
            match state.files.remove(path) {
                Some(_) => outcome.deleted.push(path.clone()),
                None => outcome.not_found.push(path.clone()),
            }
        }
        Ok(outcome)
    }

    async fn branch_info(&self, _repo: &str, branch: &str) -> Result<BranchInfo, GatewayError> {
        Err(GatewayError::BranchMissing(branch.to_string()))
    }

    async fn create_pr(&self, repo: &str, pr: &NewPr) -> Result<CreatedPr, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let number = state.prs.keys().next_back().copied().unwrap_or(0) + 1;
        let url = format!("https://github.com/{}/pull/{}", repo, number);
        state.prs.insert(
            number,
            PrRecord {
                number,
                url: url.clone(),
                title: pr.title.clone(),
                body: pr.body.clone(),
                author: "nightwatch-bot".into(),
                head_branch: pr.branch.clone(),
                base_branch: pr.base.clone(),
                head_sha: format!("sha{}", number),
                status: if pr.draft { PrStatus::Draft } else { PrStatus::Open },
                mergeable: None,
                files_changed: Vec::new(),
                ci_status: CiStatus::Pending,
            },
        );
        Ok(CreatedPr {
            number,
            url,
            title: pr.title.clone(),
            already_existed: false,
        })
    }

    async fn update_pr(
        &self,
        _repo: &str,
        number: u64,
        files: &BTreeMap<String, String>,
        _message: &str,
    ) -> Result<BranchPush, GatewayError> {
        let branch = self
            .state
            .lock()
            .unwrap()
            .prs
            .get(&number)
            .map(|pr| pr.head_branch.clone())
            .ok_or_else(|| GatewayError::NotFound(format!("pull request #{}", number)))?;
        Ok(self.push(&branch, files))
    }

    async fn get_pr(&self, _repo: &str, number: u64) -> Result<PrRecord, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .prs
            .get(&number)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("pull request #{}", number)))
    }

    async fn add_comment(&self, _repo: &str, number: u64, body: &str) -> Result<(), GatewayError> {
        self.state
            .lock()
            .unwrap()
            .comments
            .push((number, body.to_string()));
        Ok(())
    }

    async fn ci_status(&self, _repo: &str, _sha: &str) -> Result<CiStatus, GatewayError> {
        self.state
            .lock()
            .unwrap()
            .ci
            .pop_front()
            .unwrap_or(Ok(CiStatus::Pending))
    }

    async fn failed_jobs(&self, _repo: &str, _sha: &str) -> Result<Vec<FailedJob>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.failed_job_lookups += 1;
        Ok(state.failed_jobs.clone())
    }

    async fn list_secrets(&self, _repo: &str) -> Result<Vec<String>, GatewayError> {
        match self.state.lock().unwrap().secrets_error.take() {
            Some(e) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn list_variables(&self, _repo: &str) -> Result<BTreeMap<String, String>, GatewayError> {
        Ok(self.state.lock().unwrap().variables.clone())
    }

    async fn read_env_template(
        &self,
        _repo: &str,
        _git_ref: &str,
    ) -> Result<Option<EnvTemplate>, GatewayError> {
        Ok(self.state.lock().unwrap().env_template.clone())
    }

    async fn workflow_runs(&self, _repo: &str, _limit: usize) -> Result<Vec<RunSummary>, GatewayError> {
        Ok(Vec::new())
    }

    async fn dispatch_workflow(
        &self,
        _repo: &str,
        _workflow: &str,
        _git_ref: &str,
    ) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Answers role delegations from two queues and records every brief.
#[derive(Default)]
pub(crate) struct ScriptedDelegate {
    developer: Mutex<VecDeque<Result<DeveloperReport, WorkflowError>>>,
    qa: Mutex<VecDeque<Result<QaReport, WorkflowError>>>,
    developer_briefs: Mutex<Vec<DeveloperBrief>>,
    qa_briefs: Mutex<Vec<QaBrief>>,
}

impl ScriptedDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_developer(&self, report: Result<DeveloperReport, WorkflowError>) {
        self.developer.lock().unwrap().push_back(report);
    }

    pub fn push_qa(&self, report: Result<QaReport, WorkflowError>) {
        self.qa.lock().unwrap().push_back(report);
    }

    pub fn developer_briefs(&self) -> Vec<DeveloperBrief> {
        self.developer_briefs.lock().unwrap().clone()
    }

    pub fn qa_briefs(&self) -> Vec<QaBrief> {
        self.qa_briefs.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleDelegate for ScriptedDelegate {
    async fn develop(&self, brief: &DeveloperBrief) -> Result<DeveloperReport, WorkflowError> {
        self.developer_briefs.lock().unwrap().push(brief.clone());
        self.developer
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(WorkflowError::Delegation {
                    role: "developer".into(),
                    message: "no scripted response".into(),
                })
            })
    }

    async fn verify(&self, brief: &QaBrief) -> Result<QaReport, WorkflowError> {
        self.qa_briefs.lock().unwrap().push(brief.clone());
        self.qa.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(WorkflowError::Delegation {
                role: "qa".into(),
                message: "no scripted response".into(),
            })
        })
    }
}
