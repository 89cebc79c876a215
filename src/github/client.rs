use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::env::{ENV_TEMPLATE_FILES, parse_env_template};
use super::models::*;
use crate::errors::GatewayError;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const RAW_MEDIA_TYPE: &str = "application/vnd.github.raw";
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const PAGE_SIZE: usize = 100;
const DISCUSSION_LIMIT: usize = 5;
const MIN_FILE_CONTENT: usize = 10;

/// Typed operations against the hosting platform.
/// Real implementation: `GitHubClient`. Test double: `MockGateway`.
#[async_trait]
pub trait RepoGateway: Send + Sync {
    /// Login of the identity the token belongs to.
    async fn current_user(&self) -> Result<String, GatewayError>;

    /// Open issues assigned to the acting identity, high priority first.
    async fn list_assigned_issues(&self, repo: &str) -> Result<Vec<Issue>, GatewayError>;

    async fn get_issue(&self, repo: &str, number: u64) -> Result<IssueDetail, GatewayError>;

    async fn get_file(&self, repo: &str, path: &str, git_ref: &str) -> Result<String, GatewayError>;

    async fn list_directory(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>, GatewayError>;

    /// Create `branch` from `base` and push `files` in one commit. An existing
    /// branch is not an error: `branch_existed` is set and the push proceeds.
    async fn create_branch_with_files(
        &self,
        repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        message: &str,
        base: &str,
    ) -> Result<BranchPush, GatewayError>;

    async fn push_files(
        &self,
        repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<BranchPush, GatewayError>;

    async fn delete_files(
        &self,
        repo: &str,
        branch: &str,
        paths: &[String],
        message: &str,
    ) -> Result<DeleteOutcome, GatewayError>;

    async fn branch_info(&self, repo: &str, branch: &str) -> Result<BranchInfo, GatewayError>;

    /// Open a PR from an existing branch. Never creates the branch.
    async fn create_pr(&self, repo: &str, pr: &NewPr) -> Result<CreatedPr, GatewayError>;

    /// Push files to the head branch of an open PR.
    async fn update_pr(
        &self,
        repo: &str,
        number: u64,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<BranchPush, GatewayError>;

    async fn get_pr(&self, repo: &str, number: u64) -> Result<PrRecord, GatewayError>;

    /// Issues and pull requests share one comment thread per number.
    async fn add_comment(&self, repo: &str, number: u64, body: &str) -> Result<(), GatewayError>;

    async fn ci_status(&self, repo: &str, sha: &str) -> Result<CiStatus, GatewayError>;

    async fn failed_jobs(&self, repo: &str, sha: &str) -> Result<Vec<FailedJob>, GatewayError>;

    /// Secret names only; values are never retrievable.
    async fn list_secrets(&self, repo: &str) -> Result<Vec<String>, GatewayError>;

    async fn list_variables(&self, repo: &str) -> Result<BTreeMap<String, String>, GatewayError>;

    /// First environment template found, if any.
    async fn read_env_template(
        &self,
        repo: &str,
        git_ref: &str,
    ) -> Result<Option<EnvTemplate>, GatewayError>;

    async fn workflow_runs(&self, repo: &str, limit: usize) -> Result<Vec<RunSummary>, GatewayError>;

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow: &str,
        git_ref: &str,
    ) -> Result<(), GatewayError>;
}

// ── Wire types ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Deserialize)]
struct ApiIssue {
    number: u64,
    title: String,
    body: Option<String>,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    assignees: Vec<ApiUser>,
    created_at: DateTime<Utc>,
    pull_request: Option<serde_json::Value>,
}

impl From<ApiIssue> for Issue {
    fn from(raw: ApiIssue) -> Self {
        let labels: Vec<String> = raw.labels.into_iter().map(|l| l.name).collect();
        Issue {
            number: raw.number,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            priority: Priority::from_labels(&labels),
            labels,
            assignees: raw.assignees.into_iter().map(|a| a.login).collect(),
            created_at: raw.created_at,
        }
    }
}

#[derive(Deserialize)]
struct ApiComment {
    user: ApiUser,
    created_at: DateTime<Utc>,
    #[serde(default)]
    body: String,
}

#[derive(Deserialize)]
struct ApiContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ApiObject {
    sha: String,
}

#[derive(Deserialize)]
struct ApiRef {
    object: ApiObject,
}

#[derive(Deserialize)]
struct ApiGitCommit {
    tree: ApiObject,
}

#[derive(Deserialize)]
struct ApiBranchRef {
    #[serde(rename = "ref")]
    name: String,
    sha: String,
}

#[derive(Deserialize)]
struct ApiPull {
    number: u64,
    html_url: String,
    title: String,
    body: Option<String>,
    state: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    merged: bool,
    mergeable: Option<bool>,
    head: ApiBranchRef,
    base: ApiBranchRef,
    user: ApiUser,
}

#[derive(Deserialize)]
struct ApiPullFile {
    filename: String,
}

#[derive(Deserialize)]
struct ApiRun {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    status: String,
    conclusion: Option<String>,
    #[serde(default)]
    head_branch: Option<String>,
    head_sha: String,
    html_url: String,
    created_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ApiRuns {
    workflow_runs: Vec<ApiRun>,
}

#[derive(Deserialize)]
struct ApiStep {
    name: String,
    conclusion: Option<String>,
}

#[derive(Deserialize)]
struct ApiJob {
    name: String,
    conclusion: Option<String>,
    #[serde(default)]
    steps: Vec<ApiStep>,
}

#[derive(Deserialize)]
struct ApiJobs {
    jobs: Vec<ApiJob>,
}

#[derive(Deserialize)]
struct ApiCombinedStatus {
    state: String,
    total_count: u64,
}

#[derive(Deserialize)]
struct ApiSecret {
    name: String,
}

#[derive(Deserialize)]
struct ApiSecrets {
    secrets: Vec<ApiSecret>,
}

#[derive(Deserialize)]
struct ApiVariable {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct ApiVariables {
    variables: Vec<ApiVariable>,
}

#[derive(Deserialize)]
struct ApiBranchCommitAuthor {
    name: Option<String>,
    date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ApiBranchCommitDetail {
    message: String,
    author: Option<ApiBranchCommitAuthor>,
}

#[derive(Deserialize)]
struct ApiBranchCommit {
    sha: String,
    commit: ApiBranchCommitDetail,
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
    #[serde(default)]
    protected: bool,
    commit: ApiBranchCommit,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

/// The platform's own wording: `message`, followed by any per-field detail.
fn platform_message(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(parsed) => {
            let mut message = parsed
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            let details: Vec<String> = parsed.errors.into_iter().filter_map(|e| e.message).collect();
            if !details.is_empty() {
                message = format!("{}: {}", message, details.join("; "));
            }
            message
        }
        Err(_) if !body.trim().is_empty() => body.trim().to_string(),
        Err(_) => status.canonical_reason().unwrap_or("error").to_string(),
    }
}

/// Reject empty maps and placeholder content before any remote write.
fn validate_file_changes(files: &BTreeMap<String, String>) -> Result<(), GatewayError> {
    if files.is_empty() {
        return Err(GatewayError::InvalidInput(
            "file_changes cannot be empty. Provide at least one file with its complete content".into(),
        ));
    }
    for (path, content) in files {
        if content.trim().chars().count() < MIN_FILE_CONTENT {
            return Err(GatewayError::InvalidInput(format!(
                "File '{}' has no content or content is too short. Provide the complete file content",
                path
            )));
        }
    }
    Ok(())
}

/// `headers()` replaces rather than appends, so the raw type is the only one sent.
fn raw_accept() -> HeaderMap {
    HeaderMap::from_iter([(ACCEPT, HeaderValue::from_static(RAW_MEDIA_TYPE))])
}

/// REST client for GitHub. Cheap to share behind an `Arc`; the acting login is
/// resolved once and cached.
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    login: OnceCell<String>,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    pub fn with_base_url(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            login: OnceCell::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header(USER_AGENT, "nightwatch")
            .header(ACCEPT, JSON_MEDIA_TYPE)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, GatewayError> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Platform {
            status: status.as_u16(),
            message: platform_message(&body, status),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        Ok(self.send(self.request(Method::GET, path)).await?.json().await?)
    }

    async fn head_sha(&self, repo: &str, branch: &str) -> Result<String, GatewayError> {
        let r: ApiRef = self
            .get_json(&format!("/repos/{}/git/ref/heads/{}", repo, branch))
            .await?;
        Ok(r.object.sha)
    }

    /// `Some(true)` for an existing file, `Some(false)` for a missing one.
    async fn file_exists(&self, repo: &str, path: &str, git_ref: &str) -> Result<bool, GatewayError> {
        let req = self
            .request(Method::GET, &format!("/repos/{}/contents/{}", repo, path))
            .query(&[("ref", git_ref)]);
        match self.send(req).await {
            Ok(resp) => {
                let value: serde_json::Value = resp.json().await?;
                if value.is_array() {
                    Err(GatewayError::IsDirectory(path.to_string()))
                } else {
                    Ok(true)
                }
            }
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write one tree and one commit on top of `branch`, then move the ref.
    async fn commit_tree(
        &self,
        repo: &str,
        branch: &str,
        entries: Vec<serde_json::Value>,
        message: &str,
    ) -> Result<String, GatewayError> {
        let parent = match self.head_sha(repo, branch).await {
            Ok(sha) => sha,
            Err(e) if e.is_not_found() => return Err(GatewayError::BranchMissing(branch.to_string())),
            Err(e) => return Err(e),
        };
        let base: ApiGitCommit = self
            .get_json(&format!("/repos/{}/git/commits/{}", repo, parent))
            .await?;

        let tree: ApiObject = self
            .send(
                self.request(Method::POST, &format!("/repos/{}/git/trees", repo))
                    .json(&json!({ "base_tree": base.tree.sha, "tree": entries })),
            )
            .await?
            .json()
            .await?;

        let commit: ApiObject = self
            .send(
                self.request(Method::POST, &format!("/repos/{}/git/commits", repo))
                    .json(&json!({ "message": message, "tree": tree.sha, "parents": [parent] })),
            )
            .await?
            .json()
            .await?;

        self.send(
            self.request(Method::PATCH, &format!("/repos/{}/git/refs/heads/{}", repo, branch))
                .json(&json!({ "sha": commit.sha, "force": false })),
        )
        .await?;
        Ok(commit.sha)
    }

    async fn find_open_pr(&self, repo: &str, branch: &str) -> Result<Option<ApiPull>, GatewayError> {
        let owner = repo.split('/').next().unwrap_or(repo);
        let head = format!("{}:{}", owner, branch);
        let pulls: Vec<ApiPull> = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/pulls", repo))
                    .query(&[("state", "open"), ("head", head.as_str())]),
            )
            .await?
            .json()
            .await?;
        Ok(pulls.into_iter().next())
    }

    async fn runs_for_commit(&self, repo: &str, sha: &str) -> Result<Vec<ApiRun>, GatewayError> {
        let runs: ApiRuns = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/actions/runs", repo))
                    .query(&[("head_sha", sha)]),
            )
            .await?
            .json()
            .await?;
        Ok(runs.workflow_runs)
    }
}

#[async_trait]
impl RepoGateway for GitHubClient {
    async fn current_user(&self) -> Result<String, GatewayError> {
        self.login
            .get_or_try_init(|| async {
                let user: ApiUser = self.get_json("/user").await?;
                debug!(login = %user.login, "resolved acting identity");
                Ok(user.login)
            })
            .await
            .cloned()
    }

    async fn list_assigned_issues(&self, repo: &str) -> Result<Vec<Issue>, GatewayError> {
        let login = self.current_user().await?;
        let mut issues = Vec::new();
        let mut page = 1u32;
        loop {
            let batch: Vec<ApiIssue> = self
                .send(
                    self.request(Method::GET, &format!("/repos/{}/issues", repo)).query(&[
                        ("state", "open"),
                        ("assignee", login.as_str()),
                        ("per_page", &PAGE_SIZE.to_string()),
                        ("page", &page.to_string()),
                    ]),
                )
                .await?
                .json()
                .await?;
            let count = batch.len();
            issues.extend(
                batch
                    .into_iter()
                    .filter(|i| i.pull_request.is_none())
                    .map(Issue::from),
            );
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        sort_backlog(&mut issues);
        info!(repo, login = %login, count = issues.len(), "fetched assigned issues");
        Ok(issues)
    }

    async fn get_issue(&self, repo: &str, number: u64) -> Result<IssueDetail, GatewayError> {
        let raw: ApiIssue = self
            .get_json(&format!("/repos/{}/issues/{}", repo, number))
            .await?;
        let comments = match self
            .send(
                self.request(Method::GET, &format!("/repos/{}/issues/{}/comments", repo, number))
                    .query(&[("per_page", DISCUSSION_LIMIT.to_string())]),
            )
            .await
        {
            Ok(resp) => match resp.json::<Vec<ApiComment>>().await {
                Ok(list) => list,
                Err(e) => {
                    warn!(repo, issue = number, error = %e, "failed to decode comments");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(repo, issue = number, error = %e, "failed to fetch comments");
                Vec::new()
            }
        };
        Ok(IssueDetail {
            issue: raw.into(),
            comments: comments
                .into_iter()
                .take(DISCUSSION_LIMIT)
                .map(|c| Comment {
                    author: c.user.login,
                    created_at: c.created_at,
                    body: c.body,
                })
                .collect(),
        })
    }

    async fn get_file(&self, repo: &str, path: &str, git_ref: &str) -> Result<String, GatewayError> {
        if !self.file_exists(repo, path, git_ref).await? {
            return Err(GatewayError::NotFound(format!("{} at {}", path, git_ref)));
        }
        let resp = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/contents/{}", repo, path))
                    .headers(raw_accept())
                    .query(&[("ref", git_ref)]),
            )
            .await?;
        Ok(resp.text().await?)
    }

    async fn list_directory(
        &self,
        repo: &str,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<DirEntry>, GatewayError> {
        let value: serde_json::Value = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/contents/{}", repo, path))
                    .query(&[("ref", git_ref)]),
            )
            .await?
            .json()
            .await?;
        if !value.is_array() {
            return Err(GatewayError::InvalidInput(format!("{} is a file, not a directory", path)));
        }
        let raw: Vec<ApiContentEntry> =
            serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let mut entries: Vec<DirEntry> = raw
            .into_iter()
            .filter_map(|e| {
                let kind = match e.kind.as_str() {
                    "dir" => EntryKind::Dir,
                    "file" => EntryKind::File,
                    _ => return None,
                };
                Some(DirEntry {
                    name: e.name,
                    path: e.path,
                    kind,
                })
            })
            .collect();
        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn create_branch_with_files(
        &self,
        repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        message: &str,
        base: &str,
    ) -> Result<BranchPush, GatewayError> {
        validate_file_changes(files)?;

        let base_sha = self.head_sha(repo, base).await?;
        let created = self
            .send(
                self.request(Method::POST, &format!("/repos/{}/git/refs", repo))
                    .json(&json!({ "ref": format!("refs/heads/{}", branch), "sha": base_sha })),
            )
            .await;
        let branch_existed = match created {
            Ok(_) => {
                info!(repo, branch, base, "branch created");
                false
            }
            Err(GatewayError::Platform { status: 422, message })
                if message.contains("Reference already exists") =>
            {
                info!(repo, branch, "branch already existed");
                true
            }
            Err(e) => return Err(e),
        };

        let mut push = self.push_files(repo, branch, files, message).await?;
        push.branch_existed = branch_existed;
        Ok(push)
    }

    async fn push_files(
        &self,
        repo: &str,
        branch: &str,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<BranchPush, GatewayError> {
        validate_file_changes(files)?;

        let mut push = BranchPush {
            branch: branch.to_string(),
            ..Default::default()
        };
        let mut entries = Vec::with_capacity(files.len());
        for (path, content) in files {
            match self.file_exists(repo, path, branch).await {
                Ok(true) => push.updated.push(path.clone()),
                Ok(false) => push.created.push(path.clone()),
                Err(GatewayError::Platform { status: 404, .. }) => {
                    return Err(GatewayError::BranchMissing(branch.to_string()));
                }
                Err(e) => return Err(e),
            }
            entries.push(json!({ "path": path, "mode": "100644", "type": "blob", "content": content }));
        }

        push.commit_sha = self.commit_tree(repo, branch, entries, message).await?;
        info!(
            repo,
            branch,
            created = push.created.len(),
            updated = push.updated.len(),
            "files pushed"
        );
        Ok(push)
    }

    async fn delete_files(
        &self,
        repo: &str,
        branch: &str,
        paths: &[String],
        message: &str,
    ) -> Result<DeleteOutcome, GatewayError> {
        let mut outcome = DeleteOutcome::default();
        let mut entries = Vec::new();
        for path in paths {
            if self.file_exists(repo, path, branch).await? {
                entries.push(json!({ "path": path, "mode": "100644", "type": "blob", "sha": null }));
                outcome.deleted.push(path.clone());
            } else {
                warn!(repo, branch, path = %path, "file not found for deletion");
                outcome.not_found.push(path.clone());
            }
        }
        if !entries.is_empty() {
            self.commit_tree(repo, branch, entries, message).await?;
        }
        Ok(outcome)
    }

    async fn branch_info(&self, repo: &str, branch: &str) -> Result<BranchInfo, GatewayError> {
        let raw: ApiBranch = self
            .get_json(&format!("/repos/{}/branches/{}", repo, branch))
            .await?;
        let author = raw.commit.commit.author;
        Ok(BranchInfo {
            name: raw.name,
            sha: raw.commit.sha,
            author: author
                .as_ref()
                .and_then(|a| a.name.clone())
                .unwrap_or_default(),
            date: author.and_then(|a| a.date),
            message: raw
                .commit
                .commit
                .message
                .lines()
                .next()
                .unwrap_or_default()
                .to_string(),
            protected: raw.protected,
        })
    }

    async fn create_pr(&self, repo: &str, pr: &NewPr) -> Result<CreatedPr, GatewayError> {
        match self.head_sha(repo, &pr.branch).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(GatewayError::BranchMissing(pr.branch.clone())),
            Err(e) => return Err(e),
        }

        let created = self
            .send(
                self.request(Method::POST, &format!("/repos/{}/pulls", repo)).json(&json!({
                    "title": pr.title,
                    "body": pr.body,
                    "head": pr.branch,
                    "base": pr.base,
                    "draft": pr.draft,
                })),
            )
            .await;

        match created {
            Ok(resp) => {
                let raw: ApiPull = resp.json().await?;
                info!(repo, number = raw.number, url = %raw.html_url, "pull request created");
                Ok(CreatedPr {
                    number: raw.number,
                    url: raw.html_url,
                    title: raw.title,
                    already_existed: false,
                })
            }
            Err(GatewayError::Platform { status: 422, message })
                if message.contains("A pull request already exists") =>
            {
                match self.find_open_pr(repo, &pr.branch).await {
                    Ok(Some(raw)) => {
                        info!(repo, number = raw.number, "pull request already existed");
                        Ok(CreatedPr {
                            number: raw.number,
                            url: raw.html_url,
                            title: raw.title,
                            already_existed: true,
                        })
                    }
                    Ok(None) => Err(GatewayError::Platform { status: 422, message }),
                    Err(e) => {
                        warn!(repo, branch = %pr.branch, error = %e, "failed to find existing pull request");
                        Err(GatewayError::Platform { status: 422, message })
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn update_pr(
        &self,
        repo: &str,
        number: u64,
        files: &BTreeMap<String, String>,
        message: &str,
    ) -> Result<BranchPush, GatewayError> {
        let raw: ApiPull = self
            .get_json(&format!("/repos/{}/pulls/{}", repo, number))
            .await?;
        self.push_files(repo, &raw.head.name, files, message).await
    }

    async fn get_pr(&self, repo: &str, number: u64) -> Result<PrRecord, GatewayError> {
        let raw: ApiPull = self
            .get_json(&format!("/repos/{}/pulls/{}", repo, number))
            .await?;
        let files: Vec<ApiPullFile> = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/pulls/{}/files", repo, number))
                    .query(&[("per_page", PAGE_SIZE.to_string())]),
            )
            .await?
            .json()
            .await?;
        let ci_status = self.ci_status(repo, &raw.head.sha).await?;
        Ok(PrRecord {
            number: raw.number,
            url: raw.html_url,
            title: raw.title,
            body: raw.body.unwrap_or_default(),
            author: raw.user.login,
            status: PrStatus::from_flags(&raw.state, raw.draft, raw.merged),
            mergeable: raw.mergeable,
            head_branch: raw.head.name,
            base_branch: raw.base.name,
            head_sha: raw.head.sha,
            files_changed: files.into_iter().map(|f| f.filename).collect(),
            ci_status,
        })
    }

    async fn add_comment(&self, repo: &str, number: u64, body: &str) -> Result<(), GatewayError> {
        self.send(
            self.request(Method::POST, &format!("/repos/{}/issues/{}/comments", repo, number))
                .json(&json!({ "body": body })),
        )
        .await?;
        debug!(repo, number, "comment added");
        Ok(())
    }

    async fn ci_status(&self, repo: &str, sha: &str) -> Result<CiStatus, GatewayError> {
        let runs = match self.runs_for_commit(repo, sha).await {
            Ok(runs) => runs,
            // Actions disabled or not visible to this token.
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let states: Vec<RunState> = runs
            .into_iter()
            .map(|r| RunState {
                status: r.status,
                conclusion: r.conclusion,
            })
            .collect();
        if !states.is_empty() {
            return Ok(resolve_ci_status(&states, None));
        }

        let combined = match self
            .get_json::<ApiCombinedStatus>(&format!("/repos/{}/commits/{}/status", repo, sha))
            .await
        {
            Ok(c) => Some(CombinedStatus {
                state: c.state,
                total_count: c.total_count,
            }),
            Err(e) => {
                warn!(repo, sha, error = %e, "combined status lookup failed");
                None
            }
        };
        Ok(resolve_ci_status(&[], combined.as_ref()))
    }

    async fn failed_jobs(&self, repo: &str, sha: &str) -> Result<Vec<FailedJob>, GatewayError> {
        let mut failed = Vec::new();
        for run in self.runs_for_commit(repo, sha).await? {
            if run.conclusion.as_deref() != Some("failure") {
                continue;
            }
            let run_name = run.name.unwrap_or_else(|| format!("run-{}", run.id));
            let jobs: ApiJobs = match self
                .get_json(&format!("/repos/{}/actions/runs/{}/jobs", repo, run.id))
                .await
            {
                Ok(jobs) => jobs,
                Err(e) => {
                    warn!(repo, run = run.id, error = %e, "failed to list jobs for run");
                    continue;
                }
            };
            for job in jobs.jobs {
                if job.conclusion.as_deref() == Some("failure") {
                    failed.push(FailedJob {
                        name: format!("{}/{}", run_name, job.name),
                        failed_steps: job
                            .steps
                            .into_iter()
                            .filter(|s| s.conclusion.as_deref() == Some("failure"))
                            .map(|s| s.name)
                            .collect(),
                    });
                }
            }
        }
        Ok(failed)
    }

    async fn list_secrets(&self, repo: &str) -> Result<Vec<String>, GatewayError> {
        let secrets: ApiSecrets = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/actions/secrets", repo))
                    .query(&[("per_page", PAGE_SIZE.to_string())]),
            )
            .await?
            .json()
            .await?;
        Ok(secrets.secrets.into_iter().map(|s| s.name).collect())
    }

    async fn list_variables(&self, repo: &str) -> Result<BTreeMap<String, String>, GatewayError> {
        let vars: ApiVariables = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/actions/variables", repo))
                    .query(&[("per_page", PAGE_SIZE.to_string())]),
            )
            .await?
            .json()
            .await?;
        Ok(vars
            .variables
            .into_iter()
            .map(|v| (v.name, v.value))
            .collect())
    }

    async fn read_env_template(
        &self,
        repo: &str,
        git_ref: &str,
    ) -> Result<Option<EnvTemplate>, GatewayError> {
        for file in ENV_TEMPLATE_FILES {
            match self.get_file(repo, file, git_ref).await {
                Ok(content) => {
                    return Ok(Some(EnvTemplate {
                        file: file.to_string(),
                        variables: parse_env_template(&content),
                        content,
                    }));
                }
                Err(e) if e.is_not_found() => continue,
                Err(e) => {
                    warn!(repo, file, error = %e, "env template probe failed");
                    continue;
                }
            }
        }
        Ok(None)
    }

    async fn workflow_runs(&self, repo: &str, limit: usize) -> Result<Vec<RunSummary>, GatewayError> {
        let runs: ApiRuns = self
            .send(
                self.request(Method::GET, &format!("/repos/{}/actions/runs", repo))
                    .query(&[("per_page", limit.to_string())]),
            )
            .await?
            .json()
            .await?;
        Ok(runs
            .workflow_runs
            .into_iter()
            .take(limit)
            .map(|r| RunSummary {
                id: r.id,
                name: r.name.unwrap_or_default(),
                status: r.status,
                conclusion: r.conclusion,
                branch: r.head_branch.unwrap_or_default(),
                head_sha: r.head_sha,
                url: r.html_url,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn dispatch_workflow(
        &self,
        repo: &str,
        workflow: &str,
        git_ref: &str,
    ) -> Result<(), GatewayError> {
        self.send(
            self.request(
                Method::POST,
                &format!("/repos/{}/actions/workflows/{}/dispatches", repo, workflow),
            )
            .json(&json!({ "ref": git_ref })),
        )
        .await?;
        info!(repo, workflow, git_ref, "workflow dispatched");
        Ok(())
    }
}
