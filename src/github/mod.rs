//! Remote-repository gateway.
//!
//! [`RepoGateway`] is the seam every other layer talks through; [`GitHubClient`]
//! implements it over the REST API. Platform errors keep the platform's own
//! message text (see [`GatewayError::Platform`](crate::errors::GatewayError)).

mod client;
pub mod env;
pub mod models;

pub use client::{DEFAULT_API_URL, GitHubClient, RepoGateway};
pub use env::{EnvConfig, build_env_config};
pub use models::*;

/// Known GitHub token prefixes.
/// See: https://github.blog/2021-04-05-behind-githubs-new-authentication-token-formats/
pub const GITHUB_TOKEN_PREFIXES: &[&str] = &[
    "ghp_",        // Personal access tokens (classic)
    "github_pat_", // Fine-grained personal access tokens
    "gho_",        // OAuth access tokens
    "ghu_",        // GitHub App user-to-server tokens
    "ghs_",        // GitHub App server-to-server tokens
    "ghr_",        // GitHub App refresh tokens
];

/// Format check only; says nothing about whether the token is live.
pub fn is_valid_github_token(token: &str) -> bool {
    !token.is_empty()
        && GITHUB_TOKEN_PREFIXES
            .iter()
            .any(|prefix| token.starts_with(prefix))
}

/// `owner/name`, both parts non-empty, nothing else.
pub fn is_valid_repo_slug(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}
