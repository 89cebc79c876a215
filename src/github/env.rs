//! Environment configuration for test runs.
//!
//! A repository's env template names the variables its tests need. Each name is
//! resolved against the repository's secrets (by reference only) and variables
//! (by value). Anything unresolved is reported as missing.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use super::RepoGateway;

/// Template files probed in order; the first one found wins.
pub const ENV_TEMPLATE_FILES: &[&str] = &[
    ".env.example",
    ".env.template",
    ".env.sample",
    "env.example",
    ".env.test.example",
];

/// Prefix of a value that names a secret rather than carrying one.
pub const SECRET_REF_PREFIX: &str = "GITHUB_SECRET:";

/// Names declared by an env template: `NAME=...` lines, comments and blanks skipped.
pub fn parse_env_template(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (name, _) = line.split_once('=')?;
            let name = name.trim().trim_start_matches("export ").trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnvConfig {
    /// Env var -> secret name.
    pub from_secrets: BTreeMap<String, String>,
    /// Env var -> literal value.
    pub from_variables: BTreeMap<String, String>,
    pub missing: Vec<String>,
    /// Every secret name the repository exposes.
    pub secret_names: Vec<String>,
}

impl EnvConfig {
    /// Resolve template names against secret names and variable values. An exact
    /// name match is tried before the upper-cased name; secrets before variables.
    pub fn resolve(
        names: &[String],
        secret_names: Vec<String>,
        variables: &BTreeMap<String, String>,
    ) -> Self {
        let mut config = EnvConfig {
            secret_names,
            ..Default::default()
        };
        for name in names {
            let upper = name.to_uppercase();
            if let Some(secret) = [name, &upper]
                .into_iter()
                .find(|candidate| config.secret_names.contains(*candidate))
            {
                config.from_secrets.insert(name.clone(), secret.clone());
            } else if let Some(value) = variables.get(name).or_else(|| variables.get(&upper)) {
                config.from_variables.insert(name.clone(), value.clone());
            } else {
                config.missing.push(name.clone());
            }
        }
        config
    }

    pub fn is_empty(&self) -> bool {
        self.from_secrets.is_empty() && self.from_variables.is_empty() && self.missing.is_empty()
    }

    /// Full mapping: secrets as `GITHUB_SECRET:<NAME>` references, variables as values.
    pub fn to_env_map(&self) -> BTreeMap<String, String> {
        let mut env: BTreeMap<String, String> = self
            .from_secrets
            .iter()
            .map(|(var, secret)| (var.clone(), format!("{}{}", SECRET_REF_PREFIX, secret)))
            .collect();
        env.extend(self.from_variables.clone());
        env
    }

    /// Only what can be injected into a container as-is. Secret values are never
    /// retrievable, so their references stay out.
    pub fn sandbox_env(&self) -> BTreeMap<String, String> {
        self.from_variables.clone()
    }

    pub fn to_prompt(&self) -> String {
        if self.is_empty() {
            return "**Environment Configuration:** none required.\n".to_string();
        }
        let mut out = String::from("**Environment Configuration for Tests:**\n\n");
        if !self.from_secrets.is_empty() {
            out.push_str("**Secrets to Inject (pass to sandbox):**\n");
            for (var, secret) in &self.from_secrets {
                out.push_str(&format!("- {} = {}{}\n", var, SECRET_REF_PREFIX, secret));
            }
            out.push('\n');
        }
        if !self.from_variables.is_empty() {
            out.push_str("**Variables (direct values):**\n");
            for (var, value) in &self.from_variables {
                out.push_str(&format!("- {} = {}\n", var, value));
            }
            out.push('\n');
        }
        if !self.missing.is_empty() {
            out.push_str(&format!(
                "**Missing (not in secrets/variables):** {}\n",
                self.missing.join(", ")
            ));
        }
        out
    }
}

/// Build the env config for `repo` at `git_ref`. Each lookup degrades on its own:
/// no secrets, no variables, or no template still yields a usable (possibly
/// empty) config.
pub async fn build_env_config(gateway: &dyn RepoGateway, repo: &str, git_ref: &str) -> EnvConfig {
    let secrets = gateway.list_secrets(repo).await.unwrap_or_else(|e| {
        warn!(repo, error = %e, "secret listing unavailable");
        Vec::new()
    });
    let variables = gateway.list_variables(repo).await.unwrap_or_else(|e| {
        warn!(repo, error = %e, "variable listing unavailable");
        BTreeMap::new()
    });
    let names = match gateway.read_env_template(repo, git_ref).await {
        Ok(Some(template)) => {
            debug!(repo, file = %template.file, count = template.variables.len(), "env template found");
            template.variables
        }
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(repo, error = %e, "env template lookup failed");
            Vec::new()
        }
    };
    EnvConfig::resolve(&names, secrets, &variables)
}
