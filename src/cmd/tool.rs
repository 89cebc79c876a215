use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use console::style;

use nightwatch::config::NightwatchConfig;
use nightwatch::github::{GitHubClient, is_valid_repo_slug};
use nightwatch::roles::tools::ROLE_ENV;
use nightwatch::roles::{Role, ToolCall, ToolRunner, ToolSet};
use nightwatch::sandbox::{BranchRunner, DockerSandbox};

use super::render;
use crate::ToolArgs;

fn fail(message: impl std::fmt::Display) -> Result<ExitCode> {
    eprintln!("{} {}", style("Error:").red().bold(), message);
    Ok(ExitCode::FAILURE)
}

/// Parse, authorize and run one tool call. The result goes to stdout for the
/// calling agent; every failure exits 1 with the reason on stderr.
pub async fn run_tool(args: &ToolArgs, project_dir: &Path) -> Result<ExitCode> {
    let raw_role = args.role.clone().or_else(|| std::env::var(ROLE_ENV).ok());
    let Some(raw_role) = raw_role else {
        return fail(format!("--role or {} is required", ROLE_ENV));
    };
    let Some(role) = Role::parse(&raw_role) else {
        return fail(format!("unknown role '{}', expected developer or qa", raw_role));
    };
    if !is_valid_repo_slug(&args.repo) {
        return fail(format!("--repo must be owner/name, got '{}'", args.repo));
    }
    let call = match ToolCall::parse(&args.name, &args.input) {
        Ok(call) => call,
        Err(e) => return fail(e),
    };

    let config = match NightwatchConfig::load(project_dir) {
        Ok(config) => config,
        Err(e) => {
            render::config_errors(&[e.to_string()]);
            return Ok(ExitCode::FAILURE);
        }
    };
    let gates = &config.file.gates;
    if let Err(e) = ToolSet::for_role(role, gates.require_mutation).check(call.tool()) {
        return fail(e);
    }
    let problems = config.validate();
    if !problems.is_empty() {
        render::config_errors(&problems);
        return Ok(ExitCode::FAILURE);
    }

    // validate() guarantees a token.
    let token = config.token.clone().unwrap_or_default();
    let gateway = Arc::new(GitHubClient::with_base_url(&token, &config.file.github.api_url));
    let branches = BranchRunner::new(Arc::new(DockerSandbox::connect()), config.sandbox.clone(), token.as_str());
    let runner = ToolRunner::new(gateway, branches)
        .with_base_branch(config.file.github.base_branch.clone())
        .with_ci(
            Duration::from_secs(gates.ci_poll_interval),
            Duration::from_secs(gates.ci_timeout),
        )
        .with_min_mutation_score(gates.min_mutation_score);

    match runner.run(&args.repo, call).await {
        Ok(output) => {
            println!("{}", output);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => fail(e),
    }
}
