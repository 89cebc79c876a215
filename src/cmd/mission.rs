use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use nightwatch::config::NightwatchConfig;
use nightwatch::github::{GitHubClient, is_valid_repo_slug};
use nightwatch::roles::{AgentCommandDelegate, Mission};
use nightwatch::sandbox::{BranchRunner, DockerSandbox};
use nightwatch::sequencer::{Measurement, MissionReport, Sequencer};
use nightwatch::worker::WorkerContext;

use super::render;
use crate::Cli;

/// Defaults, then files, then environment, then flags.
fn resolve_config(cli: &Cli, project_dir: &Path) -> Result<NightwatchConfig, Vec<String>> {
    let mut problems = Vec::new();
    let repo = cli.repo.as_deref().unwrap_or_default();
    if !is_valid_repo_slug(repo) {
        problems.push(format!("--repo must be owner/name, got '{}'", repo));
    }
    let mut config = match NightwatchConfig::load(project_dir) {
        Ok(config) => config,
        Err(e) => {
            problems.push(e.to_string());
            return Err(problems);
        }
    };
    if cli.parallel {
        config.file.dispatch.parallel = true;
    }
    if let Some(workers) = cli.workers {
        config.file.dispatch.workers = workers;
    }
    problems.extend(config.validate());
    if problems.is_empty() { Ok(config) } else { Err(problems) }
}

fn measurement(config: &NightwatchConfig, token: &str) -> Option<Measurement> {
    let gates = &config.file.gates;
    let coverage_command = gates.coverage_command.clone()?;
    let runner = BranchRunner::new(Arc::new(DockerSandbox::connect()), config.sandbox.clone(), token);
    Some(Measurement {
        runner,
        image: None,
        setup: gates.setup.clone(),
        coverage_command,
        mutation_commands: gates
            .mutation_baseline_command
            .clone()
            .zip(gates.mutation_command.clone()),
    })
}

pub async fn run_mission(cli: &Cli, project_dir: &Path) -> Result<ExitCode> {
    let config = match resolve_config(cli, project_dir) {
        Ok(config) => config,
        Err(problems) => {
            render::config_errors(&problems);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut mission = Mission::new(cli.repo.clone().unwrap_or_default(), cli.issue);
    if config.file.dispatch.parallel {
        mission = mission.parallel(config.file.dispatch.workers);
    }
    render::banner(&mission, cli.dry_run);

    if cli.dry_run {
        render::verdict(&MissionReport::dry_run(&mission));
        return Ok(ExitCode::SUCCESS);
    }

    // validate() guarantees a token.
    let token = config.token.clone().unwrap_or_default();
    let gateway = Arc::new(GitHubClient::with_base_url(&token, &config.file.github.api_url));
    let agent = &config.file.agent;
    let mut delegate = AgentCommandDelegate::new(&agent.cmd)
        .with_models(agent.developer_model.clone(), agent.qa_model.clone())
        .with_working_dir(project_dir);
    if let Some(secs) = agent.timeout {
        delegate = delegate.with_timeout(Duration::from_secs(secs));
    }

    let ctx = WorkerContext {
        gateway,
        delegate: Arc::new(delegate),
        settings: config.worker_settings(),
    };
    let mut sequencer = Sequencer::new(ctx, config.sequencer_settings());
    if let Some(m) = measurement(&config, &token) {
        info!(command = %m.coverage_command, "measuring PR coverage in the sandbox");
        sequencer = sequencer.with_measurement(m);
    }

    let report = sequencer.run(&mission).await;
    render::verdict(&report);
    Ok(if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
