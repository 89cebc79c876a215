use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::exec::StartExecResults;
use bollard::models::{ContainerCreateBody, ExecConfig, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptionsBuilder, CreateImageOptionsBuilder, RemoveContainerOptionsBuilder,
    StartContainerOptions, StopContainerOptionsBuilder, UploadToContainerOptionsBuilder,
};
use futures::{StreamExt, TryStreamExt};
use tracing::{debug, info, warn};

use super::config::parse_memory_limit;
use super::{ExecutionRequest, ExecutionResult, SandboxBackend};
use crate::errors::SandboxError;

const WORKDIR: &str = "/app";
const STOP_GRACE_SECS: i32 = 5;

/// Docker-backed sandbox. One container per `execute` call.
pub struct DockerSandbox {
    docker: Result<Docker, String>,
}

/// How the in-container process ended.
enum ExecOutcome {
    Exited {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },
    TimedOut {
        stdout: String,
        stderr: String,
    },
}

impl DockerSandbox {
    /// Connect using the local defaults (`DOCKER_HOST` or the platform socket).
    /// A failed connection is remembered and reported by every `execute`.
    pub fn connect() -> Self {
        let docker = Docker::connect_with_local_defaults().map_err(|e| e.to_string());
        if let Err(ref e) = docker {
            warn!(error = %e, "docker client could not be created");
        }
        Self { docker }
    }

    async fn available(&self) -> Result<&Docker, SandboxError> {
        let docker = self
            .docker
            .as_ref()
            .map_err(|e| SandboxError::Unavailable(e.clone()))?;
        docker
            .ping()
            .await
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        Ok(docker)
    }

    async fn ensure_image(docker: &Docker, image: &str) -> Result<(), SandboxError> {
        if docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }
        info!(image, "pulling sandbox image");
        let options = CreateImageOptionsBuilder::default().from_image(image).build();
        docker
            .create_image(Some(options), None, None)
            .try_collect::<Vec<_>>()
            .await
            .map_err(|e| SandboxError::Provision {
                image: image.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn provision(docker: &Docker, req: &ExecutionRequest) -> Result<String, SandboxError> {
        Self::ensure_image(docker, &req.image).await?;

        let memory = parse_memory_limit(&req.memory)?;
        let binds: Vec<String> = req
            .volumes
            .iter()
            .map(|(volume, path)| format!("{}:{}", volume, path))
            .collect();
        let env: Vec<String> = req.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();

        let body = ContainerCreateBody {
            image: Some(req.image.clone()),
            cmd: Some(vec!["tail".into(), "-f".into(), "/dev/null".into()]),
            working_dir: Some(WORKDIR.into()),
            env: Some(env),
            host_config: Some(HostConfig {
                memory: Some(memory),
                nano_cpus: Some((req.cpus * 1e9) as i64),
                network_mode: Some(req.network.clone()),
                binds: (!binds.is_empty()).then_some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };
        let name = format!("nightwatch-sandbox-{}", uuid::Uuid::new_v4().simple());
        let options = CreateContainerOptionsBuilder::default().name(&name).build();

        let created = docker
            .create_container(Some(options), body)
            .await
            .map_err(|e| SandboxError::Provision {
                image: req.image.clone(),
                message: e.to_string(),
            })?;

        if let Err(e) = docker
            .start_container(&created.id, None::<StartContainerOptions>)
            .await
        {
            Self::teardown(docker, &created.id).await;
            return Err(SandboxError::Provision {
                image: req.image.clone(),
                message: e.to_string(),
            });
        }
        info!(container = %short_id(&created.id), image = %req.image, "sandbox container started");
        Ok(created.id)
    }

    async fn upload_files(
        docker: &Docker,
        id: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<(), SandboxError> {
        if files.is_empty() {
            return Ok(());
        }
        let archive = build_archive(files)?;
        let options = UploadToContainerOptionsBuilder::default().path(WORKDIR).build();
        docker
            .upload_to_container(id, Some(options), bollard::body_full(archive.into()))
            .await?;
        debug!(container = %short_id(id), files = files.len(), "files injected");
        Ok(())
    }

    async fn run_script(
        docker: &Docker,
        id: &str,
        req: &ExecutionRequest,
    ) -> Result<ExecOutcome, SandboxError> {
        Self::upload_files(docker, id, &req.files).await?;

        let exec = docker
            .create_exec(
                id,
                ExecConfig {
                    cmd: Some(vec!["sh".into(), "-c".into(), req.script()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: Some(WORKDIR.into()),
                    ..Default::default()
                },
            )
            .await?;

        let StartExecResults::Attached { mut output, .. } = docker.start_exec(&exec.id, None).await?
        else {
            return Err(SandboxError::Exec("exec started detached".into()));
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        let collect = async {
            while let Some(chunk) = output.next().await {
                match chunk? {
                    LogOutput::StdOut { message } => {
                        stdout.push_str(&String::from_utf8_lossy(&message))
                    }
                    LogOutput::StdErr { message } => {
                        stderr.push_str(&String::from_utf8_lossy(&message))
                    }
                    _ => {}
                }
            }
            Ok::<(), bollard::errors::Error>(())
        };

        let finished = tokio::time::timeout(req.timeout, collect).await;
        match finished {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Ok(ExecOutcome::TimedOut { stdout, stderr }),
        }

        let exit_code = docker.inspect_exec(&exec.id).await?.exit_code.unwrap_or(-1);
        Ok(ExecOutcome::Exited {
            exit_code,
            stdout,
            stderr,
        })
    }

    /// Stop then force-remove. Failures are logged, never raised.
    async fn teardown(docker: &Docker, id: &str) {
        let stop = StopContainerOptionsBuilder::default().t(STOP_GRACE_SECS).build();
        if let Err(e) = docker.stop_container(id, Some(stop)).await {
            debug!(container = %short_id(id), error = %e, "stop failed, removing anyway");
        }
        let remove = RemoveContainerOptionsBuilder::default().force(true).build();
        match docker.remove_container(id, Some(remove)).await {
            Ok(()) => info!(container = %short_id(id), "sandbox container removed"),
            Err(e) => warn!(container = %short_id(id), error = %e, "sandbox cleanup failed"),
        }
    }
}

#[async_trait]
impl SandboxBackend for DockerSandbox {
    async fn execute(&self, req: &ExecutionRequest) -> ExecutionResult {
        let started = Instant::now();

        let docker = match self.available().await {
            Ok(docker) => docker,
            Err(e) => {
                warn!(error = %e, "docker unavailable, not provisioning");
                return ExecutionResult::error(e.to_string(), Duration::ZERO);
            }
        };

        let id = match Self::provision(docker, req).await {
            Ok(id) => id,
            Err(e) => return ExecutionResult::error(e.to_string(), started.elapsed()),
        };

        let outcome = Self::run_script(docker, &id, req).await;
        Self::teardown(docker, &id).await;

        match outcome {
            Ok(ExecOutcome::Exited {
                exit_code,
                stdout,
                stderr,
            }) => ExecutionResult::completed(exit_code, &stdout, &stderr, started.elapsed(), req.limits),
            Ok(ExecOutcome::TimedOut { stdout, stderr }) => {
                warn!(timeout_secs = req.timeout.as_secs(), "sandbox command timed out");
                ExecutionResult::timed_out(&stdout, &stderr, started.elapsed(), req.timeout, req.limits)
            }
            Err(e) => ExecutionResult::error(format!("Sandbox error: {}", e), started.elapsed()),
        }
    }
}

/// Pack `files` into an uncompressed tar archive rooted at the upload path.
fn build_archive(files: &BTreeMap<String, String>) -> Result<Vec<u8>, SandboxError> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        builder
            .append_data(&mut header, path.trim_start_matches('/'), content.as_bytes())
            .map_err(SandboxError::Archive)?;
    }
    builder.into_inner().map_err(SandboxError::Archive)
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_build_archive_contains_every_file() {
        let files = BTreeMap::from([
            ("app.py".to_string(), "def add(a, b):\n    return a + b\n".to_string()),
            ("/tests/test_app.py".to_string(), "from app import add\n".to_string()),
        ]);
        let bytes = build_archive(&files).unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut seen = BTreeMap::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut content = String::new();
            entry.read_to_string(&mut content).unwrap();
            seen.insert(path, content);
        }
        assert_eq!(seen.len(), 2);
        assert!(seen["app.py"].contains("return a + b"));
        assert_eq!(seen["tests/test_app.py"], "from app import add\n");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_id("abc"), "abc");
    }
}
