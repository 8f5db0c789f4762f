/// Container Runtime - the narrow surface the sandbox needs from Docker
///
/// The sandbox lifecycle (attach before start, timeout race, forced removal)
/// lives in `sandbox.rs` and only talks to this trait, so it can be driven
/// by an in-memory runtime in tests. `BollardRuntime` is the production
/// implementation over the local Docker daemon.

use crate::error::RuntimeError;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, Config, CreateContainerOptions, KillContainerOptions, LogOutput,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::ListImagesOptions;
use bollard::Docker;
use futures_util::stream::{BoxStream, StreamExt};
use tracing::{debug, warn};

/// Everything needed to create one sandbox container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    pub env: Vec<String>,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub user: String,
    pub working_dir: String,
}

/// One demultiplexed frame of container output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

pub type OutputStream = BoxStream<'static, Result<OutputChunk, RuntimeError>>;

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a stopped container, returning its id
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError>;

    /// Attach to the container's stdout/stderr. Must be called before `start`.
    async fn attach(&self, container_id: &str) -> Result<OutputStream, RuntimeError>;

    async fn start(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Block until the container stops, returning its exit code
    async fn wait(&self, container_id: &str) -> Result<i64, RuntimeError>;

    async fn kill(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Forced removal; succeeds for running containers too
    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError>;

    /// Every `repo:tag` present locally
    async fn list_image_tags(&self) -> Result<Vec<String>, RuntimeError>;
}

/// Docker-backed runtime using Bollard
///
/// Connecting never fails eagerly: a missing daemon is reported as
/// `RuntimeError::Unreachable` on first use so callers can fall back.
pub struct BollardRuntime {
    docker: Result<Docker, RuntimeError>,
}

impl BollardRuntime {
    pub fn connect_local() -> Self {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            warn!(error = %e, "Docker client could not be initialised");
            RuntimeError::from(e)
        });
        Self { docker }
    }

    fn client(&self) -> Result<&Docker, RuntimeError> {
        self.docker.as_ref().map_err(|e| e.clone())
    }
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let docker = self.client()?;

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.cmd.clone()),
            env: Some(spec.env.clone()),
            user: Some(spec.user.clone()),
            working_dir: Some(spec.working_dir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(bollard::models::HostConfig {
                memory: Some(spec.memory_bytes),
                nano_cpus: Some(spec.nano_cpus),
                network_mode: Some("none".to_string()),
                cap_drop: Some(vec!["ALL".to_string()]),
                security_opt: Some(vec!["no-new-privileges".to_string()]),
                readonly_rootfs: Some(false), // compilers write next to the source
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let created = docker.create_container(Some(options), config).await?;
        for warning in &created.warnings {
            debug!(container_id = %created.id, warning = %warning, "Docker create warning");
        }
        Ok(created.id)
    }

    async fn attach(&self, container_id: &str) -> Result<OutputStream, RuntimeError> {
        let docker = self.client()?;

        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };

        let attached = docker.attach_container(container_id, Some(options)).await?;
        let stream = attached
            .output
            .filter_map(|frame| async move {
                match frame {
                    Ok(LogOutput::StdOut { message }) => Some(Ok(OutputChunk::Stdout(message.to_vec()))),
                    Ok(LogOutput::StdErr { message }) => Some(Ok(OutputChunk::Stderr(message.to_vec()))),
                    // No TTY is allocated, so console frames should not appear
                    Ok(LogOutput::Console { message }) => Some(Ok(OutputChunk::Stdout(message.to_vec()))),
                    Ok(LogOutput::StdIn { .. }) => None,
                    Err(e) => Some(Err(RuntimeError::from(e))),
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn start(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.client()?
            .start_container(container_id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn wait(&self, container_id: &str) -> Result<i64, RuntimeError> {
        let mut stream = self
            .client()?
            .wait_container(container_id, None::<WaitContainerOptions<String>>);

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Bollard reports a non-zero exit as an error carrying the code
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(e.into()),
            None => Err(RuntimeError::Failed(
                "wait stream ended without an exit status".to_string(),
            )),
        }
    }

    async fn kill(&self, container_id: &str) -> Result<(), RuntimeError> {
        self.client()?
            .kill_container(container_id, None::<KillContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn remove(&self, container_id: &str) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        self.client()?
            .remove_container(container_id, Some(options))
            .await?;
        Ok(())
    }

    async fn list_image_tags(&self) -> Result<Vec<String>, RuntimeError> {
        let options = ListImagesOptions::<String> {
            all: false,
            ..Default::default()
        };
        let images = self.client()?.list_images(Some(options)).await?;
        Ok(images.into_iter().flat_map(|image| image.repo_tags).collect())
    }
}
