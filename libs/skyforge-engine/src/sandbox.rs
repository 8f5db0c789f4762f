/// Primary Sandbox - one isolated container per request
///
/// **Lifecycle per run:**
/// Created → Attached → Started → Running → {Completed | Killed} → Removed
///
/// **Guarantees:**
/// - Output is attached before the container starts, so nothing printed early is lost
/// - stdout/stderr are accumulated concurrently in separate buffers
/// - A wall-clock timer races the wait; on expiry the container is killed
/// - The container is force-removed exactly once on every exit path,
///   including cancellation of the run future (via `ContainerGuard`)
/// - A runtime that cannot be reached at create time is reported as
///   `SandboxUnavailable` so the orchestrator can escalate. Any failure once
///   the container exists is `Internal`.

use crate::command;
use crate::error::{ExecutionError, RuntimeError};
use crate::registry::spec_for;
use crate::runtime::{BollardRuntime, ContainerRuntime, ContainerSpec, OutputChunk, OutputStream};
use crate::tier::{ExecutionTier, TierOutput};
use async_trait::async_trait;
use futures_util::stream::StreamExt;
use skyforge_common::types::{ExecutionRequest, Language, Tier};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Exit code reported when a killed container's status cannot be read
pub const KILLED_EXIT_CODE: i64 = 137;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSettings {
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub user: String,
    pub working_dir: String,
    /// How long buffered output may keep draining after the container stops
    pub flush_grace: Duration,
    /// How long to wait for the exit status after a timeout kill
    pub kill_wait: Duration,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            memory_bytes: 256 * 1024 * 1024,
            nano_cpus: 500_000_000, // 0.5 CPU
            user: "1000:1000".to_string(),
            working_dir: "/workspace".to_string(),
            flush_grace: Duration::from_millis(100),
            kill_wait: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub timed_out: bool,
}

/// Container cleanup guard - removes the container if the run is abandoned
///
/// Armed with the container name before `create` is sent, so a run cancelled
/// while the create call is in flight still removes what the daemon made.
/// The normal paths call `remove()` explicitly, which disarms the guard.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    container_id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, container_ref: String) -> Self {
        Self {
            runtime,
            container_id: container_ref,
            armed: true,
        }
    }

    /// Switch from the name to the id the daemon assigned
    fn bind(&mut self, container_id: &str) {
        self.container_id = container_id.to_string();
    }

    /// Nothing was created; there is nothing to remove
    fn disarm(mut self) {
        self.armed = false;
    }

    async fn remove(mut self) {
        self.armed = false;
        match self.runtime.remove(&self.container_id).await {
            Ok(()) => debug!(container_id = %self.container_id, "Container removed"),
            Err(e) => warn!(container_id = %self.container_id, error = %e, "Failed to remove container"),
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let runtime = self.runtime.clone();
        let container_id = std::mem::take(&mut self.container_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = runtime.remove(&container_id).await {
                        warn!(container_id = %container_id, error = %e, "Failed to cleanup abandoned container");
                    }
                });
            }
            Err(_) => warn!(container_id = %container_id, "No async runtime to cleanup abandoned container"),
        }
    }
}

/// Background task draining the attached stream into two buffers.
/// Aborted on drop so an early error return never leaks the task.
struct OutputCollector {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl OutputCollector {
    fn spawn(mut stream: OutputStream) -> Self {
        let stdout = Arc::new(Mutex::new(Vec::new()));
        let stderr = Arc::new(Mutex::new(Vec::new()));
        let (out, err) = (stdout.clone(), stderr.clone());

        let handle = tokio::spawn(async move {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(OutputChunk::Stdout(bytes)) => out.lock().await.extend_from_slice(&bytes),
                    Ok(OutputChunk::Stderr(bytes)) => err.lock().await.extend_from_slice(&bytes),
                    Err(e) => {
                        warn!(error = %e, "Error reading container output");
                        break;
                    }
                }
            }
        });

        Self {
            stdout,
            stderr,
            handle,
        }
    }

    /// Let the stream close on its own for up to `grace`, then take whatever arrived
    async fn finish(mut self, grace: Duration) -> (String, String) {
        if tokio::time::timeout(grace, &mut self.handle).await.is_err() {
            debug!("Output stream still open after grace period; closing it");
        }
        self.handle.abort();

        // Decode once at the end so multi-byte characters split across frames survive
        let stdout = String::from_utf8_lossy(&self.stdout.lock().await).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr.lock().await).into_owned();
        (stdout, stderr)
    }
}

impl Drop for OutputCollector {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn timeout_notice(timeout: Duration) -> String {
    let ms = timeout.as_millis();
    if ms % 1000 == 0 {
        format!("\nExecution timeout exceeded ({} seconds)", ms / 1000)
    } else {
        format!("\nExecution timeout exceeded ({} ms)", ms)
    }
}

pub struct Sandbox {
    runtime: Arc<dyn ContainerRuntime>,
    settings: SandboxSettings,
}

impl Sandbox {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, settings: SandboxSettings) -> Self {
        Self { runtime, settings }
    }

    /// Sandbox over the local Docker daemon with default limits
    pub fn local() -> Self {
        Self::new(Arc::new(BollardRuntime::connect_local()), SandboxSettings::default())
    }

    /// Run `cmd` in a fresh container from `image`
    #[instrument(skip_all, fields(image = %image, timeout_ms = timeout.as_millis() as u64))]
    pub async fn run(
        &self,
        image: &str,
        cmd: Vec<String>,
        env: Vec<String>,
        timeout: Duration,
    ) -> Result<SandboxOutput, ExecutionError> {
        let spec = ContainerSpec {
            name: format!("skyforge-{}", uuid::Uuid::new_v4()),
            image: image.to_string(),
            cmd,
            env,
            memory_bytes: self.settings.memory_bytes,
            nano_cpus: self.settings.nano_cpus,
            user: self.settings.user.clone(),
            working_dir: self.settings.working_dir.clone(),
        };

        let mut guard = ContainerGuard::new(self.runtime.clone(), spec.name.clone());
        let container_id = match self.runtime.create(&spec).await {
            Ok(id) => id,
            Err(e) => {
                guard.disarm();
                return Err(e.into());
            }
        };
        guard.bind(&container_id);
        debug!(container_id = %container_id, name = %spec.name, "Container created");

        // The program may already have run: nothing after create escalates
        let outcome = self
            .drive(&container_id, timeout)
            .await
            .map_err(|e| ExecutionError::Internal(e.to_string()));
        guard.remove().await;

        if let Err(ref e) = outcome {
            warn!(container_id = %container_id, error = %e, "Sandbox run failed");
        }
        outcome
    }

    async fn drive(&self, container_id: &str, timeout: Duration) -> Result<SandboxOutput, RuntimeError> {
        let stream = self.runtime.attach(container_id).await?;
        let collector = OutputCollector::spawn(stream);

        self.runtime.start(container_id).await?;
        let started = Instant::now();

        let waited = tokio::select! {
            status = self.runtime.wait(container_id) => Some(status),
            _ = tokio::time::sleep(timeout) => None,
        };

        let (exit_code, timed_out) = match waited {
            Some(status) => (status?, false),
            None => self.kill_after_timeout(container_id, timeout).await,
        };

        let (stdout, mut stderr) = collector.finish(self.settings.flush_grace).await;
        if timed_out {
            stderr.push_str(&timeout_notice(timeout));
        }

        info!(
            container_id = %container_id,
            exit_code = exit_code,
            timed_out = timed_out,
            execution_ms = started.elapsed().as_millis() as u64,
            "Container finished"
        );

        Ok(SandboxOutput {
            stdout,
            stderr,
            exit_code,
            timed_out,
        })
    }

    /// Kill a container whose deadline passed, returning `(exit_code, timed_out)`.
    /// A failed kill whose follow-up wait shows a normal exit means the program
    /// finished on its own just as the timer fired.
    async fn kill_after_timeout(&self, container_id: &str, timeout: Duration) -> (i64, bool) {
        warn!(
            container_id = %container_id,
            timeout_ms = timeout.as_millis() as u64,
            "Execution timed out - killing container"
        );
        let killed = match self.runtime.kill(container_id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "Failed to kill timed-out container");
                false
            }
        };

        match tokio::time::timeout(self.settings.kill_wait, self.runtime.wait(container_id)).await {
            Ok(Ok(code)) => (code, killed || code == KILLED_EXIT_CODE),
            _ => (KILLED_EXIT_CODE, true),
        }
    }

    /// Whether each language's image is present locally.
    /// All false when the daemon cannot be reached.
    pub async fn image_availability(&self) -> BTreeMap<Language, bool> {
        let tags = match self.runtime.list_image_tags().await {
            Ok(tags) => tags,
            Err(e) => {
                warn!(error = %e, "Could not list sandbox images");
                Vec::new()
            }
        };
        Language::ALL
            .iter()
            .map(|lang| (*lang, tags.iter().any(|tag| tag == spec_for(*lang).image)))
            .collect()
    }
}

#[async_trait]
impl ExecutionTier for Sandbox {
    fn tier(&self) -> Tier {
        Tier::Primary
    }

    async fn attempt(&self, request: &ExecutionRequest) -> Result<TierOutput, ExecutionError> {
        let spec = spec_for(request.language);
        let cmd = command::build(request.language, &request.source_code);
        let env = spec.env.iter().map(|var| var.to_string()).collect();

        let output = self
            .run(spec.image, cmd, env, Duration::from_millis(request.timeout_ms))
            .await?;

        Ok(TierOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            timed_out: output.timed_out,
        })
    }
}
