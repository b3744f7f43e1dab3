//! 后端进程管理：启动、健康检查、停止。
//!
//! # Backend process supervisor
//!
//! [`BackendSupervisor`] owns one backend process and the REST/stream clients
//! bound to its port. Only the owner starts or stops the process; both are
//! serialized by a lifecycle lock.
//!
//! ```text
//! Stopped ──start──▶ Starting ──healthy──▶ Running ──stop──▶ Stopping ──▶ Stopped
//!                        │                    │
//!                        └─exit/timeout──▶ Failed ◀──crash detected
//! ```
//!
//! Every exit path (stop, failed start, crash detection, drop) closes the
//! open event streams and releases the child. The child is spawned with
//! `kill_on_drop`, so an abandoned supervisor never leaves the process behind.

mod config;
mod process_log;

pub use config::{BackendConfig, DEFAULT_COMMAND, DEFAULT_PORT, LOOPBACK};
pub use process_log::{ProcessLog, DEFAULT_LOG_LINES};

use crate::client::{OpencodeClient, OpencodeClientBuilder};
use crate::error::ProcessError;
use crate::resilience::RetryPolicy;
use crate::stream::EventStreamClient;
use crate::types::HealthResponse;
use crate::{Error, Result};
use arc_swap::ArcSwapOption;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const EARLY_EXIT_TAIL: usize = 20;
const DRAIN_SETTLE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Result of a successful [`BackendSupervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Started { port: u16, version: String },
    /// A live process was already owned; nothing was spawned.
    AlreadyRunning { port: u16 },
}

/// Clients bound to the running process.
#[derive(Clone)]
pub struct BackendConnection {
    pub port: u16,
    pub base_url: String,
    pub client: OpencodeClient,
    pub events: Arc<EventStreamClient>,
}

struct OwnedProcess {
    child: Child,
    drains: Vec<JoinHandle<()>>,
}

pub struct BackendSupervisor {
    config: BackendConfig,
    lifecycle: Mutex<Option<OwnedProcess>>,
    bound: ArcSwapOption<BackendConnection>,
    state: watch::Sender<SupervisorState>,
    log: Arc<ProcessLog>,
}

impl BackendSupervisor {
    pub fn new(config: BackendConfig) -> Self {
        let (state, _) = watch::channel(SupervisorState::Stopped);
        Self {
            config,
            lifecycle: Mutex::new(None),
            bound: ArcSwapOption::empty(),
            state,
            log: Arc::new(ProcessLog::default()),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Port of the running process.
    pub fn port(&self) -> Option<u16> {
        self.bound.load_full().map(|c| c.port)
    }

    pub fn connection(&self) -> Option<BackendConnection> {
        self.bound.load_full().map(|c| (*c).clone())
    }

    /// REST client bound to the running process.
    pub fn client(&self) -> Result<OpencodeClient> {
        self.connection().map(|c| c.client).ok_or(Error::NotRunning)
    }

    /// Stream client bound to the running process.
    pub fn events(&self) -> Result<Arc<EventStreamClient>> {
        self.connection().map(|c| c.events).ok_or(Error::NotRunning)
    }

    /// Last `n` lines of backend output.
    pub fn recent_logs(&self, n: usize) -> Vec<String> {
        self.log.tail(n)
    }

    /// Whether an owned process is alive. A process found dead is reaped and its clients closed.
    pub async fn is_running(&self) -> bool {
        let Ok(mut slot) = self.lifecycle.try_lock() else {
            // start/stop in progress
            return self.state() == SupervisorState::Running;
        };
        let Some(owned) = slot.as_mut() else {
            return false;
        };
        match owned.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(%status, "backend exited unexpectedly");
                self.release(slot.take());
                self.state.send_replace(SupervisorState::Failed);
                false
            }
            Err(e) => {
                warn!(error = %e, "could not poll backend process");
                self.release(slot.take());
                self.state.send_replace(SupervisorState::Failed);
                false
            }
        }
    }

    /// Start unless a live process is already owned.
    pub async fn ensure_started(&self) -> Result<BackendConnection> {
        self.start().await?;
        self.connection().ok_or(Error::NotRunning)
    }

    /// Spawn the backend and wait until its health check succeeds.
    pub async fn start(&self) -> Result<StartOutcome> {
        let mut slot = self.lifecycle.lock().await;

        if let Some(owned) = slot.as_mut() {
            if matches!(owned.child.try_wait(), Ok(None)) {
                debug!(port = self.config.port, "backend already running");
                return Ok(StartOutcome::AlreadyRunning {
                    port: self.config.port,
                });
            }
            warn!("previous backend process is gone, restarting");
            self.release(slot.take());
        }

        self.state.send_replace(SupervisorState::Starting);
        self.log.clear();
        let port = self.config.port;
        info!(command = %self.config.command, port, "starting backend");

        let mut cmd = Command::new(&self.config.command);
        cmd.args(self.config.serve_args())
            .envs(&self.config.extra_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                self.state.send_replace(SupervisorState::Failed);
                warn!(command = %self.config.command, error = %source, "backend launch failed");
                return Err(ProcessError::LaunchFailure {
                    command: self.config.command.clone(),
                    source,
                }
                .into());
            }
        };

        // Piped output must always be drained or the backend can block on a full pipe.
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(stdout, self.log.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(stderr, self.log.clone()));
        }
        let mut owned = OwnedProcess { child, drains };

        let connection = match self.bind_clients(port) {
            Ok(c) => c,
            Err(e) => {
                self.state.send_replace(SupervisorState::Failed);
                terminate(owned, Duration::ZERO).await.ok();
                return Err(e);
            }
        };

        match self.wait_for_ready(&mut owned, &connection.base_url).await {
            Ok(health) => {
                info!(port, version = %health.version, "backend started");
                self.bound.store(Some(Arc::new(connection)));
                *slot = Some(owned);
                self.state.send_replace(SupervisorState::Running);
                Ok(StartOutcome::Started {
                    port,
                    version: health.version,
                })
            }
            Err(e) => {
                warn!(port, error = %e, "backend failed to become healthy");
                connection.events.close_all();
                if let Err(kill_err) = terminate(owned, Duration::ZERO).await {
                    warn!(error = %kill_err, "failed to kill unhealthy backend");
                }
                self.state.send_replace(SupervisorState::Failed);
                Err(e.into())
            }
        }
    }

    /// Stop the owned process: graceful signal, then a forced kill after `stop_grace`.
    ///
    /// Returns `false` when nothing was running.
    pub async fn stop(&self) -> Result<bool> {
        let mut slot = self.lifecycle.lock().await;
        let Some(owned) = slot.take() else {
            self.state.send_replace(SupervisorState::Stopped);
            return Ok(false);
        };

        self.state.send_replace(SupervisorState::Stopping);
        if let Some(conn) = self.bound.swap(None) {
            conn.events.close_all();
        }
        let result = terminate(owned, self.config.stop_grace).await;
        self.state.send_replace(SupervisorState::Stopped);
        info!(port = self.config.port, "backend stopped");
        result.map(|_| true).map_err(Error::from)
    }

    fn bind_clients(&self, port: u16) -> Result<BackendConnection> {
        let base_url = self.config.base_url();
        let client = OpencodeClientBuilder::from_config(self.config.client.clone())
            .base_url(base_url.clone())
            .build()?;
        let events = EventStreamClient::new(
            &base_url,
            &self.config.client.transport,
            self.config.client.retry.clone(),
        )?;
        Ok(BackendConnection {
            port,
            base_url,
            client,
            events: Arc::new(events),
        })
    }

    /// Poll health until it succeeds, the process exits, or the startup timeout passes.
    async fn wait_for_ready(
        &self,
        owned: &mut OwnedProcess,
        base_url: &str,
    ) -> std::result::Result<HealthResponse, ProcessError> {
        let timeout = self.config.startup_timeout;
        let check_timeout = self
            .config
            .health_poll_interval
            .max(Duration::from_millis(500))
            .min(timeout.max(Duration::from_millis(1)));
        let checker = OpencodeClientBuilder::from_config(self.config.client.clone())
            .base_url(base_url)
            .request_timeout(check_timeout)
            .connect_timeout(check_timeout)
            .retry_policy(RetryPolicy::none())
            .build()
            .map_err(|e| ProcessError::HealthTimeout {
                timeout_ms: 0,
                last_error: Some(e.to_string()),
            })?;

        let deadline = Instant::now() + timeout;
        let mut last_error: Option<String> = None;
        loop {
            if let Some(status) = owned.child.try_wait()? {
                settle_drains(&mut owned.drains).await;
                return Err(ProcessError::ExitedEarly {
                    status: status.to_string(),
                    log_tail: self.log.tail(EARLY_EXIT_TAIL),
                });
            }

            match checker.health().await {
                Ok(health) if health.healthy => return Ok(health),
                Ok(_) => last_error = Some("backend reported unhealthy".to_string()),
                Err(e) => last_error = Some(e.to_string()),
            }

            if Instant::now() >= deadline {
                return Err(ProcessError::HealthTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    last_error,
                });
            }
            tokio::time::sleep(self.config.health_poll_interval).await;
        }
    }

    fn release(&self, owned: Option<OwnedProcess>) {
        if let Some(conn) = self.bound.swap(None) {
            conn.events.close_all();
        }
        if let Some(mut owned) = owned {
            // kill_on_drop covers the case where the process is still alive.
            owned.child.start_kill().ok();
        }
    }
}

impl Drop for BackendSupervisor {
    fn drop(&mut self) {
        if let Some(conn) = self.bound.swap(None) {
            conn.events.close_all();
        }
    }
}

fn spawn_drain<R>(reader: R, log: Arc<ProcessLog>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(target: "opencode::backend", "{}", line);
            log.push(line);
        }
    })
}

/// Give the output readers a moment to pick up the last lines of an exited process.
async fn settle_drains(drains: &mut Vec<JoinHandle<()>>) {
    for handle in drains.iter_mut() {
        tokio::time::timeout(DRAIN_SETTLE, handle).await.ok();
    }
}

async fn terminate(mut owned: OwnedProcess, grace: Duration) -> std::result::Result<(), ProcessError> {
    if let Ok(Some(status)) = owned.child.try_wait() {
        debug!(%status, "backend already exited");
        return Ok(());
    }
    if !grace.is_zero() && request_graceful_exit(&owned.child) {
        if let Ok(waited) = tokio::time::timeout(grace, owned.child.wait()).await {
            let status = waited?;
            debug!(%status, "backend exited after termination signal");
            return Ok(());
        }
        warn!(grace_ms = grace.as_millis() as u64, "backend ignored termination signal, killing");
    }

    let killed = owned.child.kill().await;
    for handle in owned.drains.drain(..) {
        handle.abort();
    }
    killed.map_err(ProcessError::from)
}

#[cfg(unix)]
fn request_graceful_exit(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) => true,
        Err(errno) => {
            warn!(pid, error = %errno, "failed to send SIGTERM");
            false
        }
    }
}

#[cfg(not(unix))]
fn request_graceful_exit(_child: &Child) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_supervisor_reports_not_running() {
        let sup = BackendSupervisor::new(BackendConfig::default());
        assert_eq!(sup.state(), SupervisorState::Stopped);
        assert!(!sup.is_running().await);
        assert!(sup.port().is_none());
        assert!(matches!(sup.client(), Err(Error::NotRunning)));
        assert!(!sup.stop().await.unwrap());
    }

    #[tokio::test]
    async fn missing_binary_is_a_launch_failure() {
        let sup = BackendSupervisor::new(
            BackendConfig::default().with_command("/nonexistent/opencode-binary-for-tests"),
        );
        let err = sup.start().await.unwrap_err();
        match err {
            Error::Process(ProcessError::LaunchFailure { command, .. }) => {
                assert!(command.contains("opencode-binary-for-tests"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sup.state(), SupervisorState::Failed);
        assert!(!sup.is_running().await);
    }
}
