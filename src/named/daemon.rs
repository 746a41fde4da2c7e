//! Supervision of the external `named` process.
//!
//! A single supervisor task owns the child process. Reload and shutdown
//! requests are sent to it over a channel and handled one at a time, so the
//! previous instance has always been reaped before a new one is spawned and
//! at most one instance is ever live.

use crate::config::ManagerConfig;
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

const REQUEST_QUEUE: usize = 16;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to stop daemon: {0}")]
    Kill(#[source] io::Error),

    #[error("daemon supervisor is not running")]
    SupervisorStopped,
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Lifecycle of the supervised instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonState {
    /// Nothing has been started yet
    Idle,
    Starting,
    Running,
    Terminating,
    Exited,
}

/// Snapshot published by the supervisor after every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonStatus {
    pub state: DaemonState,
    pub pid: Option<u32>,
    /// Sequence number of the current or last instance, starting at 1
    pub instance: u64,
}

impl DaemonStatus {
    /// Number of instances currently alive, never more than one
    pub fn live_instances(&self) -> usize {
        match self.state {
            DaemonState::Running | DaemonState::Terminating => 1,
            _ => 0,
        }
    }
}

/// Program and arguments used to start the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl DaemonCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `named -g -c <named.conf> -u <user>`, logging to stderr in the foreground
    pub fn named(config: &ManagerConfig) -> Self {
        Self::new(&config.named_bin)
            .arg("-g")
            .arg("-c")
            .arg(config.named_conf_path())
            .arg("-u")
            .arg(&config.run_as_user)
    }
}

enum Request {
    Reload(oneshot::Sender<Result<()>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

/// Handle to the supervisor task.
///
/// Dropping the last handle stops the supervisor, which terminates any
/// running instance.
pub struct DaemonController {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<DaemonStatus>,
}

impl DaemonController {
    /// Start the supervisor task; no daemon runs until the first reload
    pub fn spawn(command: DaemonCommand) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_QUEUE);
        let (status_tx, status_rx) = watch::channel(DaemonStatus {
            state: DaemonState::Idle,
            pid: None,
            instance: 0,
        });

        let supervisor = Supervisor {
            command,
            requests: requests_rx,
            status: status_tx,
            current: None,
            instances: 0,
        };
        tokio::spawn(supervisor.run());

        Self {
            requests: requests_tx,
            status: status_rx,
        }
    }

    /// Stop the running instance, if any, and start a new one
    pub async fn reload(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Reload(tx)).await?;
        rx.await.map_err(|_| DaemonError::SupervisorStopped)?
    }

    /// Stop the running instance without starting another
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Shutdown(tx)).await?;
        rx.await.map_err(|_| DaemonError::SupervisorStopped)?
    }

    pub fn status(&self) -> DaemonStatus {
        self.status.borrow().clone()
    }

    /// Watch status transitions
    pub fn subscribe(&self) -> watch::Receiver<DaemonStatus> {
        self.status.clone()
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| DaemonError::SupervisorStopped)
    }
}

struct Instance {
    id: u64,
    pid: Option<u32>,
    child: Child,
}

struct Supervisor {
    command: DaemonCommand,
    requests: mpsc::Receiver<Request>,
    status: watch::Sender<DaemonStatus>,
    current: Option<Instance>,
    instances: u64,
}

impl Supervisor {
    async fn run(mut self) {
        debug!("Daemon supervisor started");
        loop {
            tokio::select! {
                request = self.requests.recv() => match request {
                    Some(Request::Reload(reply)) => {
                        let result = self.reload().await;
                        let _ = reply.send(result);
                    }
                    Some(Request::Shutdown(reply)) => {
                        let result = self.stop("Shutdown").await;
                        let _ = reply.send(result);
                    }
                    None => {
                        if let Err(e) = self.stop("Controller dropped").await {
                            error!("Failed to stop named: {}", e);
                        }
                        break;
                    }
                },
                exit = wait_for_exit(&mut self.current) => self.on_exit(exit),
            }
        }
        debug!("Daemon supervisor stopped");
    }

    async fn reload(&mut self) -> Result<()> {
        self.stop("Reload").await?;
        self.start()
    }

    fn start(&mut self) -> Result<()> {
        self.instances += 1;
        let id = self.instances;
        self.publish(DaemonState::Starting, None, id);

        let spawned = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(source) => {
                error!(
                    "Failed to start {}: {}",
                    self.command.program.display(),
                    source
                );
                self.publish(DaemonState::Exited, None, id);
                return Err(DaemonError::Spawn {
                    program: self.command.program.clone(),
                    source,
                });
            }
        };

        let pid = child.id();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_logs(id, stderr));
        }
        self.current = Some(Instance { id, pid, child });
        self.publish(DaemonState::Running, pid, id);
        info!("Started named instance {} (pid {:?})", id, pid);
        Ok(())
    }

    /// Terminate the current instance and wait until it has been reaped
    async fn stop(&mut self, reason: &str) -> Result<()> {
        let Some(mut instance) = self.current.take() else {
            return Ok(());
        };
        self.publish(DaemonState::Terminating, instance.pid, instance.id);

        if let Err(e) = instance.child.start_kill() {
            error!("Failed to kill named instance {}: {}", instance.id, e);
            self.publish(DaemonState::Running, instance.pid, instance.id);
            self.current = Some(instance);
            return Err(DaemonError::Kill(e));
        }

        match instance.child.wait().await {
            Ok(status) => info!("{} named instance {} ({})", reason, instance.id, status),
            Err(e) => warn!(
                "{} named instance {}, but waiting for it failed: {}",
                reason, instance.id, e
            ),
        }
        self.publish(DaemonState::Exited, None, instance.id);
        Ok(())
    }

    /// The instance exited without being asked to; it is not restarted
    fn on_exit(&mut self, exit: io::Result<ExitStatus>) {
        let Some(instance) = self.current.take() else {
            return;
        };
        match exit {
            Ok(status) if status.success() => {
                info!("named instance {} exited ({})", instance.id, status)
            }
            Ok(status) => warn!("named instance {} exited ({})", instance.id, status),
            Err(e) => error!("Failed waiting for named instance {}: {}", instance.id, e),
        }
        self.publish(DaemonState::Exited, None, instance.id);
    }

    fn publish(&self, state: DaemonState, pid: Option<u32>, instance: u64) {
        self.status.send_replace(DaemonStatus {
            state,
            pid,
            instance,
        });
    }
}

async fn wait_for_exit(current: &mut Option<Instance>) -> io::Result<ExitStatus> {
    match current {
        Some(instance) => instance.child.wait().await,
        None => std::future::pending().await,
    }
}

async fn forward_logs(instance: u64, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => info!(target: "named", "[{}] {}", instance, line),
            Ok(None) => break,
            Err(e) => {
                warn!(target: "named", "[{}] Failed reading daemon output: {}", instance, e);
                break;
            }
        }
    }
}
