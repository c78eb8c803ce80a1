//! Daemon process supervision
//!
//! A [`DaemonSupervisor`] owns at most one daemon process at a time. Every
//! spawned process gets a generation number and a monitor task that waits
//! for it to exit. Exits of the current generation that were not requested
//! through [`DaemonSupervisor::stop`] count as crashes and drive the
//! restart policy.

use parking_lot::Mutex;
use serde_json::{Map, Value as JsonValue};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use studio_ipc::{DaemonCommand, IpcChannel, IpcError, LineReader, ResponsePayload};

use crate::config::SupervisorConfig;
use crate::crash::{restart_delay, CrashState};

/// Externally visible lifecycle state of the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonStatus {
    Stopped,
    Running {
        pid: Option<u32>,
    },
    /// Waiting out the backoff before restart number `attempt`
    Restarting {
        attempt: u32,
        delay: Duration,
    },
    /// Auto-restart gave up. Cleared by `reset_crash_count` or `start`.
    CrashLimitExceeded {
        crashes: u32,
    },
}

impl DaemonStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, DaemonStatus::Running { .. })
    }
}

struct RunningProcess {
    generation: u64,
    pid: Option<u32>,
    kill: oneshot::Sender<()>,
}

#[derive(Default)]
struct ProcessState {
    generation: u64,
    process: Option<RunningProcess>,
    crash: CrashState,
    gave_up: bool,
    restart_task: Option<JoinHandle<()>>,
}

struct Inner {
    config: SupervisorConfig,
    channel: IpcChannel,
    state: Mutex<ProcessState>,
    status: watch::Sender<DaemonStatus>,
}

/// Supervises the generation daemon and routes requests to it
///
/// Cloning yields another handle to the same supervisor. Dropping the last
/// handle kills the daemon. All methods must be called from within a tokio
/// runtime.
#[derive(Clone)]
pub struct DaemonSupervisor {
    inner: Arc<Inner>,
}

impl DaemonSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (status, _) = watch::channel(DaemonStatus::Stopped);
        Self {
            inner: Arc::new(Inner {
                config,
                channel: IpcChannel::new(),
                state: Mutex::new(ProcessState::default()),
                status,
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Start the daemon unless it is already running.
    ///
    /// An explicit start also lifts a standing crash-limit state; the crash
    /// count itself is kept, so a further crash gives up again.
    pub fn start(&self) -> Result<(), IpcError> {
        let mut state = self.inner.state.lock();
        if state.process.is_some() {
            return Ok(());
        }
        state.gave_up = false;
        Inner::spawn_locked(&self.inner, &mut state)
    }

    /// Kill the daemon and cancel every pending call. Idempotent.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();

        if let Some(task) = state.restart_task.take() {
            task.abort();
        }
        // A restart task already past its sleep cannot be aborted; make it stale
        state.generation += 1;
        if let Some(process) = state.process.take() {
            info!("Stopping daemon (pid {:?})", process.pid);
            let _ = process.kill.send(());
        }

        self.inner.channel.detach();
        let cancelled = self.inner.channel.fail_all(IpcError::Cancelled);
        if cancelled > 0 {
            debug!("Cancelled {} pending daemon calls", cancelled);
        }

        if !state.gave_up {
            self.inner.status.send_replace(DaemonStatus::Stopped);
        }
    }

    /// Send one request, starting the daemon first if necessary
    pub async fn send_request(
        &self,
        command: &str,
        params: Map<String, JsonValue>,
    ) -> Result<ResponsePayload, IpcError> {
        self.ensure_started()?;

        match self.inner.channel.send(command, params).await {
            // The process went away between start and write
            Err(IpcError::NotConnected) => Err(IpcError::ProcessTerminated(
                "daemon exited before the request was sent".to_string(),
            )),
            other => other,
        }
    }

    /// Typed wrapper over [`send_request`](Self::send_request)
    pub async fn send_command(&self, command: DaemonCommand) -> Result<ResponsePayload, IpcError> {
        let (name, params) = command.into_parts()?;
        self.send_request(name, params).await
    }

    /// Clear the crash counter and lift the crash-limit state
    pub fn reset_crash_count(&self) {
        let mut state = self.inner.state.lock();
        state.crash.reset();

        if state.gave_up {
            info!("Crash count reset; daemon may be started again");
            state.gave_up = false;
            if state.process.is_none() {
                self.inner.status.send_replace(DaemonStatus::Stopped);
            }
        }
    }

    pub fn status(&self) -> DaemonStatus {
        self.inner.status.borrow().clone()
    }

    /// Receiver that observes every status change
    pub fn subscribe(&self) -> watch::Receiver<DaemonStatus> {
        self.inner.status.subscribe()
    }

    pub fn crash_count(&self) -> u32 {
        let state = self.inner.state.lock();
        if state.gave_up {
            // Not running, so the daemon cannot have been healthy since
            return state.crash.recorded_crashes();
        }
        state
            .crash
            .consecutive_crashes(Instant::now(), self.inner.config.crash_stability_window)
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().process.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner
            .state
            .lock()
            .process
            .as_ref()
            .and_then(|process| process.pid)
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.inner.channel.pending_count()
    }

    fn ensure_started(&self) -> Result<(), IpcError> {
        let mut state = self.inner.state.lock();
        if state.process.is_some() {
            return Ok(());
        }
        if state.gave_up {
            return Err(IpcError::CrashLimitExceeded {
                crashes: state.crash.recorded_crashes(),
            });
        }
        Inner::spawn_locked(&self.inner, &mut state)
    }
}

impl Inner {
    fn spawn_locked(this: &Arc<Self>, state: &mut ProcessState) -> Result<(), IpcError> {
        let config = &this.config;

        // A scheduled restart is obsolete once a process is being spawned
        if let Some(task) = state.restart_task.take() {
            task.abort();
        }

        let mut command = Command::new(&config.executable);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|e| {
            IpcError::Spawn(format!("{}: {}", config.executable.display(), e))
        })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(IpcError::Spawn("daemon pipes were not captured".to_string()));
        };

        state.generation += 1;
        let generation = state.generation;
        let pid = child.id();

        this.channel.attach(stdin);
        let reader = tokio::spawn(read_responses(Arc::downgrade(this), stdout));
        tokio::spawn(log_stderr(stderr));

        let (kill, kill_rx) = oneshot::channel();
        tokio::spawn(monitor(
            Arc::downgrade(this),
            generation,
            child,
            kill_rx,
            reader,
            config.output_drain_timeout,
        ));

        state.process = Some(RunningProcess {
            generation,
            pid,
            kill,
        });
        info!("Daemon started (pid {:?}, generation {})", pid, generation);
        this.status.send_replace(DaemonStatus::Running { pid });
        Ok(())
    }

    /// Runs once per unexpected exit of a spawned process
    fn handle_termination(this: &Arc<Self>, generation: u64, reason: String) {
        let mut state = this.state.lock();

        let is_current = state
            .process
            .as_ref()
            .is_some_and(|process| process.generation == generation);
        if !is_current {
            debug!("Ignoring exit of stale daemon generation {}", generation);
            return;
        }
        state.process = None;

        this.channel.detach();
        let failed = this
            .channel
            .fail_all(IpcError::ProcessTerminated(reason.clone()));

        let crashes = state
            .crash
            .record_crash(Instant::now(), this.config.crash_stability_window);
        warn!(
            "Daemon exited unexpectedly ({}); crash {} in a row, {} pending calls failed",
            reason, crashes, failed
        );

        if !this.config.auto_restart {
            this.status.send_replace(DaemonStatus::Stopped);
            return;
        }

        if crashes > this.config.max_crashes_before_give_up {
            error!(
                "Daemon crashed {} times in a row; giving up until the crash count is reset",
                crashes
            );
            state.gave_up = true;
            this.status
                .send_replace(DaemonStatus::CrashLimitExceeded { crashes });
            return;
        }

        let delay = restart_delay(
            crashes,
            this.config.restart_base_delay,
            this.config.max_restart_delay,
        );
        info!("Restarting daemon in {:?}", delay);
        this.status.send_replace(DaemonStatus::Restarting {
            attempt: crashes,
            delay,
        });

        let weak = Arc::downgrade(this);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                Inner::restart_after_backoff(&inner, generation);
            }
        });
        if let Some(previous) = state.restart_task.replace(task) {
            previous.abort();
        }
    }

    /// `crashed_generation` is the generation whose exit scheduled this restart
    fn restart_after_backoff(this: &Arc<Self>, crashed_generation: u64) {
        let mut state = this.state.lock();

        // Superseded by a later spawn or by stop()
        if state.generation != crashed_generation {
            debug!(
                "Ignoring stale restart scheduled after generation {}",
                crashed_generation
            );
            return;
        }
        state.restart_task = None;

        if state.process.is_some() || state.gave_up {
            return;
        }

        if let Err(e) = Inner::spawn_locked(this, &mut state) {
            error!("Failed to restart daemon: {}", e);
            this.status.send_replace(DaemonStatus::Stopped);
        }
    }
}

async fn monitor(
    inner: Weak<Inner>,
    generation: u64,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    mut reader: JoinHandle<()>,
    drain_timeout: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        // Requested stop, or the supervisor was dropped
        _ = kill_rx => {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill daemon: {}", e);
            }
            debug!("Daemon generation {} stopped", generation);
            return;
        }
    };

    // Responses written just before the exit are still delivered
    if tokio::time::timeout(drain_timeout, &mut reader).await.is_err() {
        reader.abort();
    }

    let reason = match status {
        Ok(status) => describe_exit(status),
        Err(e) => format!("wait failed: {}", e),
    };

    if let Some(inner) = inner.upgrade() {
        Inner::handle_termination(&inner, generation, reason);
    }
}

async fn read_responses(inner: Weak<Inner>, stdout: ChildStdout) {
    let mut lines = LineReader::new(stdout);
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                inner.channel.handle_line(&line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read daemon output: {}", e);
                break;
            }
        }
    }
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(target: "studio_daemon::stderr", "{}", line),
            Ok(None) => break,
            Err(e) => {
                debug!("Stopped reading daemon stderr: {}", e);
                break;
            }
        }
    }
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {}", code),
        None => "killed by signal".to_string(),
    }
}
