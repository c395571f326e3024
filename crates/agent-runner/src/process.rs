//! Agent process supervision
//!
//! Every spawned worker is owned by a background task that watches for exit,
//! drives the graceful-then-forced shutdown sequence and reports the outcome
//! exactly once:
//!
//! ```text
//! Running --stop/idle timeout--> GracePeriod --grace elapsed--> ForceKilled
//!    |                              |                               |
//!    +------------------------------+-------------------------------+--> Exited
//! ```

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};

/// Token written to a worker's stdin to ask it to shut down
pub const EXIT_TOKEN: &[u8] = b"exit\n";

/// How long output readers may keep draining after the process is gone
const OUTPUT_DRAIN: Duration = Duration::from_millis(250);

/// Supervisor-local identity of one spawn, never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ProcessId(u64);

/// What to launch and where
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Working directory (the assignment's workspace)
    pub working_dir: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    /// Variables layered over the inherited environment
    pub env: Vec<(String, String)>,
}

/// Output stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// How a process came to exit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// Exited without being asked to
    Spontaneous,
    /// Exited within the grace window after the exit token
    Graceful,
    /// Killed after the grace window elapsed
    ForceKilled,
}

/// Final record of a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    pub process_id: ProcessId,
    pub pid: Option<u32>,
    /// `None` when the process was ended by a signal
    pub code: Option<i32>,
    pub termination: Termination,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// An unrequested exit with a failing status
    pub fn is_abnormal(&self) -> bool {
        self.termination == Termination::Spontaneous && !self.success()
    }
}

/// Observable lifecycle of a supervised process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    GracePeriod,
    ForceKilled,
    Exited(ProcessExit),
}

/// Receives a process's output lines and its single exit notification
#[async_trait]
pub trait ProcessObserver: Send + Sync + 'static {
    /// Called for every line written to stdout or stderr
    fn on_output(&self, _stream: OutputStream, _line: &str) {}

    /// Called exactly once, after `spawn` returned, when the process is gone
    async fn on_exit(&self, exit: ProcessExit);
}

#[derive(Debug)]
enum Control {
    GracefulStop,
}

/// Exclusive handle on a running process
///
/// Dropping the handle does not stop the process; the idle timeout still
/// bounds its lifetime.
#[derive(Debug)]
pub struct ProcessHandle {
    id: ProcessId,
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Control>,
    state: watch::Receiver<ProcessState>,
}

impl ProcessHandle {
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// OS process id (also the process group id)
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the process to exit; a no-op once shutdown has begun
    pub fn request_graceful_stop(&self) {
        // The supervising task is gone only after exit
        let _ = self.control.send(Control::GracefulStop);
    }

    /// Waiter that resolves when the process has exited
    pub fn exit_watcher(&self) -> ExitWatcher {
        ExitWatcher {
            state: self.state.clone(),
        }
    }
}

/// Resolves once a process reaches `Exited`
#[derive(Debug, Clone)]
pub struct ExitWatcher {
    state: watch::Receiver<ProcessState>,
}

impl ExitWatcher {
    /// Returns `None` only if the supervising task died without reporting
    pub async fn wait(mut self) -> Option<ProcessExit> {
        let state = self
            .state
            .wait_for(|s| matches!(s, ProcessState::Exited(_)))
            .await
            .ok()?;
        match &*state {
            ProcessState::Exited(exit) => Some(exit.clone()),
            _ => None,
        }
    }
}

/// Launches worker processes and enforces their shutdown policy
#[derive(Debug)]
pub struct ProcessSupervisor {
    grace_period: Duration,
    idle_timeout: Duration,
    next_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(grace_period: Duration, idle_timeout: Duration) -> Self {
        Self {
            grace_period,
            idle_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.grace_period, config.idle_timeout)
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Spawn a supervised process
    ///
    /// Returns as soon as the OS has started the process. On error nothing is
    /// left running and the observer is never called.
    pub fn spawn(
        &self,
        request: SpawnRequest,
        observer: Arc<dyn ProcessObserver>,
    ) -> Result<ProcessHandle> {
        info!(
            "Spawning {} {:?} in {:?}",
            request.command, request.args, request.working_dir
        );

        if !request.working_dir.is_dir() {
            return Err(OrchestratorError::spawn_failed(format!(
                "Workspace {:?} is not a directory",
                request.working_dir
            )));
        }

        let mut cmd = Command::new(&request.command);
        cmd.args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(&request.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a forced kill reaches the worker's children too
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            OrchestratorError::spawn_failed_with_source(
                format!("Failed to spawn {}: {}", request.command, e),
                e,
            )
        })?;

        let id = ProcessId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let pid = child.id();

        let stdin = child.stdin.take();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(stdout, OutputStream::Stdout, pid, observer.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(stderr, OutputStream::Stderr, pid, observer.clone()));
        }

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ProcessState::Running);
        let (armed_tx, armed_rx) = oneshot::channel();

        let watch = Watch {
            id,
            pid,
            child,
            stdin,
            readers,
            control_rx,
            state_tx,
            observer,
            grace_period: self.grace_period,
            idle_timeout: self.idle_timeout,
        };
        tokio::spawn(watch.run(armed_rx));

        info!("Agent process started with PID: {:?}", pid);
        let handle = ProcessHandle {
            id,
            pid,
            control: control_tx,
            state: state_rx,
        };
        let _ = armed_tx.send(());
        Ok(handle)
    }

    /// Send the exit token and arm the grace timer
    pub fn request_graceful_stop(&self, handle: &ProcessHandle) {
        handle.request_graceful_stop();
    }
}

fn spawn_reader<R>(
    pipe: R,
    stream: OutputStream,
    pid: Option<u32>,
    observer: Arc<dyn ProcessObserver>,
) -> JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    debug!("[{:?}] {:?}: {}", pid, stream, line);
                    observer.on_output(stream, &line);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read {:?} of {:?}: {}", stream, pid, e);
                    break;
                }
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    GracePeriod,
    ForceKilled,
}

/// State owned by the supervising task of one process
struct Watch {
    id: ProcessId,
    pid: Option<u32>,
    child: Child,
    stdin: Option<ChildStdin>,
    readers: Vec<JoinHandle<()>>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    state_tx: watch::Sender<ProcessState>,
    observer: Arc<dyn ProcessObserver>,
    grace_period: Duration,
    idle_timeout: Duration,
}

impl Watch {
    async fn run(mut self, armed: oneshot::Receiver<()>) {
        // Exit is never reported before spawn() has handed out the handle
        let _ = armed.await;

        let mut phase = Phase::Running;
        let idle_timer = tokio::time::sleep(self.idle_timeout);
        let grace_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(idle_timer);
        tokio::pin!(grace_timer);

        let status = loop {
            tokio::select! {
                status = self.child.wait() => break status,
                Some(Control::GracefulStop) = self.control_rx.recv(), if phase == Phase::Running => {
                    info!("Graceful stop requested for PID {:?}", self.pid);
                    self.send_exit_token().await;
                    grace_timer.as_mut().reset(Instant::now() + self.grace_period);
                    phase = self.enter(Phase::GracePeriod);
                }
                () = &mut idle_timer, if phase == Phase::Running => {
                    info!(
                        "PID {:?} still running after {:?}, auto-exiting",
                        self.pid, self.idle_timeout
                    );
                    self.send_exit_token().await;
                    grace_timer.as_mut().reset(Instant::now() + self.grace_period);
                    phase = self.enter(Phase::GracePeriod);
                }
                () = &mut grace_timer, if phase == Phase::GracePeriod => {
                    warn!(
                        "PID {:?} ignored exit for {:?}, killing process group",
                        self.pid, self.grace_period
                    );
                    self.force_kill();
                    phase = self.enter(Phase::ForceKilled);
                }
            }
        };

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                warn!("Failed to wait on PID {:?}: {}", self.pid, e);
                None
            }
        };
        let termination = match phase {
            Phase::Running => Termination::Spontaneous,
            Phase::GracePeriod => Termination::Graceful,
            Phase::ForceKilled => Termination::ForceKilled,
        };

        self.stdin = None;
        for reader in self.readers.drain(..) {
            let abort = reader.abort_handle();
            if tokio::time::timeout(OUTPUT_DRAIN, reader).await.is_err() {
                abort.abort();
            }
        }

        let exit = ProcessExit {
            process_id: self.id,
            pid: self.pid,
            code,
            termination,
        };
        info!(
            "Process {:?} exited with code {:?} ({:?})",
            self.pid, exit.code, exit.termination
        );

        self.observer.on_exit(exit.clone()).await;
        self.state_tx.send_replace(ProcessState::Exited(exit));
    }

    fn enter(&self, phase: Phase) -> Phase {
        let state = match phase {
            Phase::Running => ProcessState::Running,
            Phase::GracePeriod => ProcessState::GracePeriod,
            Phase::ForceKilled => ProcessState::ForceKilled,
        };
        self.state_tx.send_replace(state);
        phase
    }

    async fn send_exit_token(&mut self) {
        let Some(stdin) = self.stdin.as_mut() else {
            warn!("No stdin for PID {:?}, relying on grace timer", self.pid);
            return;
        };
        let written = async {
            stdin.write_all(EXIT_TOKEN).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = written {
            // Usually a broken pipe from a process that is already exiting
            debug!("Could not write exit token to PID {:?}: {}", self.pid, e);
        }
    }

    fn force_kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => return,
                Err(Errno::ESRCH) => debug!("Process group {} already gone", pid),
                Err(e) => warn!("Failed to kill process group {}: {}", pid, e),
            }
        }

        // Already-exited processes are fine, wait() reports them
        if let Err(e) = self.child.start_kill() {
            debug!("Kill of PID {:?} failed: {}", self.pid, e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(OutputStream, String)>>,
        exits: Mutex<Vec<ProcessExit>>,
    }

    #[async_trait]
    impl ProcessObserver for Recorder {
        fn on_output(&self, stream: OutputStream, line: &str) {
            self.lines.lock().unwrap().push((stream, line.to_string()));
        }

        async fn on_exit(&self, exit: ProcessExit) {
            self.exits.lock().unwrap().push(exit);
        }
    }

    fn shell(dir: &TempDir, script: &str) -> SpawnRequest {
        SpawnRequest {
            working_dir: dir.path().to_path_buf(),
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            env: vec![("AGENT_ID".to_string(), "7".to_string())],
        }
    }

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(Duration::from_millis(300), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_spontaneous_exit_forwards_output() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());

        let handle = supervisor()
            .spawn(
                shell(&dir, "echo hello $AGENT_ID; echo oops >&2"),
                recorder.clone(),
            )
            .unwrap();
        assert!(handle.pid().is_some());

        let exit = handle.exit_watcher().wait().await.unwrap();
        assert_eq!(exit.termination, Termination::Spontaneous);
        assert!(exit.success());
        assert!(!exit.is_abnormal());

        let lines = recorder.lines.lock().unwrap().clone();
        assert!(lines.contains(&(OutputStream::Stdout, "hello 7".to_string())));
        assert!(lines.contains(&(OutputStream::Stderr, "oops".to_string())));
        assert_eq!(recorder.exits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_abnormal() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());

        let handle = supervisor().spawn(shell(&dir, "exit 3"), recorder).unwrap();
        let exit = handle.exit_watcher().wait().await.unwrap();
        assert_eq!(exit.code, Some(3));
        assert!(exit.is_abnormal());
    }

    #[tokio::test]
    async fn test_graceful_stop_within_grace_window() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let supervisor = supervisor();

        let handle = supervisor
            .spawn(shell(&dir, "read line; echo got $line; exit 0"), recorder.clone())
            .unwrap();
        supervisor.request_graceful_stop(&handle);
        // A second request is a no-op
        supervisor.request_graceful_stop(&handle);

        let exit = handle.exit_watcher().wait().await.unwrap();
        assert_eq!(exit.termination, Termination::Graceful);
        assert_eq!(exit.code, Some(0));
        assert!(recorder
            .lines
            .lock()
            .unwrap()
            .contains(&(OutputStream::Stdout, "got exit".to_string())));
        assert_eq!(recorder.exits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignored_stop_is_force_killed() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let supervisor = supervisor();

        let handle = supervisor
            .spawn(shell(&dir, "trap '' TERM; while true; do sleep 1; done"), recorder.clone())
            .unwrap();
        let started = Instant::now();
        supervisor.request_graceful_stop(&handle);

        let exit = handle.exit_watcher().wait().await.unwrap();
        assert_eq!(exit.termination, Termination::ForceKilled);
        assert_eq!(exit.code, None);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(recorder.exits.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_idle_timeout_issues_exit_token() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let supervisor = ProcessSupervisor::new(Duration::from_millis(200), Duration::from_millis(200));

        let handle = supervisor
            .spawn(shell(&dir, "read line; exit 0"), recorder)
            .unwrap();
        let exit = handle.exit_watcher().wait().await.unwrap();
        assert_eq!(exit.termination, Termination::Graceful);
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let dir = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let request = SpawnRequest {
            working_dir: dir.path().to_path_buf(),
            command: "definitely-not-a-real-agent-binary".to_string(),
            args: vec![],
            env: vec![],
        };

        let result = supervisor().spawn(request, recorder.clone());
        assert!(matches!(result, Err(OrchestratorError::Spawn { .. })));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.exits.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_in_missing_workspace_fails() {
        let dir = TempDir::new().unwrap();
        let mut request = shell(&dir, "true");
        request.working_dir = dir.path().join("missing");

        let result = supervisor().spawn(request, Arc::new(Recorder::default()));
        assert!(matches!(result, Err(OrchestratorError::Spawn { .. })));
    }
}
