//! Child process supervision
//!
//! A launched process is observed through a stream of [`ProcessEvent`]s:
//! every stdout and stderr line in arrival order, then exactly one
//! [`ProcessEvent::Exited`] once both streams are drained.

use crate::error::{RunError, RunResult};
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time allowed after SIGTERM before the process is killed
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Upper bound on waiting for output still in flight after exit
pub const DEFAULT_DRAIN: Duration = Duration::from_secs(5);

/// Program, arguments and working directory of a child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Name used in logs and errors
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
    Line { stream: Stream, line: String },
    /// Exit code, `None` when terminated by a signal
    Exited { code: Option<i32> },
}

/// Handle to a launched process
pub struct ProcessHandle {
    name: String,
    pid: Option<u32>,
    events: mpsc::UnboundedReceiver<ProcessEvent>,
    terminate: CancellationToken,
}

impl ProcessHandle {
    pub fn new(
        name: impl Into<String>,
        pid: Option<u32>,
        events: mpsc::UnboundedReceiver<ProcessEvent>,
        terminate: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            pid,
            events,
            terminate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Next line or the exit
    ///
    /// A closed event channel reads as an exit by signal.
    pub async fn next_event(&mut self) -> ProcessEvent {
        self.events
            .recv()
            .await
            .unwrap_or(ProcessEvent::Exited { code: None })
    }

    /// Wait for the exit event, skipping lines. Gives up after `limit`.
    pub async fn wait_exit(&mut self, limit: Duration) -> Option<Option<i32>> {
        let wait = async {
            loop {
                if let ProcessEvent::Exited { code } = self.next_event().await {
                    return code;
                }
            }
        };
        tokio::time::timeout(limit, wait).await.ok()
    }

    /// Ask the process to stop. Repeated calls are no-ops.
    pub fn terminate(&self) {
        if self.terminate.is_cancelled() {
            return;
        }
        debug!("Terminating {} (pid: {:?})", self.name, self.pid);
        self.terminate.cancel();
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.is_cancelled()
    }
}

/// Starts child processes
///
/// Must be called from within a Tokio runtime.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, spec: &CommandSpec) -> RunResult<ProcessHandle>;
}

/// Launches real OS processes with piped output
#[derive(Debug, Clone)]
pub struct TokioLauncher {
    grace: Duration,
    drain: Duration,
}

impl TokioLauncher {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            drain: DEFAULT_DRAIN,
        }
    }

    /// How long output may keep flowing after the process exits. Readers
    /// still open past this are aborted.
    pub fn with_drain(mut self, drain: Duration) -> Self {
        self.drain = drain;
        self
    }
}

impl Default for TokioLauncher {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, spec: &CommandSpec) -> RunResult<ProcessHandle> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            name: spec.name.clone(),
            source,
        })?;
        let pid = child.id();
        info!("Started {} (pid: {:?}): {}", spec.name, pid, spec);

        let (tx, rx) = mpsc::unbounded_channel();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, Stream::Stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, Stream::Stderr, tx.clone()));
        }

        let terminate = CancellationToken::new();
        tokio::spawn(supervise(
            child,
            spec.name.clone(),
            readers,
            tx,
            terminate.clone(),
            self.grace,
            self.drain,
        ));

        Ok(ProcessHandle::new(spec.name.clone(), pid, rx, terminate))
    }
}

fn spawn_line_reader<R>(
    reader: R,
    stream: Stream,
    tx: mpsc::UnboundedSender<ProcessEvent>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']).to_string();
                    if tx.send(ProcessEvent::Line { stream, line }).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("{:?} read failed: {}", stream, e);
                    break;
                }
            }
        }
    })
}

async fn supervise(
    mut child: Child,
    name: String,
    readers: Vec<JoinHandle<()>>,
    tx: mpsc::UnboundedSender<ProcessEvent>,
    terminate: CancellationToken,
    grace: Duration,
    drain: Duration,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = terminate.cancelled() => stop_child(&mut child, grace).await,
    };

    for mut reader in readers {
        if tokio::time::timeout(drain, &mut reader).await.is_err() {
            warn!("{} output still open after exit, dropping the rest", name);
            reader.abort();
        }
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            warn!("Failed to wait for {}: {}", name, e);
            None
        }
    };
    info!("{} exited (code: {:?})", name, code);
    let _ = tx.send(ProcessEvent::Exited { code });
}

/// SIGTERM first, SIGKILL if the process outlives the grace period
async fn stop_child(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
                    return status;
                }
                warn!("pid {} still running after {:?}, killing", pid, grace);
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}
