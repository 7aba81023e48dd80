//! Process launching seam.
//!
//! Controllers never touch `tokio::process` directly. They go through a
//! [`ProcessLauncher`], which starts long-lived children and runs one-shot
//! commands. [`SystemLauncher`] is the real implementation and goes through
//! [`CheckedCommand`], so no shell is ever involved.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tracing::{debug, warn};
use wormhole_validation::command::CheckedCommand;
pub use wormhole_validation::command::{AllowedProgram, CommandOutput};

use crate::error::{Result, TunnelError};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Mask shown in place of secret argument values.
const REDACTED: &str = "***";

/// A program plus its argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Which allowlisted program this is.
    pub program: AllowedProgram,
    /// Explicit binary path, otherwise the program's default name.
    pub program_path: Option<String>,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
    /// Flags whose following argument must never be logged.
    pub secret_flags: Vec<String>,
}

impl LaunchSpec {
    /// Runs `program` with no arguments.
    #[must_use]
    pub fn new(program: AllowedProgram) -> Self {
        Self {
            program,
            program_path: None,
            args: Vec::new(),
            secret_flags: Vec::new(),
        }
    }

    /// Uses an explicit binary path.
    #[must_use]
    pub fn with_program_path(mut self, path: impl Into<String>) -> Self {
        self.program_path = Some(path.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Marks a flag whose value is secret.
    #[must_use]
    pub fn secret_flag(mut self, flag: impl Into<String>) -> Self {
        self.secret_flags.push(flag.into());
        self
    }

    /// The binary that will be executed.
    #[must_use]
    pub fn program_name(&self) -> &str {
        self.program_path
            .as_deref()
            .unwrap_or_else(|| self.program.default_name())
    }

    /// The command line with secret values masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program_name());

        let mut mask_next = false;
        for arg in &self.args {
            if mask_next {
                parts.push(REDACTED);
                mask_next = false;
                continue;
            }
            parts.push(arg);
            mask_next = self.secret_flags.iter().any(|flag| flag == arg);
        }

        parts.join(" ")
    }

    fn to_command(&self) -> CheckedCommand {
        let cmd = CheckedCommand::new(self.program);
        let cmd = match &self.program_path {
            Some(path) => cmd.program_path(path),
            None => cmd,
        };
        cmd.args(&self.args)
    }
}

impl fmt::Display for LaunchSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExitReport {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitReport {
    /// A normal exit with the given code.
    #[must_use]
    pub const fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// Death by signal.
    #[must_use]
    pub const fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    /// Returns `true` for exit code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// A running child process owned by exactly one supervisor.
pub trait ManagedChild: Send {
    /// OS process id, `None` once the process has been reaped.
    fn id(&self) -> Option<u32>;

    /// Waits for the process to exit. Must be cancel safe.
    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>>;

    /// Asks the process to exit (SIGTERM on Unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forcibly kills the process and reaps it.
    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>>;
}

/// Starts processes on behalf of the controllers.
pub trait ProcessLauncher: Send + Sync {
    /// Spawns a long-lived process.
    ///
    /// Fails with `TunnelError::LaunchFailed` if the process cannot start.
    fn spawn<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<Box<dyn ManagedChild>>>;

    /// Runs a one-shot command to completion and captures its output.
    ///
    /// A non-zero exit is not an error here; only failure to run is.
    fn run<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<CommandOutput>>;
}

/// Launcher backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    /// Creates a system launcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ProcessLauncher for SystemLauncher {
    fn spawn<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<Box<dyn ManagedChild>>> {
        Box::pin(async move {
            let mut child = spec
                .to_command()
                .spawn()
                .map_err(|e| TunnelError::launch_failed(spec.program_name(), e.to_string()))?;

            let program = spec.program_name().to_string();
            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(drain_lines(stdout, program.clone(), false));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(drain_lines(stderr, program, true));
            }

            Ok(Box::new(SystemChild { child }) as Box<dyn ManagedChild>)
        })
    }

    fn run<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            debug!(command = %spec, "running command");
            spec.to_command()
                .output()
                .await
                .map_err(|e| TunnelError::launch_failed(spec.program_name(), e.to_string()))
        })
    }
}

/// Forward a child's output into the log so its pipe never fills up.
async fn drain_lines<R>(stream: R, program: String, is_stderr: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => warn!(program = %program, "{line}"),
            Ok(Some(line)) => debug!(program = %program, "{line}"),
            Ok(None) => break,
            Err(e) => {
                debug!(program = %program, error = %e, "output stream closed");
                break;
            }
        }
    }
}

struct SystemChild {
    child: Child,
}

impl ManagedChild for SystemChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>> {
        Box::pin(async move { self.child.wait().await.map(ExitReport::from) })
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(e) => Err(io::Error::from(e)),
        }
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move { self.child.kill().await })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory launcher for controller tests.

    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::watch;

    /// A fake child that runs until terminated, killed or crashed.
    pub(crate) struct MockChild {
        pid: u32,
        ignore_terminate: bool,
        exit_tx: Arc<watch::Sender<Option<ExitReport>>>,
        exit_rx: watch::Receiver<Option<ExitReport>>,
        live: Arc<AtomicUsize>,
    }

    impl ManagedChild for MockChild {
        fn id(&self) -> Option<u32> {
            if self.exit_rx.borrow().is_some() {
                None
            } else {
                Some(self.pid)
            }
        }

        fn wait(&mut self) -> BoxFuture<'_, io::Result<ExitReport>> {
            Box::pin(async move {
                let report = self
                    .exit_rx
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| io::Error::other("mock child dropped"))?;
                Ok((*report).unwrap_or_default())
            })
        }

        fn terminate(&mut self) -> io::Result<()> {
            if !self.ignore_terminate {
                self.exit_tx.send_if_modified(|state| {
                    if state.is_some() {
                        return false;
                    }
                    *state = Some(ExitReport::signaled(15));
                    true
                });
            }
            Ok(())
        }

        fn kill(&mut self) -> BoxFuture<'_, io::Result<()>> {
            Box::pin(async move {
                self.exit_tx.send_if_modified(|state| {
                    if state.is_some() {
                        return false;
                    }
                    *state = Some(ExitReport::signaled(9));
                    true
                });
                Ok(())
            })
        }
    }

    impl Drop for MockChild {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Records every launch and hands out fake children.
    #[derive(Default)]
    pub(crate) struct MockLauncher {
        spawned: Mutex<Vec<LaunchSpec>>,
        exits: Mutex<Vec<Arc<watch::Sender<Option<ExitReport>>>>>,
        live: Arc<AtomicUsize>,
        next_pid: AtomicU32,
        fail_spawn: AtomicBool,
        ignore_terminate: AtomicBool,
        outputs: Mutex<VecDeque<std::result::Result<CommandOutput, String>>>,
        runs: AtomicUsize,
    }

    impl MockLauncher {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                next_pid: AtomicU32::new(1000),
                ..Self::default()
            })
        }

        pub(crate) fn fail_spawns(&self, fail: bool) {
            self.fail_spawn.store(fail, Ordering::SeqCst);
        }

        pub(crate) fn ignore_terminate(&self, ignore: bool) {
            self.ignore_terminate.store(ignore, Ordering::SeqCst);
        }

        /// Queue the output of the next `run` call.
        pub(crate) fn push_output(&self, stdout: &str, stderr: &str) {
            let output = CommandOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
                exit_code: 0,
            };
            self.outputs
                .lock()
                .expect("lock outputs")
                .push_back(Ok(output));
        }

        /// Make the next `run` call fail to start.
        pub(crate) fn push_run_failure(&self, reason: &str) {
            self.outputs
                .lock()
                .expect("lock outputs")
                .push_back(Err(reason.to_string()));
        }

        /// Simulate the n-th spawned process dying on its own.
        pub(crate) fn crash(&self, index: usize, code: i32) {
            let exits = self.exits.lock().expect("lock exits");
            exits[index].send_replace(Some(ExitReport::exited(code)));
        }

        pub(crate) fn spawned(&self) -> Vec<LaunchSpec> {
            self.spawned.lock().expect("lock spawned").clone()
        }

        pub(crate) fn spawn_count(&self) -> usize {
            self.spawned.lock().expect("lock spawned").len()
        }

        pub(crate) fn live_count(&self) -> usize {
            self.live.load(Ordering::SeqCst)
        }

        pub(crate) fn run_count(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    impl ProcessLauncher for MockLauncher {
        fn spawn<'a>(
            &'a self,
            spec: &'a LaunchSpec,
        ) -> BoxFuture<'a, Result<Box<dyn ManagedChild>>> {
            Box::pin(async move {
                if self.fail_spawn.load(Ordering::SeqCst) {
                    return Err(TunnelError::launch_failed(
                        spec.program_name(),
                        "No such file or directory (os error 2)",
                    ));
                }

                let (exit_tx, exit_rx) = watch::channel(None);
                let exit_tx = Arc::new(exit_tx);
                self.spawned.lock().expect("lock spawned").push(spec.clone());
                self.exits.lock().expect("lock exits").push(Arc::clone(&exit_tx));
                self.live.fetch_add(1, Ordering::SeqCst);

                Ok(Box::new(MockChild {
                    pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                    ignore_terminate: self.ignore_terminate.load(Ordering::SeqCst),
                    exit_tx,
                    exit_rx,
                    live: Arc::clone(&self.live),
                }) as Box<dyn ManagedChild>)
            })
        }

        fn run<'a>(&'a self, spec: &'a LaunchSpec) -> BoxFuture<'a, Result<CommandOutput>> {
            Box::pin(async move {
                self.runs.fetch_add(1, Ordering::SeqCst);
                let next = self.outputs.lock().expect("lock outputs").pop_front();
                match next {
                    Some(Ok(output)) => Ok(output),
                    Some(Err(reason)) => Err(TunnelError::launch_failed(spec.program_name(), reason)),
                    None => Ok(CommandOutput::default()),
                }
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inlets_spec() -> LaunchSpec {
        LaunchSpec::new(AllowedProgram::Inlets)
            .args([
                "client",
                "--remote",
                "wss://myhouse.wormhole.eliteu.cn",
                "--upstream=myhouse.wormhole.eliteu.cn=http://127.0.0.1:8123",
                "--token",
                "8dfe81c68460",
            ])
            .secret_flag("--token")
    }

    #[test]
    fn test_redacted_masks_token() {
        let spec = inlets_spec();
        let shown = spec.redacted();
        assert!(shown.starts_with("inlets client --remote wss://myhouse.wormhole.eliteu.cn"));
        assert!(shown.ends_with("--token ***"));
        assert!(!shown.contains("8dfe81c68460"));
        assert_eq!(spec.to_string(), shown);
    }

    #[test]
    fn test_program_name_prefers_path() {
        let spec = inlets_spec().with_program_path("/opt/inlets/inlets");
        assert_eq!(spec.program_name(), "/opt/inlets/inlets");
        assert_eq!(LaunchSpec::new(AllowedProgram::Jupyter).program_name(), "jupyter");
    }

    #[test]
    fn test_exit_report_display() {
        assert_eq!(ExitReport::exited(1).to_string(), "exit code 1");
        assert_eq!(ExitReport::signaled(15).to_string(), "signal 15");
        assert_eq!(ExitReport::default().to_string(), "unknown status");
        assert!(ExitReport::exited(0).success());
        assert!(!ExitReport::signaled(9).success());
    }

    #[tokio::test]
    async fn test_system_launcher_missing_binary() {
        let spec = inlets_spec().with_program_path("/nonexistent/wormhole/inlets");
        let err = SystemLauncher::new().spawn(&spec).await.err();
        assert!(matches!(err, Some(TunnelError::LaunchFailed { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_child_terminate() {
        let spec = LaunchSpec::new(AllowedProgram::Inlets)
            .with_program_path("sleep")
            .args(["30"]);
        let mut child = SystemLauncher::new().spawn(&spec).await.expect("spawn sleep");
        assert!(child.id().is_some());

        child.terminate().expect("send SIGTERM");
        let report = child.wait().await.expect("wait");
        assert_eq!(report.signal, Some(15));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_launcher_run_captures_output() {
        let spec = LaunchSpec::new(AllowedProgram::Jupyter)
            .with_program_path("echo")
            .args(["http://localhost:8888/?token=abc123 :: /home/jovyan"]);
        let output = SystemLauncher::new().run(&spec).await.expect("run echo");
        assert!(output.success());
        assert!(output.stdout_lossy().contains("token=abc123"));
    }
}
