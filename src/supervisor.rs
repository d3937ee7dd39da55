//! Supervision of the gateway child process
//!
//! One [`GatewaySupervisor`] owns at most one live gateway process. Lifecycle
//! calls (`start`, `stop`, `restart`) are serialized through the run slot, so
//! concurrent callers queue behind each other instead of spawning two children
//! or killing one twice. The observable record (state, pid, uptime, restart
//! counter and recent output) sits behind a separate short-lived lock so status
//! reads never wait on a lifecycle transition in progress.
//!
//! Each run gets an output-drain task that owns the child handle. It forwards
//! stdout and stderr into the log buffer, delivers termination requests, and
//! reports an unexpected exit by moving the record to `error`.

use crate::config::GatewayConfig;
use crate::logs::{strip_ansi, LogBuffer};
use parking_lot::Mutex;
use serde::Serialize;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How long to keep reading output after the gateway has exited
const OUTPUT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

/// State of the gateway process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayState {
    /// No process is running
    Stopped,
    /// Process is being spawned
    Starting,
    /// Process is running
    Running,
    /// Process has been asked to exit
    Stopping,
    /// Spawn failed or the process exited on its own
    Error,
}

/// Point-in-time view of the supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStatus {
    pub state: GatewayState,
    /// Process id while a process is live
    pub pid: Option<u32>,
    /// Whole seconds since start, only while running
    pub uptime: Option<u64>,
    /// Number of `restart()` calls, never reset
    pub restart_count: u64,
}

struct SupervisorRecord {
    state: GatewayState,
    pid: Option<u32>,
    started_at: Option<Instant>,
    restart_count: u64,
    /// Incremented on every successful spawn so a drain task only ever
    /// updates the record for its own run
    generation: u64,
    logs: LogBuffer,
}

impl SupervisorRecord {
    fn mark_stopped(&mut self) {
        self.state = GatewayState::Stopped;
        self.pid = None;
        self.started_at = None;
    }

    fn mark_error(&mut self, line: String) {
        self.state = GatewayState::Error;
        self.pid = None;
        self.started_at = None;
        self.logs.push(line);
    }
}

type SharedRecord = Arc<Mutex<SupervisorRecord>>;

/// Requests delivered to the drain task, which owns the child
#[derive(Debug, Clone, Copy)]
enum StopSignal {
    Terminate,
    Kill,
}

/// A spawned gateway and the task draining it
struct GatewayRun {
    pid: Option<u32>,
    drain: JoinHandle<Option<ExitStatus>>,
    control_tx: mpsc::Sender<StopSignal>,
}

impl GatewayRun {
    fn is_live(&self) -> bool {
        !self.drain.is_finished()
    }

    async fn signal(&self, signal: StopSignal) {
        if self.control_tx.send(signal).await.is_err() {
            debug!(pid = ?self.pid, ?signal, "Gateway drain task already finished");
        }
    }
}

/// Supervises the gateway process.
///
/// [`new`](GatewaySupervisor::new) returns `Arc<Self>` since the supervisor
/// is shared between request handlers and the shutdown path.
pub struct GatewaySupervisor {
    config: GatewayConfig,
    record: SharedRecord,
    /// Current run; the async lock serializes lifecycle operations
    run: tokio::sync::Mutex<Option<GatewayRun>>,
    /// Fired on shutdown (or drop) to cancel drain tasks
    shutdown_tx: watch::Sender<bool>,
}

impl GatewaySupervisor {
    pub fn new(config: GatewayConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let record = SupervisorRecord {
            state: GatewayState::Stopped,
            pid: None,
            started_at: None,
            restart_count: 0,
            generation: 0,
            logs: LogBuffer::new(config.log_capacity),
        };

        Arc::new(Self {
            config,
            record: Arc::new(Mutex::new(record)),
            run: tokio::sync::Mutex::new(None),
            shutdown_tx,
        })
    }

    /// Start the gateway unless a live process already exists.
    ///
    /// Spawn failures are recorded as the `error` state plus a log line.
    pub async fn start(&self) {
        let mut run = self.run.lock().await;
        self.start_locked(&mut run);
    }

    /// Stop the gateway: SIGTERM, wait up to the stop timeout, then kill.
    /// Safe to call when nothing is running.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await;
    }

    /// Stop then start, counting the restart whatever the prior state was
    pub async fn restart(&self) {
        let mut run = self.run.lock().await;
        self.stop_locked(&mut run).await;
        let restart_count = {
            let mut record = self.record.lock();
            record.restart_count += 1;
            record.restart_count
        };
        info!(restart_count, "Restarting gateway");
        self.start_locked(&mut run);
    }

    /// Stop the gateway and cancel any remaining background work.
    /// The supervisor refuses to start again afterwards.
    pub async fn shutdown(&self) {
        self.stop().await;
        self.shutdown_tx.send_replace(true);
        debug!("Gateway supervisor shut down");
    }

    pub fn status(&self) -> GatewayStatus {
        let record = self.record.lock();
        let uptime = match (record.state, record.started_at) {
            (GatewayState::Running, Some(started_at)) => Some(started_at.elapsed().as_secs()),
            _ => None,
        };
        GatewayStatus {
            state: record.state,
            pid: record.pid,
            uptime,
            restart_count: record.restart_count,
        }
    }

    pub fn state(&self) -> GatewayState {
        self.record.lock().state
    }

    /// Buffered output, oldest line first
    pub fn logs(&self) -> Vec<String> {
        self.record.lock().logs.snapshot()
    }

    fn start_locked(&self, run: &mut Option<GatewayRun>) {
        if run.as_ref().is_some_and(GatewayRun::is_live) {
            debug!("Gateway already running");
            return;
        }
        if *self.shutdown_tx.borrow() {
            warn!("Supervisor is shut down, not starting gateway");
            return;
        }

        self.record.lock().state = GatewayState::Starting;

        let mut child = match self.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(command = %self.config.command, error = %e, "Failed to start gateway");
                self.record
                    .lock()
                    .mark_error(format!("Failed to start gateway: {}", e));
                *run = None;
                return;
            }
        };

        let pid = child.id();
        let output = MergedOutput::new(child.stdout.take(), child.stderr.take());
        let (control_tx, control_rx) = mpsc::channel(2);

        let generation = {
            let mut record = self.record.lock();
            record.generation += 1;
            record.state = GatewayState::Running;
            record.pid = pid;
            record.started_at = Some(Instant::now());
            record.generation
        };

        let drain = tokio::spawn(drain_output(
            child,
            output,
            DrainContext {
                record: Arc::clone(&self.record),
                generation,
                control_rx,
                shutdown_rx: self.shutdown_tx.subscribe(),
            },
        ));

        info!(pid = ?pid, "Gateway process spawned");
        *run = Some(GatewayRun {
            pid,
            drain,
            control_tx,
        });
    }

    fn spawn(&self) -> anyhow::Result<Child> {
        let argv = self.config.argv()?;
        let Some((program, args)) = argv.split_first() else {
            anyhow::bail!("Gateway command is empty");
        };

        info!(command = %self.config.command, "Starting gateway");

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        if let Some(ref working_dir) = self.config.working_dir {
            cmd.current_dir(working_dir);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }

        Ok(cmd.spawn()?)
    }

    async fn stop_locked(&self, run: &mut Option<GatewayRun>) {
        let Some(mut current) = run.take().filter(GatewayRun::is_live) else {
            self.record.lock().mark_stopped();
            return;
        };

        self.record.lock().state = GatewayState::Stopping;
        let grace_period = self.config.stop_timeout();
        info!(pid = ?current.pid, "Sending SIGTERM to gateway");
        current.signal(StopSignal::Terminate).await;

        let result = match tokio::time::timeout(grace_period, &mut current.drain).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    pid = ?current.pid,
                    grace_period_secs = grace_period.as_secs(),
                    "Grace period exceeded, killing gateway"
                );
                current.signal(StopSignal::Kill).await;
                (&mut current.drain).await
            }
        };

        match result {
            Ok(Some(status)) => {
                info!(pid = ?current.pid, status = %describe_exit(&status), "Gateway exited")
            }
            Ok(None) => debug!(pid = ?current.pid, "Gateway exit status unavailable"),
            Err(e) => warn!(pid = ?current.pid, error = %e, "Gateway drain task failed"),
        }

        self.record.lock().mark_stopped();
        info!("Gateway stopped");
    }
}

impl Drop for GatewaySupervisor {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

struct DrainContext {
    record: SharedRecord,
    generation: u64,
    control_rx: mpsc::Receiver<StopSignal>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DrainContext {
    fn append(&self, line: &str) {
        self.record.lock().logs.push(strip_ansi(line).into_owned());
    }
}

enum DrainEvent {
    Line(Option<String>),
    Exited(std::io::Result<ExitStatus>),
    Control(Option<StopSignal>),
    Shutdown(Result<(), watch::error::RecvError>),
}

/// Drain the gateway's output until it exits, then record an unexpected exit
async fn drain_output(
    mut child: Child,
    mut output: MergedOutput,
    mut ctx: DrainContext,
) -> Option<ExitStatus> {
    if *ctx.shutdown_rx.borrow() {
        abandon(&mut child).await;
        return None;
    }

    let mut control_open = true;
    let mut stop_requested = false;

    let status = loop {
        let output_open = output.is_open();
        let event = tokio::select! {
            line = output.next_line(), if output_open => DrainEvent::Line(line),
            status = child.wait() => DrainEvent::Exited(status),
            signal = ctx.control_rx.recv(), if control_open => DrainEvent::Control(signal),
            changed = ctx.shutdown_rx.changed() => DrainEvent::Shutdown(changed),
        };

        match event {
            DrainEvent::Line(Some(line)) => ctx.append(&line),
            DrainEvent::Line(None) => debug!("Gateway output closed"),
            DrainEvent::Exited(status) => break status.ok(),
            DrainEvent::Control(Some(StopSignal::Terminate)) => {
                stop_requested = true;
                terminate(&mut child);
            }
            DrainEvent::Control(Some(StopSignal::Kill)) => {
                stop_requested = true;
                if let Err(e) = child.start_kill() {
                    warn!(error = %e, "Failed to kill gateway");
                }
            }
            DrainEvent::Control(None) => control_open = false,
            DrainEvent::Shutdown(Ok(())) => {
                if *ctx.shutdown_rx.borrow() {
                    debug!("Supervisor shutting down, abandoning gateway");
                    abandon(&mut child).await;
                    return None;
                }
            }
            DrainEvent::Shutdown(Err(_)) => {
                debug!("Supervisor dropped, abandoning gateway");
                abandon(&mut child).await;
                return None;
            }
        }
    };

    // Pick up whatever the gateway wrote right before exiting. A grandchild
    // holding the pipe open must not keep this task alive.
    if output.is_open() {
        let flush = async {
            while let Some(line) = output.next_line().await {
                ctx.append(&line);
            }
        };
        if tokio::time::timeout(OUTPUT_FLUSH_TIMEOUT, flush).await.is_err() {
            debug!("Gateway output still open after exit");
        }
    }

    // stop() may have moved the record to `stopping` during the flush
    if !stop_requested {
        let line = match status {
            Some(ref status) => format!("Gateway exited with {}", describe_exit(status)),
            None => "Gateway exited with unknown status".to_string(),
        };
        let mut record = ctx.record.lock();
        warn!(pid = ?record.pid, "{}", line);
        if record.generation == ctx.generation && record.state == GatewayState::Running {
            record.mark_error(line);
        } else {
            record.logs.push(line);
        }
    }

    status
}

/// Kill and reap the child so no process outlives the supervisor
async fn abandon(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "Failed to kill abandoned gateway");
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // id() is None once the child has been reaped, so the pid is still ours
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "unknown status".to_string()
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Stdout and stderr of the gateway read as one stream of lines
struct MergedOutput {
    stdout: Option<BufReader<ChildStdout>>,
    stderr: Option<BufReader<ChildStderr>>,
    stdout_buf: Vec<u8>,
    stderr_buf: Vec<u8>,
}

impl MergedOutput {
    fn new(stdout: Option<ChildStdout>, stderr: Option<ChildStderr>) -> Self {
        Self {
            stdout: stdout.map(BufReader::new),
            stderr: stderr.map(BufReader::new),
            stdout_buf: Vec::new(),
            stderr_buf: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some()
    }

    /// Next complete line from either stream, `None` once both are closed.
    ///
    /// Partial lines stay in the per-stream buffers if this future is
    /// dropped, so it can be used inside `select!`.
    async fn next_line(&mut self) -> Option<String> {
        while self.is_open() {
            let stdout_open = self.stdout.is_some();
            let stderr_open = self.stderr.is_some();

            let (stream, result) = tokio::select! {
                r = read_line(self.stdout.as_mut(), &mut self.stdout_buf), if stdout_open => (OutputStream::Stdout, r),
                r = read_line(self.stderr.as_mut(), &mut self.stderr_buf), if stderr_open => (OutputStream::Stderr, r),
            };

            match result {
                Ok(n) if n > 0 => return Some(take_line(self.buffer(stream))),
                Ok(_) => self.close(stream),
                Err(e) => {
                    debug!(?stream, error = %e, "Failed to read gateway output");
                    self.close(stream);
                }
            }

            // An unterminated final line may have been buffered by an
            // earlier, cancelled read
            let buf = self.buffer(stream);
            if !buf.is_empty() {
                return Some(take_line(buf));
            }
        }
        None
    }

    fn buffer(&mut self, stream: OutputStream) -> &mut Vec<u8> {
        match stream {
            OutputStream::Stdout => &mut self.stdout_buf,
            OutputStream::Stderr => &mut self.stderr_buf,
        }
    }

    fn close(&mut self, stream: OutputStream) {
        match stream {
            OutputStream::Stdout => self.stdout = None,
            OutputStream::Stderr => self.stderr = None,
        }
    }
}

async fn read_line<R>(reader: Option<&mut R>, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(reader) => reader.read_until(b'\n', buf).await,
        None => std::future::pending().await,
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let line = String::from_utf8_lossy(buf).trim_end().to_string();
    buf.clear();
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing_binary() -> GatewayConfig {
        GatewayConfig::command("/nonexistent/picoclaw-gateway", &["gateway"])
    }

    #[cfg(unix)]
    fn shell(script: &str) -> GatewayConfig {
        GatewayConfig::command("sh", &["-c", script]).with_stop_timeout(Duration::from_secs(1))
    }

    async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    fn logs_contain(supervisor: &GatewaySupervisor, needle: &str) -> bool {
        supervisor.logs().iter().any(|line| line.contains(needle))
    }

    #[test]
    fn test_initial_status() {
        let supervisor = GatewaySupervisor::new(missing_binary());

        assert_eq!(
            supervisor.status(),
            GatewayStatus {
                state: GatewayState::Stopped,
                pid: None,
                uptime: None,
                restart_count: 0,
            }
        );
        assert!(supervisor.logs().is_empty());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let status = GatewayStatus {
            state: GatewayState::Running,
            pid: Some(42),
            uptime: Some(3),
            restart_count: 1,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "running", "pid": 42, "uptime": 3, "restart_count": 1})
        );
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let supervisor = GatewaySupervisor::new(missing_binary());

        supervisor.stop().await;
        supervisor.stop().await;

        assert_eq!(supervisor.state(), GatewayState::Stopped);
        assert!(supervisor.logs().is_empty());
    }

    #[tokio::test]
    async fn test_start_missing_binary_enters_error() {
        let supervisor = GatewaySupervisor::new(missing_binary());

        supervisor.start().await;

        let status = supervisor.status();
        assert_eq!(status.state, GatewayState::Error);
        assert_eq!(status.pid, None);
        assert_eq!(status.uptime, None);
        assert!(logs_contain(&supervisor, "Failed to start gateway"));
    }

    #[tokio::test]
    async fn test_restart_counts_every_call() {
        let supervisor = GatewaySupervisor::new(missing_binary());

        supervisor.restart().await;
        assert_eq!(supervisor.status().restart_count, 1);
        assert_eq!(supervisor.state(), GatewayState::Error);

        supervisor.stop().await;
        assert_eq!(supervisor.state(), GatewayState::Stopped);

        supervisor.restart().await;
        assert_eq!(supervisor.status().restart_count, 2);
    }

    #[tokio::test]
    async fn test_start_after_spawn_failure_is_accepted() {
        let supervisor = GatewaySupervisor::new(missing_binary());

        supervisor.start().await;
        supervisor.start().await;

        let failures = supervisor
            .logs()
            .iter()
            .filter(|l| l.starts_with("Failed to start gateway"))
            .count();
        assert_eq!(failures, 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_start_and_stop() {
        let supervisor = GatewaySupervisor::new(
            GatewayConfig::command("sleep", &["60"]).with_stop_timeout(Duration::from_secs(2)),
        );

        supervisor.start().await;

        let status = supervisor.status();
        assert_eq!(status.state, GatewayState::Running);
        assert!(status.pid.is_some());
        assert_eq!(status.uptime, Some(0));

        // A second start is a no-op while the process is alive
        supervisor.start().await;
        assert_eq!(supervisor.status().pid, status.pid);

        supervisor.stop().await;

        let status = supervisor.status();
        assert_eq!(status.state, GatewayState::Stopped);
        assert_eq!(status.pid, None);
        assert_eq!(status.uptime, None);
        assert_eq!(status.restart_count, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_is_captured_and_cleaned() {
        let supervisor = GatewaySupervisor::new(shell(
            r"printf '\033[32mhello gateway\033[0m\n'; echo 'oops' >&2; exec sleep 60",
        ));

        supervisor.start().await;

        assert!(
            wait_for(
                || logs_contain(&supervisor, "hello gateway") && logs_contain(&supervisor, "oops"),
                Duration::from_secs(5)
            )
            .await
        );
        assert!(supervisor.logs().iter().all(|l| !l.contains('\x1b')));
        assert!(supervisor.logs().contains(&"hello gateway".to_string()));

        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unexpected_exit_enters_error() {
        let supervisor = GatewaySupervisor::new(shell("echo 'bye'; exit 3"));

        supervisor.start().await;

        assert!(
            wait_for(
                || supervisor.state() == GatewayState::Error,
                Duration::from_secs(5)
            )
            .await
        );
        let status = supervisor.status();
        assert_eq!(status.pid, None);
        assert_eq!(status.uptime, None);
        assert!(logs_contain(&supervisor, "bye"));
        assert!(logs_contain(&supervisor, "Gateway exited with code 3"));

        // The supervisor stays usable
        supervisor.stop().await;
        assert_eq!(supervisor.state(), GatewayState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unterminated_last_line_is_kept() {
        let supervisor =
            GatewaySupervisor::new(shell("printf 'fatal: no newline'; sleep 0.2; exit 3"));

        supervisor.start().await;

        assert!(
            wait_for(
                || supervisor.state() == GatewayState::Error,
                Duration::from_secs(5)
            )
            .await
        );
        let logs = supervisor.logs();
        let fatal = logs.iter().position(|l| l == "fatal: no newline");
        let exited = logs
            .iter()
            .position(|l| l == "Gateway exited with code 3");
        assert!(fatal.is_some(), "logs: {:?}", logs);
        assert!(exited.is_some(), "logs: {:?}", logs);
        assert!(fatal < exited, "logs: {:?}", logs);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_during_output_flush_is_logged() {
        // The background sleep keeps the pipes open after the shell exits
        let supervisor = GatewaySupervisor::new(shell("(sleep 1) & exit 3"));

        supervisor.start().await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        supervisor.stop().await;

        assert_eq!(supervisor.state(), GatewayState::Stopped);
        assert!(
            logs_contain(&supervisor, "Gateway exited with code 3"),
            "logs: {:?}",
            supervisor.logs()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stopped_gateway_exit_is_not_logged() {
        let supervisor = GatewaySupervisor::new(shell("exec sleep 60"));

        supervisor.start().await;
        supervisor.stop().await;

        assert!(!logs_contain(&supervisor, "Gateway exited"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_drop_kills_gateway() {
        let supervisor = GatewaySupervisor::new(shell("exec sleep 60"));
        supervisor.start().await;
        let pid = supervisor.status().pid.expect("running gateway has a pid") as i32;

        drop(supervisor);

        let gone = wait_for(
            || unsafe { libc::kill(pid, 0) } != 0,
            Duration::from_secs(5),
        )
        .await;
        assert!(gone, "gateway {} still alive after drop", pid);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let supervisor = GatewaySupervisor::new(shell(
            r#"trap '' TERM; echo ready; while true; do sleep 0.1; done"#,
        ));

        supervisor.start().await;
        assert!(wait_for(|| logs_contain(&supervisor, "ready"), Duration::from_secs(5)).await);

        let started = Instant::now();
        supervisor.stop().await;

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert_eq!(supervisor.state(), GatewayState::Stopped);
        assert!(!logs_contain(&supervisor, "Gateway exited with"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restart_replaces_process_and_keeps_logs() {
        let supervisor = GatewaySupervisor::new(shell("echo started; exec sleep 60"));

        supervisor.start().await;
        assert!(wait_for(|| logs_contain(&supervisor, "started"), Duration::from_secs(5)).await);
        let first_pid = supervisor.status().pid;

        supervisor.restart().await;

        let status = supervisor.status();
        assert_eq!(status.state, GatewayState::Running);
        assert_eq!(status.restart_count, 1);
        assert_ne!(status.pid, first_pid);

        let started_twice = || supervisor.logs().iter().filter(|l| *l == "started").count() == 2;
        assert!(wait_for(started_twice, Duration::from_secs(5)).await);

        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_starts_spawn_one_process() {
        let supervisor = GatewaySupervisor::new(shell("echo spawned; exec sleep 60"));

        tokio::join!(supervisor.start(), supervisor.start(), supervisor.start());

        assert!(wait_for(|| logs_contain(&supervisor, "spawned"), Duration::from_secs(5)).await);
        tokio::time::sleep(Duration::from_millis(200)).await;
        let spawned = supervisor.logs().iter().filter(|l| *l == "spawned").count();
        assert_eq!(spawned, 1);

        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_concurrent_stop_and_restart_serialize() {
        let supervisor = GatewaySupervisor::new(shell("exec sleep 60"));
        supervisor.start().await;

        tokio::join!(supervisor.stop(), supervisor.restart(), supervisor.stop());

        let status = supervisor.status();
        assert_eq!(status.restart_count, 1);
        assert!(matches!(
            status.state,
            GatewayState::Stopped | GatewayState::Running
        ));

        supervisor.stop().await;
        assert_eq!(supervisor.state(), GatewayState::Stopped);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_log_capacity_is_respected() {
        let supervisor = GatewaySupervisor::new(
            shell("i=1; while [ $i -le 20 ]; do echo line $i; i=$((i+1)); done; exec sleep 60")
                .with_log_capacity(5),
        );

        supervisor.start().await;
        assert!(wait_for(|| logs_contain(&supervisor, "line 20"), Duration::from_secs(5)).await);

        let logs = supervisor.logs();
        assert_eq!(logs.len(), 5);
        assert_eq!(logs.first().unwrap(), "line 16");

        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_environment_is_passed() {
        let mut env = std::collections::HashMap::new();
        env.insert("CLAWGATE_TEST_VALUE".to_string(), "from-env".to_string());
        let supervisor = GatewaySupervisor::new(
            shell("echo value=$CLAWGATE_TEST_VALUE; exec sleep 60").with_env(env),
        );

        supervisor.start().await;
        assert!(wait_for(|| logs_contain(&supervisor, "value=from-env"), Duration::from_secs(5)).await);

        supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_stops_and_refuses_start() {
        let supervisor = GatewaySupervisor::new(shell("exec sleep 60"));
        supervisor.start().await;
        assert_eq!(supervisor.state(), GatewayState::Running);

        supervisor.shutdown().await;
        assert_eq!(supervisor.state(), GatewayState::Stopped);

        supervisor.start().await;
        assert_eq!(supervisor.state(), GatewayState::Stopped);
    }
}
