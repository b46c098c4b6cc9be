//! Process invocation: runs one MCP server process per call.
//!
//! Two interchangeable transports deliver the request batch:
//! - [`PipedStdin`] writes the batch to the child's stdin while draining
//!   stdout/stderr concurrently, then awaits the exit status.
//! - [`FileRedirect`] writes the batch to a temporary file that becomes the
//!   child's stdin. The file is removed when its guard drops, on every path.
//!
//! Both bound the run with a timeout and spawn with `kill_on_drop`, so a
//! timed-out or abandoned invocation never leaves the process running. On
//! Unix the server also gets its own process group, and that group is killed
//! with it, taking down grandchildren started by launchers like `npx`.

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};

use super::errors::{truncate_detail, BridgeError};
use super::types::{ProcessOutput, ServerConfig};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default upper bound for a single server run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Read buffer size for draining child output.
const READ_CHUNK: usize = 8 * 1024;

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Runs a server command with a request payload and collects its output.
///
/// A non-zero exit is not an error at this layer: the output is returned and
/// the caller decides. Errors are limited to spawn failures and timeouts.
#[async_trait]
pub trait ProcessInvoker: Send + Sync {
    async fn run(&self, config: &ServerConfig, payload: &str) -> Result<ProcessOutput, BridgeError>;
}

/// Which transport delivers the batch to the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    PipedStdin,
    FileRedirect,
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "piped_stdin" | "piped" | "stdin" => Ok(TransportKind::PipedStdin),
            "file_redirect" | "file" => Ok(TransportKind::FileRedirect),
            other => Err(format!("unknown transport '{other}'")),
        }
    }
}

/// Build the invoker for a transport.
pub fn invoker_for(
    kind: TransportKind,
    timeout: Duration,
    temp_dir: Option<PathBuf>,
) -> Arc<dyn ProcessInvoker> {
    match kind {
        TransportKind::PipedStdin => Arc::new(PipedStdin::new(timeout)),
        TransportKind::FileRedirect => {
            let invoker = FileRedirect::new(timeout);
            Arc::new(match temp_dir {
                Some(dir) => invoker.with_temp_dir(dir),
                None => invoker,
            })
        }
    }
}

// ─── Command Setup ───────────────────────────────────────────────────────────

/// Command with args, merged environment, working directory and captured output.
fn base_command(config: &ServerConfig) -> Command {
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    if let Some(dir) = config.cwd.as_deref() {
        cmd.current_dir(dir);
    }

    // Windows: prevent console window from appearing for child processes
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Kills the server's process group when dropped, unless disarmed.
struct GroupGuard {
    pgid: Option<i32>,
}

impl GroupGuard {
    fn new(child: &tokio::process::Child) -> Self {
        Self {
            pgid: child.id().and_then(|pid| i32::try_from(pid).ok()),
        }
    }

    /// The server exited on its own; leave the group alone.
    fn disarm(&mut self) {
        self.pgid = None;
    }

    fn kill(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        #[cfg(unix)]
        {
            // SAFETY: killpg takes plain integers and only sends a signal.
            if unsafe { libc::killpg(pgid, libc::SIGKILL) } == 0 {
                tracing::debug!(pgid, "killed server process group");
            }
        }
        #[cfg(not(unix))]
        let _ = pgid;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

fn spawn_error(config: &ServerConfig, reason: impl std::fmt::Display) -> BridgeError {
    BridgeError::ProcessSpawnError {
        name: config.name.clone(),
        command: config.command_line(),
        reason: reason.to_string(),
    }
}

fn timeout_error(config: &ServerConfig, timeout: Duration) -> BridgeError {
    BridgeError::ProcessTimeout {
        name: config.name.clone(),
        timeout_ms: timeout.as_millis() as u64,
    }
}

/// Drain a child stream to the end, chunk by chunk, in arrival order.
async fn drain<R: AsyncRead + Unpin>(stream: Option<R>, server: &str, label: &str) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };

    let mut collected = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tracing::trace!(server, stream = label, bytes = n, "received output chunk");
                collected.extend_from_slice(&chunk[..n]);
            }
            Err(e) => {
                tracing::warn!(server, stream = label, error = %e, "failed to read server output");
                break;
            }
        }
    }

    String::from_utf8_lossy(&collected).into_owned()
}

/// Write the payload to stdin and close it so the server sees EOF.
async fn write_payload(stdin: Option<ChildStdin>, payload: &str, server: &str) {
    let Some(mut stdin) = stdin else {
        return;
    };

    // A server that exits without reading its input closes the pipe early;
    // the exit status reports the real outcome.
    if let Err(e) = stdin.write_all(payload.as_bytes()).await {
        tracing::debug!(server, error = %e, "stdin write interrupted");
        return;
    }
    if let Err(e) = stdin.shutdown().await {
        tracing::debug!(server, error = %e, "stdin close failed");
    }
}

// ─── PipedStdin ──────────────────────────────────────────────────────────────

/// Streams the batch over a stdin pipe.
#[derive(Debug, Clone)]
pub struct PipedStdin {
    timeout: Duration,
}

impl PipedStdin {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for PipedStdin {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ProcessInvoker for PipedStdin {
    async fn run(&self, config: &ServerConfig, payload: &str) -> Result<ProcessOutput, BridgeError> {
        let mut cmd = base_command(config);
        cmd.stdin(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| spawn_error(config, e))?;
        tracing::debug!(
            server = %config.name,
            pid = child.id().unwrap_or_default(),
            transport = "piped_stdin",
            "spawned server process"
        );
        let mut group = GroupGuard::new(&child);

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let name = config.name.as_str();

        let exchange = async {
            let (_, stdout, stderr) = tokio::join!(
                write_payload(stdin, payload, name),
                drain(stdout, name, "stdout"),
                drain(stderr, name, "stderr"),
            );
            let status = child.wait().await;
            (stdout, stderr, status)
        };

        let outcome = tokio::time::timeout(self.timeout, exchange).await;
        if outcome.is_ok() {
            group.disarm();
        }
        match outcome {
            Ok((stdout, stderr, Ok(status))) => Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code: status.code(),
            }),
            Ok((stdout, stderr, Err(e))) => {
                tracing::warn!(server = name, error = %e, "failed to reap server process");
                Ok(ProcessOutput {
                    stdout,
                    stderr: format!("{stderr}\nwait failed: {e}"),
                    exit_code: None,
                })
            }
            Err(_) => {
                tracing::warn!(
                    server = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "server process timed out, killing"
                );
                group.kill();
                let _ = child.kill().await;
                Err(timeout_error(config, self.timeout))
            }
        }
    }
}

// ─── FileRedirect ────────────────────────────────────────────────────────────

/// Delivers the batch through a temporary file used as the child's stdin.
#[derive(Debug, Clone)]
pub struct FileRedirect {
    timeout: Duration,
    temp_dir: Option<PathBuf>,
}

impl FileRedirect {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            temp_dir: None,
        }
    }

    /// Create batch files in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    fn write_batch_file(&self, payload: &str) -> std::io::Result<tempfile::NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mcp-batch-").suffix(".json");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

impl Default for FileRedirect {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

#[async_trait]
impl ProcessInvoker for FileRedirect {
    async fn run(&self, config: &ServerConfig, payload: &str) -> Result<ProcessOutput, BridgeError> {
        // Removed from disk when dropped at the end of this scope.
        let batch_file = self
            .write_batch_file(payload)
            .map_err(|e| spawn_error(config, format!("failed to write batch file: {e}")))?;
        let input = batch_file
            .reopen()
            .map_err(|e| spawn_error(config, format!("failed to open batch file: {e}")))?;

        let mut cmd = base_command(config);
        cmd.stdin(Stdio::from(input));

        let child = cmd.spawn().map_err(|e| spawn_error(config, e))?;
        tracing::debug!(
            server = %config.name,
            pid = child.id().unwrap_or_default(),
            transport = "file_redirect",
            batch_file = %batch_file.path().display(),
            "spawned server process"
        );
        let mut group = GroupGuard::new(&child);

        // Dropping the future on timeout drops the child, which kills it.
        let outcome = tokio::time::timeout(self.timeout, child.wait_with_output()).await;
        if outcome.is_ok() {
            group.disarm();
        }
        match outcome {
            Ok(Ok(output)) => Ok(ProcessOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
            }),
            Ok(Err(e)) => {
                tracing::warn!(server = %config.name, error = %e, "failed to collect server output");
                Ok(ProcessOutput {
                    stdout: String::new(),
                    stderr: truncate_detail(&format!("wait failed: {e}")),
                    exit_code: None,
                })
            }
            Err(_) => {
                tracing::warn!(
                    server = %config.name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "server process timed out, killing"
                );
                Err(timeout_error(config, self.timeout))
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
