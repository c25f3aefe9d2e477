//! External validator process management
//!
//! Every validation is a fresh, short-lived process: `<command> [args...] <file>`.
//! Its stdout and stderr are read concurrently into capped buffers while the
//! process runs under a wall-clock timeout. On unix the process leads its own
//! process group; whenever a run ends, on expiry or on a normal exit, the
//! whole group is killed so wrapper scripts cannot leave descendants behind.

use super::verdict::parse_verdict;
use crate::config::ValidatorConfig;
use crate::download::PdfResource;
use crate::report::{ValidationResult, ValidationStatus};
use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// How long output readers may lag behind process exit
const READER_GRACE: Duration = Duration::from_secs(5);

/// Timeout for the version query
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Captured output of one process stream
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Reads a stream to its end, keeping at most `cap` bytes
///
/// The rest is drained and dropped so the child never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> Captured {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let room = cap.saturating_sub(captured.bytes.len());
                captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
                if n > room {
                    captured.truncated = true;
                }
            }
        }
    }

    captured
}

fn spawn_reader<R>(reader: Option<R>, cap: usize) -> Option<JoinHandle<Captured>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    reader.map(|r| tokio::spawn(read_capped(r, cap)))
}

async fn collect(handle: Option<JoinHandle<Captured>>) -> Captured {
    let Some(mut handle) = handle else {
        return Captured::default();
    };
    match tokio::time::timeout(READER_GRACE, &mut handle).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(_)) => Captured::default(),
        Err(_) => {
            handle.abort();
            Captured::default()
        }
    }
}

/// Sends SIGKILL to the process group led by `pid`
///
/// A group with no members left (ESRCH) is not an error.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pgid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and touches no memory of ours.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc != 0 {
        let e = std::io::Error::last_os_error();
        if e.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %e, "failed to kill validator process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Kills the validator's process group once, at the latest when dropped
///
/// Covers runs whose future is dropped mid-flight, where `kill_on_drop`
/// alone would only reach the group leader.
struct ProcessGroup(Option<u32>);

impl ProcessGroup {
    fn kill(&mut self) {
        kill_process_group(self.0.take());
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Why a process run ended without a normal exit
enum RunFailure {
    Spawn(std::io::Error),
    Wait(std::io::Error),
    TimedOut,
}

/// Output of a process that exited on its own
struct Finished {
    exit_code: Option<i32>,
    stdout: Captured,
    stderr: Captured,
}

/// Runs the external validator
#[derive(Debug)]
pub struct ValidatorInvoker {
    command: String,
    args: Vec<String>,
    version_args: Vec<String>,
    max_output_bytes: usize,
    invocations: AtomicU64,
}

impl ValidatorInvoker {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            version_args: config.version_args.clone(),
            max_output_bytes: config.max_output_bytes,
            invocations: AtomicU64::new(0),
        }
    }

    /// Number of validation processes started so far
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Asks the tool for its version; first non-empty output line
    pub async fn version(&self) -> Option<String> {
        if self.version_args.is_empty() {
            return None;
        }

        match self.run(&self.version_args, VERSION_TIMEOUT).await {
            Ok(finished) => {
                let text = if finished.stdout.bytes.is_empty() {
                    finished.stderr.text()
                } else {
                    finished.stdout.text()
                };
                text.lines()
                    .map(str::trim)
                    .find(|l| !l.is_empty())
                    .map(str::to_string)
            }
            Err(_) => {
                tracing::warn!(command = %self.command, "validator version query failed");
                None
            }
        }
    }

    /// Validates one downloaded file
    ///
    /// Never fails: every outcome, including a missing tool, is a result.
    pub async fn validate(&self, resource: &PdfResource, timeout: Duration) -> ValidationResult {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let mut args = self.args.clone();
        args.push(resource.local_path.to_string_lossy().into_owned());

        let started = Instant::now();
        let run = self.run(&args, timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let mut result = ValidationResult {
            duration_ms,
            byte_size: Some(resource.byte_size),
            ..ValidationResult::error(resource.resource_ref(), &resource.source_url, "")
        };

        match run {
            Err(RunFailure::TimedOut) => {
                tracing::warn!(file = %resource.source_url, secs = timeout.as_secs(), "validator timed out");
                result.status = ValidationStatus::Timeout;
                result.message = Some(format!(
                    "validator exceeded {}s and was killed",
                    timeout.as_secs()
                ));
            }
            Err(RunFailure::Spawn(e)) => {
                let message = match e.kind() {
                    ErrorKind::NotFound => format!("validator not found: {}", self.command),
                    ErrorKind::PermissionDenied => {
                        format!("permission denied running validator: {}", self.command)
                    }
                    _ => format!("failed to start validator: {}", e),
                };
                tracing::error!(file = %resource.source_url, "{}", message);
                result.message = Some(message);
            }
            Err(RunFailure::Wait(e)) => {
                result.message = Some(format!("lost track of validator process: {}", e));
            }
            Ok(finished) => self.interpret(finished, &mut result),
        }

        result
    }

    fn interpret(&self, finished: Finished, result: &mut ValidationResult) {
        result.raw_output = finished.stdout.text();

        if finished.stdout.truncated {
            result.message = Some(format!(
                "validator output exceeded {} bytes",
                self.max_output_bytes
            ));
            return;
        }

        match parse_verdict(&result.raw_output) {
            Ok(verdict) => {
                tracing::debug!(
                    file = %result.source_url,
                    status = %verdict.status,
                    findings = verdict.findings.len(),
                    exit_code = ?finished.exit_code,
                    "validator verdict"
                );
                result.status = verdict.status;
                result.profile = verdict.profile;
                result.rule_findings = verdict.findings;
                result.message = None;
            }
            Err(e) => {
                let stderr = finished.stderr.text();
                let stderr = stderr.trim();
                let mut message = format!("{} (exit code {:?})", e, finished.exit_code);
                if !stderr.is_empty() {
                    message.push_str(": ");
                    message.extend(stderr.chars().take(500));
                }
                tracing::warn!(file = %result.source_url, "{}", message);
                result.message = Some(message);
            }
        }
    }

    async fn run(&self, args: &[String], timeout: Duration) -> Result<Finished, RunFailure> {
        let mut command = Command::new(&self.command);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(RunFailure::Spawn)?;
        let mut group = ProcessGroup(child.id());

        let stdout = spawn_reader(child.stdout.take(), self.max_output_bytes);
        let stderr = spawn_reader(child.stderr.take(), self.max_output_bytes);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                // descendants still holding the pipes would stall the readers
                group.kill();
                Ok(Finished {
                    exit_code: status.code(),
                    stdout: collect(stdout).await,
                    stderr: collect(stderr).await,
                })
            }
            Ok(Err(e)) => {
                group.kill();
                Err(RunFailure::Wait(e))
            }
            Err(_) => {
                // the leader is not reaped yet, so its pid still names the group
                group.kill();
                // kill() also waits, so the process is reaped here
                if let Err(e) = child.kill().await {
                    tracing::error!(error = %e, "failed to kill validator process");
                }
                for handle in [stdout, stderr].into_iter().flatten() {
                    handle.abort();
                }
                Err(RunFailure::TimedOut)
            }
        }
    }
}
