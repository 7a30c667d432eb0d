// runner.rs - phpcs subprocess invocation
//
// Spawns phpcs for one document snapshot, feeds it the document text on
// stdin, and collects stdout/stderr under a hard timeout. Cancellation
// interrupts a still-running process; the caller decides what to do with
// the outcome.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::resolve_executable;
use crate::error::LintError;
use crate::perf::{self, TimingGuard};
use crate::state::DocumentSnapshot;

/// Hard limit on a single phpcs run, independent of cancellation
pub const PROCESS_TIMEOUT: Duration = Duration::from_millis(2000);

/// How long to keep draining output pipes after the process is gone.
/// A grandchild that inherited the pipes can otherwise hold them open.
const STREAM_GRACE: Duration = Duration::from_millis(250);

/// Per-run inputs resolved from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub executables_folder: String,
    pub standard: String,
    /// First workspace folder on disk, if any
    pub working_dir: Option<PathBuf>,
}

/// How a run ended, once the process exited and its streams closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancellation was requested; output (if any) is discarded
    Cancelled,
    /// Nothing on stdout. phpcs prints nothing when it fails internally,
    /// so this means "no new information", not "no findings".
    Empty,
    Output { stdout: String, stderr: String },
}

/// Something that can lint a document snapshot
#[async_trait]
pub trait Linter: Send + Sync {
    async fn run(
        &self,
        snapshot: &DocumentSnapshot,
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, LintError>;
}

/// Build the phpcs argument list for a snapshot.
///
/// The text always goes through stdin (`-`); `--stdin-path` only tells phpcs
/// which file name to report and which rulesets apply.
pub fn build_args(snapshot: &DocumentSnapshot, standard: &str) -> Vec<String> {
    let mut args = vec![
        String::from("--report=json"),
        format!("--standard={}", standard),
        String::from("-q"),
    ];
    if let Some(path) = snapshot.file_path() {
        args.push(format!("--stdin-path={}", path.display()));
    }
    args.push(String::from("-"));
    args
}

/// Runs the real phpcs executable
pub struct PhpcsRunner {
    timeout: Duration,
}

impl Default for PhpcsRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl PhpcsRunner {
    pub fn new() -> Self {
        Self {
            timeout: PROCESS_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Linter for PhpcsRunner {
    async fn run(
        &self,
        snapshot: &DocumentSnapshot,
        options: &RunOptions,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, LintError> {
        if cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        let _timing = TimingGuard::with_threshold("phpcs run", 1000);
        perf::increment_runs_started();

        let program = resolve_executable(&options.executables_folder, options.working_dir.as_deref());
        let args = build_args(snapshot, &options.standard);
        log::trace!("Running {} {}", program.display(), args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(wd) = &options.working_dir {
            cmd.current_dir(wd);
        }

        let mut child = cmd.spawn().map_err(|source| LintError::Spawn {
            program: program.clone(),
            source,
        })?;
        let deadline = Instant::now() + self.timeout;

        if let Some(mut stdin) = child.stdin.take() {
            let text = snapshot.text.clone();
            tokio::spawn(async move {
                // phpcs reads until EOF; dropping stdin closes it
                if let Err(e) = stdin.write_all(text.as_bytes()).await {
                    log::trace!("Failed to write document to phpcs stdin: {}", e);
                }
            });
        }
        let stdout_task = spawn_reader(child.stdout.take());
        let stderr_task = spawn_reader(child.stderr.take());

        let cancelled = wait_for_exit(&mut child, &cancel, deadline, self.timeout).await;

        let drain_deadline = deadline.max(Instant::now()) + STREAM_GRACE;
        let stdout = collect(stdout_task, drain_deadline).await;
        let stderr = collect(stderr_task, drain_deadline).await;

        if cancelled {
            return Ok(RunOutcome::Cancelled);
        }
        // Only silence counts as empty; stray whitespace is a malformed report
        if stdout.is_empty() {
            if !stderr.trim().is_empty() {
                log::trace!("phpcs produced no report; stderr: {}", stderr.trim());
            }
            return Ok(RunOutcome::Empty);
        }
        Ok(RunOutcome::Output { stdout, stderr })
    }
}

/// Wait until the child exits or the deadline kills it.
///
/// Returns whether cancellation was requested along the way. The first
/// cancellation interrupts the child; it is never signalled twice.
async fn wait_for_exit(
    child: &mut Child,
    cancel: &CancellationToken,
    deadline: Instant,
    timeout: Duration,
) -> bool {
    let mut cancelled = false;
    let timer = tokio::time::sleep_until(deadline);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            status = child.wait() => {
                match status {
                    Ok(status) => log::trace!("phpcs exited with {}", status),
                    Err(e) => log::warn!("Failed to wait for phpcs: {}", e),
                }
                return cancelled;
            }
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                interrupt(child);
            }
            _ = &mut timer => {
                log::warn!("phpcs did not finish within {:?}, killing it", timeout);
                if let Err(e) = child.kill().await {
                    log::trace!("Failed to kill phpcs: {}", e);
                }
                return cancelled;
            }
        }
    }
}

/// Ask a running child to stop. No-op once it has been reaped.
fn interrupt(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: `pid` is our own child and has not been reaped yet
            // (`Child::id` returns None after that).
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
            if ret == -1 {
                log::trace!(
                    "Failed to interrupt phpcs (pid {}): {}",
                    pid,
                    std::io::Error::last_os_error()
                );
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            log::trace!("Failed to stop phpcs: {}", e);
        }
    }
}

fn spawn_reader<R>(stream: Option<R>) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            let mut chunk = [0u8; 8192];
            loop {
                match stream.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        log::trace!("Error reading phpcs output: {}", e);
                        break;
                    }
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

async fn collect(mut task: JoinHandle<String>, deadline: Instant) -> String {
    match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            log::warn!("phpcs output reader failed: {}", e);
            String::new()
        }
        Err(_) => {
            log::trace!("phpcs output stream still open after exit, abandoning it");
            task.abort();
            String::new()
        }
    }
}
