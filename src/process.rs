use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Grace period between SIGTERM and SIGKILL when a command times out.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// A command line run by one of the CLI text generators.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
    /// Tag prepended to every logged output line.
    pub log_prefix: String,
    pub env: Vec<(String, String)>,
    /// Written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
}

#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub signal: Option<i32>,
    pub stdout_lines: Vec<String>,
    pub stderr_lines: Vec<String>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && self.signal.is_none()
    }
}

/// Run `spec` to completion, capturing stdout and stderr line by line.
///
/// On Unix the child leads its own process group, so a timeout takes down
/// anything it spawned as well.
pub async fn run_command(spec: CommandSpec) -> Result<CommandOutput> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .current_dir(&spec.working_dir)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(match spec.stdin {
            Some(_) => Stdio::piped(),
            None => Stdio::null(),
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("failed to spawn '{}': {e}", spec.program)))?;
    let pid = child
        .id()
        .ok_or_else(|| Error::Process("child exited before it could be tracked".into()))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("stdout is not piped".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| Error::Process("stderr is not piped".into()))?;
    let stdout_task = collect_lines(stdout, spec.log_prefix.clone(), false);
    let stderr_task = collect_lines(stderr, spec.log_prefix, true);

    // Fed concurrently with the readers so a child that writes before it has
    // drained stdin cannot deadlock, and the timeout below still applies.
    let stdin_task = match spec.stdin {
        Some(input) => {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| Error::Process("stdin is not piped".into()))?;
            Some(tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    warn!(error = %e, "failed to write stdin");
                }
                // Dropping the handle closes the pipe so the child sees EOF.
            }))
        }
        None => None,
    };

    let waited = match spec.timeout {
        Some(limit) => tokio::time::timeout(limit, child.wait()).await.ok(),
        None => Some(child.wait().await),
    };
    let Some(status) = waited else {
        terminate_group(pid).await;
        if let Some(task) = stdin_task {
            task.abort();
        }
        stdout_task.abort();
        stderr_task.abort();
        let limit = spec.timeout.unwrap_or_default();
        return Err(Error::Process(format!("command timed out after {limit:?}")));
    };
    let status = status.map_err(|e| Error::Process(format!("wait error: {e}")))?;
    if let Some(task) = stdin_task {
        // A child that exits without reading stdin leaves the writer blocked.
        task.abort();
    }

    let stdout_lines = stdout_task
        .await
        .map_err(|e| Error::Process(format!("stdout reader failed: {e}")))?;
    let stderr_lines = stderr_task
        .await
        .map_err(|e| Error::Process(format!("stderr reader failed: {e}")))?;
    let (exit_code, signal) = exit_info(&status);

    Ok(CommandOutput {
        exit_code,
        signal,
        stdout_lines,
        stderr_lines,
    })
}

fn collect_lines<R>(stream: R, prefix: String, is_stderr: bool) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut collected = Vec::new();
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_stderr {
                warn!("[{prefix}] {line}");
            } else {
                debug!("[{prefix}] {line}");
            }
            collected.push(line);
        }
        collected
    })
}

/// SIGTERM the child's process group, then SIGKILL whatever is left.
#[cfg(unix)]
async fn terminate_group(pid: u32) {
    let pgid = pid as libc::pid_t;
    // SAFETY: signalling a process group we created has no memory-safety impact.
    unsafe {
        libc::killpg(pgid, libc::SIGTERM);
    }
    tokio::time::sleep(KILL_GRACE).await;
    unsafe {
        libc::killpg(pgid, libc::SIGKILL);
    }
}

#[cfg(not(unix))]
async fn terminate_group(_pid: u32) {}

/// Exit code and terminating signal. Signal deaths use the shell's 128+N convention.
fn exit_info(status: &ExitStatus) -> (i32, Option<i32>) {
    if let Some(code) = status.code() {
        return (code, None);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return (128 + sig, Some(sig));
        }
    }
    (-1, None)
}
