use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use crate::{Error, Limits, ProtocolErrorKind, read_line_limited};

/// How long `terminate` waits after SIGTERM before escalating to SIGKILL.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// A child process spawned with stdin/stdout/stderr pipes.
///
/// The handle exclusively owns the child. `terminate` is infallible and
/// idempotent; callers are expected to invoke it on every exit path. As a
/// backstop, the child is spawned with `kill_on_drop` so a panic between spawn
/// and terminate does not leak a process.
pub struct PipeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    stderr: BufReader<ChildStderr>,
    limits: Limits,
}

impl PipeProcess {
    pub async fn spawn(program: &str, args: &[String]) -> Result<Self, Error> {
        Self::spawn_with_limits(program, args, Limits::default()).await
    }

    pub async fn spawn_with_limits(
        program: &str,
        args: &[String],
        limits: Limits,
    ) -> Result<Self, Error> {
        if program.is_empty() {
            return Err(Error::protocol(
                ProtocolErrorKind::InvalidInput,
                "program must not be empty",
            ));
        }

        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            Error::protocol(ProtocolErrorKind::Spawn, format!("spawn {program}: {err}"))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::protocol(ProtocolErrorKind::Other, "child stdin not captured"))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::protocol(ProtocolErrorKind::Other, "child stdout not captured")
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            Error::protocol(ProtocolErrorKind::Other, "child stderr not captured")
        })?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            stderr: BufReader::new(stderr),
            limits,
        })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn exit_code(&mut self) -> Option<i32> {
        self.child
            .try_wait()
            .ok()
            .flatten()
            .and_then(|status| status.code())
    }

    pub async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(Error::protocol(
                ProtocolErrorKind::Closed,
                "child stdin already closed",
            ));
        };
        stdin.write_all(data).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Reads one line from the child's stdout, bounded by `timeout`.
    ///
    /// `Ok(None)` means EOF. A deadline overrun yields
    /// `ProtocolErrorKind::Timeout`; the caller still owns the child and must
    /// terminate it.
    pub async fn read_stdout_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        let read = read_line_limited(&mut self.stdout, self.limits.max_message_bytes);
        match tokio::time::timeout(timeout, read).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::protocol(
                ProtocolErrorKind::Timeout,
                format!("stdout read timed out after {timeout:?}"),
            )),
        }
    }

    pub async fn read_stderr_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, Error> {
        let read = read_line_limited(&mut self.stderr, self.limits.max_message_bytes);
        match tokio::time::timeout(timeout, read).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(Error::protocol(
                ProtocolErrorKind::Timeout,
                format!("stderr read timed out after {timeout:?}"),
            )),
        }
    }

    /// Terminates the child: close stdin, SIGTERM, wait up to one second,
    /// then SIGKILL and reap.
    pub async fn terminate(&mut self) {
        // Closing stdin first lets well-behaved servers exit on EOF.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }

        if matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }

        if let Some(pid) = self.child.id() {
            send_sigterm(pid);
            if tokio::time::timeout(TERMINATE_GRACE, self.child.wait())
                .await
                .is_ok()
            {
                return;
            }
        }

        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) {
    // SAFETY: plain kill(2) on a pid we spawned and still own; no memory is
    // touched and an ESRCH race is benign.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) {}
