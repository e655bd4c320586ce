use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use wait_timeout::ChildExt;

/// Seam over external program execution; every OS interaction goes through it.
pub trait Exec {
    fn run(&self, request: ExecRequest) -> Result<ExecOutput>;
}

/// Structured command execution with timeouts.
#[derive(Debug, Clone)]
pub struct ExecService {
    default_timeout: Duration,
}

impl ExecService {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Exec for ExecService {
    fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        tracing::debug!(command = %request.command_line(), "exec");

        let mut cmd = Command::new(&request.program);
        cmd.args(&request.args);
        for (key, value) in &request.env {
            cmd.env(key, value);
        }

        if request.capture_output {
            cmd.stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "failed to spawn {:?} with args {:?}",
                request.program, request.args
            )
        })?;

        // Pipes are drained while waiting so a chatty child cannot fill them and stall.
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let timeout = request.timeout.unwrap_or(self.default_timeout);
        let started = Instant::now();
        let status = if timeout.is_zero() {
            child.wait().context("failed to wait for process")?
        } else {
            match child
                .wait_timeout(timeout)
                .context("failed to wait with timeout")?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    // Readers are left detached: a grandchild may still hold the pipes.
                    return Err(anyhow!(
                        "command {:?} timed out after {:?}",
                        request.program,
                        timeout
                    ));
                }
            }
        };

        let duration = started.elapsed();
        let stdout = collect(stdout_reader)?;
        let stderr = collect(stderr_reader)?;
        tracing::debug!(code = ?status.code(), ?duration, "exec finished");

        Ok(ExecOutput {
            code: status.code(),
            duration,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut stream: R) -> JoinHandle<io::Result<String>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    })
}

fn collect(reader: Option<JoinHandle<io::Result<String>>>) -> Result<String> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| anyhow!("output reader thread panicked"))?
            .context("failed to read process output"),
        None => Ok(String::new()),
    }
}

impl Default for ExecService {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ExecRequest {
    program: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
    timeout: Option<Duration>,
    capture_output: bool,
}

impl ExecRequest {
    /// New request; the environment is inherited, output is captured unless changed.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            capture_output: true,
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }

    /// Foreground mode: stdio attached to the terminal and no timeout.
    pub fn foreground(self) -> Self {
        self.capture_output(false).timeout(Duration::ZERO)
    }

    pub fn env_list(&self) -> &[(OsString, OsString)] {
        &self.env
    }

    /// Shell-escaped preview of the full command line.
    pub fn command_line(&self) -> String {
        let mut words = vec![self.program.to_string_lossy().into_owned()];
        words.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        crate::shell_join(&words)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    /// Exit code; None when the process was terminated by a signal.
    pub code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Trimmed stderr, or the exit code when stderr is empty.
    pub fn failure_reason(&self) -> String {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err.to_string();
        }
        match self.code {
            Some(c) => format!("exit status {c}"),
            None => "terminated by signal".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_escapes_words() {
        let req = ExecRequest::new("mount")
            .args(["-o", "lowerdir=/a b"])
            .arg("/m");
        assert_eq!(req.command_line(), "mount -o 'lowerdir=/a b' /m");
    }

    #[test]
    fn test_failure_reason_prefers_stderr() {
        let out = ExecOutput {
            code: Some(2),
            stderr: "  no such set\n".to_string(),
            ..ExecOutput::default()
        };
        assert_eq!(out.failure_reason(), "no such set");
        let out = ExecOutput {
            code: Some(3),
            ..ExecOutput::default()
        };
        assert_eq!(out.failure_reason(), "exit status 3");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_service_captures_stdout() {
        let svc = ExecService::default();
        let out = svc
            .run(ExecRequest::new("sh").args(["-c", "echo hi; exit 4"]))
            .expect("sh should spawn");
        assert_eq!(out.code, Some(4));
        assert_eq!(out.stdout, "hi\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_service_reads_output_larger_than_a_pipe_buffer() {
        let svc = ExecService::new(Duration::from_secs(10));
        let out = svc
            .run(ExecRequest::new("sh").args([
                "-c",
                "head -c 300000 /dev/zero | tr '\\0' a; echo done >&2",
            ]))
            .expect("large output must not stall until the timeout");
        assert_eq!(out.code, Some(0));
        assert_eq!(out.stdout.len(), 300_000);
        assert_eq!(out.stderr, "done\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_service_times_out() {
        let svc = ExecService::new(Duration::from_millis(100));
        let err = svc
            .run(ExecRequest::new("sleep").arg("5"))
            .expect_err("sleep must time out");
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
