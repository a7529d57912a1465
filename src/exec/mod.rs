//! Local command execution.
//!
//! Every external tool rigup drives (`apt-get`, `dpkg`, `git`, `rbenv`, ...)
//! goes through a [`CommandRunner`], so installers can be exercised in tests
//! against a scripted runner instead of the real host.
//!
//! ## Module structure
//! - `privilege` - the escalation capability used for system-wide mutations
//! - `fake` - scripted runner for tests

mod privilege;

#[cfg(test)]
pub mod fake;

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

use crate::error::{ProvisionError, Result};

pub use privilege::Privilege;

/// Limit for read-only queries (`dpkg-query`, `id`, `rbenv versions`).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Time a stopped command gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// A command to run, described without running it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    /// Inherit stdout/stderr instead of capturing them (long builds, apt progress).
    pub stream: bool,
    pub timeout: Option<Duration>,
    /// Stay in rigup's process group so the command can prompt on the terminal.
    ///
    /// Other commands get a process group of their own, which is signalled as
    /// a whole when they time out or are cancelled.
    pub terminal: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn on_terminal(mut self) -> Self {
        self.terminal = true;
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{}={} ", key, quote(value))?;
        }
        write!(f, "{}", quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

fn quote(s: &str) -> String {
    if !s.is_empty() && !s.chars().any(|c| c.is_whitespace() || c == '\'' || c == '"') {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Output from a finished command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Standard output (empty when streamed).
    pub stdout: String,
    /// Standard error (empty when streamed).
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into `ProvisionError::CommandFailed`.
    pub fn into_result(self, spec: &CommandSpec) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            Err(ProvisionError::CommandFailed {
                command: spec.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands on the host.
///
/// `run` only fails when the command could not be started or timed out; a
/// non-zero exit is reported through [`CommandOutput::code`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Locate an executable on the search path.
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Runner backed by `tokio::process`.
pub struct SystemRunner {
    default_timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::inherit())
            .kill_on_drop(cfg!(not(unix)));

        #[cfg(unix)]
        if !spec.terminal {
            cmd.process_group(0);
        }

        if spec.stream {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        tracing::debug!(command = %spec, "running");

        let spawn_error = |source| ProvisionError::Spawn {
            command: spec.to_string(),
            source,
        };

        let mut child = cmd.spawn().map_err(spawn_error)?;
        let mut guard = ChildGuard::new(&child, !spec.terminal);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let finished = {
            let collect = async {
                let (status, stdout, stderr) =
                    tokio::join!(child.wait(), read_pipe(stdout), read_pipe(stderr));
                Ok::<_, std::io::Error>((status?, stdout?, stderr?))
            };
            match spec.timeout.or(self.default_timeout) {
                Some(limit) => tokio::time::timeout(limit, collect)
                    .await
                    .map_err(|_| limit),
                None => Ok(collect.await),
            }
        };

        let (status, stdout, stderr) = match finished {
            Ok(collected) => {
                guard.disarm();
                collected.map_err(spawn_error)?
            }
            Err(limit) => {
                tracing::warn!(command = %spec, "timed out after {:?}, stopping", limit);
                guard.terminate(&mut child).await;
                return Err(ProvisionError::CommandTimeout {
                    command: spec.to_string(),
                    elapsed: limit,
                });
            }
        };

        Ok(CommandOutput {
            code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
        })
    }
}

async fn read_pipe<R: AsyncRead + Unpin>(pipe: Option<R>) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

/// Stops a running child when its future is dropped (timeout or SIGINT/SIGTERM).
///
/// A child in its own process group is stopped together with everything it
/// started. A terminal child (the privilege escalator) only gets SIGTERM, which
/// sudo relays to the command it runs.
struct ChildGuard {
    pid: Option<u32>,
    group: bool,
}

impl ChildGuard {
    fn new(child: &Child, group: bool) -> Self {
        Self {
            pid: child.id(),
            group,
        }
    }

    fn disarm(&mut self) {
        self.pid = None;
    }

    #[cfg(unix)]
    fn send(&self, signal: nix::sys::signal::Signal) {
        use nix::sys::signal::{kill, killpg};
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return;
        };
        let pid = Pid::from_raw(pid as i32);
        let sent = if self.group {
            killpg(pid, signal)
        } else {
            kill(pid, signal)
        };
        if let Err(e) = sent {
            if e != nix::errno::Errno::ESRCH {
                tracing::debug!("Could not send {} to {}: {}", signal, pid, e);
            }
        }
    }

    #[cfg(unix)]
    async fn terminate(&mut self, child: &mut Child) {
        use nix::sys::signal::Signal;

        self.send(Signal::SIGTERM);
        let exited = tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok();
        if !exited || self.group {
            self.send(Signal::SIGKILL);
        }
        let _ = child.wait().await;
        self.disarm();
    }

    #[cfg(not(unix))]
    async fn terminate(&mut self, child: &mut Child) {
        let _ = child.kill().await;
        self.disarm();
    }
}

// Without process groups the child is `kill_on_drop` instead.
#[cfg(unix)]
impl Drop for ChildGuard {
    fn drop(&mut self) {
        use nix::sys::signal::Signal;

        if self.group {
            self.send(Signal::SIGKILL);
        } else {
            self.send(Signal::SIGTERM);
        }
    }
}
