//! Shell-backed remote channel.
//!
//! The session is one long-lived `sh` process, either spawned through
//! `ssh` on a lab jump host or spawned locally. Commands are written to
//! its stdin one at a time; each is followed by an `echo` of a sequence
//! marker and the exit status, which is how the reader finds the end of
//! the command:
//!
//! ```text
//! ( ping -c 1 -W 1 10.0.0.7 ) </dev/null >/dev/null 2>&1; echo "__rackgrid_done_42 $?"
//! ```
//!
//! A command that times out leaves its marker pending. The next `exec`
//! first reads up to that marker before it sends anything new; if the
//! stale command still has not finished by then the session is reported
//! as lost.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, trace, warn};

use crate::channel::{RemoteChannel, RemoteSession};
use crate::error::{ChannelError, ChannelResult};

const MARKER_PREFIX: &str = "__rackgrid_done_";
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Where the shell runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellTarget {
    /// `sh` on this host.
    Local,
    /// `sh` on a remote host reached over `ssh`.
    Ssh(SshTarget),
}

/// SSH connection parameters. Authentication is key-based (`BatchMode`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub ssh_binary: String,
}

/// [`RemoteChannel`] that runs probe commands in a persistent shell.
#[derive(Debug, Clone)]
pub struct ShellChannel {
    target: ShellTarget,
}

impl ShellChannel {
    pub fn new(target: ShellTarget) -> Self {
        Self { target }
    }

    pub fn local() -> Self {
        Self::new(ShellTarget::Local)
    }

    pub fn ssh(target: SshTarget) -> Self {
        Self::new(ShellTarget::Ssh(target))
    }

    fn command(&self, timeout: Duration) -> Command {
        let mut cmd = match &self.target {
            ShellTarget::Local => Command::new("sh"),
            ShellTarget::Ssh(ssh) => {
                let mut cmd = Command::new(&ssh.ssh_binary);
                cmd.arg("-T")
                    .args(["-o", "BatchMode=yes"])
                    .args(["-o", "ServerAliveInterval=15"])
                    .arg("-o")
                    .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)))
                    .arg("-p")
                    .arg(ssh.port.to_string());
                if let Some(identity) = &ssh.identity_file {
                    cmd.arg("-i").arg(identity);
                }
                cmd.arg(format!("{}@{}", ssh.user, ssh.host)).arg("sh");
                cmd
            }
        };
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

impl RemoteChannel for ShellChannel {
    type Session = ShellSession;

    async fn connect(&self, timeout: Duration) -> ChannelResult<ShellSession> {
        let mut child = self
            .command(timeout)
            .spawn()
            .map_err(|e| ChannelError::Connect(format!("spawn {}: {e}", self.describe())))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ChannelError::Connect("shell stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ChannelError::Connect("shell stdout not captured".to_string()))?;

        let mut session = ShellSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            seq: 0,
            pending: None,
        };

        // The handshake is complete once the remote shell answers.
        match session.exec("true", timeout).await {
            Ok(0) => {
                debug!(target = %self.describe(), "shell session established");
                Ok(session)
            }
            Ok(code) => {
                session.close().await;
                Err(ChannelError::Connect(format!(
                    "handshake command exited with {code}"
                )))
            }
            Err(ChannelError::CommandTimeout(_)) => {
                session.close().await;
                Err(ChannelError::ConnectTimeout(timeout))
            }
            Err(e) => {
                session.close().await;
                Err(ChannelError::Connect(e.to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        match &self.target {
            ShellTarget::Local => "local shell".to_string(),
            ShellTarget::Ssh(ssh) => format!("ssh://{}@{}:{}", ssh.user, ssh.host, ssh.port),
        }
    }
}

/// A live shell process.
pub struct ShellSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    seq: u64,
    /// Marker of a command whose status line has not been read yet.
    pending: Option<String>,
}

impl ShellSession {
    async fn run(&mut self, command: &str) -> ChannelResult<i32> {
        if let Some(stale) = self.pending.clone() {
            trace!(marker = %stale, "draining output of timed-out command");
            self.read_status(&stale).await?;
            self.pending = None;
        }

        self.seq += 1;
        let marker = format!("{MARKER_PREFIX}{}", self.seq);
        self.pending = Some(marker.clone());

        let line = format!("( {command} ) </dev/null >/dev/null 2>&1; echo \"{marker} $?\"\n");
        self.stdin.write_all(line.as_bytes()).await.map_err(lost)?;
        self.stdin.flush().await.map_err(lost)?;

        let code = self.read_status(&marker).await?;
        self.pending = None;
        Ok(code)
    }

    async fn read_status(&mut self, marker: &str) -> ChannelResult<i32> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(lost)?
                .ok_or_else(|| ChannelError::Disconnected("remote shell exited".to_string()))?;
            if let Some(status) = line
                .strip_prefix(marker)
                .and_then(|rest| rest.strip_prefix(' '))
            {
                return status.trim().parse().map_err(|_| {
                    ChannelError::Disconnected(format!("unreadable status line {line:?}"))
                });
            }
            trace!(%line, "skipping shell output");
        }
    }
}

fn lost(e: std::io::Error) -> ChannelError {
    ChannelError::Disconnected(e.to_string())
}

impl RemoteSession for ShellSession {
    async fn exec(&mut self, command: &str, timeout: Duration) -> ChannelResult<i32> {
        let stale = self.pending.clone();
        match tokio::time::timeout(timeout, self.run(command)).await {
            Ok(result) => result,
            Err(_) if stale.is_some() && self.pending == stale => {
                warn!(?timeout, "previous command never completed, dropping session");
                Err(ChannelError::Disconnected(
                    "previous command never completed".to_string(),
                ))
            }
            Err(_) => Err(ChannelError::CommandTimeout(timeout)),
        }
    }

    async fn close(self) {
        let ShellSession {
            mut child, stdin, ..
        } = self;
        // EOF on stdin ends the remote shell.
        drop(stdin);
        if tokio::time::timeout(CLOSE_GRACE, child.wait()).await.is_err() {
            let _ = child.kill().await;
        }
        debug!("shell session closed");
    }
}
