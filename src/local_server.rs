use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const READINESS_POLL: Duration = Duration::from_millis(50);
/// How long the server must stay alive after the port first answers.
const READINESS_SETTLE: Duration = Duration::from_millis(150);
const CONNECT_TIMEOUT: Duration = Duration::from_millis(200);
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct LocalServerSpec {
    pub binary: PathBuf,
    pub port: u16,
    pub root: PathBuf,
    /// Argument template; `{port}` and `{dir}` are substituted.
    pub args: Option<Vec<String>>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Readiness {
    Ready,
    TimedOut,
}

/// The static file server process owned by a serve session.
#[async_trait]
pub trait LocalServer: Send {
    fn pid(&self) -> Option<u32>;

    /// `Some` once the process has exited on its own.
    fn try_exited(&mut self) -> anyhow::Result<Option<ExitStatus>>;

    /// Resolves when the process exits on its own.
    async fn exited(&mut self) -> anyhow::Result<ExitStatus>;

    /// Stops the process. Calling this on an exited process is a no-op.
    async fn terminate(&mut self) -> anyhow::Result<()>;
}

pub fn build_args(spec: &LocalServerSpec) -> Vec<String> {
    let port = spec.port.to_string();
    let dir = spec.root.display().to_string();
    match spec.args.as_ref() {
        Some(template) => template
            .iter()
            .map(|arg| arg.replace("{port}", &port).replace("{dir}", &dir))
            .collect(),
        None => vec!["--port".to_string(), port, dir],
    }
}

pub struct ChildServer {
    child: Child,
    pid: Option<u32>,
}

pub fn spawn(spec: &LocalServerSpec) -> anyhow::Result<ChildServer> {
    let args = build_args(spec);
    debug!(binary = %spec.binary.display(), ?args, "spawning local server");
    let child = Command::new(&spec.binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", spec.binary.display()))?;
    let pid = child.id();
    info!(pid = ?pid, port = spec.port, root = %spec.root.display(), "local server started");
    Ok(ChildServer { child, pid })
}

#[async_trait]
impl LocalServer for ChildServer {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn try_exited(&mut self) -> anyhow::Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    async fn exited(&mut self) -> anyhow::Result<ExitStatus> {
        Ok(self.child.wait().await?)
    }

    async fn terminate(&mut self) -> anyhow::Result<()> {
        if let Some(status) = self.child.try_wait()? {
            debug!(%status, "local server already exited");
            return Ok(());
        }
        if let Some(pid) = self.pid
            && send_sigterm(pid)
            && let Ok(status) = tokio::time::timeout(TERMINATE_GRACE, self.child.wait()).await
        {
            let status = status?;
            info!(pid, %status, "local server stopped");
            return Ok(());
        }
        self.child
            .kill()
            .await
            .context("failed to kill local server")?;
        info!(pid = ?self.pid, "local server killed");
        Ok(())
    }
}

#[cfg(unix)]
fn send_sigterm(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
fn send_sigterm(_pid: u32) -> bool {
    false
}

/// Polls the local port until it accepts a connection.
///
/// Running out of time is not an error: the tunnel is started anyway, like a
/// fixed startup delay would. A server that has already exited is, including
/// one that dies right after the port answers: then something else owns it.
pub async fn wait_until_ready(
    server: &mut dyn LocalServer,
    port: u16,
    timeout: Duration,
) -> anyhow::Result<Readiness> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = server.try_exited()? {
            return Err(anyhow::anyhow!(
                "local server exited before accepting connections ({status})"
            ));
        }
        if probe(port).await {
            tokio::time::sleep(READINESS_SETTLE).await;
            if let Some(status) = server.try_exited()? {
                return Err(anyhow::anyhow!(
                    "local server exited ({status}) while port {port} was answering; is another process using it?"
                ));
            }
            debug!(port, "local server is accepting connections");
            return Ok(Readiness::Ready);
        }
        if Instant::now() >= deadline {
            warn!(
                port,
                timeout_ms = timeout.as_millis() as u64,
                "local server not reachable yet; starting tunnel anyway"
            );
            return Ok(Readiness::TimedOut);
        }
        tokio::time::sleep(READINESS_POLL).await;
    }
}

async fn probe(port: u16) -> bool {
    matches!(
        tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

pub fn spec_for(
    binary: &Path,
    port: u16,
    root: &Path,
    args: Option<Vec<String>>,
) -> LocalServerSpec {
    LocalServerSpec {
        binary: binary.to_path_buf(),
        port,
        root: root.to_path_buf(),
        args,
    }
}
