use std::future::Future;
use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::artifact::{self, Artifact, DiscoveryOptions};
use crate::bore;
use crate::config::{AnnouncePolicy, ServeConfig};
use crate::local_server::{self, LocalServer, Readiness};
use crate::preflight::{self, BinResolverLookup, ResolvedTool, ToolLookup};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionEnd {
    /// Ctrl+C arrived while the tunnel was running.
    Interrupted,
    /// The tunnel's output closed on its own.
    TunnelClosed { printed: usize },
}

/// What the scanning loop needs to know to report the public URL.
#[derive(Clone, Debug)]
pub struct Announcer<'a> {
    pub relay: &'a str,
    pub artifact_name: &'a str,
    pub policy: AnnouncePolicy,
}

/// Scans tunnel output until it closes or `interrupt` resolves, then stops
/// the local server. The server dying first ends the session with an error.
/// The server is terminated on every path out of here.
pub async fn run_session<F, W>(
    server: &mut dyn LocalServer,
    lines: &mut mpsc::Receiver<String>,
    announcer: &Announcer<'_>,
    interrupt: F,
    out: &mut W,
) -> anyhow::Result<SessionEnd>
where
    F: Future<Output = std::io::Result<()>>,
    W: Write,
{
    let outcome = tokio::select! {
        scanned = bore::scan(lines, announcer.relay, announcer.artifact_name, announcer.policy, out) => {
            scanned.map(|printed| SessionEnd::TunnelClosed { printed })
        }
        signal = interrupt => {
            signal
                .context("failed to listen for Ctrl+C")
                .map(|()| SessionEnd::Interrupted)
        }
        exited = server.exited() => match exited {
            Ok(status) => Err(anyhow::anyhow!(
                "local server exited while the tunnel was running ({status})"
            )),
            Err(err) => Err(err),
        },
    };
    match &outcome {
        Ok(SessionEnd::Interrupted) => info!("interrupted; stopping local server"),
        Ok(SessionEnd::TunnelClosed { printed }) => {
            info!(printed, "tunnel output closed; stopping local server")
        }
        Err(err) => warn!(%err, "serve session failed; stopping local server"),
    }
    server.terminate().await?;
    outcome
}

/// Finds the artifact to serve. Missing artifacts are an error; extra
/// matches are reported and the first in path order wins.
pub fn select_artifact(config: &ServeConfig) -> anyhow::Result<Artifact> {
    let options = DiscoveryOptions {
        root: config.artifact_root.clone(),
        extension: config.artifact_extension.clone(),
        max_depth: config.max_depth,
    };
    let matches = artifact::discover_all(&options)?;
    let Some(first) = matches.first() else {
        return Err(anyhow::anyhow!(
            "no *.{} artifact found under {} (searched {} levels deep); build the plugin first",
            options.extension,
            options.root.display(),
            options.max_depth
        ));
    };
    if matches.len() > 1 {
        let others = matches[1..]
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        warn!(
            selected = %first.display(),
            others = %others,
            "multiple artifacts found; serving the first"
        );
    }
    Artifact::from_path(first.clone())
}

/// Runs the whole `serve` pipeline with the real tool lookup and Ctrl+C.
pub fn serve(config: &ServeConfig) -> anyhow::Result<SessionEnd> {
    let lookup = BinResolverLookup::new(&config.project_dir);
    serve_with(config, &lookup)
}

pub fn serve_with<L: ToolLookup + ?Sized>(
    config: &ServeConfig,
    lookup: &L,
) -> anyhow::Result<SessionEnd> {
    let tools = preflight::check_tools(config.tools(), lookup)?;
    let [http_server, tunnel_tool] = tools_pair(tools)?;
    let artifact = select_artifact(config)?;
    info!(
        artifact = %artifact.path.display(),
        port = config.port,
        relay = %config.relay,
        "serving artifact"
    );

    let runtime = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime for serve")?;
    runtime.block_on(async {
        let spec = local_server::spec_for(
            &http_server.path,
            config.port,
            &artifact.dir,
            config.http_server_args.clone(),
        );
        let mut server = local_server::spawn(&spec)?;
        let timeout = Duration::from_millis(config.startup_timeout_ms);
        if local_server::wait_until_ready(&mut server, config.port, timeout).await?
            == Readiness::TimedOut
        {
            info!("continuing without a readiness confirmation");
        }

        let interrupt = match register_interrupt() {
            Ok(interrupt) => interrupt,
            Err(err) => {
                server.terminate().await?;
                return Err(err);
            }
        };

        let mut tunnel = match bore::spawn(&tunnel_tool.path, config.port, &config.relay) {
            Ok(tunnel) => tunnel,
            Err(err) => {
                server.terminate().await?;
                return Err(err);
            }
        };

        let announcer = Announcer {
            relay: &config.relay,
            artifact_name: &artifact.name,
            policy: config.announce,
        };
        let mut out = std::io::stdout();
        let end = run_session(
            &mut server,
            &mut tunnel.lines,
            &announcer,
            interrupt,
            &mut out,
        )
        .await?;
        if let SessionEnd::TunnelClosed { .. } = end
            && let Ok(Some(status)) = tunnel.child.try_wait()
        {
            info!(%status, "tunnel exited");
        }
        Ok::<_, anyhow::Error>(end)
    })
}

fn tools_pair(tools: Vec<ResolvedTool>) -> anyhow::Result<[ResolvedTool; 2]> {
    tools
        .try_into()
        .map_err(|tools: Vec<ResolvedTool>| {
            anyhow::anyhow!("expected two resolved tools, got {}", tools.len())
        })
}

#[cfg(unix)]
fn register_interrupt() -> anyhow::Result<impl Future<Output = std::io::Result<()>>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupts =
        signal(SignalKind::interrupt()).context("failed to install Ctrl+C handler")?;
    Ok(async move {
        interrupts.recv().await;
        Ok(())
    })
}

#[cfg(not(unix))]
fn register_interrupt() -> anyhow::Result<impl Future<Output = std::io::Result<()>>> {
    Ok(tokio::signal::ctrl_c())
}
