use std::io::Write;
use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::AnnouncePolicy;

const LISTENING_MARKER: &str = "listening at ";
const LINE_BUFFER: usize = 64;

/// The public endpoint announced by the tunnel client.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Announcement {
    pub relay: String,
    pub port: u16,
}

impl Announcement {
    pub fn artifact_url(&self, artifact_name: &str) -> String {
        format!(
            "http://{}:{}/{}",
            self.relay,
            self.port,
            urlencoding::encode(artifact_name)
        )
    }
}

pub struct TunnelProcess {
    pub child: Child,
    pub lines: mpsc::Receiver<String>,
}

pub fn build_args(local_port: u16, relay: &str) -> Vec<String> {
    vec![
        "local".to_string(),
        local_port.to_string(),
        "--to".to_string(),
        relay.to_string(),
    ]
}

/// Starts the tunnel client with stdout and stderr merged into one line feed.
/// The feed closes once both streams reach end of file.
pub fn spawn(binary: &Path, local_port: u16, relay: &str) -> anyhow::Result<TunnelProcess> {
    let args = build_args(local_port, relay);
    debug!(binary = %binary.display(), ?args, "spawning tunnel");
    let mut child = Command::new(binary)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {}", binary.display()))?;
    info!(pid = ?child.id(), local_port, relay, "tunnel started");

    let (tx, rx) = mpsc::channel(LINE_BUFFER);
    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(stderr, tx);
    }
    Ok(TunnelProcess { child, lines: rx })
}

fn forward_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(%err, "tunnel output read failed");
                    break;
                }
            }
        }
    });
}

/// Tunnel output is not guaranteed to be UTF-8; bad bytes are replaced so
/// later lines on the same stream still arrive.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Extracts the public port from a line such as
/// `2024-05-01T10:00:00Z  INFO bore_cli::client: listening at bore.pub:4242`.
///
/// The port is the run of ASCII digits right after `<relay>:`. An empty run,
/// port 0 and values outside `u16` do not count.
pub fn parse_announcement(line: &str, relay: &str) -> Option<Announcement> {
    let needle = format!("{LISTENING_MARKER}{relay}:");
    let mut offset = 0;
    while let Some(pos) = line[offset..].find(&needle) {
        let start = offset + pos + needle.len();
        let tail = &line[start..];
        let end = tail
            .find(|ch: char| !ch.is_ascii_digit())
            .unwrap_or(tail.len());
        if let Ok(port) = tail[..end].parse::<u16>()
            && port != 0
        {
            return Some(Announcement {
                relay: relay.to_string(),
                port,
            });
        }
        offset = start;
    }
    None
}

/// Reads tunnel output until the feed closes, printing the artifact URL for
/// each announcement. Returns how many messages were written.
pub async fn scan<W: Write>(
    lines: &mut mpsc::Receiver<String>,
    relay: &str,
    artifact_name: &str,
    policy: AnnouncePolicy,
    out: &mut W,
) -> anyhow::Result<usize> {
    let mut printed = 0;
    while let Some(line) = lines.recv().await {
        trace!(line = %line, "tunnel output");
        let Some(announcement) = parse_announcement(&line, relay) else {
            continue;
        };
        if policy == AnnouncePolicy::First && printed > 0 {
            debug!(port = announcement.port, "ignoring repeated announcement");
            continue;
        }
        writeln!(
            out,
            "Plugin URL: {}",
            announcement.artifact_url(artifact_name)
        )?;
        out.flush()?;
        printed += 1;
    }
    debug!(printed, "tunnel output closed");
    Ok(printed)
}
