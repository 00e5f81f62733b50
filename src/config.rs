use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "plugin-serve.yaml";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_RELAY: &str = "bore.pub";
pub const DEFAULT_STARTUP_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_ARTIFACT_ROOT: &str = "target";
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "wasm";
pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_HTTP_SERVER: &str = "miniserve";
pub const DEFAULT_TUNNEL: &str = "bore";

/// How often a public URL is printed while the tunnel keeps talking.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Default, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncePolicy {
    /// One message per matching tunnel line.
    #[default]
    Every,
    /// Only the first matching line is reported.
    First,
}

/// On-disk shape of `plugin-serve.yaml`. Every field is optional.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce: Option<AnnouncePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_timeout_ms: Option<u64>,
    #[serde(default)]
    pub artifact: ArtifactSettings,
    #[serde(default)]
    pub binaries: BinaryNames,
    #[serde(default)]
    pub binary_paths: BinaryPaths,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_server_args: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct ArtifactSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BinaryNames {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct BinaryPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_server: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<PathBuf>,
}

/// Values given on the command line; they win over the project file.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub relay: Option<String>,
    pub once: bool,
    pub root: Option<PathBuf>,
    pub extension: Option<String>,
    pub max_depth: Option<usize>,
}

/// Fully resolved settings for one `serve` invocation.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub project_dir: PathBuf,
    pub port: u16,
    pub relay: String,
    pub announce: AnnouncePolicy,
    pub startup_timeout_ms: u64,
    pub artifact_root: PathBuf,
    pub artifact_extension: String,
    pub max_depth: usize,
    pub http_server: ToolSelection,
    pub tunnel: ToolSelection,
    pub http_server_args: Option<Vec<String>>,
}

/// A tool name plus an optional explicit path from the project file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolSelection {
    pub name: String,
    pub explicit_path: Option<PathBuf>,
}

pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE_NAME)
}

pub fn load(project_dir: &Path) -> anyhow::Result<ProjectConfig> {
    let path = config_path(project_dir);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("unable to read {}", path.display()))?;
    if contents.trim().is_empty() {
        return Ok(ProjectConfig::default());
    }
    let config: ProjectConfig = serde_yaml_bw::from_str(&contents)
        .with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(config)
}

pub fn save(project_dir: &Path, config: &ProjectConfig) -> anyhow::Result<()> {
    let path = config_path(project_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_yaml_bw::to_string(config)?;
    std::fs::write(&path, contents)
        .with_context(|| format!("unable to write {}", path.display()))?;
    Ok(())
}

impl ServeConfig {
    pub fn resolve(project_dir: &Path, file: ProjectConfig, cli: CliOverrides) -> Self {
        let announce = if cli.once {
            AnnouncePolicy::First
        } else {
            file.announce.unwrap_or_default()
        };
        let artifact_root = cli
            .root
            .or(file.artifact.root)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_ROOT));
        let artifact_extension = cli
            .extension
            .or(file.artifact.extension)
            .unwrap_or_else(|| DEFAULT_ARTIFACT_EXTENSION.to_string());
        Self {
            project_dir: project_dir.to_path_buf(),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            relay: cli
                .relay
                .or(file.relay)
                .unwrap_or_else(|| DEFAULT_RELAY.to_string()),
            announce,
            startup_timeout_ms: file
                .startup_timeout_ms
                .unwrap_or(DEFAULT_STARTUP_TIMEOUT_MS),
            artifact_root: resolve_relative(project_dir, &artifact_root),
            artifact_extension: artifact_extension.trim_start_matches('.').to_string(),
            max_depth: cli
                .max_depth
                .or(file.artifact.max_depth)
                .unwrap_or(DEFAULT_MAX_DEPTH),
            http_server: ToolSelection {
                name: file
                    .binaries
                    .http_server
                    .unwrap_or_else(|| DEFAULT_HTTP_SERVER.to_string()),
                explicit_path: file.binary_paths.http_server,
            },
            tunnel: ToolSelection {
                name: file
                    .binaries
                    .tunnel
                    .unwrap_or_else(|| DEFAULT_TUNNEL.to_string()),
                explicit_path: file.binary_paths.tunnel,
            },
            http_server_args: file.http_server_args,
        }
    }

    pub fn tools(&self) -> [&ToolSelection; 2] {
        [&self.http_server, &self.tunnel]
    }
}

fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_nothing_is_set() {
        let project = PathBuf::from("/tmp/project");
        let config = ServeConfig::resolve(
            &project,
            ProjectConfig::default(),
            CliOverrides::default(),
        );
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.relay, "bore.pub");
        assert_eq!(config.announce, AnnouncePolicy::Every);
        assert_eq!(config.artifact_root, project.join("target"));
        assert_eq!(config.artifact_extension, "wasm");
        assert_eq!(config.max_depth, 3);
        assert_eq!(config.http_server.name, "miniserve");
        assert_eq!(config.tunnel.name, "bore");
    }

    #[test]
    fn cli_wins_over_file() {
        let project = PathBuf::from("/tmp/project");
        let file: ProjectConfig = serde_yaml_bw::from_str(
            "port: 9000\nrelay: relay.example\nannounce: every\nartifact:\n  extension: .so\n",
        )
        .unwrap();
        let config = ServeConfig::resolve(
            &project,
            file,
            CliOverrides {
                port: Some(9100),
                once: true,
                ..CliOverrides::default()
            },
        );
        assert_eq!(config.port, 9100);
        assert_eq!(config.relay, "relay.example");
        assert_eq!(config.announce, AnnouncePolicy::First);
        assert_eq!(config.artifact_extension, "so");
    }

    #[test]
    fn absolute_artifact_root_is_kept() {
        let config = ServeConfig::resolve(
            Path::new("/tmp/project"),
            ProjectConfig::default(),
            CliOverrides {
                root: Some(PathBuf::from("/var/build")),
                ..CliOverrides::default()
            },
        );
        assert_eq!(config.artifact_root, PathBuf::from("/var/build"));
    }
}
