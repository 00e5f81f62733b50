use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

pub const ENV_BINARY_PREFIX: &str = "PLUGIN_SERVE_BINARY_";

/// Install commands for the tools `serve` knows how to drive.
const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("miniserve", "cargo install miniserve"),
    ("bore", "cargo install bore-cli"),
    ("simple-http-server", "cargo install simple-http-server"),
];

pub struct ResolveCtx {
    pub project_dir: PathBuf,
    pub explicit_path: Option<PathBuf>,
}

/// Where a tool was found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ToolSource {
    ConfigFile,
    Environment(String),
    ProjectBin,
    SearchPath,
}

impl fmt::Display for ToolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolSource::ConfigFile => write!(f, "binary_paths in plugin-serve.yaml"),
            ToolSource::Environment(key) => write!(f, "${key}"),
            ToolSource::ProjectBin => write!(f, "project bin/"),
            ToolSource::SearchPath => write!(f, "PATH"),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Located {
    pub path: PathBuf,
    pub source: ToolSource,
}

pub fn resolve_binary(name: &str, ctx: &ResolveCtx) -> anyhow::Result<PathBuf> {
    locate(name, ctx).map(|located| located.path)
}

/// Looks for `name` in the config file's explicit path, then
/// `PLUGIN_SERVE_BINARY_<NAME>`, then `<project>/bin`, then `PATH`.
///
/// An explicit path or environment override that does not exist is an error
/// rather than a reason to keep looking.
pub fn locate(name: &str, ctx: &ResolveCtx) -> anyhow::Result<Located> {
    if let Some(explicit) = ctx.explicit_path.as_ref() {
        let path = if explicit.is_absolute() {
            explicit.clone()
        } else {
            ctx.project_dir.join(explicit)
        };
        return existing(path, ToolSource::ConfigFile)
            .ok_or_else(|| anyhow::anyhow!("{name}: configured path does not exist"));
    }

    let key = env_key(name);
    if let Some(value) = std::env::var_os(&key) {
        let path = PathBuf::from(value);
        return existing(path.clone(), ToolSource::Environment(key.clone())).ok_or_else(|| {
            anyhow::anyhow!("{name}: ${key} points to {}, which does not exist", path.display())
        });
    }

    let in_project = ctx.project_dir.join("bin").join(executable_name(name));
    let found = existing(in_project, ToolSource::ProjectBin).or_else(|| {
        find_on_path(name).map(|path| Located {
            path,
            source: ToolSource::SearchPath,
        })
    });
    match found {
        Some(located) => {
            debug!(tool = name, path = %located.path.display(), source = %located.source, "tool located");
            Ok(located)
        }
        None => Err(anyhow::anyhow!(
            "{name} is not installed (looked in {}/bin and PATH)\n  install it: {}\n  or point to it with binary_paths in plugin-serve.yaml or ${key}",
            ctx.project_dir.display(),
            install_hint(name),
        )),
    }
}

fn existing(path: PathBuf, source: ToolSource) -> Option<Located> {
    path.is_file().then_some(Located { path, source })
}

pub fn install_hint(name: &str) -> String {
    KNOWN_TOOLS
        .iter()
        .find(|(tool, _)| *tool == name)
        .map(|(_, hint)| hint.to_string())
        .unwrap_or_else(|| format!("install `{name}` with your package manager"))
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) && !name.ends_with(".exe") {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}

pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let file = executable_name(name);
    std::env::var_os("PATH").and_then(|paths| {
        std::env::split_paths(&paths)
            .map(|dir| dir.join(&file))
            .find(|candidate| candidate.is_file())
    })
}

/// `simple-http-server` becomes `PLUGIN_SERVE_BINARY_SIMPLE_HTTP_SERVER`.
pub fn env_key(name: &str) -> String {
    let suffix = name
        .chars()
        .map(|ch| match ch {
            'a'..='z' | 'A'..='Z' | '0'..='9' => ch.to_ascii_uppercase(),
            _ => '_',
        })
        .collect::<String>();
    format!("{ENV_BINARY_PREFIX}{suffix}")
}
