use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct DiscoveryOptions {
    pub root: PathBuf,
    pub extension: String,
    /// Directory levels below `root` to search; a file directly inside
    /// `root` sits at depth 1.
    pub max_depth: usize,
}

/// The build output being served, split into the directory handed to the
/// file server and the name appended to the public URL.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub dir: PathBuf,
    pub name: String,
}

impl Artifact {
    pub fn from_path(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("artifact path has no file name: {}", path.display()))?
            .to_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Ok(Self { path, dir, name })
    }
}

/// Returns the first matching artifact in path order, or `None` when the
/// root is missing or holds no match.
pub fn discover(options: &DiscoveryOptions) -> anyhow::Result<Option<Artifact>> {
    let matches = discover_all(options)?;
    match matches.into_iter().next() {
        Some(path) => Ok(Some(Artifact::from_path(path)?)),
        None => Ok(None),
    }
}

pub fn discover_all(options: &DiscoveryOptions) -> anyhow::Result<Vec<PathBuf>> {
    if !options.root.is_dir() {
        debug!(root = %options.root.display(), "artifact root does not exist");
        return Ok(Vec::new());
    }
    let extension = options.extension.trim_start_matches('.');
    let mut found = Vec::new();
    let entries = std::fs::read_dir(&options.root)
        .with_context(|| format!("unable to read {}", options.root.display()))?;
    walk(entries, 1, options.max_depth, extension, &mut found);
    found.sort();
    Ok(found)
}

fn walk(
    entries: std::fs::ReadDir,
    depth: usize,
    max_depth: usize,
    extension: &str,
    found: &mut Vec<PathBuf>,
) {
    if depth > max_depth {
        return;
    }
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            match std::fs::read_dir(&path) {
                Ok(children) => walk(children, depth + 1, max_depth, extension, found),
                Err(err) => debug!(dir = %path.display(), %err, "skipping unreadable directory"),
            }
        } else if has_extension(&path, extension) && path.is_file() {
            found.push(path);
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == extension)
}
