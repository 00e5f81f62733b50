use std::path::{Path, PathBuf};

use tracing::debug;

use crate::bin_resolver::{self, ResolveCtx};
use crate::config::ToolSelection;

/// Locates external tools. The real lookup goes through `bin_resolver`.
pub trait ToolLookup {
    fn locate(&self, tool: &ToolSelection) -> anyhow::Result<PathBuf>;
}

pub struct BinResolverLookup {
    pub project_dir: PathBuf,
}

impl BinResolverLookup {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }
}

impl ToolLookup for BinResolverLookup {
    fn locate(&self, tool: &ToolSelection) -> anyhow::Result<PathBuf> {
        bin_resolver::resolve_binary(
            &tool.name,
            &ResolveCtx {
                project_dir: self.project_dir.clone(),
                explicit_path: tool.explicit_path.clone(),
            },
        )
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedTool {
    pub name: String,
    pub path: PathBuf,
}

/// Resolves every tool, failing on the first one that is missing.
pub fn check_tools<'a, I, L>(tools: I, lookup: &L) -> anyhow::Result<Vec<ResolvedTool>>
where
    I: IntoIterator<Item = &'a ToolSelection>,
    L: ToolLookup + ?Sized,
{
    let mut resolved = Vec::new();
    for tool in tools {
        let path = lookup
            .locate(tool)
            .map_err(|err| anyhow::anyhow!("required tool '{}' not found\n{err}", tool.name))?;
        debug!(tool = %tool.name, path = %path.display(), "tool available");
        resolved.push(ResolvedTool {
            name: tool.name.clone(),
            path,
        });
    }
    Ok(resolved)
}
