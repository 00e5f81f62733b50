use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;
use tracing::debug;

use crate::config::{self, ProjectConfig};

pub const CHOOSER_ENV: &str = "PLUGIN_SERVE_CHOOSER";
pub const DEFAULT_CHOOSER: &str = "fzf";
pub const DEFAULT_EDITOR: &str = "vi";

pub struct TaskInfo {
    pub name: &'static str,
    pub about: &'static str,
}

/// User-facing commands, in the order `list` prints them.
pub const TASKS: &[TaskInfo] = &[
    TaskInfo {
        name: "list",
        about: "List available commands",
    },
    TaskInfo {
        name: "choose",
        about: "Pick a command interactively",
    },
    TaskInfo {
        name: "edit",
        about: "Open plugin-serve.yaml in your editor",
    },
    TaskInfo {
        name: "serve",
        about: "Serve the built plugin through a public bore tunnel",
    },
];

pub fn render_list() -> String {
    let width = TASKS.iter().map(|task| task.name.len()).max().unwrap_or(0);
    let mut rendered = String::from("Available commands:\n");
    for task in TASKS {
        rendered.push_str(&format!(
            "    {:<width$} # {}\n",
            task.name,
            task.about,
            width = width
        ));
    }
    rendered
}

pub fn find_task(name: &str) -> Option<&'static TaskInfo> {
    TASKS.iter().find(|task| task.name == name)
}

pub fn chooser_command() -> String {
    std::env::var(CHOOSER_ENV)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CHOOSER.to_string())
}

/// `$VISUAL`, then `$EDITOR`, then `vi`.
pub fn editor_command<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["VISUAL", "EDITOR"]
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}

fn split_command(command: &str) -> anyhow::Result<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;
    Ok((program, parts.collect()))
}

/// Feeds the task names to the chooser and returns the picked one.
/// A cancelled chooser or an empty pick yields `None`.
pub fn choose_task(chooser: &str) -> anyhow::Result<Option<&'static TaskInfo>> {
    let (program, args) = split_command(chooser)?;
    debug!(%program, ?args, "running chooser");
    let mut child = Command::new(&program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("failed to start chooser {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        let names = TASKS
            .iter()
            .map(|task| task.name)
            .collect::<Vec<_>>()
            .join("\n");
        stdin.write_all(names.as_bytes())?;
        stdin.write_all(b"\n")?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        debug!(status = %output.status, "chooser cancelled");
        return Ok(None);
    }
    let selection = String::from_utf8_lossy(&output.stdout);
    parse_selection(&selection)
}

pub fn parse_selection(selection: &str) -> anyhow::Result<Option<&'static TaskInfo>> {
    let Some(name) = selection.lines().map(str::trim).find(|line| !line.is_empty()) else {
        return Ok(None);
    };
    find_task(name)
        .map(Some)
        .ok_or_else(|| anyhow::anyhow!("unknown command selected: {name}"))
}

/// Opens the project config in the editor, seeding it with defaults first
/// when it does not exist yet.
pub fn edit(project_dir: &Path, editor: &str) -> anyhow::Result<PathBuf> {
    let path = config::config_path(project_dir);
    if !path.exists() {
        config::save(project_dir, &starter_config())?;
        debug!(path = %path.display(), "wrote starter config");
    }
    let (program, args) = split_command(editor)?;
    let status = Command::new(&program)
        .args(&args)
        .arg(&path)
        .status()
        .with_context(|| format!("failed to start editor {program}"))?;
    if !status.success() {
        return Err(anyhow::anyhow!("editor {program} exited with {status}"));
    }
    Ok(path)
}

pub fn starter_config() -> ProjectConfig {
    let mut starter = ProjectConfig {
        port: Some(config::DEFAULT_PORT),
        relay: Some(config::DEFAULT_RELAY.to_string()),
        announce: Some(config::AnnouncePolicy::Every),
        startup_timeout_ms: Some(config::DEFAULT_STARTUP_TIMEOUT_MS),
        ..ProjectConfig::default()
    };
    starter.artifact.root = Some(PathBuf::from(config::DEFAULT_ARTIFACT_ROOT));
    starter.artifact.extension = Some(config::DEFAULT_ARTIFACT_EXTENSION.to_string());
    starter.artifact.max_depth = Some(config::DEFAULT_MAX_DEPTH);
    starter.binaries.http_server = Some(config::DEFAULT_HTTP_SERVER.to_string());
    starter.binaries.tunnel = Some(config::DEFAULT_TUNNEL.to_string());
    starter
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_names_every_task() {
        let rendered = render_list();
        for task in TASKS {
            assert!(rendered.contains(task.name), "missing {}", task.name);
        }
        assert!(rendered.starts_with("Available commands:\n"));
    }

    #[test]
    fn editor_prefers_visual() {
        let editor = editor_command(|key| match key {
            "VISUAL" => Some("code --wait".to_string()),
            "EDITOR" => Some("nano".to_string()),
            _ => None,
        });
        assert_eq!(editor, "code --wait");
    }

    #[test]
    fn editor_falls_back_to_vi() {
        assert_eq!(editor_command(|_| None), "vi");
        assert_eq!(
            editor_command(|key| (key == "VISUAL").then(|| " ".to_string())),
            "vi"
        );
    }

    #[test]
    fn selection_parsing() {
        assert_eq!(parse_selection("serve\n").unwrap().map(|t| t.name), Some("serve"));
        assert!(parse_selection("\n").unwrap().is_none());
        assert!(parse_selection("deploy").is_err());
    }

    #[test]
    fn editor_command_is_split_into_program_and_args() {
        let (program, args) = split_command("code --wait").unwrap();
        assert_eq!(program, "code");
        assert_eq!(args, vec!["--wait"]);
        assert!(split_command("  ").is_err());
    }
}
