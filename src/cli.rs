use std::{env, path::PathBuf};

use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;

use crate::config::{self, CliOverrides, ServeConfig};
use crate::preflight::{self, BinResolverLookup};
use crate::serve::{self, SessionEnd};
use crate::serve_log;
use crate::tasks;

#[derive(Parser)]
#[command(name = "plugin-serve")]
#[command(about = "Serve a built plugin artifact through a public bore tunnel", version)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Project directory holding plugin-serve.yaml and the build output (default: current directory)."
    )]
    project: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count, help = "Increase log verbosity.")]
    verbose: u8,
    #[arg(short, long, global = true, help = "Only log errors.")]
    quiet: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "List available commands")]
    List,
    #[command(about = "Pick a command interactively (chooser from PLUGIN_SERVE_CHOOSER, default fzf)")]
    Choose,
    #[command(about = "Open plugin-serve.yaml in $VISUAL or $EDITOR")]
    Edit,
    #[command(about = "Serve the built plugin through a public bore tunnel")]
    Serve(ServeArgs),
    #[command(hide = true, about = "Verify the HTTP server and tunnel tools are installed")]
    Check,
}

#[derive(Parser, Default)]
struct ServeArgs {
    #[arg(help = "Local port for the HTTP server (default: 8000).")]
    port: Option<u16>,
    #[arg(long, help = "Print the public URL only for the first tunnel announcement.")]
    once: bool,
    #[arg(long, help = "Relay host the tunnel forwards to (default: bore.pub).")]
    relay: Option<String>,
    #[arg(long, help = "Directory searched for the artifact (default: target).")]
    root: Option<PathBuf>,
    #[arg(long, help = "Artifact file extension (default: wasm).")]
    extension: Option<String>,
    #[arg(long, help = "How many directory levels below the root to search (default: 3).")]
    max_depth: Option<usize>,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        serve_log::init(serve_log::level_from(self.verbose, self.quiet));
        let project_dir = project_root(self.project)?;
        let command = self.command.unwrap_or(Command::List);
        run_command(command, project_dir)
    }
}

fn run_command(command: Command, project_dir: PathBuf) -> anyhow::Result<()> {
    match command {
        Command::List => {
            print!("{}", tasks::render_list());
            Ok(())
        }
        Command::Choose => run_choose(project_dir),
        Command::Edit => {
            let editor = tasks::editor_command(|key| env::var(key).ok());
            let path = tasks::edit(&project_dir, &editor)?;
            debug!(path = %path.display(), "edited config");
            Ok(())
        }
        Command::Serve(args) => args.run(project_dir),
        Command::Check => run_check(project_dir),
    }
}

fn run_choose(project_dir: PathBuf) -> anyhow::Result<()> {
    let chooser = tasks::chooser_command();
    let Some(task) = tasks::choose_task(&chooser)? else {
        return Ok(());
    };
    debug!(task = task.name, "chosen");
    let command = match task.name {
        "list" => Command::List,
        "edit" => Command::Edit,
        "serve" => Command::Serve(ServeArgs::default()),
        // Choosing `choose` again just lists.
        _ => Command::List,
    };
    run_command(command, project_dir)
}

fn run_check(project_dir: PathBuf) -> anyhow::Result<()> {
    let file = config::load(&project_dir)?;
    let config = ServeConfig::resolve(&project_dir, file, CliOverrides::default());
    let lookup = BinResolverLookup::new(&project_dir);
    let tools = preflight::check_tools(config.tools(), &lookup)?;
    for tool in tools {
        debug!(tool = %tool.name, path = %tool.path.display(), "found");
    }
    Ok(())
}

impl ServeArgs {
    fn overrides(self) -> CliOverrides {
        CliOverrides {
            port: self.port,
            relay: self.relay,
            once: self.once,
            root: self.root,
            extension: self.extension,
            max_depth: self.max_depth,
        }
    }

    fn run(self, project_dir: PathBuf) -> anyhow::Result<()> {
        let file = config::load(&project_dir)?;
        let config = ServeConfig::resolve(&project_dir, file, self.overrides());
        debug!(?config, "serve config");
        match serve::serve(&config)? {
            SessionEnd::Interrupted => {}
            SessionEnd::TunnelClosed { printed: 0 } => {
                eprintln!("Tunnel closed before announcing a public port.");
            }
            SessionEnd::TunnelClosed { .. } => {}
        }
        Ok(())
    }
}

fn project_root(arg: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    Ok(arg.unwrap_or(env::current_dir()?))
}
