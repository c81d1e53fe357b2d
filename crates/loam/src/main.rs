mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "loam")]
#[command(about = "Declare it. Apply it. Infrastructure as a graph.", long_about = None)]
struct Cli {
    /// Stack file (default: stack.kdl discovery)
    #[arg(short = 'f', long = "stack", global = true)]
    stack: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse the stack, check schemas and the dependency graph
    Validate,
    /// Show the execution plan without applying anything
    Plan,
    /// Apply the stack: create, update and delete resources
    Up {
        /// Apply without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Delete every resource recorded in the state
    Destroy {
        /// Destroy without asking for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Print the dependency waves of the stack
    Graph,
    /// Inspect recorded state
    State(commands::state::StateCommand),
    /// Print the version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt::init();

    if matches!(cli.command, Commands::Version) {
        println!("loam {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let stack_path = match cli.stack {
        Some(path) => path,
        None => match loam_config::find_stack_file() {
            Ok(path) => path,
            Err(e) => {
                eprintln!("{}", "✗ no stack file".red().bold());
                eprintln!("  {e}");
                std::process::exit(1);
            }
        },
    };
    tracing::debug!("Using stack file: {}", stack_path.display());

    match cli.command {
        Commands::Validate => commands::validate::handle(&stack_path).await?,
        Commands::Plan => commands::plan::handle(&stack_path).await?,
        Commands::Up { yes } => commands::up::handle(&stack_path, yes).await?,
        Commands::Destroy { yes } => commands::destroy::handle(&stack_path, yes).await?,
        Commands::Graph => commands::graph::handle(&stack_path).await?,
        Commands::State(cmd) => commands::state::handle(cmd, &stack_path).await?,
        Commands::Version => unreachable!("Version is handled before stack discovery"),
    }

    Ok(())
}
