use clap::{Args, Subcommand};
use colored::Colorize;
use loam_engine::StateManager;
use std::path::Path;

#[derive(Args)]
pub struct StateCommand {
    #[command(subcommand)]
    pub command: StateSubcommand,
}

#[derive(Subcommand)]
pub enum StateSubcommand {
    /// List recorded resources
    List,
    /// Show one record with its outputs
    Show {
        /// Resource id
        id: String,
    },
}

pub async fn handle(cmd: StateCommand, stack_path: &Path) -> anyhow::Result<()> {
    let manager = StateManager::new(super::project_root(stack_path));
    let state = manager.load().await?;

    match cmd.command {
        StateSubcommand::List => {
            if state.is_empty() {
                println!("No recorded resources.");
                return Ok(());
            }
            println!("{}", format!("{} recorded resources:", state.len()).bold());
            for (id, record) in &state.records {
                println!(
                    "  {} ({}) {} updated {}",
                    id.cyan(),
                    record.kind,
                    record.provider_id.dimmed(),
                    record.updated_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }
        StateSubcommand::Show { id } => match state.get(&id) {
            Some(record) => {
                println!("{}", id.cyan().bold());
                println!("  kind: {}", record.kind);
                println!("  provider id: {}", record.provider_id);
                println!("  status: {}", record.status);
                if !record.depends_on.is_empty() {
                    println!("  depends on: {}", record.depends_on.join(", "));
                }
                println!("  outputs:");
                for (key, value) in &record.outputs {
                    println!("    {key} = {value}");
                }
            }
            None => {
                eprintln!("{}", format!("✗ no record for '{id}'").red());
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
