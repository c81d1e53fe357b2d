pub mod destroy;
pub mod graph;
pub mod plan;
pub mod state;
pub mod up;
pub mod validate;

use anyhow::Context;
use loam_core::Stack;
use loam_engine::DependencyGraph;
use std::path::{Path, PathBuf};

/// Load, validate and graph-check the stack file
pub fn load_stack(stack_path: &Path) -> anyhow::Result<(Stack, DependencyGraph)> {
    let stack = loam_core::parse_stack_file(stack_path)
        .with_context(|| format!("failed to parse {}", stack_path.display()))?;
    stack.validate()?;
    let graph = DependencyGraph::build(&stack)?;
    Ok((stack, graph))
}

/// State lives next to the stack file
pub fn project_root(stack_path: &Path) -> PathBuf {
    stack_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Ask for confirmation on a mutating run
pub fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;

    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}
