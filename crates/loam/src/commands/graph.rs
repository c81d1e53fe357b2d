use colored::Colorize;
use std::path::Path;

pub async fn handle(stack_path: &Path) -> anyhow::Result<()> {
    let (stack, graph) = super::load_stack(stack_path)?;

    println!("{}", format!("Dependency waves for stack '{}':", stack.name).bold());
    println!();

    for (i, wave) in loam_engine::waves(&graph).iter().enumerate() {
        println!("{}", format!("wave {}:", i + 1).bold());
        for id in wave {
            let deps = graph
                .dependencies_of(id)
                .filter(|d| !d.is_empty())
                .map(|d| {
                    format!(
                        " <- {}",
                        d.iter().cloned().collect::<Vec<_>>().join(", ")
                    )
                })
                .unwrap_or_default();
            println!("  {}{}", id.cyan(), deps.dimmed());
        }
    }

    Ok(())
}
