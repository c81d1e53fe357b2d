use colored::Colorize;
use std::path::Path;

pub async fn handle(stack_path: &Path) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());
    println!("Stack file: {}", stack_path.display().to_string().cyan());

    match super::load_stack(stack_path) {
        Ok((stack, graph)) => {
            println!("{}", "✓ stack is valid".green().bold());
            println!();
            println!("Summary:");
            println!("  stack: {}", stack.name.cyan());
            println!("  resources: {}", stack.len());
            for decl in stack.iter() {
                let deps = graph
                    .dependencies_of(&decl.id)
                    .map(|d| d.len())
                    .unwrap_or(0);
                let dep_info = if deps == 0 {
                    String::new()
                } else {
                    format!(", {deps} dependencies")
                };
                println!("    - {} ({}{})", decl.id.cyan(), decl.kind, dep_info);
            }
            if !stack.variables.is_empty() {
                println!("  variables: {}", stack.variables.len());
            }
            let waves = loam_engine::waves(&graph);
            println!("  waves: {}", waves.len());
        }
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ stack error".red().bold());
            eprintln!("  {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
