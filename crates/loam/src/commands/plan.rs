use colored::Colorize;
use loam_engine::{ActionType, Plan, StateManager};
use std::path::Path;

fn action_colored(action_type: ActionType) -> colored::ColoredString {
    match action_type {
        ActionType::Create => "create".green(),
        ActionType::Update => "update".yellow(),
        ActionType::Delete => "delete".red(),
        ActionType::NoOp => "no-op".dimmed(),
    }
}

/// Print a plan's waves and actions; shared with `up`
pub fn print_plan(plan: &Plan) {
    for action in &plan.deletes {
        println!(
            "  {} {} ({})",
            action_colored(ActionType::Delete),
            action.resource_id.cyan(),
            action.kind
        );
    }
    for (i, wave) in plan.waves.iter().enumerate() {
        println!("{}", format!("wave {}:", i + 1).bold());
        for id in wave {
            if let Some(action) = plan.action_for(id) {
                println!(
                    "  {} {} ({})",
                    action_colored(action.action_type),
                    id.cyan(),
                    action.kind
                );
            }
        }
    }
    println!();
    println!("{}", plan.summary());
}

pub async fn handle(stack_path: &Path) -> anyhow::Result<()> {
    let (stack, graph) = super::load_stack(stack_path)?;

    let manager = StateManager::new(super::project_root(stack_path));
    let state = manager.load().await?;

    let plan = Plan::build(&stack, &graph, &state);

    println!("{}", format!("Plan for stack '{}':", stack.name).bold());
    println!();
    print_plan(&plan);

    if !plan.has_changes() {
        println!("{}", "Nothing to do.".green());
    }

    Ok(())
}
