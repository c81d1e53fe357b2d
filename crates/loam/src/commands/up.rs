use colored::Colorize;
use loam_engine::{
    ApplyEngine, MemoryProvider, Plan, Provider, ResourceStatus, RunReport, StateManager,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Print the per-resource report of a finished run
pub fn print_report(report: &RunReport) {
    for (id, outcome) in &report.outcomes {
        let status = match outcome.status {
            ResourceStatus::Applied => "✓".green(),
            ResourceStatus::Failed => "✗".red(),
            ResourceStatus::Skipped => "-".yellow(),
            _ => "?".dimmed(),
        };
        let note = outcome
            .message
            .as_deref()
            .map(|m| format!(" ({m})"))
            .unwrap_or_default();
        println!("  {} {} {}{}", status, id.cyan(), outcome.status, note.dimmed());
    }
    println!();
    println!(
        "{} applied, {} failed, {} skipped in {}ms",
        report.count(ResourceStatus::Applied),
        report.count(ResourceStatus::Failed),
        report.count(ResourceStatus::Skipped),
        report.duration_ms
    );
}

pub async fn handle(stack_path: &Path, yes: bool) -> anyhow::Result<()> {
    let (stack, graph) = super::load_stack(stack_path)?;

    let manager = StateManager::new(super::project_root(stack_path));
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    let plan = Plan::build(&stack, &graph, &state);

    println!("{}", format!("Plan for stack '{}':", stack.name).bold());
    println!();
    super::plan::print_plan(&plan);

    if !plan.has_changes() {
        println!("{}", "Nothing to do.".green());
        lock.release().await?;
        return Ok(());
    }

    if !yes && !super::confirm("Apply these changes?")? {
        println!("Apply cancelled.");
        lock.release().await?;
        return Ok(());
    }

    // Ctrl-C stops new applications; in-flight calls finish
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("{}", "Interrupt received, letting in-flight calls finish...".yellow());
            let _ = cancel_tx.send(true);
        }
    });

    let provider = Arc::new(MemoryProvider::new());
    println!();
    println!("Provider: {} (simulation)", provider.name().cyan());
    println!();

    let engine = ApplyEngine::new(provider).with_cancel(cancel_rx);
    let report = engine.apply(&stack, &graph, &plan, &mut state).await?;

    manager.save(&state).await?;
    lock.release().await?;

    print_report(&report);

    if report.cancelled {
        eprintln!("{}", "Run cancelled.".yellow().bold());
        std::process::exit(130);
    }
    if !report.is_success() {
        eprintln!("{}", "Apply finished with failures.".red().bold());
        std::process::exit(1);
    }

    println!("{}", "Apply complete.".green().bold());
    Ok(())
}
