use colored::Colorize;
use loam_engine::{ApplyEngine, MemoryProvider, Plan, StateManager};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

pub async fn handle(stack_path: &Path, yes: bool) -> anyhow::Result<()> {
    let manager = StateManager::new(super::project_root(stack_path));
    let lock = manager.acquire_lock().await?;
    let mut state = manager.load().await?;

    if state.is_empty() {
        println!("{}", "No recorded resources, nothing to destroy.".green());
        lock.release().await?;
        return Ok(());
    }

    let deletes = Plan::destroy_actions(&state);
    println!("{}", format!("{} resources to destroy:", deletes.len()).bold());
    for action in &deletes {
        println!("  {} {} ({})", "delete".red(), action.resource_id.cyan(), action.kind);
    }
    println!();

    if !yes && !super::confirm("Destroy all of these?")? {
        println!("Destroy cancelled.");
        lock.release().await?;
        return Ok(());
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    let engine = ApplyEngine::new(Arc::new(MemoryProvider::new())).with_cancel(cancel_rx);
    let report = engine.destroy(&deletes, &mut state).await?;

    manager.save(&state).await?;
    lock.release().await?;

    super::up::print_report(&report);

    if !report.is_success() {
        eprintln!("{}", "Destroy finished with failures.".red().bold());
        std::process::exit(1);
    }

    println!("{}", "Destroy complete.".green().bold());
    Ok(())
}
