//! The plan command: a dry run

use std::path::Path;

use colored::Colorize;
use vault_core::{SyncPlan, SynchronizationSession};

use super::Context;
use crate::console::ConsoleProgress;
use crate::error::Result;

/// Print the plan. Returns whether planning met no errors.
pub fn run_plan(config_path: &Path, json: bool) -> Result<bool> {
    let ctx = Context::load(config_path)?;
    let progress = ConsoleProgress;
    let session = SynchronizationSession::new(
        &ctx.repository,
        &progress,
        &ctx.state,
        ctx.config.rules.clone(),
        ctx.config.session_config(),
    );

    let plan = session.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&plan);
    }
    Ok(plan.errors.is_empty())
}

fn print_plan(plan: &SyncPlan) {
    if plan.is_empty() && plan.mirrors.is_empty() {
        println!("{} Everything is up to date ({} files).", "OK".green().bold(), plan.up_to_date);
    }

    for download in &plan.downloads {
        println!("   {} {} -> {}", "+".green(), download.record.full_path(), download.destination.as_str().cyan());
    }
    for folder in &plan.folders {
        println!("   {} {}", "d".green(), folder.path.as_str().cyan());
    }
    for delete in &plan.deletes {
        println!("   {} {}", "-".red(), delete.path.as_str().cyan());
    }
    for mirror in &plan.mirrors {
        println!(
            "   {} {} ({} files kept)",
            "~".yellow(),
            mirror.local_folder.as_str().cyan(),
            mirror.keep_files.len()
        );
    }

    println!();
    println!(
        "{} to download, {} up to date, {} to delete",
        plan.downloads.len(),
        plan.up_to_date,
        plan.deletes.len()
    );
    for error in &plan.errors {
        println!("   {} {}", "!".red(), error);
    }
}
