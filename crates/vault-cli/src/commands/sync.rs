//! The sync command

use std::path::Path;

use colored::Colorize;
use vault_core::{RetryDriver, RunResult, SynchronizationSession};

use super::Context;
use crate::console::ConsoleProgress;
use crate::error::Result;

/// Run a synchronization. Returns whether the run was clean.
pub fn run_sync(config_path: &Path, json: bool, no_retry: bool) -> Result<bool> {
    let ctx = Context::load(config_path)?;
    let progress = ConsoleProgress;

    let session = ctx
        .config
        .probes()
        .into_iter()
        .fold(
            SynchronizationSession::new(
                &ctx.repository,
                &progress,
                &ctx.state,
                ctx.config.rules.clone(),
                ctx.config.session_config(),
            ),
            |session, probe| session.with_probe(probe),
        );

    let driver = if no_retry {
        RetryDriver::once()
    } else {
        ctx.config.retry_driver()
    };
    let result = driver.run(|attempt| {
        if attempt > 1 {
            eprintln!("{} Attempt {}", "=>".yellow().bold(), attempt);
        }
        session.run()
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }
    Ok(result.is_clean())
}

fn print_summary(result: &RunResult) {
    println!();
    println!("{}", "Summary".bold());
    println!("   {:<12} {}", "considered", result.considered);
    println!("   {:<12} {}", "downloaded", result.downloaded.to_string().green());
    println!("   {:<12} {}", "up to date", result.up_to_date);
    println!("   {:<12} {}", "deleted", result.deleted);
    if result.failed > 0 {
        println!("   {:<12} {}", "failed", result.failed.to_string().red());
    }

    if !result.errors.is_empty() {
        println!();
        println!("{}", "Errors".red().bold());
        for error in &result.errors {
            println!("   {} {}", "!".red(), error);
        }
    }
}
