use super::{confirm, print_json, CliContext};
use crate::error::StageError;
use crate::models::Service;
use crate::services::{self, ApplyEntryStatus, ApplyInput, ApplyOutput, StatusInput};
use anyhow::Result;
use colored::Colorize;

pub async fn run(
    ctx: &CliContext,
    service: Service,
    name: Option<String>,
    ignore_conflicts: bool,
    yes: bool,
    json: bool,
) -> Result<()> {
    let strategy = ctx.strategy(service);

    let pending = services::status(
        &ctx.store,
        &*strategy,
        StatusInput {
            name: name.clone(),
            show_values: false,
        },
    )?;
    if pending.is_empty() {
        println!("{}", "Nothing staged".bright_black());
        return Ok(());
    }
    let prompt = format!(
        "Apply {} staged {} changes and {} tag changes?",
        pending.entries.len(),
        service.label(),
        pending.tag_entries.len()
    );
    if !confirm(&prompt, yes)? {
        println!("Aborted");
        return Ok(());
    }

    ctx.cancel_on_ctrl_c();
    let input = ApplyInput {
        name,
        ignore_conflicts,
    };
    let out = services::apply(&ctx.store, &*strategy, &ctx.cancel, input).await?;

    if json {
        print_json(&out)?;
    } else {
        print_output(&out);
    }

    if let Some(conflict) = out.conflicts.first() {
        return Err(StageError::Conflict {
            name: conflict.name.clone(),
            reason: format!(
                "{} (and {} more); review with `diff` or rerun with --ignore-conflicts",
                conflict.reason,
                out.conflicts.len() - 1
            ),
        }
        .into());
    }
    if out.has_failures() {
        anyhow::bail!(
            "{} entries and {} tag changes failed; they remain staged",
            out.entry_failed,
            out.tag_failed
        );
    }
    Ok(())
}

fn print_output(out: &ApplyOutput) {
    for entry in &out.entries {
        match &entry.status {
            ApplyEntryStatus::Created => println!("  {} created {}", "✓".green(), entry.name),
            ApplyEntryStatus::Updated => println!("  {} updated {}", "✓".green(), entry.name),
            ApplyEntryStatus::Deleted => println!("  {} deleted {}", "✓".green(), entry.name),
            ApplyEntryStatus::Failed { error } => {
                println!("  {} {}: {}", "✗".red(), entry.name, error.red())
            }
        }
    }
    for tag in &out.tags {
        match &tag.error {
            None => println!(
                "  {} tags {} (+{} -{})",
                "✓".green(),
                tag.name,
                tag.added,
                tag.removed
            ),
            Some(error) => println!("  {} tags {}: {}", "✗".red(), tag.name, error.red()),
        }
    }
    for conflict in &out.conflicts {
        println!(
            "  {} {}: {}",
            "!".yellow(),
            conflict.name,
            conflict.reason.yellow()
        );
    }
    if out.cancelled {
        println!("{}", "Cancelled; remaining items are still staged".yellow());
    }
    println!(
        "{}",
        format!(
            "Entries: {} succeeded, {} failed. Tags: {} succeeded, {} failed.",
            out.entry_succeeded, out.entry_failed, out.tag_succeeded, out.tag_failed
        )
        .bold()
    );
}
