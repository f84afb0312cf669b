use super::{print_json, truncate, CliContext};
use crate::models::Service;
use crate::services::{self, DiffEntry, DiffEntryType, DiffInput, DiffOutput};
use anyhow::Result;
use colored::Colorize;

pub async fn run(
    ctx: &CliContext,
    service: Option<Service>,
    name: Option<String>,
    json: bool,
) -> Result<()> {
    let services: Vec<Service> = match service {
        Some(service) => vec![service],
        None => Service::ALL.to_vec(),
    };

    let mut outputs = Vec::new();
    for service in services {
        let strategy = ctx.strategy(service);
        let input = DiffInput { name: name.clone() };
        outputs.push(services::diff(&ctx.store, &*strategy, &ctx.cancel, input).await?);
    }

    if json {
        return print_json(&outputs);
    }
    if outputs
        .iter()
        .all(|o| o.entries.is_empty() && o.tag_entries.is_empty())
    {
        println!("{}", "Nothing staged".bright_black());
        return Ok(());
    }
    for output in &outputs {
        print_output(output);
    }
    Ok(())
}

fn print_entry(entry: &DiffEntry) {
    let header = match entry.entry_type {
        DiffEntryType::Normal => format!("~ {}", entry.name).yellow(),
        DiffEntryType::Create => format!("+ {}", entry.name).green(),
        DiffEntryType::AutoUnstaged => format!("x {}", entry.name).bright_black(),
        DiffEntryType::Warning => format!("! {}", entry.name).red(),
    };
    match &entry.remote_identifier {
        Some(id) => println!("  {} {}", header, id.bright_black()),
        None => println!("  {}", header),
    }

    if let Some(remote) = &entry.remote_value {
        println!("      {} {}", "-".red(), truncate(remote, 80));
    }
    match &entry.staged_value {
        Some(staged) => println!("      {} {}", "+".green(), truncate(staged, 80)),
        None => println!("      {} {}", "+".red(), "(deleted)".red()),
    }
    if let Some(warning) = &entry.warning {
        let note = match entry.entry_type {
            DiffEntryType::AutoUnstaged => format!("unstaged: {}", warning),
            _ => format!("warning: {}", warning),
        };
        println!("      {}", note.yellow());
    }
}

fn print_output(output: &DiffOutput) {
    if output.entries.is_empty() && output.tag_entries.is_empty() {
        return;
    }
    println!("{}", format!("{}:", output.service.label()).cyan().bold());
    for entry in &output.entries {
        print_entry(entry);
    }
    for tag in &output.tag_entries {
        println!("  {} {}", "T".blue(), tag.name);
        for (key, value) in &tag.add {
            println!("      {} {}={}", "+".green(), key, value);
        }
        for key in &tag.remove {
            println!("      {} {}", "-".red(), key);
        }
    }
    let unstaged = output.auto_unstaged();
    if unstaged > 0 {
        println!(
            "  {}",
            format!("{} stale entries were unstaged", unstaged).yellow()
        );
    }
    println!();
}
