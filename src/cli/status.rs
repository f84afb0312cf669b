use super::{print_json, truncate, CliContext};
use crate::models::{Operation, Service};
use crate::services::{self, StatusInput, StatusOutput};
use anyhow::Result;
use colored::Colorize;

pub fn run(
    ctx: &CliContext,
    service: Option<Service>,
    name: Option<String>,
    show_values: bool,
    json: bool,
) -> Result<()> {
    let services: Vec<Service> = match service {
        Some(service) => vec![service],
        None => Service::ALL.to_vec(),
    };

    let mut outputs = Vec::new();
    for service in services {
        let strategy = ctx.strategy(service);
        let input = StatusInput {
            name: name.clone(),
            show_values,
        };
        outputs.push(services::status(&ctx.store, &*strategy, input)?);
    }

    if json {
        return print_json(&outputs);
    }

    if outputs.iter().all(StatusOutput::is_empty) {
        println!("{}", "Nothing staged".bright_black());
        return Ok(());
    }
    for output in outputs.iter().filter(|o| !o.is_empty()) {
        print_output(output);
    }
    Ok(())
}

fn print_output(output: &StatusOutput) {
    println!("{}", format!("Staged {}:", output.service.label()).cyan().bold());

    for entry in &output.entries {
        let marker = match entry.operation {
            Operation::Create => entry.operation.marker().green(),
            Operation::Update => entry.operation.marker().yellow(),
            Operation::Delete => entry.operation.marker().red(),
        };
        let mut line = format!("  {} {}", marker, entry.name);
        if let Some(value) = &entry.value {
            line.push_str(&format!(" = {}", truncate(value, 60)));
        }
        if let Some(options) = &entry.delete_options {
            if options.force {
                line.push_str(&format!(" {}", "(force)".red()));
            } else if let Some(days) = options.recovery_window_days {
                line.push_str(&format!(" (recovery window {} days)", days));
            }
        }
        println!("{}", line);
        if let Some(description) = &entry.description {
            println!("      {}", description.bright_black());
        }
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
    println!();
}
