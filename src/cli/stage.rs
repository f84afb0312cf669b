//! add / edit / delete

use super::CliContext;
use crate::models::{Operation, Service};
use crate::services::{self, AddInput, DeleteInput, EditInput};
use anyhow::Result;
use colored::Colorize;

/// Value from the command line, or prompted for when omitted
fn resolve_value(service: Service, value: Option<String>) -> Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let value = match service {
        Service::Secret => dialoguer::Password::new()
            .with_prompt("Secret value")
            .interact()?,
        Service::Parameter => dialoguer::Input::<String>::new()
            .with_prompt("Parameter value")
            .interact_text()?,
    };
    Ok(value)
}

pub async fn run_add(
    ctx: &CliContext,
    service: Service,
    name: String,
    value: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let value = resolve_value(service, value)?;
    let strategy = ctx.strategy(service);
    let input = AddInput {
        name,
        value,
        description,
    };
    let out = services::add(&ctx.store, &*strategy, &ctx.cancel, input).await?;
    println!("{} Staged for creation: {}", "✓".green(), out.name);
    Ok(())
}

pub async fn run_edit(
    ctx: &CliContext,
    service: Service,
    name: String,
    value: Option<String>,
    description: Option<String>,
) -> Result<()> {
    let value = resolve_value(service, value)?;
    let strategy = ctx.strategy(service);
    let input = EditInput {
        name,
        value,
        description,
    };
    let out = services::edit(&ctx.store, &*strategy, &ctx.cancel, input).await?;
    match out.operation {
        _ if out.skipped => println!(
            "{} {} already has this value; nothing staged",
            "•".bright_black(),
            out.name
        ),
        Some(Operation::Create) => println!("{} Updated staged creation: {}", "✓".green(), out.name),
        _ => println!("{} Staged for update: {}", "✓".green(), out.name),
    }
    Ok(())
}

pub async fn run_delete(
    ctx: &CliContext,
    service: Service,
    name: String,
    force: bool,
    recovery_window_days: Option<u32>,
) -> Result<()> {
    let recovery_window_days = match service {
        Service::Secret if !force => {
            recovery_window_days.or(ctx.config.secret.recovery_window_days)
        }
        _ => recovery_window_days,
    };
    let strategy = ctx.strategy(service);
    let input = DeleteInput {
        name,
        force,
        recovery_window_days,
    };
    let out = services::delete(&ctx.store, &*strategy, &ctx.cancel, input).await?;
    if out.unstaged_create {
        println!(
            "{} {} was only staged for creation; unstaged it",
            "✓".green(),
            out.name
        );
    } else {
        println!("{} Staged for deletion: {}", "✓".green(), out.name);
    }
    Ok(())
}
