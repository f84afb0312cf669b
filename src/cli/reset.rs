use super::{confirm, CliContext};
use crate::models::Service;
use crate::services::{self, ResetInput, ResetResult};
use anyhow::Result;
use colored::Colorize;

pub async fn run(
    ctx: &CliContext,
    service: Service,
    spec: Option<String>,
    all: bool,
    yes: bool,
) -> Result<()> {
    if all
        && !confirm(
            &format!("Discard every staged {} change?", service.label()),
            yes,
        )?
    {
        println!("Aborted");
        return Ok(());
    }

    let strategy = ctx.strategy(service);
    let input = ResetInput { spec, all };
    let result = services::reset(&ctx.store, &*strategy, &ctx.cancel, input).await?;

    match result {
        ResetResult::Unstaged { name } => println!("{} Unstaged {}", "✓".green(), name),
        ResetResult::Restored { name, version } => println!(
            "{} Staged restore of {} to version {}",
            "✓".green(),
            name,
            version
        ),
        ResetResult::NotStaged { name } => {
            println!("{} {} is not staged", "•".bright_black(), name)
        }
        ResetResult::UnstagedAll { entries, tags } => println!(
            "{} Unstaged {} entries and {} tag changes",
            "✓".green(),
            entries,
            tags
        ),
        ResetResult::NothingStaged => println!("{}", "Nothing staged".bright_black()),
    }
    Ok(())
}
