//! tag / untag / cancel-tag

use super::CliContext;
use crate::models::Service;
use crate::services::{self, CancelTagInput, TagInput, TagOutput, UntagInput};
use anyhow::{bail, Result};
use colored::Colorize;
use std::collections::{BTreeMap, BTreeSet};

/// Parse `key=value` pairs
pub fn parse_tags(pairs: &[String]) -> Result<BTreeMap<String, String>> {
    let mut tags = BTreeMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("Invalid tag '{}': expected key=value", pair);
        };
        tags.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(tags)
}

fn print_tag_output(out: &TagOutput) {
    println!("{} Staged tag changes for {}", "✓".green(), out.name);
    for (key, value) in &out.add {
        println!("      {} {}={}", "+".green(), key, value);
    }
    for key in &out.remove {
        println!("      {} {}", "-".red(), key);
    }
}

pub async fn run_tag(
    ctx: &CliContext,
    service: Service,
    name: String,
    pairs: Vec<String>,
) -> Result<()> {
    let strategy = ctx.strategy(service);
    let input = TagInput {
        name,
        tags: parse_tags(&pairs)?,
    };
    let out = services::tag(&ctx.store, &*strategy, &ctx.cancel, input).await?;
    print_tag_output(&out);
    Ok(())
}

pub async fn run_untag(
    ctx: &CliContext,
    service: Service,
    name: String,
    keys: Vec<String>,
) -> Result<()> {
    let strategy = ctx.strategy(service);
    let input = UntagInput {
        name,
        keys: keys.into_iter().collect(),
    };
    let out = services::untag(&ctx.store, &*strategy, &ctx.cancel, input).await?;
    print_tag_output(&out);
    Ok(())
}

/// Withdraw staged tag additions (or removals, with `remove`)
pub fn run_cancel(
    ctx: &CliContext,
    service: Service,
    name: String,
    keys: Vec<String>,
    remove: bool,
) -> Result<()> {
    let strategy = ctx.strategy(service);
    let input = CancelTagInput {
        name,
        keys: keys.into_iter().collect::<BTreeSet<_>>(),
    };
    let out = if remove {
        services::cancel_remove_tag(&ctx.store, &*strategy, input)?
    } else {
        services::cancel_add_tag(&ctx.store, &*strategy, input)?
    };
    if out.unstaged {
        println!("{} No tag changes left for {}; unstaged", "✓".green(), out.name);
    } else {
        println!("{} Cancelled staged tag keys for {}", "✓".green(), out.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags(&["env=prod".to_string(), "team = core".to_string()]).unwrap();
        assert_eq!(tags.get("env").map(String::as_str), Some("prod"));
        assert_eq!(tags.get("team").map(String::as_str), Some("core"));
    }

    #[test]
    fn test_parse_tags_allows_equals_in_value() {
        let tags = parse_tags(&["query=a=b".to_string()]).unwrap();
        assert_eq!(tags.get("query").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_parse_tags_rejects_missing_separator() {
        assert!(parse_tags(&["env".to_string()]).is_err());
    }
}
