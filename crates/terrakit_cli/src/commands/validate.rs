//! Validate command - Validate the configuration.

use anyhow::Result;
use clap::Args;
use terrakit_exec::{Diagnostic, ValidateOptions};

use super::{interrupt_token, GlobalArgs};
use crate::ValidationFailure;

#[derive(Args)]
pub struct ValidateArgs {
    /// Print the diagnostics document as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(global: &GlobalArgs, args: ValidateArgs) -> Result<()> {
    let executor = global.executor().await?;
    let result = executor
        .validate(ValidateOptions::new(), &interrupt_token())
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        for diagnostic in result.errors() {
            println!("   ❌ {}", describe(diagnostic));
        }
        for diagnostic in result.warnings() {
            println!("   ⚠️  {}", describe(diagnostic));
        }
        println!();
    }

    if !result.valid {
        return Err(ValidationFailure(format!(
            "configuration is invalid: {} error(s), {} warning(s)",
            result.error_count, result.warning_count
        ))
        .into());
    }

    if !args.json {
        println!("✅ Configuration is valid");
    }
    Ok(())
}

fn describe(diagnostic: &Diagnostic) -> String {
    let location = diagnostic
        .range
        .as_ref()
        .map(|r| format!(" ({}:{})", r.filename, r.start.line))
        .unwrap_or_default();
    if diagnostic.detail.is_empty() {
        format!("{}{}", diagnostic.summary, location)
    } else {
        format!("{}{}: {}", diagnostic.summary, location, diagnostic.detail)
    }
}
