//! Fmt command - Check or rewrite formatting.

use anyhow::Result;
use clap::Args;
use terrakit_exec::FmtOptions;

use super::{interrupt_token, GlobalArgs};
use crate::ValidationFailure;

#[derive(Args)]
pub struct FmtArgs {
    /// Files or directories to format
    pub paths: Vec<String>,

    /// Only report files that need formatting
    #[arg(long, conflicts_with = "diff")]
    pub check: bool,

    /// Show the formatting changes
    #[arg(long)]
    pub diff: bool,
}

pub async fn execute(global: &GlobalArgs, args: FmtArgs) -> Result<()> {
    let executor = global.executor().await?;

    let mut options = if args.check {
        FmtOptions::check()
    } else {
        FmtOptions::write()
    };
    if args.diff {
        options = options.diff();
    }
    for path in args.paths {
        options = options.path(path);
    }

    let result = executor.fmt(options, &interrupt_token()).await?;

    if let Some(diff) = &result.diff {
        println!("{}", diff);
    }
    for file in &result.changed_files {
        println!("   📝 {}", file);
    }

    if !result.success {
        return Err(ValidationFailure(format!(
            "{} file(s) need formatting",
            result.changed_files.len()
        ))
        .into());
    }

    if result.changed_files.is_empty() {
        println!("✅ Formatting is clean");
    }
    Ok(())
}
