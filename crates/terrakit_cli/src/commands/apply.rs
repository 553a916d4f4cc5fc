//! Apply and destroy commands.

use anyhow::Result;
use clap::Args;
use terrakit_exec::{ApplyOptions, DestroyOptions};
use tracing::info;

use super::{interrupt_token, GlobalArgs, VarArgs};

#[derive(Args)]
pub struct ApplyArgs {
    /// Saved plan to apply; cannot be combined with variables
    pub plan_file: Option<String>,

    #[command(flatten)]
    pub vars: VarArgs,

    /// Skip interactive approval
    #[arg(long)]
    pub auto_approve: bool,
}

#[derive(Args)]
pub struct DestroyArgs {
    #[command(flatten)]
    pub vars: VarArgs,

    /// Skip interactive approval
    #[arg(long)]
    pub auto_approve: bool,
}

pub async fn execute(global: &GlobalArgs, args: ApplyArgs) -> Result<()> {
    let executor = global.executor().await?;
    info!("Applying in {}", executor.working_dir().display());

    let mut options = ApplyOptions {
        vars: args.vars.vars(),
        var_files: args.vars.var_files(),
        targets: args.vars.targets(),
        plan_file: args.plan_file,
        ..ApplyOptions::new()
    };
    if args.auto_approve {
        options = options.auto_approve(true);
    }

    executor.apply(options, &interrupt_token()).await?;

    println!();
    if executor.is_dry_run() {
        println!("🔎 Dry run: apply skipped");
    } else {
        println!("✅ Apply complete");
    }
    Ok(())
}

pub async fn destroy(global: &GlobalArgs, args: DestroyArgs) -> Result<()> {
    let executor = global.executor().await?;
    info!("Destroying in {}", executor.working_dir().display());

    let mut options = DestroyOptions {
        vars: args.vars.vars(),
        var_files: args.vars.var_files(),
        targets: args.vars.targets(),
        ..DestroyOptions::new()
    };
    if args.auto_approve {
        options = options.auto_approve(true);
    }

    executor.destroy(options, &interrupt_token()).await?;

    println!();
    if executor.is_dry_run() {
        println!("🔎 Dry run: destroy skipped");
    } else {
        println!("✅ Destroy complete");
    }
    Ok(())
}
