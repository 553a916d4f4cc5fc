//! Plan command - Plan changes and summarize them.

use anyhow::Result;
use clap::Args;
use terrakit_exec::{ChangeAction, PlanOptions, PlanResult};
use tracing::info;

use super::{interrupt_token, GlobalArgs, VarArgs};

#[derive(Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub vars: VarArgs,

    /// Save the plan to this file
    #[arg(long)]
    pub out: Option<String>,

    /// Plan a destroy
    #[arg(long)]
    pub destroy: bool,

    /// Print the parsed plan as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(global: &GlobalArgs, args: PlanArgs) -> Result<()> {
    let executor = global.executor().await?;
    info!("Planning in {}", executor.working_dir().display());

    let mut options = PlanOptions {
        vars: args.vars.vars(),
        var_files: args.vars.var_files(),
        targets: args.vars.targets(),
        out: args.out,
        ..PlanOptions::new()
    };
    if args.destroy {
        options = options.destroy();
    }

    let plan = executor.plan(options, &interrupt_token()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_summary(&plan);
    }
    Ok(())
}

fn print_summary(plan: &PlanResult) {
    println!();
    if !plan.has_changes {
        println!("✅ No changes");
        return;
    }

    for change in &plan.resource_changes {
        println!("  {} {}", symbol(change.action), change.address);
    }
    for (name, change) in &plan.output_changes {
        println!("  {} output.{}", symbol(change.action), name);
    }
    println!();
    println!(
        "📋 {} to add, {} to change, {} to destroy",
        plan.add_count, plan.change_count, plan.destroy_count
    );
}

fn symbol(action: ChangeAction) -> &'static str {
    match action {
        ChangeAction::Create => "+",
        ChangeAction::Update => "~",
        ChangeAction::Delete => "-",
        ChangeAction::Replace => "-/+",
        ChangeAction::Read => "<=",
        ChangeAction::NoOp => " ",
    }
}
