//! Output command - Read root module outputs.

use anyhow::Result;
use clap::Args;
use terrakit_exec::{OutputOptions, OutputResult};

use super::{interrupt_token, GlobalArgs};

#[derive(Args)]
pub struct OutputArgs {
    /// Output to read; all outputs when omitted
    pub name: Option<String>,

    /// Print a string output without quotes
    #[arg(long, requires = "name")]
    pub raw: bool,
}

pub async fn execute(global: &GlobalArgs, args: OutputArgs) -> Result<()> {
    let executor = global.executor().await?;

    let mut options = OutputOptions::new();
    if let Some(name) = args.name {
        options = options.name(name);
    }
    if args.raw {
        options = options.raw();
    }

    match executor.output(options, &interrupt_token()).await? {
        OutputResult::Single { value, .. } => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputResult::All { outputs } => {
            for (name, output) in &outputs {
                let value = if output.sensitive {
                    "<sensitive>".to_string()
                } else {
                    serde_json::to_string(&output.value)?
                };
                println!("{} = {}", name, value);
            }
        }
        OutputResult::Raw { text, .. } => println!("{}", text),
    }
    Ok(())
}
