//! Version command - Show the detected Terraform version.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use super::GlobalArgs;

#[derive(Args)]
pub struct VersionArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(global: &GlobalArgs, args: VersionArgs) -> Result<()> {
    let executor = global.executor().await?;
    let version = executor.version();

    if args.json {
        let doc = json!({
            "terrakit_version": env!("CARGO_PKG_VERSION"),
            "terraform_version": version.version.to_string(),
            "platform": version.platform,
            "provider_selections": version.provider_selections,
            "outdated": version.outdated,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("terrakit {}", env!("CARGO_PKG_VERSION"));
    println!("Terraform v{}", version.version);
    if let Some(platform) = &version.platform {
        println!("on {}", platform);
    }
    for (provider, selected) in &version.provider_selections {
        println!("+ provider {} v{}", provider, selected);
    }
    if version.outdated {
        println!("⚠️  A newer Terraform release is available");
    }
    Ok(())
}
