//! Preview command - Show what a run would create.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{resolve_config, StackOptions};

#[derive(Args)]
pub struct PreviewArgs {
    /// Print the plan as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: PreviewArgs, options: &StackOptions) -> Result<()> {
    let (source, config) = resolve_config(options)?;
    info!("Previewing stack {}", config.resource_name());

    let cloud = options.connect(&source).await?;
    let plan = options
        .builder(cloud)
        .preview(&source, &config.environment)
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", plan);
        println!();
        println!("{} resources to create", plan.resources.len());
    }

    Ok(())
}
