//! Up command - Create the stack.

use anyhow::Result;
use clap::Args;
use tracing::info;

use super::{resolve_config, StackOptions};

#[derive(Args)]
pub struct UpArgs {}

pub async fn execute(_args: UpArgs, options: &StackOptions) -> Result<()> {
    let (source, config) = resolve_config(options)?;
    info!("Creating stack {}", config.resource_name());

    let cloud = options.connect(&source).await?;
    let outputs = options
        .builder(cloud)
        .provision(&source, &config.environment)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outputs)?);
    Ok(())
}
