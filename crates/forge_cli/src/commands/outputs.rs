//! Outputs command - Print the outputs of the last successful run.

use anyhow::Result;
use clap::Args;

use forge_topology::{recorded_outputs, ALB_ADDRESS, EC2_ADDRESS};

use super::StackOptions;

#[derive(Args)]
pub struct OutputsArgs {
    /// Print a single output value (albAddress or ec2Address)
    #[arg(long)]
    pub key: Option<String>,
}

pub async fn execute(args: OutputsArgs, options: &StackOptions) -> Result<()> {
    let stack = options.stack_name()?;
    let outputs = recorded_outputs(&options.state_dir, stack)?;

    match args.key.as_deref() {
        None => println!("{}", serde_json::to_string_pretty(&outputs)?),
        Some(ALB_ADDRESS) => println!("{}", outputs.alb_address),
        Some(EC2_ADDRESS) => println!("{}", outputs.ec2_address),
        Some(other) => anyhow::bail!(
            "unknown output '{}' (expected {} or {})",
            other,
            ALB_ADDRESS,
            EC2_ADDRESS
        ),
    }
    Ok(())
}
