//! Destroy command - Delete the stack's resources.

use anyhow::Result;
use clap::Args;
use tracing::info;

use forge_core::ExecutionState;

use super::StackOptions;

#[derive(Args)]
pub struct DestroyArgs {}

pub async fn execute(_args: DestroyArgs, options: &StackOptions) -> Result<()> {
    let stack = options.stack_name()?;
    let source = options.load_source()?;
    info!("Destroying stack {}", stack);

    let cloud = options.connect(&source).await?;
    let builder = options.builder(cloud);
    let recorded = builder.load_state(stack)?.resources.len();
    let state = builder.destroy(stack).await?;

    if state.state == ExecutionState::Destroyed {
        println!("Destroyed {} resources of stack {}", recorded, stack);
    }
    Ok(())
}
