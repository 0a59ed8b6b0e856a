//! stackforge CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Configuration error
//! - 3: Lookup error (not found or ambiguous)
//! - 4: Provision error

use std::process::ExitCode;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use forge_topology::TopologyError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const CONFIGURATION_ERROR: u8 = 2;
    pub const LOOKUP_ERROR: u8 = 3;
    pub const PROVISION_ERROR: u8 = 4;
}

fn log_filter(cli: &Cli) -> EnvFilter {
    let level = if cli.verbose {
        "forge=debug"
    } else if cli.quiet {
        "forge=warn"
    } else {
        "forge=info"
    };

    let filter = EnvFilter::from_default_env().add_directive(LevelFilter::WARN.into());
    match level.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(log_filter(&cli))
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let options = &cli.stack;
    let result = match cli.command {
        Commands::Preview(args) => commands::preview::execute(args, options).await,
        Commands::Up(args) => commands::up::execute(args, options).await,
        Commands::Destroy(args) => commands::destroy::execute(args, options).await,
        Commands::Outputs(args) => commands::outputs::execute(args, options).await,
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Map an error to its exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<TopologyError>() {
        Some(err) if err.is_configuration() => ExitCodes::CONFIGURATION_ERROR,
        Some(err) if err.is_lookup() => ExitCodes::LOOKUP_ERROR,
        Some(err) if err.is_provision() => ExitCodes::PROVISION_ERROR,
        Some(TopologyError::Cloud(_)) => ExitCodes::PROVISION_ERROR,
        _ => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use forge_iac::IacError;

    #[test]
    fn test_exit_codes() {
        let config: anyhow::Error = TopologyError::configuration("missing project").into();
        assert_eq!(categorize_error(&config), ExitCodes::CONFIGURATION_ERROR);

        let lookup: anyhow::Error = TopologyError::NotFound {
            kind: "certificate",
            query: "domain=pulumi-test.com".to_string(),
        }
        .into();
        assert_eq!(categorize_error(&lookup), ExitCodes::LOOKUP_ERROR);

        let provision: anyhow::Error = TopologyError::Provision {
            resource: "alb".to_string(),
            message: "quota".to_string(),
            created: Vec::new(),
        }
        .into();
        assert_eq!(categorize_error(&provision), ExitCodes::PROVISION_ERROR);

        let cloud: anyhow::Error = TopologyError::from(IacError::Throttled).into();
        assert_eq!(categorize_error(&cloud), ExitCodes::PROVISION_ERROR);

        let other = anyhow::anyhow!("unknown output");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }

    #[test]
    fn test_context_keeps_category() {
        let result: Result<(), TopologyError> = Err(TopologyError::configuration("bad"));
        let err = result.context("invalid settings").unwrap_err();
        assert_eq!(categorize_error(&err), ExitCodes::CONFIGURATION_ERROR);
    }

    #[test]
    fn test_log_filter_levels() {
        let cli = Cli::parse_from(["forge", "--verbose", "outputs"]);
        assert!(log_filter(&cli).to_string().contains("forge=debug"));
    }
}
