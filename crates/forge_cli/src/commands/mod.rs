//! CLI command definitions.
//!
//! Every command operates on one stack. Stack settings come from
//! `forge.<stack>.yaml` unless `--config` points elsewhere; state files live
//! under `--state-dir`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info};

use forge_iac::{AwsCloud, CloudApi, CloudBackend, InMemoryCloud};
use forge_topology::defaults::{CERTIFICATE_DOMAIN, IMAGE_OWNER, PUBLIC_SUBNET_TAG, VPC_NAME};
use forge_topology::{ConfigSource, StackConfig, TopologyBuilder, REGION_KEY};

pub mod destroy;
pub mod outputs;
pub mod preview;
pub mod up;

/// stackforge - provision a load-balanced web stack
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "stackforge - provision a load-balanced web stack")]
#[command(long_about = r#"
stackforge provisions a single-instance web stack behind an application load
balancer: security group, instance, load balancer, target group and HTTP/HTTPS
listeners, on top of an existing VPC, image and certificate.

COMMANDS:
  preview   → Resolve lookups and show what would be created
  up        → Create the stack and print its outputs
  destroy   → Delete every resource recorded for the stack
  outputs   → Print the outputs of the last successful run

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
  3 - Lookup error (not found or ambiguous)
  4 - Provision error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub stack: StackOptions,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the resources a run would create
    Preview(preview::PreviewArgs),

    /// Create the stack
    Up(up::UpArgs),

    /// Delete the stack's resources
    Destroy(destroy::DestroyArgs),

    /// Print the stack outputs
    Outputs(outputs::OutputsArgs),
}

/// Cloud backend selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    Aws,
    Memory,
}

impl From<Backend> for CloudBackend {
    fn from(backend: Backend) -> Self {
        match backend {
            Backend::Aws => CloudBackend::Aws,
            Backend::Memory => CloudBackend::Memory,
        }
    }
}

/// Options shared by every command.
#[derive(Debug, clap::Args)]
pub struct StackOptions {
    /// Stack (environment) name, e.g. prod
    #[arg(short, long, global = true, env = "FORGE_STACK")]
    pub stack: Option<String>,

    /// Stack settings file (defaults to forge.<stack>.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding stack state files
    #[arg(long, global = true, default_value = ".forge/stacks")]
    pub state_dir: PathBuf,

    /// Cloud backend
    #[arg(long, global = true, value_enum, default_value_t = Backend::Aws)]
    pub backend: Backend,
}

impl StackOptions {
    pub fn stack_name(&self) -> Result<&str> {
        self.stack
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                forge_topology::TopologyError::configuration(
                    "no stack selected (use --stack or FORGE_STACK)",
                )
                .into()
            })
    }

    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(ConfigSource::default_path(self.stack_name()?)),
        }
    }

    /// Load the stack settings file.
    pub fn load_source(&self) -> Result<ConfigSource> {
        let path = self.config_path()?;
        debug!("Reading stack settings from {:?}", path);
        Ok(ConfigSource::load(&path)?)
    }

    /// Connect to the selected backend.
    ///
    /// The in-memory backend is seeded with the network, image and
    /// certificate the stack looks up.
    pub async fn connect(&self, source: &ConfigSource) -> Result<Arc<dyn CloudApi>> {
        let backend = CloudBackend::from(self.backend);
        let region = source
            .get(REGION_KEY)
            .unwrap_or(backend.default_region())
            .to_string();
        info!("Using {} backend in {}", backend, region);

        let cloud: Arc<dyn CloudApi> = match backend {
            CloudBackend::Aws => Arc::new(AwsCloud::new(&region).await),
            CloudBackend::Memory => {
                let config = StackConfig::resolve(source, self.stack_name()?)?;
                Arc::new(sample_cloud(&config))
            }
        };
        Ok(cloud)
    }

    pub fn builder(&self, cloud: Arc<dyn CloudApi>) -> TopologyBuilder {
        TopologyBuilder::new(cloud).with_state_dir(&self.state_dir)
    }
}

/// In-memory cloud holding everything the stack expects to find.
pub fn sample_cloud(config: &StackConfig) -> InMemoryCloud {
    let public = [PUBLIC_SUBNET_TAG];
    InMemoryCloud::new()
        .with_region(&config.region)
        .add_vpc("vpc-0sample", &[("Name", VPC_NAME)])
        .add_subnet("subnet-0sample1", "vpc-0sample", &public)
        .add_subnet("subnet-0sample2", "vpc-0sample", &public)
        .add_image(
            "ami-0sample",
            &config.project,
            IMAGE_OWNER,
            "2024-01-01T00:00:00.000Z",
        )
        .add_certificate(
            format!(
                "arn:aws:acm:{}:{}:certificate/sample",
                config.region,
                forge_iac::memory::SIMULATED_ACCOUNT
            ),
            CERTIFICATE_DOMAIN,
            "ISSUED",
        )
}

/// Read stack settings, failing with context on a bad file.
pub fn resolve_config(options: &StackOptions) -> Result<(ConfigSource, StackConfig)> {
    let source = options.load_source()?;
    let config = StackConfig::resolve(&source, options.stack_name()?)
        .with_context(|| format!("invalid settings for stack {:?}", options.stack))?;
    Ok((source, config))
}
