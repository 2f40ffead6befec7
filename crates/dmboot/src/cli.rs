//! CLI definition and entry point.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use dmboot_common::{BootConfig, BootError, BootResult, Credentials, DotRef, SeedAddress, read_secret};
use dmboot_rpc::HttpTransport;
use dmboot_storage::SystemRunner;

use crate::bootstrap::{BootPlan, Bootstrap, Seed};
use crate::supervisor::ProcessLauncher;

/// dmboot - bootstrap a dotmesh storage node
#[derive(Parser, Debug)]
#[command(name = "dmboot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Block device or file to store data (separate multiple with commas)
    #[arg(long, env = "DMBOOT_STORAGE_DEVICE", value_delimiter = ',')]
    pub storage_device: Vec<String>,

    /// Name of storage pool to use
    #[arg(long, env = "DMBOOT_POOL_NAME", default_value = "pool")]
    pub pool_name: String,

    /// Name of the datadot to use, optionally as namespace/name
    #[arg(long, env = "DMBOOT_DOT")]
    pub dot: String,

    /// Where to mount the datadot on the host
    #[arg(long, env = "DMBOOT_MOUNTPOINT")]
    pub mountpoint: PathBuf,

    /// Address of a datadot to seed from, e.g. dothub.com/justincormack/postgres
    #[arg(long, env = "DMBOOT_SEED")]
    pub seed: Option<String>,

    /// Exit once set up (useful on boot) instead of running as a long-lived daemon
    #[arg(long, env = "DMBOOT_ONESHOT")]
    pub oneshot: bool,

    /// File containing <API username>:<API key> for use with --seed
    #[arg(
        long,
        env = "DMBOOT_CREDENTIALS_FILE",
        default_value = "/run/config/dotmesh/credentials"
    )]
    pub credentials_file: PathBuf,

    /// Initial admin API key for the local service
    #[arg(
        long,
        env = "DMBOOT_ADMIN_API_KEY_FILE",
        default_value = "/run/config/dotmesh/admin-api-key"
    )]
    pub admin_api_key_file: PathBuf,

    /// Initial admin password for the local service
    #[arg(
        long,
        env = "DMBOOT_ADMIN_PASSWORD_FILE",
        default_value = "/run/config/dotmesh/admin-password"
    )]
    pub admin_password_file: PathBuf,

    /// Enable debug logging
    #[arg(long, env = "DMBOOT_DEBUG")]
    pub debug: bool,
}

impl Cli {
    /// Validate inputs and load secrets into a plan.
    ///
    /// Runs before any side effect so bad input never leaves a half-set-up node.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed seed or dot, a non-UTF-8 mountpoint,
    /// or unreadable secret files.
    pub fn plan(&self, config: &BootConfig) -> BootResult<BootPlan> {
        let seed_address = self.seed.as_deref().map(SeedAddress::parse).transpose()?;
        let dot = DotRef::parse(&self.dot, &config.default_namespace)?;
        if self.mountpoint.to_str().is_none() {
            return Err(BootError::Config {
                message: format!(
                    "mountpoint {} is not valid UTF-8",
                    self.mountpoint.display()
                ),
            });
        }

        let seed = match seed_address {
            Some(address) => {
                let credentials = Credentials::from_file(&self.credentials_file)?;
                tracing::info!(user = %credentials.user, "Loaded seed credentials");
                Some(Seed {
                    address,
                    credentials,
                })
            }
            None => None,
        };

        let admin_password = read_secret(&self.admin_password_file)?;
        let admin_api_key = read_secret(&self.admin_api_key_file)?;

        Ok(BootPlan {
            pool: self.pool_name.clone(),
            devices: self
                .storage_device
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            dot,
            mountpoint: self.mountpoint.clone(),
            seed,
            oneshot: self.oneshot,
            admin_password,
            admin_api_key,
        })
    }

    /// Execute the bootstrap.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn execute(self) -> Result<()> {
        let config = BootConfig::default();
        let plan = self.plan(&config)?;

        let transport = HttpTransport::local_admin(&config, plan.admin_api_key.clone())
            .map_err(BootError::from)?;
        tracing::debug!(url = transport.url(), "Using service endpoint");

        let id = Bootstrap::new(config, SystemRunner, ProcessLauncher, transport)
            .run(&plan)
            .await?;

        tracing::info!(dot = %plan.dot, %id, "Bootstrap complete");
        Ok(())
    }
}
