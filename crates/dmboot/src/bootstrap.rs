//! The top-level bootstrap sequence.
//!
//! pool → coordination daemon (after its filesystem is mounted) → service
//! daemon → service answers RPC → dot seeded or ensured → dot looked up →
//! bind mount → (oneshot) ordered shutdown.
//!
//! Each step runs to completion before the next begins and any failure
//! aborts the sequence. Re-running after a failure is safe because every
//! provisioning step checks its target state first.

use std::path::PathBuf;

use dmboot_common::{BootConfig, BootResult, Credentials, DotRef, SeedAddress};
use dmboot_rpc::{
    DotmeshApi, RpcTransport, TransferOrchestrator, TransferProgress, TransferRequest,
    VolumeLifecycle, await_ready,
};
use dmboot_storage::{CommandRunner, Provisioner};

use crate::supervisor::{Launcher, Supervisor};

/// Remote dot to seed the local dot from.
#[derive(Debug, Clone)]
pub struct Seed {
    /// Where to pull from.
    pub address: SeedAddress,
    /// Credentials for the peer service.
    pub credentials: Credentials,
}

/// Everything one bootstrap run needs.
#[derive(Clone)]
pub struct BootPlan {
    /// Pool name.
    pub pool: String,
    /// Devices backing the pool, used only if it must be created.
    pub devices: Vec<String>,
    /// The dot to expose.
    pub dot: DotRef,
    /// Host path the dot is bind-mounted at.
    pub mountpoint: PathBuf,
    /// Optional remote seed.
    pub seed: Option<Seed>,
    /// Stop the daemons once set up instead of waiting on them.
    pub oneshot: bool,
    /// Initial admin password for the service.
    pub admin_password: String,
    /// Initial admin API key for the service.
    pub admin_api_key: String,
}

impl std::fmt::Debug for BootPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootPlan")
            .field("pool", &self.pool)
            .field("devices", &self.devices)
            .field("dot", &self.dot)
            .field("mountpoint", &self.mountpoint)
            .field("seed", &self.seed)
            .field("oneshot", &self.oneshot)
            .finish_non_exhaustive()
    }
}

/// Composes provisioning, supervision and the RPC steps.
pub struct Bootstrap<R, L: Launcher, T> {
    config: BootConfig,
    provisioner: Provisioner<R>,
    supervisor: Supervisor<L>,
    api: DotmeshApi<T>,
    show_progress: bool,
}

impl<R, L, T> Bootstrap<R, L, T>
where
    R: CommandRunner,
    L: Launcher,
    T: RpcTransport,
{
    /// Create a bootstrap over the given collaborators.
    pub fn new(config: BootConfig, runner: R, launcher: L, transport: T) -> Self {
        Self {
            provisioner: Provisioner::new(runner, &config),
            supervisor: Supervisor::new(launcher, config.clone()),
            api: DotmeshApi::new(transport),
            config,
            show_progress: true,
        }
    }

    /// Do not draw transfer progress.
    #[must_use]
    pub const fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Run the whole sequence and return the id of the mounted dot.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error. Daemons already started are
    /// stopped when the supervisor is dropped.
    pub async fn run(self, plan: &BootPlan) -> BootResult<String> {
        let Self {
            config,
            provisioner,
            mut supervisor,
            api,
            show_progress,
        } = self;

        tracing::info!(?plan, "Bootstrapping node");

        provisioner.ensure_pool(&plan.pool, &plan.devices).await?;
        supervisor.start_coordination(&provisioner, &plan.pool).await?;
        supervisor.start_service(&plan.pool, &plan.admin_password, &plan.admin_api_key)?;

        await_ready(&api, config.poll_interval).await;

        let lifecycle = VolumeLifecycle::new(&api, &config);
        let id = if let Some(seed) = &plan.seed {
            tracing::info!(seed = %seed.address, dot = %plan.dot, "Seeding dot");
            let request = TransferRequest::pull_seed(&seed.address, &seed.credentials, &plan.dot);
            let mut transfer = if show_progress {
                TransferOrchestrator::new(&api, config.poll_interval)
            } else {
                TransferOrchestrator::with_progress(
                    &api,
                    config.poll_interval,
                    TransferProgress::hidden(),
                )
            };
            transfer.run(&request).await?;
            lifecycle.lookup(&plan.dot).await?
        } else {
            lifecycle.ensure(&plan.dot).await?
        };

        let source = config.mountpoint(&plan.pool, &id);
        provisioner.bind_mount(&source, &plan.mountpoint).await?;
        tracing::info!(
            dot = %plan.dot,
            %id,
            mountpoint = %plan.mountpoint.display(),
            "Dot mounted"
        );

        if plan.oneshot {
            supervisor.shutdown().await?;
        } else {
            supervisor.wait().await?;
        }
        Ok(id)
    }
}
