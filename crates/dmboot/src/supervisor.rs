//! Supervision of the coordination and filesystem service daemons.

use std::fmt;
use std::process::{Child, Command, ExitStatus, Stdio};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use dmboot_common::{BootConfig, BootError, BootResult};
use dmboot_storage::{CommandRunner, Provisioner};
use rustix::process::{Pid, Signal, kill_process};

/// How to launch one daemon.
#[derive(Clone, PartialEq, Eq)]
pub struct DaemonSpec {
    /// Program to execute.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
    /// Variables added on top of the inherited environment.
    pub env: Vec<(String, String)>,
}

impl DaemonSpec {
    /// Coordination daemon writing to the configured data directory.
    #[must_use]
    pub fn coordination(config: &BootConfig) -> Self {
        Self {
            program: config.binaries.etcd.clone(),
            args: vec![
                "-data-dir".to_string(),
                config.etcd_data_dir.display().to_string(),
            ],
            env: Vec::new(),
        }
    }

    /// Filesystem service daemon for `pool`, seeded with admin secrets.
    ///
    /// Secrets are base64 encoded so arbitrary bytes survive the environment.
    #[must_use]
    pub fn service(config: &BootConfig, pool: &str, admin_password: &str, admin_api_key: &str) -> Self {
        let env = [
            ("DOTMESH_ETCD_ENDPOINT", config.etcd_endpoint.clone()),
            ("POOL", pool.to_string()),
            ("INITIAL_ADMIN_PASSWORD", BASE64.encode(admin_password)),
            ("INITIAL_ADMIN_API_KEY", BASE64.encode(admin_api_key)),
            ("DISABLE_FLEXVOLUME", "1".to_string()),
            ("DISABLE_DOCKER_PLUGIN", "1".to_string()),
        ];
        Self {
            program: config.binaries.dotmesh_server.clone(),
            args: Vec::new(),
            env: env
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    /// Value of an added environment variable.
    #[must_use]
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Debug for DaemonSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env: Vec<String> = self
            .env
            .iter()
            .map(|(k, v)| {
                if k.contains("PASSWORD") || k.contains("API_KEY") {
                    format!("{k}=<redacted>")
                } else {
                    format!("{k}={v}")
                }
            })
            .collect();
        f.debug_struct("DaemonSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env)
            .finish()
    }
}

/// A running daemon owned by the supervisor.
#[async_trait]
pub trait Daemon: Send {
    /// Program name, for logs.
    fn name(&self) -> &str;

    /// Send SIGTERM and wait for the process to exit.
    async fn terminate(&mut self) -> BootResult<ExitStatus>;

    /// Wait for the process to exit on its own.
    async fn wait(&mut self) -> BootResult<ExitStatus>;
}

/// Starts daemons.
pub trait Launcher: Send + Sync {
    /// Handle type for launched daemons.
    type Handle: Daemon;

    /// Start `spec` as a child process.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Launch`] if the process cannot be started.
    fn launch(&self, spec: &DaemonSpec) -> BootResult<Self::Handle>;
}

/// Launches real child processes with inherited stdout and stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    type Handle = DaemonProcess;

    fn launch(&self, spec: &DaemonSpec) -> BootResult<DaemonProcess> {
        tracing::info!(program = %spec.program, args = ?spec.args, "Starting daemon");
        tracing::debug!(?spec, "Daemon spec");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| BootError::Launch {
                program: spec.program.clone(),
                source,
            })?;

        tracing::debug!(program = %spec.program, pid = child.id(), "Daemon started");
        Ok(DaemonProcess {
            name: spec.program.clone(),
            child: Some(child),
        })
    }
}

/// An owned OS child process.
///
/// Dropping a handle that still owns its process sends SIGTERM and reaps it,
/// so no exit path leaks a running daemon.
pub struct DaemonProcess {
    name: String,
    child: Option<Child>,
}

impl DaemonProcess {
    /// OS process id, while the process is still owned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn signal_term(&self) -> BootResult<()> {
        let child = self.child.as_ref().ok_or_else(|| BootError::Internal {
            message: format!("{} was already reaped", self.name),
        })?;
        tracing::debug!(name = %self.name, pid = child.id(), "Sending SIGTERM");
        kill_process(Pid::from_child(child), Signal::TERM).map_err(|e| BootError::Launch {
            program: self.name.clone(),
            source: e.into(),
        })
    }

    async fn reap(&mut self) -> BootResult<ExitStatus> {
        let mut child = self.child.take().ok_or_else(|| BootError::Internal {
            message: format!("{} was already reaped", self.name),
        })?;
        let status = tokio::task::spawn_blocking(move || child.wait())
            .await
            .map_err(|e| BootError::Internal {
                message: format!("Task join error: {e}"),
            })??;
        Ok(status)
    }
}

#[async_trait]
impl Daemon for DaemonProcess {
    fn name(&self) -> &str {
        &self.name
    }

    async fn terminate(&mut self) -> BootResult<ExitStatus> {
        self.signal_term()?;
        self.reap().await
    }

    async fn wait(&mut self) -> BootResult<ExitStatus> {
        self.reap().await
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        tracing::warn!(name = %self.name, pid = child.id(), "Stopping daemon left running");
        if let Err(e) = kill_process(Pid::from_child(&child), Signal::TERM) {
            tracing::warn!(name = %self.name, error = %e, "Failed to signal daemon");
        }
        if let Err(e) = child.wait() {
            tracing::warn!(name = %self.name, error = %e, "Failed to reap daemon");
        }
    }
}

/// Owns both daemons from launch until they have been waited on.
///
/// Handles are released service daemon first, coordination daemon second,
/// on every path including drop.
pub struct Supervisor<L: Launcher> {
    launcher: L,
    config: BootConfig,
    // Field order is drop order.
    service: Option<L::Handle>,
    coordination: Option<L::Handle>,
}

impl<L: Launcher> Supervisor<L> {
    /// Create a supervisor with no daemons running.
    pub fn new(launcher: L, config: BootConfig) -> Self {
        Self {
            launcher,
            config,
            service: None,
            coordination: None,
        }
    }

    /// Ensure the coordination daemon's filesystem is present and mounted,
    /// then start the daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning or the launch fails.
    pub async fn start_coordination<R: CommandRunner>(
        &mut self,
        provisioner: &Provisioner<R>,
        pool: &str,
    ) -> BootResult<()> {
        let fs = &self.config.etcd_filesystem;
        provisioner.ensure_filesystem(pool, fs).await?;
        provisioner
            .ensure_mounted(pool, fs, &self.config.etcd_data_dir)
            .await?;

        let spec = DaemonSpec::coordination(&self.config);
        self.coordination = Some(self.launcher.launch(&spec)?);
        Ok(())
    }

    /// Start the filesystem service daemon.
    ///
    /// # Errors
    ///
    /// Returns an error if the launch fails.
    pub fn start_service(&mut self, pool: &str, admin_password: &str, admin_api_key: &str) -> BootResult<()> {
        let spec = DaemonSpec::service(&self.config, pool, admin_password, admin_api_key);
        self.service = Some(self.launcher.launch(&spec)?);
        Ok(())
    }

    /// Stop the service daemon, then the coordination daemon.
    ///
    /// The service depends on the coordination daemon while running, so it
    /// goes first. A non-zero exit after termination is expected.
    ///
    /// # Errors
    ///
    /// Returns an error if a daemon cannot be signalled or reaped.
    pub async fn shutdown(mut self) -> BootResult<()> {
        for slot in [&mut self.service, &mut self.coordination] {
            if let Some(mut daemon) = slot.take() {
                let status = daemon.terminate().await?;
                tracing::info!(
                    name = daemon.name(),
                    %status,
                    "Daemon exited, this is normal (we just stopped it)"
                );
            }
        }
        Ok(())
    }

    /// Wait for both daemons to exit on their own.
    ///
    /// They are expected to run indefinitely, so any exit is unusual.
    ///
    /// # Errors
    ///
    /// Returns an error if a daemon cannot be reaped.
    pub async fn wait(mut self) -> BootResult<()> {
        for slot in [&mut self.service, &mut self.coordination] {
            if let Some(mut daemon) = slot.take() {
                let status = daemon.wait().await?;
                tracing::warn!(
                    name = daemon.name(),
                    %status,
                    "Daemon exited, this is unusual (we were in non-oneshot mode)"
                );
            }
        }
        Ok(())
    }
}
