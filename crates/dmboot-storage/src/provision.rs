//! Idempotent pool, filesystem and mount provisioning.
//!
//! Every `ensure_*` operation checks whether its target state already holds
//! before acting, so a run interrupted at any step can simply be repeated.

use std::fmt;
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use dmboot_common::config::Binaries;
use dmboot_common::{BootConfig, BootError, BootResult};

use crate::command::CommandRunner;

/// Durable identity of an imported pool, rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolId(String);

impl PoolId {
    /// Parse the output of `zpool get -H guid <pool>`.
    ///
    /// The third tab-separated field holds the GUID in decimal.
    #[must_use]
    pub fn from_guid_output(output: &str) -> Option<Self> {
        let guid = output.split('\t').nth(2)?.trim().parse::<u64>().ok()?;
        Some(Self(format!("{guid:x}")))
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ensures pools and filesystems exist and are mounted.
pub struct Provisioner<R> {
    runner: R,
    binaries: Binaries,
}

impl<R: CommandRunner> Provisioner<R> {
    /// Create a provisioner driving the tools named in `config`.
    pub fn new(runner: R, config: &BootConfig) -> Self {
        Self {
            runner,
            binaries: config.binaries.clone(),
        }
    }

    /// Identity of `pool`, or `None` if it cannot be resolved.
    ///
    /// # Errors
    ///
    /// Returns an error only if the pool tool cannot be executed.
    pub async fn pool_id(&self, pool: &str) -> BootResult<Option<PoolId>> {
        let out = self
            .runner
            .run(&self.binaries.zpool, &strings(&["get", "-H", "guid", pool]))
            .await?;
        if !out.success() {
            tracing::debug!(pool, output = %out.output, "Pool identity not resolvable");
            return Ok(None);
        }
        let id = PoolId::from_guid_output(&out.output);
        if id.is_none() {
            tracing::warn!(pool, output = %out.output, "Unparsable pool identity, treating pool as absent");
        }
        Ok(id)
    }

    /// Create `pool` from `devices` unless it already exists.
    ///
    /// Devices are only consulted when the pool has to be created. A failed
    /// creation is never retried.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Provision`] with the tool output if creation fails,
    /// or [`BootError::Config`] if creation is needed but no device was given.
    pub async fn ensure_pool(&self, pool: &str, devices: &[String]) -> BootResult<()> {
        if let Some(id) = self.pool_id(pool).await? {
            tracing::info!(pool, %id, "Pool already exists");
            return Ok(());
        }

        let devices: Vec<&String> = devices.iter().filter(|d| !d.is_empty()).collect();
        if devices.is_empty() {
            return Err(BootError::Config {
                message: format!("pool '{pool}' does not exist and no storage device was given"),
            });
        }

        tracing::info!(pool, ?devices, "Creating pool");
        let mut args = strings(&["create", "-f", pool]);
        args.extend(devices.into_iter().cloned());
        self.runner
            .run(&self.binaries.zpool, &args)
            .await?
            .check("zpool create")?;
        Ok(())
    }

    /// Whether `pool/name` exists.
    ///
    /// # Errors
    ///
    /// Returns an error only if the filesystem tool cannot be executed.
    pub async fn filesystem_exists(&self, pool: &str, name: &str) -> BootResult<bool> {
        let out = self
            .runner
            .run(&self.binaries.zfs, &strings(&["list", &dataset(pool, name)]))
            .await?;
        Ok(out.success())
    }

    /// Create `pool/name` unless it exists.
    ///
    /// The filesystem is created with `mountpoint=legacy` so that mounting
    /// stays an explicit step.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Provision`] if creation fails.
    pub async fn ensure_filesystem(&self, pool: &str, name: &str) -> BootResult<()> {
        if self.filesystem_exists(pool, name).await? {
            tracing::debug!(pool, name, "Filesystem already exists");
            return Ok(());
        }

        tracing::info!(pool, name, "Creating filesystem");
        self.runner
            .run(
                &self.binaries.zfs,
                &strings(&["create", "-o", "mountpoint=legacy", &dataset(pool, name)]),
            )
            .await?
            .check("zfs create")?;
        Ok(())
    }

    /// Whether `path` is currently a mountpoint.
    ///
    /// # Errors
    ///
    /// Returns an error only if the checker cannot be executed.
    pub async fn is_mounted(&self, path: &Path) -> BootResult<bool> {
        let out = self
            .runner
            .run(&self.binaries.mountpoint, &[path_arg(path)?])
            .await?;
        Ok(out.success())
    }

    /// Mount `pool/name` at `mountpoint` unless something is mounted there.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the mount fails.
    pub async fn ensure_mounted(&self, pool: &str, name: &str, mountpoint: &Path) -> BootResult<()> {
        if self.is_mounted(mountpoint).await? {
            tracing::debug!(mountpoint = %mountpoint.display(), "Already mounted");
            return Ok(());
        }

        ensure_dir(mountpoint)?;
        tracing::info!(pool, name, mountpoint = %mountpoint.display(), "Mounting filesystem");
        self.runner
            .run(
                &self.binaries.mount_zfs,
                &[dataset(pool, name), path_arg(mountpoint)?],
            )
            .await?
            .check("mount.zfs")?;
        Ok(())
    }

    /// Bind-mount `source` onto `target` unless something is mounted there,
    /// creating `target` if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the mount fails.
    pub async fn bind_mount(&self, source: &Path, target: &Path) -> BootResult<()> {
        if self.is_mounted(target).await? {
            tracing::info!(target = %target.display(), "Bind mount already in place");
            return Ok(());
        }

        ensure_dir(target)?;
        tracing::info!(
            source = %source.display(),
            target = %target.display(),
            "Creating bind mount"
        );
        self.runner
            .run(
                &self.binaries.mount,
                &["--bind".to_string(), path_arg(source)?, path_arg(target)?],
            )
            .await?
            .check("mount (bind)")?;
        Ok(())
    }
}

/// Create `dir` (and its parents) with mode `0700` if it is absent.
///
/// # Errors
///
/// Returns an error if the directory cannot be inspected or created.
pub fn ensure_dir(dir: &Path) -> BootResult<()> {
    match std::fs::metadata(dir) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            std::fs::DirBuilder::new()
                .recursive(true)
                .mode(0o700)
                .create(dir)
                .map_err(|e| {
                    tracing::warn!(dir = %dir.display(), error = %e, "Failed to create directory");
                    BootError::Io(e)
                })
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to stat directory");
            Err(BootError::Io(e))
        }
    }
}

fn dataset(pool: &str, name: &str) -> String {
    format!("{pool}/{name}")
}

/// Path as a command argument. Non-UTF-8 paths are rejected rather than
/// lossily rewritten.
fn path_arg(path: &Path) -> BootResult<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| BootError::Config {
            message: format!("path {} is not valid UTF-8", path.display()),
        })
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}
