//! Bootstrap configuration and standard paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// External binaries the bootstrap drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binaries {
    /// Pool management tool.
    pub zpool: String,
    /// Filesystem management tool.
    pub zfs: String,
    /// Mount helper for pool filesystems.
    pub mount_zfs: String,
    /// Generic mount tool (used for bind mounts).
    pub mount: String,
    /// Mountpoint checker.
    pub mountpoint: String,
    /// Coordination daemon.
    pub etcd: String,
    /// Filesystem service daemon.
    pub dotmesh_server: String,
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            zpool: "zpool".to_string(),
            zfs: "zfs".to_string(),
            mount_zfs: "mount.zfs".to_string(),
            mount: "mount".to_string(),
            mountpoint: "mountpoint".to_string(),
            etcd: "etcd".to_string(),
            dotmesh_server: "dotmesh-server".to_string(),
        }
    }
}

/// Configuration threaded through every bootstrap step.
#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Data directory of the coordination daemon (default: /var/dotmesh/etcd).
    pub etcd_data_dir: PathBuf,
    /// Client endpoint of the coordination daemon.
    pub etcd_endpoint: String,
    /// Name of the pool filesystem backing the coordination daemon.
    pub etcd_filesystem: String,
    /// Prefix under which the service mounts pool filesystems (default: /var).
    pub mount_prefix: PathBuf,
    /// Namespace root segment inside a pool's mount tree.
    pub root_fs: String,
    /// Host the service RPC endpoint listens on.
    pub rpc_host: String,
    /// Port the service RPC endpoint listens on.
    pub rpc_port: u16,
    /// Admin user for RPC basic auth.
    pub admin_user: String,
    /// Namespace dots land in when none is given.
    pub default_namespace: String,
    /// Fixed delay between polls.
    pub poll_interval: Duration,
    /// Attempts made by the dot existence check before giving up.
    pub exists_attempts: u32,
    /// External binaries.
    pub binaries: Binaries,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            etcd_data_dir: PathBuf::from("/var/dotmesh/etcd"),
            etcd_endpoint: "http://localhost:2379".to_string(),
            etcd_filesystem: "dotmesh-etcd".to_string(),
            mount_prefix: PathBuf::from("/var"),
            root_fs: "dmfs".to_string(),
            rpc_host: "localhost".to_string(),
            rpc_port: 32607,
            admin_user: "admin".to_string(),
            default_namespace: "admin".to_string(),
            poll_interval: Duration::from_secs(1),
            exists_attempts: 5,
            binaries: Binaries::default(),
        }
    }
}

impl BootConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mountpoint of a pool filesystem as laid out by the service.
    ///
    /// Pure function of `(pool, id)`; never stored.
    #[must_use]
    pub fn mountpoint(&self, pool: &str, id: &str) -> PathBuf {
        self.mount_prefix.join(pool).join(&self.root_fs).join(id)
    }

    /// URL of the service RPC endpoint.
    #[must_use]
    pub fn rpc_url(&self) -> String {
        format!("http://{}:{}/rpc", self.rpc_host, self.rpc_port)
    }

    /// Set the mount prefix.
    #[must_use]
    pub fn with_mount_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.mount_prefix = prefix.into();
        self
    }

    /// Set the coordination daemon data directory.
    #[must_use]
    pub fn with_etcd_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.etcd_data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the RPC host and port.
    #[must_use]
    pub fn with_rpc_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.rpc_host = host.into();
        self.rpc_port = port;
        self
    }

    /// Set the poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the existence-check attempt bound.
    #[must_use]
    pub const fn with_exists_attempts(mut self, attempts: u32) -> Self {
        self.exists_attempts = attempts;
        self
    }
}
