//! # dmboot
//!
//! Bootstraps a dotmesh storage node.
//!
//! Given a storage device and a pool name, dmboot idempotently provisions the
//! pool, starts the coordination daemon (etcd) and the filesystem service
//! (dotmesh-server), waits for the service to answer RPC, ensures a named dot
//! exists (optionally seeding it from a remote service), bind-mounts it at a
//! requested path and, in oneshot mode, stops both daemons again.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod cli;
pub mod supervisor;

pub use bootstrap::{BootPlan, Bootstrap, Seed};
pub use supervisor::{Daemon, DaemonProcess, DaemonSpec, Launcher, ProcessLauncher, Supervisor};
