//! # dmboot-storage
//!
//! Idempotent storage provisioning for dmboot.
//!
//! This crate provides:
//! - A [`CommandRunner`] seam over external tools
//! - The [`Provisioner`], which ensures pools and filesystems exist and are mounted

#![warn(missing_docs)]

pub mod command;
pub mod provision;

pub use command::{CommandOutput, CommandRunner, SystemRunner};
pub use provision::{PoolId, Provisioner, ensure_dir};
