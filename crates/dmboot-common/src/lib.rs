//! # dmboot-common
//!
//! Shared types for the dmboot node bootstrap launcher.
//!
//! This crate provides common functionality used across all dmboot crates:
//! - The bootstrap error taxonomy
//! - Bootstrap configuration and deterministic mountpoint paths
//! - Strict parsers for seed addresses, dot references and credential files

#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod error;

pub use address::{Credentials, DotRef, SeedAddress, read_secret};
pub use config::BootConfig;
pub use error::{BootError, BootResult, RpcError};
