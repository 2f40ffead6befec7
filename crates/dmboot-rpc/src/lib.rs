//! # dmboot-rpc
//!
//! Client side of the filesystem service RPC API.
//!
//! This crate provides:
//! - A JSON-RPC over HTTP transport with basic auth
//! - Typed wrappers for the service methods used during bootstrap
//! - The readiness gate, dot lifecycle and transfer polling loops

#![warn(missing_docs)]

pub mod api;
pub mod client;
pub mod gate;
pub mod progress;
pub mod retry;
pub mod transfer;
pub mod volume;

pub use api::{Direction, DotmeshApi, TransferRequest, TransferState, TransferStatus};
pub use client::{HttpTransport, RpcTransport};
pub use gate::await_ready;
pub use progress::TransferProgress;
pub use transfer::{PollOutcome, TransferOrchestrator};
pub use volume::VolumeLifecycle;
