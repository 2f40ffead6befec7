//! Dot existence, creation and lookup.

use std::time::Duration;

use dmboot_common::{BootConfig, BootError, BootResult, DotRef};

use crate::api::DotmeshApi;
use crate::client::RpcTransport;
use crate::retry::retry_n;

/// Drives the lifecycle of a named dot on the local service.
///
/// The service owns the dot; this only observes it and requests creation.
pub struct VolumeLifecycle<'a, T> {
    api: &'a DotmeshApi<T>,
    attempts: u32,
    backoff: Duration,
}

impl<'a, T: RpcTransport> VolumeLifecycle<'a, T> {
    /// Create a lifecycle using the retry bound and interval from `config`.
    pub const fn new(api: &'a DotmeshApi<T>, config: &BootConfig) -> Self {
        Self {
            api,
            attempts: config.exists_attempts,
            backoff: config.poll_interval,
        }
    }

    /// Id of `dot`, or `None` if it does not exist.
    ///
    /// Right after the liveness check the service may not answer metadata
    /// queries yet, so every error is retried up to the attempt bound.
    ///
    /// # Errors
    ///
    /// Returns the last RPC error once the bound is exhausted.
    pub async fn exists(&self, dot: &DotRef) -> BootResult<Option<String>> {
        let what = format!("check if {dot} exists");
        let id = retry_n(self.attempts, self.backoff, &what, || self.api.exists(dot)).await?;
        Ok(Some(id).filter(|id| !id.is_empty()))
    }

    /// Create `dot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or the service declines.
    pub async fn create(&self, dot: &DotRef) -> BootResult<()> {
        if self.api.create(dot).await? {
            Ok(())
        } else {
            Err(BootError::Protocol {
                message: format!("service declined to create dot {dot}"),
            })
        }
    }

    /// Current id of `dot`. Never cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or yields an empty id.
    pub async fn lookup(&self, dot: &DotRef) -> BootResult<String> {
        let id = self.api.lookup(dot).await?;
        if id.is_empty() {
            return Err(BootError::Protocol {
                message: format!("lookup of dot {dot} returned an empty id"),
            });
        }
        Ok(id)
    }

    /// Create `dot` if absent, then look up its id.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails.
    pub async fn ensure(&self, dot: &DotRef) -> BootResult<String> {
        if self.exists(dot).await?.is_some() {
            tracing::info!(%dot, "Found existing dot");
        } else {
            self.create(dot).await?;
            tracing::info!(%dot, "Created dot");
        }
        self.lookup(dot).await
    }
}
