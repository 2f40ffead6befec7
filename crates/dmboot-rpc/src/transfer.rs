//! Remote-to-local transfer driven by fixed-interval status polling.
//!
//! The service exposes no subscription API, so completion is observed by
//! polling `DotmeshRPC.GetTransfer` until a terminal snapshot arrives.

use std::time::Duration;

use dmboot_common::{BootError, BootResult};

use crate::api::{DotmeshApi, TransferRequest, TransferState, TransferStatus};
use crate::client::RpcTransport;
use crate::progress::TransferProgress;

/// What a status snapshot means for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Keep polling.
    Continue,
    /// Last segment finished.
    Finished,
    /// The service reported failure with this message.
    Failed(String),
}

impl PollOutcome {
    /// Classify a snapshot.
    ///
    /// A multi-segment transfer is only finished once the last segment
    /// reports `finished`.
    #[must_use]
    pub fn classify(status: &TransferStatus) -> Self {
        match status.status {
            TransferState::Finished if status.index == status.total => Self::Finished,
            TransferState::Error => Self::Failed(status.message.clone()),
            _ => Self::Continue,
        }
    }
}

/// Starts a transfer and polls it to a terminal state.
pub struct TransferOrchestrator<'a, T> {
    api: &'a DotmeshApi<T>,
    interval: Duration,
    progress: TransferProgress,
}

impl<'a, T: RpcTransport> TransferOrchestrator<'a, T> {
    /// Create an orchestrator polling every `interval`, drawing progress on stderr.
    #[must_use]
    pub fn new(api: &'a DotmeshApi<T>, interval: Duration) -> Self {
        Self::with_progress(api, interval, TransferProgress::new())
    }

    /// Create an orchestrator with an explicit progress sink.
    #[must_use]
    pub const fn with_progress(
        api: &'a DotmeshApi<T>,
        interval: Duration,
        progress: TransferProgress,
    ) -> Self {
        Self {
            api,
            interval,
            progress,
        }
    }

    /// Start `request` and return the transfer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or yields an empty id.
    pub async fn start(&self, request: &TransferRequest) -> BootResult<String> {
        let id = self.api.transfer(request).await?;
        if id.is_empty() {
            return Err(BootError::Protocol {
                message: "transfer start returned an empty transfer id".to_string(),
            });
        }
        tracing::info!(transfer = %id, peer = %request.peer, "Transfer started");
        Ok(id)
    }

    /// Poll transfer `id` until it finishes or fails.
    ///
    /// Poll errors never abort the loop: a "no such transfer" answer is the
    /// expected race with the transfer's own registration and is only logged
    /// at debug level, anything else is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`BootError::Remote`] carrying the server message when the
    /// transfer reports `error`.
    pub async fn poll(&mut self, id: &str) -> BootResult<TransferStatus> {
        loop {
            match self.api.get_transfer(id).await {
                Err(error) if error.is_no_such_transfer() => {
                    tracing::debug!(transfer = id, "Transfer not registered yet");
                }
                Err(error) => {
                    tracing::warn!(transfer = id, %error, "Transfer status poll failed, continuing");
                }
                Ok(status) => {
                    self.progress.update(&status);
                    match PollOutcome::classify(&status) {
                        PollOutcome::Continue => {}
                        PollOutcome::Finished => {
                            self.progress.finish(&status);
                            // Let trailing log output from the service flush.
                            tokio::time::sleep(self.interval).await;
                            tracing::info!(transfer = id, "Transfer finished");
                            return Ok(status);
                        }
                        PollOutcome::Failed(message) => {
                            self.progress.finish(&status);
                            tokio::time::sleep(self.interval).await;
                            tracing::error!(transfer = id, %message, "Transfer failed");
                            return Err(BootError::Remote { message });
                        }
                    }
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Start `request` and poll it to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer cannot be started or fails remotely.
    pub async fn run(&mut self, request: &TransferRequest) -> BootResult<TransferStatus> {
        let id = self.start(request).await?;
        self.poll(&id).await
    }
}
