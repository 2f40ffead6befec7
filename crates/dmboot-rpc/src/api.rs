//! Typed service methods used during bootstrap.

use std::fmt;

use dmboot_common::{Credentials, DotRef, RpcError, SeedAddress};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::client::RpcTransport;

/// Direction of a transfer, seen from the local service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Local to peer.
    Push,
    /// Peer to local.
    Pull,
}

/// Arguments of `DotmeshRPC.Transfer`.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransferRequest {
    /// Peer service host.
    pub peer: String,
    /// API user on the peer.
    pub user: String,
    /// API key on the peer.
    pub api_key: String,
    /// Transfer direction.
    pub direction: Direction,
    /// Local dot namespace.
    pub local_namespace: String,
    /// Local dot name.
    pub local_name: String,
    /// Local branch, empty for the default branch.
    pub local_branch_name: String,
    /// Remote dot namespace.
    pub remote_namespace: String,
    /// Remote dot name.
    pub remote_name: String,
    /// Remote branch, empty for the default branch.
    pub remote_branch_name: String,
}

impl TransferRequest {
    /// Pull `seed` from its peer into the local dot `local`.
    #[must_use]
    pub fn pull_seed(seed: &SeedAddress, credentials: &Credentials, local: &DotRef) -> Self {
        Self {
            peer: seed.host.clone(),
            user: credentials.user.clone(),
            api_key: credentials.api_key.clone(),
            direction: Direction::Pull,
            local_namespace: local.namespace.clone(),
            local_name: local.name.clone(),
            local_branch_name: String::new(),
            remote_namespace: seed.namespace.clone(),
            remote_name: seed.name.clone(),
            remote_branch_name: String::new(),
        }
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("peer", &self.peer)
            .field("user", &self.user)
            .field("api_key", &"<redacted>")
            .field("direction", &self.direction)
            .field("local", &format_args!("{}/{}", self.local_namespace, self.local_name))
            .field("remote", &format_args!("{}/{}", self.remote_namespace, self.remote_name))
            .finish()
    }
}

/// Remote status of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferState {
    /// Accepted, not yet moving data.
    Starting,
    /// Moving data.
    Running,
    /// The current segment finished.
    Finished,
    /// The transfer failed.
    Error,
    /// Anything this client does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Error => "error",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Snapshot of a transfer returned by `DotmeshRPC.GetTransfer`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TransferStatus {
    /// Server-issued transfer id.
    pub transfer_request_id: String,
    /// Peer service host.
    pub peer: String,
    /// `push` or `pull`.
    pub direction: String,
    /// Local dot namespace.
    pub local_namespace: String,
    /// Local dot name.
    pub local_name: String,
    /// Remote dot namespace.
    pub remote_namespace: String,
    /// Remote dot name.
    pub remote_name: String,
    /// Index of the segment being transferred.
    pub index: u64,
    /// Number of segments.
    pub total: u64,
    /// Current status.
    pub status: TransferState,
    /// Time spent on the current segment.
    pub nanoseconds_elapsed: u64,
    /// Size of the current segment in bytes.
    pub size: u64,
    /// Bytes of the current segment sent so far.
    pub sent: u64,
    /// Human-readable status or error message.
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct VolumeName<'a> {
    name: &'a str,
    namespace: &'a str,
}

impl<'a> From<&'a DotRef> for VolumeName<'a> {
    fn from(dot: &'a DotRef) -> Self {
        Self {
            name: &dot.name,
            namespace: &dot.namespace,
        }
    }
}

/// Typed access to the service API over any transport.
pub struct DotmeshApi<T> {
    transport: T,
}

impl<T: RpcTransport> DotmeshApi<T> {
    /// Wrap a transport.
    pub const fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Issue one call, logging parameters and outcome.
    ///
    /// # Errors
    ///
    /// Returns the transport error, or [`RpcError::Decode`] if the result
    /// does not have the expected type.
    pub async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, RpcError>
    where
        P: Serialize + fmt::Debug + Sync,
        R: DeserializeOwned + fmt::Debug,
    {
        let value = serde_json::to_value(params).map_err(|e| RpcError::Decode {
            message: format!("cannot encode params: {e}"),
            body: format!("{params:?}"),
        })?;

        let outcome = self.transport.call(method, value).await.and_then(|result| {
            serde_json::from_value::<R>(result.clone()).map_err(|e| RpcError::Decode {
                message: e.to_string(),
                body: result.to_string(),
            })
        });

        match &outcome {
            Ok(result) => tracing::debug!(method, ?params, ?result, "RPC"),
            Err(error) => tracing::warn!(method, ?params, %error, "RPC failed"),
        }
        outcome
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn ping(&self) -> Result<bool, RpcError> {
        self.call("DotmeshRPC.Ping", &()).await
    }

    /// Id of `dot`, or an empty string if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn exists(&self, dot: &DotRef) -> Result<String, RpcError> {
        self.call("DotmeshRPC.Exists", &VolumeName::from(dot)).await
    }

    /// Create `dot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn create(&self, dot: &DotRef) -> Result<bool, RpcError> {
        self.call("DotmeshRPC.Create", &VolumeName::from(dot)).await
    }

    /// Current id of `dot`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn lookup(&self, dot: &DotRef) -> Result<String, RpcError> {
        self.call("DotmeshRPC.Lookup", &VolumeName::from(dot)).await
    }

    /// Start a transfer and return its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn transfer(&self, request: &TransferRequest) -> Result<String, RpcError> {
        self.call("DotmeshRPC.Transfer", request).await
    }

    /// Snapshot of transfer `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails.
    pub async fn get_transfer(&self, id: &str) -> Result<TransferStatus, RpcError> {
        self.call("DotmeshRPC.GetTransfer", &id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn transfer_request_wire_names() {
        let seed = SeedAddress::parse("dothub.com/alice/postgres").unwrap();
        let creds = Credentials::parse("bob:k3y").unwrap();
        let local = DotRef::new("admin", "db");

        let value = serde_json::to_value(TransferRequest::pull_seed(&seed, &creds, &local)).unwrap();
        assert_eq!(
            value,
            json!({
                "Peer": "dothub.com",
                "User": "bob",
                "ApiKey": "k3y",
                "Direction": "pull",
                "LocalNamespace": "admin",
                "LocalName": "db",
                "LocalBranchName": "",
                "RemoteNamespace": "alice",
                "RemoteName": "postgres",
                "RemoteBranchName": "",
            })
        );
    }

    #[test]
    fn transfer_request_debug_redacts_key() {
        let seed = SeedAddress::parse("dothub.com/alice/postgres").unwrap();
        let creds = Credentials::parse("bob:k3y").unwrap();
        let request = TransferRequest::pull_seed(&seed, &creds, &DotRef::new("admin", "db"));
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("k3y"));
        assert!(rendered.contains("alice/postgres"));
    }

    #[test]
    fn transfer_status_decodes() {
        let status: TransferStatus = serde_json::from_value(json!({
            "TransferRequestId": "t-1",
            "Peer": "dothub.com",
            "Direction": "pull",
            "Index": 2,
            "Total": 3,
            "Status": "running",
            "NanosecondsElapsed": 1_000_000_000u64,
            "Size": 4096,
            "Sent": 1024,
            "Message": "",
            "FilesystemId": "ignored",
        }))
        .unwrap();
        assert_eq!(status.status, TransferState::Running);
        assert_eq!((status.index, status.total), (2, 3));
        assert_eq!(status.sent, 1024);
    }

    #[test]
    fn unknown_state_is_tolerated() {
        let status: TransferStatus =
            serde_json::from_value(json!({"Status": "paused"})).unwrap();
        assert_eq!(status.status, TransferState::Unknown);
    }

    #[test]
    fn volume_name_wire_names() {
        let dot = DotRef::new("admin", "db");
        let value = serde_json::to_value(VolumeName::from(&dot)).unwrap();
        assert_eq!(value, json!({"Name": "db", "Namespace": "admin"}));
    }
}
