//! Error types for the bootstrap sequence.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`BootError`].
pub type BootResult<T> = Result<T, BootError>;

/// Server message prefix for a transfer id the service has not registered yet.
const NO_SUCH_TRANSFER: &str = "No such intercluster transfer";

/// Failure of a single remote call.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The request never produced an HTTP response.
    #[error("RPC transport error: {message}")]
    #[diagnostic(code(dmboot::rpc::transport))]
    Transport {
        /// Underlying client error.
        message: String,
    },

    /// The service answered with a non-2xx status.
    #[error("RPC returned HTTP {status}: {body}")]
    #[diagnostic(
        code(dmboot::rpc::http_status),
        help("A 401 usually means the admin API key does not match the one the service was seeded with")
    )]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("Couldn't decode response '{body}': {message}")]
    #[diagnostic(code(dmboot::rpc::decode))]
    Decode {
        /// Decoder error.
        message: String,
        /// Response body, verbatim.
        body: String,
    },

    /// The service reported an error for the call.
    #[error("{message}")]
    #[diagnostic(code(dmboot::rpc::remote))]
    Remote {
        /// JSON-RPC error code, zero when the server omitted it.
        code: i64,
        /// Server-supplied message.
        message: String,
    },

    /// The response carried neither a result nor an error.
    #[error("RPC response has no result")]
    #[diagnostic(code(dmboot::rpc::null_result))]
    NullResult,
}

impl RpcError {
    /// Whether this is the transient "transfer not registered yet" condition.
    #[must_use]
    pub fn is_no_such_transfer(&self) -> bool {
        matches!(self, Self::Remote { message, .. } if message.contains(NO_SUCH_TRANSFER))
    }
}

/// Errors raised while bootstrapping a node.
#[derive(Error, Diagnostic, Debug)]
pub enum BootError {
    /// A pool, filesystem or mount operation failed.
    #[error("{operation} failed ({status}): {output}")]
    #[diagnostic(code(dmboot::provision))]
    Provision {
        /// The operation that failed, e.g. `zpool create`.
        operation: String,
        /// Exit status description.
        status: String,
        /// Combined output of the external tool, verbatim.
        output: String,
    },

    /// A supervised daemon could not be started or signalled.
    #[error("Failed to launch {program}: {source}")]
    #[diagnostic(
        code(dmboot::launch),
        help("Check that the binary is installed and on PATH")
    )]
    Launch {
        /// The program being launched.
        program: String,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// A remote call failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Rpc(#[from] RpcError),

    /// Input or a remote answer did not have the expected shape.
    #[error("Protocol error: {message}")]
    #[diagnostic(code(dmboot::protocol))]
    Protocol {
        /// The error message.
        message: String,
    },

    /// The service reported a failed transfer.
    #[error("Transfer failed: {message}")]
    #[diagnostic(code(dmboot::remote))]
    Remote {
        /// Server-supplied message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(dmboot::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(dmboot::io))]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(dmboot::internal))]
    Internal {
        /// The error message.
        message: String,
    },
}
