//! Blocks until the service answers RPC.

use std::time::Duration;

use crate::api::DotmeshApi;
use crate::client::RpcTransport;

/// Ping the service every `interval` until a call succeeds.
///
/// There is no upper bound: the daemon's startup time is not ours to limit.
/// Each failed attempt is logged so "still starting" can be told apart from
/// "hung". Returns the number of attempts made.
pub async fn await_ready<T: RpcTransport>(api: &DotmeshApi<T>, interval: Duration) -> u64 {
    let mut attempt: u64 = 1;
    loop {
        match api.ping().await {
            Ok(_) => {
                tracing::info!(attempt, "Connected to filesystem service");
                return attempt;
            }
            Err(error) => {
                tracing::info!(attempt, %error, "Service not ready, retrying");
                tokio::time::sleep(interval).await;
                attempt += 1;
            }
        }
    }
}
