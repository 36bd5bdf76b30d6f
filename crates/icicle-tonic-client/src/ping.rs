//! Per-connection health keeping.

use std::sync::Arc;
use std::time::Duration;

use icicle_tonic_core::{
    endpoint_uri,
    proto::{PingRequest, snowflake_rpc_client::SnowflakeRpcClient},
};
use tokio::time::sleep;

use crate::worker::Conn;

pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(1);
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Two-state loop bound to one connection slot.
///
/// Healthy: `Ping` once a second; a failure flips to broken. Broken: redial
/// the address once a second until it succeeds, then swap the fresh
/// connection into the slot and flip back. The stop token is honored at the
/// top of every iteration and while sleeping.
pub(crate) async fn ping_and_retry(conn: Arc<Conn>) {
    let mut healthy = true;
    loop {
        if conn.stop.is_cancelled() {
            return;
        }

        if healthy {
            let mut client = conn.client.read().clone();
            match client.ping(PingRequest {}).await {
                Ok(_) => {
                    tokio::select! {
                        () = conn.stop.cancelled() => return,
                        () = sleep(PING_INTERVAL) => {}
                    }
                }
                Err(err) => {
                    tracing::warn!(addr = %conn.addr, %err, "ping failed, reconnecting");
                    healthy = false;
                }
            }
            continue;
        }

        match SnowflakeRpcClient::connect(endpoint_uri(&conn.addr)).await {
            Ok(client) => {
                *conn.client.write() = client;
                healthy = true;
                tracing::info!(addr = %conn.addr, "reconnected");
            }
            Err(err) => {
                tracing::warn!(addr = %conn.addr, %err, "reconnect failed, retrying");
                tokio::select! {
                    () = conn.stop.cancelled() => return,
                    () = sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }
}
