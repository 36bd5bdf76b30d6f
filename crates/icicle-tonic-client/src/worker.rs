//! Per-worker-id leader discovery and the live connection set.

use std::sync::Arc;
use std::time::Duration;

use icicle_coord::{ChildWatch, Coordinator};
use icicle_tonic_core::{
    Peer, endpoint_uri,
    proto::{NextIdRequest, snowflake_rpc_client::SnowflakeRpcClient},
};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;

use crate::error::{Error, Result};
use crate::ping::ping_and_retry;

pub(crate) const WATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

/// One live connection to a leader bind address. The client slot is replaced
/// by the ping loop when it re-establishes a broken connection.
pub(crate) struct Conn {
    pub(crate) addr: String,
    pub(crate) client: RwLock<SnowflakeRpcClient<Channel>>,
    pub(crate) stop: CancellationToken,
}

pub(crate) type ConnSet = Vec<Arc<Conn>>;

struct Shared {
    worker_id: i64,
    /// The published set. Replaced as a whole on leader change; dispatchers
    /// clone the `Arc` so an in-flight call keeps its set alive.
    conns: RwLock<Arc<ConnSet>>,
}

/// Client handle for a single worker id.
///
/// Owns a watcher task that tracks the worker id's current leader and
/// maintains the connection set dispatch draws from.
pub struct WorkerClient {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerClient {
    pub(crate) fn spawn(coord: Arc<dyn Coordinator>, path: String, worker_id: i64) -> Self {
        let shared = Arc::new(Shared {
            worker_id,
            conns: RwLock::new(Arc::new(Vec::new())),
        });
        let shutdown = CancellationToken::new();
        let watcher = tokio::spawn(watch_worker_id(
            coord,
            path,
            Arc::clone(&shared),
            shutdown.clone(),
        ));
        Self {
            shared,
            shutdown,
            watcher: Mutex::new(Some(watcher)),
        }
    }

    pub fn worker_id(&self) -> i64 {
        self.shared.worker_id
    }

    /// Addresses of the connections currently in the published set.
    pub fn endpoints(&self) -> Vec<String> {
        self.shared
            .conns
            .read()
            .iter()
            .map(|conn| conn.addr.clone())
            .collect()
    }

    /// Requests the next id from a uniformly random connection to the
    /// current leader.
    pub async fn id(&self) -> Result<i64> {
        let conns = Arc::clone(&*self.shared.conns.read());
        let conn = match conns.len() {
            0 => {
                return Err(Error::NoRpcClient {
                    worker_id: self.shared.worker_id,
                });
            }
            1 => &conns[0],
            len => &conns[rand::rng().random_range(0..len)],
        };
        let mut client = conn.client.read().clone();
        let reply = client
            .next_id(NextIdRequest {
                worker_id: self.shared.worker_id,
            })
            .await?;
        Ok(reply.into_inner().id)
    }

    /// Stops the watcher and every ping worker, closing all connections.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let watcher = self.watcher.lock().take();
        if let Some(watcher) = watcher {
            let _ = watcher.await;
        }
        let old = {
            let mut conns = self.shared.conns.write();
            std::mem::replace(&mut *conns, Arc::new(Vec::new()))
        };
        stop_conns(&old);
    }
}

/// The watcher loop: list member nodes, elect the smallest as leader, dial
/// its advertised addresses, swap the set, wait for the next change.
/// Transient coordination failures back off for a second and retry forever.
async fn watch_worker_id(
    coord: Arc<dyn Coordinator>,
    path: String,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) {
    let worker_path = format!("{}/{}", path, shared.worker_id);
    let mut leader = String::new();

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let (mut nodes, watch) = match coord.children_with_watch(&worker_path).await {
            Ok(listing) => listing,
            Err(err) => {
                tracing::warn!(path = %worker_path, %err, "children watch failed, retrying");
                if sleep_or_shutdown(&shutdown, WATCH_RETRY_DELAY).await {
                    return;
                }
                continue;
            }
        };
        if nodes.is_empty() {
            tracing::warn!(path = %worker_path, "no member nodes, retrying");
            if sleep_or_shutdown(&shutdown, WATCH_RETRY_DELAY).await {
                return;
            }
            continue;
        }

        nodes.sort_unstable();
        let new_leader = nodes.remove(0);
        if leader == new_leader {
            // A standby joined; it adds no rpc endpoints, so keep the set.
            tracing::info!(worker_id = shared.worker_id, %leader, "standby joined, leader unchanged");
            if wait_watch(&shutdown, watch).await {
                return;
            }
            continue;
        }
        tracing::info!(
            worker_id = shared.worker_id,
            old = %leader,
            new = %new_leader,
            "leader changed, rebuilding connections"
        );

        let member_path = format!("{worker_path}/{new_leader}");
        let payload = match coord.get(&member_path).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(path = %member_path, %err, "leader read failed, retrying");
                if sleep_or_shutdown(&shutdown, WATCH_RETRY_DELAY).await {
                    return;
                }
                continue;
            }
        };
        let peer: Peer = match serde_json::from_slice(&payload) {
            Ok(peer) => peer,
            Err(err) => {
                tracing::warn!(path = %member_path, %err, "leader payload unparsable, retrying");
                if sleep_or_shutdown(&shutdown, WATCH_RETRY_DELAY).await {
                    return;
                }
                continue;
            }
        };

        let mut next: ConnSet = Vec::with_capacity(peer.rpc.len());
        for addr in peer.rpc {
            match SnowflakeRpcClient::connect(endpoint_uri(&addr)).await {
                Ok(client) => {
                    let conn = Arc::new(Conn {
                        addr,
                        client: RwLock::new(client),
                        stop: shutdown.child_token(),
                    });
                    tokio::spawn(ping_and_retry(Arc::clone(&conn)));
                    next.push(conn);
                }
                Err(err) => {
                    // Keep whatever else dialed; the leader stays reachable
                    // through its remaining addresses.
                    tracing::warn!(%addr, %err, "dial failed, skipping address");
                }
            }
        }

        // Publish the new set before stopping the old one, so a concurrent
        // dispatch sees either the old set (still live) or the new one,
        // never a half-torn-down mixture.
        let old = {
            let mut conns = shared.conns.write();
            std::mem::replace(&mut *conns, Arc::new(next))
        };
        stop_conns(&old);
        leader = new_leader;

        if wait_watch(&shutdown, watch).await {
            return;
        }
    }
}

fn stop_conns(set: &ConnSet) {
    for conn in set {
        conn.stop.cancel();
    }
}

/// Sleeps for `delay` unless shut down first; true means shut down.
async fn sleep_or_shutdown(shutdown: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => true,
        () = sleep(delay) => false,
    }
}

/// Blocks on the armed watch; true means shut down. A closed watch channel
/// means the watched node itself went away, which is handled like any other
/// change by rescanning.
async fn wait_watch(shutdown: &CancellationToken, watch: ChildWatch) -> bool {
    tokio::select! {
        () = shutdown.cancelled() => true,
        event = watch => {
            match event {
                Ok(event) => tracing::info!(?event, "membership changed"),
                Err(_) => tracing::warn!("watch channel closed, rescanning"),
            }
            false
        }
    }
}
