//! The worker-id keyed client cache.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use icicle_coord::{Coordinator, SessionEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::worker::WorkerClient;

/// Client pool over one coordination session.
///
/// Hands out one [`WorkerClient`] per worker id, spawning its watcher on
/// first use. The map is guarded by a single mutex; creating and destroying
/// clients both take it.
pub struct Pool {
    coord: Arc<dyn Coordinator>,
    path: String,
    clients: Mutex<HashMap<i64, Arc<WorkerClient>>>,
}

impl Pool {
    /// Builds a pool over an open session. `path` is the parent under which
    /// servers claim worker ids. Session state transitions are drained in
    /// the background and logged.
    pub fn new(
        coord: Arc<dyn Coordinator>,
        path: impl Into<String>,
        mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Self {
        tokio::spawn(async move {
            while let Some(event) = session_events.recv().await {
                tracing::info!(?event, "coordination session event");
            }
        });
        Self {
            coord,
            path: path.into(),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The cached client for `worker_id`, created on first use.
    pub fn worker(&self, worker_id: i64) -> Arc<WorkerClient> {
        let mut clients = self.clients.lock();
        Arc::clone(clients.entry(worker_id).or_insert_with(|| {
            Arc::new(WorkerClient::spawn(
                Arc::clone(&self.coord),
                self.path.clone(),
                worker_id,
            ))
        }))
    }

    /// Removes the cached client for `worker_id`, stopping its watcher and
    /// closing its connections. Handles held elsewhere stay valid but stop
    /// being refreshed.
    pub async fn destroy(&self, worker_id: i64) {
        let client = self.clients.lock().remove(&worker_id);
        if let Some(client) = client {
            client.close().await;
        }
    }

    /// Closes every cached client, then the coordination session.
    pub async fn close(&self) {
        let clients: Vec<_> = self.clients.lock().drain().map(|(_, client)| client).collect();
        join_all(clients.iter().map(|client| client.close())).await;
        self.coord.close().await;
    }
}
