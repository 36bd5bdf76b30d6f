use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::{
    adapter::{Acl, ChildWatch, Coordinator, CreateMode, SessionEvent, WatchEvent, WatchKind},
    error::{Error, Result},
};

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    owner: Option<u64>,
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    /// Per-parent counters backing sequential child names.
    sequentials: HashMap<String, u64>,
    /// One-shot child watches, keyed by the watched node.
    watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    sessions: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
}

/// An in-process, ZooKeeper-class coordination service.
///
/// One instance is the whole service; [`MemoryCoordination::connect`] opens
/// sessions against it. Ephemeral nodes (and, unlike stock ZooKeeper, their
/// subtrees) are reclaimed when the owning session closes, expires or is
/// dropped.
#[derive(Clone, Default)]
pub struct MemoryCoordination {
    state: Arc<Mutex<State>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session. The receiver carries session state transitions,
    /// starting with [`SessionEvent::Connected`].
    pub fn connect(
        &self,
        session_timeout: Duration,
    ) -> (Arc<MemorySession>, mpsc::UnboundedReceiver<SessionEvent>) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let (events, receiver) = mpsc::unbounded_channel();
        let _ = events.send(SessionEvent::Connected);
        self.state.lock().sessions.insert(id, events);
        tracing::debug!(session = id, ?session_timeout, "coordination session opened");
        (
            Arc::new(MemorySession {
                state: Arc::clone(&self.state),
                id,
                session_timeout,
            }),
            receiver,
        )
    }
}

/// One session against a [`MemoryCoordination`] service.
pub struct MemorySession {
    state: Arc<Mutex<State>>,
    id: u64,
    session_timeout: Duration,
}

impl MemorySession {
    pub fn session_timeout(&self) -> Duration {
        self.session_timeout
    }

    /// Force-expires the session, as if its timeout elapsed without a
    /// heartbeat. Ephemerals are reclaimed exactly as on close.
    pub fn expire(&self) {
        self.end_session(SessionEvent::Expired);
    }

    fn end_session(&self, event: SessionEvent) {
        let mut state = self.state.lock();
        let Some(events) = state.sessions.remove(&self.id) else {
            return;
        };

        // Ephemeral roots owned by this session, expanded to whole subtrees.
        let mut doomed = BTreeSet::new();
        for (path, node) in &state.nodes {
            if node.owner == Some(self.id) {
                doomed.insert(path.clone());
                let prefix = format!("{path}/");
                doomed.extend(
                    state
                        .nodes
                        .range(prefix.clone()..)
                        .take_while(|(key, _)| key.starts_with(&prefix))
                        .map(|(key, _)| key.clone()),
                );
            }
        }

        let mut touched_parents = BTreeSet::new();
        for path in &doomed {
            state.nodes.remove(path);
            fire_watches(&mut state, path, WatchKind::NodeDeleted);
            let parent = parent_of(path).to_string();
            if !doomed.contains(&parent) {
                touched_parents.insert(parent);
            }
        }
        for parent in touched_parents {
            fire_watches(&mut state, &parent, WatchKind::ChildrenChanged);
        }

        tracing::debug!(session = self.id, reclaimed = doomed.len(), ?event, "session ended");
        let _ = events.send(event);
    }

    fn ensure_alive(&self, state: &State) -> Result<()> {
        if state.sessions.contains_key(&self.id) {
            Ok(())
        } else {
            Err(Error::SessionExpired)
        }
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        // A dropped handle can no longer heartbeat; the service times the
        // session out.
        self.end_session(SessionEvent::Expired);
    }
}

#[async_trait]
impl Coordinator for MemorySession {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode, _acl: Acl) -> Result<String> {
        validate_path(path)?;
        let mut state = self.state.lock();
        self.ensure_alive(&state)?;

        let parent = parent_of(path).to_string();
        if parent != "/" && !state.nodes.contains_key(&parent) {
            return Err(Error::NoNode { path: parent });
        }

        let actual_path = if mode.is_sequential() {
            let counter = state.sequentials.entry(parent.clone()).or_insert(0);
            let sequence = *counter;
            *counter += 1;
            format!("{path}{sequence:010}")
        } else {
            path.to_string()
        };

        if state.nodes.contains_key(&actual_path) {
            return Err(Error::NodeExists { path: actual_path });
        }

        state.nodes.insert(
            actual_path.clone(),
            Node {
                data: data.to_vec(),
                owner: mode.is_ephemeral().then_some(self.id),
            },
        );
        fire_watches(&mut state, &parent, WatchKind::ChildrenChanged);
        Ok(actual_path)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        validate_path(path)?;
        let state = self.state.lock();
        self.ensure_alive(&state)?;
        state
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| Error::NoNode { path: path.to_string() })
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        let state = self.state.lock();
        self.ensure_alive(&state)?;
        children_of(&state, path)
    }

    async fn children_with_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        let mut state = self.state.lock();
        self.ensure_alive(&state)?;
        let children = children_of(&state, path)?;
        let (sender, receiver) = oneshot::channel();
        state.watches.entry(path.to_string()).or_default().push(sender);
        Ok((children, receiver))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        let mut state = self.state.lock();
        self.ensure_alive(&state)?;
        if !state.nodes.contains_key(path) {
            return Err(Error::NoNode { path: path.to_string() });
        }
        if !children_of(&state, path)?.is_empty() {
            return Err(Error::NotEmpty { path: path.to_string() });
        }
        state.nodes.remove(path);
        fire_watches(&mut state, path, WatchKind::NodeDeleted);
        fire_watches(&mut state, parent_of(path), WatchKind::ChildrenChanged);
        Ok(())
    }

    async fn close(&self) {
        self.end_session(SessionEvent::Closed);
    }
}

fn validate_path(path: &str) -> Result<()> {
    let valid = path.starts_with('/')
        && path.len() > 1
        && !path.ends_with('/')
        && !path.contains("//");
    if valid {
        Ok(())
    } else {
        Err(Error::BadPath { path: path.to_string() })
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(index) => &path[..index],
    }
}

fn children_of(state: &State, path: &str) -> Result<Vec<String>> {
    if path != "/" {
        validate_path(path)?;
        if !state.nodes.contains_key(path) {
            return Err(Error::NoNode { path: path.to_string() });
        }
    }
    let prefix = if path == "/" { "/".to_string() } else { format!("{path}/") };
    Ok(state
        .nodes
        .range(prefix.clone()..)
        .take_while(|(key, _)| key.starts_with(&prefix))
        .filter(|(key, _)| !key[prefix.len()..].contains('/'))
        .map(|(key, _)| key[prefix.len()..].to_string())
        .collect())
}

fn fire_watches(state: &mut State, path: &str, kind: WatchKind) {
    if let Some(watchers) = state.watches.remove(path) {
        let event = WatchEvent { path: path.to_string(), kind };
        for watcher in watchers {
            let _ = watcher.send(event.clone());
        }
    }
}
