use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::Result;

/// How a node is created and reclaimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Deleted when the creating session closes or expires.
    Ephemeral,
    /// Ephemeral, with a zero-padded monotonic counter appended to the
    /// requested name.
    EphemeralSequential,
}

impl CreateMode {
    pub const fn is_ephemeral(self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }

    pub const fn is_sequential(self) -> bool {
        matches!(self, Self::EphemeralSequential)
    }
}

/// Node access policy. Only the open policy is used by this cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Acl {
    #[default]
    WorldAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchKind {
    /// A direct child of the watched node was created or deleted.
    ChildrenChanged,
    /// The watched node itself went away.
    NodeDeleted,
}

/// The single event a watch delivers before it closes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchKind,
}

/// One-shot notification registered by [`Coordinator::children_with_watch`].
///
/// Resolves with the first change under the watched node; a receive error
/// means the backend dropped the watch (e.g. the node vanished), which
/// callers treat the same as a change.
pub type ChildWatch = oneshot::Receiver<WatchEvent>;

/// Session state transitions, delivered on the channel handed out when the
/// session is opened. A suspended session must not be used to mutate state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Suspended,
    Expired,
    Closed,
}

/// A connected coordination session.
///
/// Paths are absolute and `/`-separated. All node data is an opaque byte
/// payload. Implementations map these operations onto whatever backend
/// actually stores the tree.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Creates a node and returns the path actually created (which differs
    /// from `path` for sequential nodes).
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode, acl: Acl) -> Result<String>;

    /// Reads a node's payload.
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Names (not full paths) of the node's direct children.
    async fn children(&self, path: &str) -> Result<Vec<String>>;

    /// Like [`Self::children`], additionally arming a one-shot watch that
    /// fires on the next change to the node's child list.
    async fn children_with_watch(&self, path: &str) -> Result<(Vec<String>, ChildWatch)>;

    /// Deletes a childless node.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Ends the session; the backend reclaims every ephemeral node it owns.
    async fn close(&self);
}
