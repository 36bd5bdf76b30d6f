pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors surfaced by a coordination backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Create of a path that already exists. Registration treats this as a
    /// worker-id claim conflict and retries.
    #[error("node already exists: {path}")]
    NodeExists { path: String },

    /// The path (or its parent, for create) does not exist.
    #[error("node does not exist: {path}")]
    NoNode { path: String },

    /// Delete of a node that still has children.
    #[error("node has children: {path}")]
    NotEmpty { path: String },

    /// Not an absolute, `/`-separated path with non-empty segments.
    #[error("invalid path: {path:?}")]
    BadPath { path: String },

    /// The session behind this handle has been closed or expired; no call
    /// can mutate or observe state through it any more.
    #[error("coordination session has ended")]
    SessionExpired,
}
