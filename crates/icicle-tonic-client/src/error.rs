pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors a dispatch can return.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No live connection to the worker id's current leader. The watcher
    /// keeps trying in the background; a later call may succeed.
    #[error("no rpc client available for worker id {worker_id}")]
    NoRpcClient { worker_id: i64 },

    /// The call failed at or on the way to the server. Surfaced unmodified;
    /// reconnection is the ping loop's job.
    #[error(transparent)]
    Rpc(#[from] tonic::Status),
}
