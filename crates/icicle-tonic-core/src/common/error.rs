//! Error type for the id service RPC surface and its gRPC status mapping.

use tonic::Status;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the id service.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Worker id outside the 5-bit range.
    #[error("invalid worker id {worker_id}")]
    InvalidWorker { worker_id: i64 },

    /// Datacenter id outside the 5-bit range.
    #[error("invalid datacenter id {datacenter_id}")]
    InvalidDatacenter { datacenter_id: i64 },

    /// Worker id in range, but no generator for it is registered with the
    /// serving process.
    #[error("worker id {worker_id} is not registered with this service")]
    UnknownWorker { worker_id: i64 },

    /// The server's wall clock is behind the generator's last issue time.
    #[error("clock moved backwards, refusing to generate an id for {behind_ms} ms")]
    ClockRegressed { behind_ms: i64 },
}

impl From<icicle::Error> for Error {
    fn from(err: icicle::Error) -> Self {
        match err {
            icicle::Error::InvalidWorkerId(worker_id) => Self::InvalidWorker { worker_id },
            icicle::Error::InvalidDatacenterId(datacenter_id) => {
                Self::InvalidDatacenter { datacenter_id }
            }
            icicle::Error::ClockRegressed { behind_ms } => Self::ClockRegressed { behind_ms },
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidWorker { .. } | Error::InvalidDatacenter { .. } => {
                Self::invalid_argument(message)
            }
            Error::UnknownWorker { .. } => Self::not_found(message),
            Error::ClockRegressed { .. } => Self::failed_precondition(message),
        }
    }
}
