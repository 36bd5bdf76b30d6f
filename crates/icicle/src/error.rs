use crate::id::{MAX_DATACENTER_ID, MAX_WORKER_ID};

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors the id generator can emit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Worker id outside `0..=31` at construction.
    #[error("worker id {0} out of range (0..={max})", max = MAX_WORKER_ID)]
    InvalidWorkerId(i64),

    /// Datacenter id outside `0..=31` at construction.
    #[error("datacenter id {0} out of range (0..={max})", max = MAX_DATACENTER_ID)]
    InvalidDatacenterId(i64),

    /// The wall clock is behind the generator's last issue time. The caller
    /// may retry once the clock has caught up; the generator never papers
    /// over this itself.
    #[error("clock moved backwards, refusing to generate an id for {behind_ms} ms")]
    ClockRegressed { behind_ms: i64 },
}
