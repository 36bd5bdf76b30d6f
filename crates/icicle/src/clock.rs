use std::time::{SystemTime, UNIX_EPOCH};

pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// A wall-clock capability.
///
/// Injected into everything that reads time so tests can pin, step or skew
/// it. The nanosecond reading is primary; milliseconds are derived from it,
/// which keeps the id generator and the cluster drift check on the same
/// clock by construction.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> i64;

    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now_nanos() / NANOS_PER_MILLI
    }
}

/// The production clock, backed by [`SystemTime`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX_EPOCH")
            .as_nanos() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_derive_from_nanos() {
        struct Pinned;
        impl Clock for Pinned {
            fn now_nanos(&self) -> i64 {
                1_999_999
            }
        }
        assert_eq!(Pinned.now_millis(), 1);
    }

    #[test]
    fn system_clock_is_past_the_custom_epoch() {
        let clock = SystemClock;
        assert!(clock.now_millis() > crate::TWEPOCH);
        assert!(clock.now_nanos() / NANOS_PER_MILLI >= clock.now_millis() - 1);
    }
}
