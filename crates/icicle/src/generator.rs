use parking_lot::Mutex;

use crate::{
    clock::Clock,
    error::{Error, Result},
    id::{MAX_DATACENTER_ID, MAX_WORKER_ID, SEQUENCE_MASK, SnowflakeId, TWEPOCH},
};

/// Sentinel for a generator that has never issued an id.
const NEVER_ISSUED: i64 = -1;

#[derive(Debug)]
struct GeneratorState {
    last_timestamp: i64,
    sequence: i64,
}

/// A mutex-guarded snowflake id generator bound to one worker id.
///
/// Every call reads the clock and updates `(last_timestamp, sequence)` inside
/// the critical section, so concurrent callers always observe a strictly
/// increasing `(timestamp, sequence)` pair. The lock is never held across
/// I/O; the only wait is a sub-millisecond spin when a single millisecond's
/// 4096 sequence numbers are exhausted.
#[derive(Debug)]
pub struct IdGenerator<C> {
    worker_id: i64,
    datacenter_id: i64,
    clock: C,
    state: Mutex<GeneratorState>,
}

impl<C> IdGenerator<C>
where
    C: Clock,
{
    /// Creates a generator for `worker_id` in `datacenter_id`, rejecting
    /// either when it does not fit its 5-bit field.
    pub fn new(worker_id: i64, datacenter_id: i64, clock: C) -> Result<Self> {
        if !(0..=MAX_WORKER_ID).contains(&worker_id) {
            return Err(Error::InvalidWorkerId(worker_id));
        }
        if !(0..=MAX_DATACENTER_ID).contains(&datacenter_id) {
            return Err(Error::InvalidDatacenterId(datacenter_id));
        }
        Ok(Self {
            worker_id,
            datacenter_id,
            clock,
            state: Mutex::new(GeneratorState {
                last_timestamp: NEVER_ISSUED,
                sequence: 0,
            }),
        })
    }

    pub fn worker_id(&self) -> i64 {
        self.worker_id
    }

    pub fn datacenter_id(&self) -> i64 {
        self.datacenter_id
    }

    /// Issues the next id.
    ///
    /// # Errors
    ///
    /// [`Error::ClockRegressed`] when the clock reads earlier than the last
    /// issue time. No state is mutated in that case, so a later call (once
    /// the clock caught up) resumes exactly where the generator left off.
    pub fn next_id(&self) -> Result<SnowflakeId> {
        let mut state = self.state.lock();

        let mut timestamp = self.clock.now_millis();
        if timestamp < state.last_timestamp {
            let behind_ms = state.last_timestamp - timestamp;
            tracing::error!(
                behind_ms,
                "clock is moving backwards, rejecting requests until {}",
                state.last_timestamp
            );
            return Err(Error::ClockRegressed { behind_ms });
        }

        let sequence = if timestamp == state.last_timestamp {
            let sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if sequence == 0 {
                // Sequence exhausted within this millisecond; spin until the
                // clock ticks over.
                timestamp = self.until_next_millis(state.last_timestamp);
            }
            sequence
        } else {
            0
        };

        state.last_timestamp = timestamp;
        state.sequence = sequence;

        Ok(SnowflakeId::from_components(
            timestamp - TWEPOCH,
            self.datacenter_id,
            self.worker_id,
            sequence,
        ))
    }

    fn until_next_millis(&self, last_timestamp: i64) -> i64 {
        loop {
            let timestamp = self.clock.now_millis();
            if timestamp > last_timestamp {
                return timestamp;
            }
            core::hint::spin_loop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;
    use crate::clock::{NANOS_PER_MILLI, SystemClock};
    use crate::id::SEQUENCE_BITS;

    struct FixedClock {
        millis: i64,
    }

    impl Clock for FixedClock {
        fn now_nanos(&self) -> i64 {
            self.millis * NANOS_PER_MILLI
        }
    }

    /// Returns each value once, then the final value forever.
    struct StepClock {
        millis: Vec<i64>,
        reads: AtomicUsize,
    }

    impl StepClock {
        fn new(millis: Vec<i64>) -> Self {
            Self {
                millis,
                reads: AtomicUsize::new(0),
            }
        }
    }

    impl Clock for StepClock {
        fn now_nanos(&self) -> i64 {
            let read = self.reads.fetch_add(1, Ordering::Relaxed);
            let index = read.min(self.millis.len() - 1);
            self.millis[index] * NANOS_PER_MILLI
        }
    }

    #[test]
    fn rejects_out_of_range_components() {
        assert_eq!(
            IdGenerator::new(MAX_WORKER_ID + 1, 0, SystemClock).unwrap_err(),
            Error::InvalidWorkerId(MAX_WORKER_ID + 1)
        );
        assert_eq!(
            IdGenerator::new(-1, 0, SystemClock).unwrap_err(),
            Error::InvalidWorkerId(-1)
        );
        assert_eq!(
            IdGenerator::new(0, MAX_DATACENTER_ID + 1, SystemClock).unwrap_err(),
            Error::InvalidDatacenterId(MAX_DATACENTER_ID + 1)
        );
        assert_eq!(
            IdGenerator::new(0, -1, SystemClock).unwrap_err(),
            Error::InvalidDatacenterId(-1)
        );
    }

    #[test]
    fn first_id_one_milli_past_the_epoch() {
        let clock = FixedClock { millis: TWEPOCH + 1 };
        let generator = IdGenerator::new(0, 0, clock).unwrap();
        assert_eq!(generator.next_id().unwrap().into_raw(), 1 << 22);
        assert_eq!(generator.next_id().unwrap().into_raw(), 4_194_304 + 1);
    }

    #[test]
    fn sequence_resets_when_the_clock_advances() {
        let clock = StepClock::new(vec![TWEPOCH + 1, TWEPOCH + 2]);
        let generator = IdGenerator::new(0, 0, clock).unwrap();
        assert_eq!(generator.next_id().unwrap().into_raw(), 4_194_304);
        assert_eq!(generator.next_id().unwrap().into_raw(), 8_388_608);
    }

    #[test]
    fn packs_datacenter_and_worker_fields() {
        let clock = FixedClock { millis: TWEPOCH };
        let generator = IdGenerator::new(5, 3, clock).unwrap();
        assert_eq!(generator.next_id().unwrap().into_raw(), (3 << 17) | (5 << 12));
    }

    #[test]
    fn decoded_fields_match_the_issuing_wall_clock() {
        let generator = IdGenerator::new(9, 4, SystemClock).unwrap();
        let before = SystemClock.now_millis();
        let id = generator.next_id().unwrap();
        let after = SystemClock.now_millis();

        assert!(id.unix_millis() >= before - 1 && id.unix_millis() <= after + 1);
        assert_eq!(id.datacenter_id(), 4);
        assert_eq!(id.worker_id(), 9);
        assert!(id.sequence() < (1 << SEQUENCE_BITS));
        assert!(id.into_raw() > 0);
    }

    #[test]
    fn raw_ids_are_strictly_increasing_per_generator() {
        let clock = StepClock::new(vec![
            TWEPOCH + 10,
            TWEPOCH + 10,
            TWEPOCH + 10,
            TWEPOCH + 11,
            TWEPOCH + 14,
        ]);
        let generator = IdGenerator::new(1, 1, clock).unwrap();
        let mut previous = None;
        for _ in 0..5 {
            let id = generator.next_id().unwrap();
            if let Some(previous) = previous {
                assert!(
                    (id.timestamp(), id.sequence()) > previous,
                    "expected {:?} > {previous:?}",
                    (id.timestamp(), id.sequence())
                );
            }
            previous = Some((id.timestamp(), id.sequence()));
        }
    }

    #[test]
    fn regression_is_rejected_without_mutating_state() {
        let clock = StepClock::new(vec![TWEPOCH + 5, TWEPOCH + 2, TWEPOCH + 5]);
        let generator = IdGenerator::new(0, 0, clock).unwrap();

        let first = generator.next_id().unwrap();
        assert_eq!((first.timestamp(), first.sequence()), (5, 0));

        assert_eq!(
            generator.next_id().unwrap_err(),
            Error::ClockRegressed { behind_ms: 3 }
        );

        // State survived the failed call: same millisecond, next sequence.
        let third = generator.next_id().unwrap();
        assert_eq!((third.timestamp(), third.sequence()), (5, 1));
    }

    #[test]
    fn sequence_wrap_spins_to_the_next_millisecond() {
        let calls = (SEQUENCE_MASK + 1) as usize;
        // One clock read per call, then the wrap's spin sees the next tick.
        let mut millis = vec![TWEPOCH + 1; calls + 1];
        millis.push(TWEPOCH + 2);
        let generator = IdGenerator::new(0, 0, StepClock::new(millis)).unwrap();

        let mut seen = HashSet::new();
        for call in 0..calls {
            let id = generator.next_id().unwrap();
            assert_eq!((id.timestamp(), id.sequence()), (1, call as i64));
            assert!(seen.insert(id.into_raw()));
        }

        let wrapped = generator.next_id().unwrap();
        assert_eq!((wrapped.timestamp(), wrapped.sequence()), (2, 0));
        assert!(seen.insert(wrapped.into_raw()));
        assert_eq!(seen.len(), calls + 1);
    }

    #[test]
    fn no_duplicates_under_contention() {
        let generator = Arc::new(IdGenerator::new(2, 1, SystemClock).unwrap());
        let per_thread = 2_048;
        let threads = 8;

        let mut all = HashSet::with_capacity(threads * per_thread);
        thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let generator = Arc::clone(&generator);
                    scope.spawn(move || {
                        (0..per_thread)
                            .map(|_| generator.next_id().unwrap().into_raw())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            for handle in handles {
                all.extend(handle.join().unwrap());
            }
        });

        assert_eq!(all.len(), threads * per_thread);
    }
}
