use core::fmt;

/// Epoch offset in milliseconds since the Unix epoch (2010-11-04T01:42:54Z).
///
/// Timestamps are stored relative to this origin so that 41 bits cover
/// roughly 69 years of service life.
pub const TWEPOCH: i64 = 1_288_834_974_657;

pub const TIMESTAMP_BITS: u32 = 41;
pub const DATACENTER_ID_BITS: u32 = 5;
pub const WORKER_ID_BITS: u32 = 5;
pub const SEQUENCE_BITS: u32 = 12;

/// Largest worker id a single datacenter can hold (31).
pub const MAX_WORKER_ID: i64 = (1 << WORKER_ID_BITS) - 1;
/// Largest datacenter id a cluster can be configured with (31).
pub const MAX_DATACENTER_ID: i64 = (1 << DATACENTER_ID_BITS) - 1;
/// Mask for the per-millisecond sequence (0xFFF).
pub const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;

pub const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
pub const DATACENTER_ID_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
pub const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

/// A bit-packed 64-bit id.
///
/// From most to least significant: one zero sign bit, 41 timestamp bits
/// (milliseconds since [`TWEPOCH`]), 5 datacenter bits, 5 worker bits and a
/// 12-bit sequence. Ids issued by one generator sort by issue order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnowflakeId(i64);

impl SnowflakeId {
    /// Wraps a raw id, e.g. one received over the wire.
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// The raw signed 64-bit representation.
    pub const fn into_raw(self) -> i64 {
        self.0
    }

    /// Packs the components. `timestamp` is milliseconds since [`TWEPOCH`];
    /// every component must already be within its field's range.
    pub const fn from_components(
        timestamp: i64,
        datacenter_id: i64,
        worker_id: i64,
        sequence: i64,
    ) -> Self {
        Self(
            (timestamp << TIMESTAMP_SHIFT)
                | (datacenter_id << DATACENTER_ID_SHIFT)
                | (worker_id << WORKER_ID_SHIFT)
                | sequence,
        )
    }

    /// Milliseconds since [`TWEPOCH`] at which this id was issued.
    pub const fn timestamp(self) -> i64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    /// Issue time in milliseconds since the Unix epoch.
    pub const fn unix_millis(self) -> i64 {
        self.timestamp() + TWEPOCH
    }

    pub const fn datacenter_id(self) -> i64 {
        (self.0 >> DATACENTER_ID_SHIFT) & MAX_DATACENTER_ID
    }

    pub const fn worker_id(self) -> i64 {
        (self.0 >> WORKER_ID_SHIFT) & MAX_WORKER_ID
    }

    pub const fn sequence(self) -> i64 {
        self.0 & SEQUENCE_MASK
    }
}

impl fmt::Display for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for SnowflakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnowflakeId")
            .field("timestamp", &self.timestamp())
            .field("datacenter_id", &self.datacenter_id())
            .field("worker_id", &self.worker_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}

impl From<SnowflakeId> for i64 {
    fn from(id: SnowflakeId) -> Self {
        id.into_raw()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_round_trip() {
        let id = SnowflakeId::from_components(1, 3, 5, 7);
        assert_eq!(id.timestamp(), 1);
        assert_eq!(id.datacenter_id(), 3);
        assert_eq!(id.worker_id(), 5);
        assert_eq!(id.sequence(), 7);
        assert_eq!(id.unix_millis(), TWEPOCH + 1);
    }

    #[test]
    fn shifts_match_the_wire_layout() {
        assert_eq!(TIMESTAMP_SHIFT, 22);
        assert_eq!(DATACENTER_ID_SHIFT, 17);
        assert_eq!(WORKER_ID_SHIFT, 12);
        assert_eq!(SEQUENCE_MASK, 0xFFF);

        let id = SnowflakeId::from_components(1, 0, 0, 0);
        assert_eq!(id.into_raw(), 1 << 22);
        let id = SnowflakeId::from_components(0, 3, 5, 0);
        assert_eq!(id.into_raw(), (3 << 17) | (5 << 12));
    }

    #[test]
    fn ids_sort_by_issue_order() {
        let earlier = SnowflakeId::from_components(41, 0, 0, 4095);
        let later = SnowflakeId::from_components(42, 0, 0, 0);
        assert!(earlier < later);
        let same_ms = SnowflakeId::from_components(42, 0, 0, 1);
        assert!(later < same_ms);
    }
}
