//! Record addresses for the log-structured storage engine.
//!
//! A record address locates a record in the append-only log as a
//! `(segment, offset)` pair packed into one `u64`:
//!
//! ```text
//! | 32 bits: segment number | 32 bits: offset within segment |
//! ```
//!
//! Two bit patterns are reserved:
//! - segment `0xFFFF_FFFF` marks a *transient* address (not yet durable);
//! - `0xFFFF_FFFF_FFFF_FFFF` is the *null* address (unknown).
//!
//! Addresses must be ordered by comparing the unpacked fields, never the
//! raw packed value.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::error::{InternalSnafu, Result};

/// Segment number reserved for transient addresses.
pub const TRANSIENT_SEGMENT: u32 = u32::MAX;

const OFFSET_MASK: u64 = 0xFFFF_FFFF;
const SEGMENT_SHIFT: u32 = 32;

/// Packed `(segment, offset)` locator of a record in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordAddress(u64);

impl RecordAddress {
    /// The null address.
    pub const NULL: Self = Self(u64::MAX);

    /// Packs `segment` into the high 32 bits and `offset` into the low 32 bits.
    ///
    /// No range validation is performed; `encode(TRANSIENT_SEGMENT, u32::MAX)`
    /// yields [`RecordAddress::NULL`].
    #[inline]
    pub const fn encode(segment: u32, offset: u32) -> Self {
        Self(((segment as u64) << SEGMENT_SHIFT) | offset as u64)
    }

    /// Creates a transient address at `offset`.
    #[inline]
    pub const fn transient(offset: u32) -> Self {
        Self::encode(TRANSIENT_SEGMENT, offset)
    }

    /// Wraps a raw packed value read from the storage engine.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw packed value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the segment number.
    #[inline]
    pub const fn segment(self) -> u32 {
        (self.0 >> SEGMENT_SHIFT) as u32
    }

    /// Returns the offset within the segment.
    #[inline]
    pub const fn offset(self) -> u32 {
        (self.0 & OFFSET_MASK) as u32
    }

    /// Returns `true` for the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == Self::NULL.0
    }

    /// Returns `true` if the segment is the reserved transient segment.
    ///
    /// The null address has an all-ones segment and is therefore transient too.
    #[inline]
    pub const fn is_transient(self) -> bool {
        self.segment() == TRANSIENT_SEGMENT
    }

    /// Returns `true` for the null address or any transient address.
    #[inline]
    pub const fn is_null_or_transient(self) -> bool {
        self.is_null() || self.is_transient()
    }

    /// Orders two addresses by segment, then offset, both unsigned.
    ///
    /// # Errors
    ///
    /// Returns an internal-invariant error naming both operands if either is
    /// the null address.
    pub fn compare(a: Self, b: Self) -> Result<Ordering> {
        ensure!(
            !a.is_null() && !b.is_null(),
            InternalSnafu { message: format!("cannot compare null record address: {a} vs {b}") }
        );
        Ok(a.segment().cmp(&b.segment()).then_with(|| a.offset().cmp(&b.offset())))
    }

    /// Estimates the number of log bytes between two addresses.
    ///
    /// Within one segment this is the absolute offset difference. Across
    /// segments it is the segment distance times `segment_size`, plus the
    /// later address's offset, minus the earlier address's offset. Without
    /// `survivors`, segment distance is the difference of raw segment numbers.
    /// With `survivors`, it is the difference of each segment's rank in the
    /// surviving-segment order, so compacted segments are not counted.
    ///
    /// A null `b` is measured from the start of the log.
    ///
    /// # Errors
    ///
    /// Returns an internal-invariant error if `a` is the null address.
    pub fn distance(
        a: Self,
        b: Self,
        segment_size: u64,
        survivors: Option<&SegmentOrder>,
    ) -> Result<u64> {
        ensure!(
            !a.is_null(),
            InternalSnafu { message: format!("cannot measure distance from null address to {b}") }
        );
        let b = if b.is_null() { Self::encode(0, 0) } else { b };

        let (rank_a, rank_b) = match survivors {
            Some(order) => (order.rank(a.segment()) as u64, order.rank(b.segment()) as u64),
            None => (u64::from(a.segment()), u64::from(b.segment())),
        };

        if a.segment() == b.segment() {
            return Ok(u64::from(a.offset().abs_diff(b.offset())));
        }

        let (later, earlier, span) = match rank_a.cmp(&rank_b) {
            Ordering::Greater => (a, b, rank_a - rank_b),
            Ordering::Less => (b, a, rank_b - rank_a),
            // Both segments are absent from the survivor order at the same
            // insertion point; treat them as adjacent.
            Ordering::Equal if a.segment() > b.segment() => (a, b, 1),
            Ordering::Equal => (b, a, 1),
        };

        Ok(span
            .saturating_mul(segment_size)
            .saturating_add(u64::from(later.offset()))
            .saturating_sub(u64::from(earlier.offset())))
    }
}

impl fmt::Display for RecordAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("NULL")
        } else if self.is_transient() {
            write!(f, "TRANSIENT/0x{:x}", self.offset())
        } else {
            write!(f, "0x{:x}/0x{:x}", self.segment(), self.offset())
        }
    }
}

/// Total order over the log segments that survived compaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentOrder {
    segments: Vec<u32>,
}

impl SegmentOrder {
    /// Builds the order from surviving segment numbers in any order.
    pub fn from_segments(segments: impl IntoIterator<Item = u32>) -> Self {
        let mut segments: Vec<u32> = segments.into_iter().collect();
        segments.sort_unstable();
        segments.dedup();
        Self { segments }
    }

    /// Returns the rank of `segment` among the survivors.
    ///
    /// A segment that is not a survivor gets the rank it would have if
    /// inserted, which keeps estimates monotonic but is only approximate.
    pub fn rank(&self, segment: u32) -> usize {
        match self.segments.binary_search(&segment) {
            Ok(idx) | Err(idx) => idx,
        }
    }

    /// Returns `true` if `segment` survived.
    pub fn contains(&self, segment: u32) -> bool {
        self.segments.binary_search(&segment).is_ok()
    }

    /// Number of surviving segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns `true` if no segment survived.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::error::ErrorCode;

    #[test]
    fn test_encode_places_segment_high() {
        let addr = RecordAddress::encode(1, 2);
        assert_eq!(addr.raw(), 0x0000_0001_0000_0002);
        assert_eq!(addr.segment(), 1);
        assert_eq!(addr.offset(), 2);
    }

    #[test]
    fn test_transient_and_null_sentinels() {
        let transient = RecordAddress::transient(10);
        assert!(transient.is_transient());
        assert!(transient.is_null_or_transient());
        assert!(!transient.is_null());

        assert!(RecordAddress::NULL.is_null());
        assert!(RecordAddress::NULL.is_null_or_transient());
        assert_eq!(RecordAddress::encode(TRANSIENT_SEGMENT, u32::MAX), RecordAddress::NULL);

        let durable = RecordAddress::encode(5, 10);
        assert!(!durable.is_transient());
        assert!(!durable.is_null_or_transient());
    }

    #[test]
    fn test_compare_orders_by_segment_then_offset() {
        let cmp = |a, b| RecordAddress::compare(a, b).expect("non-null");
        assert_eq!(cmp(RecordAddress::encode(1, 100), RecordAddress::encode(1, 200)), Ordering::Less);
        assert_eq!(
            cmp(RecordAddress::encode(2, 0), RecordAddress::encode(1, 999_999)),
            Ordering::Greater
        );
        assert_eq!(cmp(RecordAddress::encode(4, 4), RecordAddress::encode(4, 4)), Ordering::Equal);
    }

    #[test]
    fn test_compare_is_unsigned_in_high_segments() {
        // The raw value of segment 0x8000_0000 is negative as an i64.
        let high = RecordAddress::encode(0x8000_0000, 0);
        let low = RecordAddress::encode(1, 0);
        assert_eq!(RecordAddress::compare(high, low).unwrap(), Ordering::Greater);

        let big_offset = RecordAddress::encode(1, 0x8000_0000);
        assert_eq!(RecordAddress::compare(big_offset, low).unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_compare_null_is_internal_error() {
        let addr = RecordAddress::encode(1, 1);
        for (a, b) in [(RecordAddress::NULL, addr), (addr, RecordAddress::NULL)] {
            let err = RecordAddress::compare(a, b).unwrap_err();
            assert_eq!(err.code(), ErrorCode::Internal);
            assert!(err.to_string().contains("NULL"), "diagnostic should name values: {err}");
            assert!(err.to_string().contains("0x1/0x1"), "diagnostic should name values: {err}");
        }
    }

    #[test]
    fn test_distance_same_segment() {
        let a = RecordAddress::encode(3, 500);
        let b = RecordAddress::encode(3, 200);
        assert_eq!(RecordAddress::distance(a, b, 1000, None).unwrap(), 300);
        assert_eq!(RecordAddress::distance(b, a, 1000, None).unwrap(), 300);
    }

    #[test]
    fn test_distance_across_segments() {
        let later = RecordAddress::encode(5, 100);
        let earlier = RecordAddress::encode(3, 900);
        // 2 segments * 1000 + 100 - 900
        assert_eq!(RecordAddress::distance(later, earlier, 1000, None).unwrap(), 1200);
        assert_eq!(RecordAddress::distance(earlier, later, 1000, None).unwrap(), 1200);
    }

    #[test]
    fn test_distance_uses_survivor_rank() {
        // Segment 4 was compacted away: 3 and 5 are adjacent survivors.
        let order = SegmentOrder::from_segments([5, 3, 7]);
        let later = RecordAddress::encode(5, 100);
        let earlier = RecordAddress::encode(3, 900);
        assert_eq!(RecordAddress::distance(later, earlier, 1000, Some(&order)).unwrap(), 200);
    }

    #[test]
    fn test_distance_null_operands() {
        let addr = RecordAddress::encode(2, 10);
        assert_eq!(RecordAddress::distance(addr, RecordAddress::NULL, 100, None).unwrap(), 210);
        let err = RecordAddress::distance(RecordAddress::NULL, addr, 100, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
    }

    #[test]
    fn test_segment_order_rank_and_membership() {
        let order = SegmentOrder::from_segments([9, 2, 2, 5]);
        assert_eq!(order.len(), 3);
        assert_eq!(order.rank(2), 0);
        assert_eq!(order.rank(5), 1);
        assert_eq!(order.rank(9), 2);
        assert_eq!(order.rank(6), 2);
        assert!(order.contains(5));
        assert!(!order.contains(6));
        assert!(SegmentOrder::default().is_empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(RecordAddress::encode(0x1a, 0x2b).to_string(), "0x1a/0x2b");
        assert_eq!(RecordAddress::transient(0x10).to_string(), "TRANSIENT/0x10");
        assert_eq!(RecordAddress::NULL.to_string(), "NULL");
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(segment in any::<u32>(), offset in any::<u32>()) {
            let addr = RecordAddress::encode(segment, offset);
            prop_assert_eq!(addr.segment(), segment);
            prop_assert_eq!(addr.offset(), offset);
        }

        #[test]
        fn prop_compare_matches_tuple_order(
            a in (0u32..TRANSIENT_SEGMENT, any::<u32>()),
            b in (0u32..TRANSIENT_SEGMENT, any::<u32>()),
        ) {
            let ord = RecordAddress::compare(
                RecordAddress::encode(a.0, a.1),
                RecordAddress::encode(b.0, b.1),
            ).unwrap();
            prop_assert_eq!(ord, a.cmp(&b));
        }

        #[test]
        fn prop_distance_is_symmetric(
            a in (0u32..1000, 0u32..4096),
            b in (0u32..1000, 0u32..4096),
        ) {
            let x = RecordAddress::encode(a.0, a.1);
            let y = RecordAddress::encode(b.0, b.1);
            prop_assert_eq!(
                RecordAddress::distance(x, y, 4096, None).unwrap(),
                RecordAddress::distance(y, x, 4096, None).unwrap()
            );
        }
    }
}
