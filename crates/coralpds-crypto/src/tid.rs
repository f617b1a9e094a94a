use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use coralpds_core::{PdsError, PdsResult};
use rand::Rng;

/// Sortable base-32 alphabet for revision identifiers.
const SORT32: &[u8; 32] = b"234567abcdefghijklmnopqrstuvwxyz";

/// Characters in a TID.
pub const TID_LEN: usize = 13;

const CLOCK_ID_BITS: u32 = 10;

/// Issues 13-character sortable revision identifiers.
///
/// A TID packs the millisecond wall clock into the high bits and a
/// per-generator 10-bit clock id into the low bits. Two generators on the
/// same millisecond differ in the clock id; one generator never repeats or
/// goes backwards, even when the wall clock does.
pub struct TidGenerator {
    clock_id: u64,
    issued: AtomicU64,
}

impl TidGenerator {
    pub fn new() -> Self {
        TidGenerator {
            clock_id: rand::thread_rng().gen_range(0..1u64 << CLOCK_ID_BITS),
            issued: AtomicU64::new(0),
        }
    }

    /// Issue the next TID, strictly greater than every previous one from
    /// this generator.
    pub fn next_tid(&self) -> PdsResult<String> {
        let wall = SystemTime::now().duration_since(UNIX_EPOCH).map_err(|e| {
            PdsError::InternalError(format!("system clock is before the epoch: {e}"))
        })?;
        let stamp = (wall.as_millis() as u64) << CLOCK_ID_BITS | self.clock_id;

        // Claim max(stamp, previous + 1) in one atomic read-modify-write,
        // so a stalled or rewound clock still yields a larger value.
        let previous = self
            .issued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(stamp.max(prev + 1))
            });
        let claimed = match previous {
            Ok(prev) | Err(prev) => stamp.max(prev + 1),
        };
        Ok(encode_sortable(claimed))
    }
}

impl Default for TidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a value as 13 sortable base-32 characters, most significant
/// first. Thirteen characters cover 65 bits, so the leading character only
/// ever draws on the low half of the alphabet.
fn encode_sortable(value: u64) -> String {
    (0..TID_LEN)
        .map(|i| SORT32[(value >> (60 - 5 * i) & 0x1f) as usize] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tids_are_thirteen_sortkey_chars() {
        let tids = TidGenerator::new();
        let tid = tids.next_tid().unwrap();
        assert_eq!(tid.len(), TID_LEN);
        assert!(tid.bytes().all(|b| SORT32.contains(&b)), "bad alphabet: {tid}");
    }

    #[test]
    fn encoding_preserves_numeric_order() {
        assert_eq!(encode_sortable(0), "2222222222222");
        let samples = [0, 1, 31, 32, 1 << 20, (1 << 40) + 7, u64::MAX];
        for pair in samples.windows(2) {
            assert!(encode_sortable(pair[0]) < encode_sortable(pair[1]));
        }
    }

    #[test]
    fn a_burst_is_strictly_increasing_and_unique() {
        let tids = TidGenerator::new();
        let batch: Vec<String> = (0..1000).map(|_| tids.next_tid().unwrap()).collect();
        for pair in batch.windows(2) {
            assert!(pair[0] < pair[1], "{} does not sort before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn independent_generators_issue_valid_tids() {
        let a = TidGenerator::new().next_tid().unwrap();
        let b = TidGenerator::new().next_tid().unwrap();
        assert_eq!(a.len(), TID_LEN);
        assert_eq!(b.len(), TID_LEN);
    }
}
