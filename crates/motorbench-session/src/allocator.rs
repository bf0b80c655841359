//! [`SlotAllocator`] – bounded hand-out of device ids to sessions.
//!
//! Tracks which ids are claimed by an active session and computes the next
//! free id at or above a requested starting point. The id range is small
//! (≤ 64 by default), so a linear scan is deterministic and plenty fast; no
//! free-list needed.
//!
//! The allocator itself carries no locking. `next_available` followed by
//! `claim` is a check-then-act sequence, so the owner (the bench context)
//! serialises access behind one mutex.

use std::collections::HashSet;

use motorbench_types::{DeviceId, DeviceIdRange};

/// Tracks in-use device ids within a configured range.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    range: DeviceIdRange,
    in_use: HashSet<DeviceId>,
}

impl SlotAllocator {
    pub fn new(range: DeviceIdRange) -> Self {
        Self {
            range,
            in_use: HashSet::new(),
        }
    }

    pub fn range(&self) -> DeviceIdRange {
        self.range
    }

    /// First id not currently in use, scanning upward from
    /// `max(start_hint, range.min)` to `range.max` inclusive.
    ///
    /// `None` when every id in that window is taken or the hint already
    /// exceeds the range.
    pub fn next_available(&self, start_hint: DeviceId) -> Option<DeviceId> {
        self.range
            .iter_from(start_hint)
            .find(|id| !self.in_use.contains(id))
    }

    /// Mark `id` in use. The caller must have confirmed the id is free (via
    /// [`next_available`] under the same lock); claiming is not re-checked
    /// here.
    ///
    /// [`next_available`]: SlotAllocator::next_available
    pub fn claim(&mut self, id: DeviceId) {
        self.in_use.insert(id);
    }

    /// Mark `id` free again. A no-op when the id was not claimed.
    pub fn release(&mut self, id: DeviceId) {
        self.in_use.remove(&id);
    }

    /// Number of ids currently claimed.
    pub fn active_count(&self) -> usize {
        self.in_use.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    fn allocator() -> SlotAllocator {
        SlotAllocator::new(DeviceIdRange::default())
    }

    #[test]
    fn empty_allocator_returns_the_hint() {
        let alloc = allocator();
        assert_eq!(alloc.next_available(id(1)), Some(id(1)));
        assert_eq!(alloc.next_available(id(37)), Some(id(37)));
    }

    #[test]
    fn scan_skips_claimed_ids() {
        let mut alloc = allocator();
        alloc.claim(id(1));
        alloc.claim(id(2));
        alloc.claim(id(4));
        assert_eq!(alloc.next_available(id(1)), Some(id(3)));
        assert_eq!(alloc.next_available(id(4)), Some(id(5)));
    }

    #[test]
    fn exhausted_window_returns_none() {
        let range = DeviceIdRange::new(id(1), id(3)).unwrap();
        let mut alloc = SlotAllocator::new(range);
        alloc.claim(id(1));
        alloc.claim(id(2));
        alloc.claim(id(3));
        assert_eq!(alloc.next_available(id(1)), None);
    }

    #[test]
    fn hint_above_range_maximum_returns_none() {
        let range = DeviceIdRange::new(id(1), id(8)).unwrap();
        let alloc = SlotAllocator::new(range);
        assert_eq!(alloc.next_available(id(9)), None);
    }

    #[test]
    fn hint_below_range_minimum_is_clamped_up() {
        let range = DeviceIdRange::new(id(10), id(20)).unwrap();
        let alloc = SlotAllocator::new(range);
        assert_eq!(alloc.next_available(id(1)), Some(id(10)));
    }

    #[test]
    fn claim_then_release_restores_prior_state() {
        let mut alloc = allocator();
        alloc.claim(id(5));
        let before = alloc.clone();

        alloc.claim(id(6));
        alloc.release(id(6));

        assert_eq!(alloc.active_count(), before.active_count());
        assert_eq!(alloc.next_available(id(5)), before.next_available(id(5)));
    }

    #[test]
    fn releasing_an_unclaimed_id_is_a_no_op() {
        let mut alloc = allocator();
        alloc.claim(id(2));
        alloc.release(id(7));
        assert_eq!(alloc.active_count(), 1);
        assert_eq!(alloc.next_available(id(1)), Some(id(1)));
    }

    #[test]
    fn repeated_same_hint_walks_the_free_ids_upward() {
        let mut alloc = allocator();
        for expected in 1u8..=4 {
            let got = alloc.next_available(id(1)).unwrap();
            assert_eq!(got, id(expected));
            alloc.claim(got);
        }
    }
}
