//! # hematite-ring: Consistent-hash ring view and replica placement
//!
//! Every node derives the same ring from the same membership view: hash
//! each live address (self included) into [`RING_SIZE`] slots, sort
//! ascending, and place each key on the first three entries clockwise from
//! the key's own slot.
//!
//! Positions come from BLAKE3 reduced mod [`RING_SIZE`]: stable across
//! nodes, runs, and platforms, which is the whole point — replica selection
//! must agree everywhere without coordination.

use hematite_types::{Address, RING_SIZE, REPLICA_COUNT};
use serde::{Deserialize, Serialize};

// ============================================================================
// Position Hashing
// ============================================================================

fn position_of(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let head: [u8; 8] = digest.as_bytes()[..8].try_into().expect("digest is 32 bytes");
    u64::from_le_bytes(head) % RING_SIZE
}

/// Ring slot of a key.
pub fn key_position(key: &str) -> u64 {
    position_of(key.as_bytes())
}

/// Ring slot of a node address (hashed over its 6-byte wire layout).
pub fn addr_position(addr: Address) -> u64 {
    position_of(&addr.to_bytes())
}

// ============================================================================
// Ring View
// ============================================================================

/// One node on the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingEntry {
    pub addr: Address,
    pub position: u64,
}

/// A sorted snapshot of the live membership, self included.
///
/// Invariant: entries are sorted ascending by position and deduplicated by
/// position (colliding addresses keep the smaller address, identically on
/// every node).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RingView {
    entries: Vec<RingEntry>,
}

impl RingView {
    /// The empty ring a node holds before its first replication tick.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the candidate ring for a membership snapshot.
    pub fn build(self_addr: Address, members: impl IntoIterator<Item = Address>) -> Self {
        let mut entries: Vec<RingEntry> = members
            .into_iter()
            .chain(std::iter::once(self_addr))
            .map(|addr| RingEntry {
                addr,
                position: addr_position(addr),
            })
            .collect();
        entries.sort_unstable_by_key(|e| (e.position, e.addr));
        entries.dedup_by_key(|e| e.position);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[RingEntry] {
        &self.entries
    }

    /// Ring-change detection: length first, then the ordered position
    /// sequence. Addresses are not compared; two rings that agree on every
    /// position place every key identically.
    pub fn differs_from(&self, other: &RingView) -> bool {
        self.entries.len() != other.entries.len()
            || self
                .entries
                .iter()
                .zip(other.entries.iter())
                .any(|(a, b)| a.position != b.position)
    }

    /// The three replicas for `key`, or `None` when the ring is too small
    /// to place a full replica set.
    pub fn replicas_for_key(&self, key: &str) -> Option<[Address; REPLICA_COUNT]> {
        self.replicas_at(key_position(key))
    }

    /// The three replicas for a ring slot: the first three entries whose
    /// position is `>= pos`, wrapping past the top of the ring.
    pub fn replicas_at(&self, pos: u64) -> Option<[Address; REPLICA_COUNT]> {
        if self.entries.len() < REPLICA_COUNT {
            return None;
        }
        let n = self.entries.len();
        let first = self
            .entries
            .iter()
            .position(|e| e.position >= pos)
            .unwrap_or(0);
        Some([
            self.entries[first].addr,
            self.entries[(first + 1) % n].addr,
            self.entries[(first + 2) % n].addr,
        ])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn ring(positions: &[u64]) -> RingView {
        RingView {
            entries: positions
                .iter()
                .enumerate()
                .map(|(i, &position)| RingEntry {
                    addr: Address::new(i as u32 + 1, 0),
                    position,
                })
                .collect(),
        }
    }

    #[test]
    fn test_key_position_is_stable_and_in_range() {
        let a = key_position("foo");
        let b = key_position("foo");
        assert_eq!(a, b);
        assert!(a < RING_SIZE);
    }

    #[test]
    fn test_build_sorts_by_position_and_includes_self() {
        let me = Address::new(5, 0);
        let view = RingView::build(me, vec![Address::new(2, 0), Address::new(9, 0)]);
        assert_eq!(view.len(), 3);
        assert!(view.entries().windows(2).all(|w| w[0].position <= w[1].position));
        assert!(view.entries().iter().any(|e| e.addr == me));
    }

    #[test]
    fn test_build_is_order_independent() {
        let me = Address::new(1, 0);
        let a = RingView::build(me, vec![Address::new(2, 0), Address::new(3, 0)]);
        let b = RingView::build(me, vec![Address::new(3, 0), Address::new(2, 0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_placement_mid_ring() {
        // Ring positions [100, 250, 400, 600, 900], key slot 260: the
        // replicas are the entries at 400, 600, 900.
        let view = ring(&[100, 250, 400, 600, 900]);
        let replicas = view.replicas_at(260).expect("ring is large enough");
        assert_eq!(
            replicas,
            [Address::new(3, 0), Address::new(4, 0), Address::new(5, 0)]
        );
    }

    #[test]
    fn test_placement_at_or_below_first_entry() {
        let view = ring(&[100, 250, 400, 600, 900]);
        for pos in [0, 50, 100] {
            let replicas = view.replicas_at(pos).expect("ring is large enough");
            assert_eq!(
                replicas,
                [Address::new(1, 0), Address::new(2, 0), Address::new(3, 0)]
            );
        }
    }

    #[test]
    fn test_placement_wraps_past_top() {
        let view = ring(&[100, 250, 400, 600, 900]);
        let replicas = view.replicas_at(901).expect("ring is large enough");
        assert_eq!(
            replicas,
            [Address::new(1, 0), Address::new(2, 0), Address::new(3, 0)]
        );
    }

    #[test]
    fn test_placement_wrap_straddles_the_seam() {
        let view = ring(&[100, 250, 400, 600, 900]);
        let replicas = view.replicas_at(700).expect("ring is large enough");
        assert_eq!(
            replicas,
            [Address::new(4, 0), Address::new(5, 0), Address::new(1, 0)]
        );
    }

    #[test]
    fn test_under_populated_ring_yields_no_replicas() {
        assert!(ring(&[]).replicas_at(0).is_none());
        assert!(ring(&[10]).replicas_at(0).is_none());
        assert!(ring(&[10, 20]).replicas_at(0).is_none());
        assert!(ring(&[10, 20, 30]).replicas_at(0).is_some());
    }

    #[test]
    fn test_exactly_three_entries_serve_every_slot() {
        let view = ring(&[10, 20, 30]);
        for pos in [0, 15, 25, 35] {
            let replicas = view.replicas_at(pos).expect("three entries");
            let mut sorted = replicas.to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn test_differs_from_detects_length_and_position_changes() {
        let a = ring(&[10, 20, 30]);
        assert!(!a.differs_from(&ring(&[10, 20, 30])));
        assert!(a.differs_from(&ring(&[10, 20])));
        assert!(a.differs_from(&ring(&[10, 20, 31])));
        assert!(RingView::empty().differs_from(&a));
        assert!(!RingView::empty().differs_from(&RingView::empty()));
    }

    proptest! {
        /// With at least three live members the replica set is distinct and
        /// forms a contiguous clockwise arc from the key's slot.
        #[test]
        fn prop_replicas_distinct_and_contiguous(
            ids in proptest::collection::btree_set(1u32..500, 3..20),
            pos in 0u64..RING_SIZE,
        ) {
            let mut addrs: Vec<Address> = ids.into_iter().map(|id| Address::new(id, 0)).collect();
            let me = addrs.pop().expect("at least three ids");
            let view = RingView::build(me, addrs);
            prop_assume!(view.len() >= REPLICA_COUNT);

            let replicas = view.replicas_at(pos).expect("ring is large enough");

            let mut unique = replicas.to_vec();
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), REPLICA_COUNT);

            // Contiguity: the replicas occupy consecutive ring indices
            // starting at the first entry clockwise from pos.
            let n = view.len();
            let first = view
                .entries()
                .iter()
                .position(|e| e.position >= pos)
                .unwrap_or(0);
            for (offset, addr) in replicas.iter().enumerate() {
                prop_assert_eq!(view.entries()[(first + offset) % n].addr, *addr);
            }
        }

        #[test]
        fn prop_positions_in_slot_space(key in "[ -~]{0,32}") {
            prop_assert!(key_position(&key) < RING_SIZE);
        }
    }
}
