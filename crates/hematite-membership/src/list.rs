//! The member list: one entry per known peer, never the node itself.

use hematite_types::{Address, MemberEntry, Tick, T_REMOVE};

/// A node's view of its peers.
///
/// Entries live in a contiguous vector (they are small `Copy` values) and
/// are keyed by `(id, port)`. Invariants, upheld by every mutation path:
/// at most one entry per address, and never an entry for `self_addr`.
#[derive(Debug, Clone)]
pub struct MemberList {
    self_addr: Address,
    entries: Vec<MemberEntry>,
}

impl MemberList {
    pub fn new(self_addr: Address) -> Self {
        Self {
            self_addr,
            entries: Vec::new(),
        }
    }

    /// The address this list belongs to.
    pub fn self_addr(&self) -> Address {
        self.self_addr
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.find(addr).is_some()
    }

    pub fn find(&self, addr: Address) -> Option<&MemberEntry> {
        self.entries.iter().find(|e| e.addr() == addr)
    }

    pub fn find_mut(&mut self, addr: Address) -> Option<&mut MemberEntry> {
        self.entries.iter_mut().find(|e| e.addr() == addr)
    }

    /// Inserts a new entry. Returns false without modifying the list when
    /// the address is already present or is the node itself.
    pub fn insert(&mut self, entry: MemberEntry) -> bool {
        let addr = entry.addr();
        if addr == self.self_addr || self.contains(addr) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Removes every entry whose heartbeat has been silent for
    /// [`T_REMOVE`] ticks or longer, returning the evicted addresses.
    pub fn evict_expired(&mut self, now: Tick) -> Vec<Address> {
        let mut evicted = Vec::new();
        self.entries.retain(|e| {
            if now.since(e.timestamp) >= T_REMOVE {
                evicted.push(e.addr());
                false
            } else {
                true
            }
        });
        evicted
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemberEntry> {
        self.entries.iter()
    }

    /// Addresses of every current member.
    pub fn addrs(&self) -> Vec<Address> {
        self.entries.iter().map(MemberEntry::addr).collect()
    }

    /// A copy of the list as carried in gossip payloads.
    pub fn snapshot(&self) -> Vec<MemberEntry> {
        self.entries.clone()
    }
}
