//! Membership protocol handlers.
//!
//! The handlers mirror the three wire messages plus the periodic sweep:
//! - `on_join_req`: record the joiner, answer with our view
//! - `on_join_rep`: we're in-group; absorb the introducer's view
//! - `on_ping`: credit the sender, merge its gossiped list
//! - `periodic`: heartbeat, eviction sweep, ping fan-out

use hematite_types::{Address, LogEvent, MemberEntry, Tick, T_FAIL, T_REMOVE};
use hematite_wire::Payload;

use crate::list::MemberList;

// ============================================================================
// Membership Output
// ============================================================================

/// Output produced by a membership handler.
///
/// The caller (the node's tick loop) sends the messages and forwards the
/// events to the log sink.
#[derive(Debug, Default)]
pub struct MembershipOutput {
    /// `(destination, payload)` pairs to hand to the network.
    pub messages: Vec<(Address, Payload)>,

    /// NodeAdd / NodeRemove events for the checker.
    pub events: Vec<LogEvent>,
}

impl MembershipOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.events.is_empty()
    }

    /// Merges another output into this one, preserving order.
    pub fn merge(&mut self, other: MembershipOutput) {
        self.messages.extend(other.messages);
        self.events.extend(other.events);
    }
}

// ============================================================================
// Membership State
// ============================================================================

/// The membership half of a node, as a pure state machine.
#[derive(Debug, Clone)]
pub struct MembershipState {
    members: MemberList,

    /// Own liveness counter, bumped exactly once per in-group tick and
    /// gossiped in every outbound ping.
    heartbeat: u64,

    /// Set once the join handshake completes (immediately for the
    /// introducer).
    in_group: bool,

    /// Advisory ping countdown seeded from [`T_FAIL`]. Eviction is driven
    /// by [`T_REMOVE`]; this field only preserves the failure window the
    /// detector was tuned for.
    #[allow(dead_code)]
    ping_counter: u64,
}

impl MembershipState {
    pub fn new(self_addr: Address) -> Self {
        Self {
            members: MemberList::new(self_addr),
            heartbeat: 0,
            in_group: false,
            ping_counter: T_FAIL,
        }
    }

    pub fn self_addr(&self) -> Address {
        self.members.self_addr()
    }

    pub fn heartbeat(&self) -> u64 {
        self.heartbeat
    }

    pub fn is_in_group(&self) -> bool {
        self.in_group
    }

    pub fn members(&self) -> &MemberList {
        &self.members
    }

    // ========================================================================
    // Join Handshake
    // ========================================================================

    /// Bootstraps the node. The introducer considers itself in-group at
    /// once; everyone else sends a single `JoinReq` to the introducer.
    pub fn start(&mut self) -> MembershipOutput {
        let mut output = MembershipOutput::empty();
        if self.self_addr().is_introducer() {
            tracing::info!(node = %self.self_addr(), "starting up group");
            self.in_group = true;
        } else {
            tracing::debug!(node = %self.self_addr(), "requesting to join");
            output.messages.push((
                Address::INTRODUCER,
                Payload::JoinReq {
                    members: self.members.snapshot(),
                },
            ));
        }
        output
    }

    /// Handles a join request: remember the joiner, answer with our view.
    ///
    /// The request's member list is typically empty and is not merged; the
    /// joiner learns the group from our `JoinRep` and subsequent pings.
    pub fn on_join_req(
        &mut self,
        from: Address,
        _members: &[MemberEntry],
        now: Tick,
    ) -> MembershipOutput {
        let mut output = MembershipOutput::empty();
        self.admit(from, now, &mut output);
        output.messages.push((
            from,
            Payload::JoinRep {
                members: self.members.snapshot(),
            },
        ));
        output
    }

    /// Handles the introducer's answer: we are now in-group.
    pub fn on_join_rep(
        &mut self,
        from: Address,
        members: &[MemberEntry],
        now: Tick,
    ) -> MembershipOutput {
        let mut output = MembershipOutput::empty();
        if !self.in_group {
            tracing::info!(node = %self.self_addr(), introducer = %from, "joined group");
        }
        self.in_group = true;
        self.admit(from, now, &mut output);
        for entry in members {
            self.merge_entry(*entry, now, &mut output);
        }
        output
    }

    // ========================================================================
    // Gossip
    // ========================================================================

    /// Handles a heartbeat ping: credit the sender, then merge its list.
    pub fn on_ping(
        &mut self,
        from: Address,
        members: &[MemberEntry],
        now: Tick,
    ) -> MembershipOutput {
        let mut output = MembershipOutput::empty();
        self.credit_sender(from, now, &mut output);
        for entry in members {
            self.merge_entry(*entry, now, &mut output);
        }
        output
    }

    /// Periodic in-group duties, in order: advance own heartbeat, evict
    /// silent members, ping everyone left.
    pub fn periodic(&mut self, now: Tick) -> MembershipOutput {
        let mut output = MembershipOutput::empty();

        self.heartbeat += 1;

        for addr in self.members.evict_expired(now) {
            tracing::info!(node = %self.self_addr(), member = %addr, "evicting silent member");
            output.events.push(LogEvent::NodeRemove {
                observer: self.self_addr(),
                member: addr,
            });
        }

        let gossip = self.members.snapshot();
        for addr in self.members.addrs() {
            output.messages.push((
                addr,
                Payload::Ping {
                    members: gossip.clone(),
                },
            ));
        }

        output
    }

    // ========================================================================
    // List Maintenance
    // ========================================================================

    /// Records a directly-observed peer (join traffic): fresh entry with
    /// heartbeat 1 if unknown, untouched otherwise.
    fn admit(&mut self, addr: Address, now: Tick, output: &mut MembershipOutput) {
        if addr == self.self_addr() || self.members.contains(addr) {
            return;
        }
        self.members.insert(MemberEntry::new(addr, 1, now));
        self.push_add_event(addr, output);
    }

    /// Credits the sender of a ping: its heartbeat advanced by definition
    /// of having sent the message.
    fn credit_sender(&mut self, from: Address, now: Tick, output: &mut MembershipOutput) {
        if let Some(entry) = self.members.find_mut(from) {
            entry.heartbeat += 1;
            entry.timestamp = now;
        } else {
            self.admit(from, now, output);
        }
    }

    /// Merges one gossiped entry.
    ///
    /// Known address: take the heartbeat maximum, refreshing the local
    /// timestamp only when the heartbeat actually advanced. Unknown
    /// address: insert the entry verbatim, but only while its own
    /// timestamp is still inside the removal window, and never for self.
    fn merge_entry(&mut self, entry: MemberEntry, now: Tick, output: &mut MembershipOutput) {
        let addr = entry.addr();
        if let Some(known) = self.members.find_mut(addr) {
            if entry.heartbeat > known.heartbeat {
                known.heartbeat = entry.heartbeat;
                known.timestamp = now;
            }
            return;
        }
        if addr == self.self_addr() || now.since(entry.timestamp) >= T_REMOVE {
            return;
        }
        self.members.insert(entry);
        self.push_add_event(addr, output);
    }

    fn push_add_event(&self, addr: Address, output: &mut MembershipOutput) {
        tracing::debug!(node = %self.self_addr(), member = %addr, "learned of member");
        output.events.push(LogEvent::NodeAdd {
            observer: self.self_addr(),
            member: addr,
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
