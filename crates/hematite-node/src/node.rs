//! The node: inbound dispatch, tick duties, and the failed flag.

use std::collections::VecDeque;

use bytes::Bytes;
use hematite_membership::MembershipState;
use hematite_ring::RingView;
use hematite_store::KvStore;
use hematite_types::{Address, Tick, TransId};
use hematite_wire::{Message, Payload};

use crate::transaction::TransactionTable;
use crate::{NodeOutput, Outbound};

/// One participant: membership state, ring view, local store, and the
/// coordinator's transaction table, advanced by the driver's tick.
#[derive(Debug)]
pub struct Node {
    addr: Address,

    /// Set by the driver to simulate a crash: all send/receive and all
    /// periodic work stop until the driver revives the node. State is
    /// retained across the outage.
    failed: bool,

    membership: MembershipState,
    ring: RingView,
    pub(crate) store: KvStore,
    pub(crate) transactions: TransactionTable,

    /// Raw frames delivered by the network, drained each tick.
    inbox: VecDeque<Bytes>,
}

impl Node {
    pub fn new(addr: Address) -> Self {
        Self {
            addr,
            failed: false,
            membership: MembershipState::new(addr),
            ring: RingView::empty(),
            store: KvStore::new(),
            transactions: TransactionTable::new(),
            inbox: VecDeque::new(),
        }
    }

    pub fn addr(&self) -> Address {
        self.addr
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn is_in_group(&self) -> bool {
        self.membership.is_in_group()
    }

    pub fn membership(&self) -> &MembershipState {
        &self.membership
    }

    pub fn ring(&self) -> &RingView {
        &self.ring
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn open_transactions(&self) -> usize {
        self.transactions.len()
    }

    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    // ========================================================================
    // Lifecycle (driver-facing)
    // ========================================================================

    /// Bootstraps the node: the introducer is in-group at once, everyone
    /// else emits its join request.
    pub fn start(&mut self) -> NodeOutput {
        NodeOutput::from_membership(self.addr, self.membership.start())
    }

    /// Simulates a crash.
    pub fn fail(&mut self) {
        tracing::info!(node = %self.addr, "node failed");
        self.failed = true;
    }

    /// Clears the failed flag; the node resumes duties on its next tick.
    pub fn revive(&mut self) {
        tracing::info!(node = %self.addr, "node revived");
        self.failed = false;
    }

    /// Accepts a raw frame from the network. Failed nodes receive nothing.
    pub fn enqueue(&mut self, frame: Bytes) {
        if self.failed {
            return;
        }
        self.inbox.push_back(frame);
    }

    // ========================================================================
    // Tick Loop
    // ========================================================================

    /// Advances the node by one tick:
    /// 1. drain and dispatch the inbound queue
    /// 2. membership periodic duties (in-group only)
    /// 3. rebuild the ring; stabilize if it changed
    /// 4. resolve open transactions
    pub fn tick(&mut self, now: Tick) -> NodeOutput {
        if self.failed {
            return NodeOutput::empty();
        }

        let mut output = NodeOutput::empty();

        while let Some(frame) = self.inbox.pop_front() {
            match hematite_wire::decode(&frame) {
                Ok(message) => output.merge(self.dispatch(message, now)),
                Err(error) => {
                    tracing::warn!(node = %self.addr, %error, "dropping malformed frame");
                }
            }
        }

        if self.membership.is_in_group() {
            output.merge(NodeOutput::from_membership(
                self.addr,
                self.membership.periodic(now),
            ));
        }

        output.merge(self.refresh_ring());
        output.merge(self.resolve_transactions(now));

        output
    }

    /// Routes one decoded message to its protocol handler.
    fn dispatch(&mut self, message: Message, now: Tick) -> NodeOutput {
        let from = message.from;
        match message.payload {
            Payload::JoinReq { members } => NodeOutput::from_membership(
                self.addr,
                self.membership.on_join_req(from, &members, now),
            ),
            Payload::JoinRep { members } => NodeOutput::from_membership(
                self.addr,
                self.membership.on_join_rep(from, &members, now),
            ),
            Payload::Ping { members } => {
                NodeOutput::from_membership(self.addr, self.membership.on_ping(from, &members, now))
            }
            Payload::Create {
                trans_id,
                key,
                value,
            } => self.on_create(from, trans_id, &key, &value),
            Payload::Read { trans_id, key } => self.on_read(from, trans_id, &key),
            Payload::Update {
                trans_id,
                key,
                value,
            } => self.on_update(from, trans_id, &key, &value),
            Payload::Delete { trans_id, key } => self.on_delete(from, trans_id, &key),
            Payload::Reply { trans_id, success } => self.on_reply(trans_id, success),
            Payload::ReadReply { trans_id, value } => self.on_read_reply(trans_id, value),
        }
    }

    // ========================================================================
    // Ring Maintenance & Stabilization
    // ========================================================================

    /// Installs the ring for the current membership view. The fresh view is
    /// installed even when unchanged so replica lookup always sees it;
    /// stabilization runs only on an actual change.
    fn refresh_ring(&mut self) -> NodeOutput {
        let candidate = RingView::build(self.addr, self.membership.members().addrs());
        let changed = candidate.differs_from(&self.ring);
        self.ring = candidate;
        if changed {
            tracing::debug!(node = %self.addr, entries = self.ring.len(), "ring changed");
            self.stabilize()
        } else {
            NodeOutput::empty()
        }
    }

    /// Re-replicates every locally-held key under the new ring. Writes
    /// carry the stable sentinel: receivers create-if-absent, never reply,
    /// never log. Misplaced copies are not deleted; they age out through
    /// later stabilizations.
    fn stabilize(&self) -> NodeOutput {
        let mut output = NodeOutput::empty();
        // Key order, so re-replication traffic is identical run to run.
        let mut pairs: Vec<(&str, &str)> = self.store.iter().collect();
        pairs.sort_unstable();
        for (key, value) in pairs {
            let Some(replicas) = self.ring.replicas_for_key(key) else {
                continue;
            };
            for to in replicas {
                output.outbound.push(Outbound {
                    to,
                    message: Message::new(
                        self.addr,
                        Payload::Create {
                            trans_id: TransId::STABLE,
                            key: key.to_string(),
                            value: value.to_string(),
                        },
                    ),
                });
            }
        }
        if !output.outbound.is_empty() {
            tracing::debug!(
                node = %self.addr,
                frames = output.outbound.len(),
                "stabilizing after ring change"
            );
        }
        output
    }
}
