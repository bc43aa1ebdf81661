//! # hematite-node: The per-node protocol engine
//!
//! A [`Node`] couples the two protocols over one tick-driven loop:
//!
//! ```text
//! network ──► inbound queue ──► dispatch ──┬─► membership handlers
//!                                          └─► replication handlers
//!                                                    │
//!            outbound messages ◄── tick duties ◄─────┘
//!            (gossip, quorum CRUD, stabilization, resolution)
//! ```
//!
//! Per tick, in order: drain and dispatch the inbound queue; run the
//! membership periodic duties (in-group nodes only); rebuild the ring and
//! stabilize if it changed; resolve open transactions.
//!
//! The node is a pure state machine in the same style as the membership
//! layer: handlers consume frames and the current tick and return a
//! [`NodeOutput`] of outbound messages plus checker events. The driver owns
//! the network, the clock, and node lifecycle (including the failed flag).

mod coordinator;
mod node;
mod server;
#[cfg(test)]
mod tests;
mod transaction;

pub use node::Node;
pub use transaction::{Transaction, TransactionTable};

use hematite_membership::MembershipOutput;
use hematite_types::{Address, LogEvent};
use hematite_wire::Message;

// ============================================================================
// Node Output
// ============================================================================

/// A message ready for the network, with its destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: Address,
    pub message: Message,
}

/// Output produced by a node handler or a full tick.
///
/// The caller (driver) is responsible for:
/// 1. Encoding and sending the outbound messages
/// 2. Appending the events to the log sink
#[derive(Debug, Default)]
pub struct NodeOutput {
    /// Messages to hand to the network emulator.
    pub outbound: Vec<Outbound>,

    /// Events for the external checker.
    pub events: Vec<LogEvent>,
}

impl NodeOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.events.is_empty()
    }

    /// Merges another output into this one, preserving order.
    pub fn merge(&mut self, other: NodeOutput) {
        self.outbound.extend(other.outbound);
        self.events.extend(other.events);
    }

    /// Lifts a membership output into a node output, stamping the sender.
    fn from_membership(from: Address, membership: MembershipOutput) -> Self {
        Self {
            outbound: membership
                .messages
                .into_iter()
                .map(|(to, payload)| Outbound {
                    to,
                    message: Message::new(from, payload),
                })
                .collect(),
            events: membership.events,
        }
    }
}
