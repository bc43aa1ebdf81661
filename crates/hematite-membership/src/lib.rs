//! # hematite-membership: Gossip membership and failure detection
//!
//! This crate implements the membership half of the system as a pure,
//! tick-driven state machine:
//!
//! - Join handshake: one `JoinReq` to the introducer, answered by a
//!   `JoinRep` carrying the introducer's member list
//! - Periodic gossip: each tick an in-group node bumps its own heartbeat,
//!   evicts silent members, and pings every remaining member with its
//!   full list
//! - Failure detection: a member whose heartbeat has not advanced for
//!   [`T_REMOVE`](hematite_types::T_REMOVE) ticks is evicted
//!
//! Handlers take the current tick and return a [`MembershipOutput`] of
//! outbound messages and checker events. No I/O, no clocks, no randomness:
//! the node's tick loop owns scheduling and the network.

mod list;
mod protocol;

pub use list::MemberList;
pub use protocol::{MembershipOutput, MembershipState};
