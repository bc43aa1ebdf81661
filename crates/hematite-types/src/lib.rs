//! # hematite-types: Core types for `Hematite`
//!
//! This crate contains shared types used across the `Hematite` system:
//! - Node identity ([`Address`]) and the well-known [`Address::INTRODUCER`]
//! - Temporal types ([`Tick`])
//! - Transaction identifiers ([`TransId`] and the [`TransId::STABLE`] sentinel)
//! - Membership data ([`MemberEntry`])
//! - Checker events ([`LogEvent`], [`OpKind`])
//! - Protocol constants ([`T_FAIL`], [`T_REMOVE`], [`RING_SIZE`],
//!   [`REPLICA_COUNT`], [`QUORUM`], [`TRANSACTION_DEADLINE`])

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Protocol Constants
// ============================================================================

/// Advisory failure window in ticks. Carried over from the failure detector's
/// initial ping counter; eviction is governed by [`T_REMOVE`] alone.
pub const T_FAIL: u64 = 5;

/// Ticks without a heartbeat advance before a member is evicted.
pub const T_REMOVE: u64 = 20;

/// Number of slots on the consistent-hash ring.
pub const RING_SIZE: u64 = 512;

/// Copies kept of every key.
pub const REPLICA_COUNT: usize = 3;

/// Positive replies required to resolve an operation as successful.
pub const QUORUM: u8 = 2;

/// Ticks after which an unresolved transaction fails.
pub const TRANSACTION_DEADLINE: u64 = 10;

// ============================================================================
// Address
// ============================================================================

/// A 6-byte node identity: a 4-byte id plus a 2-byte port.
///
/// Equality is byte-wise. The ordering is `(id, port)` lexicographic, which
/// matches the byte-wise comparison of the little-endian encoding only per
/// field; protocol code never relies on cross-field byte order.
///
/// # Examples
///
/// ```
/// # use hematite_types::Address;
/// let addr = Address::new(7, 0);
/// assert_eq!(Address::from_bytes(addr.to_bytes()), addr);
/// assert_eq!(addr.to_string(), "7:0");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    /// 4-byte node id.
    pub id: u32,
    /// 2-byte port.
    pub port: u16,
}

impl Address {
    /// The well-known introducer every joiner contacts first.
    pub const INTRODUCER: Address = Address { id: 1, port: 0 };

    pub const fn new(id: u32, port: u16) -> Self {
        Self { id, port }
    }

    /// Encodes the address into its 6-byte wire layout (id then port,
    /// both little-endian).
    pub fn to_bytes(self) -> [u8; 6] {
        let mut buf = [0u8; 6];
        buf[..4].copy_from_slice(&self.id.to_le_bytes());
        buf[4..].copy_from_slice(&self.port.to_le_bytes());
        buf
    }

    /// Decodes an address from its 6-byte wire layout.
    pub fn from_bytes(bytes: [u8; 6]) -> Self {
        let id = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let port = u16::from_le_bytes([bytes[4], bytes[5]]);
        Self { id, port }
    }

    /// Returns true if this is the introducer address.
    pub fn is_introducer(self) -> bool {
        self == Self::INTRODUCER
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.port)
    }
}

// ============================================================================
// Tick
// ============================================================================

/// Simulation time, in discrete driver ticks.
///
/// All per-tick operations at a node observe the same `Tick`; nodes never
/// read a wall clock.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Tick(u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub const fn new(t: u64) -> Self {
        Self(t)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// The tick immediately after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Ticks elapsed since `earlier`, saturating at zero for out-of-order
    /// timestamps (a remote entry may carry a timestamp ahead of the local
    /// clock only transiently; the freshness tests must not underflow).
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Advances this tick by `n`.
    pub fn advance(self, n: u64) -> Self {
        Self(self.0 + n)
    }
}

impl Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Tick {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Tick> for u64 {
    fn from(t: Tick) -> Self {
        t.0
    }
}

// ============================================================================
// Transaction Id
// ============================================================================

/// Identifier of one client operation, shared by every replica message that
/// operation fans out.
///
/// Ids are allocated once per client call from a per-node monotonic counter
/// and are positive. [`TransId::STABLE`] is the reserved sentinel carried by
/// stabilization writes; receivers apply those silently and coordinators
/// never open a record for them.
///
/// # Examples
///
/// ```
/// # use hematite_types::TransId;
/// let id = TransId::FIRST;
/// assert!(!id.is_stable());
/// assert_eq!(id.next(), TransId::from(2));
/// assert!(TransId::STABLE.is_stable());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TransId(i64);

impl TransId {
    /// Sentinel for stabilization writes: apply silently, never reply,
    /// never log, never track.
    pub const STABLE: TransId = TransId(-1);

    /// The first id a node allocates.
    pub const FIRST: TransId = TransId(1);

    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    /// The next id in allocation order.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns true for the stabilization sentinel.
    pub fn is_stable(self) -> bool {
        self == Self::STABLE
    }
}

impl Display for TransId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_stable() {
            write!(f, "STABLE")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<i64> for TransId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<TransId> for i64 {
    fn from(id: TransId) -> Self {
        id.0
    }
}

// ============================================================================
// Member Entry
// ============================================================================

/// One row of a node's member list, as carried on the wire.
///
/// `timestamp` is the local tick at which `heartbeat` last advanced. A node
/// holds at most one entry per `(id, port)` and never holds an entry for
/// itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberEntry {
    pub id: u32,
    pub port: u16,
    pub heartbeat: u64,
    pub timestamp: Tick,
}

impl MemberEntry {
    pub fn new(addr: Address, heartbeat: u64, timestamp: Tick) -> Self {
        Self {
            id: addr.id,
            port: addr.port,
            heartbeat,
            timestamp,
        }
    }

    /// The address this entry describes.
    pub fn addr(&self) -> Address {
        Address::new(self.id, self.port)
    }
}

// ============================================================================
// Checker Events
// ============================================================================

/// The kind of a client CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Read,
    Update,
    Delete,
}

impl Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Create => "create",
            OpKind::Read => "read",
            OpKind::Update => "update",
            OpKind::Delete => "delete",
        };
        f.write_str(s)
    }
}

/// An event emitted toward the external correctness checker.
///
/// Membership changes surface as `NodeAdd`/`NodeRemove`; replication
/// outcomes surface as `Operation` records from both the coordinator
/// (`coordinator: true`, once per transaction resolution) and each replica
/// server (`coordinator: false`, once per applied request).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogEvent {
    /// `observer` first learned of `member`.
    NodeAdd { observer: Address, member: Address },

    /// `observer` evicted `member` after [`T_REMOVE`] ticks of silence.
    NodeRemove { observer: Address, member: Address },

    /// A CRUD request was applied (server side) or resolved (coordinator
    /// side). `value` is present for create/update and for successful
    /// reads, where it carries the replica-reported stored value.
    Operation {
        observer: Address,
        coordinator: bool,
        trans_id: TransId,
        op: OpKind,
        key: String,
        value: Option<String>,
        success: bool,
    },
}

impl LogEvent {
    /// Returns true for membership events.
    pub fn is_membership(&self) -> bool {
        matches!(self, LogEvent::NodeAdd { .. } | LogEvent::NodeRemove { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
