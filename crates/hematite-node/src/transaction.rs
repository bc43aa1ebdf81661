//! Coordinator-side transaction records and quorum resolution.

use std::collections::BTreeMap;

use hematite_types::{OpKind, Tick, TransId, QUORUM, REPLICA_COUNT, TRANSACTION_DEADLINE};

/// An open client operation awaiting replica replies.
///
/// Invariant: `successes <= replies <= 3`. A record is destroyed exactly
/// once, when it resolves.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: TransId,
    pub started_at: Tick,
    pub op: OpKind,
    pub key: String,
    /// Empty for read/delete.
    pub value: String,
    pub replies: u8,
    pub successes: u8,
    /// Most recent replica-reported value (reads only).
    pub last_read: String,
}

impl Transaction {
    fn new(id: TransId, started_at: Tick, op: OpKind, key: String, value: String) -> Self {
        Self {
            id,
            started_at,
            op,
            key,
            value,
            replies: 0,
            successes: 0,
            last_read: String::new(),
        }
    }
}

/// The coordinator's table of open transactions, plus the id allocator.
///
/// Records are held by value, keyed by id; iteration is in id order, so
/// resolution is deterministic.
#[derive(Debug, Clone)]
pub struct TransactionTable {
    next_id: TransId,
    open: BTreeMap<TransId, Transaction>,
}

impl Default for TransactionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionTable {
    pub fn new() -> Self {
        Self {
            next_id: TransId::FIRST,
            open: BTreeMap::new(),
        }
    }

    /// Allocates the id for one client call. Ids advance even when the
    /// call is subsequently dropped for an under-populated ring.
    pub fn take_id(&mut self) -> TransId {
        let id = self.next_id;
        self.next_id = self.next_id.next();
        id
    }

    /// Opens a record for an issued client operation.
    pub fn open(&mut self, id: TransId, started_at: Tick, op: OpKind, key: String, value: String) {
        self.open
            .insert(id, Transaction::new(id, started_at, op, key, value));
    }

    /// Accumulates a `Reply`. Returns false when the id is unknown (the
    /// transaction already resolved; the reply is dropped).
    ///
    /// The network may duplicate frames; anything past the full tally of
    /// three is ignored so the reply counts stay within bounds.
    pub fn record_reply(&mut self, id: TransId, success: bool) -> bool {
        let Some(txn) = self.open.get_mut(&id) else {
            return false;
        };
        if usize::from(txn.replies) >= REPLICA_COUNT {
            return true;
        }
        txn.replies += 1;
        if success {
            txn.successes += 1;
        }
        true
    }

    /// Accumulates a `ReadReply`: counts as a reply, stores the reported
    /// value, and counts as a success iff the value is non-empty.
    pub fn record_read_reply(&mut self, id: TransId, value: String) -> bool {
        let Some(txn) = self.open.get_mut(&id) else {
            return false;
        };
        if usize::from(txn.replies) >= REPLICA_COUNT {
            return true;
        }
        txn.replies += 1;
        let success = !value.is_empty();
        txn.last_read = value;
        if success {
            txn.successes += 1;
        }
        true
    }

    /// Applies the resolution rule to every open transaction, removing and
    /// returning the resolved ones as `(record, success)`.
    ///
    /// Rule order per transaction:
    /// 1. all three replies in: success iff a quorum succeeded
    /// 2. a success quorum already: resolve success early
    /// 3. a failure quorum already: resolve failure early
    /// 4. past the deadline: resolve failure
    /// 5. otherwise stay open
    pub fn resolve_due(&mut self, now: Tick) -> Vec<(Transaction, bool)> {
        let mut resolved = Vec::new();
        self.open.retain(|_, txn| {
            let verdict = if usize::from(txn.replies) == REPLICA_COUNT {
                Some(txn.successes >= QUORUM)
            } else if txn.successes == QUORUM {
                Some(true)
            } else if txn.replies - txn.successes == QUORUM {
                Some(false)
            } else if now.since(txn.started_at) > TRANSACTION_DEADLINE {
                Some(false)
            } else {
                None
            };
            match verdict {
                Some(success) => {
                    resolved.push((txn.clone(), success));
                    false
                }
                None => true,
            }
        });
        resolved
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    pub fn get(&self, id: TransId) -> Option<&Transaction> {
        self.open.get(&id)
    }

    /// Open transactions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.open.values()
    }
}

// ============================================================================
// Tests
// ============================================================================
