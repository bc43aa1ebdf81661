//! Coordinator-side replication: client CRUD fan-out and reply handling.

use hematite_types::{LogEvent, OpKind, Tick, TransId};
use hematite_wire::{Message, Payload};

use crate::node::Node;
use crate::{NodeOutput, Outbound};

impl Node {
    // ========================================================================
    // Client CRUD (driver-facing)
    // ========================================================================

    /// Issues a replicated create for `key → value`.
    pub fn client_create(&mut self, key: &str, value: &str, now: Tick) -> NodeOutput {
        self.client_op(OpKind::Create, key, value, now)
    }

    /// Issues a replicated read of `key`.
    pub fn client_read(&mut self, key: &str, now: Tick) -> NodeOutput {
        self.client_op(OpKind::Read, key, "", now)
    }

    /// Issues a replicated update of `key` to `value`.
    pub fn client_update(&mut self, key: &str, value: &str, now: Tick) -> NodeOutput {
        self.client_op(OpKind::Update, key, value, now)
    }

    /// Issues a replicated delete of `key`.
    pub fn client_delete(&mut self, key: &str, now: Tick) -> NodeOutput {
        self.client_op(OpKind::Delete, key, "", now)
    }

    /// Shared fan-out path: allocate the id, find the replicas, open the
    /// record, send the same request to all three.
    ///
    /// The id advances even when the ring is too small to place replicas;
    /// in that case the call is dropped silently (no record, no traffic).
    fn client_op(&mut self, op: OpKind, key: &str, value: &str, now: Tick) -> NodeOutput {
        if self.is_failed() {
            return NodeOutput::empty();
        }

        let trans_id = self.transactions.take_id();
        let Some(replicas) = self.ring().replicas_for_key(key) else {
            tracing::debug!(
                node = %self.addr(),
                %op,
                key,
                "dropping client op: ring below replication factor"
            );
            return NodeOutput::empty();
        };

        self.transactions
            .open(trans_id, now, op, key.to_string(), value.to_string());

        let mut output = NodeOutput::empty();
        for to in replicas {
            let payload = match op {
                OpKind::Create => Payload::Create {
                    trans_id,
                    key: key.to_string(),
                    value: value.to_string(),
                },
                OpKind::Read => Payload::Read {
                    trans_id,
                    key: key.to_string(),
                },
                OpKind::Update => Payload::Update {
                    trans_id,
                    key: key.to_string(),
                    value: value.to_string(),
                },
                OpKind::Delete => Payload::Delete {
                    trans_id,
                    key: key.to_string(),
                },
            };
            output.outbound.push(Outbound {
                to,
                message: Message::new(self.addr(), payload),
            });
        }
        output
    }

    // ========================================================================
    // Reply Accumulation
    // ========================================================================

    /// Handles a replica's `Reply`. Unknown ids are dropped: the
    /// transaction already resolved.
    pub(crate) fn on_reply(&mut self, trans_id: TransId, success: bool) -> NodeOutput {
        if !self.transactions.record_reply(trans_id, success) {
            tracing::debug!(node = %self.addr(), %trans_id, "reply for resolved transaction");
        }
        NodeOutput::empty()
    }

    /// Handles a replica's `ReadReply`; an empty value is a miss.
    pub(crate) fn on_read_reply(&mut self, trans_id: TransId, value: String) -> NodeOutput {
        if !self.transactions.record_read_reply(trans_id, value) {
            tracing::debug!(node = %self.addr(), %trans_id, "read reply for resolved transaction");
        }
        NodeOutput::empty()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Tick step 4: resolve every due transaction and emit the
    /// coordinator-side checker events.
    pub(crate) fn resolve_transactions(&mut self, now: Tick) -> NodeOutput {
        let observer = self.addr();
        let mut output = NodeOutput::empty();
        for (txn, success) in self.transactions.resolve_due(now) {
            tracing::debug!(
                node = %observer,
                trans_id = %txn.id,
                op = %txn.op,
                key = %txn.key,
                success,
                "transaction resolved"
            );
            let value = match txn.op {
                OpKind::Create | OpKind::Update => Some(txn.value),
                OpKind::Read if success => Some(txn.last_read),
                OpKind::Read | OpKind::Delete => None,
            };
            output.events.push(LogEvent::Operation {
                observer,
                coordinator: true,
                trans_id: txn.id,
                op: txn.op,
                key: txn.key,
                value,
                success,
            });
        }
        output
    }
}
