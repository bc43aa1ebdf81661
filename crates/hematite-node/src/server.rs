//! Server-side replication: apply coordinator requests to the local store.
//!
//! Every handler applies the operation, emits a server-side checker event
//! (coordinator flag false), and answers the coordinator — except for
//! stabilization traffic, which is applied silently: stable-id creates are
//! create-if-absent with no event and no reply, stable-id deletes are
//! likewise silent.

use hematite_types::{Address, LogEvent, OpKind, TransId};
use hematite_wire::{Message, Payload};

use crate::node::Node;
use crate::{NodeOutput, Outbound};

impl Node {
    pub(crate) fn on_create(
        &mut self,
        from: Address,
        trans_id: TransId,
        key: &str,
        value: &str,
    ) -> NodeOutput {
        if trans_id.is_stable() {
            // Create-if-absent; the store's create already refuses
            // existing keys.
            self.store.create(key, value);
            return NodeOutput::empty();
        }

        let success = self.store.create(key, value);
        let mut output = NodeOutput::empty();
        output.events.push(self.server_event(
            trans_id,
            OpKind::Create,
            key,
            Some(value.to_string()),
            success,
        ));
        output.outbound.push(self.reply_to(from, trans_id, success));
        output
    }

    pub(crate) fn on_read(&mut self, from: Address, trans_id: TransId, key: &str) -> NodeOutput {
        let value = self.store.read(key).map(str::to_string);
        let success = value.is_some();

        let mut output = NodeOutput::empty();
        output.events.push(self.server_event(
            trans_id,
            OpKind::Read,
            key,
            value.clone(),
            success,
        ));
        output.outbound.push(Outbound {
            to: from,
            message: Message::new(
                self.addr(),
                Payload::ReadReply {
                    trans_id,
                    value: value.unwrap_or_default(),
                },
            ),
        });
        output
    }

    pub(crate) fn on_update(
        &mut self,
        from: Address,
        trans_id: TransId,
        key: &str,
        value: &str,
    ) -> NodeOutput {
        let success = self.store.update(key, value);
        let mut output = NodeOutput::empty();
        output.events.push(self.server_event(
            trans_id,
            OpKind::Update,
            key,
            Some(value.to_string()),
            success,
        ));
        output.outbound.push(self.reply_to(from, trans_id, success));
        output
    }

    pub(crate) fn on_delete(&mut self, from: Address, trans_id: TransId, key: &str) -> NodeOutput {
        let success = self.store.delete(key);
        if trans_id.is_stable() {
            return NodeOutput::empty();
        }

        let mut output = NodeOutput::empty();
        output
            .events
            .push(self.server_event(trans_id, OpKind::Delete, key, None, success));
        output.outbound.push(self.reply_to(from, trans_id, success));
        output
    }

    fn reply_to(&self, to: Address, trans_id: TransId, success: bool) -> Outbound {
        Outbound {
            to,
            message: Message::new(self.addr(), Payload::Reply { trans_id, success }),
        }
    }

    fn server_event(
        &self,
        trans_id: TransId,
        op: OpKind,
        key: &str,
        value: Option<String>,
        success: bool,
    ) -> LogEvent {
        LogEvent::Operation {
            observer: self.addr(),
            coordinator: false,
            trans_id,
            op,
            key: key.to_string(),
            value,
            success,
        }
    }
}
