//! # hematite-wire: Binary wire protocol
//!
//! This crate defines every frame the two protocols exchange:
//!
//! ## Membership
//! - [`Payload::JoinReq`] - Joiner → Introducer: let me into the group
//! - [`Payload::JoinRep`] - Introducer → Joiner: you're in, here's my view
//! - [`Payload::Ping`] - Member → Member: heartbeat gossip with full list
//!
//! ## Replication
//! - [`Payload::Create`] / [`Payload::Read`] / [`Payload::Update`] /
//!   [`Payload::Delete`] - Coordinator → Replica: apply this operation
//! - [`Payload::Reply`] - Replica → Coordinator: applied, success or not
//! - [`Payload::ReadReply`] - Replica → Coordinator: stored value
//!   (empty string signals a miss)
//!
//! Frames are postcard-encoded [`Message`] envelopes. The sender's address
//! is serialized by value into the envelope; nothing on the wire refers to
//! sender memory. Receivers drop frames that fail to decode.

use bytes::Bytes;
use hematite_types::{Address, MemberEntry, TransId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Codec failures. Decode errors are expected under message corruption and
/// are absorbed by receivers; encode errors indicate a bug.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode frame: {0}")]
    Encode(#[source] postcard::Error),

    #[error("failed to decode frame: {0}")]
    Decode(#[source] postcard::Error),

    #[error("frame has {got} trailing bytes")]
    TrailingBytes { got: usize },
}

// ============================================================================
// Message Envelope
// ============================================================================

/// A protocol message with its sender.
///
/// The destination is not part of the frame: the network emulator routes by
/// the address handed to `send`, and receivers only ever need the sender
/// (to reply and to update the sender's member entry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The node that sent this message.
    pub from: Address,

    /// The message payload.
    pub payload: Payload,
}

impl Message {
    pub fn new(from: Address, payload: Payload) -> Self {
        Self { from, payload }
    }

    /// Short payload name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            Payload::JoinReq { .. } => "join_req",
            Payload::JoinRep { .. } => "join_rep",
            Payload::Ping { .. } => "ping",
            Payload::Create { .. } => "create",
            Payload::Read { .. } => "read",
            Payload::Update { .. } => "update",
            Payload::Delete { .. } => "delete",
            Payload::Reply { .. } => "reply",
            Payload::ReadReply { .. } => "read_reply",
        }
    }
}

// ============================================================================
// Payload
// ============================================================================

/// The payload of a protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    // === Membership ===
    /// Join request carrying the joiner's (typically empty) member list.
    JoinReq { members: Vec<MemberEntry> },

    /// Join acknowledgement carrying the responder's member list.
    JoinRep { members: Vec<MemberEntry> },

    /// Periodic heartbeat gossip carrying the sender's full member list.
    Ping { members: Vec<MemberEntry> },

    // === Replication ===
    /// Store `key → value` at the receiving replica.
    Create {
        trans_id: TransId,
        key: String,
        value: String,
    },

    /// Read `key` at the receiving replica.
    Read { trans_id: TransId, key: String },

    /// Overwrite the value of an existing `key` at the receiving replica.
    Update {
        trans_id: TransId,
        key: String,
        value: String,
    },

    /// Remove `key` at the receiving replica.
    Delete { trans_id: TransId, key: String },

    /// Replica outcome for create/update/delete.
    Reply { trans_id: TransId, success: bool },

    /// Replica outcome for read; an empty `value` signals a miss.
    ReadReply { trans_id: TransId, value: String },
}

// ============================================================================
// Codec
// ============================================================================

/// Encodes a message into an opaque frame for the network emulator.
pub fn encode(message: &Message) -> Result<Bytes, WireError> {
    postcard::to_allocvec(message)
        .map(Bytes::from)
        .map_err(WireError::Encode)
}

/// Decodes a frame delivered by the network emulator.
///
/// Trailing garbage is rejected: a frame is exactly one message.
pub fn decode(frame: &[u8]) -> Result<Message, WireError> {
    let (message, rest) =
        postcard::take_from_bytes::<Message>(frame).map_err(WireError::Decode)?;
    if !rest.is_empty() {
        return Err(WireError::TrailingBytes { got: rest.len() });
    }
    Ok(message)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use hematite_types::Tick;
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(message: &Message) -> Message {
        let frame = encode(message).expect("encodes");
        decode(&frame).expect("decodes")
    }

    #[test]
    fn test_ping_roundtrip_preserves_member_list() {
        let members = vec![
            MemberEntry::new(Address::new(2, 0), 7, Tick::new(13)),
            MemberEntry::new(Address::new(3, 0), 1, Tick::new(2)),
        ];
        let msg = Message::new(Address::new(1, 0), Payload::Ping { members });
        assert_eq!(roundtrip(&msg), msg);
    }

    #[test]
    fn test_replication_payloads_roundtrip() {
        let from = Address::new(4, 0);
        let payloads = vec![
            Payload::Create {
                trans_id: TransId::new(9),
                key: "k".into(),
                value: "v".into(),
            },
            Payload::Read {
                trans_id: TransId::new(10),
                key: "k".into(),
            },
            Payload::Update {
                trans_id: TransId::new(11),
                key: "k".into(),
                value: "v2".into(),
            },
            Payload::Delete {
                trans_id: TransId::new(12),
                key: "k".into(),
            },
            Payload::Reply {
                trans_id: TransId::new(9),
                success: true,
            },
            Payload::ReadReply {
                trans_id: TransId::new(10),
                value: String::new(),
            },
        ];
        for payload in payloads {
            let msg = Message::new(from, payload);
            assert_eq!(roundtrip(&msg), msg);
        }
    }

    #[test]
    fn test_stable_sentinel_survives_the_wire() {
        let msg = Message::new(
            Address::new(2, 0),
            Payload::Create {
                trans_id: TransId::STABLE,
                key: "k".into(),
                value: "v".into(),
            },
        );
        let decoded = roundtrip(&msg);
        match decoded.payload {
            Payload::Create { trans_id, .. } => assert!(trans_id.is_stable()),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        assert!(decode(&[0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(decode(&[]).is_err());
    }

    #[test]
    fn test_trailing_bytes_are_rejected() {
        let msg = Message::new(
            Address::new(1, 0),
            Payload::Ping {
                members: Vec::new(),
            },
        );
        let mut frame = encode(&msg).expect("encodes").to_vec();
        frame.push(0);
        assert!(matches!(
            decode(&frame),
            Err(WireError::TrailingBytes { got: 1 })
        ));
    }

    proptest! {
        #[test]
        fn prop_reply_roundtrips(id in any::<i64>(), success in any::<bool>()) {
            let msg = Message::new(
                Address::new(1, 0),
                Payload::Reply { trans_id: TransId::new(id), success },
            );
            prop_assert_eq!(roundtrip(&msg), msg);
        }

        #[test]
        fn prop_truncated_frames_never_decode_to_full_message(
            key in "[a-z]{1,16}", value in "[a-z]{0,16}"
        ) {
            let msg = Message::new(
                Address::new(3, 1),
                Payload::Create { trans_id: TransId::new(5), key, value },
            );
            let frame = encode(&msg).expect("encodes");
            // Every strict prefix must fail to decode as a complete frame.
            for cut in 0..frame.len() {
                prop_assert!(decode(&frame[..cut]).is_err());
            }
        }
    }
}
