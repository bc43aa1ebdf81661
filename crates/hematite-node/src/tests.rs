//! Protocol-level tests driving a single node through encoded frames, the
//! same way the network does.

use bytes::Bytes;
use hematite_types::{Address, LogEvent, OpKind, Tick, TransId, TRANSACTION_DEADLINE};
use hematite_wire::{Message, Payload};

use crate::{Node, NodeOutput};

fn addr(id: u32) -> Address {
    Address::new(id, 0)
}

fn frame(from: Address, payload: Payload) -> Bytes {
    hematite_wire::encode(&Message::new(from, payload)).expect("encodes")
}

/// A node that has learned of `peers` (via empty pings) and installed a
/// ring containing itself plus all of them.
fn node_with_ring(id: u32, peers: &[u32]) -> Node {
    let mut node = Node::new(addr(id));
    node.start();
    for &peer in peers {
        node.enqueue(frame(
            addr(peer),
            Payload::Ping {
                members: Vec::new(),
            },
        ));
    }
    node.tick(Tick::new(0));
    node
}

fn operations(output: &NodeOutput) -> Vec<&LogEvent> {
    output
        .events
        .iter()
        .filter(|e| matches!(e, LogEvent::Operation { .. }))
        .collect()
}

fn sent_payloads<'a>(output: &'a NodeOutput, pred: impl Fn(&Payload) -> bool + 'a) -> Vec<&'a Payload> {
    output
        .outbound
        .iter()
        .map(|o| &o.message.payload)
        .filter(|p| pred(p))
        .collect()
}

// ============================================================================
// Client Fan-Out
// ============================================================================

#[test]
fn test_client_create_fans_out_one_id_to_three_replicas() {
    let mut node = node_with_ring(1, &[2, 3]);
    let output = node.client_create("k", "v", Tick::new(1));

    assert_eq!(output.outbound.len(), 3);
    let mut ids = Vec::new();
    let mut targets = Vec::new();
    for outbound in &output.outbound {
        match &outbound.message.payload {
            Payload::Create {
                trans_id,
                key,
                value,
            } => {
                ids.push(*trans_id);
                targets.push(outbound.to);
                assert_eq!(key, "k");
                assert_eq!(value, "v");
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
    ids.dedup();
    assert_eq!(ids, vec![TransId::new(1)]);

    targets.sort_unstable();
    targets.dedup();
    assert_eq!(targets.len(), 3);

    assert_eq!(node.open_transactions(), 1);
}

#[test]
fn test_under_populated_ring_drops_op_but_advances_id() {
    let mut lone = Node::new(addr(1));
    lone.start();
    lone.tick(Tick::ZERO);

    let output = lone.client_create("k", "v", Tick::new(1));
    assert!(output.outbound.is_empty());
    assert_eq!(lone.open_transactions(), 0);

    // Grow the ring, then observe the next op carries id 2.
    for peer in [2, 3] {
        lone.enqueue(frame(
            addr(peer),
            Payload::Ping {
                members: Vec::new(),
            },
        ));
    }
    lone.tick(Tick::new(2));
    let output = lone.client_create("k", "v", Tick::new(3));
    match &output.outbound[0].message.payload {
        Payload::Create { trans_id, .. } => assert_eq!(*trans_id, TransId::new(2)),
        other => panic!("unexpected payload {other:?}"),
    }
}

// ============================================================================
// Quorum Resolution
// ============================================================================

#[test]
fn test_two_successes_resolve_without_third_reply() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_create("k", "v", Tick::new(1));

    let id = TransId::new(1);
    node.enqueue(frame(addr(2), Payload::Reply { trans_id: id, success: true }));
    node.enqueue(frame(addr(3), Payload::Reply { trans_id: id, success: true }));
    let output = node.tick(Tick::new(2));

    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation {
            coordinator,
            trans_id,
            op,
            key,
            value,
            success,
            ..
        } => {
            assert!(*coordinator);
            assert_eq!(*trans_id, id);
            assert_eq!(*op, OpKind::Create);
            assert_eq!(key, "k");
            assert_eq!(value.as_deref(), Some("v"));
            assert!(*success);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(node.open_transactions(), 0);
}

#[test]
fn test_two_failures_resolve_failure() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_update("k", "v", Tick::new(1));

    let id = TransId::new(1);
    node.enqueue(frame(addr(2), Payload::Reply { trans_id: id, success: false }));
    node.enqueue(frame(addr(3), Payload::Reply { trans_id: id, success: false }));
    let output = node.tick(Tick::new(2));

    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation { success, op, .. } => {
            assert!(!success);
            assert_eq!(*op, OpKind::Update);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(node.open_transactions(), 0);
}

#[test]
fn test_unreachable_replicas_time_out_failure() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_delete("k", Tick::new(1));

    // Open through the deadline...
    for t in 2..=(1 + TRANSACTION_DEADLINE) {
        let output = node.tick(Tick::new(t));
        assert!(operations(&output).is_empty(), "resolved early at tick {t}");
    }
    assert_eq!(node.open_transactions(), 1);

    // ...and failed exactly one tick past it.
    let output = node.tick(Tick::new(2 + TRANSACTION_DEADLINE));
    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation { success, op, value, .. } => {
            assert!(!success);
            assert_eq!(*op, OpKind::Delete);
            assert!(value.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(node.open_transactions(), 0);
}

#[test]
fn test_reply_after_resolution_is_dropped() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_create("k", "v", Tick::new(1));

    let id = TransId::new(1);
    node.enqueue(frame(addr(2), Payload::Reply { trans_id: id, success: true }));
    node.enqueue(frame(addr(3), Payload::Reply { trans_id: id, success: true }));
    node.tick(Tick::new(2));

    // The straggler finds no record; nothing happens.
    node.enqueue(frame(addr(1), Payload::Reply { trans_id: id, success: true }));
    let output = node.tick(Tick::new(3));
    assert!(operations(&output).is_empty());
}

#[test]
fn test_read_resolution_carries_replica_value() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_read("k", Tick::new(1));

    let id = TransId::new(1);
    node.enqueue(frame(addr(2), Payload::ReadReply { trans_id: id, value: "stored".into() }));
    node.enqueue(frame(addr(3), Payload::ReadReply { trans_id: id, value: "stored".into() }));
    let output = node.tick(Tick::new(2));

    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation { op, value, success, .. } => {
            assert_eq!(*op, OpKind::Read);
            assert_eq!(value.as_deref(), Some("stored"));
            assert!(*success);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_read_of_missing_key_resolves_failure() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.client_read("k", Tick::new(1));

    let id = TransId::new(1);
    for replica in [1, 2, 3] {
        node.enqueue(frame(
            addr(replica),
            Payload::ReadReply { trans_id: id, value: String::new() },
        ));
    }
    let output = node.tick(Tick::new(2));

    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation { success, value, .. } => {
            assert!(!success);
            assert!(value.is_none());
        }
        other => panic!("unexpected event {other:?}"),
    }
}

// ============================================================================
// Server Handlers
// ============================================================================

#[test]
fn test_server_create_applies_and_replies() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.enqueue(frame(
        addr(2),
        Payload::Create { trans_id: TransId::new(7), key: "k".into(), value: "v".into() },
    ));
    let output = node.tick(Tick::new(1));

    assert_eq!(node.store().read("k"), Some("v"));
    let replies = sent_payloads(&output, |p| matches!(p, Payload::Reply { .. }));
    assert_eq!(replies.len(), 1);
    assert!(matches!(
        replies[0],
        Payload::Reply { trans_id, success: true } if *trans_id == TransId::new(7)
    ));

    let ops = operations(&output);
    assert_eq!(ops.len(), 1);
    match ops[0] {
        LogEvent::Operation { coordinator, success, .. } => {
            assert!(!coordinator);
            assert!(success);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn test_server_duplicate_create_replies_failure() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("k", "old");

    node.enqueue(frame(
        addr(2),
        Payload::Create { trans_id: TransId::new(7), key: "k".into(), value: "new".into() },
    ));
    let output = node.tick(Tick::new(1));

    assert_eq!(node.store().read("k"), Some("old"));
    let replies = sent_payloads(&output, |p| matches!(p, Payload::Reply { .. }));
    assert!(matches!(replies[0], Payload::Reply { success: false, .. }));
}

#[test]
fn test_server_read_hit_and_miss() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("k", "v");

    node.enqueue(frame(addr(2), Payload::Read { trans_id: TransId::new(7), key: "k".into() }));
    node.enqueue(frame(addr(2), Payload::Read { trans_id: TransId::new(8), key: "absent".into() }));
    let output = node.tick(Tick::new(1));

    let read_replies = sent_payloads(&output, |p| matches!(p, Payload::ReadReply { .. }));
    assert_eq!(read_replies.len(), 2);
    assert!(matches!(
        read_replies[0],
        Payload::ReadReply { trans_id, value } if *trans_id == TransId::new(7) && value == "v"
    ));
    assert!(matches!(
        read_replies[1],
        Payload::ReadReply { trans_id, value } if *trans_id == TransId::new(8) && value.is_empty()
    ));
}

#[test]
fn test_server_update_and_delete_round() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("k", "v1");

    node.enqueue(frame(
        addr(2),
        Payload::Update { trans_id: TransId::new(7), key: "k".into(), value: "v2".into() },
    ));
    node.enqueue(frame(addr(2), Payload::Delete { trans_id: TransId::new(8), key: "k".into() }));
    let output = node.tick(Tick::new(1));

    assert_eq!(node.store().read("k"), None);
    let replies = sent_payloads(&output, |p| matches!(p, Payload::Reply { success: true, .. }));
    assert_eq!(replies.len(), 2);
}

// ============================================================================
// Stabilization & Stable Writes
// ============================================================================

#[test]
fn test_stable_create_is_silent_and_does_not_overwrite() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("k", "old");

    node.enqueue(frame(
        addr(2),
        Payload::Create { trans_id: TransId::STABLE, key: "k".into(), value: "new".into() },
    ));
    node.enqueue(frame(
        addr(2),
        Payload::Create { trans_id: TransId::STABLE, key: "fresh".into(), value: "v".into() },
    ));
    let output = node.tick(Tick::new(1));

    assert_eq!(node.store().read("k"), Some("old"));
    assert_eq!(node.store().read("fresh"), Some("v"));
    assert!(operations(&output).is_empty());
    assert!(sent_payloads(&output, |p| matches!(p, Payload::Reply { .. })).is_empty());
}

#[test]
fn test_stable_delete_is_silent() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("k", "v");

    node.enqueue(frame(
        addr(2),
        Payload::Delete { trans_id: TransId::STABLE, key: "k".into() },
    ));
    let output = node.tick(Tick::new(1));

    assert_eq!(node.store().read("k"), None);
    assert!(operations(&output).is_empty());
    assert!(sent_payloads(&output, |p| matches!(p, Payload::Reply { .. })).is_empty());
}

#[test]
fn test_ring_change_re_replicates_local_keys() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("a", "1");
    node.store.create("b", "2");

    // A fourth node appears; the ring changes and every local key is
    // re-sent with the stable sentinel.
    node.enqueue(frame(addr(4), Payload::Ping { members: Vec::new() }));
    let output = node.tick(Tick::new(1));

    let stable_creates = sent_payloads(&output, |p| {
        matches!(p, Payload::Create { trans_id, .. } if trans_id.is_stable())
    });
    assert_eq!(stable_creates.len(), 6); // 2 keys x 3 replicas
    assert_eq!(node.open_transactions(), 0);
}

#[test]
fn test_unchanged_ring_does_not_stabilize() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.store.create("a", "1");

    // Same membership, next tick: no stabilization traffic.
    let output = node.tick(Tick::new(1));
    assert!(sent_payloads(&output, |p| {
        matches!(p, Payload::Create { trans_id, .. } if trans_id.is_stable())
    })
    .is_empty());
}

// ============================================================================
// Faults
// ============================================================================

#[test]
fn test_malformed_frames_are_dropped() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.enqueue(Bytes::from_static(&[0xde, 0xad, 0xbe, 0xef]));
    node.enqueue(Bytes::new());
    let output = node.tick(Tick::new(1));
    assert!(operations(&output).is_empty());
}

#[test]
fn test_failed_node_is_inert_until_revived() {
    let mut node = node_with_ring(1, &[2, 3]);
    node.fail();

    node.enqueue(frame(addr(2), Payload::Ping { members: Vec::new() }));
    assert!(node.tick(Tick::new(1)).is_empty());
    assert!(node.client_create("k", "v", Tick::new(1)).is_empty());
    assert_eq!(node.open_transactions(), 0);

    node.revive();
    let output = node.tick(Tick::new(2));
    // Back on duty: periodic gossip flows again.
    assert!(!output.outbound.is_empty());
}

#[test]
fn test_heartbeat_advances_once_per_tick_in_group() {
    let mut node = node_with_ring(1, &[2, 3]);
    let before = node.membership().heartbeat();
    node.tick(Tick::new(1));
    node.tick(Tick::new(2));
    assert_eq!(node.membership().heartbeat(), before + 2);
}
