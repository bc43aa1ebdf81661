//! Invariant checks over a running cluster.
//!
//! Each check returns human-readable violations; an empty vector means the
//! property held. [`check_all`] bundles the checks that are valid at any
//! point in any run. [`check_quiescent_membership`] is stronger and only
//! meaningful once the cluster has settled (no client traffic, failures
//! older than the removal window).

use std::collections::{BTreeSet, HashMap, HashSet};

use hematite_types::{Address, LogEvent, REPLICA_COUNT};

use crate::Cluster;
use crate::event_log::EventLog;

/// Runs every always-valid invariant check.
pub fn check_all(cluster: &Cluster) -> Vec<String> {
    let mut violations = Vec::new();
    violations.extend(check_member_lists(cluster));
    violations.extend(check_transaction_bounds(cluster));
    violations.extend(check_replica_placement(cluster));
    violations.extend(check_add_remove_alternation(cluster.log()));
    violations
}

/// Member lists hold at most one entry per address and never self.
pub fn check_member_lists(cluster: &Cluster) -> Vec<String> {
    let mut violations = Vec::new();
    for node in cluster.nodes() {
        let mut seen = HashSet::new();
        for entry in node.membership().members().iter() {
            let addr = entry.addr();
            if addr == node.addr() {
                violations.push(format!("node {} lists itself as a member", node.addr()));
            }
            if !seen.insert(addr) {
                violations.push(format!(
                    "node {} lists member {} more than once",
                    node.addr(),
                    addr
                ));
            }
        }
    }
    violations
}

/// Every open transaction satisfies `successes <= replies <= 3`.
pub fn check_transaction_bounds(cluster: &Cluster) -> Vec<String> {
    let mut violations = Vec::new();
    for node in cluster.nodes() {
        for txn in node.transactions().iter() {
            if txn.successes > txn.replies || usize::from(txn.replies) > REPLICA_COUNT {
                violations.push(format!(
                    "node {} transaction {} has counts {}/{} out of bounds",
                    node.addr(),
                    txn.id,
                    txn.successes,
                    txn.replies
                ));
            }
        }
    }
    violations
}

/// With three or more ring entries, every key maps to three distinct
/// replicas.
pub fn check_replica_placement(cluster: &Cluster) -> Vec<String> {
    let probes = ["probe-a", "probe-b", "probe-c", "probe-d"];
    let mut violations = Vec::new();
    for node in cluster.nodes() {
        if node.ring().len() < REPLICA_COUNT {
            continue;
        }
        for key in probes {
            let Some(replicas) = node.ring().replicas_for_key(key) else {
                violations.push(format!(
                    "node {} ring of {} entries placed no replicas for {key:?}",
                    node.addr(),
                    node.ring().len()
                ));
                continue;
            };
            let distinct: HashSet<Address> = replicas.into_iter().collect();
            if distinct.len() != REPLICA_COUNT {
                violations.push(format!(
                    "node {} placed non-distinct replicas for {key:?}",
                    node.addr()
                ));
            }
        }
    }
    violations
}

/// Per (observer, member): NodeAdd and NodeRemove strictly alternate,
/// starting with an add. A second add without an intervening removal means
/// the observer "learned" of a member it already knew.
pub fn check_add_remove_alternation(log: &EventLog) -> Vec<String> {
    let mut present: HashMap<(Address, Address), bool> = HashMap::new();
    let mut violations = Vec::new();
    for recorded in log.iter() {
        match &recorded.event {
            LogEvent::NodeAdd { observer, member } => {
                let slot = present.entry((*observer, *member)).or_insert(false);
                if *slot {
                    violations.push(format!(
                        "duplicate NodeAdd for {member} at {observer} (tick {})",
                        recorded.tick
                    ));
                }
                *slot = true;
            }
            LogEvent::NodeRemove { observer, member } => {
                let slot = present.entry((*observer, *member)).or_insert(false);
                if !*slot {
                    violations.push(format!(
                        "NodeRemove without prior NodeAdd for {member} at {observer} (tick {})",
                        recorded.tick
                    ));
                }
                *slot = false;
            }
            LogEvent::Operation { .. } => {}
        }
    }
    violations
}

/// At quiescence, every live node's member list contains exactly the other
/// live nodes.
pub fn check_quiescent_membership(cluster: &Cluster) -> Vec<String> {
    let live: BTreeSet<Address> = cluster.live_addrs().into_iter().collect();
    let mut violations = Vec::new();
    for node in cluster.nodes() {
        if node.is_failed() {
            continue;
        }
        let expected: BTreeSet<Address> =
            live.iter().copied().filter(|a| *a != node.addr()).collect();
        let actual: BTreeSet<Address> = node
            .membership()
            .members()
            .addrs()
            .into_iter()
            .collect();
        if actual != expected {
            violations.push(format!(
                "node {} member list {:?} differs from live peers {:?}",
                node.addr(),
                actual,
                expected
            ));
        }
    }
    violations
}
