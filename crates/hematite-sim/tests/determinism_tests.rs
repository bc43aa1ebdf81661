//! Reproducibility: a run is a pure function of its config.

use hematite_sim::{Cluster, EventLog, SimConfig};
use hematite_types::Address;

fn workload(config: SimConfig) -> (EventLog, hematite_sim::NetStats) {
    let mut cluster = Cluster::new(config).expect("valid config");
    cluster.run(5);
    cluster.set_fault_rates(0.25, 0.1);

    for i in 0..8 {
        cluster.client_create(Address::INTRODUCER, &format!("key-{i}"), &format!("v{i}"));
        cluster.run(2);
    }
    cluster.fail_node(Address::new(3, 0));
    cluster.run(30);
    for i in 0..8 {
        cluster.client_read(Address::INTRODUCER, &format!("key-{i}"));
        cluster.run(2);
    }
    cluster.run(15);

    (cluster.log().clone(), cluster.network().stats())
}

#[test]
fn test_same_seed_reproduces_the_event_log() {
    let config = SimConfig {
        node_count: 5,
        seed: 1234,
        ..SimConfig::default()
    };
    let (log_a, stats_a) = workload(config.clone());
    let (log_b, stats_b) = workload(config);

    assert_eq!(stats_a, stats_b);
    assert_eq!(log_a, log_b);
}

#[test]
fn test_event_log_exports_to_json() {
    let config = SimConfig {
        node_count: 3,
        ..SimConfig::default()
    };
    let (log, _) = workload(config);
    let json = log.to_json().expect("serializes");
    assert!(json.contains("NodeAdd"));
}
