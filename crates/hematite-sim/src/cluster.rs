//! The driver: node lifecycle, the shared clock, and frame ferrying.

use std::collections::BTreeMap;

use hematite_node::{Node, NodeOutput};
use hematite_types::{Address, Tick};

use crate::event_log::EventLog;
use crate::network::SimNetwork;
use crate::{ConfigError, SimConfig};

/// A simulated cluster: every node, the network between them, the shared
/// tick counter, and the log sink.
///
/// Nodes are stored in address order and ticked in address order; combined
/// with the seeded network this makes a whole run a pure function of its
/// [`SimConfig`].
pub struct Cluster {
    config: SimConfig,
    now: Tick,
    network: SimNetwork,
    nodes: BTreeMap<Address, Node>,
    log: EventLog,
}

impl Cluster {
    /// Builds and boots a cluster: ids `1..=node_count` on port 0, the
    /// introducer in-group immediately, everyone else's join request on
    /// the wire before the first tick.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut cluster = Self {
            network: SimNetwork::new(&config),
            now: Tick::ZERO,
            nodes: BTreeMap::new(),
            log: EventLog::new(),
            config,
        };
        for id in 1..=cluster.config.node_count {
            cluster.add_node(Address::new(id, 0));
        }
        Ok(cluster)
    }

    /// Boots one more node into a running cluster.
    pub fn add_node(&mut self, addr: Address) {
        let mut node = Node::new(addr);
        let output = node.start();
        self.nodes.insert(addr, node);
        self.route(addr, output);
    }

    pub fn now(&self) -> Tick {
        self.now
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn network(&self) -> &SimNetwork {
        &self.network
    }

    pub fn addrs(&self) -> Vec<Address> {
        self.nodes.keys().copied().collect()
    }

    pub fn node(&self, addr: Address) -> &Node {
        &self.nodes[&addr]
    }

    /// Live (non-failed) node addresses.
    pub fn live_addrs(&self) -> Vec<Address> {
        self.nodes
            .values()
            .filter(|n| !n.is_failed())
            .map(Node::addr)
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Advances the cluster by one tick: deliver due frames into inbound
    /// queues, tick every node in address order, ferry their output, then
    /// advance the clock.
    pub fn tick(&mut self) {
        for frame in self.network.take_due(self.now) {
            if let Some(node) = self.nodes.get_mut(&frame.to) {
                tracing::trace!(from = %frame.from, to = %frame.to, "delivering frame");
                node.enqueue(frame.bytes);
            }
        }

        let addrs: Vec<Address> = self.nodes.keys().copied().collect();
        for addr in addrs {
            let output = self
                .nodes
                .get_mut(&addr)
                .expect("ticking a known node")
                .tick(self.now);
            self.route(addr, output);
        }

        self.now = self.now.next();
    }

    /// Runs `ticks` consecutive ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    // ========================================================================
    // Client Operations & Fault Injection (the driver's schedule)
    // ========================================================================

    pub fn client_create(&mut self, coordinator: Address, key: &str, value: &str) {
        let now = self.now;
        let output = self
            .nodes
            .get_mut(&coordinator)
            .expect("coordinator exists")
            .client_create(key, value, now);
        self.route(coordinator, output);
    }

    pub fn client_read(&mut self, coordinator: Address, key: &str) {
        let now = self.now;
        let output = self
            .nodes
            .get_mut(&coordinator)
            .expect("coordinator exists")
            .client_read(key, now);
        self.route(coordinator, output);
    }

    pub fn client_update(&mut self, coordinator: Address, key: &str, value: &str) {
        let now = self.now;
        let output = self
            .nodes
            .get_mut(&coordinator)
            .expect("coordinator exists")
            .client_update(key, value, now);
        self.route(coordinator, output);
    }

    pub fn client_delete(&mut self, coordinator: Address, key: &str) {
        let now = self.now;
        let output = self
            .nodes
            .get_mut(&coordinator)
            .expect("coordinator exists")
            .client_delete(key, now);
        self.route(coordinator, output);
    }

    /// Opens or closes a fault window on the network.
    pub fn set_fault_rates(&mut self, drop_rate: f64, duplicate_rate: f64) {
        self.network.set_fault_rates(drop_rate, duplicate_rate);
    }

    /// Simulates a crash; the node stays dark until revived.
    pub fn fail_node(&mut self, addr: Address) {
        self.nodes
            .get_mut(&addr)
            .expect("failing a known node")
            .fail();
    }

    pub fn revive_node(&mut self, addr: Address) {
        self.nodes
            .get_mut(&addr)
            .expect("reviving a known node")
            .revive();
    }

    // ========================================================================
    // Output Ferrying
    // ========================================================================

    fn route(&mut self, from: Address, output: NodeOutput) {
        for outbound in output.outbound {
            match hematite_wire::encode(&outbound.message) {
                Ok(frame) => self.network.send(from, outbound.to, frame, self.now),
                Err(error) => {
                    // Encoding our own messages cannot fail; surface loudly
                    // in diagnostics if it ever does.
                    tracing::error!(%from, %error, "failed to encode outbound frame");
                }
            }
        }
        self.log.extend(self.now, output.events);
    }
}
