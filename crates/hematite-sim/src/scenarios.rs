//! Canned end-to-end runs shared by the CLI runner and the integration
//! tests.

use std::fmt::{self, Display};

use hematite_types::{Address, LogEvent, T_REMOVE};

use crate::network::NetStats;
use crate::{Cluster, ConfigError, SimConfig, check_all, invariant};

/// Summary of one scenario run.
#[derive(Debug)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub ticks: u64,
    pub resolutions: usize,
    pub successes: usize,
    pub node_adds: usize,
    pub node_removes: usize,
    pub net: NetStats,
    pub violations: Vec<String>,
}

impl ScenarioReport {
    fn collect(name: &'static str, cluster: &Cluster, mut violations: Vec<String>) -> Self {
        let mut resolutions = 0;
        let mut successes = 0;
        let mut node_adds = 0;
        let mut node_removes = 0;
        for recorded in cluster.log().iter() {
            match &recorded.event {
                LogEvent::Operation {
                    coordinator: true,
                    success,
                    ..
                } => {
                    resolutions += 1;
                    if *success {
                        successes += 1;
                    }
                }
                LogEvent::NodeAdd { .. } => node_adds += 1,
                LogEvent::NodeRemove { .. } => node_removes += 1,
                LogEvent::Operation { .. } => {}
            }
        }
        violations.extend(check_all(cluster));
        Self {
            name,
            ticks: cluster.now().as_u64(),
            resolutions,
            successes,
            node_adds,
            node_removes,
            net: cluster.network().stats(),
            violations,
        }
    }
}

impl Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scenario: {}", self.name)?;
        writeln!(f, "  ticks:        {}", self.ticks)?;
        writeln!(
            f,
            "  resolutions:  {} ({} success, {} failure)",
            self.resolutions,
            self.successes,
            self.resolutions - self.successes
        )?;
        writeln!(
            f,
            "  membership:   {} adds, {} removes",
            self.node_adds, self.node_removes
        )?;
        writeln!(
            f,
            "  frames:       {} sent, {} delivered, {} dropped, {} duplicated",
            self.net.sent, self.net.delivered, self.net.dropped, self.net.duplicated
        )?;
        writeln!(f, "  violations:   {}", self.violations.len())?;
        for violation in &self.violations {
            writeln!(f, "    - {violation}")?;
        }
        Ok(())
    }
}

/// Ticks for a freshly-booted cluster to finish joining and converge.
const SETTLE_TICKS: u64 = 5;

/// Boots a cluster over a lossless network, then opens the configured
/// fault window. The join handshake is a single request with no retry;
/// loss during boot would shrink the cluster instead of exercising the
/// protocols under faults.
fn boot(config: SimConfig) -> Result<Cluster, ConfigError> {
    config.validate()?;
    let faults = (config.drop_rate, config.duplicate_rate);
    let mut cluster = Cluster::new(SimConfig {
        drop_rate: 0.0,
        duplicate_rate: 0.0,
        ..config
    })?;
    cluster.run(SETTLE_TICKS);
    cluster.set_fault_rates(faults.0, faults.1);
    Ok(cluster)
}

/// Healthy cluster under a CRUD workload: every operation should resolve,
/// and with a lossless network every one should succeed.
pub fn steady_state(config: SimConfig, keys: u32, ticks: u64) -> Result<ScenarioReport, ConfigError> {
    let lossless = config.drop_rate == 0.0 && config.duplicate_rate == 0.0;
    let mut cluster = boot(config)?;

    let coordinator = Address::INTRODUCER;
    for i in 0..keys {
        cluster.client_create(coordinator, &format!("key-{i}"), &format!("value-{i}"));
        cluster.run(2);
    }
    for i in 0..keys {
        cluster.client_read(coordinator, &format!("key-{i}"));
        cluster.run(2);
    }
    let spent = SETTLE_TICKS + u64::from(keys) * 4;
    cluster.run(ticks.saturating_sub(spent));

    // Full-membership quiescence is only promised without faults; heavy
    // loss can legitimately evict a silent-looking member.
    let violations = if lossless {
        invariant::check_quiescent_membership(&cluster)
    } else {
        Vec::new()
    };
    Ok(ScenarioReport::collect("steady-state", &cluster, violations))
}

/// One node crashes mid-run: the survivors evict it within the removal
/// window and quorum operations keep resolving.
pub fn node_failure(config: SimConfig, ticks: u64) -> Result<ScenarioReport, ConfigError> {
    let mut cluster = boot(config)?;

    let coordinator = Address::INTRODUCER;
    cluster.client_create(coordinator, "before", "1");
    cluster.run(3);

    let victim = *cluster
        .addrs()
        .last()
        .expect("cluster has at least one node");
    cluster.fail_node(victim);
    cluster.run(T_REMOVE + 3);

    cluster.client_create(coordinator, "after", "2");
    cluster.run(3);
    cluster.client_read(coordinator, "after");

    let spent = SETTLE_TICKS + 3 + T_REMOVE + 3 + 3;
    cluster.run(ticks.saturating_sub(spent).max(4));

    // Every survivor must have announced the eviction exactly once.
    let mut violations = Vec::new();
    for observer in cluster.live_addrs() {
        let count = cluster.log().removal_count(observer, victim);
        if count != 1 {
            violations.push(format!(
                "node {observer} announced {count} removals of {victim}, expected 1"
            ));
        }
    }
    Ok(ScenarioReport::collect("node-failure", &cluster, violations))
}
