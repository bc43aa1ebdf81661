//! The packet-switched network emulator.
//!
//! Unreliable by construction: frames may be dropped, duplicated, and
//! reordered (independent random delays). All fates come from one seeded
//! RNG, so a run is fully determined by its config.

use bytes::Bytes;
use hematite_types::{Address, Tick};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::SimConfig;

/// A frame in flight.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub from: Address,
    pub to: Address,
    pub bytes: Bytes,
    pub deliver_at: Tick,
}

/// Frame counters for run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub sent: u64,
    pub dropped: u64,
    pub duplicated: u64,
    pub delivered: u64,
}

/// The simulated network.
pub struct SimNetwork {
    rng: SmallRng,
    drop_rate: f64,
    duplicate_rate: f64,
    min_delay: u64,
    max_delay: u64,
    in_flight: Vec<Frame>,
    stats: NetStats,
}

impl SimNetwork {
    pub fn new(config: &SimConfig) -> Self {
        let (min_delay, max_delay) = config.delay_bounds();
        Self {
            rng: SmallRng::seed_from_u64(config.seed),
            drop_rate: config.drop_rate,
            duplicate_rate: config.duplicate_rate,
            min_delay,
            max_delay,
            in_flight: Vec::new(),
            stats: NetStats::default(),
        }
    }

    /// Accepts a frame for delivery. The frame may be dropped outright or
    /// scheduled once or twice with independent random delays.
    pub fn send(&mut self, from: Address, to: Address, bytes: Bytes, now: Tick) {
        self.stats.sent += 1;

        if self.rng.gen_bool(self.drop_rate) {
            self.stats.dropped += 1;
            tracing::trace!(%from, %to, "frame dropped");
            return;
        }

        self.schedule(from, to, bytes.clone(), now);
        if self.rng.gen_bool(self.duplicate_rate) {
            self.stats.duplicated += 1;
            self.schedule(from, to, bytes, now);
        }
    }

    fn schedule(&mut self, from: Address, to: Address, bytes: Bytes, now: Tick) {
        let delay = self.rng.gen_range(self.min_delay..=self.max_delay);
        self.in_flight.push(Frame {
            from,
            to,
            bytes,
            deliver_at: now.advance(delay),
        });
    }

    /// Removes and returns every frame due at or before `now`, in send
    /// order among equal delivery ticks.
    pub(crate) fn take_due(&mut self, now: Tick) -> Vec<Frame> {
        let mut due = Vec::new();
        self.in_flight.retain(|frame| {
            if frame.deliver_at <= now {
                due.push(frame.clone());
                false
            } else {
                true
            }
        });
        self.stats.delivered += due.len() as u64;
        due
    }

    /// Reconfigures the fault rates mid-run. Scenarios use this to open
    /// and close fault windows around a healthy bootstrap.
    pub fn set_fault_rates(&mut self, drop_rate: f64, duplicate_rate: f64) {
        self.drop_rate = drop_rate.clamp(0.0, 1.0);
        self.duplicate_rate = duplicate_rate.clamp(0.0, 1.0);
    }

    /// Frames currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn stats(&self) -> NetStats {
        self.stats
    }
}
