//! # hematite-sim: Deterministic simulation harness for `Hematite`
//!
//! This crate supplies the external collaborators the protocol crates are
//! written against, as simulated components:
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                         Cluster                            │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐    │
//! │  │ Node 1:0 │  │ Node 2:0 │  │ Node 3:0 │  │   ...    │    │
//! │  └────┬─────┘  └────┬─────┘  └────┬─────┘  └────┬─────┘    │
//! │       └─────────────┴──────┬──────┴──────────────┘         │
//! │                            │                               │
//! │                    ┌───────▼────────┐                      │
//! │                    │   SimNetwork   │ ◄── drop / dup / lag │
//! │                    └───────┬────────┘                      │
//! │                            │                               │
//! │        ┌──────────┐  ┌─────▼─────┐  ┌───────────┐          │
//! │        │ SimConfig│  │ EventLog  │  │ Invariants│          │
//! │        └──────────┘  └───────────┘  └───────────┘          │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Philosophy
//!
//! - **Reproducibility**: same seed → same frame fates → same event log
//! - **Fault injection**: frame loss, duplication, variable delay, node
//!   crashes, all without touching protocol code
//! - **Invariant checking**: the testable properties of the two protocols
//!   run as plain functions over a [`Cluster`]
//!
//! The only source of nondeterminism is the seeded RNG inside
//! [`SimNetwork`]; nodes themselves are pure state machines.

mod cluster;
mod config;
mod event_log;
pub mod invariant;
mod network;
pub mod scenarios;

pub use cluster::Cluster;
pub use config::{ConfigError, SimConfig};
pub use event_log::{EventLog, RecordedEvent};
pub use invariant::check_all;
pub use network::{NetStats, SimNetwork};
