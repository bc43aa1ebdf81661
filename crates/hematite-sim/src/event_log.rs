//! The append-only structured log sink.
//!
//! Collects every checker event a node emits, stamped with the tick it was
//! emitted at. The boundary-scenario assertions and the external checker
//! both read from here; `to_json` exports a run for offline inspection.

use hematite_types::{Address, LogEvent, Tick};
use serde::{Deserialize, Serialize};

/// One sink entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    pub tick: Tick,
    pub event: LogEvent,
}

/// The append-only event sink shared by every node in a cluster.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventLog {
    events: Vec<RecordedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, tick: Tick, event: LogEvent) {
        self.events.push(RecordedEvent { tick, event });
    }

    pub fn extend(&mut self, tick: Tick, events: impl IntoIterator<Item = LogEvent>) {
        for event in events {
            self.append(tick, event);
        }
    }

    pub fn events(&self) -> &[RecordedEvent] {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// How many times `observer` announced the removal of `member`.
    pub fn removal_count(&self, observer: Address, member: Address) -> usize {
        self.events
            .iter()
            .filter(|r| {
                matches!(
                    &r.event,
                    LogEvent::NodeRemove { observer: o, member: m }
                        if *o == observer && *m == member
                )
            })
            .count()
    }

    /// How many times `observer` announced the addition of `member`.
    pub fn add_count(&self, observer: Address, member: Address) -> usize {
        self.events
            .iter()
            .filter(|r| {
                matches!(
                    &r.event,
                    LogEvent::NodeAdd { observer: o, member: m }
                        if *o == observer && *m == member
                )
            })
            .count()
    }

    /// Coordinator-side resolutions, in emission order.
    pub fn coordinator_resolutions(&self) -> impl Iterator<Item = &RecordedEvent> {
        self.events.iter().filter(|r| {
            matches!(
                &r.event,
                LogEvent::Operation {
                    coordinator: true,
                    ..
                }
            )
        })
    }

    /// Serializes the whole run for offline inspection.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u32) -> Address {
        Address::new(id, 0)
    }

    #[test]
    fn test_counts_by_observer_and_member() {
        let mut log = EventLog::new();
        log.append(
            Tick::new(1),
            LogEvent::NodeAdd {
                observer: addr(1),
                member: addr(2),
            },
        );
        log.append(
            Tick::new(30),
            LogEvent::NodeRemove {
                observer: addr(1),
                member: addr(2),
            },
        );
        assert_eq!(log.add_count(addr(1), addr(2)), 1);
        assert_eq!(log.removal_count(addr(1), addr(2)), 1);
        assert_eq!(log.removal_count(addr(2), addr(1)), 0);
    }

    #[test]
    fn test_json_export_roundtrips() {
        let mut log = EventLog::new();
        log.append(
            Tick::new(3),
            LogEvent::NodeAdd {
                observer: addr(1),
                member: addr(2),
            },
        );
        let json = log.to_json().expect("serializes");
        let parsed: Vec<RecordedEvent> = serde_json::from_str(&json).expect("parses");
        assert_eq!(parsed, log.events().to_vec());
    }
}
