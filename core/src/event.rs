//! Events the engine publishes to its observer.
//!
//! RULE: Events are dispatched synchronously, at the point of the state
//! transition, before the triggering call returns. Observers see them in
//! the exact order the transitions happened.
//!
//! `contract_overloaded` covers two conditions, told apart by `cause`:
//!   - capacity: an admission left used capacity at or above the overload line
//!   - sla_breach: an activation's incident count passed its SLA limit

use crate::types::{ActivationId, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContractEvent {
    ContractOverloaded {
        tick:           Tick,
        cause:          OverloadCause,
        activation_id:  Option<ActivationId>,
        used_capacity:  f64,
        total_capacity: f64,
    },
    ContractCapacityChanged {
        tick:           Tick,
        previous_ratio: f64,
        new_ratio:      f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OverloadCause {
    Capacity,
    SlaBreach {
        incident_count:        u32,
        max_allowed_incidents: u32,
    },
}

impl ContractEvent {
    /// Stable external event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContractOverloaded { .. }      => "contract_overloaded",
            Self::ContractCapacityChanged { .. } => "contract_capacity_changed",
        }
    }

    pub fn tick(&self) -> Tick {
        match self {
            Self::ContractOverloaded { tick, .. } | Self::ContractCapacityChanged { tick, .. } => *tick,
        }
    }
}

/// Synchronous observer the engine calls out to.
pub trait EventBus {
    fn publish(&mut self, event: &ContractEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBus;

impl EventBus for NullBus {
    fn publish(&mut self, _event: &ContractEvent) {}
}

/// Records events in publication order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<ContractEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn count(&self, event_type: &str) -> usize {
        self.events.iter().filter(|e| e.event_type() == event_type).count()
    }

    /// Hand over everything recorded so far.
    pub fn drain(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }
}

impl EventBus for EventLog {
    fn publish(&mut self, event: &ContractEvent) {
        self.events.push(event.clone());
    }
}

impl<B: EventBus + ?Sized> EventBus for Box<B> {
    fn publish(&mut self, event: &ContractEvent) {
        (**self).publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overload_event_serializes_with_cause() {
        let event = ContractEvent::ContractOverloaded {
            tick: 4,
            cause: OverloadCause::SlaBreach { incident_count: 3, max_allowed_incidents: 2 },
            activation_id: Some(ActivationId(1)),
            used_capacity: 0.0,
            total_capacity: 10.0,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "contract_overloaded");
        assert_eq!(json["cause"]["kind"], "sla_breach");
        assert_eq!(json["activation_id"], 1);
        assert_eq!(event.event_type(), "contract_overloaded");
    }
}
