//! Feed-stress scenarios for the simulation harness.

use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: Well-behaved fleet, one batch per tick
    SteadyFleet,

    /// SIM-002: Frequent transport identifier changes
    HandoffStorm,

    /// SIM-003: Half of all updates delivered twice
    DuplicateFlood,

    /// SIM-004: Drones that only send bare position fixes
    AnonymousDrift,

    /// SIM-005: Many small batches per window, with stalls
    BurstDelivery,
}

/// Knobs a scenario sets on the oracle and the arrival timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProfile {
    /// Emission period of the oracle (ms)
    pub tick_ms: u64,

    pub handoff_probability: f64,
    pub duplicate_probability: f64,

    /// Share of the fleet without identity fields
    pub anonymous_fraction: f64,

    /// Sub-batches each tick's updates are split into
    pub sub_batches: usize,

    /// Uniform extra delay per sub-batch (ms)
    pub arrival_jitter_ms: u64,

    /// Chance per tick that delivery stalls
    pub stall_probability: f64,
    pub stall_ms: u64,
}

impl Default for ScenarioProfile {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            handoff_probability: 0.0,
            duplicate_probability: 0.0,
            anonymous_fraction: 0.0,
            sub_batches: 1,
            arrival_jitter_ms: 20,
            stall_probability: 0.0,
            stall_ms: 0,
        }
    }
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::SteadyFleet,
            ScenarioId::HandoffStorm,
            ScenarioId::DuplicateFlood,
            ScenarioId::AnonymousDrift,
            ScenarioId::BurstDelivery,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::SteadyFleet => "steady_fleet",
            ScenarioId::HandoffStorm => "handoff_storm",
            ScenarioId::DuplicateFlood => "duplicate_flood",
            ScenarioId::AnonymousDrift => "anonymous_drift",
            ScenarioId::BurstDelivery => "burst_delivery",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::SteadyFleet => "Registered fleet at 10 Hz, verify one track per drone",
            ScenarioId::HandoffStorm => "20% serial handoffs per update, verify segment splits",
            ScenarioId::DuplicateFlood => "50% duplicate deliveries, verify no repeated points",
            ScenarioId::AnonymousDrift => "Half the fleet sends bare fixes, verify nearest-neighbour continuity",
            ScenarioId::BurstDelivery => "5 sub-batches per tick plus stalls, verify one merge per window",
        }
    }

    /// Oracle and timeline settings for this scenario.
    pub fn profile(&self) -> ScenarioProfile {
        let base = ScenarioProfile::default();
        match self {
            ScenarioId::SteadyFleet => base,
            ScenarioId::HandoffStorm => ScenarioProfile {
                handoff_probability: 0.2,
                ..base
            },
            ScenarioId::DuplicateFlood => ScenarioProfile {
                duplicate_probability: 0.5,
                sub_batches: 2,
                ..base
            },
            ScenarioId::AnonymousDrift => ScenarioProfile {
                anonymous_fraction: 0.5,
                ..base
            },
            ScenarioId::BurstDelivery => ScenarioProfile {
                tick_ms: 50,
                sub_batches: 5,
                arrival_jitter_ms: 10,
                stall_probability: 0.05,
                stall_ms: 300,
                handoff_probability: 0.05,
                ..base
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "steady_fleet" | "steadyfleet" | "sim-001" => Ok(ScenarioId::SteadyFleet),
            "handoff_storm" | "handoffstorm" | "sim-002" => Ok(ScenarioId::HandoffStorm),
            "duplicate_flood" | "duplicateflood" | "sim-003" => Ok(ScenarioId::DuplicateFlood),
            "anonymous_drift" | "anonymousdrift" | "sim-004" => Ok(ScenarioId::AnonymousDrift),
            "burst_delivery" | "burstdelivery" | "sim-005" => Ok(ScenarioId::BurstDelivery),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
            assert_eq!(id.to_string(), id.name());
            assert!(!id.description().is_empty());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SIM-002".parse::<ScenarioId>().unwrap(), ScenarioId::HandoffStorm);
        assert!("split_brain".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_profiles() {
        assert_eq!(ScenarioId::SteadyFleet.profile(), ScenarioProfile::default());
        assert_eq!(ScenarioId::BurstDelivery.profile().sub_batches, 5);
        assert!(ScenarioId::AnonymousDrift.profile().anonymous_fraction > 0.0);
    }
}
