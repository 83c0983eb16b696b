//! Fault-injection scenarios for DST.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SYN-001: every peer deploys, every replica and board agrees
    ReplicaConvergence,

    /// SYN-002: crossing a round boundary purges every board
    RoundBoundary,

    /// SYN-003: a deploy acknowledged but never landed is evicted and reported
    OptimisticTimeout,

    /// SYN-004: ledger reads fail; boards hold their last good state
    LedgerOutage,

    /// SYN-005: replicas split in two; the ledger keeps boards in agreement
    SplitBrain,

    /// SYN-006: reads issued before a boundary land after it and are dropped
    StaleRead,

    /// SYN-007: multi-select, one batched trigger, scores and replicas follow
    BatchTrigger,

    /// SYN-008: heavy pub/sub loss and jitter; ledger reads still converge
    LossyChannel,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::ReplicaConvergence,
            ScenarioId::RoundBoundary,
            ScenarioId::OptimisticTimeout,
            ScenarioId::LedgerOutage,
            ScenarioId::SplitBrain,
            ScenarioId::StaleRead,
            ScenarioId::BatchTrigger,
            ScenarioId::LossyChannel,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::ReplicaConvergence => "replica_convergence",
            ScenarioId::RoundBoundary => "round_boundary",
            ScenarioId::OptimisticTimeout => "optimistic_timeout",
            ScenarioId::LedgerOutage => "ledger_outage",
            ScenarioId::SplitBrain => "split_brain",
            ScenarioId::StaleRead => "stale_read",
            ScenarioId::BatchTrigger => "batch_trigger",
            ScenarioId::LossyChannel => "lossy_channel",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::ReplicaConvergence => "All peers deploy; replicas and displayed boards match the ledger",
            ScenarioId::RoundBoundary => "Run across a round boundary; boards, selections and markers are purged",
            ScenarioId::OptimisticTimeout => "Ledger swallows a write; optimistic entry expires after 20s",
            ScenarioId::LedgerOutage => "Ledger down for 10s; banner shown, last good board kept, then cleared",
            ScenarioId::SplitBrain => "Pub/sub partitioned in halves; ledger reads keep boards in agreement",
            ScenarioId::StaleRead => "3s ledger latency across a boundary; late reads are discarded",
            ScenarioId::BatchTrigger => "Select three reactors, trigger in one write, score and replicas update",
            ScenarioId::LossyChannel => "30% loss and 200ms jitter on pub/sub; boards still converge",
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
            "replica_convergence" | "convergence" | "syn-001" => Ok(ScenarioId::ReplicaConvergence),
            "round_boundary" | "boundary" | "syn-002" => Ok(ScenarioId::RoundBoundary),
            "optimistic_timeout" | "timeout" | "syn-003" => Ok(ScenarioId::OptimisticTimeout),
            "ledger_outage" | "outage" | "syn-004" => Ok(ScenarioId::LedgerOutage),
            "split_brain" | "splitbrain" | "syn-005" => Ok(ScenarioId::SplitBrain),
            "stale_read" | "staleread" | "syn-006" => Ok(ScenarioId::StaleRead),
            "batch_trigger" | "trigger" | "syn-007" => Ok(ScenarioId::BatchTrigger),
            "lossy_channel" | "lossy" | "syn-008" => Ok(ScenarioId::LossyChannel),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>(), Ok(scenario));
            assert_eq!(scenario.to_string(), scenario.name());
        }
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!("SYN-006".parse::<ScenarioId>(), Ok(ScenarioId::StaleRead));
        assert_eq!("Outage".parse::<ScenarioId>(), Ok(ScenarioId::LedgerOutage));
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
