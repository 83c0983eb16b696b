//! Every scenario, end to end, through the public runner.

use synqblast_sim::scenarios::ScenarioId;
use synqblast_sim::ScenarioRunner;

#[test]
fn test_all_scenarios_pass() {
    let runner = ScenarioRunner::new(42, 3);
    for scenario in ScenarioId::all() {
        let result = runner.run(scenario);
        assert!(
            result.passed,
            "{} failed: {}",
            scenario,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        assert!(result.total_ticks > 0, "{} never stepped", scenario);
    }
}

#[test]
fn test_runs_are_deterministic() {
    let runner = ScenarioRunner::new(7, 4);
    for scenario in [ScenarioId::LossyChannel, ScenarioId::SplitBrain] {
        let first = runner.run(scenario);
        let second = runner.run(scenario);
        assert_eq!(first.passed, second.passed);
        assert_eq!(first.total_ticks, second.total_ticks);
        assert_eq!(first.final_reactor_count, second.final_reactor_count);
        assert_eq!(first.metrics, second.metrics);
    }
}

#[test]
fn test_convergence_across_seeds() {
    for seed in 1..=5 {
        let result = ScenarioRunner::new(seed, 5).run(ScenarioId::LossyChannel);
        assert!(
            result.passed,
            "seed {} failed: {}",
            seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        assert_eq!(result.final_reactor_count, 5);
    }
}

#[test]
fn test_stale_reads_are_counted() {
    let result = ScenarioRunner::new(42, 2).run(ScenarioId::StaleRead);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.metrics.stale_reads >= 2);
    assert_eq!(result.metrics.boundaries, 2);
}

#[test]
fn test_outage_keeps_writes_intact() {
    let result = ScenarioRunner::new(42, 3).run(ScenarioId::LedgerOutage);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.final_reactor_count, 3);
    assert_eq!(result.metrics.confirmations, 3);
    assert_eq!(result.metrics.deploy_failures, 0);
}

#[test]
fn test_timeout_reports_one_failure() {
    let result = ScenarioRunner::new(42, 3).run(ScenarioId::OptimisticTimeout);
    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.final_reactor_count, 0);
    assert_eq!(result.metrics.deploy_failures, 1);
}
