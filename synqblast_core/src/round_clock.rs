//! The "CLOCK" Engine - UTC-anchored round and phase computation.
//!
//! Every client derives the same round and phase from its own wall clock,
//! with no coordination:
//!
//! ```text
//! 00:00:00 UTC                                                 24:00:00
//! |--- round 1 ---|--- round 2 ---| ... |--- round 288 ---|
//!  \
//!   |-- DEPLOY 120s --|-- TRIGGER 120s --|-- SCORING 60s --|
//! ```
//!
//! Phases are a total, left-closed partition of the round: an instant
//! exactly on a cut point belongs to the later phase.

use crate::error::ConfigError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEPLOY_PHASE_SECS: u32 = 120;
pub const TRIGGER_PHASE_SECS: u32 = 120;
pub const SCORING_PHASE_SECS: u32 = 60;
pub const ROUNDS_PER_DAY: u32 = 288;

const MILLIS_PER_DAY: u64 = 86_400_000;

/// One of the three phases of a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Deploy,
    Trigger,
    Scoring,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Deploy, Phase::Trigger, Phase::Scoring];

    /// The phase that follows this one (`Scoring` wraps to `Deploy`).
    pub fn next(self) -> Phase {
        match self {
            Phase::Deploy => Phase::Trigger,
            Phase::Trigger => Phase::Scoring,
            Phase::Scoring => Phase::Deploy,
        }
    }

    pub fn duration(self, schedule: &PhaseSchedule) -> Duration {
        Duration::from_secs(u64::from(schedule.phase_secs(self)))
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::Deploy => "DEPLOY",
            Phase::Trigger => "TRIGGER",
            Phase::Scoring => "SCORING",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Output of the phase clock, recomputed on every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    /// 1-based round of the UTC day
    pub round_number: u32,

    pub phase: Phase,

    /// Whole seconds until the next phase cut point
    pub phase_time_remaining: u32,

    /// Milliseconds elapsed since the start of the round
    pub millis_into_round: u64,
}

impl RoundInfo {
    pub fn seconds_into_round(&self) -> u32 {
        (self.millis_into_round / 1000) as u32
    }
}

/// Phase lengths and rounds per day.
///
/// The defaults are the production schedule; tests and the simulation
/// harness may shorten it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSchedule {
    pub deploy_secs: u32,
    pub trigger_secs: u32,
    pub scoring_secs: u32,
    pub rounds_per_day: u32,
}

impl Default for PhaseSchedule {
    fn default() -> Self {
        Self {
            deploy_secs: DEPLOY_PHASE_SECS,
            trigger_secs: TRIGGER_PHASE_SECS,
            scoring_secs: SCORING_PHASE_SECS,
            rounds_per_day: ROUNDS_PER_DAY,
        }
    }
}

impl PhaseSchedule {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for phase in Phase::ALL {
            if self.phase_secs(phase) == 0 {
                return Err(ConfigError::ZeroPhase(phase));
            }
        }
        if self.rounds_per_day == 0 {
            return Err(ConfigError::invalid("rounds_per_day", "must be at least 1"));
        }
        Ok(())
    }

    pub fn round_duration_secs(&self) -> u32 {
        self.deploy_secs + self.trigger_secs + self.scoring_secs
    }

    pub fn round_duration_ms(&self) -> u64 {
        u64::from(self.round_duration_secs()) * 1000
    }

    pub fn phase_secs(&self, phase: Phase) -> u32 {
        match phase {
            Phase::Deploy => self.deploy_secs,
            Phase::Trigger => self.trigger_secs,
            Phase::Scoring => self.scoring_secs,
        }
    }

    pub fn phase_ms(&self, phase: Phase) -> u64 {
        u64::from(self.phase_secs(phase)) * 1000
    }

    /// Offset of `phase` from the start of its round.
    pub fn phase_offset_ms(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Deploy => 0,
            Phase::Trigger => self.phase_ms(Phase::Deploy),
            Phase::Scoring => self.phase_ms(Phase::Deploy) + self.phase_ms(Phase::Trigger),
        }
    }

    /// Round that follows `round`, wrapping to 1 after the last round of the day.
    pub fn next_round(&self, round: u32) -> u32 {
        if round >= self.rounds_per_day {
            1
        } else {
            round + 1
        }
    }

    /// True when `next` is a later round than `prev`, including the
    /// midnight wrap from the last round back to round 1.
    pub fn is_round_after(&self, prev: u32, next: u32) -> bool {
        next > prev || (prev >= self.rounds_per_day && next == 1)
    }

    /// Computes the round and phase for a UTC instant.
    pub fn compute(&self, now: DateTime<Utc>) -> RoundInfo {
        self.compute_at_millis(now.timestamp_millis().max(0) as u64)
    }

    /// Computes the round and phase for milliseconds since the Unix epoch.
    pub fn compute_at_millis(&self, unix_ms: u64) -> RoundInfo {
        let round_ms = self.round_duration_ms().max(1);
        let since_midnight = unix_ms % MILLIS_PER_DAY;

        let round_index = (since_midnight / round_ms) as u32;
        let round_number = (round_index + 1).min(self.rounds_per_day.max(1));
        let millis_into_round = since_midnight % round_ms;

        let into_secs = (millis_into_round / 1000) as u32;
        let deploy_end = self.deploy_secs;
        let trigger_end = self.deploy_secs + self.trigger_secs;

        let (phase, cut_point) = if into_secs < deploy_end {
            (Phase::Deploy, deploy_end)
        } else if into_secs < trigger_end {
            (Phase::Trigger, trigger_end)
        } else {
            (Phase::Scoring, self.round_duration_secs())
        };

        RoundInfo {
            round_number,
            phase,
            phase_time_remaining: cut_point.saturating_sub(into_secs),
            millis_into_round,
        }
    }
}

/// Computes round info with the production schedule.
pub fn compute_round_info(now: DateTime<Utc>) -> RoundInfo {
    PhaseSchedule::default().compute(now)
}

/// Computes round info with the production schedule from Unix milliseconds.
pub fn compute_round_info_at(unix_ms: u64) -> RoundInfo {
    PhaseSchedule::default().compute_at_millis(unix_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_deploy_window() {
        let info = compute_round_info(at(0, 1, 30));
        assert_eq!(info.round_number, 1);
        assert_eq!(info.phase, Phase::Deploy);
        assert_eq!(info.phase_time_remaining, 30);
    }

    #[test]
    fn test_trigger_window() {
        let info = compute_round_info(at(0, 3, 10));
        assert_eq!(info.round_number, 1);
        assert_eq!(info.phase, Phase::Trigger);
        assert_eq!(info.phase_time_remaining, 50);
        assert_eq!(info.seconds_into_round(), 190);
    }

    #[test]
    fn test_cut_points_belong_to_later_phase() {
        let trigger = compute_round_info(at(0, 2, 0));
        assert_eq!(trigger.phase, Phase::Trigger);
        assert_eq!(trigger.phase_time_remaining, 120);

        let scoring = compute_round_info(at(0, 4, 0));
        assert_eq!(scoring.phase, Phase::Scoring);
        assert_eq!(scoring.phase_time_remaining, 60);

        let next_round = compute_round_info(at(0, 5, 0));
        assert_eq!(next_round.round_number, 2);
        assert_eq!(next_round.phase, Phase::Deploy);
        assert_eq!(next_round.phase_time_remaining, 120);
    }

    #[test]
    fn test_last_second_of_day() {
        let info = compute_round_info(at(23, 59, 59));
        assert_eq!(info.round_number, ROUNDS_PER_DAY);
        assert_eq!(info.phase, Phase::Scoring);
        assert_eq!(info.phase_time_remaining, 1);

        let midnight = compute_round_info(at(0, 0, 0));
        assert_eq!(midnight.round_number, 1);
        assert_eq!(midnight.phase, Phase::Deploy);
    }

    #[test]
    fn test_millis_entry_point_matches_datetime() {
        let now = at(13, 37, 12);
        let by_ms = compute_round_info_at(now.timestamp_millis() as u64);
        assert_eq!(by_ms, compute_round_info(now));
    }

    #[test]
    fn test_round_cap_on_short_schedule() {
        // 2 rounds of 10s cannot cover a day; everything after is capped
        let schedule = PhaseSchedule {
            deploy_secs: 4,
            trigger_secs: 4,
            scoring_secs: 2,
            rounds_per_day: 2,
        };
        let info = schedule.compute(at(12, 0, 0));
        assert_eq!(info.round_number, 2);
    }

    #[test]
    fn test_phase_cycle() {
        assert_eq!(Phase::Deploy.next(), Phase::Trigger);
        assert_eq!(Phase::Trigger.next(), Phase::Scoring);
        assert_eq!(Phase::Scoring.next(), Phase::Deploy);
        assert_eq!(
            Phase::Scoring.duration(&PhaseSchedule::default()),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_next_round_wraps_at_midnight() {
        let schedule = PhaseSchedule::default();
        assert_eq!(schedule.next_round(1), 2);
        assert_eq!(schedule.next_round(ROUNDS_PER_DAY), 1);
        assert!(schedule.is_round_after(5, 6));
        assert!(schedule.is_round_after(ROUNDS_PER_DAY, 1));
        assert!(!schedule.is_round_after(6, 6));
        assert!(!schedule.is_round_after(6, 1));
    }

    #[test]
    fn test_validate_rejects_zero_phase() {
        let schedule = PhaseSchedule {
            trigger_secs: 0,
            ..PhaseSchedule::default()
        };
        assert_eq!(schedule.validate(), Err(ConfigError::ZeroPhase(Phase::Trigger)));
        assert!(PhaseSchedule::default().validate().is_ok());
    }

    #[test]
    fn test_phase_serializes_uppercase() {
        let json = serde_json::to_string(&Phase::Trigger).unwrap();
        assert_eq!(json, "\"TRIGGER\"");
    }

    proptest! {
        #[test]
        fn prop_remaining_within_round(ms in 0u64..4_102_444_800_000u64) {
            let schedule = PhaseSchedule::default();
            let info = schedule.compute_at_millis(ms);
            prop_assert!(info.phase_time_remaining <= schedule.round_duration_secs());
            prop_assert!(info.round_number >= 1 && info.round_number <= ROUNDS_PER_DAY);
            prop_assert!(Phase::ALL.contains(&info.phase));
        }

        #[test]
        fn prop_phase_matches_offset(ms in 0u64..4_102_444_800_000u64) {
            let schedule = PhaseSchedule::default();
            let info = schedule.compute_at_millis(ms);
            let offset = schedule.phase_offset_ms(info.phase);
            prop_assert!(info.millis_into_round >= offset);
            prop_assert!(info.millis_into_round < offset + schedule.phase_ms(info.phase));
        }
    }
}
