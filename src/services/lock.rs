//! Betting-lock engine.
//!
//! Two independent gates, combined with OR: an administrator-set manual
//! flag and a derived time gate on kickoff proximity. The gate is
//! evaluated server-side at write time and never trusts client state.
//! A separate, coarser sweep flips the stored flag shortly before
//! kickoff so that a match stays locked even against client clock skew.

use chrono::{DateTime, Duration, Utc};
use tracing::info;

use crate::adapters::PostgresStore;
use crate::config::LockConfig;
use crate::domain::Match;
use crate::error::{ProdeError, Result};

/// Pure submission gate with the user-facing cutoff (30 minutes by
/// default).
#[derive(Debug, Clone, Copy)]
pub struct LockGate {
    cutoff: Duration,
}

impl LockGate {
    pub fn new(cutoff: Duration) -> Self {
        Self { cutoff }
    }

    pub fn from_config(cfg: &LockConfig) -> Self {
        Self::new(Duration::minutes(cfg.submission_cutoff_minutes))
    }

    pub fn cutoff(&self) -> Duration {
        self.cutoff
    }

    /// Reject a submission against a locked match with the specific
    /// reason; the transition is one-way, a match never reopens.
    pub fn check(&self, m: &Match, now: DateTime<Utc>) -> Result<()> {
        match m.lock_reason(now, self.cutoff) {
            Some(reason) => Err(ProdeError::Locked(reason)),
            None => Ok(()),
        }
    }
}

/// Scheduled batch job flipping the stored flag for imminent matches.
pub struct LockSweeper {
    store: PostgresStore,
    cutoff: Duration,
}

impl LockSweeper {
    pub fn new(store: PostgresStore, cfg: &LockConfig) -> Self {
        Self {
            store,
            cutoff: Duration::minutes(cfg.sweep_cutoff_minutes),
        }
    }

    /// Lock every unlocked match starting inside the sweep cutoff.
    /// Returns the number of flipped rows.
    pub async fn run_once(&self) -> Result<u64> {
        let locked = self
            .store
            .lock_matches_starting_before(Utc::now() + self.cutoff)
            .await?;

        if locked > 0 {
            info!(locked, "locked matches approaching kickoff");
        }

        Ok(locked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LockReason, MatchStatus};
    use uuid::Uuid;

    fn match_starting_in(minutes: i64) -> Match {
        Match {
            id: Some(7),
            tournament_id: Uuid::new_v4(),
            external_id: 7001,
            home_team: "Racing".to_string(),
            away_team: "Independiente".to_string(),
            kickoff: Utc::now() + Duration::minutes(minutes),
            status: MatchStatus::NotStarted,
            home_goals: None,
            away_goals: None,
            result: None,
            round: None,
            season: None,
            slip_id: None,
            locked: false,
        }
    }

    #[test]
    fn gate_accepts_a_match_outside_the_cutoff() {
        let gate = LockGate::from_config(&LockConfig::default());
        assert!(gate.check(&match_starting_in(31), Utc::now()).is_ok());
    }

    #[test]
    fn gate_rejects_inside_the_cutoff_with_the_time_reason() {
        let gate = LockGate::from_config(&LockConfig::default());
        let err = gate
            .check(&match_starting_in(29), Utc::now())
            .expect_err("29 minutes out must be locked");

        match err {
            ProdeError::Locked(LockReason::ClosesBeforeKickoff { minutes }) => {
                assert_eq!(minutes, 30)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gate_rejects_a_started_match_with_the_started_reason() {
        let gate = LockGate::from_config(&LockConfig::default());
        let err = gate
            .check(&match_starting_in(-1), Utc::now())
            .expect_err("a started match must be locked");

        assert!(matches!(
            err,
            ProdeError::Locked(LockReason::AlreadyStarted)
        ));
    }

    #[test]
    fn gate_rejects_a_manually_locked_match_far_from_kickoff() {
        let gate = LockGate::from_config(&LockConfig::default());
        let mut m = match_starting_in(60 * 48);
        m.locked = true;

        let err = gate
            .check(&m, Utc::now())
            .expect_err("manual lock must hold regardless of start time");
        assert!(matches!(err, ProdeError::Locked(LockReason::ManuallyLocked)));
    }
}
