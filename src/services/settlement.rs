//! Settlement engine.
//!
//! Once results are known, every prediction of a slip is scored against
//! the matches that have a final outcome. Matches without one are
//! excluded uniformly, so a slip may settle partially and settle again
//! later; totals are recomputed from scratch each time, never
//! incremented, which makes re-runs and mid-batch crashes safe.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{score_picks, Match, Outcome, Prediction, Slip};
use crate::error::{ProdeError, Result};

/// Store operations the settlement engine needs. `PostgresStore`
/// implements this; tests substitute an in-memory fake.
#[async_trait]
pub trait SettlementStore: Send + Sync {
    async fn slip(&self, id: Uuid) -> Result<Option<Slip>>;

    async fn matches_for_slip(&self, slip_id: Uuid) -> Result<Vec<Match>>;

    async fn predictions_for_slip(&self, slip_id: Uuid) -> Result<Vec<Prediction>>;

    async fn set_prediction_points(&self, id: Uuid, points: i32) -> Result<()>;
}

/// Outcome of settling one slip
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettlementReport {
    /// Prediction rows whose points were written
    pub settled: usize,
    /// Matches that had a final outcome and entered scoring
    pub scored_matches: usize,
}

pub struct SettlementEngine<S> {
    store: S,
    points_exact: i32,
}

impl<S: SettlementStore> SettlementEngine<S> {
    pub fn new(store: S, points_exact: i32) -> Self {
        Self {
            store,
            points_exact,
        }
    }

    /// Score and persist every prediction of the slip. Administrator-
    /// entered and API-derived outcomes are indistinguishable here. A
    /// failed write on one row is logged and the rest still settle.
    pub async fn settle_slip(&self, slip_id: Uuid) -> Result<SettlementReport> {
        let slip = self
            .store
            .slip(slip_id)
            .await?
            .ok_or_else(|| ProdeError::NotFound(format!("slip {slip_id}")))?;

        let matches = self.store.matches_for_slip(slip_id).await?;
        let results: HashMap<i64, Outcome> = matches
            .iter()
            .filter_map(|m| m.id.zip(m.result))
            .collect();

        debug!(
            slip = %slip.name,
            matches = matches.len(),
            finished = results.len(),
            "settling slip"
        );

        let predictions = self.store.predictions_for_slip(slip_id).await?;
        let mut settled = 0usize;

        for prediction in &predictions {
            let points = score_picks(&prediction.picks, &results, self.points_exact);
            match self
                .store
                .set_prediction_points(prediction.id, points)
                .await
            {
                Ok(()) => settled += 1,
                Err(err) => {
                    warn!(
                        prediction = %prediction.id,
                        user = %prediction.user_id,
                        error = %err,
                        "failed to persist points; continuing with the rest"
                    );
                }
            }
        }

        info!(
            slip = %slip.name,
            settled,
            scored_matches = results.len(),
            "slip settled"
        );

        Ok(SettlementReport {
            settled,
            scored_matches: results.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MatchStatus;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    fn slip(id: Uuid) -> Slip {
        Slip {
            id,
            name: "Fecha 1".to_string(),
            closes_at: Utc::now() + Duration::hours(2),
            entry_cost: rust_decimal_macros::dec!(100),
            position: 1,
        }
    }

    fn finished_match(id: i64, slip_id: Uuid, result: Option<Outcome>) -> Match {
        Match {
            id: Some(id),
            tournament_id: Uuid::new_v4(),
            external_id: id + 9000,
            home_team: format!("Home {id}"),
            away_team: format!("Away {id}"),
            kickoff: Utc::now() - Duration::hours(3),
            status: if result.is_some() {
                MatchStatus::Finished
            } else {
                MatchStatus::NotStarted
            },
            home_goals: None,
            away_goals: None,
            result,
            round: None,
            season: None,
            slip_id: Some(slip_id),
            locked: true,
        }
    }

    fn prediction(slip_id: Uuid, picks: &[(i64, Outcome)]) -> Prediction {
        Prediction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            slip_id,
            picks: picks.iter().copied().collect(),
            points: None,
            submitted_at: Utc::now() - Duration::days(1),
        }
    }

    #[derive(Default)]
    struct FakeStore {
        slips: Vec<Slip>,
        matches: Mutex<Vec<Match>>,
        predictions: Mutex<Vec<Prediction>>,
        points: Mutex<HashMap<Uuid, i32>>,
        fail_for: Option<Uuid>,
    }

    impl FakeStore {
        fn points_of(&self, id: Uuid) -> Option<i32> {
            self.points.lock().expect("lock").get(&id).copied()
        }

        fn finish_match(&self, match_id: i64, result: Outcome) {
            let mut matches = self.matches.lock().expect("lock");
            if let Some(m) = matches.iter_mut().find(|m| m.id == Some(match_id)) {
                m.result = Some(result);
                m.status = MatchStatus::Finished;
            }
        }
    }

    #[async_trait]
    impl SettlementStore for &FakeStore {
        async fn slip(&self, id: Uuid) -> Result<Option<Slip>> {
            Ok(self.slips.iter().find(|s| s.id == id).cloned())
        }

        async fn matches_for_slip(&self, slip_id: Uuid) -> Result<Vec<Match>> {
            Ok(self
                .matches
                .lock()
                .expect("lock")
                .iter()
                .filter(|m| m.slip_id == Some(slip_id))
                .cloned()
                .collect())
        }

        async fn predictions_for_slip(&self, slip_id: Uuid) -> Result<Vec<Prediction>> {
            Ok(self
                .predictions
                .lock()
                .expect("lock")
                .iter()
                .filter(|p| p.slip_id == slip_id)
                .cloned()
                .collect())
        }

        async fn set_prediction_points(&self, id: Uuid, points: i32) -> Result<()> {
            if self.fail_for == Some(id) {
                return Err(ProdeError::Internal("write failed".to_string()));
            }
            self.points.lock().expect("lock").insert(id, points);
            Ok(())
        }
    }

    fn store_with(
        slip_id: Uuid,
        matches: Vec<Match>,
        predictions: Vec<Prediction>,
    ) -> FakeStore {
        FakeStore {
            slips: vec![slip(slip_id)],
            matches: Mutex::new(matches),
            predictions: Mutex::new(predictions),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn partial_settlement_scores_only_finished_matches() {
        let slip_id = Uuid::new_v4();
        let matches = vec![
            finished_match(1, slip_id, Some(Outcome::Home)),
            finished_match(2, slip_id, Some(Outcome::Home)),
            finished_match(3, slip_id, Some(Outcome::Away)),
            finished_match(4, slip_id, None),
        ];
        let p = prediction(
            slip_id,
            &[
                (1, Outcome::Home),
                (2, Outcome::Draw),
                (3, Outcome::Away),
                (4, Outcome::Home),
            ],
        );
        let pid = p.id;
        let store = store_with(slip_id, matches, vec![p]);

        let engine = SettlementEngine::new(&store, 3);
        let report = engine.settle_slip(slip_id).await.expect("settle");

        assert_eq!(report.settled, 1);
        assert_eq!(report.scored_matches, 3);
        // m1 correct, m2 wrong, m3 correct, m4 excluded: 3 + 0 + 3
        assert_eq!(store.points_of(pid), Some(6));
    }

    #[tokio::test]
    async fn resettlement_recomputes_instead_of_adding() {
        let slip_id = Uuid::new_v4();
        let matches = vec![
            finished_match(1, slip_id, Some(Outcome::Home)),
            finished_match(2, slip_id, Some(Outcome::Home)),
            finished_match(3, slip_id, Some(Outcome::Away)),
            finished_match(4, slip_id, None),
        ];
        let p = prediction(
            slip_id,
            &[
                (1, Outcome::Home),
                (2, Outcome::Draw),
                (3, Outcome::Away),
                (4, Outcome::Home),
            ],
        );
        let pid = p.id;
        let store = store_with(slip_id, matches, vec![p]);
        let engine = SettlementEngine::new(&store, 3);

        engine.settle_slip(slip_id).await.expect("first pass");
        assert_eq!(store.points_of(pid), Some(6));

        // The fourth match finishes with the predicted outcome
        store.finish_match(4, Outcome::Home);
        engine.settle_slip(slip_id).await.expect("second pass");

        // Recomputed total, not 6 + 9
        assert_eq!(store.points_of(pid), Some(9));
    }

    #[tokio::test]
    async fn one_failing_row_does_not_abort_the_slip() {
        let slip_id = Uuid::new_v4();
        let matches = vec![finished_match(1, slip_id, Some(Outcome::Draw))];
        let good = prediction(slip_id, &[(1, Outcome::Draw)]);
        let bad = prediction(slip_id, &[(1, Outcome::Home)]);
        let good_id = good.id;
        let bad_id = bad.id;

        let mut store = store_with(slip_id, matches, vec![bad, good]);
        store.fail_for = Some(bad_id);

        let engine = SettlementEngine::new(&store, 3);
        let report = engine.settle_slip(slip_id).await.expect("settle");

        assert_eq!(report.settled, 1);
        assert_eq!(store.points_of(good_id), Some(3));
        assert_eq!(store.points_of(bad_id), None);
    }

    #[tokio::test]
    async fn unknown_slip_is_not_found() {
        let store = FakeStore::default();
        let engine = SettlementEngine::new(&store, 3);

        let err = engine
            .settle_slip(Uuid::new_v4())
            .await
            .expect_err("must fail");
        assert!(matches!(err, ProdeError::NotFound(_)));
    }
}
