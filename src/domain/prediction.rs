use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::Outcome;

/// A named, orderable bundle of matches predicted as a unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slip {
    pub id: Uuid,
    pub name: String,
    pub closes_at: DateTime<Utc>,
    pub entry_cost: Decimal,
    pub position: i32,
}

/// One user's pick set for one slip. At most one row per (user, slip);
/// re-submission overwrites the picks map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slip_id: Uuid,
    /// match id -> picked outcome
    pub picks: HashMap<i64, Outcome>,
    /// Written exclusively by the settlement engine.
    pub points: Option<i32>,
    pub submitted_at: DateTime<Utc>,
}

/// Score a pick set against known results. Matches absent from the
/// results map are excluded, not scored as wrong, so a slip can settle
/// partially and converge as more results arrive.
pub fn score_picks(
    picks: &HashMap<i64, Outcome>,
    results: &HashMap<i64, Outcome>,
    points_exact: i32,
) -> i32 {
    let correct = picks
        .iter()
        .filter(|&(match_id, pick)| results.get(match_id) == Some(pick))
        .count();
    correct as i32 * points_exact
}

/// One row of a ranking view
#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub total_points: i64,
    /// Tie-break key: earlier first submission ranks first among equal
    /// totals.
    pub first_submitted_at: Option<DateTime<Utc>>,
}
