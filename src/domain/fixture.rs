use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Final result of a match (1X2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Home => "home",
            Outcome::Draw => "draw",
            Outcome::Away => "away",
        }
    }

    /// Compute the outcome from goal counts. Unset until both goal
    /// counts are known.
    pub fn from_goals(home: Option<i32>, away: Option<i32>) -> Option<Outcome> {
        match (home, away) {
            (Some(h), Some(a)) if h > a => Some(Outcome::Home),
            (Some(h), Some(a)) if a > h => Some(Outcome::Away),
            (Some(_), Some(_)) => Some(Outcome::Draw),
            _ => None,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        // "1"/"X"/"2" are the classic quiniela symbols still used by
        // older clients.
        match raw.trim().to_ascii_lowercase().as_str() {
            "home" | "1" => Ok(Outcome::Home),
            "draw" | "x" => Ok(Outcome::Draw),
            "away" | "2" => Ok(Outcome::Away),
            _ => Err("invalid outcome; expected home|draw|away"),
        }
    }
}

/// Coarse match status derived from the provider's vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    NotStarted,
    InPlay,
    Finished,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::NotStarted => "not_started",
            MatchStatus::InPlay => "in_play",
            MatchStatus::Finished => "finished",
        }
    }

    /// Map the provider's short status codes onto the three states this
    /// pipeline cares about. Unknown codes are treated as not started.
    pub fn from_provider_code(code: &str) -> MatchStatus {
        match code.trim().to_ascii_uppercase().as_str() {
            "1H" | "HT" | "2H" | "ET" | "BT" | "P" | "SUSP" | "INT" | "LIVE" => MatchStatus::InPlay,
            "FT" | "AET" | "PEN" | "AWD" | "WO" => MatchStatus::Finished,
            _ => MatchStatus::NotStarted,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, MatchStatus::Finished)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = &'static str;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "not_started" => Ok(MatchStatus::NotStarted),
            "in_play" => Ok(MatchStatus::InPlay),
            "finished" => Ok(MatchStatus::Finished),
            _ => Err("invalid match status"),
        }
    }
}

/// Why a prediction write was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockReason {
    AlreadyStarted,
    ClosesBeforeKickoff { minutes: i64 },
    ManuallyLocked,
}

impl std::fmt::Display for LockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockReason::AlreadyStarted => write!(f, "the match has already started"),
            LockReason::ClosesBeforeKickoff { minutes } => {
                write!(f, "predictions close {minutes} minutes before kickoff")
            }
            LockReason::ManuallyLocked => write!(f, "the match was locked by an administrator"),
        }
    }
}

/// A tracked competition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    /// Provider league id. Tournaments without one are skipped by sync.
    pub league_id: Option<i64>,
    pub season: i32,
    pub is_active: bool,
    /// Written exclusively by the sync engine on a successful cycle.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Tournament {
    pub fn is_tracked(&self) -> bool {
        self.is_active && self.league_id.is_some()
    }
}

/// One fixture in the canonical match store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Option<i64>,
    pub tournament_id: Uuid,
    /// Provider-assigned fixture id, globally unique. Natural key for
    /// the idempotent merge.
    pub external_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub result: Option<Outcome>,
    pub round: Option<String>,
    pub season: Option<i32>,
    pub slip_id: Option<Uuid>,
    /// Administrator-settable flag, independent of time-based locking.
    /// Never auto-cleared.
    pub locked: bool,
}

impl Match {
    /// Time gate: locked once kickoff is closer than the cutoff.
    pub fn is_time_locked(&self, now: DateTime<Utc>, cutoff: Duration) -> bool {
        self.kickoff - now < cutoff
    }

    /// Combined gate (manual flag OR time), with the most specific
    /// reason first. A match never unlocks once kickoff has passed.
    pub fn lock_reason(&self, now: DateTime<Utc>, cutoff: Duration) -> Option<LockReason> {
        if now >= self.kickoff {
            return Some(LockReason::AlreadyStarted);
        }
        if self.is_time_locked(now, cutoff) {
            return Some(LockReason::ClosesBeforeKickoff {
                minutes: cutoff.num_minutes(),
            });
        }
        if self.locked {
            return Some(LockReason::ManuallyLocked);
        }
        None
    }

    pub fn is_open(&self, now: DateTime<Utc>, cutoff: Duration) -> bool {
        self.lock_reason(now, cutoff).is_none()
    }
}

/// Merge payload for the match store. Carries only the fields a sync
/// cycle owns; the lock flag and slip assignment are never clobbered by
/// a re-scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchUpsert {
    pub tournament_id: Uuid,
    pub external_id: i64,
    pub home_team: String,
    pub away_team: String,
    pub kickoff: DateTime<Utc>,
    pub status: MatchStatus,
    pub home_goals: Option<i32>,
    pub away_goals: Option<i32>,
    pub result: Option<Outcome>,
    pub round: Option<String>,
    pub season: Option<i32>,
}
