//! Fixture synchronization engine.
//!
//! The upstream plan cannot query future seasons by league, so a cycle
//! scans a fixed day window (3 days back through 14 days forward by
//! default), one date-scoped call per day, and filters each day's
//! fixtures down to the tracked leagues. Correctness rests on the
//! idempotent merge keyed by the provider fixture id: re-running the
//! window any number of times converges to the same rows, which is what
//! makes a full re-scan acceptable instead of incremental diffing.
//!
//! The daily call budget is scarce. An adaptive cache TTL gates every
//! cycle (10 minutes while the tournament plays today, 24 hours
//! otherwise), tournaments and days are walked sequentially with no
//! fan-out, and there is no in-process retry loop; a failed day waits
//! for the next scheduled invocation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapters::{ApiFixture, FixtureProvider};
use crate::config::SyncConfig;
use crate::domain::{MatchStatus, MatchUpsert, Outcome, Tournament};
use crate::error::{ProdeError, Result};

/// Where a sync cycle got its answer from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncSource {
    Cache,
    Api,
}

/// Outcome of one sync cycle
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncReport {
    pub source: SyncSource,
    pub merged: usize,
}

impl SyncReport {
    fn cache_hit() -> Self {
        Self {
            source: SyncSource::Cache,
            merged: 0,
        }
    }
}

/// Per-tournament entry of a full cron cycle
#[derive(Debug)]
pub struct CycleEntry {
    pub tournament: String,
    pub report: std::result::Result<SyncReport, String>,
}

/// Adaptive freshness policy: fixtures of a tournament playing today
/// must track near-real-time scores, fixtures far out barely change.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    live_ttl: Duration,
    idle_ttl: Duration,
}

impl CachePolicy {
    pub fn new(live_ttl: Duration, idle_ttl: Duration) -> Self {
        Self { live_ttl, idle_ttl }
    }

    pub fn from_config(cfg: &SyncConfig) -> Self {
        Self::new(
            Duration::minutes(cfg.live_ttl_minutes as i64),
            Duration::hours(cfg.idle_ttl_hours as i64),
        )
    }

    pub fn ttl(&self, has_match_today: bool) -> Duration {
        if has_match_today {
            self.live_ttl
        } else {
            self.idle_ttl
        }
    }

    /// True when a sync is due. A tournament that has never synced is
    /// always due.
    pub fn is_due(
        &self,
        last_synced_at: Option<DateTime<Utc>>,
        has_match_today: bool,
        now: DateTime<Utc>,
    ) -> bool {
        match last_synced_at {
            None => true,
            Some(last) => now - last >= self.ttl(has_match_today),
        }
    }
}

/// Store operations the sync engine needs. `PostgresStore` implements
/// this; tests substitute an in-memory fake.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn tournament(&self, id: Uuid) -> Result<Option<Tournament>>;

    async fn active_tournaments(&self) -> Result<Vec<Tournament>>;

    async fn count_matches_between(
        &self,
        tournament_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64>;

    async fn upsert_match(&self, record: &MatchUpsert) -> Result<i64>;

    async fn mark_tournaments_synced(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()>;
}

/// UTC bounds of the server-local calendar day containing `now`
pub fn local_day_bounds(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let day = now.with_timezone(&Local).date_naive();
    (local_midnight_utc(day), local_midnight_utc(day + Duration::days(1)))
}

fn local_midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    let naive = day.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| DateTime::from_naive_utc_and_offset(naive, Utc))
}

/// Translate a provider fixture into a merge payload for a tournament.
pub fn fixture_to_record(tournament_id: Uuid, fixture: &ApiFixture) -> MatchUpsert {
    MatchUpsert {
        tournament_id,
        external_id: fixture.fixture.id,
        home_team: fixture.teams.home.name.clone(),
        away_team: fixture.teams.away.name.clone(),
        kickoff: fixture.fixture.date,
        status: MatchStatus::from_provider_code(&fixture.fixture.status.short),
        home_goals: fixture.goals.home,
        away_goals: fixture.goals.away,
        result: Outcome::from_goals(fixture.goals.home, fixture.goals.away),
        round: fixture.league.round.clone(),
        season: fixture.league.season,
    }
}

/// Day-windowed fixture sync over a provider and a match store
pub struct FixtureSync<P, S> {
    provider: P,
    store: S,
    policy: CachePolicy,
    back_days: i64,
    forward_days: i64,
}

impl<P: FixtureProvider, S: SyncStore> FixtureSync<P, S> {
    pub fn new(provider: P, store: S, cfg: &SyncConfig) -> Self {
        Self {
            provider,
            store,
            policy: CachePolicy::from_config(cfg),
            back_days: cfg.back_days as i64,
            forward_days: cfg.forward_days as i64,
        }
    }

    /// Sync one tournament. A cache hit short-circuits with zero
    /// external calls; a miss triggers the full window scan, which
    /// merges fixtures for every tracked tournament at once.
    pub async fn sync_tournament(&self, id: Uuid) -> Result<SyncReport> {
        let tournament = self
            .store
            .tournament(id)
            .await?
            .ok_or_else(|| ProdeError::NotFound(format!("tournament {id}")))?;

        if !tournament.is_tracked() {
            warn!(
                tournament = %tournament.name,
                "tournament is inactive or has no league mapping; skipping"
            );
            return Ok(SyncReport::cache_hit());
        }

        let now = Utc::now();
        let (day_start, day_end) = local_day_bounds(now);
        let has_match_today = self
            .store
            .count_matches_between(id, day_start, day_end)
            .await?
            > 0;

        if !self
            .policy
            .is_due(tournament.last_synced_at, has_match_today, now)
        {
            debug!(
                tournament = %tournament.name,
                live = has_match_today,
                "cache hit; skipping provider"
            );
            return Ok(SyncReport::cache_hit());
        }

        info!(
            tournament = %tournament.name,
            live = has_match_today,
            "cache miss; scanning fixture window"
        );

        let merged = self.scan_window().await?;
        Ok(SyncReport {
            source: SyncSource::Api,
            merged,
        })
    }

    /// Run one cycle over every active tournament, sequentially. A
    /// missing credential aborts the whole cycle; any other failure is
    /// recorded and the loop continues.
    pub async fn sync_all(&self) -> Result<Vec<CycleEntry>> {
        let tournaments = self.store.active_tournaments().await?;
        if tournaments.is_empty() {
            info!("no active tournaments to sync");
            return Ok(Vec::new());
        }

        let mut entries = Vec::with_capacity(tournaments.len());
        for tournament in tournaments {
            match self.sync_tournament(tournament.id).await {
                Ok(report) => entries.push(CycleEntry {
                    tournament: tournament.name,
                    report: Ok(report),
                }),
                Err(err @ ProdeError::Configuration(_)) => return Err(err),
                Err(err) => {
                    error!(tournament = %tournament.name, error = %err, "sync failed");
                    entries.push(CycleEntry {
                        tournament: tournament.name,
                        report: Err(err.to_string()),
                    });
                }
            }
        }

        Ok(entries)
    }

    /// Scan the day window and merge every fixture belonging to a
    /// tracked league. Returns the number of merged rows.
    async fn scan_window(&self) -> Result<usize> {
        let tracked: Vec<Tournament> = self
            .store
            .active_tournaments()
            .await?
            .into_iter()
            .filter(Tournament::is_tracked)
            .collect();

        let league_index: HashMap<i64, Uuid> = tracked
            .iter()
            .filter_map(|t| t.league_id.map(|league| (league, t.id)))
            .collect();

        if league_index.is_empty() {
            warn!("no tracked tournaments with a league mapping; nothing to scan");
            return Ok(0);
        }

        let today = Utc::now().with_timezone(&Local).date_naive();
        let mut merged = 0usize;
        let mut days_ok = 0u32;

        for offset in -self.back_days..self.forward_days {
            let date = today + Duration::days(offset);

            let fixtures = match self.provider.fixtures_by_date(date).await {
                Ok(fixtures) => fixtures,
                // Nothing to retry without a credential; abort the cycle.
                Err(err @ ProdeError::Configuration(_)) => return Err(err),
                Err(ProdeError::ProviderLogic(msg)) => {
                    // Usually budget exhaustion, not a network blip.
                    warn!(%date, error = %msg, "provider reported a logical failure; skipping day");
                    continue;
                }
                Err(ProdeError::Transport(msg)) => {
                    warn!(%date, error = %msg, "transport failure; skipping day");
                    continue;
                }
                Err(err) => return Err(err),
            };

            days_ok += 1;

            let mut day_merged = 0usize;
            for fixture in &fixtures {
                let Some(tournament_id) = league_index.get(&fixture.league.id) else {
                    continue;
                };
                let record = fixture_to_record(*tournament_id, fixture);
                self.store.upsert_match(&record).await?;
                day_merged += 1;
            }

            merged += day_merged;
            debug!(%date, fetched = fixtures.len(), merged = day_merged, "day scanned");
        }

        // The scan served every tracked tournament; stamp them all, but
        // only when at least one day actually succeeded.
        if days_ok > 0 {
            let ids: Vec<Uuid> = league_index.values().copied().collect();
            self.store.mark_tournaments_synced(&ids, Utc::now()).await?;
        }

        info!(merged, days_ok, "fixture window scan finished");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::football_api::{FixtureInfo, FixtureStatusInfo, GoalPair, LeagueInfo, TeamInfo, TeamPair};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const LEAGUE: i64 = 128;

    fn tournament(league_id: Option<i64>, last_synced_at: Option<DateTime<Utc>>) -> Tournament {
        Tournament {
            id: Uuid::new_v4(),
            name: "Liga Profesional".to_string(),
            league_id,
            season: 2026,
            is_active: true,
            last_synced_at,
        }
    }

    fn api_fixture(id: i64, league: i64, date: DateTime<Utc>) -> ApiFixture {
        ApiFixture {
            fixture: FixtureInfo {
                id,
                date,
                status: FixtureStatusInfo {
                    short: "NS".to_string(),
                    long: None,
                    elapsed: None,
                },
            },
            league: LeagueInfo {
                id: league,
                name: None,
                season: Some(2026),
                round: Some("Fecha 1".to_string()),
            },
            teams: TeamPair {
                home: TeamInfo {
                    id: 1,
                    name: "Home".to_string(),
                },
                away: TeamInfo {
                    id: 2,
                    name: "Away".to_string(),
                },
            },
            goals: GoalPair {
                home: None,
                away: None,
            },
        }
    }

    fn noon_utc(date: NaiveDate) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(date.and_time(NaiveTime::MIN) + Duration::hours(12), Utc)
    }

    enum Failure {
        Transport,
        Logic,
        Credential,
    }

    #[derive(Default)]
    struct FakeProvider {
        fixtures: HashMap<NaiveDate, Vec<ApiFixture>>,
        failures: HashMap<NaiveDate, Failure>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FixtureProvider for &FakeProvider {
        async fn fixtures_by_date(&self, date: NaiveDate) -> Result<Vec<ApiFixture>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.failures.get(&date) {
                return Err(match failure {
                    Failure::Transport => ProdeError::Transport("HTTP 500".to_string()),
                    Failure::Logic => {
                        ProdeError::ProviderLogic("requests: daily quota reached".to_string())
                    }
                    Failure::Credential => {
                        ProdeError::Configuration("API key is not configured".to_string())
                    }
                });
            }
            Ok(self.fixtures.get(&date).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct FakeStore {
        tournaments: Mutex<Vec<Tournament>>,
        matches: Mutex<HashMap<i64, MatchUpsert>>,
        stamps: Mutex<Vec<Vec<Uuid>>>,
        match_today: bool,
    }

    impl FakeStore {
        fn with_tournaments(tournaments: Vec<Tournament>, match_today: bool) -> Self {
            Self {
                tournaments: Mutex::new(tournaments),
                match_today,
                ..Default::default()
            }
        }

        fn merged_rows(&self) -> usize {
            self.matches.lock().expect("lock").len()
        }

        fn stamp_count(&self) -> usize {
            self.stamps.lock().expect("lock").len()
        }
    }

    #[async_trait]
    impl SyncStore for &FakeStore {
        async fn tournament(&self, id: Uuid) -> Result<Option<Tournament>> {
            Ok(self
                .tournaments
                .lock()
                .expect("lock")
                .iter()
                .find(|t| t.id == id)
                .cloned())
        }

        async fn active_tournaments(&self) -> Result<Vec<Tournament>> {
            Ok(self
                .tournaments
                .lock()
                .expect("lock")
                .iter()
                .filter(|t| t.is_active)
                .cloned()
                .collect())
        }

        async fn count_matches_between(
            &self,
            _tournament_id: Uuid,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<i64> {
            Ok(if self.match_today { 1 } else { 0 })
        }

        async fn upsert_match(&self, record: &MatchUpsert) -> Result<i64> {
            let mut matches = self.matches.lock().expect("lock");
            matches.insert(record.external_id, record.clone());
            Ok(record.external_id)
        }

        async fn mark_tournaments_synced(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<()> {
            self.stamps.lock().expect("lock").push(ids.to_vec());
            let mut tournaments = self.tournaments.lock().expect("lock");
            for t in tournaments.iter_mut() {
                if ids.contains(&t.id) {
                    t.last_synced_at = Some(at);
                }
            }
            Ok(())
        }
    }

    fn engine<'a>(
        provider: &'a FakeProvider,
        store: &'a FakeStore,
        back: u32,
        forward: u32,
    ) -> FixtureSync<&'a FakeProvider, &'a FakeStore> {
        FixtureSync::new(
            provider,
            store,
            &SyncConfig {
                back_days: back,
                forward_days: forward,
                live_ttl_minutes: 10,
                idle_ttl_hours: 24,
            },
        )
    }

    #[test]
    fn cache_policy_truth_table() {
        let policy = CachePolicy::new(Duration::minutes(10), Duration::hours(24));
        let now = Utc::now();

        // Stale beyond the idle TTL, nothing today: due.
        assert!(policy.is_due(Some(now - Duration::hours(25)), false, now));
        // Fresh for the idle TTL but a match today shortens it: due.
        assert!(policy.is_due(Some(now - Duration::hours(5)), true, now));
        // Fresh, nothing today: not due.
        assert!(!policy.is_due(Some(now - Duration::hours(5)), false, now));
        // Never synced: always due.
        assert!(policy.is_due(None, false, now));
        // Inside the live TTL: not due even on a match day.
        assert!(!policy.is_due(Some(now - Duration::minutes(5)), true, now));
    }

    #[tokio::test]
    async fn window_scan_merges_tracked_fixtures_and_stamps_once() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        provider.fixtures.insert(
            today - Duration::days(1),
            vec![
                api_fixture(1, LEAGUE, noon_utc(today - Duration::days(1))),
                api_fixture(2, LEAGUE, noon_utc(today - Duration::days(1))),
            ],
        );
        provider.fixtures.insert(
            today + Duration::days(2),
            vec![
                api_fixture(3, LEAGUE, noon_utc(today + Duration::days(2))),
                api_fixture(4, LEAGUE, noon_utc(today + Duration::days(2))),
                // Untracked league is filtered out
                api_fixture(900, 999, noon_utc(today + Duration::days(2))),
            ],
        );
        provider.fixtures.insert(
            today + Duration::days(5),
            vec![api_fixture(5, LEAGUE, noon_utc(today + Duration::days(5)))],
        );

        let t = tournament(Some(LEAGUE), None);
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 3, 14);
        let report = sync.sync_tournament(id).await.expect("sync must succeed");

        assert_eq!(report.source, SyncSource::Api);
        assert_eq!(report.merged, 5);
        assert_eq!(store.merged_rows(), 5);
        // One call per day of the 17-day window
        assert_eq!(provider.calls(), 17);
        // The timestamp is touched exactly once, at the end
        assert_eq!(store.stamp_count(), 1);
    }

    #[tokio::test]
    async fn rescanning_the_window_converges() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        provider.fixtures.insert(
            today,
            vec![
                api_fixture(10, LEAGUE, noon_utc(today)),
                api_fixture(11, LEAGUE, noon_utc(today)),
            ],
        );

        let t = tournament(Some(LEAGUE), None);
        let store = FakeStore::with_tournaments(vec![t], false);
        let sync = engine(&provider, &store, 3, 14);

        let first = sync.scan_window().await.expect("first scan");
        let second = sync.scan_window().await.expect("second scan");

        assert_eq!(first, 2);
        assert_eq!(second, 2);
        // Same upstream payload, same rows: no duplicates
        assert_eq!(store.merged_rows(), 2);
    }

    #[tokio::test]
    async fn provider_logic_failure_skips_only_that_day() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        for (offset, id) in [(0i64, 20), (1, 21), (3, 22), (4, 23)] {
            provider.fixtures.insert(
                today + Duration::days(offset),
                vec![api_fixture(id, LEAGUE, noon_utc(today + Duration::days(offset)))],
            );
        }
        provider
            .failures
            .insert(today + Duration::days(2), Failure::Logic);

        let t = tournament(Some(LEAGUE), None);
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 0, 5);
        let report = sync.sync_tournament(id).await.expect("cycle must survive");

        assert_eq!(report.merged, 4);
        assert_eq!(store.merged_rows(), 4);
        assert_eq!(store.stamp_count(), 1);
    }

    #[tokio::test]
    async fn transport_failure_skips_only_that_day() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        provider.fixtures.insert(
            today + Duration::days(1),
            vec![api_fixture(30, LEAGUE, noon_utc(today + Duration::days(1)))],
        );
        provider.failures.insert(today, Failure::Transport);

        let t = tournament(Some(LEAGUE), None);
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 0, 2);
        let report = sync.sync_tournament(id).await.expect("cycle must survive");

        assert_eq!(report.merged, 1);
    }

    #[tokio::test]
    async fn missing_credential_aborts_the_cycle() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        provider
            .failures
            .insert(today - Duration::days(3), Failure::Credential);

        let t = tournament(Some(LEAGUE), None);
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 3, 14);
        let err = sync.sync_tournament(id).await.expect_err("must abort");

        assert!(matches!(err, ProdeError::Configuration(_)));
        assert_eq!(store.stamp_count(), 0);
    }

    #[tokio::test]
    async fn cache_hit_makes_zero_provider_calls() {
        let provider = FakeProvider::default();
        let t = tournament(Some(LEAGUE), Some(Utc::now() - Duration::hours(5)));
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 3, 14);
        let report = sync.sync_tournament(id).await.expect("cache hit");

        assert_eq!(report.source, SyncSource::Cache);
        assert_eq!(report.merged, 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn match_today_shortens_the_ttl() {
        let provider = FakeProvider::default();
        // 5 hours is fresh for the idle TTL but stale for the live one
        let t = tournament(Some(LEAGUE), Some(Utc::now() - Duration::hours(5)));
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], true);

        let sync = engine(&provider, &store, 0, 1);
        let report = sync.sync_tournament(id).await.expect("sync");

        assert_eq!(report.source, SyncSource::Api);
        assert!(provider.calls() > 0);
    }

    #[tokio::test]
    async fn unknown_tournament_is_not_found() {
        let provider = FakeProvider::default();
        let store = FakeStore::default();

        let sync = engine(&provider, &store, 3, 14);
        let err = sync
            .sync_tournament(Uuid::new_v4())
            .await
            .expect_err("must fail");

        assert!(matches!(err, ProdeError::NotFound(_)));
    }

    #[tokio::test]
    async fn unmapped_tournament_is_skipped_without_calls() {
        let provider = FakeProvider::default();
        let t = tournament(None, None);
        let id = t.id;
        let store = FakeStore::with_tournaments(vec![t], false);

        let sync = engine(&provider, &store, 3, 14);
        let report = sync.sync_tournament(id).await.expect("skip");

        assert_eq!(report.source, SyncSource::Cache);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn sync_all_records_per_tournament_results() {
        let today = Local::now().date_naive();
        let mut provider = FakeProvider::default();
        provider
            .fixtures
            .insert(today, vec![api_fixture(40, LEAGUE, noon_utc(today))]);

        let first = tournament(Some(LEAGUE), None);
        let second = tournament(Some(LEAGUE + 1), Some(Utc::now() - Duration::hours(1)));
        let store = FakeStore::with_tournaments(vec![first, second], false);

        let sync = engine(&provider, &store, 0, 1);
        let entries = sync.sync_all().await.expect("cycle");

        assert_eq!(entries.len(), 2);
        // First tournament was stale and triggered the scan; the scan
        // stamped both, so the second is a cache hit.
        let reports: Vec<_> = entries
            .iter()
            .map(|e| e.report.as_ref().expect("no failures"))
            .collect();
        assert_eq!(reports[0].source, SyncSource::Api);
        assert_eq!(reports[1].source, SyncSource::Cache);
    }

    #[test]
    fn fixture_record_computes_outcome_from_goals() {
        let today = Local::now().date_naive();
        let mut fixture = api_fixture(50, LEAGUE, noon_utc(today));
        fixture.goals = GoalPair {
            home: Some(2),
            away: Some(1),
        };
        fixture.fixture.status.short = "FT".to_string();

        let record = fixture_to_record(Uuid::new_v4(), &fixture);
        assert_eq!(record.result, Some(Outcome::Home));
        assert_eq!(record.status, MatchStatus::Finished);
        assert_eq!(record.external_id, 50);
    }
}
