use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::api::auth::ensure_cron_authorized;
use crate::api::state::AppState;
use crate::domain::{Match, MatchStatus, Outcome};
use crate::error::ProdeError;
use crate::services::{FixtureSync, LockGate, LockSweeper, SettlementEngine};

fn error_response(err: ProdeError) -> Response {
    let status = match &err {
        ProdeError::NotFound(_) => StatusCode::NOT_FOUND,
        ProdeError::Locked(_) => StatusCode::LOCKED,
        ProdeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProdeError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        ProdeError::Transport(_) | ProdeError::ProviderLogic(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // The lock reason travels with the rejection so the client can
    // render the accurate message (time-based vs manual).
    let body = match &err {
        ProdeError::Locked(reason) => json!({
            "success": false,
            "error": err.to_string(),
            "reason": reason,
        }),
        _ => json!({ "success": false, "error": err.to_string() }),
    };

    (status, Json(body)).into_response()
}

/// Scheduler trigger: run one sync cycle over every active tournament.
pub async fn cron_sync(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) =
        ensure_cron_authorized(&headers, state.config.server.cron_secret.as_deref())
    {
        return rejection.into_response();
    }

    let sync = FixtureSync::new(
        state.client.clone(),
        state.store.clone(),
        &state.config.sync,
    );

    match sync.sync_all().await {
        Ok(entries) => {
            let results: Vec<_> = entries
                .iter()
                .map(|entry| {
                    let result = match &entry.report {
                        Ok(report) => json!({ "success": true, "source": report.source, "merged": report.merged }),
                        Err(error) => json!({ "success": false, "error": error }),
                    };
                    json!({ "tournament": entry.tournament, "result": result })
                })
                .collect();

            Json(json!({ "success": true, "results": results })).into_response()
        }
        Err(err) => error_response(err),
    }
}

/// Scheduler trigger: flip the stored lock flag for imminent matches.
pub async fn cron_lock(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(rejection) =
        ensure_cron_authorized(&headers, state.config.server.cron_secret.as_deref())
    {
        return rejection.into_response();
    }

    let sweeper = LockSweeper::new(state.store.clone(), &state.config.lock);
    match sweeper.run_once().await {
        Ok(locked) => Json(json!({ "success": true, "locked": locked })).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    pub user_id: Uuid,
    pub slip_id: Uuid,
    pub picks: HashMap<i64, Outcome>,
}

/// Prediction submission. The lock gate is evaluated here, server-side
/// at write time; client-supplied lock state is never trusted.
pub async fn submit_prediction(
    State(state): State<AppState>,
    Json(request): Json<PredictionRequest>,
) -> Response {
    if request.picks.is_empty() {
        return error_response(ProdeError::Validation(
            "a prediction needs at least one pick".to_string(),
        ));
    }

    let slip = match state.store.slip(request.slip_id).await {
        Ok(Some(slip)) => slip,
        Ok(None) => {
            return error_response(ProdeError::NotFound(format!("slip {}", request.slip_id)))
        }
        Err(err) => return error_response(err),
    };

    let matches = match state.store.matches_for_slip(slip.id).await {
        Ok(matches) => matches,
        Err(err) => return error_response(err),
    };
    let by_id: HashMap<i64, &Match> = matches.iter().filter_map(|m| m.id.map(|id| (id, m))).collect();

    let gate = LockGate::from_config(&state.config.lock);
    let now = Utc::now();

    for match_id in request.picks.keys() {
        let Some(m) = by_id.get(match_id) else {
            return error_response(ProdeError::Validation(format!(
                "match {match_id} does not belong to slip {}",
                slip.id
            )));
        };
        if let Err(err) = gate.check(m, now) {
            return error_response(err);
        }
    }

    match state
        .store
        .upsert_prediction(request.user_id, request.slip_id, &request.picks, now)
        .await
    {
        Ok(id) => {
            info!(user = %request.user_id, slip = %slip.name, "prediction stored");
            Json(json!({ "success": true, "prediction_id": id })).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub home_goals: i32,
    pub away_goals: i32,
    /// Defaults to finished; admins may mark a match in play instead.
    #[serde(default)]
    pub status: Option<MatchStatus>,
}

/// Administrative result entry, bypassing the sync engine. The outcome
/// is computed exactly as the sync path computes it.
pub async fn enter_match_result(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    Json(request): Json<ResultRequest>,
) -> Response {
    if request.home_goals < 0 || request.away_goals < 0 {
        return error_response(ProdeError::Validation(
            "goal counts must be non-negative".to_string(),
        ));
    }

    let status = request.status.unwrap_or(MatchStatus::Finished);
    let outcome = Outcome::from_goals(Some(request.home_goals), Some(request.away_goals));

    match state
        .store
        .set_match_result(
            match_id,
            request.home_goals,
            request.away_goals,
            status,
            outcome,
        )
        .await
    {
        Ok(0) => error_response(ProdeError::NotFound(format!("match {match_id}"))),
        Ok(_) => {
            info!(match_id, ?outcome, "result entered");
            Json(json!({ "success": true, "result": outcome })).into_response()
        }
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct ManualLockRequest {
    pub locked: bool,
}

/// Administrative manual lock flag, independent of time-based locking.
pub async fn set_match_lock(
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    Json(request): Json<ManualLockRequest>,
) -> Response {
    match state.store.set_manual_lock(match_id, request.locked).await {
        Ok(0) => error_response(ProdeError::NotFound(format!("match {match_id}"))),
        Ok(_) => Json(json!({ "success": true, "locked": request.locked })).into_response(),
        Err(err) => error_response(err),
    }
}

/// Out-of-band settlement trigger, typically after a result entry.
pub async fn settle_slip(State(state): State<AppState>, Path(slip_id): Path<Uuid>) -> Response {
    let engine = SettlementEngine::new(state.store.clone(), state.config.scoring.points_exact);

    match engine.settle_slip(slip_id).await {
        Ok(report) => Json(json!({
            "success": true,
            "count": report.settled,
            "scored_matches": report.scored_matches,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct RankingsQuery {
    #[serde(default)]
    pub slip: Option<Uuid>,
}

/// Leaderboard: settled points summed per user, descending.
pub async fn rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingsQuery>,
) -> Response {
    match state.store.leaderboard(query.slip).await {
        Ok(entries) => Json(json!({ "success": true, "rankings": entries })).into_response(),
        Err(err) => error_response(err),
    }
}

/// Liveness probe
pub async fn health(State(state): State<AppState>) -> Response {
    let database_connected = state.store.ping().await.is_ok();
    let status = if database_connected {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "status": status,
        "uptime_seconds": state.uptime_seconds(),
        "database_connected": database_connected,
    }))
    .into_response()
}
