//! HTTP API.
//!
//! Thin JSON layer over [`AppState`]: every handler issues exactly one
//! contest operation. Operator and participant routes are not told apart
//! here; authentication sits in front of this service.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{ContestError, Refusal};
use crate::state::export::StateExport;
use crate::state::{AppState, NewMatch, RoundSummary, RoundView, StartOutcome};
use crate::types::{
    Contest, Entitlement, FinalWinner, LeaderboardEntry, Match, Pick, RoundLockKey, UserRecord,
};

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ContestError {
    fn into_response(self) -> Response {
        let status = match &self {
            ContestError::Rejected(_) => StatusCode::CONFLICT,
            ContestError::NoActiveContest(_)
            | ContestError::MatchNotFound(_)
            | ContestError::NoEntitlement(_) => StatusCode::NOT_FOUND,
            ContestError::Store(e) => {
                tracing::warn!("Store failure: {}", e);
                StatusCode::BAD_GATEWAY
            }
        };
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ContestError>;

/// All API routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/contest", get(current_contest))
        .route("/api/contest/new", post(new_contest))
        .route("/api/contests/{code}", get(get_contest))
        .route("/api/contests/{code}/start", post(start_contest))
        .route("/api/contests/{code}/prize", put(set_prize).delete(clear_prize))
        .route("/api/contests/{code}/ends-at", put(set_ends_at).delete(clear_ends_at))
        .route("/api/contests/{code}/final-week/toggle", post(toggle_final_week))
        .route("/api/contests/{code}/final-winner", post(record_final_winner))
        .route("/api/contests/{code}/matches", post(add_match))
        .route("/api/contests/{code}/matches/{match_id}/off", post(toggle_off))
        .route("/api/contests/{code}/matches/{match_id}/result", put(record_result))
        .route("/api/contests/{code}/matches-lock/toggle", post(toggle_matches_lock))
        .route("/api/contests/{code}/results/lock", post(lock_final_results))
        .route("/api/contests/{code}/rounds/next", post(next_round))
        .route("/api/contests/{code}/leaderboard", get(leaderboard))
        .route("/api/contests/{code}/participants", get(participants))
        .route("/api/contests/{code}/entitlements", get(list_entitlements))
        .route("/api/contests/{code}/entitlements/{username}", post(purchase_jokers))
        .route(
            "/api/contests/{code}/entitlements/{username}/toggle",
            post(toggle_joker),
        )
        .route(
            "/api/contests/{code}/predictions/{username}/{match_id}",
            put(submit_prediction),
        )
        .route("/api/contests/{code}/predictions/{username}/lock", post(lock_picks))
        .route("/api/contests/{code}/round/{username}", get(round_view))
        .route("/api/users", get(list_users))
        .route(
            "/api/next-contest",
            get(next_contest_start)
                .put(set_next_contest_start)
                .delete(clear_next_contest_start),
        )
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
}

async fn current_contest(State(state): State<Arc<AppState>>) -> Response {
    match state.current_contest().await {
        Some(contest) => Json(contest).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "No contest yet".to_string(),
            }),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct NewContestRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub confirm_again: bool,
}

async fn new_contest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewContestRequest>,
) -> Response {
    match state
        .new_contest(req.title, req.confirm, req.confirm_again)
        .await
    {
        Ok(contest) => (StatusCode::CREATED, Json(contest)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn get_contest(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    match state.get_contest(&code).await {
        Some(contest) => Json(contest).into_response(),
        None => ContestError::NoActiveContest(code).into_response(),
    }
}

async fn start_contest(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<StartOutcome> {
    Ok(Json(state.start_contest(&code).await?))
}

#[derive(Debug, Deserialize)]
pub struct PrizeRequest {
    pub text: String,
}

async fn set_prize(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<PrizeRequest>,
) -> ApiResult<Contest> {
    Ok(Json(state.set_prize(&code, &req.text).await?))
}

async fn clear_prize(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Contest> {
    Ok(Json(state.clear_prize(&code).await?))
}

#[derive(Debug, Deserialize)]
pub struct DateRequest {
    pub date: NaiveDate,
}

async fn set_ends_at(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(req): Json<DateRequest>,
) -> ApiResult<Contest> {
    Ok(Json(state.set_ends_at(&code, req.date).await?))
}

async fn clear_ends_at(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Contest> {
    Ok(Json(state.clear_ends_at(&code).await?))
}

async fn toggle_final_week(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Contest> {
    Ok(Json(state.toggle_final_week(&code).await?))
}

async fn record_final_winner(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<FinalWinner> {
    Ok(Json(state.record_final_winner(&code).await?))
}

async fn add_match(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Json(input): Json<NewMatch>,
) -> Response {
    match state.add_match(&code, input).await {
        Ok(m) => (StatusCode::CREATED, Json(m)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn toggle_off(
    State(state): State<Arc<AppState>>,
    Path((code, match_id)): Path<(String, String)>,
) -> ApiResult<Match> {
    Ok(Json(state.toggle_off(&code, &match_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub result: String,
}

async fn record_result(
    State(state): State<Arc<AppState>>,
    Path((code, match_id)): Path<(String, String)>,
    Json(req): Json<ResultRequest>,
) -> ApiResult<Match> {
    Ok(Json(state.record_result(&code, &match_id, &req.result).await?))
}

async fn toggle_matches_lock(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Contest> {
    Ok(Json(state.toggle_matches_lock(&code).await?))
}

async fn lock_final_results(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<RoundSummary> {
    Ok(Json(state.lock_final_results(&code).await?))
}

async fn next_round(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Contest> {
    Ok(Json(state.next_round(&code).await?))
}

async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Vec<LeaderboardEntry>> {
    Ok(Json(state.leaderboard(&code).await?))
}

async fn participants(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<Vec<String>> {
    Ok(Json(state.participants(&code).await?))
}

async fn list_entitlements(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> ApiResult<BTreeMap<String, Entitlement>> {
    Ok(Json(state.list_entitlements(&code).await?))
}

async fn purchase_jokers(
    State(state): State<Arc<AppState>>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<Entitlement> {
    Ok(Json(state.purchase_jokers(&code, &username).await?))
}

#[derive(Debug, Deserialize)]
pub struct JokerRequest {
    pub match_id: String,
}

async fn toggle_joker(
    State(state): State<Arc<AppState>>,
    Path((code, username)): Path<(String, String)>,
    Json(req): Json<JokerRequest>,
) -> ApiResult<Entitlement> {
    Ok(Json(
        state.toggle_joker(&code, &username, &req.match_id).await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct PredictionRequest {
    /// `1`, `X`, `2`, or absent to clear
    #[serde(default)]
    pub pick: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictionResponse {
    pub pick: Option<Pick>,
}

async fn submit_prediction(
    State(state): State<Arc<AppState>>,
    Path((code, username, match_id)): Path<(String, String, String)>,
    Json(req): Json<PredictionRequest>,
) -> ApiResult<PredictionResponse> {
    let pick = req
        .pick
        .as_deref()
        .map(str::parse::<Pick>)
        .transpose()
        .map_err(Refusal::InvalidOutcome)?;
    let pick = state
        .submit_prediction(&code, &username, &match_id, pick)
        .await?;
    Ok(Json(PredictionResponse { pick }))
}

async fn lock_picks(
    State(state): State<Arc<AppState>>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<RoundLockKey> {
    Ok(Json(state.lock_picks(&code, &username).await?))
}

async fn round_view(
    State(state): State<Arc<AppState>>,
    Path((code, username)): Path<(String, String)>,
) -> ApiResult<RoundView> {
    Ok(Json(state.round_view(&code, &username).await?))
}

async fn list_users(State(state): State<Arc<AppState>>) -> ApiResult<Vec<UserRecord>> {
    Ok(Json(state.list_users().await?))
}

#[derive(Debug, Serialize)]
pub struct NextContestResponse {
    pub date: Option<NaiveDate>,
}

async fn next_contest_start(State(state): State<Arc<AppState>>) -> Json<NextContestResponse> {
    Json(NextContestResponse {
        date: state.next_contest_start().await,
    })
}

async fn set_next_contest_start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DateRequest>,
) -> Json<NextContestResponse> {
    state.set_next_contest_start(req.date).await;
    Json(NextContestResponse {
        date: Some(req.date),
    })
}

async fn clear_next_contest_start(State(state): State<Arc<AppState>>) -> StatusCode {
    state.clear_next_contest_start().await;
    StatusCode::NO_CONTENT
}

/// Export the in-memory state as JSON.
///
/// GET /api/state/export
async fn export_state(State(state): State<Arc<AppState>>) -> ApiResult<StateExport> {
    Ok(Json(state.export_state().await?))
}

/// Import a state snapshot, replacing what is in memory.
///
/// POST /api/state/import
async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<StateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
    }
}
