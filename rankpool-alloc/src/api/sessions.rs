//! Session API: allocation, ranking, navigation and submission
//!
//! Surveys live in the in-memory registry. A request naming a session
//! whose survey is not open (e.g. after a restart) reopens it from the
//! stored assignment, already submitted if its export file exists.
//! Sessions with no stored assignment are unknown.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rankpool_common::{Error, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{ApiError, ApiResult};
use crate::services::{export_file_name, export_results};
use crate::survey::{
    all_sets_valid, chunk, JudgmentRecord, SurveyError, SurveySession, SurveyView,
};
use crate::types::{BatchLabel, Rank, ResourceId};
use crate::AppState;

/// Assignment plus its batch split
#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub session_id: SessionId,
    pub assignment: Vec<ResourceId>,
    pub batches: Vec<Vec<ResourceId>>,
    pub survey: SurveyView,
}

/// Ranking body: label -> rank, `null` for unselected
#[derive(Debug, Deserialize)]
pub struct RankingRequest {
    pub ranks: BTreeMap<BatchLabel, Option<Rank>>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigateAction {
    Next,
    Previous,
    Restart,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub action: NavigateAction,
}

#[derive(Debug, Serialize)]
pub struct ValidityResponse {
    pub all_sets_valid: bool,
    pub num_sets: usize,
    pub completed_sets: usize,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub session_id: SessionId,
    pub path: PathBuf,
}

fn parse_session(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Get or create the assignment and open its survey
async fn allocate_and_open(state: &AppState, session: &SessionId) -> ApiResult<AssignmentResponse> {
    let assignment = state
        .allocator
        .get_or_create_assignment(session, &state.pool_ids, state.config.n_total, state.config.seed)
        .await?;
    let survey = state
        .registry
        .open(session, &assignment, state.config.set_size)
        .await;

    Ok(AssignmentResponse {
        session_id: session.clone(),
        batches: chunk(&assignment, state.config.set_size),
        assignment,
        survey,
    })
}

/// Make sure a survey is open, reopening it from the store if needed
async fn ensure_survey(state: &AppState, session: &SessionId) -> ApiResult<()> {
    if state.registry.view(session).await.is_some() {
        return Ok(());
    }

    let assignment = state.allocator.store().fetch_assignment(session).await?;
    if assignment.len() != state.config.n_total {
        return Err(ApiError::NotFound(format!("session {}", session)));
    }

    let export_path = state.config.output_dir.join(export_file_name(session));
    if tokio::fs::try_exists(&export_path).await.map_err(Error::from)? {
        tracing::info!(
            session = %session,
            path = %export_path.display(),
            "Reopening submitted survey"
        );
        state
            .registry
            .restore(SurveySession::submitted_at(
                session.clone(),
                &assignment,
                state.config.set_size,
                export_path,
            ))
            .await;
    } else {
        tracing::info!(session = %session, "Reopening survey from stored assignment");
        state
            .registry
            .open(session, &assignment, state.config.set_size)
            .await;
    }
    Ok(())
}

/// Run `f` on the session's survey, reopening it first if needed
async fn with_survey<R>(
    state: &AppState,
    session: &SessionId,
    f: impl FnOnce(&mut SurveySession) -> Result<R, SurveyError>,
) -> ApiResult<R> {
    ensure_survey(state, session).await?;
    let outcome = state
        .registry
        .with_session(session, f)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("session {}", session)))?;
    Ok(outcome?)
}

/// POST /api/sessions
///
/// Issues a new token and allocates its assignment.
pub async fn create_session(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<AssignmentResponse>)> {
    let session = SessionId::generate();
    let response = allocate_and_open(&state, &session).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /api/sessions/:session_id/assignment
///
/// Idempotent for a client-generated token.
pub async fn assign_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<AssignmentResponse>> {
    let session = parse_session(&session_id)?;
    Ok(Json(allocate_and_open(&state, &session).await?))
}

/// GET /api/sessions/:session_id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SurveyView>> {
    let session = parse_session(&session_id)?;
    let view = with_survey(&state, &session, |s| Ok(s.view())).await?;
    Ok(Json(view))
}

/// PUT /api/sessions/:session_id/batches/:set_idx/ranking
///
/// The selection is stored even when rejected, so a client can come back
/// to a half-ranked batch.
pub async fn put_ranking(
    State(state): State<AppState>,
    Path((session_id, set_idx)): Path<(String, usize)>,
    Json(request): Json<RankingRequest>,
) -> ApiResult<Json<JudgmentRecord>> {
    let session = parse_session(&session_id)?;
    let record = with_survey(&state, &session, |s| {
        s.record_ranking(set_idx, request.ranks).cloned()
    })
    .await?;
    Ok(Json(record))
}

/// POST /api/sessions/:session_id/navigate
pub async fn navigate(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<SurveyView>> {
    let session = parse_session(&session_id)?;
    let view = with_survey(&state, &session, |s| {
        match request.action {
            NavigateAction::Next => s.next()?,
            NavigateAction::Previous => s.previous()?,
            NavigateAction::Restart => s.restart()?,
        };
        Ok(s.view())
    })
    .await?;
    Ok(Json(view))
}

/// GET /api/sessions/:session_id/validity
pub async fn get_validity(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ValidityResponse>> {
    let session = parse_session(&session_id)?;
    let response = with_survey(&state, &session, |s| {
        Ok(ValidityResponse {
            all_sets_valid: all_sets_valid(s.answers(), s.num_sets()),
            num_sets: s.num_sets(),
            completed_sets: s.answers().values().filter(|r| r.is_complete()).count(),
        })
    })
    .await?;
    Ok(Json(response))
}

/// POST /api/sessions/:session_id/submit
///
/// The export is written off the registry lock on the blocking pool. The
/// survey only closes if its answers are unchanged once the file is in
/// place.
pub async fn submit_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SubmitResponse>> {
    let session = parse_session(&session_id)?;
    let answers = with_survey(&state, &session, |s| s.submission()).await?;

    let output_dir = state.config.output_dir.clone();
    let exported = answers.clone();
    let export_session = session.clone();
    let path = tokio::task::spawn_blocking(move || {
        export_results(&exported, &export_session, &output_dir)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    let path = with_survey(&state, &session, move |s| s.finish_submit(&answers, path))
        .await?;

    Ok(Json(SubmitResponse {
        session_id: session,
        path,
    }))
}
