use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use super::audit::AuditTrail;
use super::domain::{Actor, ActorRole, PipelineState};
use super::notifications::NotificationDispatcher;
use super::repository::{CandidacyRepository, ChargeLedger};
use super::service::{PipelineError, PipelineService, TransitionRequest};
use crate::workflows::billing::PaymentConfirmation;
use crate::workflows::domain::{CandidacyId, JobId};
use crate::workflows::matching::repository::{CandidatePool, CompetencyStore, JobCatalog};
use crate::workflows::matching::service::{MatchingError, MatchingService};

/// Shared handler state: the pipeline plus the matching service over the same store.
pub struct PipelineApi<S, N> {
    pipeline: Arc<PipelineService<S, N>>,
    matching: Arc<MatchingService<S>>,
}

impl<S, N> PipelineApi<S, N> {
    pub fn new(pipeline: Arc<PipelineService<S, N>>, matching: Arc<MatchingService<S>>) -> Self {
        Self { pipeline, matching }
    }
}

impl<S, N> Clone for PipelineApi<S, N> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            matching: self.matching.clone(),
        }
    }
}

/// Router builder exposing matching, pipeline, reporting and sweep endpoints.
pub fn pipeline_router<S, N>(
    pipeline: Arc<PipelineService<S, N>>,
    matching: Arc<MatchingService<S>>,
) -> Router
where
    S: CandidacyRepository
        + ChargeLedger
        + AuditTrail
        + JobCatalog
        + CandidatePool
        + CompetencyStore
        + 'static,
    N: NotificationDispatcher + 'static,
{
    Router::new()
        .route(
            "/api/v1/jobs/:job_id/candidates",
            get(candidates_handler::<S, N>).post(match_job_handler::<S, N>),
        )
        .route("/api/v1/pairings/:candidacy_id", get(pairing_handler::<S, N>))
        .route(
            "/api/v1/pairings/:candidacy_id/transition",
            post(transition_handler::<S, N>),
        )
        .route(
            "/api/v1/pairings/:candidacy_id/history",
            get(history_handler::<S, N>),
        )
        .route(
            "/api/v1/pairings/:candidacy_id/refund-request",
            post(refund_handler::<S, N>),
        )
        .route(
            "/api/v1/pairings/:candidacy_id/payment",
            post(payment_handler::<S, N>),
        )
        .route("/api/v1/transitions", get(transitions_handler::<S, N>))
        .route(
            "/api/v1/sweeps/warranty",
            post(warranty_sweep_handler::<S, N>),
        )
        .route(
            "/api/v1/sweeps/billing",
            post(billing_sweep_handler::<S, N>),
        )
        .with_state(PipelineApi::new(pipeline, matching))
}

#[derive(Debug, Deserialize)]
pub(crate) struct PairingQuery {
    /// Party whose redacted view to render; omitted means the full internal record.
    #[serde(default)]
    view: Option<ActorRole>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefundRequestBody {
    actor_id: String,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionQuery {
    state: PipelineState,
    #[serde(default)]
    from: Option<DateTime<Utc>>,
    #[serde(default)]
    to: Option<DateTime<Utc>>,
}

/// Read-only ranking for the hiring company; pairings are left untouched.
pub(crate) async fn candidates_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(job_id): Path<u64>,
) -> Response
where
    S: CandidacyRepository + CandidatePool + CompetencyStore + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    let ranking = api
        .matching
        .preview(JobId(job_id))
        .and_then(|result| api.matching.company_ranking(&result));
    match ranking {
        Ok(ranking) => (StatusCode::OK, Json(ranking)).into_response(),
        Err(err) => err.into_response(),
    }
}

/// Runs matching for the job, opening and refreshing its pairings.
pub(crate) async fn match_job_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(job_id): Path<u64>,
) -> Response
where
    S: CandidacyRepository + CandidatePool + CompetencyStore + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api.matching.run_for_company(JobId(job_id)) {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn pairing_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(candidacy_id): Path<u64>,
    Query(query): Query<PairingQuery>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api.pipeline.get(CandidacyId(candidacy_id)) {
        Ok(record) => {
            let role = query.view.unwrap_or(ActorRole::System);
            (StatusCode::OK, Json(record.view_for(role))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn transition_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(candidacy_id): Path<u64>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    let role = request.actor.role;
    match api.pipeline.transition(CandidacyId(candidacy_id), request) {
        Ok(outcome) => (StatusCode::OK, Json(outcome.view_for(role))).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn history_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(candidacy_id): Path<u64>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api.pipeline.history(CandidacyId(candidacy_id)) {
        Ok(history) => (StatusCode::OK, Json(history)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn refund_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(candidacy_id): Path<u64>,
    Json(body): Json<RefundRequestBody>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    let actor = Actor::new(body.actor_id, ActorRole::Company);
    match api
        .pipeline
        .request_refund(CandidacyId(candidacy_id), actor, body.reason)
    {
        Ok(outcome) => {
            (StatusCode::OK, Json(outcome.view_for(ActorRole::Company))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn payment_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Path(candidacy_id): Path<u64>,
    Json(payment): Json<PaymentConfirmation>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api
        .pipeline
        .confirm_payment(CandidacyId(candidacy_id), payment)
    {
        Ok(outcome) => {
            (StatusCode::OK, Json(outcome.view_for(ActorRole::System))).into_response()
        }
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn transitions_handler<S, N>(
    State(api): State<PipelineApi<S, N>>,
    Query(query): Query<TransitionQuery>,
) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    let from = query.from.unwrap_or(DateTime::<Utc>::MIN_UTC);
    let to = query.to.unwrap_or(DateTime::<Utc>::MAX_UTC);
    match api.pipeline.transitions_into(query.state, from, to) {
        Ok(rows) => (StatusCode::OK, Json(rows)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn warranty_sweep_handler<S, N>(State(api): State<PipelineApi<S, N>>) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api.pipeline.sweep_warranties() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => err.into_response(),
    }
}

pub(crate) async fn billing_sweep_handler<S, N>(State(api): State<PipelineApi<S, N>>) -> Response
where
    S: CandidacyRepository + ChargeLedger + AuditTrail + JobCatalog + 'static,
    N: NotificationDispatcher + 'static,
{
    match api.pipeline.sweep_charges() {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(err) => err.into_response(),
    }
}

impl PipelineError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Permission { .. } => StatusCode::FORBIDDEN,
            PipelineError::Precondition(_)
            | PipelineError::ExternalDependency(_)
            | PipelineError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Conflict(_) => StatusCode::CONFLICT,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
            PipelineError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status_code(), Json(payload)).into_response()
    }
}

impl MatchingError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MatchingError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MatchingError::NotFound(_) => StatusCode::NOT_FOUND,
            MatchingError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MatchingError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
        });
        (self.status_code(), Json(payload)).into_response()
    }
}
