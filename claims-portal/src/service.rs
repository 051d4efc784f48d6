use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post, put},
};
use portal_flow::{GraphError, InMemorySessionStorage, SessionStorage};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info};
use uuid::Uuid;

use crate::backend::{
    BackendError, ClaimsBackend, DocumentStore, GraphQlBackend, HttpDocumentStore,
    InMemoryBackend, InMemoryDocumentStore, RegistrationBackend,
};
use crate::claims::{ClaimEvent, ClaimOutcome, ClaimService, ClaimView, create_flow_runner};
use crate::config::PortalConfig;
use crate::error::PortalError;
use crate::models::{ClaimType, ProviderProfile};
use crate::registration::{
    DraftState, ProgressReport, Registration, RegistrationKind, RegistrationService,
    RegistrationStatus,
};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
const SIGN_IN_PATH: &str = "/auth/sign-in";

type ApiError = (StatusCode, Json<Value>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_body(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "Sign in to continue",
            "redirect": SIGN_IN_PATH
        })),
    )
}

impl From<PortalError> for (StatusCode, Json<Value>) {
    fn from(e: PortalError) -> Self {
        match e {
            PortalError::Validation(field_errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": "Validation failed",
                    "fieldErrors": field_errors
                })),
            ),
            PortalError::NotFound(message) => error_body(StatusCode::NOT_FOUND, message),
            PortalError::Forbidden(message) => error_body(StatusCode::FORBIDDEN, message),
            PortalError::Conflict(message) => error_body(StatusCode::CONFLICT, message),
            PortalError::Backend(BackendError::NotFound(message)) => {
                error_body(StatusCode::NOT_FOUND, message)
            }
            PortalError::Backend(BackendError::Rejected(message)) => {
                error_body(StatusCode::CONFLICT, message)
            }
            PortalError::Backend(e) => {
                error!(error = %e, "Backend call failed");
                error_body(StatusCode::BAD_GATEWAY, e.to_string())
            }
            PortalError::Flow(GraphError::SessionNotFound(id)) => {
                error_body(StatusCode::NOT_FOUND, format!("Session not found: {id}"))
            }
            PortalError::Flow(e) => {
                error!(error = %e, "Claim flow failed");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

/// Signed-in provider id, required on every portal route
fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(unauthorized)
}

fn require_admin(headers: &HeaderMap) -> Result<String, ApiError> {
    let user_id = user_id(headers)?;
    let is_admin = headers
        .get(USER_ROLE_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|role| role.eq_ignore_ascii_case("admin"));
    if !is_admin {
        return Err(error_body(StatusCode::FORBIDDEN, "Admin role required"));
    }
    Ok(user_id)
}

#[derive(Clone)]
pub struct AppState {
    pub claims: ClaimService,
    pub registrations: Arc<RegistrationService>,
}

impl AppState {
    pub fn new(
        claims_backend: Arc<dyn ClaimsBackend>,
        documents: Arc<dyn DocumentStore>,
        registration_backend: Arc<dyn RegistrationBackend>,
        session_storage: Arc<dyn SessionStorage>,
        autosave_debounce: Duration,
    ) -> Self {
        Self::assemble(
            claims_backend,
            documents,
            session_storage,
            RegistrationService::new(registration_backend, autosave_debounce),
        )
    }

    fn assemble(
        claims_backend: Arc<dyn ClaimsBackend>,
        documents: Arc<dyn DocumentStore>,
        session_storage: Arc<dyn SessionStorage>,
        registrations: RegistrationService,
    ) -> Self {
        let runner = create_flow_runner(claims_backend.clone(), documents, session_storage);
        Self {
            claims: ClaimService::new(runner, claims_backend),
            registrations: Arc::new(registrations),
        }
    }

    /// Must be called inside a tokio runtime; it starts the idle autosave sweep
    pub fn from_config(config: &PortalConfig) -> Self {
        let session_storage: Arc<dyn SessionStorage> = Arc::new(InMemorySessionStorage::new());

        let (claims_backend, registration_backend): (
            Arc<dyn ClaimsBackend>,
            Arc<dyn RegistrationBackend>,
        ) = match &config.api_url {
            Some(url) => {
                info!(api_url = %url, "Using portal GraphQL backend");
                let backend = Arc::new(GraphQlBackend::new(url.clone(), config.api_token.clone()));
                let claims: Arc<dyn ClaimsBackend> = backend.clone();
                let registrations: Arc<dyn RegistrationBackend> = backend;
                (claims, registrations)
            }
            None => {
                info!("PORTAL_API_URL not set, using in-memory backend");
                let backend = Arc::new(InMemoryBackend::new());
                let claims: Arc<dyn ClaimsBackend> = backend.clone();
                let registrations: Arc<dyn RegistrationBackend> = backend;
                (claims, registrations)
            }
        };

        let documents: Arc<dyn DocumentStore> = match &config.document_store_url {
            Some(url) => {
                info!(document_store_url = %url, "Using HTTP document store");
                Arc::new(HttpDocumentStore::new(url.clone(), config.api_token.clone()))
            }
            None => {
                info!("DOCUMENT_STORE_URL not set, keeping uploads in memory");
                Arc::new(InMemoryDocumentStore::new())
            }
        };

        let registrations = RegistrationService::new(registration_backend, config.autosave_debounce)
            .with_idle_timeout(config.autosave_idle_timeout);
        let state = Self::assemble(claims_backend, documents, session_storage, registrations);
        RegistrationService::spawn_idle_sweep(&state.registrations, idle_sweep_interval(config));
        state
    }
}

/// Sweep a few times per idle period, but not more than once a second
fn idle_sweep_interval(config: &PortalConfig) -> Duration {
    (config.autosave_idle_timeout / 4).max(Duration::from_secs(1))
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/claims/types", get(claim_types))
        .route("/claims/sessions", post(start_claim))
        .route(
            "/claims/sessions/{id}",
            get(get_claim).delete(cancel_claim),
        )
        .route("/claims/sessions/{id}/events", post(dispatch_event))
        .route("/registrations", post(create_registration))
        .route("/registrations/{id}", get(get_registration))
        .route("/registrations/{id}/draft", put(save_draft))
        .route("/registrations/{id}/progress", get(registration_progress))
        .route("/registrations/{id}/submit", post(submit_registration))
        .route("/admin/registrations", get(list_registrations))
        .route("/admin/registrations/{id}/approve", post(approve_registration))
        .route("/admin/registrations/{id}/reject", post(reject_registration))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn claim_types(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<ClaimType>> {
    user_id(&headers)?;
    Ok(Json(state.claims.claim_types().await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartClaimRequest {
    #[serde(default)]
    is_psna: bool,
}

async fn start_claim(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<StartClaimRequest>>,
) -> Result<(StatusCode, Json<ClaimView>), ApiError> {
    let user_id = user_id(&headers)?;
    let Json(request) = body.unwrap_or_default();
    let view = state
        .claims
        .start(ProviderProfile {
            user_id,
            is_psna: request.is_psna,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_claim(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ClaimView> {
    let user_id = user_id(&headers)?;
    Ok(Json(state.claims.view(&session_id, &user_id).await?))
}

async fn dispatch_event(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(event): Json<ClaimEvent>,
) -> ApiResult<ClaimOutcome> {
    let user_id = user_id(&headers)?;
    info!(session_id = %session_id, event = event.name(), "Claim event received");
    Ok(Json(state.claims.dispatch(&session_id, &user_id, event).await?))
}

async fn cancel_claim(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ClaimView> {
    let user_id = user_id(&headers)?;
    Ok(Json(state.claims.cancel(&session_id, &user_id).await?))
}

#[derive(Debug, Deserialize)]
struct CreateRegistrationRequest {
    kind: RegistrationKind,
    #[serde(default)]
    values: Option<Value>,
}

async fn create_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRegistrationRequest>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let user_id = user_id(&headers)?;
    let values = request.values.unwrap_or_else(|| json!({}));
    let registration = state
        .registrations
        .create(&user_id, request.kind, values)
        .await?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn get_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Registration> {
    let user_id = user_id(&headers)?;
    Ok(Json(state.registrations.get(&id, &user_id).await?))
}

async fn save_draft(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(values): Json<Value>,
) -> ApiResult<DraftState> {
    let user_id = user_id(&headers)?;
    if !values.is_object() {
        return Err(error_body(StatusCode::BAD_REQUEST, "Draft values must be an object"));
    }
    Ok(Json(state.registrations.save_draft(&id, &user_id, values).await?))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgressQuery {
    /// Index of the wizard step on screen
    current_step: Option<usize>,
    /// Comma-separated subsection ids the user has opened
    visited: Option<String>,
}

async fn registration_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ProgressQuery>,
    headers: HeaderMap,
) -> ApiResult<ProgressReport> {
    let user_id = user_id(&headers)?;
    let visited: HashSet<String> = query
        .visited
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();
    let current_step = query.current_step.unwrap_or(0);
    Ok(Json(
        state
            .registrations
            .progress(&id, &user_id, current_step, &visited)
            .await?,
    ))
}

async fn submit_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Registration> {
    let user_id = user_id(&headers)?;
    Ok(Json(state.registrations.submit(&id, &user_id).await?))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_registrations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> ApiResult<Vec<Registration>> {
    require_admin(&headers)?;
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(status) => Some(
            status
                .parse::<RegistrationStatus>()
                .map_err(|e| error_body(StatusCode::BAD_REQUEST, e))?,
        ),
    };
    Ok(Json(state.registrations.list(status).await?))
}

async fn approve_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Registration> {
    let admin = require_admin(&headers)?;
    info!(registration_id = %id, admin = %admin, "Approving registration");
    Ok(Json(state.registrations.approve(&id).await?))
}

#[derive(Debug, Deserialize)]
struct RejectRequest {
    reason: String,
}

async fn reject_registration(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RejectRequest>,
) -> ApiResult<Registration> {
    let admin = require_admin(&headers)?;
    info!(registration_id = %id, admin = %admin, "Rejecting registration");
    Ok(Json(state.registrations.reject(&id, &request.reason).await?))
}
