use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::EngineError;
use crate::rules::AssignMode;

use super::request::{
    ActorHeaders, AssignRequest, CustomizeRequest, PermissionCheckRequest, SetActiveRequest,
    UserGrantRequest,
};
use super::response::{
    AssignmentResponse, ErrorResponse, HealthResponse, ModulesResponse, PermissionCheckResponse,
    PermissionsResponse, ReadyResponse, RulesResponse, UnassignResponse, UserGrantResponse,
};

/// Shared application state.
pub struct AppState {
    pub engine: Engine,

    /// Assignment mode when a request does not say
    pub strict_assign: bool,

    /// Application start time
    pub start_time: Instant,

    /// Application version
    pub version: String,
}

type ApiResult<T> = Result<Json<T>, EngineError>;

/// Create the application router.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/businesses/:business_id/modules", get(handle_modules))
        .route("/v1/businesses/:business_id/rules", get(handle_rules))
        .route(
            "/v1/businesses/:business_id/rules/:key",
            get(handle_rule)
                .put(handle_assign)
                .patch(handle_customize)
                .delete(handle_unassign),
        )
        .route(
            "/v1/businesses/:business_id/rules/:key/active",
            put(handle_set_active),
        )
        .route(
            "/v1/businesses/:business_id/assignments",
            get(handle_assignments),
        )
        .route(
            "/v1/businesses/:business_id/permissions",
            get(handle_permissions),
        )
        .route(
            "/v1/businesses/:business_id/permissions/check",
            post(handle_permission_check),
        )
        .route(
            "/v1/businesses/:business_id/users/:user_id/permissions/:key",
            put(handle_set_user_grant).delete(handle_clear_user_grant),
        )
        .route("/health", get(handle_health))
        .route("/ready", get(handle_ready))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_modules(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path(business_id): Path<Uuid>,
) -> ApiResult<ModulesResponse> {
    let modules = state.engine.module_grants(&actor, business_id).await?;
    Ok(Json(ModulesResponse {
        business_id,
        modules,
    }))
}

async fn handle_rules(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path(business_id): Path<Uuid>,
) -> ApiResult<RulesResponse> {
    let rules = state.engine.resolve_all_rules(&actor, business_id).await?;
    Ok(Json(RulesResponse { business_id, rules }))
}

async fn handle_rule(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, key)): Path<(Uuid, String)>,
) -> ApiResult<crate::domain::ResolvedRule> {
    Ok(Json(state.engine.resolve_rule(&actor, business_id, &key).await?))
}

async fn handle_assign(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, key)): Path<(Uuid, String)>,
    body: Option<Json<AssignRequest>>,
) -> ApiResult<AssignmentResponse> {
    let strict = body
        .and_then(|Json(req)| req.strict)
        .unwrap_or(state.strict_assign);

    let assignment = state
        .engine
        .assign_rule(&actor, business_id, &key, AssignMode::from_strict(strict))
        .await?;

    info!(
        business_id = %business_id,
        rule_key = %key,
        user_id = %actor.user_id,
        "Assign request completed"
    );
    Ok(Json(AssignmentResponse { key, assignment }))
}

async fn handle_customize(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, key)): Path<(Uuid, String)>,
    Json(req): Json<CustomizeRequest>,
) -> ApiResult<AssignmentResponse> {
    let assignment = state
        .engine
        .customize_rule(&actor, business_id, &key, &req.value, req.notes)
        .await?;

    info!(
        business_id = %business_id,
        rule_key = %key,
        user_id = %actor.user_id,
        "Customize request completed"
    );
    Ok(Json(AssignmentResponse { key, assignment }))
}

async fn handle_unassign(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, key)): Path<(Uuid, String)>,
) -> ApiResult<UnassignResponse> {
    let removed = state.engine.unassign_rule(&actor, business_id, &key).await?;
    Ok(Json(UnassignResponse { key, removed }))
}

async fn handle_set_active(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, key)): Path<(Uuid, String)>,
    Json(req): Json<SetActiveRequest>,
) -> ApiResult<AssignmentResponse> {
    let assignment = state
        .engine
        .set_rule_active(&actor, business_id, &key, req.active)
        .await?;
    Ok(Json(AssignmentResponse { key, assignment }))
}

async fn handle_assignments(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path(business_id): Path<Uuid>,
) -> ApiResult<Vec<AssignmentResponse>> {
    let rows = state.engine.list_assignments(&actor, business_id).await?;
    Ok(Json(
        rows.into_iter()
            .map(|(key, assignment)| AssignmentResponse { key, assignment })
            .collect(),
    ))
}

async fn handle_permissions(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path(business_id): Path<Uuid>,
) -> ApiResult<PermissionsResponse> {
    let permissions = state.engine.effective_permissions(&actor, business_id).await?;
    Ok(Json(PermissionsResponse {
        business_id,
        permissions,
    }))
}

async fn handle_permission_check(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path(business_id): Path<Uuid>,
    Json(req): Json<PermissionCheckRequest>,
) -> ApiResult<PermissionCheckResponse> {
    let granted = state
        .engine
        .check_permission(&actor, business_id, req.subject(&actor), &req.permission)
        .await?;
    Ok(Json(PermissionCheckResponse {
        permission: req.permission,
        granted,
    }))
}

async fn handle_set_user_grant(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, user_id, key)): Path<(Uuid, Uuid, String)>,
    Json(req): Json<UserGrantRequest>,
) -> ApiResult<UserGrantResponse> {
    let grant = state
        .engine
        .set_user_grant(&actor, business_id, user_id, &key, req.granted, req.notes)
        .await?;

    info!(
        business_id = %business_id,
        user_id = %user_id,
        permission = %key,
        granted = req.granted,
        granted_by = %actor.user_id,
        "User grant set"
    );
    Ok(Json(UserGrantResponse {
        permission: key,
        grant,
    }))
}

async fn handle_clear_user_grant(
    State(state): State<Arc<AppState>>,
    ActorHeaders(actor): ActorHeaders,
    Path((business_id, user_id, key)): Path<(Uuid, Uuid, String)>,
) -> Result<StatusCode, EngineError> {
    if state
        .engine
        .clear_user_grant(&actor, business_id, user_id, &key)
        .await?
    {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(EngineError::not_found("user grant", key))
    }
}

/// Health check endpoint.
async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint.
async fn handle_ready(State(state): State<Arc<AppState>>) -> axum::response::Response {
    let catalog = state.engine.catalog();
    let (plans, rule_templates, permissions) = match catalog.counts().await {
        Ok(counts) => counts,
        Err(e) => return e.into_response(),
    };

    // A catalog without plans cannot entitle anything
    if plans == 0 {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorResponse::new("Catalog is empty", "NOT_READY")),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        Json(ReadyResponse {
            ready: true,
            plans,
            rule_templates,
            permissions,
        }),
    )
        .into_response()
}

/// Metrics endpoint (Prometheus format).
async fn handle_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = format!(
        r#"# HELP entitlr_uptime_seconds Application uptime in seconds
# TYPE entitlr_uptime_seconds counter
entitlr_uptime_seconds {}

{}"#,
        state.start_time.elapsed().as_secs(),
        state.engine.metrics().to_prometheus(),
    );

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; charset=utf-8",
        )],
        metrics,
    )
}
