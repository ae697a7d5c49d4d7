use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;
use uuid::Uuid;

use crate::domain::{ModuleGrant, ResolvedRule, RuleAssignment, UserGrant};
use crate::error::EngineError;

/// Modules the business is entitled to.
#[derive(Debug, Serialize)]
pub struct ModulesResponse {
    pub business_id: Uuid,
    pub modules: Vec<ModuleGrant>,
}

/// Every visible rule of a business, keyed by rule key.
#[derive(Debug, Serialize)]
pub struct RulesResponse {
    pub business_id: Uuid,
    pub rules: BTreeMap<String, ResolvedRule>,
}

/// An assignment together with its rule key.
#[derive(Debug, Serialize)]
pub struct AssignmentResponse {
    pub key: String,
    #[serde(flatten)]
    pub assignment: RuleAssignment,
}

#[derive(Debug, Serialize)]
pub struct UnassignResponse {
    pub key: String,
    pub removed: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionCheckResponse {
    pub permission: String,
    pub granted: bool,
}

#[derive(Debug, Serialize)]
pub struct PermissionsResponse {
    pub business_id: Uuid,
    pub permissions: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct UserGrantResponse {
    pub permission: String,
    #[serde(flatten)]
    pub grant: UserGrant,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub plans: usize,
    pub rule_templates: usize,
    pub permissions: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ErrorResponse::new(message, "UNAUTHENTICATED")
    }
}

/// HTTP status for an engine error.
pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::ModuleNotEntitled { .. } | EngineError::PermissionDenied { .. } => {
            StatusCode::FORBIDDEN
        }
        EngineError::InvalidInput { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::AlreadyAssigned { .. } => StatusCode::CONFLICT,
        EngineError::InvalidStoredValue { .. } | EngineError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = status_for(&self);

        let message = match &self {
            EngineError::Storage(e) => {
                error!(error = %e, "Storage failure");
                "internal storage error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorResponse::new(message, self.code()))).into_response()
    }
}
