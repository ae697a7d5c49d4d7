use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::response::ErrorResponse;
use crate::domain::Role;
use crate::tenancy::Actor;

pub const USER_HEADER: &str = "x-user-id";
pub const BUSINESS_HEADER: &str = "x-business-id";
pub const ROLE_HEADER: &str = "x-role";

/// The authenticated session, taken from headers set by the gateway.
#[derive(Debug, Clone)]
pub struct ActorHeaders(pub Actor);

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, (StatusCode, Json<ErrorResponse>)> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::unauthenticated(format!("missing {name} header"))),
            )
        })
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, (StatusCode, Json<ErrorResponse>)> {
    let raw = header(parts, name)?;
    raw.parse().map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::unauthenticated(format!("malformed {name} header"))),
        )
    })
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ActorHeaders
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header_uuid(parts, USER_HEADER)?;
        let business_id = header_uuid(parts, BUSINESS_HEADER)?;
        let role = Role::new(header(parts, ROLE_HEADER)?);

        Ok(ActorHeaders(Actor::new(user_id, business_id, role)))
    }
}

/// Body of `PUT /rules/:key`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AssignRequest {
    /// Overrides the server's default assignment mode
    #[serde(default)]
    pub strict: Option<bool>,
}

/// Body of `PATCH /rules/:key`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CustomizeRequest {
    pub value: serde_json::Value,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Body of `PUT /rules/:key/active`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

/// Body of `POST /permissions/check`. Without `user_id` the check is for
/// the caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct PermissionCheckRequest {
    pub permission: String,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub role: Option<String>,
}

impl PermissionCheckRequest {
    /// The user and role to check, if not the caller.
    pub fn subject(&self, actor: &Actor) -> Option<(Uuid, Role)> {
        match (self.user_id, &self.role) {
            (None, None) => None,
            (user_id, role) => Some((
                user_id.unwrap_or(actor.user_id),
                role.as_deref().map(Role::new).unwrap_or_else(|| actor.role.clone()),
            )),
        }
    }
}

/// Body of `PUT /users/:user_id/permissions/:key`.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserGrantRequest {
    pub granted: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn test_actor_from_headers() {
        let user = Uuid::new_v4();
        let business = Uuid::new_v4();
        let request = Request::builder()
            .header(USER_HEADER, user.to_string())
            .header(BUSINESS_HEADER, business.to_string())
            .header(ROLE_HEADER, "manager")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let ActorHeaders(actor) = ActorHeaders::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(actor.user_id, user);
        assert_eq!(actor.business_id, business);
        assert_eq!(actor.role, Role::new("MANAGER"));
    }

    #[tokio::test]
    async fn test_missing_or_malformed_headers_rejected() {
        let request = Request::builder()
            .header(USER_HEADER, "not-a-uuid")
            .header(BUSINESS_HEADER, Uuid::new_v4().to_string())
            .header(ROLE_HEADER, "OWNER")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let (status, _) = ActorHeaders::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();
        assert!(ActorHeaders::from_request_parts(&mut parts, &()).await.is_err());
    }

    #[test]
    fn test_permission_check_subject() {
        let actor = Actor::new(Uuid::new_v4(), Uuid::new_v4(), Role::new("OWNER"));

        let own: PermissionCheckRequest =
            serde_json::from_str(r#"{"permission": "reports.view"}"#).unwrap();
        assert!(own.subject(&actor).is_none());

        let other = Uuid::new_v4();
        let req: PermissionCheckRequest = serde_json::from_value(serde_json::json!({
            "permission": "reports.view",
            "user_id": other,
            "role": "staff"
        }))
        .unwrap();
        assert_eq!(req.subject(&actor), Some((other, Role::new("STAFF"))));
    }
}
