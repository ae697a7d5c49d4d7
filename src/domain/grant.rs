use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-user, per-business exception to the role default for one permission.
///
/// Unique per (user_id, business_id, permission_id). Overrides the role
/// default in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub business_id: Uuid,
    pub permission_id: Uuid,
    pub granted: bool,
    pub granted_by: Uuid,
    pub granted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl UserGrant {
    pub fn new(
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
        granted: bool,
        granted_by: Uuid,
    ) -> Self {
        UserGrant {
            id: Uuid::new_v4(),
            user_id,
            business_id,
            permission_id,
            granted,
            granted_by,
            granted_at: Utc::now(),
            notes: None,
        }
    }
}
