//! Permission checks: operator bypass, then the user's override, then the
//! role default, then deny.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::domain::{Role, UserGrant};
use crate::error::EngineResult;
use crate::observability::MetricsRegistry;
use crate::storage::{Storage, StorageError};

/// Permission required to change a business's rule assignments.
pub const MANAGE_RULES: &str = "business_rules.manage";

/// Permission required to change another user's grants.
pub const MANAGE_PERMISSIONS: &str = "permissions.manage";

#[derive(Clone)]
pub struct PermissionResolver {
    catalog: CatalogStore,
    storage: Arc<dyn Storage>,
    metrics: Arc<MetricsRegistry>,
}

impl PermissionResolver {
    pub fn new(catalog: CatalogStore, storage: Arc<dyn Storage>, metrics: Arc<MetricsRegistry>) -> Self {
        PermissionResolver {
            catalog,
            storage,
            metrics,
        }
    }

    /// Whether `user_id`, acting in `business_id` with `role`, holds the
    /// permission.
    ///
    /// The operator role is always granted. A user grant is authoritative in
    /// both directions; the role default applies only when there is none.
    /// Absence of both is a denial. Unknown or inactive permission keys fail
    /// `NotFound`.
    pub async fn is_granted(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        role: &Role,
        key: &str,
    ) -> EngineResult<bool> {
        if role.is_operator() {
            self.metrics.record_permission_check(true);
            return Ok(true);
        }

        let permission = self.catalog.get_permission(key).await?;

        let granted = match self
            .storage
            .get_user_grant(user_id, business_id, permission.id)
            .await?
        {
            Some(grant) => grant.granted,
            None => match self.catalog.get_role_default(role, permission.id).await {
                Ok(default) => default.granted,
                Err(e) if e.is_not_found() => false,
                Err(e) => return Err(e),
            },
        };

        self.metrics.record_permission_check(granted);
        debug!(
            user_id = %user_id,
            business_id = %business_id,
            role = %role,
            permission = key,
            granted = granted,
            "Permission checked"
        );
        Ok(granted)
    }

    /// Every active permission with the user's effective flag.
    pub async fn effective_permissions(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        role: &Role,
    ) -> EngineResult<BTreeMap<String, bool>> {
        let permissions = self.catalog.list_permissions().await?;

        if role.is_operator() {
            return Ok(permissions
                .into_iter()
                .filter(|p| p.active)
                .map(|p| (p.key, true))
                .collect());
        }

        let defaults: HashMap<Uuid, bool> = self
            .catalog
            .list_role_defaults(role)
            .await?
            .into_iter()
            .map(|d| (d.permission_id, d.granted))
            .collect();
        let overrides: HashMap<Uuid, bool> = self
            .storage
            .list_user_grants(user_id, business_id)
            .await?
            .into_iter()
            .map(|g| (g.permission_id, g.granted))
            .collect();

        Ok(permissions
            .into_iter()
            .filter(|p| p.active)
            .map(|p| {
                let granted = overrides
                    .get(&p.id)
                    .or_else(|| defaults.get(&p.id))
                    .copied()
                    .unwrap_or(false);
                (p.key, granted)
            })
            .collect())
    }

    /// Insert or replace the user's override for one permission.
    pub async fn set_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        key: &str,
        granted: bool,
        granted_by: Uuid,
        notes: Option<String>,
    ) -> EngineResult<UserGrant> {
        let permission = self.catalog.get_permission(key).await?;

        let mut grant = UserGrant::new(user_id, business_id, permission.id, granted, granted_by);
        grant.notes = notes;

        let stored = match self.storage.write_user_grant(&grant).await {
            Ok(stored) => stored,
            Err(StorageError::UniqueViolation) => {
                debug!(user_id = %user_id, permission = key, "Concurrent grant, retrying as update");
                self.storage.write_user_grant(&grant).await?
            }
            Err(e) => return Err(e.into()),
        };

        info!(user_id = %user_id, business_id = %business_id, permission = key, granted = granted, "User grant set");
        Ok(stored)
    }

    /// Remove the user's override so the role default applies again.
    pub async fn clear_user_grant(&self, user_id: Uuid, business_id: Uuid, key: &str) -> EngineResult<bool> {
        let permission = self.catalog.get_permission(key).await?;
        let removed = self
            .storage
            .delete_user_grant(user_id, business_id, permission.id)
            .await?;
        if removed {
            info!(user_id = %user_id, business_id = %business_id, permission = key, "User grant cleared");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use std::sync::atomic::Ordering;

    async fn resolver() -> (Fixture, PermissionResolver, Arc<MetricsRegistry>) {
        let fixture = Fixture::new().await;
        let metrics = Arc::new(MetricsRegistry::new());
        let resolver = PermissionResolver::new(fixture.catalog.clone(), fixture.storage(), metrics.clone());
        (fixture, resolver, metrics)
    }

    #[tokio::test]
    async fn test_role_defaults_apply() {
        let (_, resolver, _) = resolver().await;
        let (user, business) = (Uuid::new_v4(), Uuid::new_v4());

        let manager = Role::new("MANAGER");
        assert!(resolver.is_granted(user, business, &manager, MANAGE_RULES).await.unwrap());
        assert!(!resolver.is_granted(user, business, &manager, "reports.view").await.unwrap());
        assert!(!resolver
            .is_granted(user, business, &manager, MANAGE_PERMISSIONS)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_user_grant_overrides_both_ways() {
        let (_, resolver, metrics) = resolver().await;
        let (user, business, admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let staff = Role::new("STAFF");

        assert!(!resolver
            .is_granted(user, business, &staff, "appointments.cancel")
            .await
            .unwrap());
        resolver
            .set_user_grant(user, business, "appointments.cancel", true, admin, None)
            .await
            .unwrap();
        assert!(resolver
            .is_granted(user, business, &staff, "appointments.cancel")
            .await
            .unwrap());

        let owner = Role::new("OWNER");
        resolver
            .set_user_grant(user, business, "reports.view", false, admin, Some("audit".into()))
            .await
            .unwrap();
        assert!(!resolver.is_granted(user, business, &owner, "reports.view").await.unwrap());

        // Same user elsewhere keeps the role default.
        assert!(resolver
            .is_granted(user, Uuid::new_v4(), &owner, "reports.view")
            .await
            .unwrap());

        assert_eq!(metrics.permission_checks_granted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.permission_checks_denied.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_regrant_replaces_row_in_place() {
        let (fixture, resolver, _) = resolver().await;
        let (user, business) = (Uuid::new_v4(), Uuid::new_v4());
        let (first_admin, second_admin) = (Uuid::new_v4(), Uuid::new_v4());

        let first = resolver
            .set_user_grant(user, business, "reports.view", true, first_admin, Some("trial".into()))
            .await
            .unwrap();
        let second = resolver
            .set_user_grant(user, business, "reports.view", false, second_admin, None)
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert!(!second.granted);
        assert_eq!(second.granted_by, second_admin);
        assert_eq!(second.notes, None);

        let rows = fixture.storage.list_user_grants(user, business).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_reverts_to_role_default() {
        let (_, resolver, _) = resolver().await;
        let (user, business, admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let manager = Role::new("MANAGER");

        resolver
            .set_user_grant(user, business, MANAGE_RULES, false, admin, None)
            .await
            .unwrap();
        let updated = resolver
            .set_user_grant(user, business, MANAGE_RULES, false, admin, Some("again".into()))
            .await
            .unwrap();
        assert_eq!(updated.notes.as_deref(), Some("again"));
        assert!(!resolver.is_granted(user, business, &manager, MANAGE_RULES).await.unwrap());

        assert!(resolver.clear_user_grant(user, business, MANAGE_RULES).await.unwrap());
        assert!(resolver.is_granted(user, business, &manager, MANAGE_RULES).await.unwrap());
        assert!(!resolver.clear_user_grant(user, business, MANAGE_RULES).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_role_and_operator() {
        let (_, resolver, _) = resolver().await;
        let (user, business) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(!resolver
            .is_granted(user, business, &Role::new("INTERN"), "appointments.cancel")
            .await
            .unwrap());
        assert!(resolver
            .is_granted(user, business, &Role::operator(), "anything.at.all")
            .await
            .unwrap());
        assert!(resolver
            .is_granted(user, business, &Role::new("STAFF"), "anything.at.all")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_effective_permissions() {
        let (_, resolver, _) = resolver().await;
        let (user, business, admin) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let staff = Role::new("STAFF");

        resolver
            .set_user_grant(user, business, "reports.view", true, admin, None)
            .await
            .unwrap();

        let effective = resolver.effective_permissions(user, business, &staff).await.unwrap();
        assert_eq!(effective.len(), 4);
        assert!(effective["reports.view"]);
        assert!(!effective["appointments.cancel"]);
        assert!(!effective[MANAGE_RULES]);

        let all = resolver
            .effective_permissions(user, business, &Role::operator())
            .await
            .unwrap();
        assert!(all.values().all(|granted| *granted));
    }
}
