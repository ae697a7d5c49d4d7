//! Actor-scoped entry points.
//!
//! Every call names the business explicitly. The tenancy guard admits the
//! actor first; writes additionally require the matching management
//! permission in that business.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::domain::{ModuleGrant, ResolvedRule, Role, RuleAssignment, UserGrant};
use crate::entitlement::EntitlementResolver;
use crate::error::EngineResult;
use crate::observability::MetricsRegistry;
use crate::permissions::{PermissionResolver, MANAGE_PERMISSIONS, MANAGE_RULES};
use crate::rules::{AssignMode, AssignmentManager, RuleResolver};
use crate::storage::Storage;
use crate::tenancy::{Actor, TenancyGuard};

#[derive(Clone)]
pub struct Engine {
    catalog: CatalogStore,
    entitlements: EntitlementResolver,
    rules: RuleResolver,
    assignments: AssignmentManager,
    permissions: PermissionResolver,
    tenancy: TenancyGuard,
    metrics: Arc<MetricsRegistry>,
}

impl Engine {
    pub fn new(storage: Arc<dyn Storage>, metrics: Arc<MetricsRegistry>) -> Self {
        let catalog = CatalogStore::new(storage.clone());
        let entitlements = EntitlementResolver::new(catalog.clone(), storage.clone());
        let rules = RuleResolver::new(
            catalog.clone(),
            entitlements.clone(),
            storage.clone(),
            metrics.clone(),
        );
        let assignments = AssignmentManager::new(
            catalog.clone(),
            entitlements.clone(),
            storage.clone(),
            metrics.clone(),
        );
        let permissions = PermissionResolver::new(catalog.clone(), storage, metrics.clone());
        let tenancy = TenancyGuard::new(permissions.clone(), metrics.clone());

        Engine {
            catalog,
            entitlements,
            rules,
            assignments,
            permissions,
            tenancy,
            metrics,
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn entitlements(&self) -> &EntitlementResolver {
        &self.entitlements
    }

    pub fn rules(&self) -> &RuleResolver {
        &self.rules
    }

    pub fn assignments(&self) -> &AssignmentManager {
        &self.assignments
    }

    pub fn permissions(&self) -> &PermissionResolver {
        &self.permissions
    }

    pub fn tenancy(&self) -> &TenancyGuard {
        &self.tenancy
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    // Reads

    pub async fn modules(&self, actor: &Actor, business_id: Uuid) -> EngineResult<BTreeSet<String>> {
        self.tenancy.authorize_business(actor, business_id)?;
        self.entitlements.resolve_modules(business_id).await
    }

    pub async fn module_grants(&self, actor: &Actor, business_id: Uuid) -> EngineResult<Vec<ModuleGrant>> {
        self.tenancy.authorize_business(actor, business_id)?;
        self.entitlements.resolve_grants(business_id).await
    }

    pub async fn resolve_rule(
        &self,
        actor: &Actor,
        business_id: Uuid,
        key: &str,
    ) -> EngineResult<ResolvedRule> {
        self.tenancy.authorize_business(actor, business_id)?;
        self.rules.resolve_rule(business_id, key).await
    }

    pub async fn resolve_all_rules(
        &self,
        actor: &Actor,
        business_id: Uuid,
    ) -> EngineResult<BTreeMap<String, ResolvedRule>> {
        self.tenancy.authorize_business(actor, business_id)?;
        self.rules.resolve_all_rules(business_id).await
    }

    pub async fn list_assignments(
        &self,
        actor: &Actor,
        business_id: Uuid,
    ) -> EngineResult<Vec<(String, RuleAssignment)>> {
        self.tenancy.authorize_business(actor, business_id)?;
        let rows = self.assignments.list_assignments(business_id).await?;
        let scope = self.tenancy.scope_for(actor);
        Ok(rows
            .into_iter()
            .filter(|(_, a)| scope.permits(a.business_id))
            .collect())
    }

    // Rule writes

    pub async fn assign_rule(
        &self,
        actor: &Actor,
        business_id: Uuid,
        key: &str,
        mode: AssignMode,
    ) -> EngineResult<RuleAssignment> {
        self.tenancy.authorize_action(actor, business_id, MANAGE_RULES).await?;
        self.assignments.assign(business_id, key, mode).await
    }

    pub async fn customize_rule(
        &self,
        actor: &Actor,
        business_id: Uuid,
        key: &str,
        raw: &serde_json::Value,
        notes: Option<String>,
    ) -> EngineResult<RuleAssignment> {
        self.tenancy.authorize_action(actor, business_id, MANAGE_RULES).await?;
        self.assignments.customize(business_id, key, raw, notes).await
    }

    pub async fn unassign_rule(&self, actor: &Actor, business_id: Uuid, key: &str) -> EngineResult<bool> {
        self.tenancy.authorize_action(actor, business_id, MANAGE_RULES).await?;
        self.assignments.unassign(business_id, key).await
    }

    pub async fn set_rule_active(
        &self,
        actor: &Actor,
        business_id: Uuid,
        key: &str,
        active: bool,
    ) -> EngineResult<RuleAssignment> {
        self.tenancy.authorize_action(actor, business_id, MANAGE_RULES).await?;
        self.assignments.set_active(business_id, key, active).await
    }

    // Permissions

    /// Check a permission for the actor, or for another user of the business
    /// when the actor may manage permissions.
    pub async fn check_permission(
        &self,
        actor: &Actor,
        business_id: Uuid,
        subject: Option<(Uuid, Role)>,
        key: &str,
    ) -> EngineResult<bool> {
        self.tenancy.authorize_business(actor, business_id)?;

        match subject {
            Some((user_id, role)) if user_id != actor.user_id || role != actor.role => {
                self.tenancy
                    .authorize_action(actor, business_id, MANAGE_PERMISSIONS)
                    .await?;
                self.permissions.is_granted(user_id, business_id, &role, key).await
            }
            _ => {
                self.permissions
                    .is_granted(actor.user_id, business_id, &actor.role, key)
                    .await
            }
        }
    }

    pub async fn effective_permissions(
        &self,
        actor: &Actor,
        business_id: Uuid,
    ) -> EngineResult<BTreeMap<String, bool>> {
        self.tenancy.authorize_business(actor, business_id)?;
        self.permissions
            .effective_permissions(actor.user_id, business_id, &actor.role)
            .await
    }

    pub async fn set_user_grant(
        &self,
        actor: &Actor,
        business_id: Uuid,
        user_id: Uuid,
        key: &str,
        granted: bool,
        notes: Option<String>,
    ) -> EngineResult<UserGrant> {
        self.tenancy
            .authorize_action(actor, business_id, MANAGE_PERMISSIONS)
            .await?;
        self.permissions
            .set_user_grant(user_id, business_id, key, granted, actor.user_id, notes)
            .await
    }

    pub async fn clear_user_grant(
        &self,
        actor: &Actor,
        business_id: Uuid,
        user_id: Uuid,
        key: &str,
    ) -> EngineResult<bool> {
        self.tenancy
            .authorize_action(actor, business_id, MANAGE_PERMISSIONS)
            .await?;
        self.permissions.clear_user_grant(user_id, business_id, key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, RuleValue};
    use crate::error::EngineError;
    use crate::fixtures::Fixture;
    use serde_json::json;

    async fn engine() -> (Fixture, Engine) {
        let fixture = Fixture::new().await;
        let engine = Engine::new(fixture.storage(), Arc::new(MetricsRegistry::new()));
        (fixture, engine)
    }

    fn owner_of(business_id: Uuid) -> Actor {
        Actor::new(Uuid::new_v4(), business_id, Role::new("OWNER"))
    }

    #[tokio::test]
    async fn test_basic_to_premium_loyalty_scenario() {
        let (fixture, engine) = engine().await;
        let business = Uuid::new_v4();
        let owner = owner_of(business);
        fixture.subscribe(business, fixture.basic).await;

        let err = engine
            .resolve_rule(&owner, business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ModuleNotEntitled { .. }));

        fixture.subscribe(business, fixture.premium).await;
        let rule = engine
            .resolve_rule(&owner, business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap();
        assert_eq!(rule.value, RuleValue::Number(500.0));
        assert_eq!(rule.provenance, Provenance::Default);

        engine
            .customize_rule(&owner, business, "LOYALTY_REFERRAL_POINTS", &json!(750), None)
            .await
            .unwrap();
        let rule = engine
            .resolve_rule(&owner, business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap();
        assert_eq!(rule.value, RuleValue::Number(750.0));
        assert_eq!(rule.provenance, Provenance::Custom);
        assert_eq!(serde_json::to_value(&rule).unwrap()["provenance"], "custom");
    }

    #[tokio::test]
    async fn test_gating_is_live_after_downgrade() {
        let (fixture, engine) = engine().await;
        let business = Uuid::new_v4();
        let owner = owner_of(business);
        fixture.subscribe(business, fixture.premium).await;

        engine
            .customize_rule(&owner, business, "LOYALTY_REFERRAL_POINTS", &json!(900), None)
            .await
            .unwrap();

        fixture.subscribe(business, fixture.basic).await;
        let err = engine
            .resolve_rule(&owner, business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_ENTITLED");
        assert_eq!(fixture.storage.assignment_count(), 1);

        fixture.subscribe(business, fixture.premium).await;
        let rule = engine
            .resolve_rule(&owner, business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap();
        assert_eq!(rule.value, RuleValue::Number(900.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assign_creates_one_row() {
        let (fixture, engine) = engine().await;
        let business = Uuid::new_v4();
        let owner = owner_of(business);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let owner = owner.clone();
                tokio::spawn(async move {
                    engine
                        .assign_rule(&owner, business, "BOOKING_BUFFER_MINUTES", AssignMode::Idempotent)
                        .await
                })
            })
            .collect();

        let mut ids = BTreeSet::new();
        for task in tasks {
            ids.insert(task.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(fixture.storage.assignment_count(), 1);
    }

    #[tokio::test]
    async fn test_foreign_business_reads_are_not_found() {
        let (fixture, engine) = engine().await;
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        fixture.subscribe(theirs, fixture.premium).await;

        let owner = owner_of(mine);
        assert!(engine.modules(&owner, theirs).await.unwrap_err().is_not_found());
        assert!(engine
            .resolve_rule(&owner, theirs, "BOOKING_BUFFER_MINUTES")
            .await
            .unwrap_err()
            .is_not_found());

        let operator = Actor::new(Uuid::new_v4(), mine, Role::operator());
        assert!(engine.modules(&operator, theirs).await.unwrap().contains("loyalty"));
    }

    #[tokio::test]
    async fn test_writes_require_manage_permission() {
        let (_, engine) = engine().await;
        let business = Uuid::new_v4();
        let staff = Actor::new(Uuid::new_v4(), business, Role::new("STAFF"));

        let err = engine
            .customize_rule(&staff, business, "BOOKING_BUFFER_MINUTES", &json!(5), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");

        let owner = owner_of(business);
        engine
            .set_user_grant(&owner, business, staff.user_id, MANAGE_RULES, true, None)
            .await
            .unwrap();
        engine
            .customize_rule(&staff, business, "BOOKING_BUFFER_MINUTES", &json!(5), None)
            .await
            .unwrap();

        let rows = engine.list_assignments(&staff, business).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, "BOOKING_BUFFER_MINUTES");
    }

    #[tokio::test]
    async fn test_check_permission_for_other_user() {
        let (_, engine) = engine().await;
        let business = Uuid::new_v4();
        let staff = Actor::new(Uuid::new_v4(), business, Role::new("STAFF"));
        let owner = owner_of(business);

        assert!(engine
            .check_permission(&owner, business, Some((staff.user_id, staff.role.clone())), "appointments.cancel")
            .await
            .map(|granted| !granted)
            .unwrap());

        let err = engine
            .check_permission(&staff, business, Some((owner.user_id, owner.role.clone())), "reports.view")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "PERMISSION_DENIED");

        assert!(!engine
            .check_permission(&staff, business, None, "appointments.cancel")
            .await
            .unwrap());
    }
}
