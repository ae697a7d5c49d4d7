use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::value;
use crate::catalog::CatalogStore;
use crate::domain::{RuleAssignment, RuleTemplate};
use crate::entitlement::EntitlementResolver;
use crate::error::{EngineError, EngineResult};
use crate::observability::MetricsRegistry;
use crate::storage::{Storage, StorageError};

/// How `assign` treats an existing assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignMode {
    /// Existing row is returned unchanged
    #[default]
    Idempotent,
    /// Existing row fails `AlreadyAssigned`
    Strict,
}

impl AssignMode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            AssignMode::Strict
        } else {
            AssignMode::Idempotent
        }
    }
}

/// Attaches rule templates to businesses and stores their overrides.
///
/// Each write is checked against the template (active, entitled) before
/// anything is stored, so a rejected call leaves no row behind. Concurrent
/// writers are serialized by the (business, template) uniqueness of the
/// store: a losing insert is retried as an update.
#[derive(Clone)]
pub struct AssignmentManager {
    catalog: CatalogStore,
    entitlements: EntitlementResolver,
    storage: Arc<dyn Storage>,
    metrics: Arc<MetricsRegistry>,
}

impl AssignmentManager {
    pub fn new(
        catalog: CatalogStore,
        entitlements: EntitlementResolver,
        storage: Arc<dyn Storage>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        AssignmentManager {
            catalog,
            entitlements,
            storage,
            metrics,
        }
    }

    /// Attach a rule to a business with no override.
    pub async fn assign(
        &self,
        business_id: Uuid,
        key: &str,
        mode: AssignMode,
    ) -> EngineResult<RuleAssignment> {
        let result = self.try_assign(business_id, key, mode).await;
        self.metrics.record_assignment_write(result.is_ok());
        result
    }

    async fn try_assign(
        &self,
        business_id: Uuid,
        key: &str,
        mode: AssignMode,
    ) -> EngineResult<RuleAssignment> {
        let template = self.entitled_template(business_id, key).await?;

        if let Some(existing) = self.storage.get_assignment(business_id, template.id).await? {
            return existing_assignment(existing, mode, business_id, key);
        }

        let assignment = RuleAssignment::new(business_id, template.id);
        match self.storage.insert_assignment(&assignment).await {
            Ok(()) => {
                info!(business_id = %business_id, rule_key = key, "Rule assigned");
                Ok(assignment)
            }
            Err(StorageError::UniqueViolation) => {
                debug!(business_id = %business_id, rule_key = key, "Concurrent assign, reusing row");
                let existing = self.load(business_id, &template).await?;
                existing_assignment(existing, mode, business_id, key)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a custom value, creating the assignment when absent.
    ///
    /// The value is validated against the template type and bounds first;
    /// on failure the stored value is left as it was. A successful call
    /// marks the assignment active.
    pub async fn customize(
        &self,
        business_id: Uuid,
        key: &str,
        raw: &serde_json::Value,
        notes: Option<String>,
    ) -> EngineResult<RuleAssignment> {
        let result = self.try_customize(business_id, key, raw, notes).await;
        self.metrics.record_assignment_write(result.is_ok());
        result
    }

    async fn try_customize(
        &self,
        business_id: Uuid,
        key: &str,
        raw: &serde_json::Value,
        notes: Option<String>,
    ) -> EngineResult<RuleAssignment> {
        let template = self.entitled_template(business_id, key).await?;
        let stored = value::validate_input(&template, raw)
            .map_err(|e| EngineError::invalid_input(key, e.0))?
            .to_raw();

        let mut candidate = RuleAssignment::new(business_id, template.id);
        candidate.custom_value = Some(stored);
        candidate.notes = notes;

        let assignment = match self.storage.write_assignment_value(&candidate).await {
            Ok(assignment) => assignment,
            Err(StorageError::UniqueViolation) => {
                debug!(business_id = %business_id, rule_key = key, "Concurrent customize, retrying as update");
                self.storage.write_assignment_value(&candidate).await?
            }
            Err(e) => return Err(e.into()),
        };

        info!(business_id = %business_id, rule_key = key, "Rule customized");
        Ok(assignment)
    }

    /// Delete the assignment so the template default applies again.
    ///
    /// Returns whether a row was removed.
    pub async fn unassign(&self, business_id: Uuid, key: &str) -> EngineResult<bool> {
        let result = self.try_unassign(business_id, key).await;
        self.metrics.record_assignment_write(result.is_ok());
        result
    }

    async fn try_unassign(&self, business_id: Uuid, key: &str) -> EngineResult<bool> {
        let template = self.entitled_template(business_id, key).await?;
        let removed = self.storage.delete_assignment(business_id, template.id).await?;
        if removed {
            info!(business_id = %business_id, rule_key = key, "Rule unassigned");
        }
        Ok(removed)
    }

    /// Suppress or restore an assignment without touching its custom value.
    pub async fn set_active(
        &self,
        business_id: Uuid,
        key: &str,
        active: bool,
    ) -> EngineResult<RuleAssignment> {
        let result = self.try_set_active(business_id, key, active).await;
        self.metrics.record_assignment_write(result.is_ok());
        result
    }

    async fn try_set_active(
        &self,
        business_id: Uuid,
        key: &str,
        active: bool,
    ) -> EngineResult<RuleAssignment> {
        let template = self.entitled_template(business_id, key).await?;
        let assignment = self
            .storage
            .set_assignment_active(business_id, template.id, active)
            .await?
            .ok_or_else(|| EngineError::not_found("rule assignment", key))?;

        info!(business_id = %business_id, rule_key = key, active = active, "Rule activation changed");
        Ok(assignment)
    }

    /// Every assignment row the business has, in key order.
    pub async fn list_assignments(&self, business_id: Uuid) -> EngineResult<Vec<(String, RuleAssignment)>> {
        let templates = self.storage.list_rule_templates().await?;
        let mut rows: Vec<(String, RuleAssignment)> = self
            .storage
            .list_assignments(business_id)
            .await?
            .into_iter()
            .filter_map(|a| {
                templates
                    .iter()
                    .find(|t| t.id == a.template_id)
                    .map(|t| (t.key.clone(), a))
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }

    /// Active template whose required module the business currently has.
    async fn entitled_template(&self, business_id: Uuid, key: &str) -> EngineResult<RuleTemplate> {
        let template = self.catalog.get_active_rule_template(key).await?;

        if let Some(module) = &template.required_module {
            if !self.entitlements.has_module(business_id, module).await? {
                self.metrics.record_module_denial();
                return Err(EngineError::ModuleNotEntitled {
                    rule_key: key.to_string(),
                    module: module.clone(),
                });
            }
        }

        Ok(template)
    }

    async fn load(&self, business_id: Uuid, template: &RuleTemplate) -> EngineResult<RuleAssignment> {
        self.storage
            .get_assignment(business_id, template.id)
            .await?
            .ok_or_else(|| EngineError::not_found("rule assignment", template.key.clone()))
    }
}

fn existing_assignment(
    existing: RuleAssignment,
    mode: AssignMode,
    business_id: Uuid,
    key: &str,
) -> EngineResult<RuleAssignment> {
    match mode {
        AssignMode::Idempotent => Ok(existing),
        AssignMode::Strict => Err(EngineError::AlreadyAssigned {
            key: key.to_string(),
            business_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, RuleValue};
    use crate::fixtures::Fixture;
    use crate::rules::RuleResolver;
    use serde_json::json;

    struct Harness {
        fixture: Fixture,
        manager: AssignmentManager,
        resolver: RuleResolver,
    }

    async fn harness() -> Harness {
        let fixture = Fixture::new().await;
        let metrics = Arc::new(MetricsRegistry::new());
        let entitlements = EntitlementResolver::new(fixture.catalog.clone(), fixture.storage());
        let manager = AssignmentManager::new(
            fixture.catalog.clone(),
            entitlements.clone(),
            fixture.storage(),
            metrics.clone(),
        );
        let resolver = RuleResolver::new(fixture.catalog.clone(), entitlements, fixture.storage(), metrics);
        Harness {
            fixture,
            manager,
            resolver,
        }
    }

    #[tokio::test]
    async fn test_assign_is_idempotent_unless_strict() {
        let h = harness().await;
        let business = Uuid::new_v4();

        let first = h
            .manager
            .assign(business, "BOOKING_BUFFER_MINUTES", AssignMode::Idempotent)
            .await
            .unwrap();
        let second = h
            .manager
            .assign(business, "BOOKING_BUFFER_MINUTES", AssignMode::Idempotent)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(h.fixture.storage.assignment_count(), 1);

        let err = h
            .manager
            .assign(business, "BOOKING_BUFFER_MINUTES", AssignMode::Strict)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_ASSIGNED");
    }

    #[tokio::test]
    async fn test_gated_assign_leaves_no_row() {
        let h = harness().await;
        let business = Uuid::new_v4();
        h.fixture.subscribe(business, h.fixture.basic).await;

        let err = h
            .manager
            .assign(business, "LOYALTY_REFERRAL_POINTS", AssignMode::Idempotent)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_ENTITLED");

        let err = h
            .manager
            .customize(business, "LOYALTY_REFERRAL_POINTS", &json!(750), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_ENTITLED");
        assert_eq!(h.fixture.storage.assignment_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_template_not_found() {
        let h = harness().await;
        let err = h
            .manager
            .assign(Uuid::new_v4(), "RETIRED_RULE", AssignMode::Idempotent)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_out_of_range_keeps_previous_value() {
        let h = harness().await;
        let business = Uuid::new_v4();

        h.manager
            .customize(business, "BOOKING_BUFFER_MINUTES", &json!(30), Some("peak season".into()))
            .await
            .unwrap();

        let err = h
            .manager
            .customize(business, "BOOKING_BUFFER_MINUTES", &json!(500), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let rule = h.resolver.resolve_rule(business, "BOOKING_BUFFER_MINUTES").await.unwrap();
        assert_eq!(rule.value, RuleValue::Number(30.0));

        let rows = h.manager.list_assignments(business).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.notes.as_deref(), Some("peak season"));
    }

    #[tokio::test]
    async fn test_boolean_literals_enforced() {
        let h = harness().await;
        let business = Uuid::new_v4();

        assert!(h
            .manager
            .customize(business, "ONLINE_BOOKING_ENABLED", &json!("yes"), None)
            .await
            .is_err());
        h.manager
            .customize(business, "ONLINE_BOOKING_ENABLED", &json!("false"), None)
            .await
            .unwrap();

        let rule = h.resolver.resolve_rule(business, "ONLINE_BOOKING_ENABLED").await.unwrap();
        assert_eq!(rule.value, RuleValue::Boolean(false));
    }

    #[tokio::test]
    async fn test_unassign_reverts_to_default() {
        let h = harness().await;
        let business = Uuid::new_v4();

        h.manager
            .customize(business, "CANCELLATION_POLICY", &json!("strict"), None)
            .await
            .unwrap();
        assert!(h.manager.unassign(business, "CANCELLATION_POLICY").await.unwrap());
        assert!(!h.manager.unassign(business, "CANCELLATION_POLICY").await.unwrap());

        let rule = h.resolver.resolve_rule(business, "CANCELLATION_POLICY").await.unwrap();
        assert_eq!(rule.value.as_str(), Some("flexible"));
        assert_eq!(rule.provenance, Provenance::Default);
    }

    #[tokio::test]
    async fn test_unassign_respects_module_gate() {
        let h = harness().await;
        let business = Uuid::new_v4();
        h.fixture.subscribe(business, h.fixture.premium).await;
        h.manager
            .customize(business, "LOYALTY_REFERRAL_POINTS", &json!(750), None)
            .await
            .unwrap();

        h.fixture.subscribe(business, h.fixture.basic).await;
        let err = h
            .manager
            .unassign(business, "LOYALTY_REFERRAL_POINTS")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MODULE_NOT_ENTITLED");
        assert_eq!(h.fixture.storage.assignment_count(), 1);

        h.fixture.subscribe(business, h.fixture.premium).await;
        let rule = h.resolver.resolve_rule(business, "LOYALTY_REFERRAL_POINTS").await.unwrap();
        assert_eq!(rule.value, RuleValue::Number(750.0));
    }

    #[tokio::test]
    async fn test_json_values_resolve_as_customized() {
        let h = harness().await;
        let business = Uuid::new_v4();

        for (input, expected) in [
            (json!("\"hi\""), json!("hi")),
            (json!("\"123\""), json!("123")),
            (json!(15), json!(15)),
            (json!({"theme": "dark", "slots": 4}), json!({"theme": "dark", "slots": 4})),
            (json!("[1, 2, 3]"), json!([1, 2, 3])),
        ] {
            h.manager
                .customize(business, "BOOKING_WIDGET_SETTINGS", &input, None)
                .await
                .unwrap();

            let rule = h.resolver.resolve_rule(business, "BOOKING_WIDGET_SETTINGS").await.unwrap();
            assert_eq!(rule.value, RuleValue::Json(expected), "input {input}");
            assert_eq!(rule.provenance, Provenance::Custom);
        }
    }

    #[tokio::test]
    async fn test_null_customization_rejected() {
        let h = harness().await;
        let business = Uuid::new_v4();

        h.manager
            .customize(business, "BOOKING_WIDGET_SETTINGS", &json!({"theme": "light"}), None)
            .await
            .unwrap();
        let err = h
            .manager
            .customize(business, "BOOKING_WIDGET_SETTINGS", &serde_json::Value::Null, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let rule = h.resolver.resolve_rule(business, "BOOKING_WIDGET_SETTINGS").await.unwrap();
        assert_eq!(rule.value, RuleValue::Json(json!({"theme": "light"})));
        assert_eq!(rule.provenance, Provenance::Custom);
    }

    #[tokio::test]
    async fn test_set_active_suppresses_without_losing_value() {
        let h = harness().await;
        let business = Uuid::new_v4();

        h.manager
            .customize(business, "BOOKING_BUFFER_MINUTES", &json!(45), None)
            .await
            .unwrap();
        h.manager
            .set_active(business, "BOOKING_BUFFER_MINUTES", false)
            .await
            .unwrap();

        let rule = h.resolver.resolve_rule(business, "BOOKING_BUFFER_MINUTES").await.unwrap();
        assert_eq!(rule.value, RuleValue::Number(10.0));

        h.manager
            .set_active(business, "BOOKING_BUFFER_MINUTES", true)
            .await
            .unwrap();
        let rule = h.resolver.resolve_rule(business, "BOOKING_BUFFER_MINUTES").await.unwrap();
        assert_eq!(rule.value, RuleValue::Number(45.0));

        assert!(h
            .manager
            .set_active(business, "ONLINE_BOOKING_ENABLED", false)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_customize_keeps_one_row() {
        let h = harness().await;
        let business = Uuid::new_v4();

        let tasks: Vec<_> = [json!(15), json!(20)]
            .into_iter()
            .map(|value| {
                let manager = h.manager.clone();
                tokio::spawn(async move {
                    manager
                        .customize(business, "BOOKING_BUFFER_MINUTES", &value, None)
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.fixture.storage.assignment_count(), 1);
        let rule = h.resolver.resolve_rule(business, "BOOKING_BUFFER_MINUTES").await.unwrap();
        assert!(matches!(rule.value, RuleValue::Number(n) if n == 15.0 || n == 20.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_set_active_never_reverts_a_concurrent_customize() {
        let h = harness().await;
        let business = Uuid::new_v4();

        for round in 0..50 {
            h.manager
                .customize(business, "BOOKING_BUFFER_MINUTES", &json!(30), None)
                .await
                .unwrap();

            let customize = {
                let manager = h.manager.clone();
                tokio::spawn(async move {
                    manager
                        .customize(business, "BOOKING_BUFFER_MINUTES", &json!(40), None)
                        .await
                })
            };
            let suspend = {
                let manager = h.manager.clone();
                tokio::spawn(async move {
                    manager
                        .set_active(business, "BOOKING_BUFFER_MINUTES", false)
                        .await
                })
            };
            customize.await.unwrap().unwrap();
            suspend.await.unwrap().unwrap();

            let (_, row) = h.manager.list_assignments(business).await.unwrap().remove(0);
            assert_eq!(row.custom_value, Some(json!(40.0)), "round {round}");
        }
    }
}
