// src/storage/memory.rs
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::{
    Module, Permission, Plan, PlanModule, Role, RoleDefaultGrant, RuleAssignment, RuleTemplate,
    Subscription, SubscriptionStatus, UserGrant,
};

use super::traits::{Storage, StorageError, StorageResult};

/// In-memory storage.
///
/// Backs tests and benches, and the server when no database is configured.
/// Each map enforces the same uniqueness as the relational schema.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    plans: Mutex<HashMap<Uuid, Plan>>,
    modules: Mutex<HashMap<Uuid, Module>>,
    plan_modules: Mutex<Vec<PlanModule>>,
    templates: Mutex<HashMap<String, RuleTemplate>>,
    permissions: Mutex<HashMap<String, Permission>>,
    role_defaults: Mutex<HashMap<(Role, Uuid), bool>>,
    subscriptions: Mutex<Vec<Subscription>>,
    assignments: Mutex<HashMap<(Uuid, Uuid), RuleAssignment>>,
    user_grants: Mutex<HashMap<(Uuid, Uuid, Uuid), UserGrant>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plan-module row without the idempotency check, the way a
    /// legacy seeding script would (for testing the repair routine).
    pub fn insert_plan_module_unchecked(&self, plan_module: PlanModule) {
        self.plan_modules.lock().push(plan_module);
    }

    /// Raw plan-module rows (for assertions).
    pub fn plan_module_rows(&self) -> Vec<PlanModule> {
        self.plan_modules.lock().clone()
    }

    /// Number of stored rule assignments across all businesses.
    pub fn assignment_count(&self) -> usize {
        self.assignments.lock().len()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<Plan>> {
        Ok(self.plans.lock().get(&plan_id).cloned())
    }

    async fn list_plans(&self) -> StorageResult<Vec<Plan>> {
        let mut plans: Vec<Plan> = self.plans.lock().values().cloned().collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn upsert_plan(&self, plan: &Plan) -> StorageResult<Uuid> {
        let mut plans = self.plans.lock();

        if let Some(existing) = plans.values_mut().find(|p| p.name == plan.name) {
            existing.status = plan.status;
            existing.price = plan.price;
            existing.billing_cycle = plan.billing_cycle;
            existing.trial_days = plan.trial_days;
            return Ok(existing.id);
        }

        plans.insert(plan.id, plan.clone());
        Ok(plan.id)
    }

    async fn get_module_by_name(&self, name: &str) -> StorageResult<Option<Module>> {
        Ok(self.modules.lock().values().find(|m| m.name == name).cloned())
    }

    async fn list_modules(&self) -> StorageResult<Vec<Module>> {
        let mut modules: Vec<Module> = self.modules.lock().values().cloned().collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    async fn upsert_module(&self, module: &Module) -> StorageResult<Uuid> {
        let mut modules = self.modules.lock();

        if let Some(existing) = modules.values_mut().find(|m| m.name == module.name) {
            existing.category = module.category.clone();
            existing.active = module.active;
            return Ok(existing.id);
        }

        modules.insert(module.id, module.clone());
        Ok(module.id)
    }

    async fn list_plan_modules(&self, plan_id: Uuid) -> StorageResult<Vec<(PlanModule, Module)>> {
        let modules = self.modules.lock();
        let mut rows: Vec<(PlanModule, Module)> = self
            .plan_modules
            .lock()
            .iter()
            .filter(|pm| pm.plan_id == plan_id)
            .filter_map(|pm| modules.get(&pm.module_id).map(|m| (pm.clone(), m.clone())))
            .collect();
        rows.sort_by(|a, b| a.1.name.cmp(&b.1.name).then(a.0.created_at.cmp(&b.0.created_at)));
        Ok(rows)
    }

    async fn upsert_plan_module(&self, plan_module: &PlanModule) -> StorageResult<Uuid> {
        let mut rows = self.plan_modules.lock();

        let earliest = rows
            .iter_mut()
            .filter(|pm| pm.plan_id == plan_module.plan_id && pm.module_id == plan_module.module_id)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        if let Some(existing) = earliest {
            existing.included = plan_module.included;
            existing.quantity_limit = plan_module.quantity_limit;
            existing.additional_price = plan_module.additional_price;
            return Ok(existing.id);
        }

        rows.push(plan_module.clone());
        Ok(plan_module.id)
    }

    async fn repair_plan_modules(&self) -> StorageResult<usize> {
        let mut rows = self.plan_modules.lock();
        let before = rows.len();

        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let mut seen = HashSet::new();
        rows.retain(|pm| seen.insert((pm.plan_id, pm.module_id)));

        Ok(before - rows.len())
    }

    async fn get_rule_template(&self, key: &str) -> StorageResult<Option<RuleTemplate>> {
        Ok(self.templates.lock().get(key).cloned())
    }

    async fn list_rule_templates(&self) -> StorageResult<Vec<RuleTemplate>> {
        let mut templates: Vec<RuleTemplate> = self.templates.lock().values().cloned().collect();
        templates.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(templates)
    }

    async fn upsert_rule_template(&self, template: &RuleTemplate) -> StorageResult<Uuid> {
        let mut templates = self.templates.lock();

        match templates.get_mut(&template.key) {
            Some(existing) => {
                let id = existing.id;
                *existing = RuleTemplate {
                    id,
                    ..template.clone()
                };
                Ok(id)
            }
            None => {
                templates.insert(template.key.clone(), template.clone());
                Ok(template.id)
            }
        }
    }

    async fn get_permission(&self, key: &str) -> StorageResult<Option<Permission>> {
        Ok(self.permissions.lock().get(key).cloned())
    }

    async fn list_permissions(&self) -> StorageResult<Vec<Permission>> {
        let mut permissions: Vec<Permission> = self.permissions.lock().values().cloned().collect();
        permissions.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(permissions)
    }

    async fn upsert_permission(&self, permission: &Permission) -> StorageResult<Uuid> {
        let mut permissions = self.permissions.lock();

        match permissions.get_mut(&permission.key) {
            Some(existing) => {
                existing.category = permission.category.clone();
                existing.active = permission.active;
                Ok(existing.id)
            }
            None => {
                permissions.insert(permission.key.clone(), permission.clone());
                Ok(permission.id)
            }
        }
    }

    async fn get_role_default(
        &self,
        role: &Role,
        permission_id: Uuid,
    ) -> StorageResult<Option<RoleDefaultGrant>> {
        Ok(self
            .role_defaults
            .lock()
            .get(&(role.clone(), permission_id))
            .map(|granted| RoleDefaultGrant {
                role: role.clone(),
                permission_id,
                granted: *granted,
            }))
    }

    async fn list_role_defaults(&self, role: &Role) -> StorageResult<Vec<RoleDefaultGrant>> {
        Ok(self
            .role_defaults
            .lock()
            .iter()
            .filter(|((r, _), _)| r == role)
            .map(|((r, permission_id), granted)| RoleDefaultGrant {
                role: r.clone(),
                permission_id: *permission_id,
                granted: *granted,
            })
            .collect())
    }

    async fn upsert_role_default(&self, grant: &RoleDefaultGrant) -> StorageResult<()> {
        self.role_defaults
            .lock()
            .insert((grant.role.clone(), grant.permission_id), grant.granted);
        Ok(())
    }

    async fn list_subscriptions(&self, business_id: Uuid) -> StorageResult<Vec<Subscription>> {
        Ok(self
            .subscriptions
            .lock()
            .iter()
            .filter(|s| s.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> StorageResult<()> {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.iter().any(|s| s.id == subscription.id) {
            return Err(StorageError::UniqueViolation);
        }
        subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StorageResult<bool> {
        let mut subscriptions = self.subscriptions.lock();
        match subscriptions.iter_mut().find(|s| s.id == subscription_id) {
            Some(sub) => {
                sub.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_assignment(
        &self,
        business_id: Uuid,
        template_id: Uuid,
    ) -> StorageResult<Option<RuleAssignment>> {
        Ok(self.assignments.lock().get(&(business_id, template_id)).cloned())
    }

    async fn list_assignments(&self, business_id: Uuid) -> StorageResult<Vec<RuleAssignment>> {
        let mut rows: Vec<RuleAssignment> = self
            .assignments
            .lock()
            .values()
            .filter(|a| a.business_id == business_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.assigned_at.cmp(&b.assigned_at));
        Ok(rows)
    }

    async fn insert_assignment(&self, assignment: &RuleAssignment) -> StorageResult<()> {
        let mut assignments = self.assignments.lock();
        let key = (assignment.business_id, assignment.template_id);

        if assignments.contains_key(&key) {
            return Err(StorageError::UniqueViolation);
        }
        assignments.insert(key, assignment.clone());
        Ok(())
    }

    async fn write_assignment_value(&self, candidate: &RuleAssignment) -> StorageResult<RuleAssignment> {
        let mut assignments = self.assignments.lock();
        let row = assignments
            .entry((candidate.business_id, candidate.template_id))
            .and_modify(|existing| {
                existing.custom_value = candidate.custom_value.clone();
                existing.active = true;
                if candidate.notes.is_some() {
                    existing.notes = candidate.notes.clone();
                }
                existing.updated_at = candidate.updated_at;
            })
            .or_insert_with(|| RuleAssignment {
                active: true,
                ..candidate.clone()
            });
        Ok(row.clone())
    }

    async fn set_assignment_active(
        &self,
        business_id: Uuid,
        template_id: Uuid,
        active: bool,
    ) -> StorageResult<Option<RuleAssignment>> {
        let mut assignments = self.assignments.lock();
        Ok(assignments.get_mut(&(business_id, template_id)).map(|existing| {
            existing.active = active;
            existing.updated_at = Utc::now();
            existing.clone()
        }))
    }

    async fn delete_assignment(&self, business_id: Uuid, template_id: Uuid) -> StorageResult<bool> {
        Ok(self
            .assignments
            .lock()
            .remove(&(business_id, template_id))
            .is_some())
    }

    async fn get_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<Option<UserGrant>> {
        Ok(self
            .user_grants
            .lock()
            .get(&(user_id, business_id, permission_id))
            .cloned())
    }

    async fn list_user_grants(
        &self,
        user_id: Uuid,
        business_id: Uuid,
    ) -> StorageResult<Vec<UserGrant>> {
        Ok(self
            .user_grants
            .lock()
            .values()
            .filter(|g| g.user_id == user_id && g.business_id == business_id)
            .cloned()
            .collect())
    }

    async fn write_user_grant(&self, grant: &UserGrant) -> StorageResult<UserGrant> {
        let mut grants = self.user_grants.lock();
        let row = grants
            .entry((grant.user_id, grant.business_id, grant.permission_id))
            .and_modify(|existing| {
                existing.granted = grant.granted;
                existing.granted_by = grant.granted_by;
                existing.granted_at = grant.granted_at;
                existing.notes = grant.notes.clone();
            })
            .or_insert_with(|| grant.clone());
        Ok(row.clone())
    }

    async fn delete_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<bool> {
        Ok(self
            .user_grants
            .lock()
            .remove(&(user_id, business_id, permission_id))
            .is_some())
    }
}
