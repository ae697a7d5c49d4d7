//! Read-mostly access to the platform catalog: plans, modules, rule
//! templates, permissions and the role default matrix.
//!
//! Lookups on an unknown key fail with `NotFound`; callers decide whether
//! that is fatal. The write path exists for seeding only and is made of
//! idempotent upserts plus the plan-module repair routine.

pub mod seed;

pub use seed::{apply_seed, load_seed, CatalogSeed, SeedError, SeedLoader, SeedReport};

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::{
    Module, ModuleGrant, Permission, Plan, PlanModule, Role, RoleDefaultGrant, RuleTemplate,
};
use crate::error::{EngineError, EngineResult};
use crate::storage::Storage;

/// Catalog access over a storage backend.
#[derive(Clone)]
pub struct CatalogStore {
    storage: Arc<dyn Storage>,
}

impl CatalogStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        CatalogStore { storage }
    }

    /// Fetch a plan that can grant entitlements.
    ///
    /// Missing and inactive plans both fail `NotFound`.
    pub async fn get_active_plan(&self, plan_id: Uuid) -> EngineResult<Plan> {
        match self.storage.get_plan(plan_id).await? {
            Some(plan) if plan.is_active() => Ok(plan),
            _ => Err(EngineError::not_found("active plan", plan_id.to_string())),
        }
    }

    pub async fn list_plans(&self) -> EngineResult<Vec<Plan>> {
        Ok(self.storage.list_plans().await?)
    }

    pub async fn list_modules(&self) -> EngineResult<Vec<Module>> {
        Ok(self.storage.list_modules().await?)
    }

    /// Modules a plan includes, with the plan's terms for each.
    ///
    /// Only `included` rows count. If duplicate rows survive from older
    /// seeding, the earliest-created one decides.
    pub async fn list_modules_for_plan(&self, plan_id: Uuid) -> EngineResult<Vec<ModuleGrant>> {
        if self.storage.get_plan(plan_id).await?.is_none() {
            return Err(EngineError::not_found("plan", plan_id.to_string()));
        }

        let mut rows = self.storage.list_plan_modules(plan_id).await?;
        rows.sort_by(|a, b| {
            a.0.created_at
                .cmp(&b.0.created_at)
                .then(a.0.id.cmp(&b.0.id))
        });

        let mut seen = HashSet::new();
        let mut grants: Vec<ModuleGrant> = rows
            .into_iter()
            .filter(|(pm, _)| seen.insert(pm.module_id))
            .filter(|(pm, _)| pm.included)
            .map(|(pm, module)| ModuleGrant {
                module: module.name,
                category: module.category,
                quantity_limit: pm.quantity_limit,
                additional_price: pm.additional_price,
            })
            .collect();
        grants.sort_by(|a, b| a.module.cmp(&b.module));

        Ok(grants)
    }

    /// Fetch a rule template by key, active or not.
    pub async fn get_rule_template(&self, key: &str) -> EngineResult<RuleTemplate> {
        self.storage
            .get_rule_template(key)
            .await?
            .ok_or_else(|| EngineError::not_found("rule template", key))
    }

    /// Fetch a rule template that is currently usable. Inactive templates
    /// are reported exactly like unknown ones.
    pub async fn get_active_rule_template(&self, key: &str) -> EngineResult<RuleTemplate> {
        let template = self.get_rule_template(key).await?;
        if !template.active {
            return Err(EngineError::not_found("rule template", key));
        }
        Ok(template)
    }

    /// Active templates whose required module is absent or among
    /// `available_modules`.
    pub async fn list_assignable_templates(
        &self,
        available_modules: &BTreeSet<String>,
    ) -> EngineResult<Vec<RuleTemplate>> {
        Ok(self
            .storage
            .list_rule_templates()
            .await?
            .into_iter()
            .filter(|t| t.active && t.is_available_with(available_modules.iter()))
            .collect())
    }

    /// Fetch an active permission by key.
    pub async fn get_permission(&self, key: &str) -> EngineResult<Permission> {
        match self.storage.get_permission(key).await? {
            Some(permission) if permission.active => Ok(permission),
            _ => Err(EngineError::not_found("permission", key)),
        }
    }

    pub async fn list_permissions(&self) -> EngineResult<Vec<Permission>> {
        Ok(self.storage.list_permissions().await?)
    }

    pub async fn get_role_default(
        &self,
        role: &Role,
        permission_id: Uuid,
    ) -> EngineResult<RoleDefaultGrant> {
        self.storage
            .get_role_default(role, permission_id)
            .await?
            .ok_or_else(|| {
                EngineError::not_found("role default grant", format!("{role}/{permission_id}"))
            })
    }

    pub async fn list_role_defaults(&self, role: &Role) -> EngineResult<Vec<RoleDefaultGrant>> {
        Ok(self.storage.list_role_defaults(role).await?)
    }

    /// Number of plans, rule templates and permissions, active or not.
    pub async fn counts(&self) -> EngineResult<(usize, usize, usize)> {
        Ok((
            self.storage.list_plans().await?.len(),
            self.storage.list_rule_templates().await?.len(),
            self.storage.list_permissions().await?.len(),
        ))
    }

    // Seeding

    pub async fn upsert_plan(&self, plan: &Plan) -> EngineResult<Uuid> {
        let id = self.storage.upsert_plan(plan).await?;
        debug!(plan = %plan.name, plan_id = %id, "Plan upserted");
        Ok(id)
    }

    pub async fn upsert_module(&self, module: &Module) -> EngineResult<Uuid> {
        let id = self.storage.upsert_module(module).await?;
        debug!(module = %module.name, module_id = %id, "Module upserted");
        Ok(id)
    }

    /// Insert a (plan, module) link, or update it when the pair exists.
    pub async fn upsert_plan_module(&self, plan_module: &PlanModule) -> EngineResult<Uuid> {
        Ok(self.storage.upsert_plan_module(plan_module).await?)
    }

    /// Collapse duplicate (plan, module) links, keeping the earliest row.
    pub async fn repair_plan_modules(&self) -> EngineResult<usize> {
        let removed = self.storage.repair_plan_modules().await?;
        if removed > 0 {
            info!(removed = removed, "Collapsed duplicate plan modules");
        }
        Ok(removed)
    }

    pub async fn upsert_rule_template(&self, template: &RuleTemplate) -> EngineResult<Uuid> {
        let id = self.storage.upsert_rule_template(template).await?;
        debug!(rule_key = %template.key, template_id = %id, "Rule template upserted");
        Ok(id)
    }

    pub async fn upsert_permission(&self, permission: &Permission) -> EngineResult<Uuid> {
        Ok(self.storage.upsert_permission(permission).await?)
    }

    pub async fn upsert_role_default(&self, grant: &RoleDefaultGrant) -> EngineResult<()> {
        Ok(self.storage.upsert_role_default(grant).await?)
    }
}
