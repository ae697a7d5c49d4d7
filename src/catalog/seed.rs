//! YAML catalog seeding.
//!
//! A seed file describes the whole catalog. Loading validates it as a unit;
//! applying it is a sequence of idempotent upserts, so the same file can be
//! applied on every start.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

use super::CatalogStore;
use crate::domain::{
    BillingCycle, Module, Permission, Plan, PlanModule, PlanStatus, Role, RoleDefaultGrant,
    RuleBounds, RuleTemplate, ValueType,
};
use crate::error::EngineError;
use crate::rules::value;

/// Errors that can occur while loading or applying a seed.
#[derive(Error, Debug)]
pub enum SeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Seeding failed: {0}")]
    Engine(#[from] EngineError),
}

fn default_true() -> bool {
    true
}

fn default_status() -> PlanStatus {
    PlanStatus::Active
}

fn default_cycle() -> BillingCycle {
    BillingCycle::Monthly
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub modules: Vec<ModuleSeed>,

    #[serde(default)]
    pub plans: Vec<PlanSeed>,

    #[serde(default)]
    pub rule_templates: Vec<TemplateSeed>,

    #[serde(default)]
    pub permissions: Vec<PermissionSeed>,

    /// role -> permission key -> granted
    #[serde(default)]
    pub role_defaults: BTreeMap<String, BTreeMap<String, bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSeed {
    pub name: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSeed {
    pub name: String,
    #[serde(default = "default_status")]
    pub status: PlanStatus,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default = "default_cycle")]
    pub billing_cycle: BillingCycle,
    #[serde(default)]
    pub trial_days: Option<u32>,
    #[serde(default)]
    pub modules: Vec<PlanModuleSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanModuleSeed {
    pub module: String,
    #[serde(default = "default_true")]
    pub included: bool,
    #[serde(default)]
    pub quantity_limit: Option<u32>,
    #[serde(default)]
    pub additional_price: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateSeed {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub category: String,
    pub default: serde_json::Value,
    #[serde(default)]
    pub bounds: RuleBounds,
    #[serde(default)]
    pub required_module: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub description: Option<String>,
}

impl TemplateSeed {
    fn to_template(&self) -> RuleTemplate {
        let mut template = RuleTemplate::new(
            self.key.clone(),
            self.value_type,
            self.category.clone(),
            self.default.clone(),
        )
        .with_bounds(self.bounds.clone());
        template.required_module = self.required_module.clone();
        template.active = self.active;
        template.description = self.description.clone();
        template
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionSeed {
    pub key: String,
    pub category: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

/// Counts of what a seed run wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub modules: usize,
    pub plans: usize,
    pub plan_modules: usize,
    pub rule_templates: usize,
    pub permissions: usize,
    pub role_defaults: usize,
    pub repaired_plan_modules: usize,
}

/// Load a catalog seed from a YAML file.
pub fn load_seed(path: impl AsRef<Path>) -> Result<CatalogSeed, SeedError> {
    let content = fs::read_to_string(path)?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    validate_seed(&seed)?;

    Ok(seed)
}

fn check_unique<'a>(
    what: &str,
    keys: impl IntoIterator<Item = &'a str>,
) -> Result<HashSet<&'a str>, SeedError> {
    let mut seen = HashSet::new();
    for key in keys {
        if key.trim().is_empty() {
            return Err(SeedError::Validation(format!("{what} name cannot be empty")));
        }
        if !seen.insert(key) {
            return Err(SeedError::Validation(format!("Duplicate {what}: {key}")));
        }
    }
    Ok(seen)
}

/// Validate seed references and template defaults.
fn validate_seed(seed: &CatalogSeed) -> Result<(), SeedError> {
    let modules = check_unique("module", seed.modules.iter().map(|m| m.name.as_str()))?;
    check_unique("plan", seed.plans.iter().map(|p| p.name.as_str()))?;
    check_unique("rule template", seed.rule_templates.iter().map(|t| t.key.as_str()))?;
    let permissions = check_unique("permission", seed.permissions.iter().map(|p| p.key.as_str()))?;

    for plan in &seed.plans {
        let mut linked = HashSet::new();
        for link in &plan.modules {
            if !modules.contains(link.module.as_str()) {
                return Err(SeedError::Validation(format!(
                    "Plan '{}' references unknown module '{}'",
                    plan.name, link.module
                )));
            }
            if !linked.insert(link.module.as_str()) {
                return Err(SeedError::Validation(format!(
                    "Plan '{}' lists module '{}' twice",
                    plan.name, link.module
                )));
            }
        }
    }

    for seed_template in &seed.rule_templates {
        if let Some(module) = &seed_template.required_module {
            if !modules.contains(module.as_str()) {
                return Err(SeedError::Validation(format!(
                    "Rule template '{}' requires unknown module '{}'",
                    seed_template.key, module
                )));
            }
        }

        let template = seed_template.to_template();
        value::check_bounds_definition(&template.bounds)
            .and_then(|_| value::validate_input(&template, &template.default_value))
            .map_err(|e| {
                SeedError::Validation(format!(
                    "Rule template '{}' has an invalid default: {e}",
                    template.key
                ))
            })?;
    }

    for (role, grants) in &seed.role_defaults {
        if role.trim().is_empty() {
            return Err(SeedError::Validation("Role name cannot be empty".to_string()));
        }
        for key in grants.keys() {
            if !permissions.contains(key.as_str()) {
                return Err(SeedError::Validation(format!(
                    "Role '{role}' references unknown permission '{key}'"
                )));
            }
        }
    }

    Ok(())
}

/// Write a validated seed into the catalog, then collapse any duplicate
/// plan-module rows left over from earlier runs.
pub async fn apply_seed(catalog: &CatalogStore, seed: &CatalogSeed) -> Result<SeedReport, SeedError> {
    let mut report = SeedReport::default();

    let mut module_ids = HashMap::new();
    for m in &seed.modules {
        let mut module = Module::new(m.name.clone(), m.category.clone());
        module.active = m.active;
        let id = catalog.upsert_module(&module).await?;
        module_ids.insert(m.name.as_str(), id);
        report.modules += 1;
    }

    for p in &seed.plans {
        let mut plan = Plan::new(p.name.clone(), p.price, p.billing_cycle);
        plan.status = p.status;
        plan.trial_days = p.trial_days;
        let plan_id = catalog.upsert_plan(&plan).await?;
        report.plans += 1;

        for link in &p.modules {
            let module_id = module_ids.get(link.module.as_str()).copied().ok_or_else(|| {
                SeedError::Validation(format!("Unknown module '{}'", link.module))
            })?;
            let mut plan_module = PlanModule::new(plan_id, module_id, link.included);
            plan_module.quantity_limit = link.quantity_limit;
            plan_module.additional_price = link.additional_price;
            catalog.upsert_plan_module(&plan_module).await?;
            report.plan_modules += 1;
        }
    }

    for t in &seed.rule_templates {
        catalog.upsert_rule_template(&t.to_template()).await?;
        report.rule_templates += 1;
    }

    let mut permission_ids = HashMap::new();
    for p in &seed.permissions {
        let mut permission = Permission::new(p.key.clone(), p.category.clone());
        permission.active = p.active;
        let id = catalog.upsert_permission(&permission).await?;
        permission_ids.insert(p.key.as_str(), id);
        report.permissions += 1;
    }

    for (role, grants) in &seed.role_defaults {
        let role = Role::new(role);
        for (key, granted) in grants {
            let permission_id = permission_ids.get(key.as_str()).copied().ok_or_else(|| {
                SeedError::Validation(format!("Unknown permission '{key}'"))
            })?;
            catalog
                .upsert_role_default(&RoleDefaultGrant {
                    role: role.clone(),
                    permission_id,
                    granted: *granted,
                })
                .await?;
            report.role_defaults += 1;
        }
    }

    report.repaired_plan_modules = catalog.repair_plan_modules().await?;

    info!(
        modules = report.modules,
        plans = report.plans,
        rule_templates = report.rule_templates,
        permissions = report.permissions,
        role_defaults = report.role_defaults,
        "Catalog seed applied"
    );

    Ok(report)
}

/// Loads a seed file from a fixed path.
pub struct SeedLoader {
    path: String,
}

impl SeedLoader {
    pub fn new(path: impl Into<String>) -> Self {
        SeedLoader { path: path.into() }
    }

    pub fn load(&self) -> Result<CatalogSeed, SeedError> {
        load_seed(&self.path)
    }

    /// Load and apply in one step.
    pub async fn seed(&self, catalog: &CatalogStore) -> Result<SeedReport, SeedError> {
        let seed = self.load()?;
        apply_seed(catalog, &seed).await
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}
