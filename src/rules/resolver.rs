use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::value;
use crate::catalog::CatalogStore;
use crate::domain::{Provenance, ResolvedRule, RuleAssignment, RuleTemplate};
use crate::entitlement::EntitlementResolver;
use crate::error::{EngineError, EngineResult};
use crate::observability::metrics::{MetricsRegistry, ResolutionTimer};
use crate::storage::Storage;

/// Resolves effective rule values for a business.
#[derive(Clone)]
pub struct RuleResolver {
    catalog: CatalogStore,
    entitlements: EntitlementResolver,
    storage: Arc<dyn Storage>,
    metrics: Arc<MetricsRegistry>,
}

impl RuleResolver {
    pub fn new(
        catalog: CatalogStore,
        entitlements: EntitlementResolver,
        storage: Arc<dyn Storage>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        RuleResolver {
            catalog,
            entitlements,
            storage,
            metrics,
        }
    }

    /// Effective value of one rule.
    ///
    /// Fails `NotFound` for unknown or inactive templates and
    /// `ModuleNotEntitled` when the current plan lacks the template's
    /// module. No assignment, an inactive one, or one without a custom value
    /// all yield the template default.
    pub async fn resolve_rule(&self, business_id: Uuid, key: &str) -> EngineResult<ResolvedRule> {
        let _timer = ResolutionTimer::new(&self.metrics);

        let template = self.catalog.get_active_rule_template(key).await?;

        if let Some(module) = &template.required_module {
            if !self.entitlements.has_module(business_id, module).await? {
                self.metrics.record_module_denial();
                debug!(business_id = %business_id, rule_key = key, module = %module, "Rule gated by module");
                return Err(EngineError::ModuleNotEntitled {
                    rule_key: template.key,
                    module: module.clone(),
                });
            }
        }

        let assignment = self.storage.get_assignment(business_id, template.id).await?;
        self.resolve_with(business_id, &template, assignment.as_ref())
    }

    /// Effective values of every rule the business can currently see.
    ///
    /// Entitlement is computed once; templates gated by a missing module are
    /// left out rather than reported.
    pub async fn resolve_all_rules(
        &self,
        business_id: Uuid,
    ) -> EngineResult<BTreeMap<String, ResolvedRule>> {
        let _timer = ResolutionTimer::new(&self.metrics);

        let modules = self.entitlements.resolve_modules(business_id).await?;
        let templates = self.catalog.list_assignable_templates(&modules).await?;
        let assignments: HashMap<Uuid, RuleAssignment> = self
            .storage
            .list_assignments(business_id)
            .await?
            .into_iter()
            .map(|a| (a.template_id, a))
            .collect();

        let mut resolved = BTreeMap::new();
        for template in &templates {
            let rule = self.resolve_with(business_id, template, assignments.get(&template.id))?;
            resolved.insert(template.key.clone(), rule);
        }

        debug!(business_id = %business_id, rules = resolved.len(), "Resolved all rules");
        Ok(resolved)
    }

    fn resolve_with(
        &self,
        business_id: Uuid,
        template: &RuleTemplate,
        assignment: Option<&RuleAssignment>,
    ) -> EngineResult<ResolvedRule> {
        match resolve_value(template, assignment) {
            Ok(rule) => {
                self.metrics.record_resolution(rule.provenance);
                Ok(rule)
            }
            Err(e) => {
                if let EngineError::InvalidStoredValue { reason, .. } = &e {
                    self.metrics.record_invalid_stored_value();
                    warn!(
                        business_id = %business_id,
                        rule_key = %template.key,
                        value_type = %template.value_type,
                        reason = %reason,
                        "Stored rule value does not match its declared type"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Pick the raw payload that applies and decode it under the template type.
pub fn resolve_value(
    template: &RuleTemplate,
    assignment: Option<&RuleAssignment>,
) -> EngineResult<ResolvedRule> {
    let custom = assignment
        .filter(|a| a.active)
        .and_then(|a| a.custom_value.as_ref())
        .filter(|v| !v.is_null());

    let (raw, provenance) = match custom {
        Some(raw) => (raw, Provenance::Custom),
        None => (&template.default_value, Provenance::Default),
    };

    let value = value::decode(template.value_type, raw).map_err(|e| {
        EngineError::InvalidStoredValue {
            key: template.key.clone(),
            value_type: template.value_type,
            reason: e.0,
        }
    })?;

    Ok(ResolvedRule {
        key: template.key.clone(),
        value_type: template.value_type,
        value,
        provenance,
    })
}
