//! Which modules a business may use right now.
//!
//! Entitlement is derived from subscription history on every call. Nothing
//! here caches, so a plan change takes effect on the next request.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::CatalogStore;
use crate::domain::{ModuleGrant, Subscription, SubscriptionStatus};
use crate::error::{EngineError, EngineResult};
use crate::storage::Storage;

#[derive(Clone)]
pub struct EntitlementResolver {
    catalog: CatalogStore,
    storage: Arc<dyn Storage>,
}

impl EntitlementResolver {
    pub fn new(catalog: CatalogStore, storage: Arc<dyn Storage>) -> Self {
        EntitlementResolver { catalog, storage }
    }

    /// The most recent trial or active subscription, if any.
    pub async fn current_subscription(&self, business_id: Uuid) -> EngineResult<Option<Subscription>> {
        let history = self.storage.list_subscriptions(business_id).await?;
        Ok(Subscription::select_current(&history).cloned())
    }

    /// Included modules of the current plan with their terms.
    ///
    /// Empty when there is no current subscription or its plan is inactive.
    pub async fn resolve_grants(&self, business_id: Uuid) -> EngineResult<Vec<ModuleGrant>> {
        let Some(subscription) = self.current_subscription(business_id).await? else {
            debug!(business_id = %business_id, "No current subscription");
            return Ok(Vec::new());
        };

        match self.catalog.get_active_plan(subscription.plan_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!(
                    business_id = %business_id,
                    plan_id = %subscription.plan_id,
                    "Current plan is inactive"
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        }

        self.catalog.list_modules_for_plan(subscription.plan_id).await
    }

    /// Names of the modules the business is entitled to.
    pub async fn resolve_modules(&self, business_id: Uuid) -> EngineResult<BTreeSet<String>> {
        Ok(self
            .resolve_grants(business_id)
            .await?
            .into_iter()
            .map(|grant| grant.module)
            .collect())
    }

    pub async fn has_module(&self, business_id: Uuid, module: &str) -> EngineResult<bool> {
        Ok(self.resolve_modules(business_id).await?.contains(module))
    }

    /// Record a new subscription. The plan must be active.
    pub async fn subscribe(
        &self,
        business_id: Uuid,
        plan_id: Uuid,
        status: SubscriptionStatus,
    ) -> EngineResult<Subscription> {
        let plan = self.catalog.get_active_plan(plan_id).await?;
        let subscription = Subscription::new(business_id, plan.id, status);
        self.storage.insert_subscription(&subscription).await?;

        info!(
            business_id = %business_id,
            plan = %plan.name,
            status = status.as_str(),
            "Subscription recorded"
        );
        Ok(subscription)
    }

    pub async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> EngineResult<()> {
        if !self
            .storage
            .set_subscription_status(subscription_id, status)
            .await?
        {
            return Err(EngineError::not_found("subscription", subscription_id.to_string()));
        }
        info!(subscription_id = %subscription_id, status = status.as_str(), "Subscription status changed");
        Ok(())
    }
}
