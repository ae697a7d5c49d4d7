//! Shared test catalog.

use std::sync::Arc;
use uuid::Uuid;

use crate::catalog::{apply_seed, CatalogSeed, CatalogStore};
use crate::domain::{Subscription, SubscriptionStatus};
use crate::storage::{MemoryStorage, Storage};

pub(crate) const CATALOG: &str = r#"
modules:
  - name: booking
    category: core
  - name: loyalty
    category: marketing
plans:
  - name: Basic
    price: 19.90
    modules:
      - module: booking
      - module: loyalty
        included: false
  - name: Premium
    price: 49.90
    modules:
      - module: booking
      - module: loyalty
  - name: Legacy
    status: INACTIVE
    billing_cycle: LIFETIME
    modules:
      - module: booking
      - module: loyalty
rule_templates:
  - key: LOYALTY_REFERRAL_POINTS
    type: NUMBER
    category: loyalty
    default: 500
    bounds: { min: 0, max: 1000 }
    required_module: loyalty
  - key: BOOKING_BUFFER_MINUTES
    type: NUMBER
    category: booking
    default: 10
    bounds: { min: 0, max: 120 }
  - key: ONLINE_BOOKING_ENABLED
    type: BOOLEAN
    category: booking
    default: true
  - key: CANCELLATION_POLICY
    type: STRING
    category: booking
    default: flexible
    bounds:
      options: [flexible, strict]
  - key: BOOKING_WIDGET_SETTINGS
    type: JSON
    category: booking
    default: {}
  - key: RETIRED_RULE
    type: BOOLEAN
    category: misc
    default: false
    active: false
permissions:
  - key: business_rules.manage
    category: admin
  - key: permissions.manage
    category: admin
  - key: appointments.cancel
    category: booking
  - key: reports.view
    category: reports
role_defaults:
  OWNER:
    business_rules.manage: true
    permissions.manage: true
    appointments.cancel: true
    reports.view: true
  MANAGER:
    business_rules.manage: true
    appointments.cancel: true
    reports.view: false
  STAFF:
    appointments.cancel: false
"#;

pub(crate) struct Fixture {
    pub storage: Arc<MemoryStorage>,
    pub catalog: CatalogStore,
    pub basic: Uuid,
    pub premium: Uuid,
    pub legacy: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let catalog = CatalogStore::new(storage.clone());
        let seed: CatalogSeed = serde_yaml::from_str(CATALOG).unwrap();
        apply_seed(&catalog, &seed).await.unwrap();

        let plans = catalog.list_plans().await.unwrap();
        let plan_id = |name: &str| plans.iter().find(|p| p.name == name).unwrap().id;

        Fixture {
            basic: plan_id("Basic"),
            premium: plan_id("Premium"),
            legacy: plan_id("Legacy"),
            storage,
            catalog,
        }
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.storage.clone()
    }

    /// Start an active subscription that is more recent than any other.
    pub async fn subscribe(&self, business_id: Uuid, plan_id: Uuid) -> Subscription {
        let mut subscription = Subscription::new(business_id, plan_id, SubscriptionStatus::Active);
        let history = self.storage.list_subscriptions(business_id).await.unwrap();
        if let Some(latest) = history.iter().map(|s| s.starts_at).max() {
            if latest >= subscription.starts_at {
                subscription.starts_at = latest + chrono::Duration::seconds(1);
            }
        }
        self.storage.insert_subscription(&subscription).await.unwrap();
        subscription
    }
}
