use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::role::Role;

/// Whether a plan can currently grant entitlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Active,
    Inactive,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Active => "ACTIVE",
            PlanStatus::Inactive => "INACTIVE",
        }
    }
}

impl FromStr for PlanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PlanStatus::Active),
            "INACTIVE" => Ok(PlanStatus::Inactive),
            other => Err(format!("unknown plan status: {other}")),
        }
    }
}

/// Billing cycle of a plan.
///
/// `Lifetime` plans are paid once; their subscriptions never carry an end
/// date. Lifetime is a plan attribute, not a subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    Lifetime,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
            BillingCycle::Yearly => "YEARLY",
            BillingCycle::Lifetime => "LIFETIME",
        }
    }
}

impl FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MONTHLY" => Ok(BillingCycle::Monthly),
            "YEARLY" => Ok(BillingCycle::Yearly),
            "LIFETIME" => Ok(BillingCycle::Lifetime),
            other => Err(format!("unknown billing cycle: {other}")),
        }
    }
}

impl fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub status: PlanStatus,
    pub price: Decimal,
    pub billing_cycle: BillingCycle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trial_days: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Plan {
    pub fn new(name: impl Into<String>, price: Decimal, billing_cycle: BillingCycle) -> Self {
        Plan {
            id: Uuid::new_v4(),
            name: name.into(),
            status: PlanStatus::Active,
            price,
            billing_cycle,
            trial_days: None,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.status == PlanStatus::Active
    }

    #[inline]
    pub fn is_lifetime(&self) -> bool {
        self.billing_cycle == BillingCycle::Lifetime
    }
}

/// Licensable feature area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub name: String,
    pub category: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Module {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Module {
            id: Uuid::new_v4(),
            name: name.into(),
            category: category.into(),
            active: true,
            created_at: Utc::now(),
        }
    }
}

/// Link between a plan and a module. Unique per (plan_id, module_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanModule {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub module_id: Uuid,
    pub included: bool,
    pub quantity_limit: Option<u32>,
    pub additional_price: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl PlanModule {
    pub fn new(plan_id: Uuid, module_id: Uuid, included: bool) -> Self {
        PlanModule {
            id: Uuid::new_v4(),
            plan_id,
            module_id,
            included,
            quantity_limit: None,
            additional_price: None,
            created_at: Utc::now(),
        }
    }
}

/// A module a plan grants, with its plan-specific terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleGrant {
    pub module: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_price: Option<Decimal>,
}

/// A checkable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub key: String,
    pub category: String,
    pub active: bool,
}

impl Permission {
    pub fn new(key: impl Into<String>, category: impl Into<String>) -> Self {
        Permission {
            id: Uuid::new_v4(),
            key: key.into(),
            category: category.into(),
            active: true,
        }
    }
}

/// Baseline grant for every user of a role. Unique per (role, permission_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefaultGrant {
    pub role: Role,
    pub permission_id: Uuid,
    pub granted: bool,
}
