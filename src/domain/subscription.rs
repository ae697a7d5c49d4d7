use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Lifecycle status of a subscription row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Canceled,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "TRIAL",
            SubscriptionStatus::Active => "ACTIVE",
            SubscriptionStatus::Canceled => "CANCELED",
            SubscriptionStatus::Expired => "EXPIRED",
        }
    }

    /// Only trial and active subscriptions can be current.
    #[inline]
    pub fn is_current(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRIAL" => Ok(SubscriptionStatus::Trial),
            "ACTIVE" => Ok(SubscriptionStatus::Active),
            "CANCELED" | "CANCELLED" => Ok(SubscriptionStatus::Canceled),
            "EXPIRED" => Ok(SubscriptionStatus::Expired),
            other => Err(format!("unknown subscription status: {other}")),
        }
    }
}

/// A business's subscription to a plan. Businesses keep their history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub business_id: Uuid,
    pub plan_id: Uuid,
    pub status: SubscriptionStatus,
    pub starts_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(business_id: Uuid, plan_id: Uuid, status: SubscriptionStatus) -> Self {
        let now = Utc::now();
        Subscription {
            id: Uuid::new_v4(),
            business_id,
            plan_id,
            status,
            starts_at: now,
            ends_at: None,
            created_at: now,
        }
    }

    /// Pick the current subscription out of a business's history: the most
    /// recent row whose status is trial or active.
    ///
    /// Recency is `starts_at`, then `created_at`, then id so the choice is
    /// stable regardless of input order.
    pub fn select_current<'a>(
        history: impl IntoIterator<Item = &'a Subscription>,
    ) -> Option<&'a Subscription> {
        history
            .into_iter()
            .filter(|s| s.status.is_current())
            .max_by(|a, b| {
                a.starts_at
                    .cmp(&b.starts_at)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
    }
}
