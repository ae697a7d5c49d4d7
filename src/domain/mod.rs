pub mod catalog;
pub mod grant;
pub mod role;
pub mod rule;
pub mod subscription;

pub use catalog::{BillingCycle, Module, ModuleGrant, Permission, Plan, PlanModule, PlanStatus, RoleDefaultGrant};
pub use grant::UserGrant;
pub use role::{Role, OPERATOR_ROLE};
pub use rule::{
    JsonKind, Provenance, ResolvedRule, RuleAssignment, RuleBounds, RuleTemplate, RuleValue,
    ValueType,
};
pub use subscription::{Subscription, SubscriptionStatus};
