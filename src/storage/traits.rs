// src/storage/traits.rs
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Module, Permission, Plan, PlanModule, Role, RoleDefaultGrant, RuleAssignment, RuleTemplate,
    Subscription, SubscriptionStatus, UserGrant,
};

/// Errors surfaced by storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// A uniqueness constraint rejected an insert. Callers retry as update.
    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted column holds something the domain cannot represent.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Storage trait for persistence operations.
///
/// Catalog writes are idempotent upserts keyed by natural key; they are only
/// used by seeding. Tenant writes (assignments, user grants) are each one
/// transaction and only touch the columns they own. An insert that loses to
/// a concurrent insert reports `UniqueViolation` instead of overwriting.
#[async_trait]
pub trait Storage: Send + Sync {
    // Plans
    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<Plan>>;
    async fn list_plans(&self) -> StorageResult<Vec<Plan>>;
    async fn upsert_plan(&self, plan: &Plan) -> StorageResult<Uuid>;

    // Modules
    async fn get_module_by_name(&self, name: &str) -> StorageResult<Option<Module>>;
    async fn list_modules(&self) -> StorageResult<Vec<Module>>;
    async fn upsert_module(&self, module: &Module) -> StorageResult<Uuid>;

    // Plan modules
    async fn list_plan_modules(&self, plan_id: Uuid) -> StorageResult<Vec<(PlanModule, Module)>>;
    async fn upsert_plan_module(&self, plan_module: &PlanModule) -> StorageResult<Uuid>;
    /// Collapse duplicate (plan_id, module_id) rows, keeping the earliest.
    /// Returns the number of rows removed.
    async fn repair_plan_modules(&self) -> StorageResult<usize>;

    // Rule templates
    async fn get_rule_template(&self, key: &str) -> StorageResult<Option<RuleTemplate>>;
    async fn list_rule_templates(&self) -> StorageResult<Vec<RuleTemplate>>;
    async fn upsert_rule_template(&self, template: &RuleTemplate) -> StorageResult<Uuid>;

    // Permissions
    async fn get_permission(&self, key: &str) -> StorageResult<Option<Permission>>;
    async fn list_permissions(&self) -> StorageResult<Vec<Permission>>;
    async fn upsert_permission(&self, permission: &Permission) -> StorageResult<Uuid>;

    // Role defaults
    async fn get_role_default(
        &self,
        role: &Role,
        permission_id: Uuid,
    ) -> StorageResult<Option<RoleDefaultGrant>>;
    async fn list_role_defaults(&self, role: &Role) -> StorageResult<Vec<RoleDefaultGrant>>;
    async fn upsert_role_default(&self, grant: &RoleDefaultGrant) -> StorageResult<()>;

    // Subscriptions
    async fn list_subscriptions(&self, business_id: Uuid) -> StorageResult<Vec<Subscription>>;
    async fn insert_subscription(&self, subscription: &Subscription) -> StorageResult<()>;
    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StorageResult<bool>;

    // Rule assignments
    async fn get_assignment(
        &self,
        business_id: Uuid,
        template_id: Uuid,
    ) -> StorageResult<Option<RuleAssignment>>;
    async fn list_assignments(&self, business_id: Uuid) -> StorageResult<Vec<RuleAssignment>>;
    async fn insert_assignment(&self, assignment: &RuleAssignment) -> StorageResult<()>;
    /// Store `candidate.custom_value` on the (business_id, template_id) row
    /// and mark it active, inserting `candidate` when there is no row. An
    /// existing row keeps its id and `assigned_at`, and keeps its notes when
    /// `candidate.notes` is `None`.
    async fn write_assignment_value(&self, candidate: &RuleAssignment) -> StorageResult<RuleAssignment>;
    /// Set only the active flag. `None` when no row matched.
    async fn set_assignment_active(
        &self,
        business_id: Uuid,
        template_id: Uuid,
        active: bool,
    ) -> StorageResult<Option<RuleAssignment>>;
    async fn delete_assignment(&self, business_id: Uuid, template_id: Uuid) -> StorageResult<bool>;

    // User grants
    async fn get_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<Option<UserGrant>>;
    async fn list_user_grants(&self, user_id: Uuid, business_id: Uuid)
        -> StorageResult<Vec<UserGrant>>;
    /// Insert `grant`, or replace flag, grantor, time and notes of the row
    /// matching (user_id, business_id, permission_id).
    async fn write_user_grant(&self, grant: &UserGrant) -> StorageResult<UserGrant>;
    async fn delete_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<bool>;
}
