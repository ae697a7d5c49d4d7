// src/storage/postgres.rs
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{
    Module, Permission, Plan, PlanModule, Role, RoleDefaultGrant, RuleAssignment, RuleBounds,
    RuleTemplate, Subscription, SubscriptionStatus, UserGrant,
};

use super::traits::{Storage, StorageError, StorageResult};

/// PostgreSQL implementation of the Storage trait.
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgresStorage instance with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map an insert failure, surfacing unique violations so callers can retry
/// as an update.
fn insert_error(e: sqlx::Error) -> StorageError {
    if e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
    {
        return StorageError::UniqueViolation;
    }
    StorageError::Database(e)
}

fn corrupt(table: &'static str, reason: String) -> StorageError {
    StorageError::CorruptRow { table, reason }
}

fn opt_u32(value: Option<i32>) -> Option<u32> {
    value.and_then(|v| u32::try_from(v).ok())
}

fn plan_from_row(row: &PgRow) -> StorageResult<Plan> {
    let status: String = row.try_get("status")?;
    let billing_cycle: String = row.try_get("billing_cycle")?;

    Ok(Plan {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: status.parse().map_err(|e| corrupt("plans", e))?,
        price: row.try_get("price")?,
        billing_cycle: billing_cycle.parse().map_err(|e| corrupt("plans", e))?,
        trial_days: opt_u32(row.try_get("trial_days")?),
        created_at: row.try_get("created_at")?,
    })
}

fn module_from_row(row: &PgRow) -> StorageResult<Module> {
    Ok(Module {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        category: row.try_get("category")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn template_from_row(row: &PgRow) -> StorageResult<RuleTemplate> {
    let value_type: String = row.try_get("value_type")?;
    let bounds: serde_json::Value = row.try_get("bounds")?;

    Ok(RuleTemplate {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        value_type: value_type.parse().map_err(|e| corrupt("rule_templates", e))?,
        category: row.try_get("category")?,
        default_value: row.try_get("default_value")?,
        bounds: serde_json::from_value::<RuleBounds>(bounds)?,
        required_module: row.try_get("required_module")?,
        active: row.try_get("active")?,
        description: row.try_get("description")?,
    })
}

fn permission_from_row(row: &PgRow) -> StorageResult<Permission> {
    Ok(Permission {
        id: row.try_get("id")?,
        key: row.try_get("key")?,
        category: row.try_get("category")?,
        active: row.try_get("active")?,
    })
}

fn subscription_from_row(row: &PgRow) -> StorageResult<Subscription> {
    let status: String = row.try_get("status")?;

    Ok(Subscription {
        id: row.try_get("id")?,
        business_id: row.try_get("business_id")?,
        plan_id: row.try_get("plan_id")?,
        status: status.parse().map_err(|e| corrupt("subscriptions", e))?,
        starts_at: row.try_get("starts_at")?,
        ends_at: row.try_get("ends_at")?,
        created_at: row.try_get("created_at")?,
    })
}

fn assignment_from_row(row: &PgRow) -> StorageResult<RuleAssignment> {
    Ok(RuleAssignment {
        id: row.try_get("id")?,
        business_id: row.try_get("business_id")?,
        template_id: row.try_get("template_id")?,
        custom_value: row.try_get("custom_value")?,
        active: row.try_get("active")?,
        notes: row.try_get("notes")?,
        assigned_at: row.try_get("assigned_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn user_grant_from_row(row: &PgRow) -> StorageResult<UserGrant> {
    Ok(UserGrant {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        business_id: row.try_get("business_id")?,
        permission_id: row.try_get("permission_id")?,
        granted: row.try_get("granted")?,
        granted_by: row.try_get("granted_by")?,
        granted_at: row.try_get("granted_at")?,
        notes: row.try_get("notes")?,
    })
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn get_plan(&self, plan_id: Uuid) -> StorageResult<Option<Plan>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, status, price, billing_cycle, trial_days, created_at
            FROM plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(plan_from_row).transpose()
    }

    async fn list_plans(&self) -> StorageResult<Vec<Plan>> {
        sqlx::query(
            r#"
            SELECT id, name, status, price, billing_cycle, trial_days, created_at
            FROM plans
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(plan_from_row)
        .collect()
    }

    async fn upsert_plan(&self, plan: &Plan) -> StorageResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO plans (id, name, status, price, billing_cycle, trial_days, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (name)
            DO UPDATE SET
                status = EXCLUDED.status,
                price = EXCLUDED.price,
                billing_cycle = EXCLUDED.billing_cycle,
                trial_days = EXCLUDED.trial_days
            RETURNING id
            "#,
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(plan.status.as_str())
        .bind(plan.price)
        .bind(plan.billing_cycle.as_str())
        .bind(plan.trial_days.map(|d| d as i32))
        .bind(plan.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_module_by_name(&self, name: &str) -> StorageResult<Option<Module>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, category, active, created_at
            FROM modules
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(module_from_row).transpose()
    }

    async fn list_modules(&self) -> StorageResult<Vec<Module>> {
        sqlx::query("SELECT id, name, category, active, created_at FROM modules ORDER BY name")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(module_from_row)
            .collect()
    }

    async fn upsert_module(&self, module: &Module) -> StorageResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO modules (id, name, category, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name)
            DO UPDATE SET
                category = EXCLUDED.category,
                active = EXCLUDED.active
            RETURNING id
            "#,
        )
        .bind(module.id)
        .bind(&module.name)
        .bind(&module.category)
        .bind(module.active)
        .bind(module.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_plan_modules(&self, plan_id: Uuid) -> StorageResult<Vec<(PlanModule, Module)>> {
        let rows = sqlx::query(
            r#"
            SELECT pm.id AS pm_id, pm.plan_id, pm.module_id, pm.included,
                   pm.quantity_limit, pm.additional_price, pm.created_at AS pm_created_at,
                   m.id, m.name, m.category, m.active, m.created_at
            FROM plan_modules pm
            JOIN modules m ON m.id = pm.module_id
            WHERE pm.plan_id = $1
            ORDER BY m.name, pm.created_at
            "#,
        )
        .bind(plan_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let additional_price: Option<Decimal> = row.try_get("additional_price")?;
                let plan_module = PlanModule {
                    id: row.try_get("pm_id")?,
                    plan_id: row.try_get("plan_id")?,
                    module_id: row.try_get("module_id")?,
                    included: row.try_get("included")?,
                    quantity_limit: opt_u32(row.try_get("quantity_limit")?),
                    additional_price,
                    created_at: row.try_get("pm_created_at")?,
                };
                Ok((plan_module, module_from_row(row)?))
            })
            .collect()
    }

    async fn upsert_plan_module(&self, plan_module: &PlanModule) -> StorageResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO plan_modules
                (id, plan_id, module_id, included, quantity_limit, additional_price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (plan_id, module_id)
            DO UPDATE SET
                included = EXCLUDED.included,
                quantity_limit = EXCLUDED.quantity_limit,
                additional_price = EXCLUDED.additional_price
            RETURNING id
            "#,
        )
        .bind(plan_module.id)
        .bind(plan_module.plan_id)
        .bind(plan_module.module_id)
        .bind(plan_module.included)
        .bind(plan_module.quantity_limit.map(|q| q as i32))
        .bind(plan_module.additional_price)
        .bind(plan_module.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn repair_plan_modules(&self) -> StorageResult<usize> {
        let result = sqlx::query(
            r#"
            DELETE FROM plan_modules dup
            USING plan_modules keep
            WHERE dup.plan_id = keep.plan_id
              AND dup.module_id = keep.module_id
              AND (keep.created_at, keep.id) < (dup.created_at, dup.id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() as usize)
    }

    async fn get_rule_template(&self, key: &str) -> StorageResult<Option<RuleTemplate>> {
        let row = sqlx::query(
            r#"
            SELECT id, key, value_type, category, default_value, bounds,
                   required_module, active, description
            FROM rule_templates
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(template_from_row).transpose()
    }

    async fn list_rule_templates(&self) -> StorageResult<Vec<RuleTemplate>> {
        sqlx::query(
            r#"
            SELECT id, key, value_type, category, default_value, bounds,
                   required_module, active, description
            FROM rule_templates
            ORDER BY key
            "#,
        )
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(template_from_row)
        .collect()
    }

    async fn upsert_rule_template(&self, template: &RuleTemplate) -> StorageResult<Uuid> {
        let bounds = serde_json::to_value(&template.bounds)?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO rule_templates
                (id, key, value_type, category, default_value, bounds,
                 required_module, active, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (key)
            DO UPDATE SET
                value_type = EXCLUDED.value_type,
                category = EXCLUDED.category,
                default_value = EXCLUDED.default_value,
                bounds = EXCLUDED.bounds,
                required_module = EXCLUDED.required_module,
                active = EXCLUDED.active,
                description = EXCLUDED.description
            RETURNING id
            "#,
        )
        .bind(template.id)
        .bind(&template.key)
        .bind(template.value_type.as_str())
        .bind(&template.category)
        .bind(&template.default_value)
        .bind(bounds)
        .bind(&template.required_module)
        .bind(template.active)
        .bind(&template.description)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_permission(&self, key: &str) -> StorageResult<Option<Permission>> {
        let row = sqlx::query("SELECT id, key, category, active FROM permissions WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(permission_from_row).transpose()
    }

    async fn list_permissions(&self) -> StorageResult<Vec<Permission>> {
        sqlx::query("SELECT id, key, category, active FROM permissions ORDER BY key")
            .fetch_all(&self.pool)
            .await?
            .iter()
            .map(permission_from_row)
            .collect()
    }

    async fn upsert_permission(&self, permission: &Permission) -> StorageResult<Uuid> {
        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO permissions (id, key, category, active)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (key)
            DO UPDATE SET
                category = EXCLUDED.category,
                active = EXCLUDED.active
            RETURNING id
            "#,
        )
        .bind(permission.id)
        .bind(&permission.key)
        .bind(&permission.category)
        .bind(permission.active)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_role_default(
        &self,
        role: &Role,
        permission_id: Uuid,
    ) -> StorageResult<Option<RoleDefaultGrant>> {
        let granted: Option<bool> = sqlx::query_scalar(
            r#"
            SELECT granted
            FROM role_default_grants
            WHERE role = $1 AND permission_id = $2
            "#,
        )
        .bind(role.as_str())
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(granted.map(|granted| RoleDefaultGrant {
            role: role.clone(),
            permission_id,
            granted,
        }))
    }

    async fn list_role_defaults(&self, role: &Role) -> StorageResult<Vec<RoleDefaultGrant>> {
        let rows = sqlx::query(
            "SELECT permission_id, granted FROM role_default_grants WHERE role = $1",
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(RoleDefaultGrant {
                    role: role.clone(),
                    permission_id: row.try_get("permission_id")?,
                    granted: row.try_get("granted")?,
                })
            })
            .collect()
    }

    async fn upsert_role_default(&self, grant: &RoleDefaultGrant) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_default_grants (role, permission_id, granted)
            VALUES ($1, $2, $3)
            ON CONFLICT (role, permission_id)
            DO UPDATE SET granted = EXCLUDED.granted
            "#,
        )
        .bind(grant.role.as_str())
        .bind(grant.permission_id)
        .bind(grant.granted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_subscriptions(&self, business_id: Uuid) -> StorageResult<Vec<Subscription>> {
        sqlx::query(
            r#"
            SELECT id, business_id, plan_id, status, starts_at, ends_at, created_at
            FROM subscriptions
            WHERE business_id = $1
            ORDER BY starts_at DESC, created_at DESC
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(subscription_from_row)
        .collect()
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, business_id, plan_id, status, starts_at, ends_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(subscription.id)
        .bind(subscription.business_id)
        .bind(subscription.plan_id)
        .bind(subscription.status.as_str())
        .bind(subscription.starts_at)
        .bind(subscription.ends_at)
        .bind(subscription.created_at)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;

        Ok(())
    }

    async fn set_subscription_status(
        &self,
        subscription_id: Uuid,
        status: SubscriptionStatus,
    ) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE subscriptions SET status = $2 WHERE id = $1")
            .bind(subscription_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_assignment(
        &self,
        business_id: Uuid,
        template_id: Uuid,
    ) -> StorageResult<Option<RuleAssignment>> {
        let row = sqlx::query(
            r#"
            SELECT id, business_id, template_id, custom_value, active, notes,
                   assigned_at, updated_at
            FROM rule_assignments
            WHERE business_id = $1 AND template_id = $2
            "#,
        )
        .bind(business_id)
        .bind(template_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn list_assignments(&self, business_id: Uuid) -> StorageResult<Vec<RuleAssignment>> {
        sqlx::query(
            r#"
            SELECT id, business_id, template_id, custom_value, active, notes,
                   assigned_at, updated_at
            FROM rule_assignments
            WHERE business_id = $1
            ORDER BY assigned_at
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(assignment_from_row)
        .collect()
    }

    async fn insert_assignment(&self, assignment: &RuleAssignment) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rule_assignments
                (id, business_id, template_id, custom_value, active, notes, assigned_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(assignment.id)
        .bind(assignment.business_id)
        .bind(assignment.template_id)
        .bind(&assignment.custom_value)
        .bind(assignment.active)
        .bind(&assignment.notes)
        .bind(assignment.assigned_at)
        .bind(assignment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(insert_error)?;

        Ok(())
    }

    async fn write_assignment_value(&self, candidate: &RuleAssignment) -> StorageResult<RuleAssignment> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT id FROM rule_assignments
            WHERE business_id = $1 AND template_id = $2
            FOR UPDATE
            "#,
        )
        .bind(candidate.business_id)
        .bind(candidate.template_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE rule_assignments
                SET custom_value = $3,
                    active = TRUE,
                    notes = COALESCE($4, notes),
                    updated_at = $5
                WHERE business_id = $1 AND template_id = $2
                RETURNING id, business_id, template_id, custom_value, active, notes,
                          assigned_at, updated_at
                "#,
            )
            .bind(candidate.business_id)
            .bind(candidate.template_id)
            .bind(&candidate.custom_value)
            .bind(&candidate.notes)
            .bind(candidate.updated_at)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO rule_assignments
                    (id, business_id, template_id, custom_value, active, notes, assigned_at, updated_at)
                VALUES ($1, $2, $3, $4, TRUE, $5, $6, $7)
                RETURNING id, business_id, template_id, custom_value, active, notes,
                          assigned_at, updated_at
                "#,
            )
            .bind(candidate.id)
            .bind(candidate.business_id)
            .bind(candidate.template_id)
            .bind(&candidate.custom_value)
            .bind(&candidate.notes)
            .bind(candidate.assigned_at)
            .bind(candidate.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(insert_error)?
        };

        let assignment = assignment_from_row(&row)?;
        tx.commit().await?;

        Ok(assignment)
    }

    async fn set_assignment_active(
        &self,
        business_id: Uuid,
        template_id: Uuid,
        active: bool,
    ) -> StorageResult<Option<RuleAssignment>> {
        let row = sqlx::query(
            r#"
            UPDATE rule_assignments
            SET active = $3,
                updated_at = $4
            WHERE business_id = $1 AND template_id = $2
            RETURNING id, business_id, template_id, custom_value, active, notes,
                      assigned_at, updated_at
            "#,
        )
        .bind(business_id)
        .bind(template_id)
        .bind(active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(assignment_from_row).transpose()
    }

    async fn delete_assignment(&self, business_id: Uuid, template_id: Uuid) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM rule_assignments WHERE business_id = $1 AND template_id = $2",
        )
        .bind(business_id)
        .bind(template_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<Option<UserGrant>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, business_id, permission_id, granted, granted_by, granted_at, notes
            FROM user_grants
            WHERE user_id = $1 AND business_id = $2 AND permission_id = $3
            "#,
        )
        .bind(user_id)
        .bind(business_id)
        .bind(permission_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(user_grant_from_row).transpose()
    }

    async fn list_user_grants(
        &self,
        user_id: Uuid,
        business_id: Uuid,
    ) -> StorageResult<Vec<UserGrant>> {
        sqlx::query(
            r#"
            SELECT id, user_id, business_id, permission_id, granted, granted_by, granted_at, notes
            FROM user_grants
            WHERE user_id = $1 AND business_id = $2
            "#,
        )
        .bind(user_id)
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?
        .iter()
        .map(user_grant_from_row)
        .collect()
    }

    async fn write_user_grant(&self, grant: &UserGrant) -> StorageResult<UserGrant> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query(
            r#"
            SELECT id FROM user_grants
            WHERE user_id = $1 AND business_id = $2 AND permission_id = $3
            FOR UPDATE
            "#,
        )
        .bind(grant.user_id)
        .bind(grant.business_id)
        .bind(grant.permission_id)
        .fetch_optional(&mut *tx)
        .await?;

        let row = if existing.is_some() {
            sqlx::query(
                r#"
                UPDATE user_grants
                SET granted = $4,
                    granted_by = $5,
                    granted_at = $6,
                    notes = $7
                WHERE user_id = $1 AND business_id = $2 AND permission_id = $3
                RETURNING id, user_id, business_id, permission_id, granted, granted_by,
                          granted_at, notes
                "#,
            )
            .bind(grant.user_id)
            .bind(grant.business_id)
            .bind(grant.permission_id)
            .bind(grant.granted)
            .bind(grant.granted_by)
            .bind(grant.granted_at)
            .bind(&grant.notes)
            .fetch_one(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                INSERT INTO user_grants
                    (id, user_id, business_id, permission_id, granted, granted_by, granted_at, notes)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, user_id, business_id, permission_id, granted, granted_by,
                          granted_at, notes
                "#,
            )
            .bind(grant.id)
            .bind(grant.user_id)
            .bind(grant.business_id)
            .bind(grant.permission_id)
            .bind(grant.granted)
            .bind(grant.granted_by)
            .bind(grant.granted_at)
            .bind(&grant.notes)
            .fetch_one(&mut *tx)
            .await
            .map_err(insert_error)?
        };

        let stored = user_grant_from_row(&row)?;
        tx.commit().await?;

        Ok(stored)
    }

    async fn delete_user_grant(
        &self,
        user_id: Uuid,
        business_id: Uuid,
        permission_id: Uuid,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "DELETE FROM user_grants WHERE user_id = $1 AND business_id = $2 AND permission_id = $3",
        )
        .bind(user_id)
        .bind(business_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
