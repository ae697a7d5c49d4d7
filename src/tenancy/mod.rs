//! Business isolation.
//!
//! Non-operator actors only ever see their own business. Records belonging
//! to another business are reported as not found, never as forbidden, so
//! their existence does not leak.

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Role, RuleAssignment, Subscription, UserGrant};
use crate::error::{EngineError, EngineResult};
use crate::observability::MetricsRegistry;
use crate::permissions::PermissionResolver;

/// A record owned by exactly one business.
pub trait TenantScoped {
    fn business_id(&self) -> Uuid;
}

impl TenantScoped for RuleAssignment {
    fn business_id(&self) -> Uuid {
        self.business_id
    }
}

impl TenantScoped for UserGrant {
    fn business_id(&self) -> Uuid {
        self.business_id
    }
}

impl TenantScoped for Subscription {
    fn business_id(&self) -> Uuid {
        self.business_id
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub business_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, business_id: Uuid, role: Role) -> Self {
        Actor {
            user_id,
            business_id,
            role,
        }
    }
}

/// Which businesses a query may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusinessScope {
    All,
    Only(Uuid),
}

impl BusinessScope {
    #[inline]
    pub fn permits(&self, business_id: Uuid) -> bool {
        match self {
            BusinessScope::All => true,
            BusinessScope::Only(own) => *own == business_id,
        }
    }
}

/// True iff `role` is the operator or the resource belongs to `business_id`.
pub fn assert_access<T: TenantScoped + ?Sized>(resource: &T, business_id: Uuid, role: &Role) -> bool {
    role.is_operator() || resource.business_id() == business_id
}

#[derive(Clone)]
pub struct TenancyGuard {
    permissions: PermissionResolver,
    metrics: Arc<MetricsRegistry>,
}

impl TenancyGuard {
    pub fn new(permissions: PermissionResolver, metrics: Arc<MetricsRegistry>) -> Self {
        TenancyGuard {
            permissions,
            metrics,
        }
    }

    pub fn scope_for(&self, actor: &Actor) -> BusinessScope {
        if actor.role.is_operator() {
            BusinessScope::All
        } else {
            BusinessScope::Only(actor.business_id)
        }
    }

    /// Admit the actor to `business_id` or fail `NotFound`.
    pub fn authorize_business(&self, actor: &Actor, business_id: Uuid) -> EngineResult<()> {
        if self.scope_for(actor).permits(business_id) {
            return Ok(());
        }

        self.metrics.record_tenancy_rejection();
        debug!(
            user_id = %actor.user_id,
            business_id = %business_id,
            "Cross-tenant access rejected"
        );
        Err(EngineError::not_found("business", business_id.to_string()))
    }

    /// Hide a record the actor may not see.
    pub fn visible<T: TenantScoped>(&self, actor: &Actor, record: Option<T>) -> Option<T> {
        let scope = self.scope_for(actor);
        match record {
            Some(r) if scope.permits(r.business_id()) => Some(r),
            Some(_) => {
                self.metrics.record_tenancy_rejection();
                None
            }
            None => None,
        }
    }

    pub fn filter_visible<T: TenantScoped>(&self, actor: &Actor, records: Vec<T>) -> Vec<T> {
        let scope = self.scope_for(actor);
        records
            .into_iter()
            .filter(|r| scope.permits(r.business_id()))
            .collect()
    }

    /// Admit the actor to the business, then require `permission` there.
    pub async fn authorize_action(
        &self,
        actor: &Actor,
        business_id: Uuid,
        permission: &str,
    ) -> EngineResult<()> {
        self.authorize_business(actor, business_id)?;

        if !self
            .permissions
            .is_granted(actor.user_id, business_id, &actor.role, permission)
            .await?
        {
            return Err(EngineError::PermissionDenied {
                permission: permission.to_string(),
            });
        }
        Ok(())
    }
}
