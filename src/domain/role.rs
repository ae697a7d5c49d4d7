use serde::{Deserialize, Serialize};
use std::fmt;

/// Role name of the platform operator. Bypasses tenant scoping and every
/// permission check.
pub const OPERATOR_ROLE: &str = "PLATFORM_ADMIN";

/// Role carried by an authenticated session.
///
/// Roles are plain data: their behavior comes from the role default grant
/// matrix, not from per-role types. Names are normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Role(name.into().trim().to_uppercase())
    }

    /// The privileged operator role.
    pub fn operator() -> Self {
        Role(OPERATOR_ROLE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for the cross-tenant operator role.
    #[inline]
    pub fn is_operator(&self) -> bool {
        self.0 == OPERATOR_ROLE
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        Role::new(name)
    }
}
