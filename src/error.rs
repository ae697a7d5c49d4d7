use thiserror::Error;
use uuid::Uuid;

use crate::domain::ValueType;
use crate::storage::StorageError;

/// Errors returned by the resolution engine.
///
/// Every failure is scoped to a single operation. None of them are retried
/// automatically.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Unknown or inactive catalog key, or a tenant record outside the
    /// caller's business.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// The rule exists but the current plan does not include its module.
    #[error("rule '{rule_key}' requires module '{module}', which the current plan does not include")]
    ModuleNotEntitled { rule_key: String, module: String },

    /// A written value failed type, range or structure validation.
    #[error("invalid value for '{key}': {reason}")]
    InvalidInput { key: String, reason: String },

    /// A persisted value no longer parses under its declared type.
    #[error("stored value for '{key}' is not a valid {value_type}: {reason}")]
    InvalidStoredValue {
        key: String,
        value_type: ValueType,
        reason: String,
    },

    /// Strict assignment found an existing row.
    #[error("rule '{key}' is already assigned to business {business_id}")]
    AlreadyAssigned { key: String, business_id: Uuid },

    /// The actor lacks the permission an administrative operation needs.
    #[error("permission '{permission}' is required")]
    PermissionDenied { permission: String },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl EngineError {
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            key: key.into(),
        }
    }

    pub fn invalid_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidInput {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::NotFound { .. } => "NOT_FOUND",
            EngineError::ModuleNotEntitled { .. } => "MODULE_NOT_ENTITLED",
            EngineError::InvalidInput { .. } => "INVALID_INPUT",
            EngineError::InvalidStoredValue { .. } => "INVALID_STORED_VALUE",
            EngineError::AlreadyAssigned { .. } => "ALREADY_ASSIGNED",
            EngineError::PermissionDenied { .. } => "PERMISSION_DENIED",
            EngineError::Storage(_) => "STORAGE_ERROR",
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
