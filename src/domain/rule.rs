use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declared type of a rule template's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Json,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::String => "STRING",
            ValueType::Number => "NUMBER",
            ValueType::Boolean => "BOOLEAN",
            ValueType::Json => "JSON",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STRING" => Ok(ValueType::String),
            "NUMBER" => Ok(ValueType::Number),
            "BOOLEAN" => Ok(ValueType::Boolean),
            "JSON" => Ok(ValueType::Json),
            other => Err(format!("unknown value type: {other}")),
        }
    }
}

/// Required top-level shape of a JSON rule value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonKind {
    Object,
    Array,
}

/// Validation bounds applied when a value is written.
///
/// `min`/`max` apply to NUMBER, the length limits and `options` to STRING,
/// `json_kind` to JSON. Bounds that do not match the template type are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Closed set of accepted strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_kind: Option<JsonKind>,
}

impl RuleBounds {
    /// Numeric range bounds.
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        RuleBounds {
            min,
            max,
            ..Default::default()
        }
    }
}

/// Platform-defined configurable setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTemplate {
    pub id: Uuid,

    /// Unique key, e.g. `LOYALTY_REFERRAL_POINTS`
    pub key: String,

    #[serde(rename = "type")]
    pub value_type: ValueType,

    pub category: String,

    /// Default value, stored loosely typed like custom values
    pub default_value: serde_json::Value,

    #[serde(default)]
    pub bounds: RuleBounds,

    /// Module whose absence hides the template entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_module: Option<String>,

    pub active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RuleTemplate {
    pub fn new(
        key: impl Into<String>,
        value_type: ValueType,
        category: impl Into<String>,
        default_value: serde_json::Value,
    ) -> Self {
        RuleTemplate {
            id: Uuid::new_v4(),
            key: key.into(),
            value_type,
            category: category.into(),
            default_value,
            bounds: RuleBounds::default(),
            required_module: None,
            active: true,
            description: None,
        }
    }

    pub fn with_bounds(mut self, bounds: RuleBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn requiring(mut self, module: impl Into<String>) -> Self {
        self.required_module = Some(module.into());
        self
    }

    /// Whether the template is visible given a business's entitled modules.
    pub fn is_available_with<'a>(&self, mut modules: impl Iterator<Item = &'a String>) -> bool {
        match &self.required_module {
            None => true,
            Some(required) => modules.any(|m| m == required),
        }
    }
}

/// A rule value typed per its template. Serialized untagged; the declared
/// `ValueType` travels next to it wherever it is read back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RuleValue {
    Boolean(bool),
    Number(f64),
    String(String),
    Json(serde_json::Value),
}

impl RuleValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            RuleValue::String(_) => ValueType::String,
            RuleValue::Number(_) => ValueType::Number,
            RuleValue::Boolean(_) => ValueType::Boolean,
            RuleValue::Json(_) => ValueType::Json,
        }
    }

    /// Raw payload for the loosely-typed storage column.
    ///
    /// JSON values are stored as their serialized text so a JSON string
    /// cannot be mistaken for text to parse when it is read back.
    pub fn to_raw(&self) -> serde_json::Value {
        match self {
            RuleValue::String(s) => serde_json::Value::String(s.clone()),
            RuleValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            RuleValue::Boolean(b) => serde_json::Value::Bool(*b),
            RuleValue::Json(v) => serde_json::Value::String(v.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RuleValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RuleValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RuleValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Default,
    Custom,
}

/// Effective value of a rule for one business.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRule {
    pub key: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub value: RuleValue,
    pub provenance: Provenance,
}

impl ResolvedRule {
    #[inline]
    pub fn is_custom(&self) -> bool {
        self.provenance == Provenance::Custom
    }
}

/// A business's attachment to a rule template. Unique per
/// (business_id, template_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAssignment {
    pub id: Uuid,
    pub business_id: Uuid,
    pub template_id: Uuid,
    pub custom_value: Option<serde_json::Value>,
    pub active: bool,
    pub notes: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RuleAssignment {
    /// A fresh assignment with no override; the template default applies.
    pub fn new(business_id: Uuid, template_id: Uuid) -> Self {
        let now = Utc::now();
        RuleAssignment {
            id: Uuid::new_v4(),
            business_id,
            template_id,
            custom_value: None,
            active: true,
            notes: None,
            assigned_at: now,
            updated_at: now,
        }
    }
}
