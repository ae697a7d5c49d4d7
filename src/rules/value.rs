//! Parsing and validation of rule values.
//!
//! Values are persisted loosely typed (a raw JSON payload next to the
//! template's declared `ValueType`). This is the only place that turns a
//! raw payload into a `RuleValue`; resolvers and the assignment manager call
//! in here rather than casting on their own.

use serde_json::Value;
use thiserror::Error;

use crate::domain::{JsonKind, RuleBounds, RuleTemplate, RuleValue, ValueType};

/// Why a raw payload was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValueError(pub String);

impl ValueError {
    fn new(reason: impl Into<String>) -> Self {
        ValueError(reason.into())
    }
}

fn kind_of(raw: &Value) -> &'static str {
    match raw {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Decode a stored payload under its declared type.
///
/// A JSON value held as a string is JSON text and is parsed; any other
/// payload is the JSON value itself. Bounds are not re-checked: they guard writes, and tightening a template
/// must not make existing rows unreadable.
pub fn decode(value_type: ValueType, raw: &Value) -> Result<RuleValue, ValueError> {
    match value_type {
        ValueType::String => match raw {
            Value::String(s) => Ok(RuleValue::String(s.clone())),
            Value::Null => Err(ValueError::new("null is not a string")),
            other => Ok(RuleValue::String(other.to_string())),
        },
        ValueType::Number => decode_number(raw).map(RuleValue::Number),
        ValueType::Boolean => decode_boolean(raw).map(RuleValue::Boolean),
        ValueType::Json => match raw {
            Value::String(s) => serde_json::from_str(s)
                .map(RuleValue::Json)
                .map_err(|e| ValueError::new(format!("malformed JSON: {e}"))),
            other => Ok(RuleValue::Json(other.clone())),
        },
    }
}

fn decode_number(raw: &Value) -> Result<f64, ValueError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => {
            return Err(ValueError::new(format!(
                "expected a number, found {}",
                kind_of(other)
            )))
        }
    };

    parsed
        .filter(|n| n.is_finite())
        .ok_or_else(|| ValueError::new(format!("{raw} is not numeric")))
}

fn decode_boolean(raw: &Value) -> Result<bool, ValueError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s == "true" => Ok(true),
        Value::String(s) if s == "false" => Ok(false),
        other => Err(ValueError::new(format!("{other} is not a boolean literal"))),
    }
}

/// Validate a value supplied by an administrator against the template's
/// type and bounds, returning the typed value to store.
pub fn validate_input(template: &RuleTemplate, raw: &Value) -> Result<RuleValue, ValueError> {
    let value = match (template.value_type, raw) {
        (ValueType::String, Value::String(s)) => RuleValue::String(s.clone()),
        (ValueType::String, other) => {
            return Err(ValueError::new(format!(
                "expected a string, found {}",
                kind_of(other)
            )))
        }
        (value_type, raw) => decode(value_type, raw)?,
    };

    if value == RuleValue::Json(Value::Null) {
        return Err(ValueError::new(
            "null is not a value; unassign the rule to restore its default",
        ));
    }

    check_bounds(&template.bounds, &value)?;
    Ok(value)
}

/// Check a typed value against bounds.
pub fn check_bounds(bounds: &RuleBounds, value: &RuleValue) -> Result<(), ValueError> {
    match value {
        RuleValue::Number(n) => {
            if let Some(min) = bounds.min {
                if *n < min {
                    return Err(ValueError::new(format!("{n} is below the minimum {min}")));
                }
            }
            if let Some(max) = bounds.max {
                if *n > max {
                    return Err(ValueError::new(format!("{n} is above the maximum {max}")));
                }
            }
        }
        RuleValue::String(s) => {
            let len = s.chars().count();
            if let Some(min_length) = bounds.min_length {
                if len < min_length {
                    return Err(ValueError::new(format!(
                        "length {len} is shorter than {min_length}"
                    )));
                }
            }
            if let Some(max_length) = bounds.max_length {
                if len > max_length {
                    return Err(ValueError::new(format!(
                        "length {len} is longer than {max_length}"
                    )));
                }
            }
            if let Some(options) = &bounds.options {
                if !options.iter().any(|o| o == s) {
                    return Err(ValueError::new(format!(
                        "'{s}' is not one of [{}]",
                        options.join(", ")
                    )));
                }
            }
        }
        RuleValue::Json(v) => match bounds.json_kind {
            Some(JsonKind::Object) if !v.is_object() => {
                return Err(ValueError::new("expected a JSON object"));
            }
            Some(JsonKind::Array) if !v.is_array() => {
                return Err(ValueError::new("expected a JSON array"));
            }
            _ => {}
        },
        RuleValue::Boolean(_) => {}
    }

    Ok(())
}

/// Check that bounds are internally consistent.
pub fn check_bounds_definition(bounds: &RuleBounds) -> Result<(), ValueError> {
    if let (Some(min), Some(max)) = (bounds.min, bounds.max) {
        if min > max {
            return Err(ValueError::new(format!("min {min} exceeds max {max}")));
        }
    }
    if let (Some(min), Some(max)) = (bounds.min_length, bounds.max_length) {
        if min > max {
            return Err(ValueError::new(format!(
                "min_length {min} exceeds max_length {max}"
            )));
        }
    }
    if bounds.options.as_ref().is_some_and(|o| o.is_empty()) {
        return Err(ValueError::new("options must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn number_template(min: f64, max: f64) -> RuleTemplate {
        RuleTemplate::new("LOYALTY_REFERRAL_POINTS", ValueType::Number, "loyalty", json!(500))
            .with_bounds(RuleBounds::range(Some(min), Some(max)))
    }

    #[test]
    fn test_decode_number_forms() {
        assert_eq!(decode(ValueType::Number, &json!(750)), Ok(RuleValue::Number(750.0)));
        assert_eq!(decode(ValueType::Number, &json!(" 12.5 ")), Ok(RuleValue::Number(12.5)));
        assert!(decode(ValueType::Number, &json!("abc")).is_err());
        assert!(decode(ValueType::Number, &json!("NaN")).is_err());
        assert!(decode(ValueType::Number, &json!(true)).is_err());
    }

    #[test]
    fn test_decode_boolean_literals_only() {
        assert_eq!(decode(ValueType::Boolean, &json!(true)), Ok(RuleValue::Boolean(true)));
        assert_eq!(decode(ValueType::Boolean, &json!("false")), Ok(RuleValue::Boolean(false)));
        assert!(decode(ValueType::Boolean, &json!("TRUE")).is_err());
        assert!(decode(ValueType::Boolean, &json!("yes")).is_err());
        assert!(decode(ValueType::Boolean, &json!(1)).is_err());
    }

    #[test]
    fn test_decode_json_from_string_or_structure() {
        assert_eq!(
            decode(ValueType::Json, &json!("{\"mon\": [9, 18]}")),
            Ok(RuleValue::Json(json!({"mon": [9, 18]})))
        );
        assert_eq!(
            decode(ValueType::Json, &json!([1, 2])),
            Ok(RuleValue::Json(json!([1, 2])))
        );
        assert!(decode(ValueType::Json, &json!("{not json")).is_err());
    }

    #[test]
    fn test_json_values_read_back_as_written() {
        let template = RuleTemplate::new("WIDGET_SETTINGS", ValueType::Json, "booking", json!({}));

        for input in [
            json!("\"hi\""),
            json!("\"123\""),
            json!("42"),
            json!({"theme": "dark"}),
            json!([1, "two"]),
        ] {
            let written = validate_input(&template, &input).unwrap();
            let read = decode(ValueType::Json, &written.to_raw()).unwrap();
            assert_eq!(read, written, "input {input}");
        }

        let read = decode(
            ValueType::Json,
            &validate_input(&template, &json!("\"123\"")).unwrap().to_raw(),
        )
        .unwrap();
        assert_eq!(read, RuleValue::Json(json!("123")));
    }

    #[test]
    fn test_null_input_rejected() {
        let template = RuleTemplate::new("WIDGET_SETTINGS", ValueType::Json, "booking", json!({}));
        assert!(validate_input(&template, &Value::Null).is_err());
        assert!(validate_input(&template, &json!("null")).is_err());
        assert!(validate_input(&number_template(0.0, 10.0), &Value::Null).is_err());
    }

    #[test]
    fn test_decode_string_is_verbatim() {
        assert_eq!(
            decode(ValueType::String, &json!("  spaced ")),
            Ok(RuleValue::String("  spaced ".to_string()))
        );
        assert_eq!(
            decode(ValueType::String, &json!(42)),
            Ok(RuleValue::String("42".to_string()))
        );
        assert!(decode(ValueType::String, &Value::Null).is_err());
    }

    #[test]
    fn test_number_range_validation() {
        let template = number_template(0.0, 1000.0);

        assert_eq!(validate_input(&template, &json!(750)), Ok(RuleValue::Number(750.0)));
        assert_eq!(validate_input(&template, &json!(1000)), Ok(RuleValue::Number(1000.0)));

        let err = validate_input(&template, &json!(-1)).unwrap_err();
        assert!(err.0.contains("minimum"));
        let err = validate_input(&template, &json!("1000.5")).unwrap_err();
        assert!(err.0.contains("maximum"));
    }

    #[test]
    fn test_string_input_must_be_string() {
        let template = RuleTemplate::new("WELCOME_MESSAGE", ValueType::String, "branding", json!("Hi"))
            .with_bounds(RuleBounds {
                max_length: Some(5),
                ..Default::default()
            });

        assert!(validate_input(&template, &json!(12)).is_err());
        assert!(validate_input(&template, &json!("Hello!")).is_err());
        assert_eq!(
            validate_input(&template, &json!("Hey")),
            Ok(RuleValue::String("Hey".to_string()))
        );
    }

    #[test]
    fn test_string_options() {
        let template = RuleTemplate::new("CANCELLATION_POLICY", ValueType::String, "booking", json!("flexible"))
            .with_bounds(RuleBounds {
                options: Some(vec!["flexible".into(), "strict".into()]),
                ..Default::default()
            });

        assert!(validate_input(&template, &json!("strict")).is_ok());
        let err = validate_input(&template, &json!("lenient")).unwrap_err();
        assert!(err.0.contains("flexible, strict"));
    }

    #[test]
    fn test_json_kind() {
        let template = RuleTemplate::new("OPENING_HOURS", ValueType::Json, "booking", json!({}))
            .with_bounds(RuleBounds {
                json_kind: Some(JsonKind::Object),
                ..Default::default()
            });

        assert!(validate_input(&template, &json!({"mon": "9-18"})).is_ok());
        assert!(validate_input(&template, &json!("[1, 2]")).is_err());
        assert!(validate_input(&template, &json!("{broken")).is_err());
    }

    #[test]
    fn test_bounds_definition() {
        assert!(check_bounds_definition(&RuleBounds::range(Some(10.0), Some(1.0))).is_err());
        assert!(check_bounds_definition(&RuleBounds::range(Some(1.0), None)).is_ok());
        assert!(check_bounds_definition(&RuleBounds {
            options: Some(vec![]),
            ..Default::default()
        })
        .is_err());
    }
}
