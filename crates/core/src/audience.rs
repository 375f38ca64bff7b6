//! Audience and personalization payload parsing.
//!
//! Both payloads arrive either as JSON values or as JSON-encoded strings
//! (the form the campaign editor submits). They are parsed into typed
//! structures here so nothing downstream handles raw JSON.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::error::CoreError;
use crate::phone::PhoneNumber;

/// Upper bound on recipients in a single campaign.
pub const MAX_AUDIENCE_SIZE: usize = 100_000;

/// Variables for one recipient, keyed by variable name.
pub type VariableMap = BTreeMap<String, String>;

/// Per-recipient variables keyed by normalized phone number.
pub type Personalization = BTreeMap<PhoneNumber, VariableMap>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Unwrap a JSON-encoded string into the value it encodes.
fn decode_embedded(value: &Value, what: &str) -> Result<Option<Value>, CoreError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => serde_json::from_str(s)
            .map(Some)
            .map_err(|e| CoreError::Validation(format!("{what} is not valid JSON: {e}"))),
        other => Ok(Some(other.clone())),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Audience
// ---------------------------------------------------------------------------

/// Parse an audience payload into an ordered, deduplicated list of numbers.
///
/// The payload must be an array of strings. Duplicates (after normalization)
/// keep their first position. An empty array is valid here; sending rejects it.
pub fn parse_audience(value: &Value) -> Result<Vec<PhoneNumber>, CoreError> {
    let Some(decoded) = decode_embedded(value, "audience_json")? else {
        return Ok(Vec::new());
    };

    let Value::Array(items) = decoded else {
        return Err(CoreError::Validation(
            "audience_json must be an array of phone numbers".to_string(),
        ));
    };

    let mut seen = HashSet::with_capacity(items.len());
    let mut audience = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let Value::String(raw) = item else {
            return Err(CoreError::Validation(format!(
                "audience_json[{idx}] must be a string"
            )));
        };
        let phone = PhoneNumber::parse(raw)
            .map_err(|_| CoreError::Validation(format!("audience_json[{idx}]: invalid phone number '{raw}'")))?;
        if seen.insert(phone.clone()) {
            audience.push(phone);
        }
    }

    if audience.len() > MAX_AUDIENCE_SIZE {
        return Err(CoreError::Validation(format!(
            "Audience exceeds maximum of {MAX_AUDIENCE_SIZE} recipients (got {})",
            audience.len()
        )));
    }

    Ok(audience)
}

/// Serialize an audience for storage (array of canonical numbers).
pub fn audience_to_json(audience: &[PhoneNumber]) -> Value {
    Value::Array(
        audience
            .iter()
            .map(|p| Value::String(p.as_str().to_string()))
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Personalization
// ---------------------------------------------------------------------------

/// Parse a personalization payload: `{ "<phone>": { "<var>": <scalar> } }`.
///
/// Scalars (string, number, bool) are stringified. Nested objects, arrays and
/// nulls are rejected. Absent or `null` means no personalization.
pub fn parse_personalization(value: &Value) -> Result<Personalization, CoreError> {
    let Some(decoded) = decode_embedded(value, "personalization_data_json")? else {
        return Ok(Personalization::new());
    };

    let Value::Object(entries) = decoded else {
        return Err(CoreError::Validation(
            "personalization_data_json must be an object keyed by phone number".to_string(),
        ));
    };

    let mut out = Personalization::new();
    for (key, vars) in &entries {
        let phone = PhoneNumber::parse(key).map_err(|_| {
            CoreError::Validation(format!(
                "personalization_data_json: key '{key}' is not a valid phone number"
            ))
        })?;

        let Value::Object(vars) = vars else {
            return Err(CoreError::Validation(format!(
                "personalization_data_json['{key}'] must be an object of variables"
            )));
        };

        let mut map = VariableMap::new();
        for (name, v) in vars {
            let text = scalar_to_string(v).ok_or_else(|| {
                CoreError::Validation(format!(
                    "personalization_data_json['{key}']['{name}'] must be a string, number or boolean"
                ))
            })?;
            map.insert(name.clone(), text);
        }

        out.entry(phone).or_default().extend(map);
    }

    Ok(out)
}

/// Serialize personalization for storage.
pub fn personalization_to_json(data: &Personalization) -> Value {
    let map = data
        .iter()
        .map(|(phone, vars)| {
            let vars = vars
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            (phone.as_str().to_string(), Value::Object(vars))
        })
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_array_and_dedups_in_order() {
        let v = json!(["+1555000002", "+1 555 000 001", "15550000 02", "+1555000001"]);
        let audience = parse_audience(&v).unwrap();
        let got: Vec<&str> = audience.iter().map(|p| p.as_str()).collect();
        assert_eq!(got, vec!["+1555000002", "+1555000001"]);
    }

    #[test]
    fn accepts_json_encoded_string() {
        let v = json!("[\"+1555000001\",\"+1555000002\"]");
        assert_eq!(parse_audience(&v).unwrap().len(), 2);
    }

    #[test]
    fn null_and_empty_are_empty_audience() {
        assert!(parse_audience(&Value::Null).unwrap().is_empty());
        assert!(parse_audience(&json!("")).unwrap().is_empty());
        assert!(parse_audience(&json!([])).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_array_and_bad_entries() {
        assert!(parse_audience(&json!({"a": 1})).is_err());
        assert!(parse_audience(&json!([15550000001u64])).is_err());
        assert!(parse_audience(&json!(["not-a-number"])).is_err());
        assert!(parse_audience(&json!("[broken")).is_err());
    }

    #[test]
    fn personalization_stringifies_scalars() {
        let v = json!({
            "+1555000001": {"name": "Ada", "orders": 3, "vip": true}
        });
        let p = parse_personalization(&v).unwrap();
        let phone = PhoneNumber::parse("+1555000001").unwrap();
        let vars = &p[&phone];
        assert_eq!(vars["name"], "Ada");
        assert_eq!(vars["orders"], "3");
        assert_eq!(vars["vip"], "true");
    }

    #[test]
    fn personalization_keys_are_normalized() {
        let v = json!({"1 555 000 001": {"name": "Ada"}});
        let p = parse_personalization(&v).unwrap();
        assert!(p.contains_key(&PhoneNumber::parse("+1555000001").unwrap()));
    }

    #[test]
    fn personalization_rejects_bad_shapes() {
        assert!(parse_personalization(&json!([1, 2])).is_err());
        assert!(parse_personalization(&json!({"bogus": {"a": "b"}})).is_err());
        assert!(parse_personalization(&json!({"+1555000001": "x"})).is_err());
        assert!(parse_personalization(&json!({"+1555000001": {"a": null}})).is_err());
        assert!(parse_personalization(&json!({"+1555000001": {"a": [1]}})).is_err());
        assert!(parse_personalization(&json!({"+1555000001": {"a": {"b": 1}}})).is_err());
    }

    #[test]
    fn personalization_absent_is_empty() {
        assert!(parse_personalization(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn storage_forms_are_stable() {
        let audience = parse_audience(&json!(["15550000001"])).unwrap();
        assert_eq!(audience_to_json(&audience), json!(["+15550000001"]));

        let p = parse_personalization(&json!({"+15550000001": {"n": 1}})).unwrap();
        assert_eq!(personalization_to_json(&p), json!({"+15550000001": {"n": "1"}}));
    }
}
