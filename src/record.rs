//! Typed business-name records.
//!
//! The datastore returns loosely shaped JSON rows. [`Record`] lifts the
//! well-known columns into typed fields and keeps everything else verbatim in
//! [`Record::extra`], so nothing the upstream sends is lost on the way to the
//! cache or the renderers.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const NAME_FIELD: &str = "BN_NAME";
pub const STATE_FIELD: &str = "BN_STATE_OF_REG";
pub const STATUS_FIELD: &str = "BN_STATUS";
pub const REG_DATE_FIELD: &str = "BN_REG_DT";
pub const CANCEL_DATE_FIELD: &str = "BN_CANCEL_DT";
pub const ABN_FIELD: &str = "ABN";
pub const ENTITY_TYPE_FIELD: &str = "ENTITY_TYPE";
pub const POSTCODE_FIELD: &str = "POSTCODE";
pub const MATCH_PERCENT_FIELD: &str = "Match_Percent";

/// A single upstream row that could not be normalized.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordDecodeError {
    #[error("record is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    #[error("field '{field}' has unexpected type {found}")]
    UnexpectedType { field: String, found: &'static str },
}

/// One business registration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "BN_NAME", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "BN_STATE_OF_REG", default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(rename = "BN_STATUS", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Registration date, `dd/mm/yyyy`.
    #[serde(rename = "BN_REG_DT", default, skip_serializing_if = "Option::is_none")]
    pub registration_date: Option<String>,

    /// Cancellation date, `dd/mm/yyyy`.
    #[serde(rename = "BN_CANCEL_DT", default, skip_serializing_if = "Option::is_none")]
    pub cancellation_date: Option<String>,

    #[serde(rename = "ABN", default, skip_serializing_if = "Option::is_none")]
    pub abn: Option<String>,

    #[serde(rename = "ENTITY_TYPE", default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(rename = "POSTCODE", default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,

    /// Similarity to the search term, e.g. `"83.33%"`. Only set by ranking.
    #[serde(rename = "Match_Percent", default, skip_serializing_if = "Option::is_none")]
    pub match_percent: Option<String>,

    /// Columns this crate does not model, preserved in upstream order.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl Record {
    /// Normalize one upstream row.
    ///
    /// Well-known columns must be strings, numbers or null; numbers are kept
    /// as their decimal text. Any other column is copied into `extra` as-is.
    pub fn from_value(value: Value) -> Result<Self, RecordDecodeError> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(RecordDecodeError::NotAnObject(json_kind(&other))),
        };

        let mut record = Record::default();
        for (field, value) in map {
            match record.slot_mut(&field) {
                Some(slot) => *slot = scalar_text(&field, value)?,
                None => {
                    record.extra.insert(field, value);
                }
            }
        }
        Ok(record)
    }

    /// Text of a column by its upstream name, empty when absent.
    pub fn field_text(&self, field: &str) -> String {
        if let Some(value) = self.slot(field) {
            return value.clone().unwrap_or_default();
        }
        match self.extra.get(field) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    fn slot(&self, field: &str) -> Option<&Option<String>> {
        match field {
            NAME_FIELD => Some(&self.name),
            STATE_FIELD => Some(&self.state),
            STATUS_FIELD => Some(&self.status),
            REG_DATE_FIELD => Some(&self.registration_date),
            CANCEL_DATE_FIELD => Some(&self.cancellation_date),
            ABN_FIELD => Some(&self.abn),
            ENTITY_TYPE_FIELD => Some(&self.entity_type),
            POSTCODE_FIELD => Some(&self.postcode),
            MATCH_PERCENT_FIELD => Some(&self.match_percent),
            _ => None,
        }
    }

    fn slot_mut(&mut self, field: &str) -> Option<&mut Option<String>> {
        match field {
            NAME_FIELD => Some(&mut self.name),
            STATE_FIELD => Some(&mut self.state),
            STATUS_FIELD => Some(&mut self.status),
            REG_DATE_FIELD => Some(&mut self.registration_date),
            CANCEL_DATE_FIELD => Some(&mut self.cancellation_date),
            ABN_FIELD => Some(&mut self.abn),
            ENTITY_TYPE_FIELD => Some(&mut self.entity_type),
            POSTCODE_FIELD => Some(&mut self.postcode),
            MATCH_PERCENT_FIELD => Some(&mut self.match_percent),
            _ => None,
        }
    }
}

fn scalar_text(field: &str, value: Value) -> Result<Option<String>, RecordDecodeError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(RecordDecodeError::UnexpectedType {
            field: field.to_string(),
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_maps_known_fields() {
        let record = Record::from_value(json!({
            "_id": 17,
            "BN_NAME": "Acme Pty Ltd",
            "BN_STATE_OF_REG": "NSW",
            "BN_STATUS": "Registered",
            "BN_REG_DT": "01/02/2015",
            "BN_CANCEL_DT": null,
            "BN_ABN": "12345678901",
        }))
        .unwrap();

        assert_eq!(record.name.as_deref(), Some("Acme Pty Ltd"));
        assert_eq!(record.state.as_deref(), Some("NSW"));
        assert_eq!(record.registration_date.as_deref(), Some("01/02/2015"));
        assert_eq!(record.cancellation_date, None);
        assert_eq!(record.extra.get("_id"), Some(&json!(17)));
        assert_eq!(record.extra.get("BN_ABN"), Some(&json!("12345678901")));
    }

    #[test]
    fn test_from_value_stringifies_numbers() {
        let record = Record::from_value(json!({"POSTCODE": 2000})).unwrap();
        assert_eq!(record.postcode.as_deref(), Some("2000"));
    }

    #[test]
    fn test_from_value_rejects_non_object() {
        assert_eq!(
            Record::from_value(json!(["Acme"])),
            Err(RecordDecodeError::NotAnObject("array"))
        );
    }

    #[test]
    fn test_from_value_rejects_nested_known_field() {
        let err = Record::from_value(json!({"BN_NAME": {"first": "Acme"}})).unwrap_err();
        assert_eq!(
            err,
            RecordDecodeError::UnexpectedType {
                field: "BN_NAME".to_string(),
                found: "object",
            }
        );
    }

    #[test]
    fn test_field_text_known_extra_and_missing() {
        let record = Record::from_value(json!({
            "BN_NAME": "Acme",
            "_id": 4,
            "NOTE": "kept",
        }))
        .unwrap();
        assert_eq!(record.field_text("BN_NAME"), "Acme");
        assert_eq!(record.field_text("_id"), "4");
        assert_eq!(record.field_text("NOTE"), "kept");
        assert_eq!(record.field_text("BN_STATUS"), "");
        assert_eq!(record.field_text("NOPE"), "");
    }

    #[test]
    fn test_serde_preserves_extra_fields() {
        let record = Record::from_value(json!({
            "BN_NAME": "Acme",
            "BN_STATE_NUM": "B123",
        }))
        .unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({"BN_NAME": "Acme", "BN_STATE_NUM": "B123"}));

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
