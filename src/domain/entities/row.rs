use std::collections::BTreeMap;

use serde_json::Value;

pub type Row = serde_json::Map<String, Value>;

/// Primary key of a row as the client sees it. Numeric keys are kept in their decimal form.
pub type RowId = String;

pub fn row_id(row: &Row) -> Option<RowId> {
    row.get("id").and_then(row_id_from_value)
}

pub fn row_id_from_value(value: &Value) -> Option<RowId> {
    match value {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        other => Some(value_text(other)),
    }
}

pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => {
            if *flag {
                "1".to_string()
            } else {
                String::new()
            }
        }
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

pub fn split_row_ids(raw: &str) -> Vec<RowId> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// How a form request identifies its row: a plain id, or several key fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIdentity {
    Single(RowId),
    Fields(BTreeMap<String, String>),
}

impl RowIdentity {
    /// The identity as row data, merged under submitted form values on save.
    pub fn to_row(&self) -> Row {
        match self {
            RowIdentity::Single(id) => {
                let mut row = Row::new();
                row.insert("id".to_string(), Value::String(id.clone()));
                row
            }
            RowIdentity::Fields(fields) => fields
                .iter()
                .map(|(name, value)| (name.clone(), Value::String(value.clone())))
                .collect(),
        }
    }

    /// The plain id, or the `id` field of a composite identity.
    pub fn id(&self) -> Option<&str> {
        match self {
            RowIdentity::Single(id) => Some(id.as_str()),
            RowIdentity::Fields(fields) => fields.get("id").map(String::as_str),
        }
    }
}
