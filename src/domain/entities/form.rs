use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::entities::row::{value_text, Row};
use crate::error::{GridError, GridResult};

pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub max_length: Option<usize>,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    pub id: String,
    pub title: String,
    pub fields: Vec<FormField>,
    /// Fields whose stored values must not change when the form is saved.
    pub row_selector: Vec<String>,
}

impl FormDefinition {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields: Vec::new(),
            row_selector: Vec::new(),
        }
    }

    pub fn field(mut self, field: FormField) -> Self {
        self.fields.push(field);
        self
    }

    pub fn row_selector(mut self, fields: &[&str]) -> Self {
        self.row_selector = fields.iter().map(|field| field.to_string()).collect();
        self
    }

    pub fn check(&self) -> GridResult<()> {
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(GridError::config(format!(
                    "form '{}' has an invalid field name '{}'",
                    self.id, field.name
                )));
            }
        }
        Ok(())
    }

    /// Field-level messages for submitted data. An empty map means the data is valid.
    pub fn validate(&self, data: &Row) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for field in &self.fields {
            let value = data.get(&field.name).map(value_text).unwrap_or_default();
            let trimmed = value.trim();

            if field.required && trimmed.is_empty() {
                errors.insert(field.name.clone(), "Required".to_string());
                continue;
            }
            if trimmed.is_empty() {
                continue;
            }
            if field.kind == FieldKind::Number && trimmed.parse::<f64>().is_err() {
                errors.insert(field.name.clone(), "You must enter a number here".to_string());
                continue;
            }
            if let Some(max_length) = field.max_length {
                if value.chars().count() > max_length {
                    errors.insert(
                        field.name.clone(),
                        format!("Maximum of {max_length} characters"),
                    );
                }
            }
        }
        errors
    }

    /// Keeps only the declared fields of the submitted data.
    pub fn whitelist(&self, data: &Row) -> Row {
        self.fields
            .iter()
            .filter_map(|field| {
                data.get(&field.name)
                    .map(|value| (field.name.clone(), value.clone()))
            })
            .collect()
    }
}

pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
