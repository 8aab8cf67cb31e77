use serde::{Deserialize, Serialize};

use crate::domain::entities::action::OnClick;
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    Number,
    Timestamp,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub key: String,
    pub header: String,
    pub sql_expression: Option<String>,
    /// Declared type. `None` means the type is looked up in the schema.
    pub data_type: Option<DataType>,
    /// Per-column timestamp format, falls back to the table's.
    pub format: Option<String>,
    pub sortable: bool,
    pub filterable: bool,
    pub internal: bool,
    pub visible: bool,
    pub select_options: Vec<SelectOption>,
    pub on_click: Option<OnClick>,
}

impl ColumnDefinition {
    pub fn new(key: impl Into<String>, header: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            header: header.into(),
            sql_expression: None,
            data_type: None,
            format: None,
            sortable: true,
            filterable: true,
            internal: false,
            visible: true,
            select_options: Vec::new(),
            on_click: None,
        }
    }

    pub fn sql(mut self, expression: impl Into<String>) -> Self {
        self.sql_expression = Some(expression.into());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Internal columns are delivered to the client but never filtered, searched or sorted.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self.filterable = false;
        self.sortable = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn no_filter(mut self) -> Self {
        self.filterable = false;
        self
    }

    pub fn no_sorting(mut self) -> Self {
        self.sortable = false;
        self
    }

    pub fn select_options(mut self, options: Vec<SelectOption>) -> Self {
        self.select_options = options;
        self
    }

    pub fn on_click(mut self, on_click: OnClick) -> Self {
        self.on_click = Some(on_click);
        self
    }

    pub fn is_action_column(&self) -> bool {
        self.key == "edit" || self.key == "delete"
    }

    pub fn can_filter(&self) -> bool {
        self.filterable && !self.internal && !self.is_action_column()
    }

    pub fn can_sort(&self) -> bool {
        self.sortable && !self.internal && !self.is_action_column()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnRegistry {
    columns: Vec<ColumnDefinition>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: ColumnDefinition) -> GridResult<()> {
        if column.key.trim().is_empty() {
            return Err(GridError::config("column key must not be empty"));
        }
        if self.get(&column.key).is_some() {
            return Err(GridError::config(format!(
                "column '{}' was defined twice",
                column.key
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|column| column.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn first(&self) -> Option<&ColumnDefinition> {
        self.columns.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}
