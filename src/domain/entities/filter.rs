use serde::Deserialize;
use serde_json::Value;

use crate::domain::entities::row::value_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterFn {
    Contains,
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    Empty,
    NotEmpty,
    Between,
}

impl FilterFn {
    /// Missing or empty function names mean `contains`. `betweenInclusive` is an alias of
    /// `between`: both bounds are always inclusive.
    pub fn parse(name: Option<&str>) -> Option<Self> {
        let name = match name {
            None => return Some(FilterFn::Contains),
            Some(name) if name.is_empty() => return Some(FilterFn::Contains),
            Some(name) => name,
        };
        Some(match name {
            "contains" => FilterFn::Contains,
            "equals" => FilterFn::Equals,
            "notEquals" => FilterFn::NotEquals,
            "startsWith" => FilterFn::StartsWith,
            "endsWith" => FilterFn::EndsWith,
            "greaterThan" => FilterFn::GreaterThan,
            "greaterThanOrEqualTo" => FilterFn::GreaterThanOrEqualTo,
            "lessThan" => FilterFn::LessThan,
            "lessThanOrEqualTo" => FilterFn::LessThanOrEqualTo,
            "empty" => FilterFn::Empty,
            "notEmpty" => FilterFn::NotEmpty,
            "between" | "betweenInclusive" => FilterFn::Between,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterFn::Contains => "contains",
            FilterFn::Equals => "equals",
            FilterFn::NotEquals => "notEquals",
            FilterFn::StartsWith => "startsWith",
            FilterFn::EndsWith => "endsWith",
            FilterFn::GreaterThan => "greaterThan",
            FilterFn::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            FilterFn::LessThan => "lessThan",
            FilterFn::LessThanOrEqualTo => "lessThanOrEqualTo",
            FilterFn::Empty => "empty",
            FilterFn::NotEmpty => "notEmpty",
            FilterFn::Between => "between",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum FilterValue {
    Scalar(String),
    List(Vec<String>),
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Scalar(String::new())
    }
}

impl From<Value> for FilterValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => FilterValue::List(items.iter().map(value_text).collect()),
            other => FilterValue::Scalar(value_text(&other)),
        }
    }
}

impl FilterValue {
    pub fn scalar(&self) -> String {
        match self {
            FilterValue::Scalar(text) => text.clone(),
            FilterValue::List(items) => items.join(" "),
        }
    }

    /// Lower (`0`) or upper (`1`) bound of a range value. Missing bounds are empty.
    pub fn bound(&self, index: usize) -> &str {
        match self {
            FilterValue::Scalar(text) if index == 0 => text,
            FilterValue::Scalar(_) => "",
            FilterValue::List(items) => items.get(index).map(String::as_str).unwrap_or(""),
        }
    }

    pub fn map(&self, f: impl Fn(&str) -> String) -> FilterValue {
        match self {
            FilterValue::Scalar(text) => FilterValue::Scalar(f(text)),
            FilterValue::List(items) => FilterValue::List(items.iter().map(|item| f(item)).collect()),
        }
    }
}

/// One `(column, function, value)` predicate sent by the client. The client calls the column `id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FilterSpec {
    #[serde(alias = "id")]
    pub column: String,
    #[serde(rename = "fn", default)]
    pub function: Option<String>,
    #[serde(default)]
    pub value: FilterValue,
}

impl FilterSpec {
    pub fn new(column: impl Into<String>, function: &str, value: FilterValue) -> Self {
        Self {
            column: column.into(),
            function: Some(function.to_string()),
            value,
        }
    }
}

pub fn search_terms(search: &str) -> Vec<&str> {
    search.split_whitespace().collect()
}
