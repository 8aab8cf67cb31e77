use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, Utc};
use serde_json::Value;
use tracing::debug;

use crate::domain::entities::column::{ColumnDefinition, ColumnRegistry, DataType};
use crate::domain::entities::row::{value_text, Row};
use crate::error::{GridError, GridResult};
use crate::usecase::services::type_inference::ColumnTypes;

/// Copies the registry's columns out of a raw row, formatting timestamps on the way.
/// The raw `id` is kept when the registry has no `id` column.
pub fn format_cells(
    columns: &ColumnRegistry,
    raw: &Row,
    types: &ColumnTypes,
    datetime_format: &str,
    timezone: &str,
) -> GridResult<Row> {
    let mut out = Row::new();
    let mut has_id_column = false;

    for column in columns.iter() {
        has_id_column |= column.key == "id";
        let value = raw.get(&column.key).cloned().unwrap_or(Value::Null);
        let value = if is_timestamp(column, types, &value) {
            let format = column.format.as_deref().unwrap_or(datetime_format);
            Value::String(format_timestamp_value(&value, format, timezone)?)
        } else {
            value
        };
        out.insert(column.key.clone(), value);
    }

    if !has_id_column {
        if let Some(id) = raw.get("id").filter(|id| !value_text(id).is_empty()) {
            out.insert("id".to_string(), id.clone());
        }
    }
    Ok(out)
}

/// Declared or inferred timestamps, plus `time*` columns holding a plain unix timestamp.
fn is_timestamp(column: &ColumnDefinition, types: &ColumnTypes, value: &Value) -> bool {
    let data_type = column
        .data_type
        .or_else(|| types.get(&column.key).copied())
        .unwrap_or(DataType::Unknown);
    if data_type == DataType::Timestamp {
        return true;
    }
    if !column.key.starts_with("time") {
        return false;
    }
    let text = value_text(value);
    !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit())
}

/// `0`, empty and non-numeric values give an empty string.
pub fn format_timestamp_value(value: &Value, format: &str, timezone: &str) -> GridResult<String> {
    let seconds = match value {
        Value::Number(number) => number.as_i64().or_else(|| number.as_f64().map(|f| f as i64)),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    match seconds {
        Some(seconds) if seconds > 0 => format_unix_timestamp(seconds, format, timezone),
        _ => Ok(String::new()),
    }
}

/// strftime-style `format`. `timezone` is `UTC` or `localtime`. Unrepresentable instants are blank.
pub fn format_unix_timestamp(seconds: i64, format: &str, timezone: &str) -> GridResult<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(GridError::config(format!(
            "date format contains unknown identifiers: {format}"
        )));
    }
    let Some(utc) = DateTime::<Utc>::from_timestamp(seconds, 0) else {
        debug!(seconds, "timestamp out of range, rendered blank");
        return Ok(String::new());
    };

    let mut out = String::new();
    let written = if timezone.eq_ignore_ascii_case("localtime") {
        write!(out, "{}", utc.with_timezone(&Local).format_with_items(items.iter()))
    } else {
        write!(out, "{}", utc.format_with_items(items.iter()))
    };
    written.map_err(|_| GridError::config(format!("could not apply date format: {format}")))?;
    Ok(out)
}
