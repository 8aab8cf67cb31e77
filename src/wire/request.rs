use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::domain::entities::filter::FilterSpec;
use crate::domain::entities::query::SortDirection;
use crate::domain::entities::row::{split_row_ids, Row, RowId, RowIdentity};
use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAction {
    GetConfig,
    List,
    SetSelected,
    SelectAll,
    SelectNone,
    FormShow,
    FormSave,
    DeleteRow,
    Download,
}

impl GridAction {
    pub fn parse(name: &str) -> GridResult<Self> {
        Ok(match name {
            "get_config" => GridAction::GetConfig,
            "list" => GridAction::List,
            "set_selected" => GridAction::SetSelected,
            "select_all" => GridAction::SelectAll,
            "select_none" => GridAction::SelectNone,
            "form_show" => GridAction::FormShow,
            "form_save" => GridAction::FormSave,
            "delete_row" => GridAction::DeleteRow,
            "download" => GridAction::Download,
            other => return Err(GridError::protocol(format!("unknown action: {other}"))),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GridAction::GetConfig => "get_config",
            GridAction::List => "list",
            GridAction::SetSelected => "set_selected",
            GridAction::SelectAll => "select_all",
            GridAction::SelectNone => "select_none",
            GridAction::FormShow => "form_show",
            GridAction::FormSave => "form_save",
            GridAction::DeleteRow => "delete_row",
            GridAction::Download => "download",
        }
    }
}

/// Parameters with a protocol meaning. Everything else in a request is form data.
const RESERVED_PARAMS: &[&str] = &[
    "table_sql_action",
    "uniqueid",
    "filters",
    "s",
    "tsort",
    "tdir",
    "page",
    "page_size",
    "row_ids_selected",
    "row_ids_unselected",
    "rowid",
    "formid",
    "download_selected",
    "session",
    "pretty",
];

#[derive(Debug, Clone, PartialEq)]
pub struct GridRequest {
    pub action: GridAction,
    pub uniqueid: Option<String>,
    pub filters: Vec<FilterSpec>,
    pub search: String,
    pub sort_column: Option<String>,
    pub sort_direction: Option<SortDirection>,
    pub page: i64,
    /// `0` means the table's page size.
    pub page_size: i64,
    pub row_ids_selected: Option<Vec<RowId>>,
    pub row_ids_unselected: Option<Vec<RowId>>,
    pub rowid: Option<RowIdentity>,
    pub formid: Option<String>,
    pub form_data: Row,
    pub download_selected: bool,
}

impl GridRequest {
    pub fn new(action: GridAction) -> Self {
        Self {
            action,
            uniqueid: None,
            filters: Vec::new(),
            search: String::new(),
            sort_column: None,
            sort_direction: None,
            page: 0,
            page_size: 0,
            row_ids_selected: None,
            row_ids_unselected: None,
            rowid: None,
            formid: None,
            form_data: Row::new(),
            download_selected: false,
        }
    }

    /// Parses flat request parameters. Composite ids arrive as `rowid[field]=value`.
    pub fn from_params(params: &HashMap<String, String>) -> GridResult<Self> {
        let action = GridAction::parse(params.get("table_sql_action").map(String::as_str).unwrap_or(""))?;
        let text = |name: &str| {
            params
                .get(name)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let mut request = GridRequest::new(action);
        request.uniqueid = text("uniqueid");
        request.filters = parse_filters(params.get("filters").map(String::as_str).unwrap_or(""))?;
        request.search = params.get("s").cloned().unwrap_or_default();
        request.sort_column = text("tsort");
        request.sort_direction = text("tdir")
            .and_then(|code| code.parse::<i64>().ok())
            .and_then(SortDirection::from_wire);
        request.page = parse_int(params, "page")?;
        request.page_size = parse_int(params, "page_size")?;
        request.row_ids_selected = params.get("row_ids_selected").map(|raw| split_row_ids(raw));
        request.row_ids_unselected = params.get("row_ids_unselected").map(|raw| split_row_ids(raw));
        request.formid = text("formid");
        request.download_selected = matches!(
            text("download_selected").as_deref(),
            Some("1") | Some("true") | Some("on")
        );

        let mut rowid_fields = BTreeMap::new();
        for (name, value) in params {
            if let Some(field) = name
                .strip_prefix("rowid[")
                .and_then(|rest| rest.strip_suffix(']'))
            {
                if !value.is_empty() {
                    rowid_fields.insert(field.to_string(), value.clone());
                }
                continue;
            }
            if !RESERVED_PARAMS.contains(&name.as_str()) {
                request
                    .form_data
                    .insert(name.clone(), Value::String(value.clone()));
            }
        }
        request.rowid = match text("rowid") {
            Some(id) => Some(RowIdentity::Single(id)),
            None if !rowid_fields.is_empty() => Some(RowIdentity::Fields(rowid_fields)),
            None => None,
        };

        Ok(request)
    }
}

/// Invalid JSON is a protocol error; valid JSON that is not a list means no filters.
fn parse_filters(raw: &str) -> GridResult<Vec<FilterSpec>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| GridError::protocol(format!("filters are not valid json: {err}")))?;
    match value {
        Value::Array(_) => serde_json::from_value(value)
            .map_err(|err| GridError::protocol(format!("invalid filter: {err}"))),
        _ => Ok(Vec::new()),
    }
}

fn parse_int(params: &HashMap<String, String>, name: &str) -> GridResult<i64> {
    match params.get(name).map(|value| value.trim()) {
        None | Some("") => Ok(0),
        Some(value) => value
            .parse::<i64>()
            .map_err(|_| GridError::protocol(format!("{name} must be an integer: {value}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::filter::FilterValue;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn parses_list_request() {
        let request = GridRequest::from_params(&params(&[
            ("table_sql_action", "list"),
            ("filters", r#"[{"id":"age","fn":"between","value":["18",""]}]"#),
            ("s", "ann smith"),
            ("tsort", "name"),
            ("tdir", "3"),
            ("page", "2"),
            ("page_size", "20"),
        ]))
        .expect("request should parse");

        assert_eq!(request.action, GridAction::List);
        assert_eq!(
            request.filters,
            vec![FilterSpec::new(
                "age",
                "between",
                FilterValue::List(vec!["18".to_string(), String::new()])
            )]
        );
        assert_eq!(request.search, "ann smith");
        assert_eq!(request.sort_column.as_deref(), Some("name"));
        assert_eq!(request.sort_direction, Some(SortDirection::Desc));
        assert_eq!((request.page, request.page_size), (2, 20));
        assert!(request.form_data.is_empty());
    }

    #[test]
    fn unknown_or_missing_action_is_a_protocol_error() {
        for pairs in [vec![("table_sql_action", "drop_table")], vec![]] {
            let err = GridRequest::from_params(&params(&pairs)).expect_err("should fail");
            assert_eq!(err.class_name(), "protocol_error");
        }
    }

    #[test]
    fn broken_filter_json_fails_but_non_lists_are_ignored() {
        let err = GridRequest::from_params(&params(&[("table_sql_action", "list"), ("filters", "[{")]))
            .expect_err("should fail");
        assert_eq!(err.class_name(), "protocol_error");

        let request = GridRequest::from_params(&params(&[("table_sql_action", "list"), ("filters", "{}")]))
            .expect("request should parse");
        assert!(request.filters.is_empty());
    }

    #[test]
    fn form_requests_split_rowid_and_data() {
        let request = GridRequest::from_params(&params(&[
            ("table_sql_action", "form_save"),
            ("formid", "enrolment"),
            ("rowid[userid]", "3"),
            ("rowid[courseid]", "9"),
            ("status", "1"),
        ]))
        .expect("request should parse");

        let mut fields = BTreeMap::new();
        fields.insert("courseid".to_string(), "9".to_string());
        fields.insert("userid".to_string(), "3".to_string());
        assert_eq!(request.rowid, Some(RowIdentity::Fields(fields)));
        assert_eq!(request.formid.as_deref(), Some("enrolment"));
        assert_eq!(request.form_data.len(), 1);
        assert_eq!(request.form_data.get("status"), Some(&Value::from("1")));
    }

    #[test]
    fn selection_ids_drop_empty_entries() {
        let request = GridRequest::from_params(&params(&[
            ("table_sql_action", "set_selected"),
            ("row_ids_selected", "1,,3"),
            ("row_ids_unselected", ""),
        ]))
        .expect("request should parse");

        assert_eq!(
            request.row_ids_selected,
            Some(vec!["1".to_string(), "3".to_string()])
        );
        assert_eq!(request.row_ids_unselected, Some(Vec::new()));
    }
}
