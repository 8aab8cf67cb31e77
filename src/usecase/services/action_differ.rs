use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::{json, Map, Value};

use crate::domain::entities::action::{
    ActionArg, ActionHandler, FormActionData, OnClick, PartialRowAction, RenderedAction, RowAction,
};
use crate::domain::entities::row::{value_text, Row};
use crate::domain::entities::table::TableDefinition;
use crate::error::{GridError, GridResult};

pub const FORM_MODULE: &str = "sqlgrid/form";
pub const FORM_FUNCTION: &str = "loadModal";

/// `{field}` in action URLs. A literal pattern, so the `expect` only fires on a typo here.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern is valid"));

/// Replaces `{field}` with the percent-encoded row value, safe in both path and query.
/// Unknown fields stay as they are.
pub fn render_action_url(template: &str, row: &Row) -> String {
    PLACEHOLDER
        .replace_all(template, |captures: &Captures<'_>| match row.get(&captures[1]) {
            Some(value) => encode_component(&value_text(value)),
            None => captures[0].to_string(),
        })
        .into_owned()
}

/// The form encoder writes a literal `+` as `%2B`, so any `+` left is a space.
fn encode_component(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// The table's base actions as sent with `get_config`. Per-row handlers are not transmitted.
pub fn render_base_actions(table: &TableDefinition) -> Vec<RenderedAction> {
    table
        .actions
        .iter()
        .map(|action| {
            let onclick = match (&action.on_click, action.disabled) {
                (Some(ActionHandler::Static(on_click)), false) if action.form.is_none() => {
                    Some(on_click.clone())
                }
                _ => None,
            };
            rendered(action, action.url.clone(), onclick)
        })
        .collect()
}

/// Clones the base actions and hands them to the table's row hook, if any.
/// The base list itself is never handed out.
pub fn resolve_for_row(table: &TableDefinition, row: &Row) -> Vec<RowAction> {
    let actions = table.actions.clone();
    match &table.row_action_hook {
        Some(hook) => hook(row, actions),
        None => actions,
    }
}

pub fn render_for_row(table: &TableDefinition, action: &RowAction, row: &Row) -> RenderedAction {
    let onclick = if action.disabled {
        None
    } else if let Some(form) = &action.form {
        Some(form_onclick(table, form, row))
    } else {
        match &action.on_click {
            Some(ActionHandler::Static(on_click)) => Some(on_click.clone()),
            Some(ActionHandler::PerRow(callback)) => callback(row),
            None => None,
        }
    };
    let url = if table.flags.expand_action_urls {
        render_action_url(&action.url, row)
    } else {
        action.url.clone()
    };
    rendered(action, url, onclick)
}

/// Reduces each row action to `id` plus the fields that differ from the base action with
/// the same id. Actions without a base counterpart are kept whole.
pub fn diff(row_actions: &[RenderedAction], base: &[RenderedAction]) -> GridResult<Vec<PartialRowAction>> {
    row_actions
        .iter()
        .map(|action| {
            let mut fields = to_map(action)?;
            if let Some(base_action) = base.iter().find(|candidate| candidate.id == action.id) {
                let base_fields = to_map(base_action)?;
                fields.retain(|name, value| name == "id" || base_fields.get(name) != Some(&*value));
            }
            Ok(fields)
        })
        .collect()
}

/// Inverse of [`diff`]: overlays each partial action onto its base action.
pub fn apply_diff(base: &[RenderedAction], partials: &[PartialRowAction]) -> GridResult<Vec<RenderedAction>> {
    partials
        .iter()
        .map(|partial| {
            let id = partial.get("id").and_then(Value::as_str).unwrap_or_default();
            let mut fields = match base.iter().find(|candidate| candidate.id == id) {
                Some(base_action) => to_map(base_action)?,
                None => Map::new(),
            };
            for (name, value) in partial {
                fields.insert(name.clone(), value.clone());
            }
            serde_json::from_value(Value::Object(fields))
                .map_err(|err| GridError::protocol(format!("invalid row action '{id}': {err}")))
        })
        .collect()
}

/// Per-row action output for `list`. `None` when the client can use the base actions as-is.
pub fn row_actions_payload(
    table: &TableDefinition,
    base: &[RenderedAction],
    row: &Row,
) -> GridResult<Option<Vec<PartialRowAction>>> {
    if !table.has_customized_actions() {
        return Ok(None);
    }

    let actions = resolve_for_row(table, row);
    let needs_row_rendering = actions.iter().any(RowAction::needs_row_rendering);
    let rendered: Vec<RenderedAction> = actions
        .iter()
        .map(|action| render_for_row(table, action, row))
        .collect();

    if !needs_row_rendering && rendered.as_slice() == base {
        return Ok(None);
    }
    diff(&rendered, base).map(Some)
}

fn form_onclick(table: &TableDefinition, form: &FormActionData, row: &Row) -> OnClick {
    let rowid = if form.row_id_fields.is_empty() {
        row.get("id").cloned().unwrap_or(Value::Null)
    } else {
        let fields: Map<String, Value> = form
            .row_id_fields
            .iter()
            .filter_map(|field| {
                row.get(field)
                    .filter(|value| !value_text(value).is_empty())
                    .map(|value| (field.clone(), value.clone()))
            })
            .collect();
        Value::Object(fields)
    };

    let modal_data = json!({
        "showfields": form.show_fields,
        "xhrdata": {
            "uniqueid": table.unique_id,
            "formid": form.form_id,
            "rowid": rowid,
        },
    });

    OnClick::remote_call(
        FORM_MODULE,
        FORM_FUNCTION,
        vec![ActionArg::expression("e.target"), ActionArg::Value(modal_data)],
    )
}

fn rendered(action: &RowAction, url: String, onclick: Option<OnClick>) -> RenderedAction {
    RenderedAction {
        id: action.id.clone(),
        action_type: action.action_type,
        label: action.label.clone(),
        url,
        icon: action.icon.clone(),
        disabled: action.disabled,
        onclick,
        target: action.target.clone(),
    }
}

fn to_map(action: &RenderedAction) -> GridResult<Map<String, Value>> {
    match serde_json::to_value(action) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(GridError::config("row action did not serialize to an object")),
        Err(err) => Err(GridError::config(format!("row action could not be serialized: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::action::ActionType;
    use crate::domain::entities::column::ColumnDefinition;
    use crate::domain::entities::form::{FieldKind, FormDefinition, FormField};
    use crate::domain::entities::sql::Params;
    use crate::domain::entities::table::{QuerySource, TableBuilder};

    fn row(id: i64, name: &str) -> Row {
        match json!({ "id": id, "name": name }) {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        }
    }

    fn builder() -> TableBuilder {
        TableDefinition::builder("people", QuerySource::new("*", "people", "", Params::default()))
            .column(ColumnDefinition::new("id", "ID"))
            .column(ColumnDefinition::new("name", "Name"))
            .base_url("/people")
            .row_action(RowAction::new(ActionType::Edit))
            .row_action(
                RowAction::new(ActionType::Other)
                    .id("greet")
                    .label("Greet")
                    .on_click(OnClick::inert("alert(1)")),
            )
    }

    #[test]
    fn url_placeholders_are_encoded_or_left_intact() {
        let row = row(7, "Ann & Bob");

        assert_eq!(render_action_url("/people?id={id}", &row), "/people?id=7");
        assert_eq!(render_action_url("/greet/{name}", &row), "/greet/Ann%20%26%20Bob");
        assert_eq!(render_action_url("/x/{missing}", &row), "/x/{missing}");
    }

    #[test]
    fn url_placeholders_are_safe_in_path_segments() {
        assert_eq!(
            render_action_url("/greet/{name}", &row(1, "Ann Lee")),
            "/greet/Ann%20Lee"
        );
        assert_eq!(
            render_action_url("/files/{name}", &row(2, "a+b/c d")),
            "/files/a%2Bb%2Fc%20d"
        );
    }

    #[test]
    fn steady_state_sends_no_row_actions() {
        let table = builder()
            .row_action_hook(|_, actions| actions)
            .build()
            .expect("table should build");
        let base = render_base_actions(&table);

        let payload = row_actions_payload(&table, &base, &row(1, "Ann")).expect("payload");

        assert_eq!(payload, None);
        assert_eq!(base[0].url, "/people?action=edit&id={id}");
        assert_eq!(base[0].label, "Edit");
        assert_eq!(base[0].id, "action-1");
    }

    #[test]
    fn hook_changes_are_diffed_against_base() {
        let table = builder()
            .row_action_hook(|row, mut actions| {
                if row.get("id").and_then(Value::as_i64) == Some(2) {
                    actions[1].disabled = true;
                }
                actions
            })
            .build()
            .expect("table should build");
        let base = render_base_actions(&table);

        assert_eq!(
            row_actions_payload(&table, &base, &row(1, "Ann")).expect("payload"),
            None
        );

        let payload = row_actions_payload(&table, &base, &row(2, "Bob"))
            .expect("payload")
            .expect("row 2 should carry row actions");
        assert_eq!(Value::Object(payload[0].clone()), json!({ "id": "action-1" }));
        assert_eq!(
            Value::Object(payload[1].clone()),
            json!({ "id": "greet", "disabled": true, "onclick": null })
        );
    }

    #[test]
    fn diff_round_trips_through_apply_diff() {
        let table = builder()
            .row_action_hook(|_, mut actions| {
                actions[0].label = "Change".to_string();
                actions[1].icon = "fa fa-hand".to_string();
                actions.push(RowAction::new(ActionType::Other).id("extra").label("Extra"));
                actions
            })
            .build()
            .expect("table should build");
        let base = render_base_actions(&table);
        let row = row(3, "Cy");
        let mutated: Vec<RenderedAction> = resolve_for_row(&table, &row)
            .iter()
            .map(|action| render_for_row(&table, action, &row))
            .collect();

        let partials = diff(&mutated, &base).expect("diff");
        let restored = apply_diff(&base, &partials).expect("apply_diff");

        assert_eq!(restored, mutated);
        assert_eq!(partials[2].len(), 8, "unmatched actions are sent whole");
    }

    #[test]
    fn base_list_is_not_mutated_by_hook() {
        let table = builder()
            .row_action_hook(|_, mut actions| {
                actions.clear();
                actions
            })
            .build()
            .expect("table should build");

        assert!(resolve_for_row(&table, &row(1, "Ann")).is_empty());
        assert_eq!(table.actions.len(), 2);
    }

    #[test]
    fn form_actions_render_per_row_modal_call() {
        let table = TableDefinition::builder("people", QuerySource::new("*", "people", "", Params::default()))
            .column(ColumnDefinition::new("id", "ID"))
            .form(FormDefinition::new("edit_name", "Edit name").field(FormField::new(
                "name",
                "Name",
                FieldKind::Text,
            )))
            .form_action("edit_name", ActionType::Edit, "", &[], &["name"])
            .build()
            .expect("table should build");
        let base = render_base_actions(&table);

        assert_eq!(base[0].onclick, None, "form handlers are rendered per row only");

        let payload = row_actions_payload(&table, &base, &row(5, "Eve"))
            .expect("payload")
            .expect("form actions always render per row");
        assert_eq!(
            payload[0].get("onclick"),
            Some(&json!({
                "module": "sqlgrid/form",
                "function": "loadModal",
                "args": [
                    { "expression": "e.target" },
                    {
                        "showfields": ["name"],
                        "xhrdata": { "uniqueid": "people", "formid": "edit_name", "rowid": 5 }
                    }
                ]
            }))
        );
    }

    #[test]
    fn per_row_callbacks_are_evaluated() {
        let table = builder()
            .row_action(
                RowAction::new(ActionType::Other)
                    .id("open")
                    .on_click_per_row(|row| {
                        let name = row.get("name").map(value_text).unwrap_or_default();
                        Some(OnClick::inert(format!("open('{name}')")))
                    }),
            )
            .build()
            .expect("table should build");
        let base = render_base_actions(&table);
        assert_eq!(base[2].onclick, None);

        let payload = row_actions_payload(&table, &base, &row(1, "Ann"))
            .expect("payload")
            .expect("callbacks always render per row");
        assert_eq!(payload[2].get("onclick"), Some(&json!("open('Ann')")));
    }
}
