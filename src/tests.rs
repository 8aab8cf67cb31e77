use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::demo::{demo_table, seed_demo, DEMO_TABLE_ID};
use crate::infra::forms::plain::PlainFormRenderer;
use crate::infra::sqlite::engine::SqliteEngine;
use crate::infra::sqlite::schema::init_db;
use crate::infra::sqlite::selection_store::SqliteSelectionStore;
use crate::wire::envelope::GENERIC_ERROR_MESSAGE;
use crate::*;

const SESSION: &str = "session-a";

struct Fixture {
    _dir: TempDir,
    db_path: PathBuf,
    dispatcher: Dispatcher,
}

impl Fixture {
    fn call(&self, pairs: &[(&str, &str)]) -> GridResponse {
        self.call_as(SESSION, pairs, false)
    }

    fn call_as(&self, session: &str, pairs: &[(&str, &str)], privileged: bool) -> GridResponse {
        let params: HashMap<String, String> = pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.dispatcher.respond(session, &params, privileged)
    }

    fn json(&self, pairs: &[(&str, &str)]) -> Value {
        envelope_json(self.call(pairs))
    }

    fn names(&self, pairs: &[(&str, &str)]) -> Vec<String> {
        let mut params = vec![("table_sql_action", "list")];
        params.extend_from_slice(pairs);
        let body = self.json(&params);
        body["data"]
            .as_array()
            .expect("list data should be an array")
            .iter()
            .map(|row| row["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn person_count(&self) -> i64 {
        let conn = Connection::open(&self.db_path).expect("should open sqlite db");
        conn.query_row("SELECT COUNT(*) FROM grid_demo", [], |row| row.get(0))
            .expect("count query should succeed")
    }
}

fn seed_people_fixture() -> Fixture {
    let dir = tempfile::tempdir().expect("should create temp dir");
    let db_path = dir.path().join("grid.sqlite");
    init_db(&db_path).expect("init_db should succeed");
    seed_demo(&db_path).expect("seed should succeed");

    let dispatcher = Dispatcher::new(
        Arc::new(demo_table(2).expect("demo table should build")),
        Arc::new(SqliteEngine::new(&db_path)),
        Arc::new(SqliteSelectionStore::new(&db_path)),
        Arc::new(PlainFormRenderer),
        DispatchSettings::default(),
    );
    Fixture {
        _dir: dir,
        db_path,
        dispatcher,
    }
}

fn envelope_json(response: GridResponse) -> Value {
    match response {
        GridResponse::Json(envelope) => serde_json::to_value(envelope).expect("envelope should serialize"),
        GridResponse::Csv { filename, .. } => panic!("expected json, got csv {filename}"),
    }
}

#[test]
fn list_pages_rows_in_default_order() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[("table_sql_action", "list"), ("page", "1")]);

    assert_eq!(body["type"], json!("success"));
    assert_eq!(
        body["meta"],
        json!({ "total": 5, "page_size": 2, "current_page": 1, "selected_rows_count": 0 })
    );
    let names: Vec<&str> = body["data"]
        .as_array()
        .expect("rows")
        .iter()
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Cy Carter", "Dee Dalton"]);
}

#[test]
fn list_formats_timestamps_and_side_channel() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[("table_sql_action", "list"), ("page_size", "10")]);
    let ann = &body["data"][0];

    assert_eq!(ann["name"], json!("Ann Archer"));
    assert_eq!(ann["timecreated"], json!("08.02.2024 14:00"));
    assert_eq!(ann["_data"]["selected"], json!(false));
    assert_eq!(ann["_data"]["detail_panel_content"], json!("Age: 34"));

    let dee = &body["data"][3];
    assert_eq!(dee["timecreated"], json!(""), "zero timestamps render empty");
}

#[test]
fn starts_with_filter_narrows_rows() {
    let fixture = seed_people_fixture();

    let names = fixture.names(&[
        ("page_size", "10"),
        ("filters", r#"[{"id":"name","fn":"startsWith","value":"B"}]"#),
    ]);

    assert_eq!(names, vec!["Bob Baker"]);
}

#[test]
fn between_with_only_a_lower_bound() {
    let fixture = seed_people_fixture();

    let names = fixture.names(&[
        ("page_size", "10"),
        ("filters", r#"[{"id":"age","fn":"between","value":["30",""]}]"#),
    ]);

    assert_eq!(names, vec!["Ann Archer", "Cy Carter", "Dee Dalton"]);
}

#[test]
fn select_option_filter_and_search_combine() {
    let fixture = seed_people_fixture();

    let names = fixture.names(&[
        ("page_size", "10"),
        ("filters", r#"[{"id":"active","fn":"equals","value":["0"]}]"#),
        ("s", "eve"),
    ]);

    assert_eq!(names, vec!["Eve Evans"]);
}

#[test]
fn unknown_filter_function_is_a_protocol_error() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "list"),
        ("filters", r#"[{"id":"name","fn":"soundsLike","value":"ann"}]"#),
    ]);

    assert_eq!(body["type"], json!("error"));
    assert_eq!(body["exception"], json!("protocol_error"));
}

#[test]
fn sort_request_overrides_default_and_unknown_columns_are_ignored() {
    let fixture = seed_people_fixture();

    let by_age = fixture.names(&[("page_size", "10"), ("tsort", "age"), ("tdir", "3")]);
    assert_eq!(
        by_age,
        vec!["Cy Carter", "Dee Dalton", "Ann Archer", "Eve Evans", "Bob Baker"]
    );

    let body = fixture.json(&[("table_sql_action", "list"), ("tsort", "password")]);
    assert_eq!(body["type"], json!("success"));
    assert_eq!(body["meta"]["total"], json!(5));
}

#[test]
fn set_selected_is_idempotent_and_marks_rows() {
    let fixture = seed_people_fixture();
    let select = [
        ("table_sql_action", "set_selected"),
        ("row_ids_selected", "1,3"),
        ("row_ids_unselected", ""),
    ];

    let first = fixture.json(&select);
    let second = fixture.json(&select);

    assert_eq!(first["meta"]["selected_rows_count"], json!(2));
    assert_eq!(second["meta"]["selected_rows_count"], json!(2));
    assert_eq!(
        fixture.dispatcher.get_selected_row_ids(SESSION).expect("selection"),
        vec!["1".to_string(), "3".to_string()]
    );

    let body = fixture.json(&[("table_sql_action", "list"), ("page_size", "10")]);
    let selected: Vec<&str> = body["data"]
        .as_array()
        .expect("rows")
        .iter()
        .filter(|row| row["_data"]["selected"] == json!(true))
        .filter_map(|row| row["name"].as_str())
        .collect();
    assert_eq!(selected, vec!["Ann Archer", "Cy Carter"]);
    assert_eq!(body["meta"]["selected_rows_count"], json!(2));

    let after = fixture.json(&[
        ("table_sql_action", "set_selected"),
        ("row_ids_selected", ""),
        ("row_ids_unselected", "1"),
    ]);
    assert_eq!(after["meta"]["selected_rows_count"], json!(1));
}

#[test]
fn set_selected_requires_both_lists() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[("table_sql_action", "set_selected"), ("row_ids_selected", "1")]);

    assert_eq!(body["exception"], json!("protocol_error"));
}

#[test]
fn selections_are_per_session() {
    let fixture = seed_people_fixture();
    fixture.call(&[
        ("table_sql_action", "set_selected"),
        ("row_ids_selected", "2"),
        ("row_ids_unselected", ""),
    ]);

    let other = fixture
        .dispatcher
        .get_selected_row_ids("session-b")
        .expect("selection");
    assert!(other.is_empty());
}

#[test]
fn select_all_covers_every_page_of_the_filter() {
    let fixture = seed_people_fixture();

    let selected = fixture.json(&[
        ("table_sql_action", "select_all"),
        ("filters", r#"[{"id":"active","fn":"equals","value":["1"]}]"#),
    ]);
    let listed = fixture.json(&[
        ("table_sql_action", "list"),
        ("filters", r#"[{"id":"active","fn":"equals","value":["1"]}]"#),
    ]);

    assert_eq!(selected["meta"]["selected_rows_count"], json!(3));
    assert_eq!(listed["meta"]["total"], json!(3));
    assert_eq!(listed["meta"]["selected_rows_count"], listed["meta"]["total"]);

    let rows = fixture.dispatcher.get_selected_rows(SESSION).expect("selected rows");
    assert_eq!(rows.len(), 3);

    let none = fixture.json(&[("table_sql_action", "select_none")]);
    assert_eq!(none["meta"]["selected_rows_count"], json!(0));
}

#[test]
fn form_show_renders_the_stored_row() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "form_show"),
        ("formid", "person"),
        ("rowid", "2"),
    ]);

    assert_eq!(body["type"], json!("success"));
    assert_eq!(body["data"]["modal_title"], json!("Edit person"));
    let form = body["data"]["form"].as_str().expect("form markup");
    assert!(form.contains("Bob Baker"), "unexpected form: {form}");
    assert!(form.contains(r#"data-formid="person""#));
}

#[test]
fn form_save_updates_an_existing_row() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "form_save"),
        ("formid", "person"),
        ("rowid", "2"),
        ("name", "Bobby Baker"),
        ("email", "bobby@example.org"),
        ("age", "18"),
    ]);

    assert_eq!(
        body["data"],
        json!({ "saved": true, "refresh": "row", "rowid": "2" })
    );
    let names = fixture.names(&[("page_size", "10")]);
    assert!(names.contains(&"Bobby Baker".to_string()));
    assert_eq!(fixture.person_count(), 5);
}

#[test]
fn form_save_without_rowid_inserts() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "form_save"),
        ("formid", "person"),
        ("name", "Fay Fisher"),
        ("email", "fay@example.org"),
    ]);

    assert_eq!(body["data"]["refresh"], json!("table"));
    assert_eq!(fixture.person_count(), 6);
}

#[test]
fn form_save_reports_field_errors_without_writing() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "form_save"),
        ("formid", "person"),
        ("rowid", "2"),
        ("name", ""),
        ("email", "bob@example.org"),
        ("age", "old"),
    ]);

    assert_eq!(body["type"], json!("success"));
    assert_eq!(body["data"]["errors"]["name"], json!("Required"));
    assert_eq!(body["data"]["errors"]["age"], json!("You must enter a number here"));
    assert!(body["data"].get("saved").is_none());
    assert!(fixture.names(&[("page_size", "10")]).contains(&"Bob Baker".to_string()));
}

#[test]
fn form_requests_for_missing_rows_are_denied() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[
        ("table_sql_action", "form_save"),
        ("formid", "person"),
        ("rowid", "99"),
        ("name", "Ghost"),
        ("email", "ghost@example.org"),
    ]);

    assert_eq!(body["exception"], json!("permission_error"));
    assert_eq!(fixture.person_count(), 5);
}

#[test]
fn delete_follows_the_per_row_action() {
    let fixture = seed_people_fixture();

    // Ann is active, so her delete action is disabled.
    let denied = fixture.json(&[("table_sql_action", "delete_row"), ("rowid", "1")]);
    assert_eq!(denied["exception"], json!("permission_error"));
    assert_eq!(fixture.person_count(), 5);

    let deleted = fixture.json(&[("table_sql_action", "delete_row"), ("rowid", "3")]);
    assert_eq!(deleted["data"], json!({ "success": true }));
    assert_eq!(fixture.person_count(), 4);

    let again = fixture.json(&[("table_sql_action", "delete_row"), ("rowid", "3")]);
    assert_eq!(again["exception"], json!("permission_error"));
}

#[test]
fn download_returns_csv_of_the_filter_or_selection() {
    let fixture = seed_people_fixture();

    let response = fixture.call(&[
        ("table_sql_action", "download"),
        ("filters", r#"[{"id":"name","fn":"startsWith","value":"A"}]"#),
    ]);
    let GridResponse::Csv { filename, body } = response else {
        panic!("expected a csv download");
    };
    let text = String::from_utf8(body).expect("csv should be utf-8");
    assert_eq!(filename, format!("{DEMO_TABLE_ID}.csv"));
    assert_eq!(
        text,
        "ID,Name,E-Mail,Age,Status,Created\n1,Ann Archer,ann@example.org,34,1,08.02.2024 14:00\n"
    );

    fixture.call(&[
        ("table_sql_action", "set_selected"),
        ("row_ids_selected", "4,5"),
        ("row_ids_unselected", ""),
    ]);
    let GridResponse::Csv { body, .. } =
        fixture.call(&[("table_sql_action", "download"), ("download_selected", "1")])
    else {
        panic!("expected a csv download");
    };
    let text = String::from_utf8(body).expect("csv should be utf-8");
    assert_eq!(text.lines().count(), 3, "header plus two selected rows: {text}");
    assert!(text.contains("Dee Dalton") && text.contains("Eve Evans"));
}

#[test]
fn requests_for_another_table_are_rejected() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[("table_sql_action", "list"), ("uniqueid", "someone_else")]);

    assert_eq!(body["exception"], json!("protocol_error"));
}

#[test]
fn error_envelopes_hide_details_from_unprivileged_callers() {
    let fixture = seed_people_fixture();
    let params = [("table_sql_action", "list"), ("page", "two")];

    let public = envelope_json(fixture.call_as(SESSION, &params, false));
    assert_eq!(public["error"], json!(GENERIC_ERROR_MESSAGE));
    assert!(public.get("trace").is_none());
    assert_eq!(public["exception"], json!("protocol_error"));

    let private = envelope_json(fixture.call_as(SESSION, &params, true));
    let message = private["error"].as_str().expect("error message");
    assert!(message.contains("page must be an integer"), "unexpected: {message}");
    assert!(private["trace"].is_array());
}

#[test]
fn engine_failures_are_classified() {
    let fixture = seed_people_fixture();
    let conn = Connection::open(&fixture.db_path).expect("should open sqlite db");
    conn.execute("DROP TABLE grid_demo", []).expect("drop should succeed");

    let body = fixture.json(&[("table_sql_action", "list")]);

    assert_eq!(body["type"], json!("error"));
    let exception = body["exception"].as_str().expect("exception");
    assert!(exception.starts_with("engine_error"), "unexpected: {exception}");
    assert_eq!(body["error"], json!(GENERIC_ERROR_MESSAGE));

    let private = envelope_json(fixture.call_as(SESSION, &[("table_sql_action", "list")], true));
    let trace = private["trace"].as_array().expect("trace");
    assert!(
        trace
            .iter()
            .any(|line| line.as_str().is_some_and(|line| line.contains("no such table"))),
        "unexpected trace: {trace:?}"
    );
}

#[test]
fn get_config_describes_the_table() {
    let fixture = seed_people_fixture();

    let body = fixture.json(&[("table_sql_action", "get_config")]);
    let config = &body["data"];

    assert_eq!(config["uniqueid"], json!(DEMO_TABLE_ID));
    assert_eq!(config["pagesize"], json!(2));
    assert_eq!(config["enable_row_selection"], json!(true));
    assert_eq!(config["enable_download"], json!(true));
    assert_eq!(config["sort_default_column"], json!("name"));
    assert_eq!(config["columns"].as_array().map(Vec::len), Some(6));
    assert_eq!(
        config["columns"][4]["mrtOptions"]["filterVariant"],
        json!("multi-select")
    );
    assert_eq!(config["row_actions"].as_array().map(Vec::len), Some(3));
}
