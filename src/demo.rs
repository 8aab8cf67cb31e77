use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::params;

use crate::domain::entities::action::{ActionType, OnClick, RowAction};
use crate::domain::entities::column::{ColumnDefinition, DataType, SelectOption};
use crate::domain::entities::form::{FieldKind, FormDefinition, FormField};
use crate::domain::entities::query::SortDirection;
use crate::domain::entities::row::value_text;
use crate::domain::entities::sql::Params;
use crate::domain::entities::table::{QuerySource, TableDefinition};
use crate::error::GridResult;
use crate::infra::sqlite::schema::open_connection;

pub const DEMO_TABLE_ID: &str = "grid_demo";

const DEMO_PEOPLE: &[(&str, &str, i64, i64, i64)] = &[
    ("Ann Archer", "ann@example.org", 34, 1, 1_707_400_800),
    ("Bob Baker", "bob@example.org", 17, 1, 1_707_487_200),
    ("Cy Carter", "cy@example.org", 52, 0, 1_700_000_000),
    ("Dee Dalton", "dee@example.org", 41, 1, 0),
    ("Eve Evans", "eve@example.org", 28, 0, 1_710_000_000),
];

/// Creates `grid_demo` and fills it once.
pub fn seed_demo(db_path: &Path) -> Result<()> {
    let mut conn = open_connection(db_path)?;
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS grid_demo (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL DEFAULT '',
            email       TEXT NOT NULL DEFAULT '',
            age         INTEGER,
            active      INTEGER NOT NULL DEFAULT 1,
            timecreated INTEGER NOT NULL DEFAULT 0
        );
        ",
    )
    .context("failed to create demo table")?;

    let existing: i64 = conn
        .query_row("SELECT COUNT(1) FROM grid_demo", [], |row| row.get(0))
        .context("failed to count demo rows")?;
    if existing > 0 {
        return Ok(());
    }

    let tx = conn.transaction().context("failed to start transaction")?;
    for (name, email, age, active, timecreated) in DEMO_PEOPLE {
        tx.execute(
            "INSERT INTO grid_demo(name, email, age, active, timecreated) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, email, age, active, timecreated],
        )
        .context("failed to insert demo row")?;
    }
    tx.commit().context("failed to commit demo rows")?;
    Ok(())
}

/// The table served by the binary: filters, selection, a form, per-row delete rules and
/// CSV download.
pub fn demo_table(page_size: i64) -> GridResult<TableDefinition> {
    let source = QuerySource::new(
        "p.id, p.name, p.email, p.age, p.active, p.timecreated",
        "grid_demo p",
        "",
        Params::default(),
    )
    .with_table("grid_demo");

    TableDefinition::builder(DEMO_TABLE_ID, source)
        .column(ColumnDefinition::new("id", "ID").data_type(DataType::Number))
        .column(ColumnDefinition::new("name", "Name"))
        .column(ColumnDefinition::new("email", "E-Mail"))
        .column(ColumnDefinition::new("age", "Age"))
        .column(
            ColumnDefinition::new("active", "Status").select_options(vec![
                SelectOption::new("1", "Active"),
                SelectOption::new("0", "Inactive"),
            ]),
        )
        .column(ColumnDefinition::new("timecreated", "Created"))
        .full_text_search_column("p.email")
        .sort_default("name", SortDirection::Asc)
        .page_size(page_size)
        .enable_row_selection()
        .downloadable()
        .form(
            FormDefinition::new("person", "Edit person")
                .field(FormField::new("name", "Name", FieldKind::Text).required().max_length(100))
                .field(FormField::new("email", "E-Mail", FieldKind::Text).required())
                .field(FormField::new("age", "Age", FieldKind::Number)),
        )
        .form_action("person", ActionType::Edit, "", &[], &[])
        .row_action(RowAction::new(ActionType::Delete).url("#"))
        .row_action(
            RowAction::new(ActionType::Other)
                .id("mail")
                .label("Mail")
                .on_click_per_row(|row| {
                    let email = row.get("email").map(value_text).unwrap_or_default();
                    Some(OnClick::inert(format!("window.location = 'mailto:{email}'")))
                }),
        )
        .row_action_hook(|row, mut actions| {
            let active = row.get("active").map(value_text).unwrap_or_default() == "1";
            for action in actions.iter_mut() {
                if action.action_type == ActionType::Delete {
                    action.disabled = active;
                }
            }
            actions
        })
        .detail_panel(|row| {
            format!("Age: {}", row.get("age").map(value_text).unwrap_or_default())
        })
        .build()
}
