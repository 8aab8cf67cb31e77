use tracing::{debug, info};

use crate::domain::entities::form::{is_identifier, FormDefinition};
use crate::domain::entities::row::{row_id_from_value, value_text, Row, RowId, RowIdentity};
use crate::domain::entities::sql::{ParamSink, SqlValue};
use crate::domain::entities::table::TableDefinition;
use crate::error::{GridError, GridResult};
use crate::usecase::ports::engine::QueryEngine;
use crate::usecase::services::sort_page::row_query_by;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Updated(RowId),
    Inserted,
}

/// Row lookup and persistence behind the table forms.
pub struct FormService<'a> {
    engine: &'a dyn QueryEngine,
    table: &'a TableDefinition,
}

impl<'a> FormService<'a> {
    pub fn new(engine: &'a dyn QueryEngine, table: &'a TableDefinition) -> Self {
        Self { engine, table }
    }

    /// Looks the row up in the table's complete, unfiltered query.
    pub fn get_row(&self, identity: &RowIdentity) -> GridResult<Option<Row>> {
        let conditions: Vec<(String, SqlValue)> = match identity {
            RowIdentity::Single(id) => vec![("id".to_string(), SqlValue::row_id(id))],
            RowIdentity::Fields(fields) => {
                if fields.is_empty() {
                    return Err(GridError::protocol("rowid must name at least one field"));
                }
                let mut conditions = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    if !is_identifier(name) {
                        return Err(GridError::protocol(format!("invalid rowid field '{name}'")));
                    }
                    conditions.push((name.clone(), SqlValue::row_id(value)));
                }
                conditions
            }
        };

        let query = row_query_by(&self.table.source, &conditions)?;
        let mut rows = self.engine.fetch_page(&query, 0, Some(1))?;
        Ok(rows.pop())
    }

    /// Updates the row when `data` carries a non-empty `id`, inserts otherwise. Only the form's
    /// declared fields are written.
    pub fn store_row(&self, form: &FormDefinition, data: &Row) -> GridResult<StoreOutcome> {
        let table = self.table.source.physical_table()?;
        let values: Vec<(String, SqlValue)> = form
            .whitelist(data)
            .iter()
            .filter(|(name, _)| name.as_str() != "id")
            .map(|(name, value)| (name.clone(), SqlValue::from(value)))
            .collect();

        match data.get("id").and_then(row_id_from_value) {
            Some(id) => {
                self.check_row_selector(form, &id, data)?;
                if values.is_empty() {
                    debug!(table = %table, id = %id, "nothing to update");
                    return Ok(StoreOutcome::Updated(id));
                }

                let mut sink = ParamSink::new(self.table.source.param_style(), "form");
                let assignments: Vec<String> = values
                    .into_iter()
                    .map(|(name, value)| format!("{name} = {}", sink.bind(value)))
                    .collect();
                let id_placeholder = sink.bind(SqlValue::row_id(&id));
                let sql = format!(
                    "UPDATE {table} SET {} WHERE id = {id_placeholder}",
                    assignments.join(", ")
                );
                self.engine.execute(&sql, &sink.into_params())?;
                info!(table = %table, id = %id, "row updated");
                Ok(StoreOutcome::Updated(id))
            }
            None => {
                let mut sink = ParamSink::new(self.table.source.param_style(), "form");
                let sql = if values.is_empty() {
                    format!("INSERT INTO {table} DEFAULT VALUES")
                } else {
                    let names: Vec<&str> = values.iter().map(|(name, _)| name.as_str()).collect();
                    let placeholders = sink.bind_list(values.iter().map(|(_, value)| value.clone()));
                    format!(
                        "INSERT INTO {table} ({}) VALUES ({})",
                        names.join(", "),
                        placeholders.join(", ")
                    )
                };
                self.engine.execute(&sql, &sink.into_params())?;
                info!(table = %table, "row inserted");
                Ok(StoreOutcome::Inserted)
            }
        }
    }

    pub fn delete_row(&self, id: &str) -> GridResult<u64> {
        let table = self.table.source.physical_table()?;
        let mut sink = ParamSink::new(self.table.source.param_style(), "form");
        let placeholder = sink.bind(SqlValue::row_id(id));
        let deleted = self.engine.execute(
            &format!("DELETE FROM {table} WHERE id = {placeholder}"),
            &sink.into_params(),
        )?;
        info!(table = %table, id = %id, deleted, "row deleted");
        Ok(deleted)
    }

    /// Submitted values of row selector fields must match the stored row.
    fn check_row_selector(&self, form: &FormDefinition, id: &str, data: &Row) -> GridResult<()> {
        if form.row_selector.is_empty() {
            return Ok(());
        }
        let stored = self
            .get_row(&RowIdentity::Single(id.to_string()))?
            .ok_or_else(|| GridError::permission(format!("row {id} not found")))?;

        for field in &form.row_selector {
            let Some(submitted) = data.get(field) else {
                continue;
            };
            let current = stored.get(field).map(value_text).unwrap_or_default();
            if value_text(submitted) != current {
                return Err(GridError::permission(format!(
                    "field '{field}' of row {id} must not change"
                )));
            }
        }
        Ok(())
    }
}
