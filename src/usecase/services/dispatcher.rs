use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::entities::action::{ActionType, RenderedAction};
use crate::domain::entities::form::FieldErrors;
use crate::domain::entities::query::{ListMeta, PageSpec};
use crate::domain::entities::row::{row_id, Row, RowId, RowIdentity};
use crate::domain::entities::selection::{SelectionKey, SelectionState};
use crate::domain::entities::sql::CompiledQuery;
use crate::domain::entities::table::TableDefinition;
use crate::error::{GridError, GridResult};
use crate::infra::export::csv::rows_to_csv;
use crate::usecase::ports::engine::QueryEngine;
use crate::usecase::ports::forms::FormRenderer;
use crate::usecase::ports::selection_store::SelectionStore;
use crate::usecase::services::action_differ::{render_base_actions, resolve_for_row, row_actions_payload};
use crate::usecase::services::filter_compiler::{compile_filters, compile_selection_filter, CompileContext};
use crate::usecase::services::form_service::{FormService, StoreOutcome};
use crate::usecase::services::row_format::format_cells;
use crate::usecase::services::selection_service::SelectionService;
use crate::usecase::services::sort_page::{compile_page, compile_sort, count_query, page_query, requested_sort};
use crate::usecase::services::table_config::{table_config, DEFAULT_PAGE_SIZE_OPTIONS};
use crate::usecase::services::type_inference::{ColumnTypes, TypeInference};
use crate::wire::envelope::Envelope;
use crate::wire::request::{GridAction, GridRequest};

/// Deployment-wide settings a table does not carry itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    pub datetime_format: String,
    /// `UTC` or `localtime`.
    pub timezone: String,
    pub page_size_options: Vec<i64>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            datetime_format: "%d.%m.%Y %H:%M".to_string(),
            timezone: "UTC".to_string(),
            page_size_options: DEFAULT_PAGE_SIZE_OPTIONS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridResponse {
    Json(Envelope),
    Csv { filename: String, body: Vec<u8> },
}

/// Serves one table over the request protocol. Each call is independent; the selection store
/// is the only state shared between requests.
#[derive(Clone)]
pub struct Dispatcher {
    table: Arc<TableDefinition>,
    engine: Arc<dyn QueryEngine>,
    selection: SelectionService,
    forms: Arc<dyn FormRenderer>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        table: Arc<TableDefinition>,
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn SelectionStore>,
        forms: Arc<dyn FormRenderer>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            table,
            engine,
            selection: SelectionService::new(store),
            forms,
            settings,
        }
    }

    pub fn table(&self) -> &TableDefinition {
        &self.table
    }

    /// Parses and handles one request. Errors become an error envelope.
    pub fn respond(&self, session: &str, params: &HashMap<String, String>, privileged: bool) -> GridResponse {
        let result = GridRequest::from_params(params).and_then(|request| self.handle(session, &request));
        match result {
            Ok(response) => response,
            Err(err) => {
                warn!(table = %self.table.unique_id, error = %err, "grid request failed");
                GridResponse::Json(Envelope::from_error(&err, privileged))
            }
        }
    }

    pub fn handle(&self, session: &str, request: &GridRequest) -> GridResult<GridResponse> {
        if let Some(uniqueid) = &request.uniqueid {
            if uniqueid != &self.table.unique_id {
                return Err(GridError::protocol(format!(
                    "request is for table '{uniqueid}', not '{}'",
                    self.table.unique_id
                )));
            }
        }
        debug!(
            table = %self.table.unique_id,
            action = request.action.as_str(),
            filters = request.filters.len(),
            "dispatching"
        );

        let key = self.selection_key(session);
        let envelope = match request.action {
            GridAction::GetConfig => self.get_config(),
            GridAction::List => self.list(&key, request)?,
            GridAction::SetSelected => self.set_selected(&key, request)?,
            GridAction::SelectAll => self.select_all(&key, request)?,
            GridAction::SelectNone => {
                self.selection.clear(&key)?;
                selection_meta(0)
            }
            GridAction::FormShow => self.form_show(request)?,
            GridAction::FormSave => self.form_save(request)?,
            GridAction::DeleteRow => self.delete_row(request)?,
            GridAction::Download => return self.download(&key, request),
        };
        Ok(GridResponse::Json(envelope))
    }

    pub fn get_selected_row_ids(&self, session: &str) -> GridResult<Vec<RowId>> {
        let state = self.selection.get(&self.selection_key(session))?;
        Ok(state.selected_row_ids.into_iter().collect())
    }

    /// Selected rows as the unpaginated base query returns them.
    pub fn get_selected_rows(&self, session: &str) -> GridResult<Vec<Row>> {
        let ids = self.get_selected_row_ids(session)?;
        let types = self.column_types();
        let filter = compile_selection_filter(&self.compile_context(&types), &ids)?;
        let query = page_query(&self.table.source, &filter, "")?;
        Ok(self.engine.fetch_page(&query, 0, None)?)
    }

    pub fn clear_selection(&self, session: &str) -> GridResult<()> {
        self.selection.clear(&self.selection_key(session))?;
        Ok(())
    }

    fn get_config(&self) -> Envelope {
        let types = self.column_types();
        let config = table_config(
            &self.table,
            &types,
            &self.settings.page_size_options,
            &self.settings.timezone,
        );
        match serde_json::to_value(config) {
            Ok(data) => Envelope::success(data),
            Err(err) => Envelope::from_error(
                &GridError::config(format!("table config could not be serialized: {err}")),
                false,
            ),
        }
    }

    fn list(&self, key: &SelectionKey, request: &GridRequest) -> GridResult<Envelope> {
        let table = &self.table;
        let types = self.column_types();
        let filter = self.filter(&types, request)?;
        let order_by = self.order_by(request);

        let page_size = if request.page_size > 0 {
            request.page_size
        } else {
            table.page_size
        };
        let page = PageSpec::new(request.page, page_size)?;
        let (limit, offset) = compile_page(&page);

        let total = self.engine.count_rows(&count_query(&table.source, &filter)?)?;
        let raw_rows = self
            .engine
            .fetch_page(&page_query(&table.source, &filter, &order_by)?, offset, Some(limit))?;

        let selection = self.selection.get(key)?;
        let base_actions = render_base_actions(table);
        let rows = raw_rows
            .iter()
            .map(|raw| self.list_row(raw, &types, &selection, &base_actions).map(Value::Object))
            .collect::<GridResult<Vec<_>>>()?;

        info!(
            table = %table.unique_id,
            rows = rows.len(),
            total,
            page = page.page_index,
            "list"
        );

        let meta = ListMeta {
            total,
            page_size,
            current_page: page.page_index,
            selected_rows_count: selection.len(),
        };
        Ok(Envelope::success(Value::Array(rows)).with_meta(json!(meta)))
    }

    /// Display cells plus the `_data` side channel, which is left out when empty.
    fn list_row(
        &self,
        raw: &Row,
        types: &ColumnTypes,
        selection: &SelectionState,
        base_actions: &[RenderedAction],
    ) -> GridResult<Row> {
        let table = &self.table;
        let mut row = format_cells(&table.columns, raw, types, self.datetime_format(), &self.settings.timezone)?;

        let mut data = Row::new();
        if table.flags.row_selection {
            let selected = row_id(&row).is_some_and(|id| selection.contains(&id));
            data.insert("selected".to_string(), Value::Bool(selected));
        }
        if let Some(render) = &table.detail_panel {
            data.insert("detail_panel_content".to_string(), Value::String(render(raw)));
        }
        if let Some(actions) = row_actions_payload(table, base_actions, raw)? {
            data.insert(
                "row_actions".to_string(),
                Value::Array(actions.into_iter().map(Value::Object).collect()),
            );
        }
        if !data.is_empty() {
            row.insert("_data".to_string(), Value::Object(data));
        }
        Ok(row)
    }

    fn set_selected(&self, key: &SelectionKey, request: &GridRequest) -> GridResult<Envelope> {
        let selected = request
            .row_ids_selected
            .as_deref()
            .ok_or_else(|| GridError::protocol("missing required parameter row_ids_selected"))?;
        let unselected = request
            .row_ids_unselected
            .as_deref()
            .ok_or_else(|| GridError::protocol("missing required parameter row_ids_unselected"))?;

        let state = self.selection.set_selected(key, selected, unselected)?;
        Ok(selection_meta(state.len()))
    }

    /// Selects every row of the current filter view, across all pages.
    fn select_all(&self, key: &SelectionKey, request: &GridRequest) -> GridResult<Envelope> {
        let types = self.column_types();
        let filter = self.filter(&types, request)?;
        let rows = self
            .engine
            .fetch_page(&page_query(&self.table.source, &filter, "")?, 0, None)?;
        let ids: Vec<RowId> = rows.iter().filter_map(row_id).collect();

        let state = self.selection.select_all(key, ids)?;
        Ok(selection_meta(state.len()))
    }

    fn form_show(&self, request: &GridRequest) -> GridResult<Envelope> {
        let form = self.table.form(required(&request.formid, "formid")?)?;
        let row = self.load_form_row(request.rowid.as_ref())?;
        let rendered = self.forms.render(form, &row, &FieldErrors::new());

        Ok(Envelope::success(json!({
            "colreplace": "",
            "errors": "",
            "form": rendered.markup,
            "pageendcode": rendered.script,
            "modal_title": modal_title(&form.title),
        })))
    }

    /// Invalid data re-renders the form with field messages. Saved data tells the client what
    /// to refresh: the row after an update, the whole table after an insert.
    fn form_save(&self, request: &GridRequest) -> GridResult<Envelope> {
        let form = self.table.form(required(&request.formid, "formid")?)?;
        let stored = self.load_form_row(request.rowid.as_ref())?;

        let mut data = request
            .rowid
            .as_ref()
            .map(RowIdentity::to_row)
            .unwrap_or_default();
        for (name, value) in &request.form_data {
            data.insert(name.clone(), value.clone());
        }

        let errors = form.validate(&data);
        if !errors.is_empty() {
            debug!(form = %form.id, errors = errors.len(), "form rejected");
            let mut shown = stored;
            for (name, value) in &data {
                shown.insert(name.clone(), value.clone());
            }
            let rendered = self.forms.render(form, &shown, &errors);
            return Ok(Envelope::success(json!({
                "colreplace": "",
                "errors": errors,
                "form": rendered.markup,
                "pageendcode": rendered.script,
                "modal_title": modal_title(&form.title),
            })));
        }

        let outcome = FormService::new(self.engine.as_ref(), &self.table).store_row(form, &data)?;
        let (refresh, rowid) = match outcome {
            StoreOutcome::Updated(id) => ("row", Value::String(id)),
            StoreOutcome::Inserted => ("table", Value::Null),
        };
        Ok(Envelope::success(json!({
            "saved": true,
            "refresh": refresh,
            "rowid": rowid,
        })))
    }

    /// Only rows for which a delete action is offered and enabled can be deleted.
    fn delete_row(&self, request: &GridRequest) -> GridResult<Envelope> {
        let identity = request
            .rowid
            .as_ref()
            .ok_or_else(|| GridError::protocol("missing required parameter rowid"))?;
        let id = identity
            .id()
            .ok_or_else(|| GridError::protocol("rowid must contain an id"))?
            .to_string();

        let forms = FormService::new(self.engine.as_ref(), &self.table);
        let row = forms
            .get_row(&RowIdentity::Single(id.clone()))?
            .ok_or_else(|| GridError::permission(format!("row {id} not found")))?;

        let permitted = resolve_for_row(&self.table, &row)
            .iter()
            .any(|action| action.action_type == ActionType::Delete && !action.disabled);
        if !permitted {
            return Err(GridError::permission(format!("row {id} may not be deleted")));
        }

        forms.delete_row(&id)?;
        Ok(Envelope::success(json!({ "success": true })))
    }

    /// The current filter view as CSV, or the selection when requested and not empty.
    fn download(&self, key: &SelectionKey, request: &GridRequest) -> GridResult<GridResponse> {
        let table = &self.table;
        if !table.flags.downloadable {
            return Err(GridError::permission("downloads are not enabled for this table"));
        }

        let types = self.column_types();
        let selection = if request.download_selected {
            self.selection.get(key)?
        } else {
            SelectionState::default()
        };
        let filter = if selection.is_empty() {
            self.filter(&types, request)?
        } else {
            let ids: Vec<RowId> = selection.selected_row_ids.iter().cloned().collect();
            compile_selection_filter(&self.compile_context(&types), &ids)?
        };
        let order_by = self.order_by(request);

        let raw_rows = self
            .engine
            .fetch_page(&page_query(&table.source, &filter, &order_by)?, 0, None)?;
        let rows = raw_rows
            .iter()
            .map(|raw| format_cells(&table.columns, raw, &types, self.datetime_format(), &self.settings.timezone))
            .collect::<GridResult<Vec<_>>>()?;

        let body = rows_to_csv(&table.columns, &rows)
            .map_err(|err| GridError::config(format!("csv export failed: {err:#}")))?;
        info!(table = %table.unique_id, rows = rows.len(), "download");
        Ok(GridResponse::Csv {
            filename: format!("{}.csv", table.unique_id),
            body,
        })
    }

    fn load_form_row(&self, identity: Option<&RowIdentity>) -> GridResult<Row> {
        let Some(identity) = identity else {
            return Ok(Row::new());
        };
        FormService::new(self.engine.as_ref(), &self.table)
            .get_row(identity)?
            .ok_or_else(|| GridError::permission("row not found"))
    }

    fn selection_key(&self, session: &str) -> SelectionKey {
        SelectionKey::new(self.table.unique_id.clone(), session)
    }

    fn column_types(&self) -> ColumnTypes {
        TypeInference::new(self.engine.as_ref(), &self.table.source).column_types(&self.table.columns)
    }

    fn datetime_format(&self) -> &str {
        self.table
            .datetime_format
            .as_deref()
            .unwrap_or(&self.settings.datetime_format)
    }

    fn compile_context<'a>(&'a self, types: &'a ColumnTypes) -> CompileContext<'a> {
        CompileContext {
            columns: &self.table.columns,
            source: &self.table.source,
            column_types: types,
            full_text_columns: &self.table.full_text_columns,
            dialect: self.engine.dialect(),
            param_style: self.table.source.param_style(),
            datetime_format: self.datetime_format(),
            timezone: &self.settings.timezone,
        }
    }

    fn filter(&self, types: &ColumnTypes, request: &GridRequest) -> GridResult<CompiledQuery> {
        compile_filters(&self.compile_context(types), &request.filters, &request.search)
    }

    fn order_by(&self, request: &GridRequest) -> String {
        let sort = requested_sort(
            &self.table.sort_default,
            request.sort_column.as_deref(),
            request.sort_direction,
        );
        compile_sort(&sort, &self.table.columns, &self.table.source, self.table.flags.sortable)
    }
}

fn selection_meta(count: usize) -> Envelope {
    Envelope::meta_only(json!({ "selected_rows_count": count }))
}

fn required<'a>(value: &'a Option<String>, name: &str) -> GridResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| GridError::protocol(format!("missing required parameter {name}")))
}

fn modal_title(title: &str) -> &str {
    if title.is_empty() {
        "Edit"
    } else {
        title
    }
}
