use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::entities::action::{ActionType, FormActionData, RowAction};
use crate::domain::entities::column::{ColumnDefinition, ColumnRegistry};
use crate::domain::entities::form::FormDefinition;
use crate::domain::entities::query::{SortDirection, SortSpec};
use crate::domain::entities::row::Row;
use crate::domain::entities::sql::{ParamStyle, Params};
use crate::error::{GridError, GridResult};

/// The author-supplied row source: `SELECT {fields} FROM {from} WHERE {where_clause}`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySource {
    pub fields: String,
    pub from: String,
    pub where_clause: String,
    pub params: Params,
    /// Physical table for schema lookups, form persistence and deletes.
    pub table: Option<String>,
}

impl QuerySource {
    pub fn new(
        fields: impl Into<String>,
        from: impl Into<String>,
        where_clause: impl Into<String>,
        params: Params,
    ) -> Self {
        let where_clause = where_clause.into();
        Self {
            fields: fields.into(),
            from: from.into().trim().to_string(),
            where_clause: if where_clause.trim().is_empty() {
                "1=1".to_string()
            } else {
                where_clause
            },
            params,
            table: None,
        }
    }

    /// Wraps a complete query so that its output columns can be filtered by name.
    pub fn from_query(query: &str, params: Params) -> Self {
        Self::new("*", format!("({query}) AS results"), "1=1", params)
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn param_style(&self) -> ParamStyle {
        self.params.style()
    }

    pub fn physical_table(&self) -> GridResult<String> {
        let table = match &self.table {
            Some(table) => table.trim().to_string(),
            None => self.from.trim().to_string(),
        };
        if table.is_empty() || table.chars().any(char::is_whitespace) {
            return Err(GridError::protocol(
                "table name not set, use QuerySource::with_table()",
            ));
        }
        Ok(table)
    }
}

pub type RowActionHook = Arc<dyn Fn(&Row, Vec<RowAction>) -> Vec<RowAction> + Send + Sync>;
pub type DetailPanelHook = Arc<dyn Fn(&Row) -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFlags {
    pub sortable: bool,
    pub row_selection: bool,
    pub downloadable: bool,
    pub detail_panel: bool,
    pub page_size_selector: bool,
    /// `None` follows `sortable`.
    pub global_filter: Option<bool>,
    /// `None` enables column filters when any column is filterable.
    pub column_filters: Option<bool>,
    pub actions_as_menu: Option<bool>,
    pub actions_as_sticky_column: Option<bool>,
    pub expand_action_urls: bool,
}

impl Default for TableFlags {
    fn default() -> Self {
        Self {
            sortable: true,
            row_selection: false,
            downloadable: false,
            detail_panel: false,
            page_size_selector: true,
            global_filter: None,
            column_filters: None,
            actions_as_menu: None,
            actions_as_sticky_column: None,
            expand_action_urls: false,
        }
    }
}

pub struct TableDefinition {
    pub unique_id: String,
    pub source: QuerySource,
    pub columns: ColumnRegistry,
    pub actions: Vec<RowAction>,
    pub row_action_hook: Option<RowActionHook>,
    pub detail_panel: Option<DetailPanelHook>,
    pub full_text_columns: Vec<String>,
    pub forms: BTreeMap<String, FormDefinition>,
    pub sort_default: SortSpec,
    pub page_size: i64,
    pub page_size_options: Vec<i64>,
    pub initial_page_index: i64,
    pub base_url: String,
    pub datetime_format: Option<String>,
    pub flags: TableFlags,
}

impl fmt::Debug for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDefinition")
            .field("unique_id", &self.unique_id)
            .field("source", &self.source)
            .field("columns", &self.columns)
            .field("actions", &self.actions)
            .field("sort_default", &self.sort_default)
            .field("page_size", &self.page_size)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl TableDefinition {
    pub fn builder(unique_id: impl Into<String>, source: QuerySource) -> TableBuilder {
        TableBuilder::new(unique_id, source)
    }

    pub fn form(&self, form_id: &str) -> GridResult<&FormDefinition> {
        self.forms
            .get(form_id)
            .ok_or_else(|| GridError::protocol(format!("form '{form_id}' not found")))
    }

    pub fn has_customized_actions(&self) -> bool {
        self.row_action_hook.is_some()
            || self.flags.expand_action_urls
            || self.actions.iter().any(RowAction::needs_row_rendering)
    }
}

pub struct TableBuilder {
    unique_id: String,
    source: QuerySource,
    columns: Vec<ColumnDefinition>,
    actions: Vec<RowAction>,
    row_action_hook: Option<RowActionHook>,
    detail_panel: Option<DetailPanelHook>,
    full_text_columns: Vec<String>,
    forms: Vec<FormDefinition>,
    sort_default: Option<SortSpec>,
    page_size: i64,
    page_size_options: Vec<i64>,
    initial_page_index: i64,
    base_url: String,
    datetime_format: Option<String>,
    flags: TableFlags,
}

impl TableBuilder {
    pub fn new(unique_id: impl Into<String>, source: QuerySource) -> Self {
        Self {
            unique_id: unique_id.into(),
            source,
            columns: Vec::new(),
            actions: Vec::new(),
            row_action_hook: None,
            detail_panel: None,
            full_text_columns: Vec::new(),
            forms: Vec::new(),
            sort_default: None,
            page_size: 50,
            page_size_options: Vec::new(),
            initial_page_index: 0,
            base_url: String::new(),
            datetime_format: None,
            flags: TableFlags::default(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn row_action(mut self, action: RowAction) -> Self {
        self.actions.push(action);
        self
    }

    /// Adds an action that opens `form_id` for the clicked row in a modal.
    pub fn form_action(
        mut self,
        form_id: impl Into<String>,
        action_type: ActionType,
        label: impl Into<String>,
        row_id_fields: &[&str],
        show_fields: &[&str],
    ) -> Self {
        let mut action = RowAction::new(action_type).label(label).url("#");
        action.form = Some(FormActionData {
            form_id: form_id.into(),
            row_id_fields: row_id_fields.iter().map(|field| field.to_string()).collect(),
            show_fields: show_fields.iter().map(|field| field.to_string()).collect(),
        });
        self.actions.push(action);
        self
    }

    pub fn row_action_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Row, Vec<RowAction>) -> Vec<RowAction> + Send + Sync + 'static,
    {
        self.row_action_hook = Some(Arc::new(hook));
        self
    }

    pub fn detail_panel<F>(mut self, render: F) -> Self
    where
        F: Fn(&Row) -> String + Send + Sync + 'static,
    {
        self.detail_panel = Some(Arc::new(render));
        self.flags.detail_panel = true;
        self
    }

    pub fn full_text_search_column(mut self, sql_expression: impl Into<String>) -> Self {
        self.full_text_columns.push(sql_expression.into());
        self
    }

    pub fn form(mut self, form: FormDefinition) -> Self {
        self.forms.push(form);
        self
    }

    pub fn sort_default(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sort_default = Some(SortSpec::new(column, direction));
        self
    }

    pub fn page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn page_size_options(mut self, options: Vec<i64>) -> Self {
        self.page_size_options = options;
        self
    }

    pub fn initial_page_index(mut self, page: i64) -> Self {
        self.initial_page_index = page;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn datetime_format(mut self, format: impl Into<String>) -> Self {
        self.datetime_format = Some(format.into());
        self
    }

    pub fn flags(mut self, flags: TableFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn enable_row_selection(mut self) -> Self {
        self.flags.row_selection = true;
        self
    }

    pub fn downloadable(mut self) -> Self {
        self.flags.downloadable = true;
        self
    }

    pub fn build(self) -> GridResult<TableDefinition> {
        if self.unique_id.trim().is_empty() {
            return Err(GridError::config("table unique id must not be empty"));
        }
        if self.page_size <= 0 {
            return Err(GridError::config("page size must be greater than zero"));
        }

        let mut columns = ColumnRegistry::new();
        for column in self.columns {
            columns.push(column)?;
        }
        let first = columns
            .first()
            .ok_or_else(|| GridError::config("a table needs at least one column"))?;

        let sort_default = match self.sort_default {
            Some(sort) => {
                if !columns.contains(&sort.column) {
                    return Err(GridError::config(format!(
                        "default sort column '{}' not found",
                        sort.column
                    )));
                }
                sort
            }
            None => {
                let direction = if first.key.contains("time") {
                    SortDirection::Desc
                } else {
                    SortDirection::Asc
                };
                SortSpec::new(first.key.clone(), direction)
            }
        };

        let mut forms = BTreeMap::new();
        for form in self.forms {
            form.check()?;
            if forms.contains_key(&form.id) {
                return Err(GridError::config(format!("form {} was added twice", form.id)));
            }
            forms.insert(form.id.clone(), form);
        }

        let mut actions: Vec<RowAction> = Vec::with_capacity(self.actions.len());
        for (index, mut action) in self.actions.into_iter().enumerate() {
            if action.id.is_empty() {
                action.id = format!("action-{}", index + 1);
            }
            if actions.iter().any(|existing| existing.id == action.id) {
                return Err(GridError::config(format!(
                    "row action with id '{}' already exists",
                    action.id
                )));
            }
            if action.url.is_empty() {
                action.url = default_action_url(&self.base_url, action.action_type);
            }
            if action.label.is_empty() {
                action.label = default_action_label(action.action_type).to_string();
            }
            if let Some(form) = &action.form {
                if !forms.contains_key(&form.form_id) {
                    return Err(GridError::config(format!(
                        "form '{}' not found",
                        form.form_id
                    )));
                }
            }
            actions.push(action);
        }

        Ok(TableDefinition {
            unique_id: self.unique_id,
            source: self.source,
            columns,
            actions,
            row_action_hook: self.row_action_hook,
            detail_panel: self.detail_panel,
            full_text_columns: self.full_text_columns,
            forms,
            sort_default,
            page_size: self.page_size,
            page_size_options: self.page_size_options,
            initial_page_index: self.initial_page_index.max(0),
            base_url: self.base_url,
            datetime_format: self.datetime_format,
            flags: self.flags,
        })
    }
}

fn default_action_url(base_url: &str, action_type: ActionType) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    match action_type {
        ActionType::Edit => format!("{base_url}{separator}action=edit&id={{id}}"),
        ActionType::Delete => format!("{base_url}{separator}action=delete&id={{id}}"),
        ActionType::Other => String::new(),
    }
}

fn default_action_label(action_type: ActionType) -> &'static str {
    match action_type {
        ActionType::Edit => "Edit",
        ActionType::Delete => "Delete",
        ActionType::Other => "",
    }
}
