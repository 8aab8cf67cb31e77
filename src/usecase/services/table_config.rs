use serde::Serialize;

use crate::domain::entities::action::{ActionType, OnClick, RenderedAction, RowAction};
use crate::domain::entities::column::{DataType, SelectOption};
use crate::domain::entities::query::SortDirection;
use crate::domain::entities::table::TableDefinition;
use crate::usecase::services::action_differ::render_base_actions;
use crate::usecase::services::type_inference::ColumnTypes;

pub const DEFAULT_PAGE_SIZE_OPTIONS: [i64; 5] = [10, 20, 50, 100, 1000];

/// Label width at which row actions collapse into a menu. Icon buttons count as 3 characters.
const MENU_LABEL_WIDTH: usize = 22;
const MAX_INLINE_ACTIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableConfig {
    pub uniqueid: String,
    pub url: String,
    pub pagesize: i64,
    pub initial_page_index: i64,
    pub enable_row_selection: bool,
    pub is_sortable: bool,
    pub sort_default_column: String,
    pub sort_default_order: &'static str,
    pub columns: Vec<ColumnConfig>,
    pub row_actions: Vec<RenderedAction>,
    pub row_actions_display_as_menu: bool,
    pub row_actions_display_as_sticky_column: bool,
    pub enable_global_filter: bool,
    pub enable_column_filters: bool,
    pub enable_page_size_selector: bool,
    pub page_size_options: Vec<i64>,
    pub enable_detail_panel: bool,
    pub enable_download: bool,
    pub user_timezone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnConfig {
    pub key: String,
    pub header: String,
    pub data_type: DataType,
    pub sorting: bool,
    pub filter: bool,
    pub internal: bool,
    pub visible: bool,
    pub onclick: Option<OnClick>,
    #[serde(rename = "mrtOptions")]
    pub filter_options: FilterOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    #[serde(rename = "filterVariant", skip_serializing_if = "Option::is_none")]
    pub filter_variant: Option<&'static str>,
    #[serde(rename = "filterSelectOptions", skip_serializing_if = "Vec::is_empty")]
    pub filter_select_options: Vec<SelectOption>,
}

pub fn table_config(
    table: &TableDefinition,
    types: &ColumnTypes,
    default_page_size_options: &[i64],
    timezone: &str,
) -> TableConfig {
    let columns: Vec<ColumnConfig> = table
        .columns
        .iter()
        .map(|column| ColumnConfig {
            key: column.key.clone(),
            header: column.header.clone(),
            data_type: column
                .data_type
                .or_else(|| types.get(&column.key).copied())
                .unwrap_or(DataType::Unknown),
            sorting: table.flags.sortable && column.can_sort(),
            filter: column.can_filter(),
            internal: column.internal,
            visible: column.visible,
            onclick: column.on_click.clone(),
            filter_options: if column.select_options.is_empty() {
                FilterOptions::default()
            } else {
                FilterOptions {
                    filter_variant: Some("multi-select"),
                    filter_select_options: column.select_options.clone(),
                }
            },
        })
        .collect();

    let (as_menu, as_sticky_column) = actions_display(
        &table.actions,
        table.flags.actions_as_menu,
        table.flags.actions_as_sticky_column,
    );
    let enable_column_filters = table
        .flags
        .column_filters
        .unwrap_or_else(|| columns.iter().any(|column| column.filter));

    TableConfig {
        uniqueid: table.unique_id.clone(),
        url: table.base_url.clone(),
        pagesize: table.page_size,
        initial_page_index: table.initial_page_index,
        enable_row_selection: table.flags.row_selection,
        is_sortable: table.flags.sortable,
        sort_default_column: table.sort_default.column.clone(),
        sort_default_order: match table.sort_default.direction {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        },
        columns,
        row_actions: render_base_actions(table),
        row_actions_display_as_menu: as_menu,
        row_actions_display_as_sticky_column: as_sticky_column,
        enable_global_filter: table.flags.global_filter.unwrap_or(table.flags.sortable),
        enable_column_filters,
        enable_page_size_selector: table.flags.page_size_selector,
        page_size_options: page_size_options(table, default_page_size_options),
        enable_detail_panel: table.flags.detail_panel,
        enable_download: table.flags.downloadable,
        user_timezone: timezone.to_string(),
    }
}

/// `(as_menu, as_sticky_column)`. Explicit table settings win over the label-width rule.
pub fn actions_display(
    actions: &[RowAction],
    as_menu: Option<bool>,
    as_sticky_column: Option<bool>,
) -> (bool, bool) {
    let label_width: usize = actions
        .iter()
        .map(|action| {
            if action.action_type != ActionType::Other || !action.icon.is_empty() {
                3
            } else {
                action.label.len()
            }
        })
        .sum();
    let too_wide = label_width >= MENU_LABEL_WIDTH;
    let too_many = actions.len() > MAX_INLINE_ACTIONS;

    let as_menu = as_menu.unwrap_or(too_many || too_wide);
    let as_sticky_column = as_sticky_column.unwrap_or(if as_menu {
        true
    } else if too_many {
        false
    } else {
        !too_wide
    });
    (as_menu, as_sticky_column)
}

/// No options without a selector; otherwise the table's own list, or the default list
/// plus the table's page size, sorted.
fn page_size_options(table: &TableDefinition, defaults: &[i64]) -> Vec<i64> {
    if !table.flags.page_size_selector {
        return Vec::new();
    }
    if !table.page_size_options.is_empty() {
        return table.page_size_options.clone();
    }
    let mut options = defaults.to_vec();
    if !options.contains(&table.page_size) {
        options.push(table.page_size);
        options.sort_unstable();
    }
    options
}
