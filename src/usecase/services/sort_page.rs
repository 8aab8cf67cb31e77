use crate::domain::entities::column::ColumnRegistry;
use crate::domain::entities::query::{PageSpec, SortDirection, SortSpec};
use crate::domain::entities::sql::{CompiledQuery, ParamSink, SqlValue};
use crate::domain::entities::table::QuerySource;
use crate::error::GridResult;
use crate::usecase::services::column_resolver::ColumnResolver;

/// The requested sort, or the table default when the request names no column.
pub fn requested_sort(
    default: &SortSpec,
    column: Option<&str>,
    direction: Option<SortDirection>,
) -> SortSpec {
    match column.map(str::trim).filter(|column| !column.is_empty()) {
        Some(column) => SortSpec::new(column, direction.unwrap_or(SortDirection::Asc)),
        None => SortSpec::new(
            default.column.clone(),
            direction.unwrap_or(default.direction),
        ),
    }
}

/// `ORDER BY <resolved> <dir>`, or empty when the column is unknown or not sortable.
pub fn compile_sort(
    sort: &SortSpec,
    columns: &ColumnRegistry,
    source: &QuerySource,
    sortable: bool,
) -> String {
    if !sortable {
        return String::new();
    }
    let Some(column) = columns.get(&sort.column) else {
        return String::new();
    };
    if !column.can_sort() {
        return String::new();
    }
    let expression = ColumnResolver::new(source).resolve(column);
    format!("ORDER BY {expression} {}", sort.direction.sql())
}

/// `(limit, offset)`
pub fn compile_page(page: &PageSpec) -> (i64, i64) {
    (page.page_size, page.offset())
}

/// `SELECT <fields> ... AND <filter> [ORDER BY ...]`. Base params come first.
pub fn page_query(
    source: &QuerySource,
    filter: &CompiledQuery,
    order_by: &str,
) -> GridResult<CompiledQuery> {
    let fields = if source.fields.trim().is_empty() {
        "*"
    } else {
        source.fields.as_str()
    };
    let mut sql = select_from(source, fields, &filter.sql);
    if !order_by.is_empty() {
        sql.push(' ');
        sql.push_str(order_by);
    }
    with_params(source, sql, filter)
}

/// Same WHERE as [`page_query`], selecting `COUNT(1)` without ordering.
pub fn count_query(source: &QuerySource, filter: &CompiledQuery) -> GridResult<CompiledQuery> {
    let sql = select_from(source, "COUNT(1)", &filter.sql);
    with_params(source, sql, filter)
}

/// The complete unfiltered query, wrapped so that one row can be picked by id.
pub fn row_query(source: &QuerySource, id: &str) -> GridResult<CompiledQuery> {
    row_query_by(source, &[("id".to_string(), SqlValue::row_id(id))])
}

/// Like [`row_query`], matching every `(column, value)` pair. Column names are trusted.
pub fn row_query_by(source: &QuerySource, conditions: &[(String, SqlValue)]) -> GridResult<CompiledQuery> {
    let fields = if source.fields.trim().is_empty() {
        "*"
    } else {
        source.fields.as_str()
    };
    let mut sink = ParamSink::new(source.param_style(), "form_row");
    let predicates: Vec<String> = conditions
        .iter()
        .map(|(column, value)| format!("{column} = {}", sink.bind(value.clone())))
        .collect();
    let predicate = if predicates.is_empty() {
        "1=0".to_string()
    } else {
        predicates.join(" AND ")
    };
    let sql = format!(
        "SELECT * FROM (SELECT {fields} FROM {} WHERE {}) AS form_rows WHERE {predicate}",
        source.from, source.where_clause
    );
    let filter = CompiledQuery {
        sql: String::new(),
        params: sink.into_params(),
    };
    with_params(source, sql, &filter)
}

fn select_from(source: &QuerySource, select: &str, filter_sql: &str) -> String {
    format!(
        "SELECT {select} FROM {} WHERE ({}) AND {filter_sql}",
        source.from, source.where_clause
    )
}

fn with_params(source: &QuerySource, sql: String, filter: &CompiledQuery) -> GridResult<CompiledQuery> {
    let mut params = source.params.clone();
    params.append(filter.params.clone())?;
    Ok(CompiledQuery { sql, params })
}
