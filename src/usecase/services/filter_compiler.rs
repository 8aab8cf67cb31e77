use crate::domain::entities::column::{ColumnDefinition, ColumnRegistry, DataType};
use crate::domain::entities::filter::{search_terms, FilterFn, FilterSpec, FilterValue};
use crate::domain::entities::row::RowId;
use crate::domain::entities::sql::{CompiledQuery, Dialect, ParamSink, ParamStyle, Params, SqlValue};
use crate::domain::entities::table::QuerySource;
use crate::error::{GridError, GridResult};
use crate::usecase::services::column_resolver::ColumnResolver;
use crate::usecase::services::type_inference::ColumnTypes;

pub const COLUMN_FILTER_PREFIX: &str = "filter";
pub const GLOBAL_FILTER_PREFIX: &str = "global_filter";
pub const ID_FILTER_PREFIX: &str = "id_filter";

/// Everything the compiler reads. Compilation itself has no side effects.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub columns: &'a ColumnRegistry,
    pub source: &'a QuerySource,
    pub column_types: &'a ColumnTypes,
    /// Raw SQL expressions that take part in global search only.
    pub full_text_columns: &'a [String],
    pub dialect: Dialect,
    pub param_style: ParamStyle,
    pub datetime_format: &'a str,
    pub timezone: &'a str,
}

impl<'a> CompileContext<'a> {
    fn resolver(&self) -> ColumnResolver<'a> {
        ColumnResolver::new(self.source)
    }

    fn data_type(&self, column: &ColumnDefinition) -> DataType {
        column
            .data_type
            .or_else(|| self.column_types.get(&column.key).copied())
            .unwrap_or(DataType::Unknown)
    }

    /// The column as searchable text: formatted for timestamps, cast for everything else.
    fn text_expression(&self, column: &ColumnDefinition, sql_column: &str) -> GridResult<String> {
        if self.data_type(column) == DataType::Timestamp {
            let format = column.format.as_deref().unwrap_or(self.datetime_format);
            self.dialect.format_timestamp(sql_column, format, self.timezone)
        } else {
            Ok(self.dialect.cast_to_char(sql_column))
        }
    }

    fn format_user_input(&self, column: &ColumnDefinition, value: &str) -> String {
        if self.data_type(column) == DataType::Number {
            normalize_number_input(value)
        } else {
            value.to_string()
        }
    }
}

/// Compiles column filters and global search into `(column_filters AND global_search)`.
pub fn compile_filters(
    ctx: &CompileContext<'_>,
    filters: &[FilterSpec],
    search: &str,
) -> GridResult<CompiledQuery> {
    let (column_where, mut params) = compile_column_filters(ctx, filters)?;
    let (global_where, global_params) = compile_global_search(ctx, search)?;
    params.append(global_params)?;

    Ok(CompiledQuery {
        sql: format!("({column_where} AND {global_where})"),
        params,
    })
}

/// Restricts the view to the given ids, bypassing filters and search.
pub fn compile_selection_filter(
    ctx: &CompileContext<'_>,
    ids: &[RowId],
) -> GridResult<CompiledQuery> {
    if ids.is_empty() {
        return Ok(CompiledQuery {
            sql: "1=0".to_string(),
            params: Params::empty(ctx.param_style),
        });
    }

    let id_column = match ctx.columns.get("id") {
        Some(column) => ctx.resolver().resolve(column),
        None => ctx.resolver().resolve_key("id"),
    };
    let mut sink = ParamSink::new(ctx.param_style, ID_FILTER_PREFIX);
    let placeholders = sink.bind_list(ids.iter().map(|id| SqlValue::row_id(id)));

    Ok(CompiledQuery {
        sql: format!("{id_column} IN ({})", placeholders.join(", ")),
        params: sink.into_params(),
    })
}

pub fn compile_column_filters(
    ctx: &CompileContext<'_>,
    filters: &[FilterSpec],
) -> GridResult<(String, Params)> {
    let mut sink = ParamSink::new(ctx.param_style, COLUMN_FILTER_PREFIX);
    let mut clauses = Vec::new();

    for filter in filters {
        let function = FilterFn::parse(filter.function.as_deref()).ok_or_else(|| {
            GridError::protocol(format!(
                "filter function not understood: {}",
                filter.function.as_deref().unwrap_or_default()
            ))
        })?;

        let Some(column) = ctx.columns.get(&filter.column) else {
            continue;
        };
        if !column.can_filter() {
            continue;
        }

        let sql_column = ctx.resolver().resolve(column);
        let value = filter
            .value
            .map(|item| ctx.format_user_input(column, item));

        if let Some(clause) = compile_predicate(ctx, column, &sql_column, function, &value, &mut sink)? {
            clauses.push(clause);
        }
    }

    if clauses.is_empty() {
        return Ok(("1=1".to_string(), Params::empty(ctx.param_style)));
    }
    Ok((format!("({})", clauses.join(" AND ")), sink.into_params()))
}

fn compile_predicate(
    ctx: &CompileContext<'_>,
    column: &ColumnDefinition,
    sql_column: &str,
    function: FilterFn,
    value: &FilterValue,
    sink: &mut ParamSink,
) -> GridResult<Option<String>> {
    let dialect = ctx.dialect;
    let clause = match function {
        FilterFn::Contains => {
            let text = value.scalar();
            if text.trim().is_empty() {
                return Ok(None);
            }
            let pattern = format!("%{}%", wildcard_whitespace(&dialect.like_escape(text.trim())));
            let placeholder = sink.bind(pattern);
            dialect.like(&ctx.text_expression(column, sql_column)?, &placeholder, false)
        }
        FilterFn::Equals => match value {
            FilterValue::List(items) => {
                if items.is_empty() {
                    return Ok(None);
                }
                let placeholders = sink.bind_list(items.iter().cloned());
                format!(
                    "{} IN ({})",
                    ctx.text_expression(column, sql_column)?,
                    placeholders.join(", ")
                )
            }
            FilterValue::Scalar(text) => {
                let placeholder = sink.bind(dialect.like_escape(text));
                dialect.like(&ctx.text_expression(column, sql_column)?, &placeholder, false)
            }
        },
        FilterFn::NotEquals => {
            let placeholder = sink.bind(dialect.like_escape(&value.scalar()));
            dialect.like(&ctx.text_expression(column, sql_column)?, &placeholder, true)
        }
        FilterFn::StartsWith => {
            let placeholder = sink.bind(format!("{}%", dialect.like_escape(&value.scalar())));
            dialect.like(&ctx.text_expression(column, sql_column)?, &placeholder, false)
        }
        FilterFn::EndsWith => {
            let placeholder = sink.bind(format!("%{}", dialect.like_escape(&value.scalar())));
            dialect.like(&ctx.text_expression(column, sql_column)?, &placeholder, false)
        }
        FilterFn::GreaterThan
        | FilterFn::GreaterThanOrEqualTo
        | FilterFn::LessThan
        | FilterFn::LessThanOrEqualTo => {
            let text = value.scalar();
            if text.trim().is_empty() {
                return Ok(None);
            }
            let operator = match function {
                FilterFn::GreaterThan => ">",
                FilterFn::GreaterThanOrEqualTo => ">=",
                FilterFn::LessThan => "<",
                _ => "<=",
            };
            let placeholder = sink.bind(parse_leading_float(&text));
            format!("{sql_column} {operator} {placeholder}")
        }
        FilterFn::Empty => format!("COALESCE({sql_column}, '') = ''"),
        FilterFn::NotEmpty => format!("COALESCE({sql_column}, '') <> ''"),
        FilterFn::Between => {
            let mut bounds = Vec::new();
            let lower = value.bound(0);
            if !lower.trim().is_empty() {
                let placeholder = sink.bind(parse_leading_float(lower));
                bounds.push(format!("{sql_column} >= {placeholder}"));
            }
            let upper = value.bound(1);
            if !upper.trim().is_empty() {
                let placeholder = sink.bind(parse_leading_float(upper));
                bounds.push(format!("{sql_column} <= {placeholder}"));
            }
            if bounds.is_empty() {
                return Ok(None);
            }
            bounds.join(" AND ")
        }
    };
    Ok(Some(clause))
}

/// Every whitespace-separated term must match at least one searchable column.
pub fn compile_global_search(
    ctx: &CompileContext<'_>,
    search: &str,
) -> GridResult<(String, Params)> {
    let terms = search_terms(search);
    if terms.is_empty() {
        return Ok(("1=1".to_string(), Params::empty(ctx.param_style)));
    }

    let mut searchable = Vec::new();
    for column in ctx.columns.iter().filter(|column| column.can_filter()) {
        let sql_column = ctx.resolver().resolve(column);
        searchable.push((column, ctx.text_expression(column, &sql_column)?));
    }

    let mut sink = ParamSink::new(ctx.param_style, GLOBAL_FILTER_PREFIX);
    let mut groups = Vec::with_capacity(terms.len());
    for term in terms {
        let mut alternatives = Vec::new();
        for (column, expression) in &searchable {
            let input = ctx.format_user_input(column, term);
            let placeholder = sink.bind(format!("%{}%", ctx.dialect.like_escape(&input)));
            alternatives.push(ctx.dialect.like(expression, &placeholder, false));
        }
        for expression in ctx.full_text_columns {
            let placeholder = sink.bind(format!("%{}%", ctx.dialect.like_escape(term)));
            alternatives.push(ctx.dialect.like(&ctx.dialect.cast_to_char(expression), &placeholder, false));
        }

        if alternatives.is_empty() {
            groups.push("(1=0)".to_string());
        } else {
            groups.push(format!("({})", alternatives.join(" OR ")));
        }
    }

    Ok((format!("({})", groups.join(" AND ")), sink.into_params()))
}

/// `1.234,5` becomes `1234.5`: dots are thousands separators, the comma is the decimal mark.
pub fn normalize_number_input(value: &str) -> String {
    value.replace('.', "").replace(',', ".")
}

fn wildcard_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join("%")
}

/// Parses the numeric prefix of `value` (`"18 years"` is 18). No numeric prefix gives 0.
pub fn parse_leading_float(value: &str) -> f64 {
    let trimmed = value.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end == digits_start || &trimmed[digits_start..end] == "." {
        return 0.0;
    }

    let mantissa_end = end;
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exponent_end = end + 1;
        if exponent_end < bytes.len() && (bytes[exponent_end] == b'+' || bytes[exponent_end] == b'-') {
            exponent_end += 1;
        }
        let exponent_digits = exponent_end;
        while exponent_end < bytes.len() && bytes[exponent_end].is_ascii_digit() {
            exponent_end += 1;
        }
        if exponent_end > exponent_digits {
            end = exponent_end;
        }
    }

    trimmed[..end]
        .parse::<f64>()
        .or_else(|_| trimmed[..mantissa_end].parse::<f64>())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        columns: ColumnRegistry,
        source: QuerySource,
        types: ColumnTypes,
        full_text: Vec<String>,
    }

    impl Fixture {
        fn people() -> Self {
            let mut columns = ColumnRegistry::new();
            for column in [
                ColumnDefinition::new("id", "ID").data_type(DataType::Number),
                ColumnDefinition::new("name", "Name").data_type(DataType::Text),
                ColumnDefinition::new("age", "Age").data_type(DataType::Number),
                ColumnDefinition::new("timecreated", "Created").data_type(DataType::Timestamp),
                ColumnDefinition::new("secret", "Secret").internal(),
            ] {
                columns.push(column).expect("column should be added");
            }
            Self {
                columns,
                source: QuerySource::new("*", "people", "1=1", Params::default()),
                types: ColumnTypes::new(),
                full_text: Vec::new(),
            }
        }

        fn ctx(&self, style: ParamStyle) -> CompileContext<'_> {
            CompileContext {
                columns: &self.columns,
                source: &self.source,
                column_types: &self.types,
                full_text_columns: &self.full_text,
                dialect: Dialect::Sqlite,
                param_style: style,
                datetime_format: "%d.%m.%Y",
                timezone: "UTC",
            }
        }
    }

    fn filter(column: &str, function: &str, value: FilterValue) -> FilterSpec {
        FilterSpec::new(column, function, value)
    }

    fn scalar(value: &str) -> FilterValue {
        FilterValue::Scalar(value.to_string())
    }

    #[test]
    fn starts_with_binds_prefix_pattern() {
        let fixture = Fixture::people();
        let compiled = compile_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("name", "startsWith", scalar("An"))],
            "",
        )
        .expect("compile should succeed");

        assert_eq!(
            compiled.sql,
            "((LOWER(CAST(people.name AS TEXT)) LIKE LOWER(?) ESCAPE '\\') AND 1=1)"
        );
        assert_eq!(compiled.params, Params::Positional(vec![SqlValue::from("An%")]));
    }

    #[test]
    fn contains_turns_whitespace_into_wildcards() {
        let fixture = Fixture::people();
        let (_, params) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("name", "", scalar(" ann  mar_ie "))],
        )
        .expect("compile should succeed");

        assert_eq!(params, Params::Positional(vec![SqlValue::from("%ann%mar\\_ie%")]));
    }

    #[test]
    fn empty_contains_is_skipped() {
        let fixture = Fixture::people();
        let (sql, params) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("name", "contains", scalar("   "))],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn between_with_lower_bound_only() {
        let fixture = Fixture::people();
        let value = FilterValue::List(vec!["18".to_string(), String::new()]);
        let (sql, params) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("age", "between", value)],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "(people.age >= ?)");
        assert_eq!(params, Params::Positional(vec![SqlValue::Real(18.0)]));
    }

    #[test]
    fn between_inclusive_is_the_same_as_between() {
        let fixture = Fixture::people();
        let value = FilterValue::List(vec!["18".to_string(), "30".to_string()]);
        let (sql, _) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("age", "betweenInclusive", value)],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "(people.age >= ? AND people.age <= ?)");
    }

    #[test]
    fn unknown_function_is_a_protocol_error() {
        let fixture = Fixture::people();
        let result = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("name", "bogus", scalar("x"))],
        );

        assert!(matches!(result, Err(GridError::Protocol(_))), "got {result:?}");
    }

    #[test]
    fn unknown_and_internal_columns_are_dropped() {
        let fixture = Fixture::people();
        let (sql, _) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[
                filter("nope", "equals", scalar("x")),
                filter("secret", "equals", scalar("x")),
            ],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "1=1");
    }

    #[test]
    fn equals_list_becomes_in_set_with_named_params() {
        let fixture = Fixture::people();
        let value = FilterValue::List(vec!["Ann".to_string(), "Bob".to_string()]);
        let (sql, params) = compile_column_filters(
            &fixture.ctx(ParamStyle::Named),
            &[filter("name", "equals", value)],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "(CAST(people.name AS TEXT) IN (:filter_0, :filter_1))");
        assert_eq!(
            params,
            Params::Named(vec![
                ("filter_0".to_string(), SqlValue::from("Ann")),
                ("filter_1".to_string(), SqlValue::from("Bob")),
            ])
        );
    }

    #[test]
    fn number_input_is_normalized_and_coerced() {
        let fixture = Fixture::people();
        let (sql, params) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[
                filter("age", "greaterThan", scalar("1.234,5")),
                filter("age", "lessThan", scalar("")),
            ],
        )
        .expect("compile should succeed");

        assert_eq!(sql, "(people.age > ?)");
        assert_eq!(params, Params::Positional(vec![SqlValue::Real(1234.5)]));
    }

    #[test]
    fn empty_treats_null_as_empty_string() {
        let fixture = Fixture::people();
        let (sql, _) = compile_column_filters(
            &fixture.ctx(ParamStyle::Positional),
            &[filter("name", "empty", scalar("")), filter("age", "notEmpty", scalar(""))],
        )
        .expect("compile should succeed");

        assert_eq!(
            sql,
            "(COALESCE(people.name, '') = '' AND COALESCE(people.age, '') <> '')"
        );
    }

    #[test]
    fn global_search_is_and_of_terms_or_of_columns() {
        let mut fixture = Fixture::people();
        fixture.full_text.push("people.notes".to_string());
        let (sql, params) =
            compile_global_search(&fixture.ctx(ParamStyle::Named), "ann 42").expect("compile should succeed");

        assert_eq!(sql.matches(" AND ").count(), 1, "two term groups: {sql}");
        assert_eq!(sql.matches(" OR ").count(), 8, "five alternatives per term: {sql}");
        assert!(sql.contains("strftime('%d.%m.%Y', people.timecreated, 'unixepoch')"));
        assert!(!sql.contains("secret"));
        assert_eq!(params.len(), 10);
        match params {
            Params::Named(values) => {
                assert_eq!(values[0].0, "global_filter_0");
                assert_eq!(values[0].1, SqlValue::from("%ann%"));
            }
            other => panic!("expected named params, got {other:?}"),
        }
    }

    #[test]
    fn blank_search_matches_everything() {
        let fixture = Fixture::people();
        let (sql, params) =
            compile_global_search(&fixture.ctx(ParamStyle::Positional), "  ").expect("compile should succeed");

        assert_eq!(sql, "1=1");
        assert!(params.is_empty());
    }

    #[test]
    fn selection_filter_uses_id_column() {
        let fixture = Fixture::people();
        let compiled = compile_selection_filter(
            &fixture.ctx(ParamStyle::Named),
            &["1".to_string(), "3".to_string()],
        )
        .expect("compile should succeed");

        assert_eq!(compiled.sql, "people.id IN (:id_filter_0, :id_filter_1)");
    }

    #[test]
    fn leading_float_parsing() {
        assert_eq!(parse_leading_float("18"), 18.0);
        assert_eq!(parse_leading_float(" 18 years"), 18.0);
        assert_eq!(parse_leading_float("-2.5e2x"), -250.0);
        assert_eq!(parse_leading_float("abc"), 0.0);
        assert_eq!(parse_leading_float("."), 0.0);
    }
}
